//! Rolling file writer
//!
//! [`RollingFileWriter`] owns the file currently open for writing and
//! moves to a new one when the size threshold is reached, when the shared
//! [`RolloverScheduler`] fires, or when asked explicitly.
//!
//! # Rollover
//!
//! ```text
//! write() ──► size threshold? ──┐
//! timer   ──► new period?    ───┼──► resolve target ─► close current ─► rename to archive
//! rollover() ───────────────────┘                       (under lock)        │
//!                                                                           ▼
//!                                   open target ◄───────────────────────────┘
//!                                        │
//!                          (lock released) ─► submit to compressor ─► retention sweep
//! ```
//!
//! All transitions happen under one mutex per writer, so at most one file
//! is open at a time and the timer and an in-line size rollover can never
//! both rotate the same file.

mod sink;

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::archive::{
    ArchiveCompressor, CompressorConfig, RetentionSweeper, Submission, TemplateMatcher,
};
use crate::config::WriterConfig;
use crate::error::{IoContext, RolloverError, RolloverResult};
use crate::naming::FileNamer;
use crate::scheduler::{resolve_start, RolloverScheduler, WriterId};
use crate::utils::time::{Clock, SystemClock};

use sink::Sink;

/// Upper bound for sequence numbers within one period
const MAX_SEQUENCE: u32 = 100_000;

/// Attempts made to open a new file before giving up
const OPEN_ATTEMPTS: usize = 2;

/// What caused a rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverTrigger {
    /// The shared timer fired
    Scheduled,
    /// The size threshold was reached by a write
    Size,
    /// `rollover()` was called
    Manual,
}

impl fmt::Display for RolloverTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloverTrigger::Scheduled => write!(f, "scheduled"),
            RolloverTrigger::Size => write!(f, "size"),
            RolloverTrigger::Manual => write!(f, "manual"),
        }
    }
}

enum Handle {
    Open(Sink),
    /// Reopening failed; writes fail fast until a rollover succeeds
    Invalid,
    Closed,
}

/// Mutable state of one writer, only touched under its mutex
struct RollState {
    current_path: PathBuf,
    /// Unsequenced name of the period `current_path` belongs to
    period_path: PathBuf,
    handle: Handle,
    bytes_written: u64,
    writes: u64,
}

/// Work left for after the lock is released
#[derive(Default)]
struct RollOutcome {
    archived: Option<PathBuf>,
    current: Option<PathBuf>,
    /// Set when the new file could not be opened
    open_error: Option<RolloverError>,
    /// Set when the old file lost bytes on close (caller-driven rollovers only)
    close_error: Option<RolloverError>,
}

struct Shared {
    id: WriterId,
    config: WriterConfig,
    namer: FileNamer,
    sweeper: RetentionSweeper,
    clock: Arc<dyn Clock>,
    compressor: Arc<ArchiveCompressor>,
    state: Mutex<RollState>,
}

/// Builder for [`RollingFileWriter`] with injectable collaborators
pub struct WriterBuilder {
    config: WriterConfig,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<RolloverScheduler>>,
    compressor: Option<Arc<ArchiveCompressor>>,
    schedule: bool,
}

impl WriterBuilder {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            clock: None,
            scheduler: None,
            compressor: None,
            schedule: true,
        }
    }

    /// Clock used for file names (defaults to the system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Scheduler to register with (defaults to [`RolloverScheduler::global`])
    pub fn scheduler(mut self, scheduler: Arc<RolloverScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Compression pool (defaults to a private pool)
    pub fn compressor(mut self, compressor: Arc<ArchiveCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Do not register with a scheduler; rollovers happen only on size,
    /// `rollover()` or `scheduled_rollover()`
    pub fn without_schedule(mut self) -> Self {
        self.schedule = false;
        self
    }

    /// Validate the configuration and open the first file
    pub fn open(self) -> RolloverResult<RollingFileWriter> {
        self.config.validate()?;

        let compressor = match self.compressor {
            Some(c) => c,
            None => Arc::new(ArchiveCompressor::new(CompressorConfig::default())?),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let namer = FileNamer::new(&self.config);

        if let Some(matcher) = TemplateMatcher::new(namer.template(), &self.config.archive_prefix) {
            if let Err(e) =
                compressor.recover_interrupted(&self.config.directory(), |n| matcher.matches(n))
            {
                warn!(error = %e, "Recovery of interrupted compression failed");
            }
        }

        let id = WriterId::next();
        let shared = Shared {
            id,
            sweeper: RetentionSweeper::new(self.config.archive_prefix.clone()),
            namer,
            clock,
            compressor,
            state: Mutex::new(RollState {
                current_path: PathBuf::new(),
                period_path: PathBuf::new(),
                handle: Handle::Closed,
                bytes_written: 0,
                writes: 0,
            }),
            config: self.config,
        };

        let now = shared.clock.now();
        let path = shared.next_path(now, None, false)?;
        let sink = shared.open_sink(&path)?;
        {
            let mut state = shared.state.lock();
            state.current_path = path.clone();
            state.period_path = shared.namer.render(now);
            state.handle = Handle::Open(sink);
        }
        info!(writer = id.as_u64(), path = %path.display(), "Opened rolling file");

        let shared = Arc::new(shared);
        let scheduler = if self.schedule {
            let scheduler = self.scheduler.unwrap_or_else(RolloverScheduler::global);
            let start = resolve_start(&shared.config, Utc::now());
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            scheduler.register(id, start, shared.config.rollover_period(), move || {
                if let Some(shared) = weak.upgrade() {
                    if let Err(e) = shared.scheduled_rollover() {
                        error!(writer = shared.id.as_u64(), error = %e, "Scheduled rollover failed");
                    }
                }
            })?;
            Some(scheduler)
        } else {
            None
        };

        Ok(RollingFileWriter { shared, scheduler })
    }
}

impl Shared {
    /// Pick the file to open next
    ///
    /// Candidates are the rendered path, then the same path with sequence
    /// numbers `1, 2, ...` after the date. A candidate is skipped if it is
    /// `avoid`, if its archive already exists, or (with `fresh_only`) if it
    /// exists at all. The first remaining candidate must be writable under
    /// the append policy.
    fn next_path(
        &self,
        now: DateTime<Utc>,
        avoid: Option<&Path>,
        fresh_only: bool,
    ) -> RolloverResult<PathBuf> {
        for sequence in 0..MAX_SEQUENCE {
            let candidate = self.namer.render_sequenced(now, sequence);
            if avoid == Some(candidate.as_path())
                || self.namer.archive_exists(&candidate)
                || (fresh_only && candidate.exists())
            {
                continue;
            }
            if !self.config.append && candidate.exists() {
                return Err(RolloverError::PathConflict { path: candidate });
            }
            return Ok(candidate);
        }

        Err(RolloverError::config(format!(
            "No free file name for {} in this period",
            self.namer.template().display()
        )))
    }

    fn open_sink(&self, path: &Path) -> RolloverResult<Sink> {
        let mut last_error = None;
        for _ in 0..OPEN_ATTEMPTS {
            match Sink::open(path, self.config.append, self.config.buffer_size) {
                Ok(sink) => return Ok(sink),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(RolloverError::PathConflict {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }
        let source = last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "open failed"));
        Err(RolloverError::io(format!("opening {}", path.display()), source))
    }

    /// Move a closed file to its archive name
    ///
    /// A failed rename is logged; the file then stays under its live name.
    fn archive(&self, closed: &Path) -> Option<PathBuf> {
        let target = self.namer.archive_path(closed);
        if target == closed {
            return Some(target);
        }
        match std::fs::rename(closed, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                error!(path = %closed.display(), error = %e, "Failed to rename file to archive");
                None
            }
        }
    }

    /// Close the current file and open `target`
    ///
    /// The old file is archived even when opening `target` fails; the
    /// handle is then left `Invalid` and the error carried in the outcome.
    /// A failed close is carried too, unless the timer triggered it.
    fn roll_to(
        &self,
        state: &mut RollState,
        now: DateTime<Utc>,
        target: PathBuf,
        trigger: RolloverTrigger,
    ) -> RollOutcome {
        let previous = std::mem::replace(&mut state.current_path, target.clone());
        state.period_path = self.namer.render(now);
        let mut archived = None;
        let mut close_error = None;

        // Flush and sync the old file, then move it out of the live name
        if let Handle::Open(sink) = std::mem::replace(&mut state.handle, Handle::Invalid) {
            if let Err(e) = sink.finish() {
                error!(path = %previous.display(), error = %e, "Previous file did not close cleanly");
                if trigger != RolloverTrigger::Scheduled {
                    close_error = Some(RolloverError::io(
                        format!("closing {}", previous.display()),
                        e,
                    ));
                }
            }
            archived = self.archive(&previous);
        }
        state.bytes_written = 0;
        state.writes = 0;

        // Handle stays Invalid until the new file is open
        let sink = match self.open_sink(&target) {
            Ok(sink) => sink,
            Err(e) => {
                error!(writer = self.id.as_u64(), path = %target.display(), error = %e, "Failed to open new file");
                return RollOutcome {
                    archived,
                    current: None,
                    open_error: Some(e),
                    close_error,
                };
            }
        };
        state.handle = Handle::Open(sink);

        info!(
            writer = self.id.as_u64(),
            trigger = %trigger,
            from = %previous.display(),
            to = %target.display(),
            "Rolled over file"
        );

        RollOutcome {
            archived,
            current: Some(target),
            open_error: None,
            close_error,
        }
    }

    /// Forced rollover: always moves to a file that does not exist yet
    fn force_roll(
        &self,
        state: &mut RollState,
        trigger: RolloverTrigger,
    ) -> RolloverResult<RollOutcome> {
        if matches!(state.handle, Handle::Closed) {
            return Err(RolloverError::Closed);
        }
        let now = self.clock.now();
        let target = self.next_path(now, Some(&state.current_path), true)?;
        Ok(self.roll_to(state, now, target, trigger))
    }

    /// Timer-driven rollover; a no-op while the period is unchanged
    fn scheduled_rollover(&self) -> RolloverResult<bool> {
        let outcome = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let now = self.clock.now();
            let target = match state.handle {
                Handle::Closed => return Ok(false),
                // Never resume a file closed earlier in this period
                Handle::Invalid => self.next_path(now, None, true)?,
                Handle::Open(_) => {
                    if self.namer.render(now) == state.period_path {
                        return Ok(false);
                    }
                    self.next_path(now, Some(&state.current_path), false)?
                }
            };
            self.roll_to(state, now, target, RolloverTrigger::Scheduled)
        };
        self.complete(outcome)?;
        Ok(true)
    }

    /// Post-rollover work, then surface a failed open or close
    fn complete(&self, mut outcome: RollOutcome) -> RolloverResult<()> {
        let open_error = outcome.open_error.take();
        let close_error = outcome.close_error.take();
        self.after_rollover(outcome);
        match open_error.or(close_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Compression handoff and retention, outside the writer lock
    fn after_rollover(&self, outcome: RollOutcome) {
        if self.config.compress {
            if let Some(archived) = outcome.archived {
                match self.compressor.submit(archived) {
                    Submission::Accepted => {}
                    Submission::Rejected(path) => {
                        warn!(writer = self.id.as_u64(), path = %path.display(), "Archive left uncompressed");
                    }
                }
            }
        }

        if self.config.retention_days > 0 {
            let report = self.sweeper.sweep_at(
                self.namer.template(),
                self.config.retention_days,
                std::time::SystemTime::now(),
                outcome.current.as_deref(),
            );
            if let Err(e) = report {
                warn!(error = %e, "Retention sweep failed");
            }
        }
    }
}

/// A continuously open output that rolls over to dated files
pub struct RollingFileWriter {
    shared: Arc<Shared>,
    scheduler: Option<Arc<RolloverScheduler>>,
}

impl RollingFileWriter {
    /// Open a writer with default collaborators
    pub fn open(config: WriterConfig) -> RolloverResult<Self> {
        WriterBuilder::new(config).open()
    }

    pub fn builder(config: WriterConfig) -> WriterBuilder {
        WriterBuilder::new(config)
    }

    /// Write `bytes` to the current file
    ///
    /// If this pushes the byte counter to the size threshold, the file is
    /// closed (with these bytes in it) and a new one opened before
    /// returning.
    pub fn write(&self, bytes: &[u8]) -> RolloverResult<()> {
        let outcome = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let sink = match &mut state.handle {
                Handle::Open(sink) => sink,
                Handle::Invalid => {
                    return Err(RolloverError::NoActiveFile {
                        path: state.current_path.clone(),
                    })
                }
                Handle::Closed => return Err(RolloverError::Closed),
            };

            sink.write_all(bytes)
                .context(|| format!("writing to {}", state.current_path.display()))?;
            state.bytes_written += bytes.len() as u64;
            state.writes += 1;

            let flush_every = self.shared.config.flush_every_n;
            if flush_every > 0 && state.writes % flush_every == 0 {
                sink.flush()
                    .context(|| format!("flushing {}", state.current_path.display()))?;
            }

            match self.shared.config.max_file_size() {
                Some(max) if state.bytes_written >= max => {
                    Some(self.shared.force_roll(state, RolloverTrigger::Size)?)
                }
                _ => None,
            }
        };

        match outcome {
            Some(outcome) => self.shared.complete(outcome),
            None => Ok(()),
        }
    }

    /// Flush buffered bytes to the current file
    pub fn flush(&self) -> RolloverResult<()> {
        let mut state = self.shared.state.lock();
        let path = state.current_path.clone();
        match &mut state.handle {
            Handle::Open(sink) => sink
                .flush()
                .context(|| format!("flushing {}", path.display())),
            Handle::Invalid => Err(RolloverError::NoActiveFile { path }),
            Handle::Closed => Err(RolloverError::Closed),
        }
    }

    /// Close the current file, archive it and open a new one
    pub fn rollover(&self) -> RolloverResult<()> {
        let outcome = {
            let mut state = self.shared.state.lock();
            self.shared.force_roll(&mut state, RolloverTrigger::Manual)?
        };
        self.shared.complete(outcome)
    }

    /// Roll over if the clock has entered a new period
    ///
    /// This is what the scheduler runs; returns whether a new file was
    /// opened.
    pub fn scheduled_rollover(&self) -> RolloverResult<bool> {
        self.shared.scheduled_rollover()
    }

    /// Close and archive the current file without opening a new one
    ///
    /// Cancels the scheduler registration first. Closing twice is a no-op.
    pub fn close(&self) -> RolloverResult<()> {
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel(self.shared.id);
        }

        let (archived, result) = {
            let mut state = self.shared.state.lock();
            match std::mem::replace(&mut state.handle, Handle::Closed) {
                Handle::Open(sink) => {
                    let result = sink
                        .finish()
                        .context(|| format!("closing {}", state.current_path.display()));
                    let archived = self.shared.archive(&state.current_path);
                    info!(writer = self.shared.id.as_u64(), path = %state.current_path.display(), "Closed rolling file");
                    (archived, result)
                }
                Handle::Invalid | Handle::Closed => (None, Ok(())),
            }
        };

        self.shared.after_rollover(RollOutcome {
            archived,
            ..Default::default()
        });
        result
    }

    /// Path of the file open for writing, `None` once closed
    pub fn current_path(&self) -> Option<PathBuf> {
        let state = self.shared.state.lock();
        match state.handle {
            Handle::Closed => None,
            _ => Some(state.current_path.clone()),
        }
    }

    /// Bytes written since the last rollover
    pub fn bytes_written(&self) -> u64 {
        self.shared.state.lock().bytes_written
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.shared.state.lock().handle, Handle::Closed)
    }

    /// Whether a file is open and accepting writes
    pub fn is_writable(&self) -> bool {
        matches!(self.shared.state.lock().handle, Handle::Open(_))
    }

    pub fn config(&self) -> &WriterConfig {
        &self.shared.config
    }

    pub fn id(&self) -> WriterId {
        self.shared.id
    }

    /// The pool archives are compressed on
    pub fn compressor(&self) -> &Arc<ArchiveCompressor> {
        &self.shared.compressor
    }
}

impl Drop for RollingFileWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                error!(error = %e, "Failed to close rolling file on drop");
            }
        }
    }
}

impl fmt::Debug for RollingFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingFileWriter")
            .field("id", &self.shared.id)
            .field("template", &self.shared.config.path_template)
            .field("current_path", &self.current_path())
            .finish()
    }
}
