//! Asynchronous gzip compression of archived files
//!
//! Closed files are handed to a small pool of worker threads through a
//! bounded queue. A job streams the source into `<file>.gz.tmp`, deletes
//! the source, then renames the temp file to `<file>.gz`. Failures are
//! logged and leave the uncompressed archive in place.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{RolloverError, RolloverResult};
use crate::naming::{gzip_path, GZIP_EXTENSION};
use crate::utils::atomic::{self, atomic_write_then, TMP_EXTENSION};

/// What `submit` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitPolicy {
    /// Wait for room in the queue
    #[default]
    Block,
    /// Refuse the job; the file stays uncompressed
    Reject,
}

/// Worker pool sizing
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub policy: SubmitPolicy,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            policy: SubmitPolicy::Block,
        }
    }
}

/// Outcome of handing a file to the pool
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Rejected(PathBuf),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted)
    }
}

/// Counters for finished jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressorStats {
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Tracker {
    pending: Mutex<usize>,
    idle: Condvar,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Tracker {
    fn begin(&self) {
        *self.pending.lock() += 1;
    }

    fn finish(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn cancel(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Compress `path` to `path.gz`, removing the source on success
///
/// The compressed bytes are fully written and synced to `path.gz.tmp`
/// before the source is deleted, and only then renamed into place.
pub fn compress(path: &Path) -> RolloverResult<PathBuf> {
    let to_error = |source: io::Error| RolloverError::Compression {
        path: path.to_path_buf(),
        source,
    };

    if !path.is_file() {
        return Err(to_error(io::Error::new(
            io::ErrorKind::NotFound,
            "source file doesn't exist",
        )));
    }

    let dest = gzip_path(path);
    atomic_write_then(
        &dest,
        |file| {
            // Stream the source through the encoder into <dest>.tmp
            let mut source = File::open(path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            io::copy(&mut source, &mut encoder)?;
            encoder.finish()?;
            Ok(())
        },
        // Temp file is complete and synced; only now drop the source
        || fs::remove_file(path),
    )
    .map_err(to_error)?;

    Ok(dest)
}

/// Bounded pool of compression workers
pub struct ArchiveCompressor {
    sender: Option<SyncSender<PathBuf>>,
    workers: Vec<JoinHandle<()>>,
    tracker: Arc<Tracker>,
    policy: SubmitPolicy,
}

impl ArchiveCompressor {
    /// Start the worker threads
    pub fn new(config: CompressorConfig) -> RolloverResult<Self> {
        let worker_count = config.workers.max(1);
        let (sender, receiver) = mpsc::sync_channel::<PathBuf>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let tracker = Arc::new(Tracker::default());

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let tracker = Arc::clone(&tracker);
            let handle = thread::Builder::new()
                .name(format!("archive-compressor-{}", i))
                .spawn(move || worker_loop(receiver, tracker))
                .map_err(|e| RolloverError::io("spawning compressor worker", e))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            tracker,
            policy: config.policy,
        })
    }

    /// Queue `path` for compression
    ///
    /// Never runs the compression on the calling thread.
    pub fn submit(&self, path: PathBuf) -> Submission {
        let Some(sender) = self.sender.as_ref() else {
            return self.reject(path, "compressor is shut down");
        };

        self.tracker.begin();
        let result = match self.policy {
            SubmitPolicy::Block => sender.send(path).map_err(|e| e.0),
            SubmitPolicy::Reject => sender.try_send(path).map_err(|e| match e {
                TrySendError::Full(p) | TrySendError::Disconnected(p) => p,
            }),
        };

        match result {
            Ok(()) => Submission::Accepted,
            Err(path) => {
                self.tracker.cancel();
                self.reject(path, "compression queue is full")
            }
        }
    }

    fn reject(&self, path: PathBuf, reason: &str) -> Submission {
        self.tracker.rejected.fetch_add(1, Ordering::SeqCst);
        warn!(
            path = %path.display(),
            reason,
            "Compression rejected, archive stays uncompressed"
        );
        Submission::Rejected(path)
    }

    /// Block until no accepted job is queued or running
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.tracker.pending.lock();
        while *pending > 0 {
            if self.tracker.idle.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }

    pub fn stats(&self) -> CompressorStats {
        CompressorStats {
            completed: self.tracker.completed.load(Ordering::SeqCst),
            failed: self.tracker.failed.load(Ordering::SeqCst),
            rejected: self.tracker.rejected.load(Ordering::SeqCst),
        }
    }

    /// Finish or discard compression interrupted by a crash
    ///
    /// For every `*.gz.tmp` in `dir` accepted by `belongs`: if its source
    /// still exists the temp file is incomplete, so it is removed and the
    /// source queued again; otherwise the temp file is complete and is
    /// renamed to its final `.gz` name. Returns the number of files handled.
    pub fn recover_interrupted<F>(&self, dir: &Path, belongs: F) -> RolloverResult<usize>
    where
        F: Fn(&str) -> bool,
    {
        let suffix = format!("{}{}", GZIP_EXTENSION, TMP_EXTENSION);
        let leftovers = atomic::list_temp_files(dir, &suffix)
            .map_err(|e| RolloverError::io(format!("listing {}", dir.display()), e))?;

        let mut handled = 0;
        for tmp in leftovers {
            let name = tmp.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if !belongs(name) {
                continue;
            }

            let Some(source) = name
                .strip_suffix(&suffix)
                .map(|source_name| tmp.with_file_name(source_name))
            else {
                continue;
            };

            if source.exists() {
                match fs::remove_file(&tmp) {
                    Ok(()) => {
                        warn!(tmp = %tmp.display(), "Discarded incomplete compression output");
                        if let Submission::Rejected(source) = self.submit(source) {
                            warn!(path = %source.display(), "Interrupted archive left uncompressed");
                        }
                    }
                    Err(e) => {
                        error!(tmp = %tmp.display(), error = %e, "Failed to remove incomplete compression output");
                        continue;
                    }
                }
            } else {
                match atomic::commit_temp(&tmp) {
                    Ok(done) => info!(path = %done.display(), "Completed interrupted compression"),
                    Err(e) => {
                        error!(tmp = %tmp.display(), error = %e, "Failed to finish interrupted compression");
                        continue;
                    }
                }
            }
            handled += 1;
        }

        Ok(handled)
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<PathBuf>>>, tracker: Arc<Tracker>) {
    loop {
        let job = receiver.lock().recv();
        let Ok(path) = job else {
            break;
        };

        debug!(path = %path.display(), "Started compressing file");
        match compress(&path) {
            Ok(dest) => {
                debug!(path = %dest.display(), "Finished compressing file");
                tracker.finish(true);
            }
            Err(e) => {
                error!(error = %e, "Compression failed");
                tracker.finish(false);
            }
        }
    }
}

impl Drop for ArchiveCompressor {
    /// Closes the queue and waits for queued jobs to finish
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Compressor worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_compress_roundtrip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("archive.out.log");
        let content: Vec<u8> = (0..50_000u32).flat_map(|i| i.to_le_bytes()).collect();
        fs::write(&source, &content).unwrap();

        let dest = compress(&source).unwrap();

        assert_eq!(dest, dir.path().join("archive.out.log.gz"));
        assert!(!source.exists());
        assert!(!dir.path().join("archive.out.log.gz.tmp").exists());
        assert_eq!(gunzip(&dest), content);
    }

    #[test]
    fn test_compress_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = compress(&dir.path().join("nope.log")).unwrap_err();
        assert!(matches!(err, RolloverError::Compression { .. }));
    }

    #[test]
    fn test_pool_compresses_submitted_files() {
        let dir = TempDir::new().unwrap();
        let pool = ArchiveCompressor::new(CompressorConfig::default()).unwrap();

        for i in 0..5 {
            let path = dir.path().join(format!("f{}.log", i));
            fs::write(&path, format!("content {}", i)).unwrap();
            assert!(pool.submit(path).is_accepted());
        }

        assert!(pool.wait_idle(Duration::from_secs(10)));
        for i in 0..5 {
            let gz = dir.path().join(format!("f{}.log.gz", i));
            assert_eq!(gunzip(&gz), format!("content {}", i).into_bytes());
        }
        assert_eq!(pool.stats().completed, 5);
    }

    #[test]
    fn test_failed_job_is_counted_not_propagated() {
        let dir = TempDir::new().unwrap();
        let pool = ArchiveCompressor::new(CompressorConfig::default()).unwrap();

        assert!(pool.submit(dir.path().join("missing.log")).is_accepted());
        assert!(pool.wait_idle(Duration::from_secs(10)));
        assert_eq!(pool.stats().failed, 1);
    }

    #[test]
    fn test_drop_drains_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.log");
        fs::write(&path, "late").unwrap();

        let pool = ArchiveCompressor::new(CompressorConfig {
            workers: 1,
            queue_capacity: 4,
            policy: SubmitPolicy::Block,
        })
        .unwrap();
        assert!(pool.submit(path.clone()).is_accepted());
        drop(pool);

        assert!(!path.exists());
        assert!(dir.path().join("late.log.gz").exists());
    }

    #[test]
    fn test_reject_policy_leaves_file_uncompressed() {
        let dir = TempDir::new().unwrap();

        // Large, poorly compressible file keeps the only worker busy
        let big = dir.path().join("big.log");
        let mut seed = 0x2545_f491_u32;
        let noise: Vec<u8> = (0..16 * 1024 * 1024)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed as u8
            })
            .collect();
        fs::write(&big, &noise).unwrap();

        let pool = ArchiveCompressor::new(CompressorConfig {
            workers: 1,
            queue_capacity: 1,
            policy: SubmitPolicy::Reject,
        })
        .unwrap();
        assert!(pool.submit(big.clone()).is_accepted());

        let mut rejected = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("small{}.log", i));
            fs::write(&path, "small").unwrap();
            if let Submission::Rejected(path) = pool.submit(path) {
                rejected.push(path);
            }
        }

        // One queue slot: at most one small file fits behind the big one
        assert!(rejected.len() >= 3, "rejected {:?}", rejected);
        assert!(pool.wait_idle(Duration::from_secs(60)));

        let stats = pool.stats();
        assert_eq!(stats.rejected, rejected.len() as u64);
        assert_eq!(stats.completed as usize, 5 - rejected.len());
        for path in &rejected {
            assert_eq!(fs::read_to_string(path).unwrap(), "small");
            assert!(!gzip_path(path).exists());
        }
        assert_eq!(gunzip(&dir.path().join("big.log.gz")), noise);
    }

    #[test]
    fn test_recover_interrupted() {
        let dir = TempDir::new().unwrap();

        // Crash after the source was deleted: tmp is complete
        let complete_tmp = dir.path().join("archive.out_a.log.gz.tmp");
        atomic::atomic_write_with(dir.path().join("scratch.gz"), |f| {
            let mut enc = GzEncoder::new(f, Compression::default());
            io::Write::write_all(&mut enc, b"alpha")?;
            enc.finish()?;
            Ok(())
        })
        .unwrap();
        fs::rename(dir.path().join("scratch.gz"), &complete_tmp).unwrap();

        // Crash mid-write: source still present, tmp is garbage
        let source = dir.path().join("archive.out_b.log");
        fs::write(&source, b"beta").unwrap();
        fs::write(dir.path().join("archive.out_b.log.gz.tmp"), b"partial").unwrap();

        // Not ours
        fs::write(dir.path().join("other.gz.tmp"), b"x").unwrap();

        let pool = ArchiveCompressor::new(CompressorConfig::default()).unwrap();
        let handled = pool
            .recover_interrupted(dir.path(), |name| name.starts_with("archive.out_"))
            .unwrap();
        assert_eq!(handled, 2);
        assert!(pool.wait_idle(Duration::from_secs(10)));

        assert_eq!(gunzip(&dir.path().join("archive.out_a.log.gz")), b"alpha");
        assert_eq!(gunzip(&dir.path().join("archive.out_b.log.gz")), b"beta");
        assert!(!source.exists());
        assert!(dir.path().join("other.gz.tmp").exists());
    }
}
