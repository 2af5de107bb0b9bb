//! Retention sweeping of old rolled files
//!
//! Files are matched by the literal text around the placeholder token, so
//! both live names (`out_<date>.log`) and archived names
//! (`archive.out_<date>.log.gz`) are recognised. Anything whose last
//! modification is strictly more than `retention_days` whole days ago is
//! deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::error::{RolloverError, RolloverResult};
use crate::naming::split_template;
use crate::utils::time::whole_days_between;

/// Recognises file names produced from one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatcher {
    prefix: String,
    suffix: String,
    archive_prefix: String,
}

impl TemplateMatcher {
    /// `None` when the template has no placeholder token
    pub fn new(template: &Path, archive_prefix: &str) -> Option<Self> {
        let name = template.file_name()?.to_str()?;
        let (prefix, suffix) = split_template(name)?;
        Some(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            archive_prefix: archive_prefix.to_string(),
        })
    }

    /// Live file name: starts with the prefix and has the suffix after it
    fn matches_live(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.contains(self.suffix.as_str()))
            .unwrap_or(false)
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.matches_live(name) {
            return true;
        }
        if self.archive_prefix.is_empty() {
            return false;
        }
        name.strip_prefix(self.archive_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .map(|rest| self.matches_live(rest))
            .unwrap_or(false)
    }
}

/// Result of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<RolloverError>,
}

/// Deletes rolled files older than a retention window
#[derive(Debug, Clone, Default)]
pub struct RetentionSweeper {
    archive_prefix: String,
}

impl RetentionSweeper {
    pub fn new(archive_prefix: impl Into<String>) -> Self {
        Self {
            archive_prefix: archive_prefix.into(),
        }
    }

    /// Sweep the template's directory using the current time
    pub fn sweep(&self, template: &Path, retention_days: u32) -> RolloverResult<SweepReport> {
        self.sweep_at(template, retention_days, SystemTime::now(), None)
    }

    /// Sweep relative to `now`, never touching `keep`
    ///
    /// No-op when `retention_days` is 0 or the template has no token. A
    /// failed delete is logged and recorded; the sweep carries on.
    pub fn sweep_at(
        &self,
        template: &Path,
        retention_days: u32,
        now: SystemTime,
        keep: Option<&Path>,
    ) -> RolloverResult<SweepReport> {
        let mut report = SweepReport::default();
        if retention_days == 0 {
            return Ok(report);
        }

        let Some(matcher) = TemplateMatcher::new(template, &self.archive_prefix) else {
            return Ok(report);
        };

        let dir = match template.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = fs::read_dir(&dir)
            .map_err(|e| RolloverError::io(format!("listing {}", dir.display()), e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !matcher.matches(name) || keep.map(|k| k == path).unwrap_or(false) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| {
                if m.is_file() {
                    m.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read file age");
                    continue;
                }
            };

            if whole_days_between(modified, now) <= u64::from(retention_days) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Deleted expired file");
                    report.deleted.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete expired file");
                    report.errors.push(RolloverError::Retention { path, source: e });
                }
            }
        }

        Ok(report)
    }
}
