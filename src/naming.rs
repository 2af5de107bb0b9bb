//! File name templating
//!
//! A template such as `/var/log/out_yyyy_mm_dd.log` carries the
//! placeholder token `yyyy_mm_dd` (matched case-insensitively) in its file
//! name. Rendering replaces exactly that span with the formatted
//! timestamp; the literal text before and after it is preserved.
//!
//! Rendering is pure: the same timestamp always yields the same path,
//! which is how the writer tells a new period from the current one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{TimeZoneSpec, WriterConfig};
use crate::utils::atomic::tmp_path_for;

/// Placeholder substituted with the formatted date
pub const DATE_TOKEN: &str = "yyyy_mm_dd";

/// Extension appended to compressed archives
pub const GZIP_EXTENSION: &str = ".gz";

/// Locate the placeholder in a file name, case-insensitively
///
/// Returns the literal prefix and suffix around the token.
pub fn split_template(file_name: &str) -> Option<(&str, &str)> {
    // ASCII lowercasing keeps byte offsets stable
    let start = file_name.to_ascii_lowercase().find(DATE_TOKEN)?;
    let end = start + DATE_TOKEN.len();
    Some((&file_name[..start], &file_name[end..]))
}

/// Render `template` for `timestamp`
///
/// A template without the placeholder is returned unchanged.
pub fn render(
    template: &Path,
    date_format: &str,
    time_zone: TimeZoneSpec,
    timestamp: DateTime<Utc>,
) -> PathBuf {
    let Some(file_name) = template.file_name().and_then(|n| n.to_str()) else {
        return template.to_path_buf();
    };

    match split_template(file_name) {
        Some((prefix, suffix)) => {
            let date = time_zone.format(timestamp, date_format);
            template.with_file_name(format!("{}{}{}", prefix, date, suffix))
        }
        None => template.to_path_buf(),
    }
}

/// Name of `file_name` once archived under `archive_prefix`
pub fn archive_name(file_name: &str, archive_prefix: &str) -> String {
    if archive_prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}.{}", archive_prefix, file_name)
    }
}

/// Path a live file is moved to when archived
pub fn archive_path(live: &Path, archive_prefix: &str) -> PathBuf {
    match live.file_name().and_then(|n| n.to_str()) {
        Some(name) => live.with_file_name(archive_name(name, archive_prefix)),
        None => live.to_path_buf(),
    }
}

/// Path of the gzip-compressed form of `path`
pub fn gzip_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(GZIP_EXTENSION);
    PathBuf::from(name)
}

/// Renders concrete file paths for one writer's template
#[derive(Debug, Clone)]
pub struct FileNamer {
    template: PathBuf,
    date_format: String,
    time_zone: TimeZoneSpec,
    archive_prefix: String,
}

impl FileNamer {
    pub fn new(config: &WriterConfig) -> Self {
        Self {
            template: config.template_path(),
            date_format: config.date_format.clone(),
            time_zone: config.time_zone,
            archive_prefix: config.archive_prefix.clone(),
        }
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Whether the template can rotate at all
    pub fn has_date_token(&self) -> bool {
        self.template_name()
            .map(|name| split_template(name).is_some())
            .unwrap_or(false)
    }

    fn template_name(&self) -> Option<&str> {
        self.template.file_name().and_then(|n| n.to_str())
    }

    /// Path for `timestamp`
    pub fn render(&self, timestamp: DateTime<Utc>) -> PathBuf {
        render(&self.template, &self.date_format, self.time_zone, timestamp)
    }

    /// Path for `timestamp` with a sequence number after the date
    ///
    /// Sequence 0 is the plain rendered path; `n > 0` yields
    /// `<prefix><date>.<n><suffix>`. Templates without a placeholder get
    /// the sequence appended to the whole name.
    pub fn render_sequenced(&self, timestamp: DateTime<Utc>, sequence: u32) -> PathBuf {
        if sequence == 0 {
            return self.render(timestamp);
        }

        let Some(name) = self.template_name() else {
            return self.template.clone();
        };

        let file_name = match split_template(name) {
            Some((prefix, suffix)) => {
                let date = self.time_zone.format(timestamp, &self.date_format);
                format!("{}{}.{}{}", prefix, date, sequence, suffix)
            }
            None => format!("{}.{}", name, sequence),
        };
        self.template.with_file_name(file_name)
    }

    /// Where `live` goes once closed (before compression)
    pub fn archive_path(&self, live: &Path) -> PathBuf {
        archive_path(live, &self.archive_prefix)
    }

    /// Whether an archive for the live path `live` already exists
    ///
    /// A compression in flight (`.gz.tmp`) counts. With an empty archive
    /// prefix the raw archive and the live file share a name, so only the
    /// compressed forms count.
    pub fn archive_exists(&self, live: &Path) -> bool {
        let archived = self.archive_path(live);
        let gz = gzip_path(&archived);
        if gz.exists() || tmp_path_for(&gz).exists() {
            return true;
        }
        !self.archive_prefix.is_empty() && archived.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 13, 45, 7).unwrap()
    }

    #[test]
    fn test_split_template_case_insensitive() {
        assert_eq!(split_template("out_yyyy_mm_dd.log"), Some(("out_", ".log")));
        assert_eq!(split_template("out_YYYY_MM_DD.log"), Some(("out_", ".log")));
        assert_eq!(split_template("Out_YyYy_mM_dD"), Some(("Out_", "")));
        assert_eq!(split_template("out.log"), None);
    }

    #[test]
    fn test_render_replaces_token_span() {
        let path = render(
            Path::new("/var/log/out_YYYY_MM_DD.log"),
            "%Y_%m_%d",
            TimeZoneSpec::Utc,
            ts(),
        );
        assert_eq!(path, PathBuf::from("/var/log/out_2026_10_16.log"));
    }

    #[test]
    fn test_render_preserves_literals_and_custom_format() {
        let path = render(
            Path::new("data/pre-yyyy_mm_dd-post.txt"),
            "%Y%m%d-%H%M%S",
            TimeZoneSpec::Utc,
            ts(),
        );
        assert_eq!(path, PathBuf::from("data/pre-20261016-134507-post.txt"));
    }

    #[test]
    fn test_render_without_token_is_identity() {
        let template = Path::new("/var/log/static.log");
        assert_eq!(
            render(template, "%Y_%m_%d", TimeZoneSpec::Utc, ts()),
            template.to_path_buf()
        );
    }

    #[test]
    fn test_render_only_touches_file_name() {
        // A token in the directory part is not substituted
        let path = render(
            Path::new("/yyyy_mm_dd/out_yyyy_mm_dd"),
            "%Y",
            TimeZoneSpec::Utc,
            ts(),
        );
        assert_eq!(path, PathBuf::from("/yyyy_mm_dd/out_2026"));
    }

    #[test]
    fn test_render_sequenced() {
        let config = WriterConfig::new("/logs/out_yyyy_mm_dd.log").with_time_zone(TimeZoneSpec::Utc);
        let namer = FileNamer::new(&config);

        assert_eq!(namer.render_sequenced(ts(), 0), namer.render(ts()));
        assert_eq!(
            namer.render_sequenced(ts(), 3),
            PathBuf::from("/logs/out_2026_10_16.3.log")
        );

        let plain = FileNamer::new(&WriterConfig::new("/logs/static.log"));
        assert!(!plain.has_date_token());
        assert_eq!(
            plain.render_sequenced(ts(), 2),
            PathBuf::from("/logs/static.log.2")
        );
    }

    #[test]
    fn test_archive_paths() {
        let live = Path::new("/logs/out_2026_10_16.log");
        assert_eq!(
            archive_path(live, "archive"),
            PathBuf::from("/logs/archive.out_2026_10_16.log")
        );
        assert_eq!(archive_path(live, ""), live.to_path_buf());
        assert_eq!(
            gzip_path(&archive_path(live, "archive")),
            PathBuf::from("/logs/archive.out_2026_10_16.log.gz")
        );
    }

    #[test]
    fn test_archive_exists() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("out_yyyy_mm_dd.log");
        let live = dir.path().join("out_2026_10_16.log");

        let namer = FileNamer::new(&WriterConfig::new(template.to_string_lossy()));
        assert!(!namer.archive_exists(&live));
        fs::write(dir.path().join("archive.out_2026_10_16.log.gz.tmp"), b"x").unwrap();
        assert!(namer.archive_exists(&live));
        fs::remove_file(dir.path().join("archive.out_2026_10_16.log.gz.tmp")).unwrap();
        fs::write(dir.path().join("archive.out_2026_10_16.log.gz"), b"x").unwrap();
        assert!(namer.archive_exists(&live));

        let unprefixed = FileNamer::new(
            &WriterConfig::new(template.to_string_lossy()).with_archive_prefix(""),
        );
        fs::write(&live, b"live").unwrap();
        // The live file itself is not an archive
        assert!(!unprefixed.archive_exists(&live));
        fs::write(dir.path().join("out_2026_10_16.log.gz"), b"x").unwrap();
        assert!(unprefixed.archive_exists(&live));
    }
}
