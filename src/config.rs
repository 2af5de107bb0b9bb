//! Writer configuration
//!
//! [`WriterConfig`] is immutable once a writer is built. It can be
//! assembled in code, loaded from a JSON file, or read from `ROLLOVER_*`
//! environment variables.

use std::fmt::{self, Write};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{IoContext, RolloverError, RolloverResult};
use crate::utils::time::millis_to_datetime;

/// Default rollover period: 24h in milliseconds
pub const DEFAULT_ROLLOVER_PERIOD_MS: i64 = 1000 * 60 * 60 * 24;

/// Default date pattern, rendered in place of the placeholder token
pub const DEFAULT_DATE_FORMAT: &str = "%Y_%m_%d";

/// Default output buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default prefix for archived files
pub const DEFAULT_ARCHIVE_PREFIX: &str = "archive";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "ROLLOVER_";

/// Time zone used for rendering dates and locating midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZoneSpec {
    /// The process' local zone
    #[default]
    Local,
    Utc,
    /// A fixed offset from UTC, e.g. `+02:00`
    Fixed(FixedOffset),
    /// An IANA zone such as `Europe/Amsterdam`, following its DST rules
    Named(Tz),
}

impl TimeZoneSpec {
    /// Render `ts` in this zone using a strftime pattern
    ///
    /// The pattern must already have been validated with
    /// [`validate_date_format`].
    pub fn format(&self, ts: DateTime<Utc>, pattern: &str) -> String {
        match self {
            TimeZoneSpec::Local => render(&ts.with_timezone(&Local), pattern),
            TimeZoneSpec::Utc => render(&ts, pattern),
            TimeZoneSpec::Fixed(offset) => render(&ts.with_timezone(offset), pattern),
            TimeZoneSpec::Named(tz) => render(&ts.with_timezone(tz), pattern),
        }
    }

    /// First midnight strictly after `now` in this zone
    pub fn next_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeZoneSpec::Local => next_midnight_in(&Local, now),
            TimeZoneSpec::Utc => next_midnight_in(&Utc, now),
            TimeZoneSpec::Fixed(offset) => next_midnight_in(offset, now),
            TimeZoneSpec::Named(tz) => next_midnight_in(tz, now),
        }
    }
}

fn render<Tz>(ts: &DateTime<Tz>, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = String::new();
    // Cannot fail for a validated pattern
    let _ = write!(out, "{}", ts.format(pattern));
    out
}

fn next_midnight_in<Z: TimeZone>(tz: &Z, now: DateTime<Utc>) -> DateTime<Utc> {
    let fallback = now + chrono::Duration::days(1);
    let local_today = now.with_timezone(tz).date_naive();

    local_today
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}

impl FromStr for TimeZoneSpec {
    type Err = RolloverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        match lower.as_str() {
            "" | "local" => return Ok(TimeZoneSpec::Local),
            "utc" | "gmt" | "z" => return Ok(TimeZoneSpec::Utc),
            _ => {}
        }

        let offset = lower
            .strip_prefix("utc")
            .or_else(|| lower.strip_prefix("gmt"))
            .unwrap_or(&lower);
        if let Some(fixed) = parse_offset(offset) {
            return Ok(TimeZoneSpec::Fixed(fixed));
        }

        trimmed
            .parse::<Tz>()
            .map(TimeZoneSpec::Named)
            .map_err(|_| RolloverError::config(format!("Invalid time zone: {}", trimmed)))
    }
}

/// Parse `+hh:mm`, `-hh:mm`, `+hhmm` or `+hh`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        3 => (digits[..1].parse::<i32>().ok()?, digits[1..].parse::<i32>().ok()?),
        _ => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
    };

    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl TryFrom<String> for TimeZoneSpec {
    type Error = RolloverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeZoneSpec> for String {
    fn from(tz: TimeZoneSpec) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSpec::Local => write!(f, "local"),
            TimeZoneSpec::Utc => write!(f, "UTC"),
            TimeZoneSpec::Fixed(offset) => write!(f, "{}", offset),
            TimeZoneSpec::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Check that a strftime pattern is usable for file names
pub fn validate_date_format(pattern: &str) -> RolloverResult<()> {
    if pattern.is_empty() {
        return Err(RolloverError::config("Date format must not be empty"));
    }
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(RolloverError::config(format!(
            "Invalid date format: {}",
            pattern
        )));
    }

    // Specifiers like %D expand to separators even without a literal one
    let mut sample = String::new();
    if write!(sample, "{}", Utc::now().format(pattern)).is_err() {
        return Err(RolloverError::config(format!(
            "Invalid date format: {}",
            pattern
        )));
    }
    if sample.chars().any(std::path::is_separator) {
        return Err(RolloverError::config(format!(
            "Date format must not produce path separators: {} renders as {}",
            pattern, sample
        )));
    }
    Ok(())
}

/// Configuration for a [`RollingFileWriter`](crate::RollingFileWriter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriterConfig {
    /// File path whose name contains the `yyyy_mm_dd` placeholder
    #[serde(alias = "filename")]
    pub path_template: String,
    /// Whether an existing file at the computed path may be appended to
    pub append: bool,
    /// strftime pattern rendered in place of the placeholder
    pub date_format: String,
    pub time_zone: TimeZoneSpec,
    /// Output buffer size; 0 disables buffering
    pub buffer_size: usize,
    /// Flush every Nth write; 0 flushes only on rollover and close
    pub flush_every_n: u64,
    /// First scheduled rollover (epoch millis); non-positive means next midnight
    pub rollover_start_time_ms: i64,
    /// Scheduled rollover period; non-positive means 24h
    pub rollover_period_ms: i64,
    /// Size threshold for rollover; non-positive disables it
    pub max_file_size_bytes: i64,
    /// Prepended (with a dot) to archived file names; empty means no rename
    pub archive_prefix: String,
    /// Gzip archives after rollover
    pub compress: bool,
    /// Days to keep archives; 0 keeps them forever
    pub retention_days: u32,
    /// Write text payloads verbatim, without a line terminator
    pub binary: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            path_template: String::new(),
            append: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            time_zone: TimeZoneSpec::Local,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_every_n: 0,
            rollover_start_time_ms: -1,
            rollover_period_ms: DEFAULT_ROLLOVER_PERIOD_MS,
            max_file_size_bytes: -1,
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
            compress: true,
            retention_days: 0,
            binary: false,
        }
    }
}

impl WriterConfig {
    /// Create config for a template with all other options defaulted
    pub fn new(path_template: impl Into<String>) -> Self {
        Self {
            path_template: path_template.into(),
            ..Default::default()
        }
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    pub fn with_time_zone(mut self, time_zone: TimeZoneSpec) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_flush_every_n(mut self, n: u64) -> Self {
        self.flush_every_n = n;
        self
    }

    pub fn with_rollover_start_time_ms(mut self, start_ms: i64) -> Self {
        self.rollover_start_time_ms = start_ms;
        self
    }

    pub fn with_rollover_period_ms(mut self, period_ms: i64) -> Self {
        self.rollover_period_ms = period_ms;
        self
    }

    pub fn with_max_file_size_bytes(mut self, max: i64) -> Self {
        self.max_file_size_bytes = max;
        self
    }

    pub fn with_archive_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.archive_prefix = prefix.into();
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    /// Scheduled rollover period
    pub fn rollover_period(&self) -> Duration {
        if self.rollover_period_ms <= 0 {
            Duration::from_millis(DEFAULT_ROLLOVER_PERIOD_MS as u64)
        } else {
            Duration::from_millis(self.rollover_period_ms as u64)
        }
    }

    /// Explicit first rollover time, if one was configured
    pub fn rollover_start(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.rollover_start_time_ms)
    }

    /// Size threshold, if size-triggered rollover is enabled
    pub fn max_file_size(&self) -> Option<u64> {
        (self.max_file_size_bytes > 0).then_some(self.max_file_size_bytes as u64)
    }

    /// The template as a path
    pub fn template_path(&self) -> PathBuf {
        PathBuf::from(self.path_template.trim())
    }

    /// Directory the rolled files live in
    pub fn directory(&self) -> PathBuf {
        match self.template_path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Validate the configuration, surfacing problems as `Config` errors
    pub fn validate(&self) -> RolloverResult<()> {
        if self.path_template.trim().is_empty() {
            return Err(RolloverError::config("Invalid filename: template is empty"));
        }

        let template = self.template_path();
        if template.file_name().is_none() {
            return Err(RolloverError::config(format!(
                "Invalid filename: {} has no file name",
                template.display()
            )));
        }

        validate_date_format(&self.date_format)?;

        if self.archive_prefix.contains('/') {
            return Err(RolloverError::config(format!(
                "Archive prefix must not contain path separators: {}",
                self.archive_prefix
            )));
        }

        let dir = self.directory();
        let metadata = fs::metadata(&dir).map_err(|_| {
            RolloverError::config(format!("Cannot write into directory: {}", dir.display()))
        })?;
        if !metadata.is_dir() || metadata.permissions().readonly() {
            return Err(RolloverError::config(format!(
                "Cannot write into directory: {}",
                dir.display()
            )));
        }

        Ok(())
    }

    /// Load configuration from a JSON file (camelCase keys)
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> RolloverResult<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).context(|| format!("reading config {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build configuration from `ROLLOVER_*` environment variables
    ///
    /// `ROLLOVER_FILENAME` is required.
    pub fn from_env() -> RolloverResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        if config.path_template.trim().is_empty() {
            return Err(RolloverError::config(format!(
                "{}FILENAME is not set",
                ENV_PREFIX
            )));
        }
        Ok(config)
    }

    /// Layer `ROLLOVER_*` environment variables over this configuration
    pub fn apply_env_overrides(&mut self) -> RolloverResult<()> {
        self.apply_overrides_from(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Layer overrides from `lookup`, keyed by the variable name without prefix
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> RolloverResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FILENAME") {
            self.path_template = v;
        }
        if let Some(v) = lookup("APPEND") {
            self.append = parse_bool("APPEND", &v)?;
        }
        if let Some(v) = lookup("TIME_ZONE") {
            self.time_zone = v.parse()?;
        }
        if let Some(v) = lookup("DATE_FORMAT") {
            self.date_format = v;
        }
        if let Some(v) = lookup("BUFFER_SIZE") {
            self.buffer_size = parse_value("BUFFER_SIZE", &v)?;
        }
        if let Some(v) = lookup("FLUSH_EVERY_N") {
            self.flush_every_n = parse_value("FLUSH_EVERY_N", &v)?;
        }
        if let Some(v) = lookup("START_TIME_MS") {
            self.rollover_start_time_ms = parse_value("START_TIME_MS", &v)?;
        }
        if let Some(v) = lookup("PERIOD_MS") {
            self.rollover_period_ms = parse_value("PERIOD_MS", &v)?;
        }
        if let Some(v) = lookup("MAX_FILE_SIZE") {
            self.max_file_size_bytes = parse_value("MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("ARCHIVE_PREFIX") {
            self.archive_prefix = v;
        }
        if let Some(v) = lookup("COMPRESS") {
            self.compress = parse_bool("COMPRESS", &v)?;
        }
        if let Some(v) = lookup("RETENTION_DAYS") {
            self.retention_days = parse_value("RETENTION_DAYS", &v)?;
        }
        if let Some(v) = lookup("BINARY") {
            self.binary = parse_bool("BINARY", &v)?;
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> RolloverResult<T> {
    value.trim().parse().map_err(|_| {
        RolloverError::config(format!("{}{}: invalid value '{}'", ENV_PREFIX, key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> RolloverResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RolloverError::config(format!(
            "{}{}: expected a boolean, got '{}'",
            ENV_PREFIX, key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WriterConfig::new("logs/out_yyyy_mm_dd.log");
        assert!(config.append);
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.flush_every_n, 0);
        assert_eq!(config.rollover_period(), Duration::from_secs(86_400));
        assert!(config.rollover_start().is_none());
        assert!(config.max_file_size().is_none());
        assert_eq!(config.archive_prefix, "archive");
        assert!(config.compress);
        assert_eq!(config.retention_days, 0);
        assert!(!config.binary);
    }

    #[test]
    fn test_non_positive_period_means_24h() {
        let config = WriterConfig::new("x").with_rollover_period_ms(0);
        assert_eq!(config.rollover_period(), Duration::from_secs(86_400));
        let config = WriterConfig::new("x").with_rollover_period_ms(-10);
        assert_eq!(config.rollover_period(), Duration::from_secs(86_400));
        let config = WriterConfig::new("x").with_rollover_period_ms(1000);
        assert_eq!(config.rollover_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_ok() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("out_yyyy_mm_dd.log");
        let config = WriterConfig::new(template.to_string_lossy());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_blank_template() {
        let err = WriterConfig::new("   ").validate().unwrap_err();
        assert!(matches!(err, RolloverError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("missing").join("out_yyyy_mm_dd.log");
        let err = WriterConfig::new(template.to_string_lossy())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("Cannot write into directory"));
    }

    #[test]
    fn test_validate_rejects_bad_date_format() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("out_yyyy_mm_dd.log");
        let err = WriterConfig::new(template.to_string_lossy())
            .with_date_format("%Y_%Q")
            .validate()
            .unwrap_err();
        assert!(matches!(err, RolloverError::Config(_)));

        assert!(validate_date_format("").is_err());
        assert!(validate_date_format("%Y/%m").is_err());
        assert!(validate_date_format("%Y-%m-%d_%H%M%S%3f").is_ok());
        assert!(validate_date_format("%F").is_ok());
    }

    #[test]
    fn test_validate_rejects_expanding_separators() {
        for pattern in ["%D", "%x", "%Y_%D"] {
            let err = validate_date_format(pattern).unwrap_err();
            assert!(err.to_string().contains("path separators"), "{}", pattern);
        }

        let dir = TempDir::new().unwrap();
        let template = dir.path().join("out_yyyy_mm_dd.log");
        let err = WriterConfig::new(template.to_string_lossy())
            .with_date_format("%D")
            .validate()
            .unwrap_err();
        assert!(matches!(err, RolloverError::Config(_)));
    }

    #[test]
    fn test_time_zone_parsing() {
        assert_eq!("local".parse::<TimeZoneSpec>().unwrap(), TimeZoneSpec::Local);
        assert_eq!("UTC".parse::<TimeZoneSpec>().unwrap(), TimeZoneSpec::Utc);
        assert_eq!(
            "+02:00".parse::<TimeZoneSpec>().unwrap(),
            TimeZoneSpec::Fixed(FixedOffset::east_opt(7200).unwrap())
        );
        assert_eq!(
            "UTC-0530".parse::<TimeZoneSpec>().unwrap(),
            TimeZoneSpec::Fixed(FixedOffset::west_opt(5 * 3600 + 1800).unwrap())
        );
        assert_eq!(
            "Europe/Amsterdam".parse::<TimeZoneSpec>().unwrap(),
            TimeZoneSpec::Named(chrono_tz::Europe::Amsterdam)
        );
        assert!("Mars/Olympus".parse::<TimeZoneSpec>().is_err());
        assert!("+25:00".parse::<TimeZoneSpec>().is_err());
    }

    #[test]
    fn test_format_in_fixed_zone() {
        // 2024-03-01T23:30:00Z
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let plus_two = TimeZoneSpec::Fixed(FixedOffset::east_opt(7200).unwrap());
        assert_eq!(TimeZoneSpec::Utc.format(ts, "%Y_%m_%d"), "2024_03_01");
        assert_eq!(plus_two.format(ts, "%Y_%m_%d"), "2024_03_02");
    }

    #[test]
    fn test_named_zone_follows_dst() {
        let amsterdam: TimeZoneSpec = "Europe/Amsterdam".parse().unwrap();
        assert_eq!(amsterdam.to_string(), "Europe/Amsterdam");

        // Summer: UTC+2, so 22:30Z is already the next day
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 22, 30, 0).unwrap();
        assert_eq!(amsterdam.format(summer, "%Y_%m_%d"), "2024_07_02");

        // Clocks go forward on 2024-03-31
        let before = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        assert_eq!(
            amsterdam.next_midnight(before),
            Utc.with_ymd_and_hms(2024, 3, 30, 23, 0, 0).unwrap()
        );
        let after = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            amsterdam.next_midnight(after),
            Utc.with_ymd_and_hms(2024, 3, 31, 22, 0, 0).unwrap()
        );

        let config: WriterConfig =
            serde_json::from_str(r#"{"filename": "x_yyyy_mm_dd", "timeZone": "Europe/Amsterdam"}"#)
                .unwrap();
        assert_eq!(config.time_zone, amsterdam);
    }

    #[test]
    fn test_next_midnight() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let next = TimeZoneSpec::Utc.next_midnight(ts);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());

        let plus_two = TimeZoneSpec::Fixed(FixedOffset::east_opt(7200).unwrap());
        // Local time is already 01:30 on the 2nd, so the next midnight is the 3rd
        let next = plus_two.next_midnight(ts);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 22, 0, 0).unwrap());

        let local_next = TimeZoneSpec::Local.next_midnight(ts);
        assert!(local_next > ts);
        assert_eq!(local_next.with_timezone(&Local).hour(), 0);
    }

    #[test]
    fn test_json_roundtrip_uses_camel_case() {
        let json = r#"{
            "filename": "/var/log/app_yyyy_mm_dd.log",
            "append": false,
            "timeZone": "UTC",
            "maxFileSizeBytes": 1024,
            "retentionDays": 7
        }"#;
        let config: WriterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.path_template, "/var/log/app_yyyy_mm_dd.log");
        assert!(!config.append);
        assert_eq!(config.time_zone, TimeZoneSpec::Utc);
        assert_eq!(config.max_file_size(), Some(1024));
        assert_eq!(config.retention_days, 7);
        // Untouched fields keep their defaults
        assert!(config.compress);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["pathTemplate"], "/var/log/app_yyyy_mm_dd.log");
        assert_eq!(value["timeZone"], "UTC");
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rollover.json");
        fs::write(&path, r#"{"pathTemplate": "out_yyyy_mm_dd.log", "compress": false}"#).unwrap();

        let config = WriterConfig::from_json_file(&path).unwrap();
        assert_eq!(config.path_template, "out_yyyy_mm_dd.log");
        assert!(!config.compress);

        let err = WriterConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, RolloverError::Io { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FILENAME", "/tmp/x_yyyy_mm_dd.log"),
            ("APPEND", "false"),
            ("MAX_FILE_SIZE", "2048"),
            ("COMPRESS", "0"),
            ("TIME_ZONE", "+01:00"),
            ("RETENTION_DAYS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = WriterConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.path_template, "/tmp/x_yyyy_mm_dd.log");
        assert!(!config.append);
        assert_eq!(config.max_file_size(), Some(2048));
        assert!(!config.compress);
        assert_eq!(config.retention_days, 3);
        assert!(matches!(config.time_zone, TimeZoneSpec::Fixed(_)));
    }

    #[test]
    fn test_overrides_reject_garbage() {
        let mut config = WriterConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == "APPEND").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ROLLOVER_APPEND"));

        let err = config
            .apply_overrides_from(|k| (k == "BUFFER_SIZE").then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, RolloverError::Config(_)));
    }
}
