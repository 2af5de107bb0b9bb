//! Archive handling for rolled-over files
//!
//! - `ArchiveCompressor`: gzip compression on a bounded worker pool
//! - `RetentionSweeper`: deletion of files past the retention window
//!
//! # Layout
//!
//! ```text
//! out_2026_10_16.log                  live file (open for writing)
//!   │ rollover: close + rename
//!   ▼
//! archive.out_2026_10_16.log          archived, pending compression
//!   │ worker: gzip into .gz.tmp, delete source, rename
//!   ▼
//! archive.out_2026_10_16.log.gz       final archive
//!   │ retention sweep after N days
//!   ▼
//! (deleted)
//! ```

pub mod compressor;
pub mod retention;

pub use compressor::{
    compress, ArchiveCompressor, CompressorConfig, CompressorStats, SubmitPolicy, Submission,
};
pub use retention::{RetentionSweeper, SweepReport, TemplateMatcher};
