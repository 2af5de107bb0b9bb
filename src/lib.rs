//! Rolling File Writer
//!
//! A continuously open output that rolls over to a new, date-named file on
//! a schedule or when it grows past a size threshold. Closed files are
//! renamed under an archive prefix, gzip-compressed in the background and
//! deleted once they fall outside the retention window.
//!
//! # Features
//!
//! - **Time rollover**: one shared timer thread drives every writer
//! - **Size rollover**: checked in-line after each write
//! - **No overwrites**: colliding names get a sequence suffix
//! - **Background compression**: bounded worker pool, crash-safe `.gz.tmp`
//! - **Retention**: age-based cleanup of live and archived files
//!
//! # Modules
//!
//! - `config`: Writer configuration, defaults and loading
//! - `naming`: File name templating
//! - `writer`: The rolling writer itself
//! - `scheduler`: Shared periodic rollover timer
//! - `archive`: Compression and retention
//! - `handler`: Text / byte payload adaptation
//! - `utils`: Clocks and atomic file helpers
//!
//! # Example
//!
//! ```no_run
//! use rolling_file::{RollingFileWriter, WriterConfig};
//!
//! fn main() -> rolling_file::RolloverResult<()> {
//!     let config = WriterConfig::new("/var/log/app/out_yyyy_mm_dd.log")
//!         .with_max_file_size_bytes(64 * 1024 * 1024)
//!         .with_retention_days(14);
//!     let writer = RollingFileWriter::open(config)?;
//!     writer.write(b"hello\n")?;
//!     writer.close()
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod handler;
pub mod naming;
pub mod scheduler;
pub mod utils;
pub mod writer;

// Re-export commonly used items at crate root
pub use archive::{ArchiveCompressor, CompressorConfig, RetentionSweeper, SubmitPolicy, Submission};
pub use config::{TimeZoneSpec, WriterConfig};
pub use error::{RolloverError, RolloverResult};
pub use handler::{Payload, RolloverMessageHandler};
pub use naming::FileNamer;
pub use scheduler::{RolloverScheduler, WriterId};
pub use writer::{RollingFileWriter, RolloverTrigger, WriterBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
