//! Utility functions and helpers
//!
//! Clock abstraction, timestamp helpers and atomic file operations.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write_then, atomic_write_with, commit_temp, list_temp_files, tmp_path_for};
pub use time::{whole_days_between, Clock, ManualClock, SystemClock};
