//! Output handle for the current file

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// The open write target, optionally buffered
#[derive(Debug)]
pub(crate) enum Sink {
    Buffered(BufWriter<File>),
    Direct(File),
}

impl Sink {
    /// Open `path` for writing
    ///
    /// With `append` false the file must not exist yet (`AlreadyExists`
    /// otherwise), so an existing file is never truncated.
    pub fn open(path: &Path, append: bool, buffer_size: usize) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        if append {
            options.create(true).append(true);
        } else {
            options.write(true).create_new(true);
        }
        let file = options.open(path)?;

        Ok(if buffer_size > 0 {
            Sink::Buffered(BufWriter::with_capacity(buffer_size, file))
        } else {
            Sink::Direct(file)
        })
    }

    /// Flush buffered bytes and sync the file, consuming the handle
    pub fn finish(self) -> io::Result<()> {
        let file = match self {
            Sink::Buffered(writer) => writer.into_inner().map_err(|e| e.into_error())?,
            Sink::Direct(file) => file,
        };
        file.sync_all()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Buffered(w) => w.write(buf),
            Sink::Direct(f) => f.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Sink::Buffered(w) => w.write_all(buf),
            Sink::Direct(f) => f.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Buffered(w) => w.flush(),
            Sink::Direct(f) => f.flush(),
        }
    }
}
