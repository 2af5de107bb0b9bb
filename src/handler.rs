//! Message adaptation onto a rolling writer
//!
//! Inbound messages carry either text or raw bytes. Text is written with a
//! trailing newline unless the writer is configured for binary output;
//! bytes are written verbatim. Any other payload shape is rejected.

use std::io::BufRead;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::error::{IoContext, RolloverError, RolloverResult};
use crate::writer::RollingFileWriter;

/// A single write request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Decode a JSON value: a string is text, an array of 0-255 integers is
    /// bytes
    pub fn from_json(value: &Value) -> RolloverResult<Self> {
        match value {
            Value::String(text) => Ok(Payload::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            RolloverError::UnsupportedPayload(format!(
                                "byte array element out of range: {}",
                                item
                            ))
                        })
                })
                .collect::<RolloverResult<Vec<u8>>>()
                .map(Payload::Bytes),
            other => Err(RolloverError::UnsupportedPayload(format!(
                "expected a string or byte array, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Interpret one input line: JSON payload if it parses, raw text otherwise
    pub fn from_line(line: &str) -> RolloverResult<Self> {
        match serde_json::from_str::<Value>(line) {
            Ok(value @ (Value::String(_) | Value::Array(_))) => Payload::from_json(&value),
            Ok(_) | Err(_) => Ok(Payload::Text(line.to_string())),
        }
    }

    /// Bytes to write for this payload
    fn encode(self, binary: bool) -> Vec<u8> {
        match self {
            Payload::Text(text) if binary => text.into_bytes(),
            Payload::Text(text) => {
                let mut bytes = text.into_bytes();
                bytes.push(b'\n');
                bytes
            }
            Payload::Bytes(bytes) => bytes,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Owns a writer between `start()` and `stop()` and feeds it payloads
pub struct RolloverMessageHandler {
    config: WriterConfig,
    writer: Mutex<Option<RollingFileWriter>>,
}

impl RolloverMessageHandler {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Open the writer; starting twice is a no-op
    pub fn start(&self) -> RolloverResult<()> {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            *writer = Some(RollingFileWriter::open(self.config.clone())?);
            info!(template = %self.config.path_template, "Message handler started");
        }
        Ok(())
    }

    /// Close the writer, archiving its current file
    pub fn stop(&self) -> RolloverResult<()> {
        let Some(writer) = self.writer.lock().take() else {
            return Ok(());
        };
        writer.close()?;
        info!(template = %self.config.path_template, "Message handler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Current file of the running writer
    pub fn current_path(&self) -> Option<std::path::PathBuf> {
        self.writer.lock().as_ref().and_then(|w| w.current_path())
    }

    /// Write one payload
    pub fn handle(&self, payload: impl Into<Payload>) -> RolloverResult<()> {
        let writer = self.writer.lock();
        let writer = writer.as_ref().ok_or(RolloverError::NotRunning)?;
        writer.write(&payload.into().encode(self.config.binary))
    }

    /// Decode and write a JSON value
    pub fn handle_json(&self, value: &Value) -> RolloverResult<()> {
        self.handle(Payload::from_json(value)?)
    }

    /// Feed every non-empty line of `reader` to the writer until EOF
    ///
    /// Rejected payloads are logged and skipped; writer failures end the
    /// loop. Returns the number of payloads written.
    pub fn run_lines<R: BufRead>(&self, reader: R) -> RolloverResult<u64> {
        let mut written = 0u64;
        for line in reader.lines() {
            let line = line.context(|| "reading input".to_string())?;
            let trimmed = line.trim_end_matches('\r');
            if trimmed.is_empty() {
                continue;
            }

            match Payload::from_line(trimmed).and_then(|payload| self.handle(payload)) {
                Ok(()) => written += 1,
                Err(RolloverError::UnsupportedPayload(reason)) => {
                    warn!(reason = %reason, "Skipped unsupported payload");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(written, "Input exhausted");
        Ok(written)
    }
}

impl Drop for RolloverMessageHandler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Failed to stop message handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeZoneSpec;
    use serde_json::json;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn handler_in(dir: &TempDir, binary: bool) -> RolloverMessageHandler {
        let config = WriterConfig::new(dir.path().join("msg_yyyy_mm_dd.log").to_string_lossy())
            .with_time_zone(TimeZoneSpec::Utc)
            .with_compress(false)
            .with_buffer_size(0)
            .with_binary(binary);
        RolloverMessageHandler::new(config)
    }

    #[test]
    fn test_payload_from_json() {
        assert_eq!(
            Payload::from_json(&json!("hi")).unwrap(),
            Payload::Text("hi".to_string())
        );
        assert_eq!(
            Payload::from_json(&json!([104, 105, 0, 255])).unwrap(),
            Payload::Bytes(vec![104, 105, 0, 255])
        );
        assert_eq!(Payload::from_json(&json!([])).unwrap(), Payload::Bytes(vec![]));
    }

    #[test]
    fn test_payload_rejects_other_shapes() {
        for value in [json!(42), json!({"a": 1}), json!(null), json!(true), json!([1, 256]), json!([-1]), json!(["x"])] {
            let err = Payload::from_json(&value).unwrap_err();
            assert!(matches!(err, RolloverError::UnsupportedPayload(_)), "{}", value);
        }
    }

    #[test]
    fn test_payload_from_line() {
        assert_eq!(Payload::from_line("plain text").unwrap(), Payload::Text("plain text".into()));
        assert_eq!(Payload::from_line("\"quoted\"").unwrap(), Payload::Text("quoted".into()));
        assert_eq!(Payload::from_line("[65,66]").unwrap(), Payload::Bytes(vec![65, 66]));
        // Other JSON values are taken as text
        assert_eq!(Payload::from_line("42").unwrap(), Payload::Text("42".into()));
        assert!(Payload::from_line("[300]").is_err());
    }

    #[test]
    fn test_handle_requires_start() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir, false);

        assert!(!handler.is_running());
        assert!(matches!(handler.handle("x"), Err(RolloverError::NotRunning)));
    }

    #[test]
    fn test_text_gets_newline_bytes_verbatim() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir, false);
        handler.start().unwrap();
        let path = handler.current_path().unwrap();

        handler.handle("line").unwrap();
        handler.handle(vec![1u8, 2, 3]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"line\n\x01\x02\x03");

        handler.stop().unwrap();
        assert!(!handler.is_running());
        // Stopping again is harmless
        handler.stop().unwrap();
    }

    #[test]
    fn test_binary_mode_writes_text_verbatim() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir, true);
        handler.start().unwrap();
        let path = handler.current_path().unwrap();

        handler.handle("a").unwrap();
        handler.handle("b").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ab");
    }

    #[test]
    fn test_run_lines_skips_bad_payloads() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir, false);
        handler.start().unwrap();
        let path = handler.current_path().unwrap();

        let input = Cursor::new("first\n\n[300]\n\"second\"\r\n");
        assert_eq!(handler.run_lines(input).unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
