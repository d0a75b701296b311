//! Driver output capture
//!
//! Splits the driver's stdout into lines. Every line goes to the optional
//! raw capture file; all but the startup banner go to the in-memory buffer.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines the driver prints on startup that are never retained
pub const BANNER_LINES: usize = 2;

/// Ordered, shareable log of retained driver output
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.lines.lock().push(line);
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

/// Best-effort appender for raw output lines
struct RawSink {
    path: PathBuf,
    file: Option<File>,
}

impl RawSink {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    async fn append(&mut self, line: &str) {
        if let Err(e) = self.try_append(line).await {
            warn!(path = %self.path.display(), error = %e, "Failed to persist driver output");
            // Reopen on the next line
            self.file = None;
        }
    }

    async fn try_append(&mut self, line: &str) -> std::io::Result<()> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            self.file = Some(file);
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }
}

/// Consumes one run's output stream
pub struct LogCapture {
    buffer: LogBuffer,
    sink: Option<RawSink>,
    banner_remaining: usize,
}

impl LogCapture {
    pub fn new(buffer: LogBuffer, raw_path: Option<PathBuf>) -> Self {
        Self {
            buffer,
            sink: raw_path.map(RawSink::new),
            banner_remaining: BANNER_LINES,
        }
    }

    /// Run the capture on its own task
    pub fn spawn<R>(self, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(reader))
    }

    /// Read until the stream closes
    pub async fn run<R>(mut self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();

        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&raw);
                    self.process_line(line).await;
                }
                Err(e) => {
                    warn!(error = %e, "Driver output stream failed");
                    break;
                }
            }
        }

        debug!(retained = self.buffer.len(), "Driver output stream closed");
    }

    async fn process_line(&mut self, line: String) {
        if let Some(sink) = self.sink.as_mut() {
            sink.append(&line).await;
        }

        if self.banner_remaining > 0 {
            self.banner_remaining -= 1;
            return;
        }

        self.buffer.push(line);
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OUTPUT: &[u8] = b"BANNER1\nBANNER2\nStarting on port 9999\nReady\n";

    #[tokio::test]
    async fn test_banner_is_dropped() {
        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), None).run(OUTPUT).await;

        assert_eq!(buffer.snapshot(), vec!["Starting on port 9999", "Ready"]);
    }

    #[tokio::test]
    async fn test_short_stream_retains_nothing() {
        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), None)
            .run(&b"only banner\n"[..])
            .await;

        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_crlf_and_unterminated_last_line() {
        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), None)
            .run(&b"a\r\nb\r\nc\r\nd"[..])
            .await;

        assert_eq!(buffer.snapshot(), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_kept_lossily() {
        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), None)
            .run(&b"x\ny\nbad \xff byte\n"[..])
            .await;

        assert_eq!(buffer.snapshot(), vec!["bad \u{fffd} byte"]);
    }

    #[tokio::test]
    async fn test_raw_file_gets_every_line() {
        let tmp = TempDir::new().unwrap();
        let raw_path = tmp.path().join("logs").join("nested").join("driver-raw.log");

        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), Some(raw_path.clone()))
            .run(OUTPUT)
            .await;

        let persisted = std::fs::read_to_string(&raw_path).unwrap();
        assert_eq!(persisted, std::str::from_utf8(OUTPUT).unwrap());
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_raw_file_appends_across_runs() {
        let tmp = TempDir::new().unwrap();
        let raw_path = tmp.path().join("driver-raw.log");

        for _ in 0..2 {
            LogCapture::new(LogBuffer::new(), Some(raw_path.clone()))
                .run(&b"one\n"[..])
                .await;
        }

        let persisted = std::fs::read_to_string(&raw_path).unwrap();
        assert_eq!(persisted, "one\none\n");
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_capturing() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let buffer = LogBuffer::new();
        LogCapture::new(buffer.clone(), Some(blocker.join("driver-raw.log")))
            .run(OUTPUT)
            .await;

        assert_eq!(buffer.snapshot(), vec!["Starting on port 9999", "Ready"]);
    }

    #[tokio::test]
    async fn test_spawned_capture_sees_incremental_output() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let buffer = LogBuffer::new();
        let task = LogCapture::new(buffer.clone(), None).spawn(reader);

        writer.write_all(b"b1\nb2\nfirst\n").await.unwrap();
        writer.write_all(b"second\n").await.unwrap();
        drop(writer);
        task.await.unwrap();

        assert_eq!(buffer.snapshot(), vec!["first", "second"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let buffer = LogBuffer::new();
        buffer.push("one".to_string());

        let snapshot = buffer.snapshot();
        buffer.push("two".to_string());
        buffer.clear();

        assert_eq!(snapshot, vec!["one"]);
        assert!(buffer.is_empty());
    }
}
