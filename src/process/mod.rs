//! =============================================================================
//! Backend Process Management
//! =============================================================================
//!
//! Tracks the backend child process, implements the `Content-Length` framed
//! read protocol, and exposes the cancellation pipe.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;
use tempfile::TempDir;

use crate::config::BackendLaunchOptions;
use crate::provider::BackendBinary;

/// Represents the owned backend language-service instance.
pub struct BackendProcess {
    binary: BackendBinary,
    launch: BackendLaunchOptions,
    child: Option<ChildHandles>,
}

impl BackendProcess {
    pub fn new(binary: BackendBinary, launch: BackendLaunchOptions) -> Self {
        Self {
            binary,
            launch,
            child: None,
        }
    }

    /// Spawns the backend child process and starts the reader thread.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            return Ok(());
        }

        let cancellation_dir = TempDir::new().map_err(ProcessError::CreateCancellationDir)?;

        let mut command = Command::new(&self.binary.executable);
        command.args(&self.launch.args);
        command.arg("--cancellation-pipe");
        command.arg(cancellation_dir.path());
        command.arg("--stdio");
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(ProcessError::Spawn)?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingStdout)?;
        let stdin = child.stdin.take().ok_or(ProcessError::MissingStdin)?;

        let (tx, rx) = unbounded();
        let reader_handle = spawn_reader(stdout, tx);

        self.child = Some(ChildHandles {
            child,
            stdin,
            cancellation_dir,
            response_rx: rx,
            reader_handle: Some(reader_handle),
        });

        Ok(())
    }

    /// Sends a JSON payload to the backend using newline-delimited framing
    /// (the backend only *emits* Content-Length headers).
    pub fn write(&mut self, payload: &Value) -> Result<(), ProcessError> {
        let child = self.child.as_mut().ok_or(ProcessError::NotStarted)?;
        let mut serialized = serde_json::to_string(payload).map_err(ProcessError::Serialize)?;
        serialized.push('\n');
        log::trace!("backend <= {}", serialized.trim_end());
        child
            .stdin
            .write_all(serialized.as_bytes())
            .map_err(ProcessError::Write)?;
        child.stdin.flush().map_err(ProcessError::Write)?;
        Ok(())
    }

    /// Signals cancellation by touching `seq_{id}` inside the cancellation
    /// pipe directory.
    pub fn cancel(&self, seq: u64) -> Result<(), ProcessError> {
        let child = self.child.as_ref().ok_or(ProcessError::NotStarted)?;
        let path = child.cancellation_dir.path().join(format!("seq_{}", seq));
        OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map(|_| ())
            .map_err(ProcessError::Write)
    }

    pub fn response_rx(&self) -> Option<Receiver<Value>> {
        self.child
            .as_ref()
            .map(|handles| handles.response_rx.clone())
    }
}

impl Drop for BackendProcess {
    fn drop(&mut self) {
        if let Some(mut handles) = self.child.take() {
            let _ = handles.child.kill();
        }
    }
}

struct ChildHandles {
    child: Child,
    stdin: ChildStdin,
    cancellation_dir: TempDir,
    response_rx: Receiver<Value>,
    reader_handle: Option<thread::JoinHandle<()>>,
}

impl Drop for ChildHandles {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_reader(stdout: ChildStdout, tx: Sender<Value>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            match read_message(&mut reader) {
                Ok(message) => {
                    let _ = tx.send(message);
                }
                Err(ProcessError::Eof) => break,
                Err(_) => continue,
            }
        }
    })
}

fn read_message<T: Read>(reader: &mut BufReader<T>) -> Result<Value, ProcessError> {
    let mut header = String::new();
    loop {
        header.clear();
        let bytes = reader.read_line(&mut header).map_err(ProcessError::Read)?;
        if bytes == 0 {
            return Err(ProcessError::Eof);
        }
        if header == "\r\n" {
            continue;
        }
        if header.to_ascii_lowercase().starts_with("content-length:") {
            let len: usize = header["Content-Length:".len()..]
                .trim()
                .parse()
                .map_err(|_| ProcessError::InvalidHeader)?;
            // consume blank line
            let mut blank = [0; 2];
            reader.read_exact(&mut blank).map_err(ProcessError::Read)?;
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(ProcessError::Read)?;
            return serde_json::from_slice(&body).map_err(ProcessError::Deserialize);
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("process not started")]
    NotStarted,
    #[error("failed to spawn backend: {0}")]
    Spawn(std::io::Error),
    #[error("failed to create cancellation directory: {0}")]
    CreateCancellationDir(std::io::Error),
    #[error("backend stdout missing (stdio must be piped)")]
    MissingStdout,
    #[error("backend stdin missing (stdio must be piped)")]
    MissingStdin,
    #[error("failed to serialize payload: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write to backend stdin: {0}")]
    Write(std::io::Error),
    #[error("failed to parse response json: {0}")]
    Deserialize(serde_json::Error),
    #[error("unexpected EOF while reading backend output")]
    Eof,
    #[error("invalid Content-Length header")]
    InvalidHeader,
    #[error("io error while reading backend stdout: {0}")]
    Read(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_message_handles_content_length_framing() {
        let body = r#"{"type":"response","request_seq":1,"success":true}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = BufReader::new(Cursor::new(framed.into_bytes()));

        let message = read_message(&mut reader).expect("framed message parses");
        assert_eq!(message["type"], "response");
        assert_eq!(message["request_seq"], 1);
    }

    #[test]
    fn read_message_skips_non_header_noise() {
        let body = r#"{"type":"event"}"#;
        let framed = format!("Debugger listening on ws://x\nContent-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = BufReader::new(Cursor::new(framed.into_bytes()));

        let message = read_message(&mut reader).expect("message after noise parses");
        assert_eq!(message["type"], "event");
    }

    #[test]
    fn read_message_reports_eof() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(matches!(read_message(&mut reader), Err(ProcessError::Eof)));
    }
}
