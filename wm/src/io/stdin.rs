//! Bounded read of the hook payload from stdin.

use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

/// How long a hook waits for the host runtime to write its payload.
pub const STDIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Read from `reader` until EOF, a complete JSON object, or `timeout`.
///
/// Chunks are collected as they arrive, so a host that writes its payload and
/// leaves the pipe open still gets it read. Returns `None` only when nothing
/// arrived. The reader thread is left behind on timeout; the process exits
/// shortly after.
pub fn read_with_timeout<R>(reader: R, timeout: Duration) -> Option<String>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>();
    thread::spawn(move || {
        let mut reader = reader;
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Ok(chunk[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        }
    });

    let deadline = Instant::now() + timeout;
    let mut buf = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Ok(chunk)) => {
                buf.extend_from_slice(&chunk);
                if is_complete_object(&buf) {
                    break;
                }
            }
            Ok(Err(err)) => {
                warn!(err = %err, received = buf.len(), "failed to read hook payload");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    received = buf.len(),
                    "hook payload read timed out"
                );
                break;
            }
        }
    }
    if buf.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn is_complete_object(buf: &[u8]) -> bool {
    serde_json::from_slice::<Value>(buf).is_ok_and(|value| value.is_object())
}

/// Parse a hook payload, degrading to an empty object.
pub fn parse_payload(raw: Option<&str>) -> Value {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Value::Object(Default::default());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            warn!("hook payload is not a JSON object, ignoring");
            Value::Object(Default::default())
        }
        Err(err) => {
            warn!(err = %err, "malformed hook payload, ignoring");
            Value::Object(Default::default())
        }
    }
}

/// Read and parse the process's stdin payload.
pub fn read_payload() -> Value {
    parse_payload(read_with_timeout(std::io::stdin(), STDIN_TIMEOUT).as_deref())
}
