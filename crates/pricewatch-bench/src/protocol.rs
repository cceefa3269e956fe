//! Process-mode wire protocol.
//!
//! Frames are a little-endian `u32` body length followed by a JSON body.
//! The driver sends one [`TaskRequest`] per task and waits for the matching
//! [`TaskResponse`]; a worker exits when its stdin reaches EOF.

use crate::error::{BenchError, Result};
use crate::query::QueryName;
use crate::result::TaskOutcome;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;

pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: u64,
    pub query: QueryName,
    /// Per-task timeout in milliseconds; `0` means none.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl TaskRequest {
    pub fn new(task_id: u64, query: QueryName, timeout: Option<Duration>) -> Self {
        let timeout_ms = timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1))
            .unwrap_or(0);
        Self {
            task_id,
            query,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: u64,
    pub outcome: TaskOutcome,
}

/// Read one frame. `Ok(None)` on a clean EOF before the header.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    if let Err(err) = reader.read_exact(&mut header) {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(err);
    }
    let size = u32::from_le_bytes(header) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {size} bytes exceeds {MAX_FRAME_SIZE}"),
        ));
    }
    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf)?;
    Ok(Some(buf))
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let size = u32::try_from(payload.len())
        .ok()
        .filter(|size| *size as usize <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes exceeds {MAX_FRAME_SIZE}", payload.len()),
            )
        })?;
    writer.write_all(&size.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Serialise `message` and write it as one frame.
pub fn send<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message).map_err(|e| BenchError::Protocol(e.to_string()))?;
    write_frame(writer, &body)?;
    Ok(())
}

/// Read and decode one frame; `Ok(None)` on EOF.
pub fn recv<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let Some(body) = read_frame(reader).map_err(frame_error)? else {
        return Ok(None);
    };
    let message = serde_json::from_slice(&body)
        .map_err(|e| BenchError::Protocol(format!("invalid frame body: {e}")))?;
    Ok(Some(message))
}

fn frame_error(err: io::Error) -> BenchError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            BenchError::Protocol(err.to_string())
        }
        _ => BenchError::Io(err),
    }
}
