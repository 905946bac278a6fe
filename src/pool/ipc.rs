//! Wire format between the master and process workers.
//!
//! Dispatch (master to worker) is one JSON line per request: `{"frameIndex": n}`.
//!
//! Results (worker to master) are length-prefixed so binary payloads need no escaping:
//! - 2-byte magic `ZR` for stream synchronization
//! - 4-byte little-endian header length
//! - JSON header `{"idx": n, "len": bytes}`
//! - `len` raw payload bytes

use std::io::{BufRead, ErrorKind, Read, Write};

use crate::foundation::core::{FrameIndex, FrameRequest, FrameResult};
use crate::foundation::error::{ReelError, ReelResult};

pub const MAGIC: [u8; 2] = *b"ZR";
/// Upper bound on the JSON header; anything larger means the stream is out of sync.
pub const MAX_HEADER_LEN: u32 = 1024;
/// Upper bound on a single frame payload.
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct ResultHeader {
    idx: u64,
    len: u32,
}

/// Write one dispatch line and flush it.
pub fn write_request<W: Write>(out: &mut W, req: FrameRequest) -> ReelResult<()> {
    let mut line = serde_json::to_vec(&req)
        .map_err(|e| ReelError::protocol(format!("failed to encode request: {e}")))?;
    line.push(b'\n');
    out.write_all(&line)
        .and_then(|()| out.flush())
        .map_err(|e| ReelError::worker(format!("failed to send frame {}: {e}", req.index)))
}

/// Read the next dispatch line. `Ok(None)` means the master closed the input.
pub fn read_request<R: BufRead>(input: &mut R) -> ReelResult<Option<FrameRequest>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = input
            .read_line(&mut line)
            .map_err(|e| ReelError::protocol(format!("failed to read request: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        let req = serde_json::from_str::<FrameRequest>(line.trim())
            .map_err(|e| ReelError::protocol(format!("malformed request {line:?}: {e}")))?;
        return Ok(Some(req));
    }
}

/// Frame and write one result, then flush.
pub fn write_result<W: Write>(out: &mut W, result: &FrameResult) -> ReelResult<()> {
    let len = u32::try_from(result.payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_LEN)
        .ok_or_else(|| {
            ReelError::protocol(format!(
                "frame {} payload of {} bytes exceeds the wire limit",
                result.index,
                result.payload.len()
            ))
        })?;
    let header = serde_json::to_vec(&ResultHeader {
        idx: result.index.0,
        len,
    })
    .map_err(|e| ReelError::protocol(format!("failed to encode result header: {e}")))?;
    // Header is a handful of digits; always far below MAX_HEADER_LEN.
    let header_len = header.len() as u32;

    let mut write = || -> std::io::Result<()> {
        out.write_all(&MAGIC)?;
        out.write_all(&header_len.to_le_bytes())?;
        out.write_all(&header)?;
        out.write_all(&result.payload)?;
        out.flush()
    };
    write().map_err(|e| {
        ReelError::worker(format!("failed to write frame {}: {e}", result.index))
    })
}

/// Read one framed result. `Ok(None)` means the stream ended cleanly between messages.
pub fn read_result<R: Read>(input: &mut R) -> ReelResult<Option<FrameResult>> {
    let mut magic = [0u8; 2];
    match input.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ReelError::protocol(format!("failed to read result: {e}"))),
    }
    if magic != MAGIC {
        return Err(ReelError::protocol(format!(
            "bad result magic {magic:02x?}, stream out of sync"
        )));
    }

    let mut len_bytes = [0u8; 4];
    read_exact(input, &mut len_bytes, "header length")?;
    let header_len = u32::from_le_bytes(len_bytes);
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(ReelError::protocol(format!(
            "result header length {header_len} out of range"
        )));
    }

    let mut header = vec![0u8; header_len as usize];
    read_exact(input, &mut header, "header")?;
    let header: ResultHeader = serde_json::from_slice(&header)
        .map_err(|e| ReelError::protocol(format!("malformed result header: {e}")))?;
    if header.len > MAX_PAYLOAD_LEN {
        return Err(ReelError::protocol(format!(
            "frame {} payload of {} bytes exceeds the wire limit",
            header.idx, header.len
        )));
    }

    let mut payload = vec![0u8; header.len as usize];
    read_exact(input, &mut payload, "payload")?;
    Ok(Some(FrameResult {
        index: FrameIndex(header.idx),
        payload,
    }))
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8], what: &str) -> ReelResult<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ReelError::protocol(format!("stream ended inside result {what}")),
        _ => ReelError::protocol(format!("failed to read result {what}: {e}")),
    })
}
