//! Framed binary codec for the worker protocol and saved projects.
//!
//! A stream starts with a 4-byte magic and a format version byte, then
//! carries frames of `u32` little-endian length plus a bincode payload:
//!
//! ```text
//! [MAGIC] [VERSION u8] [len u32][payload] [len u32][payload] ...
//! ```
//!
//! Worker streams use [`WIRE_MAGIC`]; saved projects use
//! [`PERSIST_MAGIC`]. A clean end of stream between frames reads as
//! `None`; a stream that stops inside a frame is an error.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use branchwork_core::{Seed, StepProfile};

/// Magic bytes opening every worker stream, in both directions.
pub const WIRE_MAGIC: [u8; 4] = *b"BRWK";

/// Magic bytes opening every saved project.
pub const PERSIST_MAGIC: [u8; 4] = *b"BRWP";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Largest frame payload accepted on worker streams, in bytes.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

// ── Errors ──────────────────────────────────────────────────────

/// Errors from reading or writing framed streams.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A payload could not be serialized or deserialized.
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
    /// The stream does not start with the expected magic bytes.
    #[error("invalid magic bytes {found:?}, expected {expected:?}")]
    InvalidMagic {
        /// Magic this reader expects.
        expected: [u8; 4],
        /// Bytes actually found.
        found: [u8; 4],
    },
    /// The format version is not supported by this build.
    #[error("unsupported format version {found}")]
    UnsupportedVersion {
        /// The version found in the stream.
        found: u8,
    },
    /// A frame length exceeds the limit in force.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Declared or encoded payload length.
        len: u64,
        /// The limit.
        max: u32,
    },
    /// The stream ended inside a frame.
    #[error("truncated frame: {detail}")]
    Truncated {
        /// What was being read.
        detail: String,
    },
}

// ── Header ──────────────────────────────────────────────────────

/// Write `magic` and the format version.
pub fn write_header(w: &mut dyn Write, magic: [u8; 4]) -> Result<(), WireError> {
    w.write_all(&magic)?;
    w.write_all(&[FORMAT_VERSION])?;
    Ok(())
}

/// Read and check `magic` and the format version.
pub fn read_header(r: &mut dyn Read, magic: [u8; 4]) -> Result<(), WireError> {
    let mut found = [0u8; 4];
    r.read_exact(&mut found)?;
    if found != magic {
        return Err(WireError::InvalidMagic {
            expected: magic,
            found,
        });
    }
    let mut version = [0u8; 1];
    r.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(WireError::UnsupportedVersion { found: version[0] });
    }
    Ok(())
}

// ── Frames ──────────────────────────────────────────────────────

/// Serialize `value` and write it as one frame of at most
/// [`MAX_FRAME_LEN`] bytes.
pub fn write_frame<T: Serialize>(w: &mut dyn Write, value: &T) -> Result<(), WireError> {
    write_frame_limited(w, value, MAX_FRAME_LEN)
}

/// [`write_frame`] with an explicit payload limit.
pub fn write_frame_limited<T: Serialize>(w: &mut dyn Write, value: &T, max: u32) -> Result<(), WireError> {
    let payload = bincode::serialize(value)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max)
        .ok_or(WireError::Oversized {
            len: payload.len() as u64,
            max,
        })?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

/// Read one frame of at most [`MAX_FRAME_LEN`] bytes, or `None` at a
/// clean end of stream.
pub fn read_frame<T: DeserializeOwned>(r: &mut dyn Read) -> Result<Option<T>, WireError> {
    read_frame_limited(r, MAX_FRAME_LEN)
}

/// [`read_frame`] with an explicit payload limit.
pub fn read_frame_limited<T: DeserializeOwned>(r: &mut dyn Read, max: u32) -> Result<Option<T>, WireError> {
    // Read the length byte-by-byte to tell a clean EOF (zero bytes) from
    // truncation (1-3 bytes).
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match r.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(WireError::Truncated {
                    detail: format!("got {filled} of 4 length bytes"),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WireError::Io(e)),
        }
    }
    let len = u32::from_le_bytes(len_buf);
    if len > max {
        return Err(WireError::Oversized {
            len: u64::from(len),
            max,
        });
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => WireError::Truncated {
            detail: format!("payload shorter than declared {len} bytes"),
        },
        _ => WireError::Io(e),
    })?;
    Ok(Some(bincode::deserialize(&payload)?))
}

// ── Worker messages ─────────────────────────────────────────────

/// First frame sent to a worker; lets a multi-simpack worker binary pick
/// the simpack before decoding any state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Name of the simpack the worker must run.
    pub simpack: String,
}

/// Frames sent from a process cruncher to its worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub enum ToWorker<S> {
    /// Begin crunching. Sent once, right after the handshake.
    Start {
        /// Where stepping starts.
        seed: Seed<S>,
        /// Step profile every step runs with.
        profile: StepProfile,
        /// Clock target; infinite for unbounded jobs.
        target: f64,
    },
    /// The job's target was raised.
    RaiseTarget(f64),
    /// Stop as soon as possible.
    Stop,
}

/// Frames sent from a worker back to its process cruncher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub enum FromWorker<S> {
    /// A newly produced state.
    State(S),
    /// The world ended after the last state sent.
    WorldEnded,
    /// The worker failed and stopped.
    Failed(String),
    /// The target was reached or a stop was honoured.
    Finished,
}
