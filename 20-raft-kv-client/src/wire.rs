//! Wire format shared by the client and the servers it talks to.
//!
//! # Framing
//!
//! Every message is length-prefixed:
//! - 4 bytes: payload length (big-endian u32)
//! - N bytes: bincode-encoded payload
//!
//! A request frame carries a [`RequestEnvelope`](crate::envelope::RequestEnvelope);
//! the reply frame carries a [`Reply`].

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Status of a request the server executed.
pub const STATUS_OK: &str = "OK";
/// Status of a `Get` for a key the server does not hold.
pub const STATUS_NO_KEY: &str = "ErrNoKey";
/// Status from a server that is not the current leader.
pub const STATUS_WRONG_LEADER: &str = "ErrWrongLeader";

/// Upper bound on a single frame's payload.
///
/// Reading a longer frame fails with `InvalidData`. The client checks request
/// size up front and never puts an oversized frame on the wire.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A server's answer to one request frame.
///
/// `status` is kept as a free-form string so that a status this client does
/// not know about still decodes and can be reported as a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: String,
    pub value: String,
}

impl Reply {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            value: value.into(),
        }
    }

    pub fn no_key() -> Self {
        Self::with_status(STATUS_NO_KEY)
    }

    pub fn wrong_leader() -> Self {
        Self::with_status(STATUS_WRONG_LEADER)
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            value: String::new(),
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    bincode::serialize(message).map_err(to_io_error)
}

/// Size of `message` once encoded, without allocating the payload.
pub fn encoded_len<T: Serialize>(message: &T) -> io::Result<u64> {
    bincode::serialized_size(message).map_err(to_io_error)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    bincode::deserialize(bytes).map_err(to_io_error)
}

/// Writes one length-prefixed frame and flushes.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit of {MAX_FRAME_LEN}", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads exactly one length-prefixed frame.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encodes `message` and writes it as one frame.
pub fn send<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let bytes = encode(message)?;
    write_frame(writer, &bytes)
}

/// Reads one frame and decodes it.
pub fn recv<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let bytes = read_frame(reader)?;
    decode(&bytes)
}

fn to_io_error(err: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
