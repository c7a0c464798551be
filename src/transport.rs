//! Length-framed duplex transport.

use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Errors on the wire path. All of them are fatal to the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("encode error")]
    Encode,
    #[error("decode error")]
    Decode,
    #[error("protocol mismatch")]
    Protocol,
    #[error("server error: {0}")]
    Server(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A reliable, ordered message channel to the server.
///
/// `send_raw`/`recv_raw` move one framed payload; the provided `send`/`recv`
/// wrap them with bincode for typed messages. Frame boundaries and order are
/// preserved by every implementation.
pub trait Transport {
    /// Send one payload as a single frame.
    fn send_raw(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Receive the next frame's payload.
    fn recv_raw(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Serialize and send a value.
    fn send<T: Serialize>(&mut self, value: &T) -> Result<(), TransportError> {
        let bytes = bincode::serialize(value).map_err(|e| {
            log::debug!("transport serialize error: {}", e);
            TransportError::Encode
        })?;
        self.send_raw(&bytes)
    }

    /// Receive and deserialize a value.
    fn recv<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let bytes = self.recv_raw()?;
        bincode::deserialize(&bytes).map_err(|e| {
            log::debug!("transport deserialize error: {}", e);
            TransportError::Decode
        })
    }
}

pub fn write_frame<W: Write>(mut writer: W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| io::ErrorKind::InvalidInput)?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)
}

pub fn read_frame<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// [`Transport`] implementation backed by a length-framed `Read + Write`
/// stream, typically a `TcpStream`.
pub struct FramedIo<RW> {
    inner: RW,
}

impl<RW> FramedIo<RW> {
    pub fn new(inner: RW) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> RW {
        self.inner
    }
}

impl<RW: Read + Write> Transport for FramedIo<RW> {
    fn send_raw(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.inner, payload).map_err(|e| {
            log::debug!("transport write error: {}", e);
            TransportError::Io(e)
        })
    }

    fn recv_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut self.inner).map_err(|e| {
            log::debug!("transport read error: {}", e);
            TransportError::Io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SetParityQuery;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"hello").unwrap();
        buf.set_position(0);
        let out = read_frame(&mut buf).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_framed_send_recv_roundtrip() {
        let query = SetParityQuery { indices: vec![3, 1, 4, 1, 5] };
        let mut io = FramedIo::new(Cursor::new(Vec::new()));
        io.send(&query).unwrap();
        let inner = io.into_inner().into_inner();
        let mut io = FramedIo::new(Cursor::new(inner));
        let decoded: SetParityQuery = io.recv().unwrap();
        assert_eq!(query, decoded);
    }

    #[test]
    fn test_raw_frames_keep_boundaries() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, &[1, 2, 3]).unwrap();
        write_frame(&mut buf, &[]).unwrap();
        write_frame(&mut buf, &[9]).unwrap();
        buf.set_position(0);
        assert_eq!(read_frame(&mut buf).unwrap(), vec![1, 2, 3]);
        assert_eq!(read_frame(&mut buf).unwrap(), Vec::<u8>::new());
        assert_eq!(read_frame(&mut buf).unwrap(), vec![9]);
    }
}
