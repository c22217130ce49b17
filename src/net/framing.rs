//! Length-prefixed text records over a byte stream.
//!
//! Format: `[4 bytes little-endian length][UTF-8 payload]`

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;

/// Errors that can occur during record framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Record too large: {0} bytes (max {1})")]
    TooLarge(usize, usize),
    #[error("Record is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn closed_on_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Read one record. A clean end of stream before the prefix is `ConnectionClosed`.
pub async fn read_record<R: AsyncRead + Unpin>(stream: &mut R) -> Result<String, FramingError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::TooLarge(len, MAX_MESSAGE_SIZE));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(closed_on_eof)?;

    Ok(String::from_utf8(buf)?)
}

/// Write one record and flush
pub async fn write_record<W: AsyncWrite + Unpin>(stream: &mut W, text: &str) -> Result<(), FramingError> {
    let data = text.as_bytes();
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::TooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    stream.write_all(&(data.len() as u32).to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}
