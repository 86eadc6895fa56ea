//! Length-framed JSON-RPC codec shared by the subprocess backend driver
//! ([`crate::transport::StdioTransport`]) and the front-door stdio duplex
//! transport ([`crate::gateway`]'s stdio front door).
//!
//! Wire format is bit-exact: an ASCII header `Content-Length: <decimal>\r\n\r\n`
//! followed by exactly that many bytes of UTF-8 JSON. No other headers are
//! recognized; any violation is treated as a framing error by the caller,
//! who is responsible for tearing down the connection and marking the
//! backend unhealthy.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Read one `Content-Length`-framed message.
///
/// Returns `Ok(None)` only on a clean EOF before any header bytes were
/// read (the connection was closed between frames, not mid-frame).
///
/// # Errors
///
/// Returns an error if a header line is malformed, an unrecognized header
/// is present, `Content-Length` is missing or unparsable, or the stream
/// ends before the declared number of payload bytes arrive.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Transport(format!("frame header read failed: {e}")))?;
        if read == 0 {
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(Error::Transport("connection closed mid-frame".to_string()))
            };
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| Error::Transport(format!("malformed frame header: {trimmed:?}")))?;
        if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(value.trim().parse::<usize>().map_err(|_| {
                Error::Transport(format!("invalid Content-Length value: {}", value.trim()))
            })?);
        } else {
            return Err(Error::Transport(format!("unrecognized frame header: {name}")));
        }
    }

    let len = content_length
        .ok_or_else(|| Error::Transport("frame is missing Content-Length".to_string()))?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::Transport(format!("frame body read failed: {e}")))?;
    String::from_utf8(body)
        .map(Some)
        .map_err(|e| Error::Transport(format!("frame body is not valid UTF-8: {e}")))
}

/// Write one `Content-Length`-framed message.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &str) -> Result<()> {
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("frame header write failed: {e}")))?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("frame body write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Transport(format!("frame flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, r#"{"jsonrpc":"2.0"}"#).await.unwrap();

        let mut reader = BufReader::new(Cursor::new(buf));
        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.as_deref(), Some(r#"{"jsonrpc":"2.0"}"#));
    }

    #[tokio::test]
    async fn clean_eof_between_frames_returns_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_content_length_is_an_error() {
        let mut reader = BufReader::new(Cursor::new(b"\r\n".to_vec()));
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut reader = BufReader::new(Cursor::new(b"Content-Length: 10\r\n\r\nabc".to_vec()));
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn unrecognized_header_is_rejected() {
        let mut reader = BufReader::new(Cursor::new(b"X-Foo: 1\r\n\r\n".to_vec()));
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn two_frames_back_to_back_are_both_read() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "one").await.unwrap();
        write_frame(&mut buf, "two").await.unwrap();

        let mut reader = BufReader::new(Cursor::new(buf));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("one"));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("two"));
    }
}
