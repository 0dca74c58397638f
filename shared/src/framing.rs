//! Length-prefixed framing with threshold-triggered zlib compression.
//!
//! Every message on the wire is a single frame:
//!
//! ```text
//! +--------------------+-----------+----------------------+
//! | length (4 bytes)   | flags (1) | payload              |
//! | i32 big-endian     |           | (length bytes)       |
//! +--------------------+-----------+----------------------+
//! ```
//!
//! `length` counts the payload bytes as they appear on the wire. Bit `0x01` of
//! `flags` marks a zlib-compressed payload. The sender compresses whenever the
//! original payload is larger than the configured threshold, and the receiver
//! trusts the flag alone, so both sides agree even when compression shrinks a
//! payload below the threshold.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::debug;
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Payloads strictly larger than this are compressed before sending.
pub const COMPRESSION_THRESHOLD: usize = 1_048_576;

/// Smallest read granularity used while filling a frame buffer.
pub const MIN_READ_CHUNK: usize = 65_536;

/// Upper bound on a single frame, compressed or not. Default: 256 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub const FLAG_COMPRESSED: u8 = 0x01;

const HEADER_LEN: usize = 5;

/// Tunables shared by both ends of a connection.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub compression_threshold: usize,
    pub max_frame_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            compression_threshold: COMPRESSION_THRESHOLD,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("negative frame length {0}")]
    NegativeLength(i32),

    #[error("frame of {len} bytes exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },

    #[error("stream closed mid-frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("unknown frame flags 0x{0:02X}")]
    UnknownFlags(u8),

    #[error("zlib failure: {0}")]
    Compression(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully encoded frame that can be written any number of times.
#[derive(Debug, Clone)]
pub struct Frame {
    header: [u8; HEADER_LEN],
    body: Vec<u8>,
}

impl Frame {
    /// Builds a frame for `payload`, compressing it when it exceeds the threshold.
    pub fn encode(payload: &[u8], config: &FrameConfig) -> Result<Self, FramingError> {
        let (flags, body) = if payload.len() > config.compression_threshold {
            let compressed = compress(payload)?;
            debug!(
                "Compressed frame payload {} -> {} bytes",
                payload.len(),
                compressed.len()
            );
            (FLAG_COMPRESSED, compressed)
        } else {
            (0, payload.to_vec())
        };

        if body.len() > config.max_frame_len {
            return Err(FramingError::TooLarge {
                len: body.len(),
                max: config.max_frame_len,
            });
        }
        let len = i32::try_from(body.len()).map_err(|_| FramingError::TooLarge {
            len: body.len(),
            max: i32::MAX as usize,
        })?;

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&len.to_be_bytes());
        header[4] = flags;

        Ok(Self { header, body })
    }

    pub fn is_compressed(&self) -> bool {
        self.header[4] & FLAG_COMPRESSED != 0
    }

    /// Number of payload bytes that travel on the wire.
    pub fn wire_len(&self) -> usize {
        self.body.len()
    }

    /// Writes the header and the body as two separate writes, then flushes.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), FramingError> {
        writer.write_all(&self.header).await?;
        if !self.body.is_empty() {
            writer.write_all(&self.body).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

/// Encodes and writes a single frame.
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FramingError> {
    Frame::encode(payload, config)?.write_to(writer).await
}

/// Reads a single frame and returns its (decompressed) payload.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before sending
/// any byte of a new frame.
pub async fn receive_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Option<Vec<u8>>, FramingError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FramingError::Truncated {
                expected: HEADER_LEN,
                received: filled,
            });
        }
        filled += n;
    }

    let raw_len = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if raw_len < 0 {
        return Err(FramingError::NegativeLength(raw_len));
    }
    let len = raw_len as usize;
    if len > config.max_frame_len {
        return Err(FramingError::TooLarge {
            len,
            max: config.max_frame_len,
        });
    }

    let flags = header[4];
    if flags & !FLAG_COMPRESSED != 0 {
        return Err(FramingError::UnknownFlags(flags));
    }

    let chunk = read_chunk_size(len);
    let mut buf = Vec::with_capacity(len);
    while buf.len() < len {
        let start = buf.len();
        let want = chunk.min(len - start);
        buf.resize(start + want, 0);
        let n = reader.read(&mut buf[start..]).await?;
        buf.truncate(start + n);
        if n == 0 {
            return Err(FramingError::Truncated {
                expected: len,
                received: start,
            });
        }
    }

    if flags & FLAG_COMPRESSED != 0 {
        return decompress(&buf, config.max_frame_len).map(Some);
    }
    Ok(Some(buf))
}

/// Read granularity for a frame of `len` bytes: `2^max(16, floor(log2 len))`.
pub fn read_chunk_size(len: usize) -> usize {
    if len == 0 {
        return MIN_READ_CHUNK;
    }
    let log2 = (usize::BITS - 1 - len.leading_zeros()).max(16);
    1usize << log2
}

fn compress(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
    encoder.write_all(payload).map_err(FramingError::Compression)?;
    encoder.finish().map_err(FramingError::Compression)
}

fn decompress(body: &[u8], max_len: usize) -> Result<Vec<u8>, FramingError> {
    let mut out = Vec::new();
    ZlibDecoder::new(body)
        .take(max_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(FramingError::Compression)?;
    if out.len() > max_len {
        return Err(FramingError::TooLarge {
            len: out.len(),
            max: max_len,
        });
    }
    Ok(out)
}
