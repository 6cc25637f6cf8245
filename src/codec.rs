use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::connection::Error;
use crate::frame::{self, Frame};

/// Upper bound for the bytes buffered while waiting for a single reply to complete.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

static CRLF: &[u8; 2] = b"\r\n";

/// Decodes server replies into [`Frame`]s and encodes command lines.
///
/// Commands go out as a single inline line terminated by CRLF, the server tokenizes it. Replies
/// are decoded incrementally: a partial reply stays in the read buffer until the rest arrives.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                if src.len() > self.max_frame_size {
                    return Err(Error::FrameTooLarge(self.max_frame_size));
                }
                // Not enough data to parse a frame.
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer, anything after it belongs to the next reply.
        src.advance(position);

        Ok(Some(frame))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(frame::Error::UnexpectedEof.into()),
        }
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + CRLF.len());
        dst.put_slice(line.as_bytes());
        dst.put_slice(CRLF);
        Ok(())
    }
}
