// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::Buf;
use bytes::Bytes;
use std::io::Cursor;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("unknown response type: {}", as_char(.0))]
    InvalidDataType(u8),
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("protocol error; invalid integer {0:?}")]
    InvalidInteger(String),
    #[error("protocol error; invalid length {0}")]
    InvalidLength(i64),
    #[error("protocol error; expected line terminator after bulk payload")]
    MissingTerminator,
    #[error("protocol error; invalid frame format")]
    InvalidUtf8,
}

/// A single decoded server reply.
///
/// RESP2 has two distinct null markers, `$-1` and `*-1`. They render the same way but keep
/// their wire type, so `Null` is the null bulk string and `NullArray` the null array.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    NullArray,
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Parses exactly one reply from `src`, leaving the cursor right after it.
    ///
    /// Returns `Error::Incomplete` when `src` ends before the reply does, in which case the cursor
    /// position is meaningless and the caller should retry once more bytes are available.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let bytes = get_line(src)?.to_vec();
                let string = String::from_utf8(bytes)?;
                Ok(Frame::Simple(string))
            }
            DataType::Error => {
                let bytes = get_line(src)?.to_vec();
                let string = String::from_utf8(bytes)?;
                Ok(Frame::Error(string))
            }
            DataType::Integer => {
                let integer = get_decimal(src)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = get_decimal(src)?;

                if length == -1 {
                    return Ok(Frame::Null);
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                if src.remaining() < length {
                    return Err(Error::Incomplete);
                }
                let data = Bytes::copy_from_slice(&src.chunk()[..length]);
                src.advance(length);

                // The payload is followed by an empty line.
                if !get_line(src)?.is_empty() {
                    return Err(Error::MissingTerminator);
                }

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                let length = get_decimal(src)?;

                if length == -1 {
                    return Ok(Frame::NullArray);
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                // The declared count is untrusted, cap the up-front allocation.
                let mut frames = Vec::with_capacity(length.min(1024));
                for _ in 0..length {
                    let frame = Self::parse(src)?;
                    frames.push(frame);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::Error));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let mut bytes = Vec::with_capacity(1 + i.to_string().len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                let mut result = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len(),
                );
                result.push(u8::from(DataType::BulkString));
                result.extend_from_slice(length_str.as_bytes());
                result.extend_from_slice(CRLF);
                result.extend_from_slice(bytes);
                result.extend_from_slice(CRLF);
                result
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
            Frame::NullArray => b"*-1\r\n".to_vec(),
        }
    }

    /// The wire type this frame was decoded from.
    pub fn kind(&self) -> DataType {
        match self {
            Frame::Simple(_) => DataType::SimpleString,
            Frame::Error(_) => DataType::Error,
            Frame::Integer(_) => DataType::Integer,
            Frame::Bulk(_) | Frame::Null => DataType::BulkString,
            Frame::Array(_) | Frame::NullArray => DataType::Array,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }
}

// Used for logging only, user facing output goes through `format`.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
            Frame::NullArray => write!(f, "*-1"),
        }
    }
}

/// Returns the next line without its terminator. Lines end at `\n`, a single preceding `\r` is
/// stripped.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let newline = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((newline + 1) as u64);

    let line = &buf[start..newline];
    Ok(line.strip_suffix(b"\r").unwrap_or(line))
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

/// RESP2 reply types. RESP3 tags are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    SimpleString, // '+'
    Error,        // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::Error),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::Error => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        Error::InvalidUtf8
    }
}
