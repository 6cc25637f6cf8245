//! Renders replies the way `redis-cli` prints them.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::config::OutputMode;
use crate::frame::Frame;

/// Writes `frame` to `out`, one line per scalar.
///
/// Array elements are rendered recursively. In formatted mode each element gets a `<n>) ` prefix,
/// nested arrays apply the same numbering without any indentation.
pub fn write_frame<W: Write>(out: &mut W, frame: &Frame, mode: OutputMode) -> io::Result<()> {
    match (frame, mode) {
        (Frame::Null | Frame::NullArray, OutputMode::Raw) => out.write_all(b"\n"),
        (Frame::Null | Frame::NullArray, OutputMode::Formatted) => out.write_all(b"(nil)\n"),
        (Frame::Simple(s), _) => writeln!(out, "{}", s),
        (Frame::Bulk(bytes), OutputMode::Raw) => {
            out.write_all(bytes)?;
            out.write_all(b"\n")
        }
        (Frame::Bulk(bytes), OutputMode::Formatted) => writeln!(out, "{}", quote(bytes)),
        (Frame::Error(s), OutputMode::Raw) => writeln!(out, "{}", s),
        (Frame::Error(s), OutputMode::Formatted) => writeln!(out, "(error) {}", s),
        (Frame::Integer(i), OutputMode::Raw) => writeln!(out, "{}", i),
        (Frame::Integer(i), OutputMode::Formatted) => writeln!(out, "(integer) {}", i),
        (Frame::Array(frames), _) => {
            for (i, frame) in frames.iter().enumerate() {
                if mode == OutputMode::Formatted {
                    write!(out, "{}) ", i + 1)?;
                }
                write_frame(out, frame, mode)?;
            }
            Ok(())
        }
    }
}

/// Double quotes `bytes`, escaping non-printable characters, quotes, backslashes and invalid
/// UTF-8.
pub fn quote(bytes: &[u8]) -> String {
    let mut quoted = String::with_capacity(bytes.len() + 2);
    quoted.push('"');

    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => quoted.push_str("\\\""),
                '\\' => quoted.push_str("\\\\"),
                '\n' => quoted.push_str("\\n"),
                '\r' => quoted.push_str("\\r"),
                '\t' => quoted.push_str("\\t"),
                '\u{07}' => quoted.push_str("\\a"),
                '\u{08}' => quoted.push_str("\\b"),
                '\u{0c}' => quoted.push_str("\\f"),
                '\u{0b}' => quoted.push_str("\\v"),
                c if c.is_ascii_control() => {
                    let _ = write!(quoted, "\\x{:02x}", c as u32);
                }
                c if !is_printable(c) => {
                    let _ = match c as u32 {
                        code @ 0x10000.. => write!(quoted, "\\U{:08x}", code),
                        code => write!(quoted, "\\u{:04x}", code),
                    };
                }
                c => quoted.push(c),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(quoted, "\\x{:02x}", byte);
        }
    }

    quoted.push('"');
    quoted
}

// Controls, invisible format characters, private use code points and any whitespace other
// than ASCII space are escaped.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }

    !matches!(
        c,
        '\u{ad}'
            | '\u{600}'..='\u{605}'
            | '\u{61c}'
            | '\u{6dd}'
            | '\u{70f}'
            | '\u{890}'..='\u{891}'
            | '\u{8e2}'
            | '\u{180e}'
            | '\u{200b}'..='\u{200f}'
            | '\u{202a}'..='\u{202e}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206f}'
            | '\u{e000}'..='\u{f8ff}'
            | '\u{feff}'
            | '\u{fff9}'..='\u{fffb}'
            | '\u{110bd}'
            | '\u{110cd}'
            | '\u{13430}'..='\u{1343f}'
            | '\u{1bca0}'..='\u{1bca3}'
            | '\u{1d173}'..='\u{1d17a}'
            | '\u{e0001}'
            | '\u{e0020}'..='\u{e007f}'
            | '\u{f0000}'..='\u{10ffff}'
    )
}
