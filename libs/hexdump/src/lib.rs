//! Hex dumps for relay diagnostics.
//!
//! Renders a byte sequence as one line per chunk:
//!
//! ```text
//! 0000 47 45 54 20 2f 20 48 54 54 50 2f 31 2e 31 0d 0a  GET / HTTP/1.1..
//! 0010 48 6f 73 74 3a 20 65 78 61 6d 70 6c 65           Host: example
//! ```
//!
//! The offset is zero-padded hexadecimal, the hex column is padded to a fixed
//! width so the printable column lines up, and every byte without a single
//! visible glyph is shown as `.`.

use std::fmt;

/// Bytes per line when no width is given.
pub const DEFAULT_WIDTH: usize = 16;

/// Placeholder for bytes that have no single visible glyph.
pub const PLACEHOLDER: char = '.';

/// Render one byte for the printable column.
///
/// Bytes are read as Latin-1. A byte keeps its own glyph when it is a single
/// visible character: `0x20..=0x7e` except the backslash, and `0xa1..=0xff`
/// except the soft hyphen (`0xad`). Everything else becomes [`PLACEHOLDER`].
pub fn printable(byte: u8) -> char {
    match byte {
        b'\\' => PLACEHOLDER,
        0x20..=0x7e => byte as char,
        0xad => PLACEHOLDER,
        0xa1..=0xff => char::from(byte),
        _ => PLACEHOLDER,
    }
}

/// Format `data` as hex dump lines, `width` bytes per line.
///
/// A `width` of zero falls back to [`DEFAULT_WIDTH`]. Empty input yields no
/// lines.
pub fn hexdump(data: &[u8], width: usize) -> Vec<String> {
    let width = effective_width(width);
    data.chunks(width)
        .enumerate()
        .map(|(index, chunk)| format_line(index * width, chunk, width))
        .collect()
}

fn effective_width(width: usize) -> usize {
    if width == 0 {
        DEFAULT_WIDTH
    } else {
        width
    }
}

fn format_line(offset: usize, chunk: &[u8], width: usize) -> String {
    let hexa = chunk
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    let text: String = chunk.iter().copied().map(printable).collect();
    let hex_width = width * 3;
    format!("{offset:04x} {hexa:<hex_width$} {text}")
}

/// Lazily formatted hex dump, for use in log statements.
///
/// Lines are joined with `\n`; nothing is formatted unless the value is
/// actually displayed.
#[derive(Debug, Clone, Copy)]
pub struct HexDump<'a> {
    data: &'a [u8],
    width: usize,
}

impl<'a> HexDump<'a> {
    /// Dump `data` with the default width.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            width: DEFAULT_WIDTH,
        }
    }

    /// Dump `data` with a custom width.
    pub fn with_width(data: &'a [u8], width: usize) -> Self {
        Self {
            data,
            width: effective_width(width),
        }
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, chunk) in self.data.chunks(self.width).enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&format_line(index * self.width, chunk, self.width))?;
        }
        Ok(())
    }
}
