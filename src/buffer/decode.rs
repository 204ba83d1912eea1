//! ASCII and Latin-1 z-string / line decoders.
//!
//! Every decoder here returns `Ok(false)` (not an error) when the source
//! buffer runs out before the terminator: the caller is expected to
//! accumulate more bytes and call again. On that path the buffer is left
//! positioned for resumption -- nothing already consumed is un-read for
//! the single-byte encodings in this file (only the modified-UTF-8
//! decoder in `mutf8.rs` can straddle a multi-byte sequence).

use super::ByteBuffer;

/// A single-byte-to-`char` decoder, used to share the line/z-string
/// scanning loop between the ASCII and Latin-1 variants.
pub trait Decoder {
    /// Decodes one input byte. ASCII rejects the high bit; Latin-1 maps
    /// every byte to its codepoint.
    fn decode(byte: u8) -> char;
}

pub struct Ascii;
impl Decoder for Ascii {
    fn decode(byte: u8) -> char {
        (byte & 0x7f) as char
    }
}

pub struct Latin1;
impl Decoder for Latin1 {
    fn decode(byte: u8) -> char {
        byte as char
    }
}

/// Scans from the buffer's current position for `terminator`, appending
/// decoded characters to `out` and advancing past the terminator on
/// success. Returns `Ok(true)` if the terminator was found, `Ok(false)`
/// if the buffer ran out first (position is left at the end of the
/// consumed prefix so a subsequent call with more data resumes cleanly).
pub fn read_line<D: Decoder>(buf: &mut ByteBuffer, terminator: u8, out: &mut String) -> bool {
    let start = buf.position();
    let slice = buf.as_slice();
    match slice.iter().position(|&b| b == terminator) {
        Some(idx) => {
            for &b in &slice[..idx] {
                out.push(D::decode(b));
            }
            buf.set_position(start + idx + 1).expect("within limit");
            true
        }
        None => {
            for &b in slice {
                out.push(D::decode(b));
            }
            buf.set_position(buf.limit()).expect("within limit");
            false
        }
    }
}

/// Reads a NUL-terminated ASCII string.
pub fn read_ascii_z(buf: &mut ByteBuffer, out: &mut String) -> bool {
    read_line::<Ascii>(buf, 0, out)
}

/// Reads a newline-terminated (`\n`) ASCII line.
pub fn read_ascii_line(buf: &mut ByteBuffer, out: &mut String) -> bool {
    read_line::<Ascii>(buf, b'\n', out)
}

/// Reads a NUL-terminated Latin-1 string.
pub fn read_latin1_z(buf: &mut ByteBuffer, out: &mut String) -> bool {
    read_line::<Latin1>(buf, 0, out)
}

/// Reads a newline-terminated (`\n`) Latin-1 line.
pub fn read_latin1_line(buf: &mut ByteBuffer, out: &mut String) -> bool {
    read_line::<Latin1>(buf, b'\n', out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_line_found() {
        let mut buf = ByteBuffer::wrap(b"hello\nworld".to_vec());
        let mut out = String::new();
        assert!(read_ascii_line(&mut buf, &mut out));
        assert_eq!(out, "hello");
        assert_eq!(buf.position(), 6);
    }

    #[test]
    fn ascii_line_needs_more_data() {
        let mut buf = ByteBuffer::wrap(b"partial".to_vec());
        let mut out = String::new();
        assert!(!read_ascii_line(&mut buf, &mut out));
        assert_eq!(out, "partial");
        assert_eq!(buf.position(), buf.limit());
    }

    #[test]
    fn latin1_z_decodes_high_bytes() {
        let mut buf = ByteBuffer::wrap(vec![0xE9, 0x00]);
        let mut out = String::new();
        assert!(read_latin1_z(&mut buf, &mut out));
        assert_eq!(out.chars().next().unwrap() as u32, 0xE9);
    }
}
