//! Hex dumper used for diagnostics (trace logging of wire traffic).

use std::fmt::Write as _;

/// Renders `data` as a classic 16-bytes-per-row hex dump with an ASCII
/// gutter, e.g.:
///
/// ```text
/// 00000000  68 65 6c 6c 6f 20 77 6f  72 6c 64 21 00 00 00 00  |hello world!....|
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (row, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", row * 16);
        for i in 0..16 {
            if i < chunk.len() {
                let _ = write!(out, "{:02x} ", chunk[i]);
            } else {
                out.push_str("   ");
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for &b in chunk {
            let c = b as char;
            out.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_ascii_payload() {
        let dump = hex_dump(b"hello world!");
        assert!(dump.starts_with("00000000  "));
        assert!(dump.contains("|hello world!...."));
    }

    #[test]
    fn empty_input_yields_empty_dump() {
        assert_eq!(hex_dump(&[]), "");
    }
}
