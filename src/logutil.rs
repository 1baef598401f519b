//! Helpers for logging raw serial traffic on a single line.
//!
//! Device output is untrusted: it can carry stray control bytes, half-written
//! lines after a reset, or runaway text when a baud rate is wrong. Everything
//! that reaches the log goes through [`escape_log`] first.

use std::fmt::Write;

/// Longest preview of device text kept in a log line.
const MAX_PREVIEW: usize = 200;

/// Escape control characters and cap the length of device text for logging.
///
/// `\n`, `\r`, `\t` and backslash are escaped; other control characters are
/// rendered as `\xNN`. Text longer than the preview limit ends with `…`.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Hex preview of a raw read, used for trace logging of chunks.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(data.len()) * 2 + 3);
    for b in data.iter().take(max) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    if data.len() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("R2 hi\r\n"), "R2 hi\\r\\n");
        assert_eq!(escape_log("a\u{7}b"), "a\\x07b");
    }

    #[test]
    fn caps_long_lines() {
        let long = "x".repeat(500);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn hex_preview_truncates() {
        assert_eq!(hex_preview(&[0x52, 0x32], 8), "5232");
        assert_eq!(hex_preview(&[1, 2, 3], 2), "0102...");
    }
}
