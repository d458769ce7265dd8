//! Percent-escaping tables.
//!
//! Two escaping profiles are used on the wire:
//!
//! - **Data escaping** ([`escape_data_string`]): strict RFC 3986. Only
//!   unreserved characters (`A-Z a-z 0-9 - . _ ~`) pass through. Used for
//!   custom query option values and anywhere a value must survive as an
//!   opaque token.
//! - **Query-part escaping** ([`escape_query_part`]): the profile of the
//!   assembled `$filter`/`$orderby` text and key literals. Identical to
//!   data escaping except that `! ' ( ) *` also pass through, which keeps
//!   quoted literals and grouping parentheses readable in the URI.
//!
//! Both profiles escape every reserved character (`% : / ? # [ ] @ = $ &
//! ; " space` and all controls), so [`unescape`] inverts either one.

/// RFC 3986 unreserved characters. Never escaped by either profile.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Extra pass-through characters for the query-part profile.
fn is_query_safe(b: u8) -> bool {
    matches!(b, b'!' | b'\'' | b'(' | b')' | b'*')
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn escape_with(s: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if keep(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Escapes a value with the strict RFC 3986 profile.
///
/// Every byte outside the unreserved set is percent-encoded, including
/// `! ' ( ) *`.
pub fn escape_data_string(s: &str) -> String {
    escape_with(s, is_unreserved)
}

/// Escapes assembled query text with the lenient wire profile.
///
/// Reserved characters are percent-encoded; `! ' ( ) *` pass through
/// unescaped.
pub fn escape_query_part(s: &str) -> String {
    escape_with(s, |b| is_unreserved(b) || is_query_safe(b))
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Reverses percent-encoding.
///
/// Valid `%XX` sequences are decoded; a `%` not followed by two hex
/// digits is copied through verbatim. Decoded bytes are reassembled as
/// UTF-8 (invalid sequences are replaced, which cannot occur for output
/// of the escape functions in this module).
pub fn unescape(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 3 <= bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push((hex_value(bytes[i + 1]) << 4) | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
