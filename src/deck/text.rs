//! Field text preparation and the small hashes Anki keys notes by.

use once_cell::sync::Lazy;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Escape angle brackets and turn newlines into `<br>`.
///
/// Anki renders fields as HTML, so a literal `<` would start a tag. Quiz
/// text is full of comparisons like `3 < x > 1`; the spaced forms `"< "`
/// and `" >"` are replaced first, then any remaining bracket. `&` is left
/// alone, so text that already contains entities is not double-escaped.
pub fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("< ", "&lt; ")
        .replace(" >", " &gt;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Field text with HTML tags removed, as Anki uses for sorting and checksums.
pub fn strip_html(field: &str) -> String {
    RE_TAGS.replace_all(field, " ").trim().to_string()
}

/// Anki's duplicate-detection checksum: the first 32 bits of SHA-1 over the
/// stripped first field.
pub fn field_checksum(first_field: &str) -> i64 {
    let digest = Sha1::digest(strip_html(first_field).as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

const BASE91_TABLE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Stable note guid: base91 of the first 8 bytes of SHA-256 over the fields
/// joined with `__`. Re-importing the same card updates instead of duplicating.
pub fn guid_for(fields: &[&str]) -> String {
    let digest = Sha256::digest(fields.join("__").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    base91(u64::from_be_bytes(head))
}

fn base91(mut n: u64) -> String {
    let radix = BASE91_TABLE.len() as u64;
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE91_TABLE[(n % radix) as usize]);
        n /= radix;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
