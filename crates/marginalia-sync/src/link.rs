//! Web reader links for synced books
//!
//! The reader does not address books by their raw id but by an obfuscated
//! string built from md5 digests of the id:
//!
//! ```text
//! digest[..3] | code | "2" | digest[-2..] | len(part) part ("g" len(part) part)* | pad | check
//! ```
//!
//! Numeric ids (code `3`) are split into 9-digit chunks written in hex; other
//! ids (code `4`) become the hex code points of their characters. The result
//! is padded with digest characters to 20 chars, and the first three hex chars
//! of the md5 of everything so far close it.

use md5::{Digest, Md5};
use std::fmt::Write as _;

pub const READER_BASE_URL: &str = "https://weread.qq.com/web/reader/";

const MIN_ID_LEN: usize = 20;

/// Page link opening `book_id` in the web reader.
pub fn reader_url(book_id: &str) -> String {
    format!("{READER_BASE_URL}{}", reader_id(book_id))
}

/// Obfuscated reader id of `book_id`.
pub fn reader_id(book_id: &str) -> String {
    let digest = md5_hex(book_id);
    let (code, parts) = id_parts(book_id);

    let mut id = format!("{}{code}2{}", &digest[..3], &digest[digest.len() - 2..]);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            id.push('g');
        }
        let _ = write!(&mut id, "{:02x}{part}", part.len());
    }
    if id.len() < MIN_ID_LEN {
        let pad = MIN_ID_LEN - id.len();
        id.push_str(&digest[..pad]);
    }
    let check = md5_hex(&id);
    id.push_str(&check[..3]);
    id
}

fn id_parts(book_id: &str) -> (char, Vec<String>) {
    if book_id.bytes().all(|b| b.is_ascii_digit()) {
        let parts = book_id
            .as_bytes()
            .chunks(9)
            .map(|chunk| {
                let n = chunk
                    .iter()
                    .fold(0u64, |n, d| n * 10 + u64::from(d - b'0'));
                format!("{n:x}")
            })
            .collect();
        return ('3', parts);
    }

    let mut hex = String::with_capacity(book_id.len() * 2);
    for c in book_id.chars() {
        let _ = write!(&mut hex, "{:x}", u32::from(c));
    }
    ('4', vec![hex])
}

fn md5_hex(s: &str) -> String {
    let digest = Md5::digest(s.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids() {
        assert_eq!(reader_id("695233"), "ce032b305a9bc1ce0b0dd2a");
        // Ten digits split into a 9-digit chunk and a remainder
        assert_eq!(reader_id("3300032719"), "e2b32140813ab7347g019ccf");
    }

    #[test]
    fn test_other_ids_use_code_points() {
        assert_eq!(reader_id("CB_abc"), "25042180c43425f616263fc5");
        // Short ids are padded with digest characters
        assert_eq!(reader_id("a"), "0cc426102610cc175b9c64e");
    }

    #[test]
    fn test_reader_url() {
        assert_eq!(
            reader_url("695233"),
            "https://weread.qq.com/web/reader/ce032b305a9bc1ce0b0dd2a"
        );
    }
}
