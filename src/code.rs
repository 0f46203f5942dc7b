//! Transfer code generation and extraction.
//!
//! Every payment intent gets a code like `PAYR-7KQ2XN` that the payer must
//! include in the bank transfer description. Banks mangle descriptions
//! freely (case folding, concatenation with other text), so extraction is a
//! case-insensitive scan over the raw text rather than an exact match.

use rand::rngs::OsRng;
use rand::Rng;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};

pub const CODE_PREFIX: &str = "PAYR-";
pub const CODE_SUFFIX_LEN: usize = 6;

/// Unambiguous by construction: uppercase letters and digits only.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Collisions at 36^6 are vanishingly rare; the bound keeps a corrupted
/// RNG or a nearly-full namespace from spinning forever.
const MAX_GENERATION_ATTEMPTS: u32 = 16;

/// Generate a transfer code that is unique among all payment intents.
pub fn generate_transfer_code(conn: &Connection) -> Result<String> {
    let mut rng = OsRng;
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        let code = format!("{}{}", CODE_PREFIX, suffix);
        if !queries::transfer_code_exists(conn, &code)? {
            return Ok(code);
        }
    }
    Err(AppError::Internal(
        "exhausted transfer code generation attempts".to_string(),
    ))
}

/// Extract a transfer code from free-form bank description text.
///
/// Scans for `PAYR-` followed by exactly six alphanumerics, case-insensitive,
/// anywhere in the text. First match wins. The returned code is uppercased
/// to the canonical form.
pub fn parse_transfer_code(description: &str) -> Option<String> {
    let bytes = description.as_bytes();
    let prefix = CODE_PREFIX.as_bytes();
    let total_len = prefix.len() + CODE_SUFFIX_LEN;

    let mut i = 0;
    while i + total_len <= bytes.len() {
        if bytes[i..i + prefix.len()].eq_ignore_ascii_case(prefix) {
            let suffix = &bytes[i + prefix.len()..i + total_len];
            if suffix.iter().all(|b| b.is_ascii_alphanumeric()) {
                let code: String = description[i..i + total_len].to_ascii_uppercase();
                return Some(code);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact() {
        assert_eq!(
            parse_transfer_code("PAYR-7KQ2XN"),
            Some("PAYR-7KQ2XN".to_string())
        );
    }

    #[test]
    fn test_parse_buried_in_text() {
        assert_eq!(
            parse_transfer_code("CHUYEN TIEN PAYR-AB12CD THANH TOAN"),
            Some("PAYR-AB12CD".to_string())
        );
        assert_eq!(
            parse_transfer_code("xxPAYR-AB12CDyy"),
            Some("PAYR-AB12CD".to_string())
        );
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            parse_transfer_code("payr-ab12cd"),
            Some("PAYR-AB12CD".to_string())
        );
        assert_eq!(
            parse_transfer_code("Payr-Ab12Cd"),
            Some("PAYR-AB12CD".to_string())
        );
    }

    #[test]
    fn test_parse_first_match_wins() {
        assert_eq!(
            parse_transfer_code("PAYR-AAAAAA then PAYR-BBBBBB"),
            Some("PAYR-AAAAAA".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_short_suffix() {
        assert_eq!(parse_transfer_code("PAYR-AB12C"), None);
        assert_eq!(parse_transfer_code("PAYR-"), None);
        assert_eq!(parse_transfer_code("no code here"), None);
    }

    #[test]
    fn test_parse_longer_suffix_takes_first_six() {
        // Banks concatenate; a seventh alphanumeric just trails the code.
        assert_eq!(
            parse_transfer_code("PAYR-AB12CD9"),
            Some("PAYR-AB12CD".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_non_alphanumeric_suffix() {
        assert_eq!(parse_transfer_code("PAYR-AB 2CD"), None);
        assert_eq!(parse_transfer_code("PAYR-AB-2CD"), None);
    }

    #[test]
    fn test_generated_codes_parse_back() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let code = generate_transfer_code(&conn).unwrap();
        assert!(code.starts_with(CODE_PREFIX));
        assert_eq!(code.len(), CODE_PREFIX.len() + CODE_SUFFIX_LEN);
        assert_eq!(parse_transfer_code(&code), Some(code.clone()));
    }
}
