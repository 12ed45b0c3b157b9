//! Checksum records and digest comparison.

use std::fmt;

/// Largest checksum object we are willing to read; real ones are one line.
pub const MAX_CHECKSUM_RECORD_LEN: usize = 4096;

/// Expected digest of an object's decompressed bytes, as published next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    digest: String,
}

impl ChecksumRecord {
    /// Parses a checksum object body.
    ///
    /// Accepts a bare hex digest or `sha256sum` output (`<digest>  <name>`);
    /// only the first token is kept. Returns `None` for empty, oversized or
    /// non-UTF-8 bodies, which callers treat the same as a missing record.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() > MAX_CHECKSUM_RECORD_LEN {
            return None;
        }
        let text = std::str::from_utf8(body).ok()?;
        let digest = text.split_whitespace().next()?;
        Some(Self {
            digest: digest.to_ascii_lowercase(),
        })
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ChecksumRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Result of comparing a computed digest with a checksum record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The record matched the computed digest.
    Match,
    /// The record disagrees with the computed digest.
    Mismatch,
    /// No record was available; nothing was confirmed.
    Skipped,
}

/// Compares `computed` (lowercase hex) against an optional record.
pub fn verify(expected: Option<&ChecksumRecord>, computed: &str) -> VerificationOutcome {
    match expected {
        None => VerificationOutcome::Skipped,
        Some(record) if record.digest.eq_ignore_ascii_case(computed) => VerificationOutcome::Match,
        Some(_) => VerificationOutcome::Mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_bare_and_sha256sum_formats() {
        let bare = ChecksumRecord::parse(format!("{}\n", DIGEST).as_bytes()).unwrap();
        assert_eq!(bare.digest(), DIGEST);

        let sum = ChecksumRecord::parse(format!("{}  daily.cld\n", DIGEST.to_uppercase()).as_bytes())
            .unwrap();
        assert_eq!(sum.digest(), DIGEST);
    }

    #[test]
    fn test_parse_rejects_unusable_bodies() {
        assert_eq!(ChecksumRecord::parse(b""), None);
        assert_eq!(ChecksumRecord::parse(b"  \n\t"), None);
        assert_eq!(ChecksumRecord::parse(&[0xff, 0xfe, 0x00]), None);
        assert_eq!(
            ChecksumRecord::parse(&vec![b'a'; MAX_CHECKSUM_RECORD_LEN + 1]),
            None
        );
    }

    #[test]
    fn test_verify_outcomes_are_distinct() {
        let record = ChecksumRecord::parse(DIGEST.as_bytes()).unwrap();
        assert_eq!(verify(Some(&record), DIGEST), VerificationOutcome::Match);
        assert_eq!(
            verify(Some(&record), &"0".repeat(64)),
            VerificationOutcome::Mismatch
        );
        assert_eq!(verify(None, DIGEST), VerificationOutcome::Skipped);
        assert_ne!(verify(None, DIGEST), VerificationOutcome::Match);
    }
}
