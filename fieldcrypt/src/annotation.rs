//! Field annotations naming the provider and keys that protect a field.
//!
//! The textual form is `algorithm[,keyRef1[,keyRef2]]`. Segments are taken
//! verbatim: no trimming or case folding is applied, since algorithm names and
//! key references must match byte-for-byte across implementations.

use crate::error::Error;
use std::fmt;

/// Maximum number of key references an annotation may carry.
pub const MAX_KEY_REFS: usize = 2;

/// Parsed field annotation.
///
/// Parsing never fails. Syntax problems are reported by [`Annotation::validate`]
/// when the annotation is first used to transform a field.
///
/// # Example
///
/// ```
/// use fieldcrypt::annotation::Annotation;
///
/// let annotation = Annotation::parse("aes256,enckey,mackey");
/// assert_eq!(annotation.algorithm(), "aes256");
/// assert_eq!(annotation.key_ref(0), Some("enckey"));
/// assert_eq!(annotation.key_ref(1), Some("mackey"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    raw: String,
    algorithm: String,
    key_refs: Vec<String>,
}

impl Annotation {
    /// Parses an annotation string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split(',');
        let algorithm = segments.next().unwrap_or_default().to_string();
        let key_refs = segments.map(str::to_string).collect();
        Self { raw: raw.to_string(), algorithm, key_refs }
    }

    /// Returns the annotation as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the provider name.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the key reference at `index`.
    ///
    /// An empty segment counts as an absent reference.
    #[must_use]
    pub fn key_ref(&self, index: usize) -> Option<&str> {
        self.key_refs.get(index).map(String::as_str).filter(|r| !r.is_empty())
    }

    /// Returns all key reference segments in order, including empty ones.
    #[must_use]
    pub fn key_refs(&self) -> &[String] {
        &self.key_refs
    }

    /// Checks that the annotation is usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAnnotation` if the algorithm is empty or more
    /// than [`MAX_KEY_REFS`] key references are given.
    pub fn validate(&self) -> Result<(), Error> {
        if self.algorithm.is_empty() {
            return Err(self.invalid("algorithm name is empty"));
        }
        if self.key_refs.len() > MAX_KEY_REFS {
            return Err(self.invalid(&format!(
                "{} key references given (max: {MAX_KEY_REFS})",
                self.key_refs.len()
            )));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidAnnotation { annotation: self.raw.clone(), reason: reason.to_string() }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_algorithm_only() {
        let annotation = Annotation::parse("aes256");
        assert_eq!(annotation.algorithm(), "aes256");
        assert!(annotation.key_refs().is_empty());
        assert_eq!(annotation.key_ref(0), None);
        assert!(annotation.validate().is_ok());
    }

    #[test]
    fn test_parse_one_key_ref() {
        let annotation = Annotation::parse("rsa2048,pubkey");
        assert_eq!(annotation.key_ref(0), Some("pubkey"));
        assert_eq!(annotation.key_ref(1), None);
    }

    #[test]
    fn test_no_whitespace_normalization() {
        let annotation = Annotation::parse("AES256, key1");
        assert_eq!(annotation.algorithm(), "AES256");
        assert_eq!(annotation.key_ref(0), Some(" key1"));
    }

    #[test]
    fn test_empty_segment_is_absent() {
        let annotation = Annotation::parse("aes256,,mackey");
        assert_eq!(annotation.key_ref(0), None);
        assert_eq!(annotation.key_ref(1), Some("mackey"));
    }

    #[test]
    fn test_empty_algorithm_fails_on_validate() {
        let annotation = Annotation::parse(",k1,k2");
        let err = annotation.validate().unwrap_err();
        assert!(err.is(ErrorKind::InvalidAnnotation));
    }

    #[test]
    fn test_too_many_key_refs_fails_on_validate() {
        let annotation = Annotation::parse("aes256,a,b,c");
        let err = annotation.validate().unwrap_err();
        assert!(err.is(ErrorKind::InvalidAnnotation));
        assert_eq!(annotation.to_string(), "aes256,a,b,c");
    }
}
