//! Defensive percent-decoding of `key=value&...` text.
//!
//! Decoding is strict about escape syntax: `%` must be followed by two hex
//! digits, and the decoded bytes must be utf-8. Anything else is reported as a
//! [`DecodeError`] so the caller can fall back to the raw text instead of
//! failing the request.

use crate::error::DecodeError;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// A decoded pair, plus the decode failures hit while producing it.
#[derive(Debug)]
pub(crate) struct DecodedPair {
    pub(crate) key: String,
    pub(crate) value: String,
    pub(crate) failures: Vec<(String, DecodeError)>,
}

/// Decodes one component using form semantics (`+` is a space).
pub(crate) fn decode_component(raw: &str) -> Result<String, DecodeError> {
    let bytes = raw.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let valid = bytes.get(index + 1..index + 3).is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(DecodeError::invalid_escape(index));
            }
            index += 3;
        } else {
            index += 1;
        }
    }

    let spaced: Cow<'_, str> = if raw.contains('+') { Cow::Owned(raw.replace('+', " ")) } else { Cow::Borrowed(raw) };
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_utf8| DecodeError::InvalidUtf8)
}

/// Splits `raw` on `&` and decodes each side of every `key=value` segment.
///
/// Empty segments are skipped, a segment without `=` has an empty value. Keys
/// and values that fail to decode keep their raw text.
pub(crate) fn parse_pairs(raw: &str) -> Vec<DecodedPair> {
    raw.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
            let mut failures = Vec::new();
            let key = decode_or_keep(raw_key, &mut failures);
            let value = decode_or_keep(raw_value, &mut failures);
            DecodedPair { key, value, failures }
        })
        .collect()
}

/// Decodes `raw`, or returns it unchanged and records why.
pub(crate) fn decode_or_keep(raw: &str, failures: &mut Vec<(String, DecodeError)>) -> String {
    match decode_component(raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            failures.push((raw.to_owned(), e));
            raw.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_and_escaped() {
        assert_eq!(decode_component("hello").unwrap(), "hello");
        assert_eq!(decode_component("a%20b").unwrap(), "a b");
        assert_eq!(decode_component("a+b").unwrap(), "a b");
        assert_eq!(decode_component("%E4%BD%A0%E5%A5%BD").unwrap(), "你好");
        assert_eq!(decode_component("").unwrap(), "");
    }

    #[test]
    fn test_decode_rejects_bad_escape() {
        assert_eq!(decode_component("%zz"), Err(DecodeError::InvalidEscape { position: 0 }));
        assert_eq!(decode_component("100%"), Err(DecodeError::InvalidEscape { position: 3 }));
        assert_eq!(decode_component("ab%4"), Err(DecodeError::InvalidEscape { position: 2 }));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode_component("%ff%fe"), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_parse_pairs_falls_back_to_raw() {
        let pairs = parse_pairs("k=%zz&name=tom%20cat&&flag");
        assert_eq!(pairs.len(), 3);

        assert_eq!(pairs[0].key, "k");
        assert_eq!(pairs[0].value, "%zz");
        assert_eq!(pairs[0].failures.len(), 1);
        assert_eq!(pairs[0].failures[0].0, "%zz");

        assert_eq!(pairs[1].value, "tom cat");
        assert!(pairs[1].failures.is_empty());

        assert_eq!(pairs[2].key, "flag");
        assert_eq!(pairs[2].value, "");
    }
}
