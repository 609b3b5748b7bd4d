//! Canonical serialization of primary-key values.
//!
//! A record key is a list of `(column, value)` pairs in primary-key order,
//! encoded as `column=value` segments joined by `;`. Backslash, `=` and `;`
//! inside a column or value are escaped with a backslash, so distinct pair
//! lists always encode to distinct strings and every key decodes back to the
//! pairs it was built from.
//!
//! ```
//! use quill_audit::RecordKey;
//!
//! let key = RecordKey::from_pairs([("tenant", "acme"), ("id", "42")]);
//! assert_eq!(key.as_str(), "tenant=acme;id=42");
//! assert_eq!(
//!     RecordKey::parse(key.as_str()).unwrap(),
//!     vec![("tenant".to_string(), "acme".to_string()), ("id".to_string(), "42".to_string())]
//! );
//! ```

use std::fmt;

use crate::error::RecordKeyError;

const ESCAPE: char = '\\';
const ASSIGN: char = '=';
const SEPARATOR: char = ';';

/// An encoded record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    /// Encode key columns in the order given.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut encoded = String::new();
        for (index, (column, value)) in pairs.into_iter().enumerate() {
            if index > 0 {
                encoded.push(SEPARATOR);
            }
            escape_into(&mut encoded, column.as_ref());
            encoded.push(ASSIGN);
            escape_into(&mut encoded, value.as_ref());
        }
        Self(encoded)
    }

    /// Encode a single-column key.
    pub fn single(column: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self::from_pairs([(column, value)])
    }

    /// Decode an encoded key back into its pairs.
    pub fn parse(encoded: &str) -> Result<Vec<(String, String)>, RecordKeyError> {
        let mut pairs = Vec::new();
        if encoded.is_empty() {
            return Ok(pairs);
        }

        let mut column = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = encoded.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => {
                    let escaped = chars.next().ok_or(RecordKeyError::DanglingEscape)?;
                    if !matches!(escaped, ESCAPE | ASSIGN | SEPARATOR) {
                        return Err(RecordKeyError::InvalidEscape(escaped));
                    }
                    if in_value {
                        value.push(escaped);
                    } else {
                        column.push(escaped);
                    }
                }
                ASSIGN if in_value => return Err(RecordKeyError::ExtraSeparator(pairs.len())),
                ASSIGN => in_value = true,
                SEPARATOR => {
                    if !in_value {
                        return Err(RecordKeyError::MissingSeparator(pairs.len()));
                    }
                    pairs.push((std::mem::take(&mut column), std::mem::take(&mut value)));
                    in_value = false;
                }
                other if in_value => value.push(other),
                other => column.push(other),
            }
        }

        if !in_value {
            return Err(RecordKeyError::MissingSeparator(pairs.len()));
        }
        pairs.push((column, value));
        Ok(pairs)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        if matches!(c, ESCAPE | ASSIGN | SEPARATOR) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}
