//! Label sets and their canonical stream identity.
//!
//! A [`LabelSet`] is an immutable, sorted mapping of short string keys to
//! short string values. Two label sets are equal iff their canonical forms
//! are byte-equal, and the canonical form doubles as the on-disk directory
//! name for the stream, so the validation rules below are what keep stream
//! directories unambiguous and path-safe.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::LabelError;

/// Maximum byte length of a label key.
pub const MAX_KEY_LEN: usize = 64;
/// Maximum byte length of a label value.
pub const MAX_VALUE_LEN: usize = 256;

/// Identity of a stream: the canonical `k=v,k=v` encoding of its labels.
///
/// Used both as an index key and as the stream's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonicalized sorted set of `(key, value)` label pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// An empty label set. Matches everything as a filter; invalid as a
    /// stream identity (streams require at least one label).
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Validate and canonicalize raw label pairs.
    ///
    /// Keys must match `[a-zA-Z_][a-zA-Z0-9_]*` and stay within
    /// [`MAX_KEY_LEN`]; values must be non-empty, stay within
    /// [`MAX_VALUE_LEN`] and contain none of `=`, `,`, `/`, `\` or
    /// control characters.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            validate_key(&key)?;
            validate_value(&key, &value)?;
            map.insert(key, value);
        }
        Ok(Self(map))
    }

    /// Like [`LabelSet::try_from_pairs`] but additionally rejects an empty set.
    pub fn try_from_pairs_non_empty<I, K, V>(pairs: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let set = Self::try_from_pairs(pairs)?;
        if set.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(set)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The canonical `k=v` pairs joined with `,`, sorted by key.
    ///
    /// `=` and `,` are rejected inside keys and values, so this encoding is
    /// unambiguous and reversible.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }

    /// The stream identity derived from the canonical encoding.
    pub fn stream_id(&self) -> StreamId {
        StreamId(self.canonical())
    }

    /// Rebuild a label set from its canonical encoding.
    pub fn from_canonical(canonical: &str) -> Result<Self, LabelError> {
        if canonical.is_empty() {
            return Ok(Self::empty());
        }
        let pairs = canonical.split(',').map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| LabelError::InvalidKey(pair.to_string()))
        });
        let mut map = BTreeMap::new();
        for pair in pairs {
            let (k, v) = pair?;
            map.insert(k, v);
        }
        Ok(Self(map))
    }

    /// Subset test: every pair in `self` appears in `other`.
    ///
    /// The empty set is a subset of everything, which is what makes an
    /// empty subscriber filter match all entries.
    pub fn is_subset_of(&self, other: &LabelSet) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).is_some_and(|ov| ov == v))
    }
}

impl FromIterator<(String, String)> for LabelSet {
    /// Builds a label set without validation. Intended for trusted inputs
    /// such as decoded sidecars; external input goes through
    /// [`LabelSet::try_from_pairs`].
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        write!(f, "}}")
    }
}

fn validate_key(key: &str) -> Result<(), LabelError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(LabelError::InvalidKey(key.to_string()));
    }
    let mut chars = key.chars();
    let first = chars.next().expect("non-empty");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(LabelError::InvalidKey(key.to_string()));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(LabelError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), LabelError> {
    let reason = if value.is_empty() {
        Some("empty value")
    } else if value.len() > MAX_VALUE_LEN {
        Some("value too long")
    } else if value.contains(['=', ',', '/', '\\']) {
        Some("reserved character")
    } else if value.chars().any(char::is_control) {
        Some("control character")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(LabelError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
