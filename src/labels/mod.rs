//! Label sets describing a chunk's stream
//!
//! A [`LabelSet`] is kept in canonical form: sorted by name with unique
//! names. Its text form is the selector syntax `{name="value", ...}` that
//! downstream label queries understand.

mod encoder;
mod parser;

pub use encoder::{encode_labels, serialize_tags, LabelEncoder, SPAN_LABEL_NAMES};
pub use parser::parse_labels;

use regex::Regex;
use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::OnceLock;

/// Reserved label carrying the stream kind
pub const METRIC_NAME: &str = "__name__";

/// Value of [`METRIC_NAME`] for span-derived chunks
pub const SPANS_KIND: &str = "spans";

const SEPARATOR: u8 = 0xff;

fn label_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name pattern"))
}

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    label_name_regex().is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Order-independent identity of a label set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|_| LabelError::InvalidFingerprint(s.to_string()))
    }
}

/// Canonical set of labels (sorted by name, names unique)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs in any order. Names must be valid and unique.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            if set.has(&name) {
                return Err(LabelError::DuplicateName(name));
            }
            set.insert(name, value)?;
        }
        Ok(set)
    }

    /// Insert or replace a label
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), LabelError> {
        let name = name.into();
        if !is_valid_label_name(&name) {
            return Err(LabelError::InvalidName(name));
        }

        let value = value.into();
        match self.labels.binary_search_by(|l| l.name.as_str().cmp(&name)) {
            Ok(idx) => self.labels[idx].value = value,
            Err(idx) => self.labels.insert(idx, Label { name, value }),
        }
        Ok(())
    }

    /// Insert or replace a label whose name is known to be valid
    pub(crate) fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.labels.binary_search_by(|l| l.name.as_str().cmp(name)) {
            Ok(idx) => self.labels[idx].value = value,
            Err(idx) => self.labels.insert(idx, Label::new(name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.labels[idx].value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Add the reserved kind label when it is missing
    pub fn ensure_kind(&mut self) {
        if !self.has(METRIC_NAME) {
            self.set(METRIC_NAME, SPANS_KIND);
        }
    }

    /// Hash over the canonical (name-sorted) labels
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = fxhash::FxHasher64::default();
        for label in &self.labels {
            hasher.write(label.name.as_bytes());
            hasher.write_u8(SEPARATOR);
            hasher.write(label.value.as_bytes());
            hasher.write_u8(SEPARATOR);
        }
        Fingerprint(hasher.finish())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"", label.name)?;
            for c in label.value.chars() {
                match c {
                    '\\' => f.write_str("\\\\")?,
                    '"' => f.write_str("\\\"")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    c => write!(f, "{}", c)?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

impl FromStr for LabelSet {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_labels(s)
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("Invalid label name '{0}'")]
    InvalidName(String),

    #[error("Duplicate label name '{0}'")]
    DuplicateName(String),

    #[error("Label name '{0}' is reserved for span fields")]
    ReservedName(String),

    #[error("Label syntax error at offset {offset}: {reason}")]
    Syntax { offset: usize, reason: String },

    #[error("Invalid fingerprint '{0}'")]
    InvalidFingerprint(String),
}
