use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::channels::PendingOutput;
use crate::pattern::Pattern;

/// Exact strings must equal the whole text; patterns match a substring.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Exact(String),
    Pattern(Pattern),
}

impl TextMatcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == text,
            Self::Pattern(pattern) => pattern.is_match(text),
        }
    }
}

impl From<&str> for TextMatcher {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for TextMatcher {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<&String> for TextMatcher {
    fn from(value: &String) -> Self {
        Self::Exact(value.clone())
    }
}

impl From<Pattern> for TextMatcher {
    fn from(value: Pattern) -> Self {
        Self::Pattern(value)
    }
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => f.write_str(text),
            Self::Pattern(pattern) => write!(f, "{pattern}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Text(value) => write_quoted(f, value),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in value.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

/// Fields a braille candidate must carry, each strictly equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrailleProperties {
    entries: BTreeMap<String, PropValue>,
}

impl BrailleProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub(crate) fn accepts(&self, candidate: &PendingOutput) -> bool {
        self.entries
            .iter()
            .all(|(key, expected)| candidate.property(key).as_ref() == Some(expected))
    }
}

impl fmt::Display for BrailleProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write_quoted(f, key)?;
            write!(f, ":{value}")?;
        }
        f.write_str("}")
    }
}

pub(crate) enum Expectation {
    Speech(TextMatcher),
    Braille(TextMatcher, BrailleProperties),
    Callback(Box<dyn FnOnce()>),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speech(matcher) => write!(f, "Speak '{matcher}'"),
            Self::Braille(matcher, props) => write!(f, "Braille '{matcher}' {props}"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expectation({self})")
    }
}

/// Finds the first pending item accepted by `matcher` and `props`, then
/// removes it together with everything buffered before it. The matched item
/// is last in the returned list.
pub(crate) fn match_and_consume(
    matcher: &TextMatcher,
    props: &BrailleProperties,
    pending: &mut VecDeque<PendingOutput>,
) -> Option<Vec<PendingOutput>> {
    let idx = pending
        .iter()
        .position(|candidate| matcher.matches(&candidate.text) && props.accepts(candidate))?;
    Some(pending.drain(..=idx).collect())
}
