use std::borrow::Cow;
use std::fmt;

use crate::{Error, Result};

/// Regular expression matcher that renders as a `/source/flags` literal.
///
/// Matching is a substring search; anchor the source when the whole text
/// must match.
#[derive(Debug, Clone)]
pub struct Pattern {
    backend: fancy_regex::Regex,
    source: String,
    flags: String,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        PatternBuilder::new(source).build()
    }

    /// Parses regex literal text such as `/^hello/i`.
    pub fn parse_literal(literal: &str) -> Result<Self> {
        let body = literal.strip_prefix('/').ok_or_else(|| {
            Error::InvalidPattern(format!("literal must start with '/': {literal}"))
        })?;
        let close = body.rfind('/').ok_or_else(|| {
            Error::InvalidPattern(format!("literal is missing closing '/': {literal}"))
        })?;
        let (source, flags) = (&body[..close], &body[close + 1..]);

        let mut builder = PatternBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                // Matching is stateless, so these change nothing.
                'g' | 'y' | 'u' => {}
                other => {
                    return Err(Error::InvalidPattern(format!(
                        "unsupported flag '{other}' in {literal}"
                    )));
                }
            }
        }
        builder.build()
    }

    /// Backtracking limit errors count as no match.
    pub fn is_match(&self, text: &str) -> bool {
        self.backend.is_match(text).unwrap_or(false)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[derive(Debug, Clone)]
pub struct PatternBuilder {
    source: String,
    case_insensitive: bool,
    multi_line: bool,
    dot_matches_new_line: bool,
}

impl PatternBuilder {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            case_insensitive: false,
            multi_line: false,
            dot_matches_new_line: false,
        }
    }

    pub fn case_insensitive(&mut self, enabled: bool) -> &mut Self {
        self.case_insensitive = enabled;
        self
    }

    pub fn multi_line(&mut self, enabled: bool) -> &mut Self {
        self.multi_line = enabled;
        self
    }

    pub fn dot_matches_new_line(&mut self, enabled: bool) -> &mut Self {
        self.dot_matches_new_line = enabled;
        self
    }

    pub fn build(&self) -> Result<Pattern> {
        let mut builder = fancy_regex::RegexBuilder::new(&self.source);
        builder.case_insensitive(self.case_insensitive);
        builder.multi_line(self.multi_line);
        builder.dot_matches_new_line(self.dot_matches_new_line);
        let backend = builder
            .build()
            .map_err(|err| Error::InvalidPattern(format!("{}: {err}", self.source)))?;

        let mut flags = String::new();
        if self.case_insensitive {
            flags.push('i');
        }
        if self.multi_line {
            flags.push('m');
        }
        if self.dot_matches_new_line {
            flags.push('s');
        }

        Ok(Pattern {
            backend,
            source: self.source.clone(),
            flags,
        })
    }
}

/// Escapes regex metacharacters so `value` matches literally.
pub fn escape(value: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(value.len());
    let mut changed = false;

    for ch in value.chars() {
        if is_regex_meta(ch) {
            out.push('\\');
            changed = true;
        }
        out.push(ch);
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(value)
    }
}

fn is_regex_meta(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '/'
    )
}
