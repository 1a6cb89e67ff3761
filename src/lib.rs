//! Mock speech and braille feedback for screen reader tests.
//!
//! A [`MockFeedback`] collects utterances and braille writes sent to its mock
//! sinks and matches them, in order, against expectations declared by the
//! test. Call entries run once everything declared before them has been met.
//! Feedback that matches nothing is ignored. When the queue drains the finish
//! callback runs.

use std::error::Error as StdError;
use std::fmt;

mod channels;
mod expectation;
mod feedback;
mod pattern;
mod trace;

pub use channels::{
    BrailleSink, InstalledSinks, MockBraille, MockTts, NavBraille, QueueMode, SpeechProperties,
    TtsSink,
};
pub use expectation::{BrailleProperties, PropValue, TextMatcher};
pub use feedback::{DEFAULT_DIAGNOSTIC_DELAY_MS, MockFeedback};
pub use pattern::{Pattern, PatternBuilder, escape};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyReplaying { operation: &'static str },
    NotReplaying { operation: &'static str },
    InvalidPattern(String),
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReplaying { operation } => {
                write!(f, "precondition violated: already replaying ({operation})")
            }
            Self::NotReplaying { operation } => {
                write!(f, "precondition violated: not replaying ({operation})")
            }
            Self::InvalidPattern(msg) => write!(f, "invalid pattern: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl StdError for Error {}
