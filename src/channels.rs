use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

use crate::expectation::PropValue;
use crate::feedback::{FeedbackState, MockFeedback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueMode {
    Flush,
    Queue,
    CategoryFlush,
}

/// Per-utterance properties passed along with `speak`.
#[derive(Default)]
pub struct SpeechProperties {
    pub start_callback: Option<Box<dyn FnOnce()>>,
    pub end_callback: Option<Box<dyn FnOnce()>>,
}

impl SpeechProperties {
    pub fn on_start(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.start_callback = Some(Box::new(callback));
        self
    }

    pub fn on_end(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.end_callback = Some(Box::new(callback));
        self
    }

    /// Start then end, as one callback. `None` when neither is set.
    fn into_combined_callback(self) -> Option<Box<dyn FnOnce()>> {
        let Self {
            start_callback,
            end_callback,
        } = self;
        if start_callback.is_none() && end_callback.is_none() {
            return None;
        }
        Some(Box::new(move || {
            if let Some(start) = start_callback {
                start();
            }
            if let Some(end) = end_callback {
                end();
            }
        }))
    }
}

impl fmt::Debug for SpeechProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechProperties")
            .field("start_callback", &self.start_callback.is_some())
            .field("end_callback", &self.end_callback.is_some())
            .finish()
    }
}

/// Braille display content with cursor offsets. `-1` means no cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavBraille {
    pub text: String,
    pub start_index: i64,
    pub end_index: i64,
}

impl NavBraille {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_index: -1,
            end_index: -1,
        }
    }

    pub fn with_cursor(mut self, start_index: i64, end_index: i64) -> Self {
        self.start_index = start_index;
        self.end_index = end_index;
        self
    }

    pub fn property(&self, name: &str) -> Option<PropValue> {
        match name {
            "text" => Some(PropValue::Text(self.text.clone())),
            "start_index" => Some(PropValue::Int(self.start_index)),
            "end_index" => Some(PropValue::Int(self.end_index)),
            _ => None,
        }
    }
}

impl fmt::Display for NavBraille {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub trait TtsSink {
    fn speak(&self, text: &str, queue_mode: QueueMode, properties: SpeechProperties);
}

pub trait BrailleSink {
    fn write(&self, content: NavBraille);
}

/// One captured emission waiting to be consumed by an expectation.
pub(crate) struct PendingOutput {
    pub(crate) text: String,
    pub(crate) start_index: Option<i64>,
    pub(crate) end_index: Option<i64>,
    pub(crate) braille: Option<NavBraille>,
    pub(crate) callback: Option<Box<dyn FnOnce()>>,
}

impl PendingOutput {
    pub(crate) fn utterance(text: &str, properties: SpeechProperties) -> Self {
        Self {
            text: text.to_string(),
            start_index: None,
            end_index: None,
            braille: None,
            callback: properties.into_combined_callback(),
        }
    }

    pub(crate) fn braille(content: NavBraille) -> Self {
        Self {
            text: content.to_string(),
            start_index: Some(content.start_index),
            end_index: Some(content.end_index),
            braille: Some(content),
            callback: None,
        }
    }

    pub(crate) fn property(&self, name: &str) -> Option<PropValue> {
        match &self.braille {
            Some(content) => content.property(name),
            None if name == "text" => Some(PropValue::Text(self.text.clone())),
            None => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        let mut out = format!("'{}'", self.text);
        if let Some(start_index) = self.start_index {
            out.push_str(&format!(" start_index={start_index}"));
        }
        if let Some(end_index) = self.end_index {
            out.push_str(&format!(" end_index={end_index}"));
        }
        out
    }
}

impl fmt::Debug for PendingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOutput")
            .field("text", &self.text)
            .field("start_index", &self.start_index)
            .field("end_index", &self.end_index)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Speech sink that feeds a [`MockFeedback`] instead of a speech engine.
#[derive(Clone)]
pub struct MockTts {
    pub(crate) feedback: Weak<RefCell<FeedbackState>>,
}

impl TtsSink for MockTts {
    fn speak(&self, text: &str, _queue_mode: QueueMode, properties: SpeechProperties) {
        if let Some(feedback) = MockFeedback::upgrade(&self.feedback) {
            feedback.add_utterance(PendingOutput::utterance(text, properties));
        }
    }
}

impl fmt::Debug for MockTts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTts")
            .field("attached", &(self.feedback.strong_count() > 0))
            .finish()
    }
}

/// Braille sink that feeds a [`MockFeedback`] instead of a display.
#[derive(Clone)]
pub struct MockBraille {
    pub(crate) feedback: Weak<RefCell<FeedbackState>>,
}

impl BrailleSink for MockBraille {
    fn write(&self, content: NavBraille) {
        if let Some(feedback) = MockFeedback::upgrade(&self.feedback) {
            feedback.add_braille(PendingOutput::braille(content));
        }
    }
}

impl fmt::Debug for MockBraille {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBraille")
            .field("attached", &(self.feedback.strong_count() > 0))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InstalledSinks {
    pub tts: MockTts,
    pub braille: MockBraille,
}
