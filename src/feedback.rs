use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::channels::{InstalledSinks, MockBraille, MockTts, NavBraille, PendingOutput};
use crate::expectation::{BrailleProperties, Expectation, TextMatcher, match_and_consume};
use crate::trace::TraceState;
use crate::{Error, Result};

/// Stall time before the pending state is logged.
pub const DEFAULT_DIAGNOSTIC_DELAY_MS: i64 = 2_000;

pub(crate) struct FeedbackState {
    finished_callback: Option<Box<dyn FnOnce()>>,
    finished: bool,
    replaying: bool,
    in_process: bool,
    pending_actions: VecDeque<Expectation>,
    pending_utterances: VecDeque<PendingOutput>,
    pending_braille: VecDeque<PendingOutput>,
    last_matched_braille: Option<NavBraille>,
    now_ms: i64,
    diagnostic_due_at: Option<i64>,
    diagnostic_delay_ms: i64,
    trace: TraceState,
}

enum Step {
    Callback(Box<dyn FnOnce()>),
    Consumed(Vec<PendingOutput>),
    Stalled,
    Drained(Option<Box<dyn FnOnce()>>),
}

impl FeedbackState {
    fn new(finished_callback: Option<Box<dyn FnOnce()>>) -> Self {
        Self {
            finished_callback,
            finished: false,
            replaying: false,
            in_process: false,
            pending_actions: VecDeque::new(),
            pending_utterances: VecDeque::new(),
            pending_braille: VecDeque::new(),
            last_matched_braille: None,
            now_ms: 0,
            diagnostic_due_at: None,
            diagnostic_delay_ms: DEFAULT_DIAGNOSTIC_DELAY_MS,
            trace: TraceState::default(),
        }
    }

    fn ensure_not_replaying(&self, operation: &'static str) -> Result<()> {
        if self.replaying {
            return Err(Error::AlreadyReplaying { operation });
        }
        Ok(())
    }

    /// Advances the head of the queue by at most one entry. Callbacks are
    /// handed back to the caller so they run without the state borrowed.
    fn next_step(&mut self) -> Step {
        let Some(head) = self.pending_actions.front() else {
            self.finished = true;
            let finished = self.finished_callback.take();
            if finished.is_some() {
                self.trace.trace_line("[feedback] finished".into());
            }
            return Step::Drained(finished);
        };

        let consumed = match head {
            Expectation::Callback(_) => None,
            Expectation::Speech(matcher) => match_and_consume(
                matcher,
                &BrailleProperties::default(),
                &mut self.pending_utterances,
            ),
            Expectation::Braille(matcher, props) => {
                match_and_consume(matcher, props, &mut self.pending_braille)
            }
        };

        if consumed.is_none() && !matches!(head, Expectation::Callback(_)) {
            self.schedule_diagnostic();
            return Step::Stalled;
        }

        let Some(action) = self.pending_actions.pop_front() else {
            return Step::Stalled;
        };
        self.cancel_diagnostic();
        match (action, consumed) {
            (Expectation::Callback(callback), _) => {
                self.trace.trace_line("[feedback] callback".into());
                Step::Callback(callback)
            }
            (action, Some(consumed)) => {
                if let Expectation::Braille(..) = action {
                    self.last_matched_braille =
                        consumed.last().and_then(|item| item.braille.clone());
                }
                self.trace.trace_line(format!(
                    "[feedback] matched {action} consumed={}",
                    consumed.len()
                ));
                Step::Consumed(consumed)
            }
            (_, None) => Step::Stalled,
        }
    }

    fn schedule_diagnostic(&mut self) {
        if self.diagnostic_due_at.is_some() {
            return;
        }
        let due_at = self.now_ms.saturating_add(self.diagnostic_delay_ms);
        self.diagnostic_due_at = Some(due_at);
        self.trace.trace_line(format!(
            "[timer] schedule diagnostic due_at={} delay_ms={}",
            due_at, self.diagnostic_delay_ms
        ));
    }

    fn cancel_diagnostic(&mut self) {
        if let Some(due_at) = self.diagnostic_due_at.take() {
            self.trace
                .trace_line(format!("[timer] cancel diagnostic due_at={due_at}"));
        }
    }

    fn run_due_timers_internal(&mut self) -> usize {
        match self.diagnostic_due_at {
            Some(due_at) if due_at <= self.now_ms => {
                self.trace.trace_line(format!(
                    "[timer] run diagnostic due_at={} now_ms={}",
                    due_at, self.now_ms
                ));
                self.log_pending_state();
                self.diagnostic_due_at = None;
                1
            }
            _ => 0,
        }
    }

    fn log_pending_state(&mut self) {
        if let Some(head) = self.pending_actions.front() {
            let line = format!("Still waiting for {head}");
            self.trace.log_line(line);
        }
        let sections = [
            ("speech utterances", describe_all(&self.pending_utterances)),
            ("braille", describe_all(&self.pending_braille)),
        ];
        for (desc, items) in sections {
            if items.is_empty() {
                continue;
            }
            self.trace.log_line(format!("Pending {desc}:"));
            for item in items {
                self.trace.log_line(format!("  {item}"));
            }
        }
    }
}

fn describe_all(pending: &VecDeque<PendingOutput>) -> Vec<String> {
    pending.iter().map(PendingOutput::describe).collect()
}

/// Resets the re-entrancy flag even when a user callback panics.
struct ProcessGuard<'a> {
    inner: &'a RefCell<FeedbackState>,
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.try_borrow_mut() {
            state.in_process = false;
        }
    }
}

/// Combined mock for speech and braille feedback.
///
/// Clones share one queue, so callbacks can capture a handle and inspect
/// [`MockFeedback::last_matched_braille`] or emit more output.
#[derive(Clone)]
pub struct MockFeedback {
    inner: Rc<RefCell<FeedbackState>>,
}

impl MockFeedback {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(FeedbackState::new(None))),
        }
    }

    /// `finished` runs once, when every expectation has been met.
    pub fn with_finished(finished: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FeedbackState::new(Some(Box::new(finished))))),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<FeedbackState>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn install_speech_sink(&self) -> Result<MockTts> {
        self.inner
            .borrow()
            .ensure_not_replaying("install_speech_sink")?;
        Ok(MockTts {
            feedback: Rc::downgrade(&self.inner),
        })
    }

    pub fn install_braille_sink(&self) -> Result<MockBraille> {
        self.inner
            .borrow()
            .ensure_not_replaying("install_braille_sink")?;
        Ok(MockBraille {
            feedback: Rc::downgrade(&self.inner),
        })
    }

    pub fn install(&self) -> Result<InstalledSinks> {
        Ok(InstalledSinks {
            tts: self.install_speech_sink()?,
            braille: self.install_braille_sink()?,
        })
    }

    pub fn expect_speech(&self, matcher: impl Into<TextMatcher>) -> Result<&Self> {
        self.expect_speech_all([matcher])
    }

    /// One expectation per element, in order.
    pub fn expect_speech_all<I, M>(&self, matchers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = M>,
        M: Into<TextMatcher>,
    {
        let mut state = self.inner.borrow_mut();
        state.ensure_not_replaying("expect_speech")?;
        for matcher in matchers {
            state
                .pending_actions
                .push_back(Expectation::Speech(matcher.into()));
        }
        Ok(self)
    }

    pub fn expect_braille(&self, matcher: impl Into<TextMatcher>) -> Result<&Self> {
        self.expect_braille_with(matcher, BrailleProperties::default())
    }

    pub fn expect_braille_with(
        &self,
        matcher: impl Into<TextMatcher>,
        properties: BrailleProperties,
    ) -> Result<&Self> {
        let mut state = self.inner.borrow_mut();
        state.ensure_not_replaying("expect_braille")?;
        state
            .pending_actions
            .push_back(Expectation::Braille(matcher.into(), properties));
        Ok(self)
    }

    /// Runs `callback` after every earlier expectation has been met.
    pub fn call(&self, callback: impl FnOnce() + 'static) -> Result<&Self> {
        let mut state = self.inner.borrow_mut();
        state.ensure_not_replaying("call")?;
        state
            .pending_actions
            .push_back(Expectation::Callback(Box::new(callback)));
        Ok(self)
    }

    /// Starts matching buffered and future output. Only callable once.
    pub fn replay(&self) -> Result<()> {
        {
            let mut state = self.inner.borrow_mut();
            state.ensure_not_replaying("replay")?;
            state.replaying = true;
            let line = format!(
                "[feedback] replay pending_expectations={} utterances={} braille={}",
                state.pending_actions.len(),
                state.pending_utterances.len(),
                state.pending_braille.len()
            );
            state.trace.trace_line(line);
        }
        self.process();
        Ok(())
    }

    pub fn is_replaying(&self) -> bool {
        self.inner.borrow().replaying
    }

    /// True once the queue has drained after `replay`.
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().finished
    }

    /// The braille content of the most recent braille match.
    pub fn last_matched_braille(&self) -> Result<Option<NavBraille>> {
        let state = self.inner.borrow();
        if !state.replaying {
            return Err(Error::NotReplaying {
                operation: "last_matched_braille",
            });
        }
        Ok(state.last_matched_braille.clone())
    }

    /// Descriptions of the unmet expectations, head first.
    pub fn pending_expectations(&self) -> Vec<String> {
        self.inner
            .borrow()
            .pending_actions
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn pending_utterances(&self) -> Vec<String> {
        let state = self.inner.borrow();
        state
            .pending_utterances
            .iter()
            .map(|item| item.text.clone())
            .collect()
    }

    pub fn pending_braille(&self) -> Vec<String> {
        let state = self.inner.borrow();
        state
            .pending_braille
            .iter()
            .map(|item| item.text.clone())
            .collect()
    }

    pub(crate) fn add_utterance(&self, item: PendingOutput) {
        {
            let mut state = self.inner.borrow_mut();
            let line = format!("[feedback] buffered speech '{}'", item.text);
            state.trace.trace_line(line);
            state.pending_utterances.push_back(item);
        }
        self.process();
    }

    pub(crate) fn add_braille(&self, item: PendingOutput) {
        {
            let mut state = self.inner.borrow_mut();
            let line = format!("[feedback] buffered braille {}", item.describe());
            state.trace.trace_line(line);
            state.pending_braille.push_back(item);
        }
        self.process();
    }

    fn process(&self) {
        {
            let mut state = self.inner.borrow_mut();
            if !state.replaying || state.in_process {
                return;
            }
            state.in_process = true;
        }
        let _guard = ProcessGuard { inner: &self.inner };

        loop {
            let step = self.inner.borrow_mut().next_step();
            match step {
                Step::Callback(callback) => callback(),
                Step::Consumed(consumed) => {
                    for item in consumed {
                        if let Some(callback) = item.callback {
                            callback();
                        }
                    }
                }
                Step::Stalled => break,
                Step::Drained(finished) => {
                    if let Some(finished) = finished {
                        finished();
                    }
                    break;
                }
            }
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.borrow().now_ms
    }

    /// Due time of the armed diagnostic timer, if any.
    pub fn pending_diagnostic(&self) -> Option<i64> {
        self.inner.borrow().diagnostic_due_at
    }

    pub fn advance_time(&self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::InvalidConfig(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let mut state = self.inner.borrow_mut();
        let from = state.now_ms;
        state.now_ms = state.now_ms.saturating_add(delta_ms);
        let ran = state.run_due_timers_internal();
        let line = format!(
            "[timer] advance delta_ms={} from={} to={} ran_due={}",
            delta_ms, from, state.now_ms, ran
        );
        state.trace.trace_line(line);
        Ok(())
    }

    pub fn advance_time_to(&self, target_ms: i64) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if target_ms < state.now_ms {
            return Err(Error::InvalidConfig(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={})",
                state.now_ms
            )));
        }
        let from = state.now_ms;
        state.now_ms = target_ms;
        let ran = state.run_due_timers_internal();
        let line = format!(
            "[timer] advance_to from={} to={} ran_due={}",
            from, state.now_ms, ran
        );
        state.trace.trace_line(line);
        Ok(())
    }

    pub fn run_due_timers(&self) -> usize {
        self.inner.borrow_mut().run_due_timers_internal()
    }

    pub fn set_diagnostic_delay_ms(&self, delay_ms: i64) -> Result<()> {
        if delay_ms < 0 {
            return Err(Error::InvalidConfig(
                "set_diagnostic_delay_ms requires non-negative milliseconds".into(),
            ));
        }
        self.inner.borrow_mut().diagnostic_delay_ms = delay_ms;
        Ok(())
    }

    pub fn enable_trace(&self, enabled: bool) {
        self.inner.borrow_mut().trace.enabled = enabled;
    }

    pub fn set_log_stderr(&self, enabled: bool) {
        self.inner.borrow_mut().trace.to_stderr = enabled;
    }

    pub fn set_log_limit(&self, max_entries: usize) -> Result<()> {
        self.inner.borrow_mut().trace.set_log_limit(max_entries)
    }

    pub fn take_logs(&self) -> Vec<String> {
        self.inner.borrow_mut().trace.take()
    }
}

impl Default for MockFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(state) = self.inner.try_borrow() else {
            return f.write_str("MockFeedback { <busy> }");
        };
        f.debug_struct("MockFeedback")
            .field("replaying", &state.replaying)
            .field("finished", &state.finished)
            .field("pending_actions", &state.pending_actions)
            .field("pending_utterances", &state.pending_utterances)
            .field("pending_braille", &state.pending_braille)
            .field("now_ms", &state.now_ms)
            .field("diagnostic_due_at", &state.diagnostic_due_at)
            .finish()
    }
}
