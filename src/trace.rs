use std::collections::VecDeque;

use crate::{Error, Result};

pub(crate) const DEFAULT_LOG_LIMIT: usize = 10_000;

/// Bounded log of diagnostic and trace lines, optionally mirrored to stderr.
#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            logs: VecDeque::new(),
            log_limit: DEFAULT_LOG_LIMIT,
            to_stderr: true,
        }
    }
}

impl TraceState {
    pub(crate) fn set_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_log_limit requires at least 1 entry".into(),
            ));
        }
        self.log_limit = max_entries;
        while self.logs.len() > self.log_limit {
            self.logs.pop_front();
        }
        Ok(())
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs).into()
    }

    /// Recorded only while tracing is enabled.
    pub(crate) fn trace_line(&mut self, line: String) {
        if self.enabled {
            self.log_line(line);
        }
    }

    pub(crate) fn log_line(&mut self, line: String) {
        if self.to_stderr {
            eprintln!("{line}");
        }
        if self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}
