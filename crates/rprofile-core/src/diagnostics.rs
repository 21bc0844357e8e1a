//! Accumulator for messages that must reach the user once per command:
//! configuration issues, deprecation notices, and errors that were logged
//! without aborting the command.

use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

/// Owned by the command being run and flushed once at its boundary.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Notice>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    pub fn extend_warnings<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for message in messages {
            self.warn(message);
        }
    }

    pub fn entries(&self) -> &[Notice] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|n| n.severity == Severity::Error)
            .map(|n| n.message.as_str())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|n| n.severity == Severity::Warning)
            .map(|n| n.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit every pending notice through `tracing` and clear the list.
    ///
    /// Returns how many notices were emitted.
    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        for notice in self.entries.drain(..) {
            match notice.severity {
                Severity::Warning => warn!("{}", notice.message),
                Severity::Error => error!("{}", notice.message),
            }
        }
        count
    }

    fn push(&mut self, severity: Severity, message: String) {
        // The same issue is often raised by every profile that triggers it.
        if self
            .entries
            .iter()
            .any(|n| n.severity == severity && n.message == message)
        {
            return;
        }
        self.entries.push(Notice { severity, message });
    }
}
