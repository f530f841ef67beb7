//! Diagnostics collected while a pipeline runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::ir::node::SourceRange;

/// Severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Log,
    Lint,
    Warning,
    Error,
    FatalError,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageLevel::Log => "LOG",
            MessageLevel::Lint => "LINT",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Error => "ERROR",
            MessageLevel::FatalError => "FATAL_ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub level: MessageLevel,
    /// Stable machine-readable identifier, e.g. `unexpanded_hole`.
    pub code: &'static str,
    pub text: String,
    pub range: Option<SourceRange>,
}

impl Message {
    pub fn new(level: MessageLevel, code: &'static str, text: impl Into<String>) -> Self {
        Message { level, code, text: text.into(), range: None }
    }

    pub fn at(mut self, range: Option<SourceRange>) -> Self {
        self.range = range;
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}: {}: {}: {}", self.level, range, self.code, self.text),
            None => write!(f, "{}: {}: {}", self.level, self.code, self.text),
        }
    }
}

/// Ordered message sink shared by all stages of a run.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    messages: Vec<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue::default()
    }

    pub fn add(&mut self, message: Message) {
        match message.level {
            MessageLevel::Log => debug!(code = message.code, "{}", message.text),
            MessageLevel::Lint => info!(code = message.code, "{}", message.text),
            MessageLevel::Warning => warn!(code = message.code, "{}", message.text),
            MessageLevel::Error | MessageLevel::FatalError => error!(code = message.code, "{}", message),
        }
        self.messages.push(message);
    }

    pub fn post(&mut self, level: MessageLevel, code: &'static str, text: impl Into<String>) {
        self.add(Message::new(level, code, text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_level(&self) -> Option<MessageLevel> {
        self.messages.iter().map(|m| m.level).max()
    }

    pub fn has_message_at_least(&self, level: MessageLevel) -> bool {
        self.messages.iter().any(|m| m.level >= level)
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages.iter().filter(move |m| m.code == code)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
