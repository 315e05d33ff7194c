//! Browser-side transcript

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Speaker {
    You,
    Bot,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::You => "You",
            Speaker::Bot => "Bot",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered (speaker, text) pairs shown on one browser's page.
///
/// Not synchronized with the service's memory: clearing it leaves the
/// service side untouched.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<Line>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.lines.push(Line {
            speaker,
            text: text.into(),
        });
    }

    /// Record a completed round trip.
    pub fn push_exchange(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        self.push(Speaker::You, user);
        self.push(Speaker::Bot, reply);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn entries(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
