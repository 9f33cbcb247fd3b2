//! Per-session inference of "the program is waiting for console input".
//!
//! Programs give no structured signal when they block on a read, so the
//! detector combines two heuristics:
//!
//! - **Confirmed prompt**: an output chunk whose trimmed text matches one
//!   of [`PROMPT_RULES`] schedules an `input_request` after a short
//!   debounce (`confirm_delay`, 100 ms by default). Further output within
//!   the debounce cancels it.
//! - **Idle silence**: any other chunk (and the spawn itself) arms an idle
//!   deadline (`idle_timeout`, 300 ms by default). If the program stays
//!   silent until it passes, an `input_request` is emitted speculatively.
//!
//! At most one deadline is armed at any time and each firing emits one
//! request; nothing is rearmed until the next output chunk.
//!
//! ```text
//! output, no match ─▶ Running ──idle deadline──▶ PendingHeuristic (request)
//! output, match    ─▶ PendingConfirmed ──deadline──▶ Confirmed (request)
//! input            ─▶ Running, nothing armed
//! terminate        ─▶ Terminated
//! ```
//!
//! The detector is a plain value: the session driver owns it, feeds it
//! events with the current time, and sleeps until [`PromptDetector::deadline`].

use std::time::Duration;

use tokio::time::Instant;

use crate::config::DetectorConfig;

/// How a [`PromptRule`] inspects trimmed, lower-cased output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPattern {
    /// Text ends with this character.
    EndsWith(char),
    /// Text contains this word anywhere.
    Contains(&'static str),
}

/// One entry of the prompt classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptRule {
    /// What to look for.
    pub pattern: PromptPattern,
    /// Why the pattern suggests a pending read.
    pub rationale: &'static str,
}

impl PromptRule {
    fn matches(&self, lowered: &str) -> bool {
        match self.pattern {
            PromptPattern::EndsWith(ch) => lowered.ends_with(ch),
            PromptPattern::Contains(word) => lowered.contains(word),
        }
    }
}

/// Ordered prompt classification table. Words are lower-case; matching is
/// case-insensitive.
pub const PROMPT_RULES: &[PromptRule] = &[
    PromptRule {
        pattern: PromptPattern::EndsWith(':'),
        rationale: "label awaiting a value, e.g. `Enter age:`",
    },
    PromptRule {
        pattern: PromptPattern::EndsWith('>'),
        rationale: "shell or REPL style prompt, e.g. `>`",
    },
    PromptRule {
        pattern: PromptPattern::EndsWith('?'),
        rationale: "question to the user, e.g. `Continue?`",
    },
    PromptRule {
        pattern: PromptPattern::Contains("enter"),
        rationale: "explicit request, e.g. `Please enter two numbers`",
    },
    PromptRule {
        pattern: PromptPattern::Contains("input"),
        rationale: "explicit request, e.g. `Input the size`",
    },
    PromptRule {
        pattern: PromptPattern::Contains("type"),
        rationale: "explicit request, e.g. `Type a command`",
    },
    PromptRule {
        pattern: PromptPattern::Contains("name"),
        rationale: "common first question, e.g. `Your name`",
    },
    PromptRule {
        pattern: PromptPattern::Contains("number"),
        rationale: "common numeric request, e.g. `Pick a number`",
    },
];

/// Whether `text` looks like a program asking for input.
#[must_use]
pub fn looks_like_prompt(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }
    PROMPT_RULES.iter().any(|rule| rule.matches(&lowered))
}

/// Strip one trailing `\n` or `\r\n`.
#[must_use]
pub fn strip_trailing_newline(chunk: &str) -> &str {
    match chunk.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => chunk,
    }
}

/// Detector states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Output flowing; idle deadline armed, or disarmed after input.
    Running,
    /// A prompt pattern matched; confirmation deadline armed.
    PendingConfirmed,
    /// Idle deadline fired; request emitted speculatively.
    PendingHeuristic,
    /// Confirmation fired; request emitted.
    Confirmed,
    /// Process gone; nothing more is emitted.
    Terminated,
}

/// Prompt detection state machine for one session.
#[derive(Debug, Clone)]
pub struct PromptDetector {
    idle_timeout: Duration,
    confirm_delay: Duration,
    state: DetectorState,
    deadline: Option<Instant>,
}

impl PromptDetector {
    /// Create a detector for a freshly spawned process, idle deadline armed.
    #[must_use]
    pub fn new(config: &DetectorConfig, now: Instant) -> Self {
        let idle_timeout = config.idle_timeout();
        Self {
            idle_timeout,
            confirm_delay: config.confirm_delay(),
            state: DetectorState::Running,
            deadline: Some(now + idle_timeout),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Pending deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether an `input_request` is outstanding.
    #[must_use]
    pub fn waiting_for_input(&self) -> bool {
        matches!(
            self.state,
            DetectorState::PendingHeuristic | DetectorState::Confirmed
        )
    }

    /// Record an output chunk and return the text to relay.
    ///
    /// Cancels whatever was pending, clears the waiting flag, and arms the
    /// confirmation or idle deadline depending on the chunk's content.
    pub fn on_output<'a>(&mut self, chunk: &'a str, now: Instant) -> &'a str {
        let text = strip_trailing_newline(chunk);
        if self.state == DetectorState::Terminated {
            return text;
        }

        if looks_like_prompt(text) {
            self.state = DetectorState::PendingConfirmed;
            self.deadline = Some(now + self.confirm_delay);
        } else {
            self.state = DetectorState::Running;
            self.deadline = Some(now + self.idle_timeout);
        }
        text
    }

    /// Record that the client supplied input: clear the waiting flag and
    /// disarm any deadline until the next output chunk.
    pub fn on_input(&mut self) {
        if self.state == DetectorState::Terminated {
            return;
        }
        self.state = DetectorState::Running;
        self.deadline = None;
    }

    /// Fire the pending deadline if it has passed.
    ///
    /// Returns `true` exactly when an `input_request` must be emitted.
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }

        self.deadline = None;
        match self.state {
            DetectorState::Running => {
                self.state = DetectorState::PendingHeuristic;
                true
            }
            DetectorState::PendingConfirmed => {
                self.state = DetectorState::Confirmed;
                true
            }
            DetectorState::PendingHeuristic
            | DetectorState::Confirmed
            | DetectorState::Terminated => false,
        }
    }

    /// The process terminated or was killed.
    pub fn terminate(&mut self) {
        self.state = DetectorState::Terminated;
        self.deadline = None;
    }
}
