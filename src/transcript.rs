//! Conversation transcript and response reconciliation
//!
//! Every submitted prompt opens a [`Turn`] keyed by its correlation id.
//! Inbound events are reconciled into that turn:
//!
//! ```text
//! queued --start_processing--> processing --end_processing--> done
//!   |                                                          ^
//!   +----------------------end_processing----------------------+
//! ```
//!
//! `stream` fragments accumulate in the turn's streaming region as streaming
//! markup; `log` lines accumulate as separate entries. `end_processing`
//! reformats the region as a finished block, tags code blocks with a copy
//! index and decides between completed and failed.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::format;
use crate::markup;
use crate::protocol::{CorrelationId, InboundEvent, ReportedOutcome};

/// Marker whose presence in a turn's log means the task failed.
pub const FAILURE_GLYPH: &str = "❌";

/// Spoken when nothing usable can be extracted from a successful turn.
pub const COMPLETED_PHRASE: &str = "Task completed.";

/// Spoken when nothing usable can be extracted from a failed turn.
pub const FAILED_PHRASE: &str = "Task failed. Check the log for details.";

const SUMMARY_MAX_CHARS: usize = 200;

/// Lifecycle of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TurnStatus {
    pub fn glyph(self) -> &'static str {
        match self {
            TurnStatus::Queued => "⏳",
            TurnStatus::Processing => "⚙️",
            TurnStatus::Completed => "✅",
            TurnStatus::Failed => "❌",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TurnStatus::Queued => "Queued",
            TurnStatus::Processing => "Processing...",
            TurnStatus::Completed => "Completed",
            TurnStatus::Failed => "Failed",
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, TurnStatus::Completed | TurnStatus::Failed)
    }
}

/// Final outcome of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

impl From<Outcome> for TurnStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => TurnStatus::Completed,
            Outcome::Failed => TurnStatus::Failed,
        }
    }
}

/// Accumulated response text for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamRegion {
    pub markup: String,
    /// True once `markup` holds final-mode output and nothing was appended since.
    pub finalized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: CorrelationId,
    pub prompt: String,
    pub status: TurnStatus,
    /// Rendered log entries in arrival order.
    pub logs: Vec<String>,
    pub stream: Option<StreamRegion>,
    pub created_at: DateTime<Local>,
}

impl Turn {
    fn new(id: CorrelationId, prompt: String) -> Self {
        Self {
            id,
            prompt,
            status: TurnStatus::Queued,
            logs: Vec::new(),
            stream: None,
            created_at: Local::now(),
        }
    }

    /// Failure heuristic: the glyph appears anywhere in the rendered log.
    pub fn log_reports_failure(&self) -> bool {
        self.logs.iter().any(|entry| entry.contains(FAILURE_GLYPH))
    }

    pub fn response_markup(&self) -> Option<&str> {
        self.stream.as_ref().map(|region| region.markup.as_str())
    }
}

/// Result of reconciling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// No turn matched, or the event carried nothing to apply.
    Ignored,
    Updated,
    /// The turn reached `done` for the first time.
    Finished { outcome: Outcome, summary: String },
}

/// All turns of a session, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    index: HashMap<CorrelationId, usize>,
    /// Copy indices handed out so far.
    code_blocks: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, id: &CorrelationId) -> Option<&Turn> {
        self.index.get(id).map(|&i| &self.turns[i])
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of turns not yet done.
    pub fn in_flight(&self) -> usize {
        self.turns.iter().filter(|t| !t.status.is_done()).count()
    }

    /// Number of code blocks that carry a copy index.
    pub fn code_block_count(&self) -> usize {
        self.code_blocks
    }

    /// Create the user turn and its empty response container.
    ///
    /// Returns `false` (and changes nothing) if `id` is already taken.
    pub fn open_turn(&mut self, id: CorrelationId, prompt: impl Into<String>) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.turns.len());
        self.turns.push(Turn::new(id, prompt.into()));
        true
    }

    /// Reconcile one inbound event.
    pub fn apply(&mut self, event: InboundEvent) -> Applied {
        let Some(&slot) = self.index.get(event.id()) else {
            debug!("dropping event for unknown turn {}", event.id());
            return Applied::Ignored;
        };

        match event {
            InboundEvent::StartProcessing { .. } => {
                let turn = &mut self.turns[slot];
                if !turn.status.is_done() {
                    turn.status = TurnStatus::Processing;
                }
                Applied::Updated
            }
            InboundEvent::Stream { message, .. } => {
                let region = self.turns[slot].stream.get_or_insert_with(StreamRegion::default);
                if let Some(text) = message {
                    region.markup.push_str(&format::format(&text, true));
                    region.finalized = false;
                }
                Applied::Updated
            }
            InboundEvent::Log { message, .. } => match message {
                Some(text) => {
                    self.turns[slot].logs.push(format::format(&text, true));
                    Applied::Updated
                }
                None => Applied::Ignored,
            },
            InboundEvent::EndProcessing { outcome, .. } => self.finish(slot, outcome),
        }
    }

    fn finish(&mut self, slot: usize, reported: Option<ReportedOutcome>) -> Applied {
        let mut next_block = self.code_blocks;
        let turn = &mut self.turns[slot];

        if let Some(region) = turn.stream.as_mut() {
            if !region.finalized {
                let finished = format::format(&region.markup, false);
                region.markup = annotate_code_blocks(&finished, &mut next_block);
                region.finalized = true;
            }
        }

        let outcome = match reported {
            Some(ReportedOutcome::Completed) => Outcome::Completed,
            Some(ReportedOutcome::Failed) => Outcome::Failed,
            None if turn.log_reports_failure() => Outcome::Failed,
            None => Outcome::Completed,
        };

        let first_time = !turn.status.is_done();
        turn.status = outcome.into();
        let applied = if first_time {
            Applied::Finished {
                outcome,
                summary: speech_summary(turn, outcome),
            }
        } else {
            Applied::Updated
        };

        self.code_blocks = next_block;
        applied
    }
}

/// Give every `<pre>` without a copy index the next index.
pub fn annotate_code_blocks(markup: &str, next: &mut usize) -> String {
    let mut out = String::with_capacity(markup.len() + 16);
    let mut rest = markup;
    while let Some(pos) = rest.find("<pre>") {
        out.push_str(&rest[..pos]);
        *next += 1;
        out.push_str(&format!("<pre data-copy=\"{next}\">"));
        rest = &rest[pos + "<pre>".len()..];
    }
    out.push_str(rest);
    out
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?](\s|$)").expect("sentence regex"))
}

/// Reduce rendered text to something worth reading aloud: first sentence,
/// no emoji or markdown markers, capped on a word boundary.
fn summarize(plain: &str) -> Option<String> {
    let cleaned: String = plain
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|c| !matches!(c, '*' | '`' | '#' | '_'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    let sentence = match sentence_end_re().find(&cleaned) {
        Some(m) => &cleaned[..m.start() + 1],
        None => cleaned.as_str(),
    };

    if sentence.chars().count() <= SUMMARY_MAX_CHARS {
        return Some(sentence.to_string());
    }
    let capped: String = sentence.chars().take(SUMMARY_MAX_CHARS).collect();
    let cut = capped.rfind(' ').unwrap_or(capped.len());
    Some(format!("{}...", capped[..cut].trim_end()))
}

/// What to say when a turn finishes.
pub fn speech_summary(turn: &Turn, outcome: Outcome) -> String {
    let from_response = turn
        .response_markup()
        .and_then(|m| summarize(&markup::prose(m)));
    let from_log = || turn.logs.last().and_then(|m| summarize(&markup::prose(m)));

    from_response.or_else(from_log).unwrap_or_else(|| {
        match outcome {
            Outcome::Completed => COMPLETED_PHRASE,
            Outcome::Failed => FAILED_PHRASE,
        }
        .to_string()
    })
}
