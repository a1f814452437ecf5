//! Dispatch round data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::target::TargetId;

/// Lifecycle of one target within a round: Pending → InFlight → Succeeded | Failed
///
/// One exception: a target missing its provider, model or credential goes
/// straight from Pending to Failed, since it never makes a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one dispatch attempt for a target.
///
/// Fields are private so the status can only move forward and exactly one of
/// `text` / `error_message` is set once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    target_id: TargetId,
    status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl TargetResult {
    pub fn pending(target_id: TargetId) -> Self {
        Self {
            target_id,
            status: TargetStatus::Pending,
            text: None,
            error_message: None,
        }
    }

    /// Pending → InFlight. Returns false (and leaves the result alone) otherwise.
    pub fn mark_in_flight(&mut self) -> bool {
        self.advance(TargetStatus::Pending, TargetStatus::InFlight)
    }

    /// InFlight → Succeeded
    pub fn succeed(&mut self, text: String) -> bool {
        if self.advance(TargetStatus::InFlight, TargetStatus::Succeeded) {
            self.text = Some(text);
            true
        } else {
            false
        }
    }

    /// Pending | InFlight → Failed. Pending targets fail directly when they
    /// never reach the network (incomplete configuration).
    pub fn fail(&mut self, message: String) -> bool {
        let from = match self.status {
            TargetStatus::Pending => TargetStatus::Pending,
            _ => TargetStatus::InFlight,
        };
        if self.advance(from, TargetStatus::Failed) {
            self.error_message = Some(message);
            true
        } else {
            false
        }
    }

    fn advance(&mut self, from: TargetStatus, to: TargetStatus) -> bool {
        if self.status != from {
            warn!(
                "Ignoring {} -> {} transition for target {} (currently {})",
                from, to, self.target_id, self.status
            );
            return false;
        }
        self.status = to;
        true
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Immutable snapshot of one prompt's results across the configured targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRound {
    pub round_id: Uuid,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per submitted target, in submission order
    pub results: Vec<TargetResult>,
}

impl DispatchRound {
    /// Look up a result by target id (never by position).
    pub fn result(&self, id: &TargetId) -> Option<&TargetResult> {
        self.results.iter().find(|r| r.target_id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True once every target has reached a terminal status
    pub fn is_settled(&self) -> bool {
        self.results.iter().all(|r| r.status().is_terminal())
    }

    pub fn succeeded(&self) -> usize {
        self.count(TargetStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(TargetStatus::Failed)
    }

    fn count(&self, status: TargetStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    /// One markdown section per target, for terminal display.
    pub fn format_cards(&self, label: impl Fn(&TargetId) -> String) -> String {
        let mut output = String::new();
        for result in &self.results {
            output.push_str(&format!("### {} ({})\n", label(result.target_id()), result.status()));
            match (result.text(), result.error_message()) {
                (Some(text), _) => output.push_str(text),
                (None, Some(err)) => output.push_str(&format!("Error: {}", err)),
                (None, None) => {}
            }
            output.push_str("\n\n");
        }
        output
    }
}

/// Status change notification emitted while a round runs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEvent {
    pub round_id: Uuid,
    pub target_id: TargetId,
    pub status: TargetStatus,
}
