use chrono::{DateTime, Utc};

use crate::domain::models::{FileId, SessionId};

/// Activity categories the orchestration core actually needs to audit,
/// narrowed from the teacher's broader `ActivityType` enum
/// (`logging/types.rs`) to exactly what §3/§8 reference: turn token
/// accounting, guardian decisions, and indexing stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    TurnCompleted,
    GuardianBlocked,
    GuardianFailOpen,
    IndexingStage,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnCompleted => "turn_completed",
            Self::GuardianBlocked => "guardian_blocked",
            Self::GuardianFailOpen => "guardian_fail_open",
            Self::IndexingStage => "indexing_stage",
        }
    }
}

/// One audit row. Mirrors `logging/types.rs::ActivityLog`'s field shape
/// (session/user identity, a typed kind, free-text message, metrics,
/// timestamp) but only carries the fields the spec's `TokenMetrics` and
/// guardian/indexing events need.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub sid: Option<SessionId>,
    pub fid: Option<FileId>,
    pub kind: ActivityKind,
    pub message: Option<String>,
    pub system_tokens: Option<i64>,
    pub history_tokens: Option<i64>,
    pub user_tokens: Option<i64>,
    pub was_cached: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn builder(kind: ActivityKind) -> ActivityEventBuilder {
        ActivityEventBuilder::new(kind)
    }
}

/// Builder pattern, same fluent shape as the teacher's
/// `ActivityLogBuilder`.
pub struct ActivityEventBuilder {
    event: ActivityEvent,
}

impl ActivityEventBuilder {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            event: ActivityEvent {
                sid: None,
                fid: None,
                kind,
                message: None,
                system_tokens: None,
                history_tokens: None,
                user_tokens: None,
                was_cached: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn sid(mut self, sid: impl Into<SessionId>) -> Self {
        self.event.sid = Some(sid.into());
        self
    }

    pub fn fid(mut self, fid: FileId) -> Self {
        self.event.fid = Some(fid);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event.message = Some(message.into());
        self
    }

    pub fn tokens(mut self, system: i64, history: i64, user: i64) -> Self {
        self.event.system_tokens = Some(system);
        self.event.history_tokens = Some(history);
        self.event.user_tokens = Some(user);
        self
    }

    pub fn was_cached(mut self, cached: bool) -> Self {
        self.event.was_cached = Some(cached);
        self
    }

    pub fn build(self) -> ActivityEvent {
        self.event
    }
}
