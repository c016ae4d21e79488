use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::session_machine::SessionPhase;

/// Countdown events pushed over the session SSE stream.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    BonusGranted(TimerTick),
    TimeExpired(TimeExpired),
    SessionEnded(SessionEnded),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub session_id: String,
    pub question_index: usize,
    pub remaining_seconds: u32,
    pub bonus_used: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub session_id: String,
    pub question_index: usize,
    pub correct_answer: Option<i32>,
    pub score: i32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionEnded {
    pub session_id: String,
    pub phase: SessionPhase,
    pub score: i32,
    pub timestamp: DateTime<Utc>,
}

impl TimerEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::BonusGranted(_) => "bonus-granted",
            TimerEvent::TimeExpired(_) => "time-expired",
            TimerEvent::SessionEnded(_) => "session-ended",
        }
    }
}
