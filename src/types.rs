//! Core types for the state container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nested counter sub-state. Replaced as a whole, never field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub message: String,
}

impl CounterState {
    pub fn new(count: i32, message: impl Into<String>) -> Self {
        Self {
            count,
            message: message.into(),
        }
    }
}

/// The application fields that survive a save/restore cycle.
///
/// Restore copies exactly these fields; persistence metadata lives on
/// [`StateSnapshot`] instead, so it can never be restored by accident.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableState {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub counter: CounterState,
}

/// Persisted record: the restorable fields plus the time they were saved.
///
/// Serializes to a flat JSON object:
/// `{"message": .., "count": .., "counter": {..}, "lastSaveTime": ".."}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(flatten)]
    pub state: RestorableState,

    /// Missing or null means the record's age cannot be established.
    #[serde(default)]
    pub last_save_time: Option<DateTime<Utc>>,
}

impl StateSnapshot {
    /// Snapshot of `state` stamped with `saved_at`.
    pub fn stamped(state: RestorableState, saved_at: DateTime<Utc>) -> Self {
        Self {
            state,
            last_save_time: Some(saved_at),
        }
    }

    /// Age in seconds relative to `now`, or `None` when never stamped.
    ///
    /// Negative when the stamp lies in the future.
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_save_time
            .map(|saved| {
                let age = now - saved;
                match age.num_microseconds() {
                    Some(micros) => micros as f64 / 1_000_000.0,
                    None => age.num_milliseconds() as f64 / 1000.0,
                }
            })
    }
}

/// The publicly settable fields of the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateField {
    Message,
    Count,
    Counter,
}

impl StateField {
    pub const ALL: [StateField; 3] = [StateField::Message, StateField::Count, StateField::Counter];

    /// Name reported in change notices.
    pub fn name(self) -> &'static str {
        match self {
            StateField::Message => "Message",
            StateField::Count => "Count",
            StateField::Counter => "Counter",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
