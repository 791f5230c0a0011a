//! Edge-triggered speech gate.
//!
//! Starts accepting on the first buffer louder than the threshold and stops for
//! good on the first buffer at or below it once recording has begun. Leading
//! silence is trimmed; a pause longer than one buffer ends the take.

use super::meter::PowerDb;
use serde::Serialize;

/// Buffers at or below this level count as silence.
pub const DEFAULT_SILENCE_THRESHOLD_DB: PowerDb = -50.0;

/// Gate lifecycle. Transitions only move forward: Ready → Recording → Ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Nothing loud seen yet, nothing written.
    #[default]
    Ready,
    /// Accepting and appending buffers.
    Recording,
    /// Silence followed speech; terminal until the session is prepared again.
    Ended,
}

impl GateState {
    pub fn label(self) -> &'static str {
        match self {
            GateState::Ready => "ready",
            GateState::Recording => "recording",
            GateState::Ended => "ended",
        }
    }
}

/// Outcome for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Persist the buffer.
    Accept,
    /// Drop the buffer.
    Reject,
    /// Drop the buffer; the gate just moved from Recording to Ended.
    End,
}

impl GateDecision {
    pub fn is_accepted(self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    pub fn ended(self) -> bool {
        matches!(self, GateDecision::End)
    }
}

/// Apply one reading to `state`.
///
/// Loud means strictly above `threshold_db`; a reading exactly on the threshold
/// is silence. Absent and NaN readings never change state.
pub fn transition(
    state: &mut GateState,
    reading: Option<PowerDb>,
    threshold_db: PowerDb,
) -> GateDecision {
    let Some(power) = reading.filter(|db| !db.is_nan()) else {
        return GateDecision::Reject;
    };
    match *state {
        GateState::Ended => GateDecision::Reject,
        _ if power > threshold_db => {
            *state = GateState::Recording;
            GateDecision::Accept
        }
        GateState::Recording => {
            *state = GateState::Ended;
            GateDecision::End
        }
        GateState::Ready => GateDecision::Reject,
    }
}

/// Gate state bundled with its threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    state: GateState,
    threshold_db: PowerDb,
}

impl Gate {
    pub fn new(threshold_db: PowerDb) -> Self {
        Self {
            state: GateState::Ready,
            threshold_db,
        }
    }

    pub fn observe(&mut self, reading: Option<PowerDb>) -> GateDecision {
        transition(&mut self.state, reading, self.threshold_db)
    }

    pub fn state(&self) -> GateState {
        self.state
    }

}

impl Default for Gate {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_THRESHOLD_DB)
    }
}
