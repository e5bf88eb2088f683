//! States and state identifiers.
//!
//! On disk the store reserves raw id 0 as the null sentinel ("no state").
//! In the API that sentinel is an explicit `Option<StateId>`: a `StateId`
//! always names a real state, and "no target" is `None` rather than a magic
//! value callers must remember to check.

use crate::core::transition::Transition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Identifier of a persisted state. Raw value is always ≥ 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StateId(NonZeroU64);

impl StateId {
    /// Wraps a raw id. Returns `None` for the reserved value 0.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(StateId)
    }

    /// First valid id; the store numbers states densely from here.
    pub fn first() -> Self {
        StateId(NonZeroU64::MIN)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decodes the on-disk raw form (0 = no state).
pub fn raw_to_target(raw: u64) -> Option<StateId> {
    StateId::new(raw)
}

/// Encodes a target into its on-disk raw form (0 = no state).
pub fn target_to_raw(target: Option<StateId>) -> u64 {
    target.map_or(0, StateId::get)
}

/// A state read back from the store: label, marking, and outgoing
/// transitions in append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub label: String,
    pub marked: bool,
    pub transitions: Vec<Transition>,
}

impl State {
    /// True when some outgoing transition fires `event`.
    pub fn enables(&self, event: crate::core::event::EventId) -> bool {
        self.transitions.iter().any(|t| t.event == event)
    }
}
