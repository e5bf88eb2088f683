//! Transitions and their detached, comparable forms.
//!
//! A live [`Transition`] hangs off its source state and references its event
//! by table index, never by shared pointer. [`TransitionData`] is the
//! detached triple used where no store handle is in scope, and is the unit
//! the communication types build on.

use crate::core::event::EventId;
use crate::core::state::StateId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An outgoing edge of a state. Equality is (event, target) only; the source
/// is implied by the owning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub event: EventId,
    /// `None` encodes the on-disk null sentinel ("no target").
    pub target: Option<StateId>,
}

/// Detached (source, event, target) triple, usable without live object
/// references. Ordering is lexicographic over the triple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TransitionData {
    pub source: StateId,
    pub event: EventId,
    pub target: StateId,
}

impl fmt::Display for TransitionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.source, self.event, self.target)
    }
}

/// A controller's part in a communication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
    None,
}

/// A transition some controller could relay to another: the triple plus one
/// role per controller (index i − 1 holds controller i's role). Ordering is
/// (transition, roles), used wherever a deterministic pick is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommunicationData {
    pub transition: TransitionData,
    pub roles: Vec<Role>,
}

impl CommunicationData {
    pub fn new(transition: TransitionData, roles: Vec<Role>) -> Self {
        CommunicationData { transition, roles }
    }

    /// 1-based index of the sending controller, if any.
    pub fn sender(&self) -> Option<usize> {
        self.roles.iter().position(|r| *r == Role::Sender).map(|i| i + 1)
    }

    /// 1-based index of the receiving controller, if any.
    pub fn receiver(&self) -> Option<usize> {
        self.roles
            .iter()
            .position(|r| *r == Role::Receiver)
            .map(|i| i + 1)
    }

    /// Whether controller `controller` (1-based) takes part at all.
    pub fn involves(&self, controller: usize) -> bool {
        controller >= 1
            && self
                .roles
                .get(controller - 1)
                .is_some_and(|r| *r != Role::None)
    }
}

/// A communication priced for the equilibrium search.
///
/// `cost` and `probability` are clamped into their valid domains at
/// construction: cost to [0, MAX], probability to [0, 1], NaN to 0. Degenerate
/// numeric inputs are accepted and clamped, never rejected; downstream
/// consumers rely on the invariant and do not re-validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NashCommunicationData {
    pub communication: CommunicationData,
    cost: f64,
    probability: f64,
}

impl NashCommunicationData {
    pub fn new(communication: CommunicationData, cost: f64, probability: f64) -> Self {
        NashCommunicationData {
            communication,
            cost: clamp_cost(cost),
            probability: clamp_probability(probability),
        }
    }

    /// Cost of using this communication. Always ≥ 0 and finite-or-MAX.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Probability that the ambiguous situation this communication resolves
    /// actually occurs. Always within [0, 1].
    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn transition(&self) -> TransitionData {
        self.communication.transition
    }
}

fn clamp_cost(cost: f64) -> f64 {
    if cost.is_nan() {
        0.0
    } else {
        cost.clamp(0.0, f64::MAX)
    }
}

fn clamp_probability(probability: f64) -> f64 {
    if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comm() -> CommunicationData {
        CommunicationData::new(
            TransitionData {
                source: StateId::new(1).unwrap(),
                event: EventId::new(0),
                target: StateId::new(2).unwrap(),
            },
            vec![Role::Sender, Role::Receiver],
        )
    }

    #[test]
    fn roles_resolve_one_based() {
        let c = comm();
        assert_eq!(c.sender(), Some(1));
        assert_eq!(c.receiver(), Some(2));
        assert!(c.involves(1));
        assert!(c.involves(2));
        assert!(!c.involves(3));
    }

    #[test]
    fn out_of_range_values_clamp() {
        let n = NashCommunicationData::new(comm(), -5.0, 1.5);
        assert_eq!(n.cost(), 0.0);
        assert_eq!(n.probability(), 1.0);

        let n = NashCommunicationData::new(comm(), 3.0, -0.2);
        assert_eq!(n.cost(), 3.0);
        assert_eq!(n.probability(), 0.0);
    }

    #[test]
    fn non_finite_values_clamp() {
        let n = NashCommunicationData::new(comm(), f64::NAN, f64::NAN);
        assert_eq!(n.cost(), 0.0);
        assert_eq!(n.probability(), 0.0);

        let n = NashCommunicationData::new(comm(), f64::INFINITY, f64::INFINITY);
        assert_eq!(n.cost(), f64::MAX);
        assert_eq!(n.probability(), 1.0);

        let n = NashCommunicationData::new(comm(), f64::NEG_INFINITY, f64::NEG_INFINITY);
        assert_eq!(n.cost(), 0.0);
        assert_eq!(n.probability(), 0.0);
    }
}
