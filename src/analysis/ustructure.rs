//! U-Structure construction.
//!
//! The U-Structure of an automaton tracks, per controller, the set of states
//! the controller cannot tell apart from the true one given what it has
//! observed. Its states are combinations `(true state, one estimate set per
//! controller)`, each estimate closed under moves that controller cannot
//! observe. Estimates are subsets of the source state set, so the reachable
//! combination space is finite and exploration terminates.
//!
//! A combination holding a second, distinct true-state candidate in every
//! controller's estimate is ambiguous. Ambiguity is surfaced as data for the
//! Crush reducer and the Nash solver, never raised as an error here.

use crate::analysis::algebra;
use crate::core::diag::DiagHandle;
use crate::core::error::DesolveError;
use crate::core::event::EventId;
use crate::core::state::StateId;
use crate::core::store::{AutomatonStore, RecordCapacity};
use crate::core::transition::{
    CommunicationData, NashCommunicationData, Role, TransitionData,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

/// One U-Structure state: the true source state plus each controller's
/// estimate (sorted, deduplicated, closed under unobservable moves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub state: StateId,
    pub estimates: Vec<Vec<StateId>>,
}

impl Combination {
    /// A second true-state candidate no controller can rule out.
    pub fn is_ambiguous(&self) -> bool {
        let Some(first) = self.estimates.first() else {
            return false;
        };
        first
            .iter()
            .any(|&candidate| {
                candidate != self.state
                    && self.estimates.iter().all(|est| est.binary_search(&candidate).is_ok())
            })
    }

    fn label(&self) -> String {
        let estimates: Vec<String> = self
            .estimates
            .iter()
            .map(|est| {
                est.iter()
                    .map(StateId::to_string)
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect();
        format!("{}|{}", self.state, estimates.join("|"))
    }
}

/// Sidecar data persisted next to the U-Structure's file pair.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    combinations: Vec<Combination>,
    ambiguous: Vec<StateId>,
    communications: Vec<CommunicationData>,
}

/// A derived automaton whose states are controller-ambiguity combinations,
/// backed by its own persisted file pair plus a JSON sidecar
/// (`<name>.ust.json`) holding the combination table, the ambiguous state
/// list, and the potential communications.
pub struct UStructure {
    store: AutomatonStore,
    combinations: Vec<Combination>,
    ambiguous: Vec<StateId>,
    communications: Vec<CommunicationData>,
}

impl UStructure {
    /// Derives the U-Structure of `source` into a fresh file pair at
    /// `dir/<name>`. The source is never mutated; a source without an
    /// initial state yields an empty structure.
    pub fn build(
        source: &mut AutomatonStore,
        dir: &Path,
        name: &str,
    ) -> Result<UStructure, DesolveError> {
        let controllers = source.controllers();
        let capacity = combination_capacity(source, controllers);
        let mut store = AutomatonStore::create(
            dir,
            name,
            controllers,
            source.events().to_vec(),
            capacity,
            source.diag(),
        )?;

        let mut combinations: Vec<Combination> = Vec::new();
        let mut ambiguous: Vec<StateId> = Vec::new();
        let mut communications: Vec<CommunicationData> = Vec::new();

        let Some(initial) = source.initial() else {
            store.flush()?;
            let built = UStructure {
                store,
                combinations,
                ambiguous,
                communications,
            };
            built.write_sidecar(dir, name)?;
            return Ok(built);
        };

        let mut interned: FxHashMap<(StateId, Vec<Vec<StateId>>), StateId> = FxHashMap::default();
        let mut queue: VecDeque<Combination> = VecDeque::new();

        let mut estimates = Vec::with_capacity(controllers);
        for controller in 1..=controllers {
            estimates.push(algebra::unobservable_closure(source, &[initial], controller)?);
        }
        let seed = Combination {
            state: initial,
            estimates,
        };
        let new_initial = intern_combination(
            seed,
            source,
            &mut store,
            &mut combinations,
            &mut ambiguous,
            &mut interned,
            &mut queue,
        )?;

        while let Some(combination) = queue.pop_front() {
            let combination_id =
                interned[&(combination.state, combination.estimates.clone())];
            let state = source.state(combination.state)?;
            for transition in &state.transitions {
                let Some(target) = transition.target else { continue };
                let event = source.event(transition.event)?.clone();

                let mut estimates = Vec::with_capacity(controllers);
                for controller in 1..=controllers {
                    let current = &combination.estimates[controller - 1];
                    if event.observable_to(controller) {
                        // The observation narrows the estimate to the
                        // successors consistent with it.
                        let mut targets = Vec::new();
                        for &member in current.iter() {
                            let member_state = source.state(member)?;
                            for t in &member_state.transitions {
                                if t.event == event.id {
                                    if let Some(successor) = t.target {
                                        targets.push(successor);
                                    }
                                }
                            }
                        }
                        estimates.push(algebra::unobservable_closure(
                            source, &targets, controller,
                        )?);
                    } else {
                        // Nothing was observed; the estimate stays as it is
                        // (it is already closed under this move).
                        estimates.push(current.clone());
                    }
                }

                let successor = Combination {
                    state: target,
                    estimates,
                };
                let successor_id = intern_combination(
                    successor,
                    source,
                    &mut store,
                    &mut combinations,
                    &mut ambiguous,
                    &mut interned,
                    &mut queue,
                )?;
                store.append_transition(combination_id, event.id, Some(successor_id))?;

                record_communications(
                    &mut communications,
                    combination_id,
                    event.id,
                    successor_id,
                    (1..=controllers)
                        .map(|c| event.observable_to(c))
                        .collect::<Vec<_>>(),
                );
            }
        }

        store.set_initial(Some(new_initial));
        store.flush()?;

        communications.sort();
        communications.dedup();

        let built = UStructure {
            store,
            combinations,
            ambiguous,
            communications,
        };
        built.write_sidecar(dir, name)?;
        Ok(built)
    }

    /// Reopens a previously built U-Structure (file pair + sidecar).
    pub fn open(dir: &Path, name: &str, diag: DiagHandle) -> Result<UStructure, DesolveError> {
        let store = AutomatonStore::open(dir, name, diag)?;
        let sidecar_path = dir.join(format!("{name}.ust.json"));
        if !sidecar_path.exists() {
            return Err(DesolveError::NotFound(format!(
                "U-Structure sidecar {}",
                sidecar_path.display()
            )));
        }
        let sidecar: Sidecar = serde_json::from_str(&fs::read_to_string(&sidecar_path)?)?;
        Ok(UStructure {
            store,
            combinations: sidecar.combinations,
            ambiguous: sidecar.ambiguous,
            communications: sidecar.communications,
        })
    }

    fn write_sidecar(&self, dir: &Path, name: &str) -> Result<(), DesolveError> {
        let sidecar = Sidecar {
            combinations: self.combinations.clone(),
            ambiguous: self.ambiguous.clone(),
            communications: self.communications.clone(),
        };
        let rendered = serde_json::to_string_pretty(&sidecar)?;
        fs::write(dir.join(format!("{name}.ust.json")), rendered)?;
        Ok(())
    }

    pub fn controllers(&self) -> usize {
        self.store.controllers()
    }

    pub fn store(&self) -> &AutomatonStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AutomatonStore {
        &mut self.store
    }

    /// Combination table, indexed by raw state id − 1.
    pub fn combinations(&self) -> &[Combination] {
        &self.combinations
    }

    /// States in which two distinct true states are indistinguishable to
    /// every controller.
    pub fn ambiguous(&self) -> &[StateId] {
        &self.ambiguous
    }

    /// Potential communications: one per (observing sender, blind receiver)
    /// pair on each partially observed transition.
    pub fn communications(&self) -> &[CommunicationData] {
        &self.communications
    }

    /// Prices each potential communication for the equilibrium search.
    /// `pricing` returns (cost, probability); both are clamped into their
    /// valid domains by construction.
    pub fn priced(
        &self,
        pricing: impl Fn(&CommunicationData) -> (f64, f64),
    ) -> Vec<NashCommunicationData> {
        self.communications
            .iter()
            .map(|comm| {
                let (cost, probability) = pricing(comm);
                NashCommunicationData::new(comm.clone(), cost, probability)
            })
            .collect()
    }
}

/// Sizes body records for id-based combination labels.
fn combination_capacity(source: &AutomatonStore, controllers: usize) -> RecordCapacity {
    let digits = source.state_count().to_string().len();
    let per_estimate = (source.state_count() as usize).max(1) * (digits + 1);
    RecordCapacity::new(
        digits + 1 + controllers.max(1) * (per_estimate + 1),
        source.events().len().max(1),
    )
}

/// Appends the combination as a new state if unseen, tracking ambiguity.
fn intern_combination(
    combination: Combination,
    source: &mut AutomatonStore,
    store: &mut AutomatonStore,
    combinations: &mut Vec<Combination>,
    ambiguous: &mut Vec<StateId>,
    interned: &mut FxHashMap<(StateId, Vec<Vec<StateId>>), StateId>,
    queue: &mut VecDeque<Combination>,
) -> Result<StateId, DesolveError> {
    let key = (combination.state, combination.estimates.clone());
    if let Some(&mapped) = interned.get(&key) {
        return Ok(mapped);
    }
    let marked = source.state(combination.state)?.marked;
    let mapped = store.append_state(&combination.label(), marked)?;
    if combination.is_ambiguous() {
        ambiguous.push(mapped);
    }
    interned.insert(key, mapped);
    combinations.push(combination.clone());
    queue.push_back(combination);
    Ok(mapped)
}

/// One candidate communication per (observing, blind) controller pair.
fn record_communications(
    communications: &mut Vec<CommunicationData>,
    source: StateId,
    event: EventId,
    target: StateId,
    observed_by: Vec<bool>,
) {
    let controllers = observed_by.len();
    for sender in 1..=controllers {
        if !observed_by[sender - 1] {
            continue;
        }
        for receiver in 1..=controllers {
            if observed_by[receiver - 1] {
                continue;
            }
            let mut roles = vec![Role::None; controllers];
            roles[sender - 1] = Role::Sender;
            roles[receiver - 1] = Role::Receiver;
            communications.push(CommunicationData::new(
                TransitionData {
                    source,
                    event,
                    target,
                },
                roles,
            ));
        }
    }
}
