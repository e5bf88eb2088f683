//! Crush reduction.
//!
//! The Crush of a U-Structure with respect to one controller is its observer:
//! states the controller cannot tell apart collapse into one, and the
//! communications that look identical from that controller's viewpoint fold
//! into a single equivalence class priced by a configured policy. The output
//! is itself a pruned U-Structure (the subset construction only ever visits
//! reachable states) and keeps the controller count of its source.

use crate::analysis::algebra;
use crate::analysis::ustructure::UStructure;
use crate::core::error::DesolveError;
use crate::core::state::StateId;
use crate::core::store::AutomatonStore;
use crate::core::transition::{CommunicationData, NashCommunicationData, TransitionData};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How the costs of a communication equivalence class combine. Exactly these
/// four policies are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombiningCosts {
    /// Costs are not aggregated; no combination occurs. Callers must skip
    /// Crush construction entirely under this policy.
    Unit,
    /// Maximum of the folded costs, saturating at `f64::MAX`.
    Max,
    /// Exact sum of the folded costs.
    Sum,
    /// Arithmetic mean of the folded costs.
    Average,
}

impl CombiningCosts {
    /// Folds a non-empty cost list. Unit never reaches this point.
    fn combine(self, costs: &[f64]) -> f64 {
        debug_assert!(!costs.is_empty());
        match self {
            CombiningCosts::Unit => unreachable!("unit policy performs no combination"),
            CombiningCosts::Max => costs.iter().fold(0.0_f64, |a, &b| a.max(b)).min(f64::MAX),
            CombiningCosts::Sum => costs.iter().sum::<f64>().min(f64::MAX),
            CombiningCosts::Average => {
                (costs.iter().sum::<f64>() / costs.len() as f64).min(f64::MAX)
            }
        }
    }
}

/// A U-Structure crushed with respect to one controller: the observer store,
/// the surviving ambiguity, and the combined communications.
pub struct Crush {
    store: AutomatonStore,
    controller: usize,
    policy: CombiningCosts,
    ambiguous: Vec<StateId>,
    communications: Vec<NashCommunicationData>,
}

impl Crush {
    /// Crushes `source` with respect to `controller` (1-based), writing the
    /// observer to a fresh file pair at `dir/<name>`.
    ///
    /// `priced` carries the source's communications with their costs and
    /// probabilities (already clamped at construction; not re-validated).
    /// Constructing with [`CombiningCosts::Unit`] is a validation error:
    /// under Unit no combination occurs and the U-Structure is used as-is.
    pub fn build(
        source: &mut UStructure,
        priced: &[NashCommunicationData],
        controller: usize,
        policy: CombiningCosts,
        dir: &Path,
        name: &str,
    ) -> Result<Crush, DesolveError> {
        if policy == CombiningCosts::Unit {
            return Err(DesolveError::ValidationError(
                "the unit policy performs no combination; use the U-Structure directly"
                    .to_string(),
            ));
        }

        let source_ambiguous = source.ambiguous().to_vec();
        let combinations = source.combinations().to_vec();
        let observer = algebra::observer(source.store_mut(), controller, dir, name)?;

        // First subset (in discovery order) containing each source state.
        let mut collapsed: FxHashMap<StateId, StateId> = FxHashMap::default();
        for (index, subset) in observer.subsets.iter().enumerate() {
            let crushed = StateId::new(index as u64 + 1).expect("raw ≥ 1");
            for &member in subset {
                collapsed.entry(member).or_insert(crushed);
            }
        }

        let mut ambiguous: Vec<StateId> = source_ambiguous
            .iter()
            .filter_map(|id| collapsed.get(id).copied())
            .collect();
        ambiguous.sort();
        ambiguous.dedup();

        // Two communications are indistinguishable to the controller when its
        // estimates around them and its view of the event agree. BTreeMap
        // keys the classes deterministically.
        let mut classes: BTreeMap<ClassKey, Vec<&NashCommunicationData>> = BTreeMap::new();
        for comm in priced {
            let transition = comm.transition();
            let key = class_key(&transition, &combinations, controller, &observer.store)?;
            classes.entry(key).or_default().push(comm);
        }

        let mut communications = Vec::with_capacity(classes.len());
        for members in classes.values() {
            let costs: Vec<f64> = members.iter().map(|m| m.cost()).collect();
            let probability: f64 = members.iter().map(|m| m.probability()).sum();
            let representative = members
                .iter()
                .min_by(|x, y| x.communication.cmp(&y.communication))
                .expect("classes are non-empty");
            let transition = representative.transition();
            let remap = |id: StateId| -> Result<StateId, DesolveError> {
                collapsed.get(&id).copied().ok_or_else(|| {
                    DesolveError::StructuralViolation(format!(
                        "communication references unreachable state {id}"
                    ))
                })
            };
            let crushed_transition = TransitionData {
                source: remap(transition.source)?,
                event: transition.event,
                target: remap(transition.target)?,
            };
            communications.push(NashCommunicationData::new(
                CommunicationData::new(crushed_transition, representative.communication.roles.clone()),
                policy.combine(&costs),
                probability,
            ));
        }

        Ok(Crush {
            store: observer.store,
            controller,
            policy,
            ambiguous,
            communications,
        })
    }

    pub fn controller(&self) -> usize {
        self.controller
    }

    pub fn policy(&self) -> CombiningCosts {
        self.policy
    }

    pub fn store(&self) -> &AutomatonStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AutomatonStore {
        &mut self.store
    }

    /// Crushed states still carrying an unresolved ambiguity.
    pub fn ambiguous(&self) -> &[StateId] {
        &self.ambiguous
    }

    /// One combined communication per equivalence class, endpoints remapped
    /// onto the crushed state space.
    pub fn communications(&self) -> &[NashCommunicationData] {
        &self.communications
    }
}

type ClassKey = (Vec<StateId>, Option<String>, Vec<StateId>);

/// The controller's view of a communication: its estimate at the source, the
/// event label when it observes the event (`None` otherwise), and its
/// estimate at the target.
fn class_key(
    transition: &TransitionData,
    combinations: &[crate::analysis::ustructure::Combination],
    controller: usize,
    store: &AutomatonStore,
) -> Result<ClassKey, DesolveError> {
    let estimate_of = |id: StateId| -> Result<Vec<StateId>, DesolveError> {
        combinations
            .get(id.get() as usize - 1)
            .and_then(|c| c.estimates.get(controller - 1))
            .cloned()
            .ok_or_else(|| {
                DesolveError::StructuralViolation(format!(
                    "communication references unknown combination {id}"
                ))
            })
    };
    let event = store.event(transition.event)?;
    let seen = if event.observable_to(controller) {
        Some(event.label.clone())
    } else {
        None
    };
    Ok((estimate_of(transition.source)?, seen, estimate_of(transition.target)?))
}
