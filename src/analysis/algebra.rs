//! Automaton algebra: reachability pruning, synchronized product, and
//! per-controller projection.
//!
//! Every operation is copy-on-produce: the result is written to a fresh
//! header/body pair and the sources are never mutated. A dangling event id or
//! a structurally inconsistent state fails the operation immediately with no
//! partial result; the raw-0 target sentinel is a diagnostic warning at write
//! time, never a failure here.

use crate::core::error::DesolveError;
use crate::core::event::{Event, EventId};
use crate::core::state::StateId;
use crate::core::store::{AutomatonStore, RecordCapacity};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::path::Path;

/// Copies the part of `source` reachable from its initial state into a fresh
/// file pair at `dir/<name>`, renumbering ids densely and re-pointing all
/// transitions. A source without an initial state yields an empty result.
pub fn accessible(
    source: &mut AutomatonStore,
    dir: &Path,
    name: &str,
) -> Result<AutomatonStore, DesolveError> {
    let mut result = AutomatonStore::create(
        dir,
        name,
        source.controllers(),
        source.events().to_vec(),
        source.capacity(),
        source.diag(),
    )?;

    let Some(initial) = source.initial() else {
        result.flush()?;
        return Ok(result);
    };

    let mut renumbered: FxHashMap<StateId, StateId> = FxHashMap::default();
    let mut queue = VecDeque::new();

    let first = source.state(initial)?;
    let new_initial = result.append_state(&first.label, first.marked)?;
    renumbered.insert(initial, new_initial);
    queue.push_back(initial);

    while let Some(old_id) = queue.pop_front() {
        let state = source.state(old_id)?;
        let new_source = renumbered[&old_id];
        for transition in &state.transitions {
            let new_target = match transition.target {
                None => None,
                Some(old_target) => Some(match renumbered.get(&old_target) {
                    Some(&mapped) => mapped,
                    None => {
                        let target_state = source.state(old_target)?;
                        let mapped =
                            result.append_state(&target_state.label, target_state.marked)?;
                        renumbered.insert(old_target, mapped);
                        queue.push_back(old_target);
                        mapped
                    }
                }),
            };
            result.append_transition(new_source, transition.event, new_target)?;
        }
    }

    result.set_initial(Some(new_initial));
    result.flush()?;
    Ok(result)
}

/// How events fire in the product.
struct SyncTable {
    events: Vec<Event>,
    /// a-event → list of (b-event, merged event) it synchronizes with.
    shared: FxHashMap<EventId, Vec<(EventId, EventId)>>,
    /// Private steps of each operand: operand event → merged event.
    private_a: FxHashMap<EventId, EventId>,
    private_b: FxHashMap<EventId, EventId>,
}

/// Interns a merged event by label, ORing per-controller flags into it.
fn intern_event(
    events: &mut Vec<Event>,
    by_label: &mut FxHashMap<String, usize>,
    label: &str,
    observable: &[bool],
    controllable: &[bool],
) -> EventId {
    let slot = match by_label.get(label) {
        Some(&slot) => slot,
        None => {
            events.push(Event::new(
                EventId::new(events.len() as u32),
                label,
                vec![false; observable.len()],
                vec![false; controllable.len()],
            ));
            by_label.insert(label.to_string(), events.len() - 1);
            events.len() - 1
        }
    };
    let event = &mut events[slot];
    for (flag, &or) in event.observable.iter_mut().zip(observable) {
        *flag |= or;
    }
    for (flag, &or) in event.controllable.iter_mut().zip(controllable) {
        *flag |= or;
    }
    event.id
}

/// Pairs every a-event with every b-event it can fire with. Two events
/// synchronize when their labels are equal, or when both are vectors that
/// agree componentwise up to the `*` wildcard. An event that synchronizes
/// with nothing on the other side is a private step of its operand.
///
/// Merged events OR the operands' per-controller flag vectors, so the
/// pairing only depends on componentwise agreement and is invariant under
/// controller reordering of vector components.
fn sync_table(a: &AutomatonStore, b: &AutomatonStore) -> SyncTable {
    let mut events: Vec<Event> = Vec::new();
    let mut by_label: FxHashMap<String, usize> = FxHashMap::default();
    let mut shared: FxHashMap<EventId, Vec<(EventId, EventId)>> = FxHashMap::default();
    let mut synced_b: FxHashMap<EventId, bool> = FxHashMap::default();

    for ea in a.events() {
        let va = ea.vector();
        for eb in b.events() {
            let merged_label = if ea.label == eb.label {
                Some(ea.label.clone())
            } else {
                va.merge(&eb.vector())
            };
            let Some(label) = merged_label else { continue };
            let mut observable = ea.observable.clone();
            for (flag, &or) in observable.iter_mut().zip(&eb.observable) {
                *flag |= or;
            }
            let mut controllable = ea.controllable.clone();
            for (flag, &or) in controllable.iter_mut().zip(&eb.controllable) {
                *flag |= or;
            }
            let merged = intern_event(&mut events, &mut by_label, &label, &observable, &controllable);
            shared.entry(ea.id).or_default().push((eb.id, merged));
            synced_b.insert(eb.id, true);
        }
    }

    // A vector-labeled event spans every controller, so it is never a
    // private step: with no partner on the other side it simply cannot
    // fire. Plain-labeled events unique to one operand interleave.
    let mut private_a = FxHashMap::default();
    for ea in a.events() {
        if !shared.contains_key(&ea.id) && !ea.vector().is_vector() {
            let merged =
                intern_event(&mut events, &mut by_label, &ea.label, &ea.observable, &ea.controllable);
            private_a.insert(ea.id, merged);
        }
    }
    let mut private_b = FxHashMap::default();
    for eb in b.events() {
        if !synced_b.contains_key(&eb.id) && !eb.vector().is_vector() {
            let merged =
                intern_event(&mut events, &mut by_label, &eb.label, &eb.observable, &eb.controllable);
            private_b.insert(eb.id, merged);
        }
    }

    SyncTable {
        events,
        shared,
        private_a,
        private_b,
    }
}

/// Appends the pair state for (sa, sb) if it is new, returning its id.
fn discover_pair(
    sa: StateId,
    sb: StateId,
    a: &mut AutomatonStore,
    b: &mut AutomatonStore,
    result: &mut AutomatonStore,
    paired: &mut FxHashMap<(StateId, StateId), StateId>,
    queue: &mut VecDeque<(StateId, StateId)>,
) -> Result<StateId, DesolveError> {
    if let Some(&mapped) = paired.get(&(sa, sb)) {
        return Ok(mapped);
    }
    let state_a = a.state(sa)?;
    let state_b = b.state(sb)?;
    let label = format!("{}_{}", state_a.label, state_b.label);
    let mapped = result.append_state(&label, state_a.marked && state_b.marked)?;
    paired.insert((sa, sb), mapped);
    queue.push_back((sa, sb));
    Ok(mapped)
}

/// Synchronized composition of `a` and `b`. States of the result are
/// reachable pairs of operand states; a pair is marked when both members
/// are. Shared events fire jointly, private events interleave. Transitions
/// with no target cannot advance a pair and are skipped.
pub fn product(
    a: &mut AutomatonStore,
    b: &mut AutomatonStore,
    dir: &Path,
    name: &str,
) -> Result<AutomatonStore, DesolveError> {
    if a.controllers() != b.controllers() {
        return Err(DesolveError::ValidationError(format!(
            "operands disagree on controller count ({} vs {})",
            a.controllers(),
            b.controllers()
        )));
    }

    let table = sync_table(a, b);
    let capacity = RecordCapacity::new(
        a.capacity().max_label_bytes + 1 + b.capacity().max_label_bytes,
        a.capacity().max_transitions + b.capacity().max_transitions,
    );
    let mut result = AutomatonStore::create(
        dir,
        name,
        a.controllers(),
        table.events.clone(),
        capacity,
        a.diag(),
    )?;

    let (Some(init_a), Some(init_b)) = (a.initial(), b.initial()) else {
        result.flush()?;
        return Ok(result);
    };

    let mut paired: FxHashMap<(StateId, StateId), StateId> = FxHashMap::default();
    let mut queue = VecDeque::new();
    let new_initial = discover_pair(init_a, init_b, a, b, &mut result, &mut paired, &mut queue)?;

    while let Some((sa, sb)) = queue.pop_front() {
        let pair_id = paired[&(sa, sb)];
        let state_a = a.state(sa)?;
        let state_b = b.state(sb)?;

        for ta in &state_a.transitions {
            let Some(target_a) = ta.target else { continue };
            if let Some(partners) = table.shared.get(&ta.event) {
                for &(eb, merged) in partners {
                    for tb in &state_b.transitions {
                        if tb.event != eb {
                            continue;
                        }
                        let Some(target_b) = tb.target else { continue };
                        let successor = discover_pair(
                            target_a,
                            target_b,
                            a,
                            b,
                            &mut result,
                            &mut paired,
                            &mut queue,
                        )?;
                        result.append_transition(pair_id, merged, Some(successor))?;
                    }
                }
            } else if let Some(&merged) = table.private_a.get(&ta.event) {
                let successor =
                    discover_pair(target_a, sb, a, b, &mut result, &mut paired, &mut queue)?;
                result.append_transition(pair_id, merged, Some(successor))?;
            }
        }
        for tb in &state_b.transitions {
            let Some(target_b) = tb.target else { continue };
            if let Some(&merged) = table.private_b.get(&tb.event) {
                let successor =
                    discover_pair(sa, target_b, a, b, &mut result, &mut paired, &mut queue)?;
                result.append_transition(pair_id, merged, Some(successor))?;
            }
        }
    }

    result.set_initial(Some(new_initial));
    result.flush()?;
    Ok(result)
}

/// Observer (subset) construction output: the determinized store plus, per
/// result state (raw id − 1), the sorted member set it stands for.
pub(crate) struct Observer {
    pub store: AutomatonStore,
    pub subsets: Vec<Vec<StateId>>,
}

/// Closure of `seed` under moves controller `controller` cannot observe.
pub(crate) fn unobservable_closure(
    source: &mut AutomatonStore,
    seed: &[StateId],
    controller: usize,
) -> Result<Vec<StateId>, DesolveError> {
    let mut members: Vec<StateId> = seed.to_vec();
    let mut queue: VecDeque<StateId> = seed.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        let state = source.state(id)?;
        for transition in &state.transitions {
            let Some(target) = transition.target else { continue };
            if source.event(transition.event)?.observable_to(controller) {
                continue;
            }
            if !members.contains(&target) {
                members.push(target);
                queue.push_back(target);
            }
        }
    }
    members.sort();
    members.dedup();
    Ok(members)
}

/// Appends the observer state for `subset` if it is new, returning its id.
fn intern_subset(
    subset: Vec<StateId>,
    source: &mut AutomatonStore,
    store: &mut AutomatonStore,
    subsets: &mut Vec<Vec<StateId>>,
    interned: &mut FxHashMap<Vec<StateId>, StateId>,
    queue: &mut VecDeque<Vec<StateId>>,
) -> Result<StateId, DesolveError> {
    if let Some(&mapped) = interned.get(&subset) {
        return Ok(mapped);
    }
    let mut labels = Vec::with_capacity(subset.len());
    let mut marked = false;
    for &member in &subset {
        let state = source.state(member)?;
        labels.push(state.label);
        marked |= state.marked;
    }
    let mapped = store.append_state(&format!("{{{}}}", labels.join(",")), marked)?;
    interned.insert(subset.clone(), mapped);
    subsets.push(subset.clone());
    queue.push_back(subset);
    Ok(mapped)
}

pub(crate) fn observer(
    source: &mut AutomatonStore,
    controller: usize,
    dir: &Path,
    name: &str,
) -> Result<Observer, DesolveError> {
    if controller == 0 || controller > source.controllers() {
        return Err(DesolveError::ValidationError(format!(
            "controller index {controller} out of range 1..={}",
            source.controllers()
        )));
    }

    // Subset labels concatenate member labels, so size the records for the
    // worst case up front.
    let mut label_bytes = 2;
    for id in source.state_ids() {
        label_bytes += source.state(id)?.label.len() + 1;
    }
    let observable_events: Vec<EventId> = source
        .events()
        .iter()
        .filter(|e| e.observable_to(controller))
        .map(|e| e.id)
        .collect();
    let capacity = RecordCapacity::new(label_bytes, observable_events.len().max(1));

    let mut store = AutomatonStore::create(
        dir,
        name,
        source.controllers(),
        source.events().to_vec(),
        capacity,
        source.diag(),
    )?;
    let mut subsets: Vec<Vec<StateId>> = Vec::new();

    let Some(initial) = source.initial() else {
        store.flush()?;
        return Ok(Observer { store, subsets });
    };

    let mut interned: FxHashMap<Vec<StateId>, StateId> = FxHashMap::default();
    let mut queue: VecDeque<Vec<StateId>> = VecDeque::new();

    let seed = unobservable_closure(source, &[initial], controller)?;
    let new_initial = intern_subset(
        seed,
        source,
        &mut store,
        &mut subsets,
        &mut interned,
        &mut queue,
    )?;

    while let Some(subset) = queue.pop_front() {
        let subset_id = interned[&subset];
        for &event in &observable_events {
            let mut targets = Vec::new();
            for &member in &subset {
                let state = source.state(member)?;
                for transition in &state.transitions {
                    if transition.event == event {
                        if let Some(target) = transition.target {
                            targets.push(target);
                        }
                    }
                }
            }
            if targets.is_empty() {
                continue;
            }
            let successor = unobservable_closure(source, &targets, controller)?;
            let successor_id = intern_subset(
                successor,
                source,
                &mut store,
                &mut subsets,
                &mut interned,
                &mut queue,
            )?;
            store.append_transition(subset_id, event, Some(successor_id))?;
        }
    }

    store.set_initial(Some(new_initial));
    store.flush()?;
    Ok(Observer { store, subsets })
}

/// Projection onto controller `controller` (1-based): the observer automaton
/// over moves that controller cannot see. A result state is marked when any
/// member state is marked; reachability and marking are preserved.
pub fn project(
    source: &mut AutomatonStore,
    controller: usize,
    dir: &Path,
    name: &str,
) -> Result<AutomatonStore, DesolveError> {
    Ok(observer(source, controller, dir, name)?.store)
}
