use desolve::analysis::algebra::{accessible, product, project};
use desolve::core::diag;
use desolve::core::event::{Event, EventId};
use desolve::core::store::{AutomatonStore, RecordCapacity};
use std::path::Path;
use tempfile::tempdir;

fn store_with(
    dir: &Path,
    name: &str,
    controllers: usize,
    events: Vec<Event>,
) -> AutomatonStore {
    AutomatonStore::create(
        dir,
        name,
        controllers,
        events,
        RecordCapacity::default(),
        diag::null(),
    )
    .expect("create store")
}

#[test]
fn accessible_keeps_exactly_the_reachable_part() {
    let tmp = tempdir().expect("tempdir");
    let events = vec![Event::new(
        EventId::new(0),
        "go",
        vec![true],
        vec![true],
    )];
    let mut source = store_with(tmp.path(), "m", 1, events);

    let a = source.append_state("a", false).expect("append");
    let b = source.append_state("b", true).expect("append");
    let c = source.append_state("c", false).expect("append");
    let d = source.append_state("d", true).expect("append");
    source.append_transition(a, EventId::new(0), Some(b)).expect("t");
    source.append_transition(b, EventId::new(0), Some(a)).expect("t");
    // c and d are a disconnected island.
    source.append_transition(c, EventId::new(0), Some(d)).expect("t");
    source.set_initial(Some(a));
    source.flush().expect("flush");

    let mut pruned = accessible(&mut source, tmp.path(), "m_acc").expect("accessible");

    assert_eq!(pruned.state_count(), 2);
    let labels: Vec<String> = pruned
        .state_ids()
        .map(|id| pruned.state(id).expect("state").label)
        .collect();
    assert!(labels.contains(&"a".to_string()));
    assert!(labels.contains(&"b".to_string()));
    assert!(!labels.contains(&"c".to_string()));
    assert!(!labels.contains(&"d".to_string()));

    // Every surviving state is reachable from the (renumbered) initial state.
    let initial = pruned.initial().expect("initial");
    let mut reached = vec![initial];
    let mut frontier = vec![initial];
    while let Some(id) = frontier.pop() {
        for t in pruned.state(id).expect("state").transitions {
            if let Some(target) = t.target {
                if !reached.contains(&target) {
                    reached.push(target);
                    frontier.push(target);
                }
            }
        }
    }
    assert_eq!(reached.len() as u64, pruned.state_count());

    // The source is untouched.
    assert_eq!(source.state_count(), 4);
}

#[test]
fn accessible_of_a_source_without_initial_state_is_empty() {
    let tmp = tempdir().expect("tempdir");
    let events = vec![Event::new(EventId::new(0), "go", vec![true], vec![true])];
    let mut source = store_with(tmp.path(), "m", 1, events);
    source.append_state("a", false).expect("append");
    source.flush().expect("flush");

    let pruned = accessible(&mut source, tmp.path(), "m_acc").expect("accessible");
    assert_eq!(pruned.state_count(), 0);
    assert_eq!(pruned.initial(), None);
}

#[test]
fn product_with_an_uninitialized_operand_is_empty() {
    let tmp = tempdir().expect("tempdir");
    let mut a = store_with(
        tmp.path(),
        "a",
        1,
        vec![Event::new(EventId::new(0), "e", vec![true], vec![true])],
    );
    let p = a.append_state("p", false).expect("append");
    a.set_initial(Some(p));
    a.flush().expect("flush");

    // b never receives an initial state, so no pair is reachable.
    let mut b = store_with(
        tmp.path(),
        "b",
        1,
        vec![Event::new(EventId::new(0), "e", vec![true], vec![true])],
    );
    b.append_state("r", false).expect("append");
    b.flush().expect("flush");

    let c = product(&mut a, &mut b, tmp.path(), "ab").expect("product");
    assert_eq!(c.state_count(), 0);
    assert_eq!(c.initial(), None);
}

#[test]
fn product_synchronizes_shared_events_and_interleaves_private_ones() {
    let tmp = tempdir().expect("tempdir");
    let events_a = vec![
        Event::new(EventId::new(0), "sync", vec![true], vec![true]),
        Event::new(EventId::new(1), "left", vec![true], vec![false]),
    ];
    let events_b = vec![
        Event::new(EventId::new(0), "sync", vec![true], vec![false]),
        Event::new(EventId::new(1), "right", vec![true], vec![false]),
    ];

    let mut a = store_with(tmp.path(), "a", 1, events_a);
    let p = a.append_state("p", false).expect("append");
    let q = a.append_state("q", true).expect("append");
    a.append_transition(p, EventId::new(0), Some(q)).expect("t");
    a.append_transition(p, EventId::new(1), Some(p)).expect("t");
    a.set_initial(Some(p));
    a.flush().expect("flush");

    let mut b = store_with(tmp.path(), "b", 1, events_b);
    let r = b.append_state("r", false).expect("append");
    let s = b.append_state("s", true).expect("append");
    b.append_transition(r, EventId::new(0), Some(s)).expect("t");
    b.append_transition(s, EventId::new(1), Some(r)).expect("t");
    b.set_initial(Some(r));
    b.flush().expect("flush");

    let mut c = product(&mut a, &mut b, tmp.path(), "ab").expect("product");

    let mut labels: Vec<String> = c
        .state_ids()
        .map(|id| c.state(id).expect("state").label)
        .collect();
    labels.sort();
    // p_r --sync--> q_s --right--> q_r, plus the private self-loop on the
    // left operand; s_* pairs with "left" never fire together.
    assert_eq!(labels, vec!["p_r", "q_r", "q_s"]);

    let initial = c.initial().expect("initial");
    let first = c.state(initial).expect("state");
    let sync_label = |c: &AutomatonStore, id: EventId| c.events()[id.get() as usize].label.clone();
    let fired: Vec<String> = first
        .transitions
        .iter()
        .map(|t| sync_label(&c, t.event))
        .collect();
    assert!(fired.contains(&"sync".to_string()));
    assert!(fired.contains(&"left".to_string()));
    assert!(!fired.contains(&"right".to_string()));

    // Marking requires both members marked.
    let q_s = c
        .state_ids()
        .find(|&id| c.state(id).expect("state").label == "q_s")
        .expect("q_s present");
    assert!(c.state(q_s).expect("state").marked);
    let q_r = c
        .state_ids()
        .find(|&id| c.state(id).expect("state").label == "q_r")
        .expect("q_r present");
    assert!(!c.state(q_r).expect("state").marked);
}

/// Builds a one-transition operand pair with vector-labeled events and
/// returns (state count, transition count) of their product.
fn vector_product_shape(label_a: &str, label_b: &str) -> (u64, usize) {
    let tmp = tempdir().expect("tempdir");
    let events_a = vec![Event::new(
        EventId::new(0),
        label_a,
        vec![true, true],
        vec![false, false],
    )];
    let events_b = vec![Event::new(
        EventId::new(0),
        label_b,
        vec![true, true],
        vec![false, false],
    )];

    let mut a = store_with(tmp.path(), "a", 2, events_a);
    let p = a.append_state("p", false).expect("append");
    let q = a.append_state("q", false).expect("append");
    a.append_transition(p, EventId::new(0), Some(q)).expect("t");
    a.set_initial(Some(p));
    a.flush().expect("flush");

    let mut b = store_with(tmp.path(), "b", 2, events_b);
    let r = b.append_state("r", false).expect("append");
    let s = b.append_state("s", false).expect("append");
    b.append_transition(r, EventId::new(0), Some(s)).expect("t");
    b.set_initial(Some(r));
    b.flush().expect("flush");

    let mut c = product(&mut a, &mut b, tmp.path(), "ab").expect("product");
    let transitions: usize = c
        .state_ids()
        .map(|id| c.state(id).expect("state").transitions.len())
        .sum();
    (c.state_count(), transitions)
}

#[test]
fn vector_events_synchronize_componentwise() {
    // <a,*> and <*,a> agree at every position up to the wildcard.
    let (states, transitions) = vector_product_shape("<a,*>", "<*,a>");
    assert_eq!(states, 2);
    assert_eq!(transitions, 1);

    // <a,*> and <b,*> disagree at position 0: nothing synchronizes, and
    // neither event is private (vector alphabets are shared), so the
    // product never leaves its initial pair.
    let (states, transitions) = vector_product_shape("<a,x>", "<b,x>");
    assert_eq!(states, 1);
    assert_eq!(transitions, 0);
}

#[test]
fn vector_synchronization_is_invariant_under_controller_reordering() {
    let original = vector_product_shape("<a,*>", "<*,a>");
    // Swap the two controllers' component positions on both operands.
    let reordered = vector_product_shape("<*,a>", "<a,*>");
    assert_eq!(original, reordered);
}

#[test]
fn project_merges_unobservable_moves_and_preserves_marking() {
    let tmp = tempdir().expect("tempdir");
    let events = vec![
        Event::new(EventId::new(0), "a", vec![true, false], vec![true, false]),
        Event::new(EventId::new(1), "b", vec![true, true], vec![false, true]),
    ];
    let mut source = store_with(tmp.path(), "m", 2, events);
    let s1 = source.append_state("s1", false).expect("append");
    let s2 = source.append_state("s2", false).expect("append");
    let s3 = source.append_state("s3", true).expect("append");
    source.append_transition(s1, EventId::new(0), Some(s2)).expect("t");
    source.append_transition(s2, EventId::new(1), Some(s3)).expect("t");
    source.set_initial(Some(s1));
    source.flush().expect("flush");

    // Controller 2 cannot see "a": s1 and s2 fuse, "b" then leads to the
    // marked subset.
    let mut blind = project(&mut source, 2, tmp.path(), "m_p2").expect("project");
    assert_eq!(blind.state_count(), 2);
    let initial = blind.initial().expect("initial");
    let first = blind.state(initial).expect("state");
    assert_eq!(first.label, "{s1,s2}");
    assert!(!first.marked);
    let target = first.transitions[0].target.expect("target");
    assert!(blind.state(target).expect("state").marked);

    // Controller 1 sees everything: the observer is isomorphic to the source.
    let sharp = project(&mut source, 1, tmp.path(), "m_p1").expect("project");
    assert_eq!(sharp.state_count(), 3);
}

#[test]
fn product_rejects_controller_mismatch() {
    let tmp = tempdir().expect("tempdir");
    let mut a = store_with(
        tmp.path(),
        "a",
        1,
        vec![Event::new(EventId::new(0), "e", vec![true], vec![true])],
    );
    let mut b = store_with(
        tmp.path(),
        "b",
        2,
        vec![Event::new(
            EventId::new(0),
            "e",
            vec![true, true],
            vec![true, true],
        )],
    );
    assert!(product(&mut a, &mut b, tmp.path(), "ab").is_err());
}
