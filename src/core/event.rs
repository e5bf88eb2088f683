//! Events and composite event labels.
//!
//! An event carries per-controller observability and controllability flags.
//! Controller indices are 1-based throughout the public API. Labels may be
//! composite vectors written `<c1,c2,...,cn>`; see [`LabelVector`].

use crate::core::error::DesolveError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Identifier of an event; index into the owning automaton's event table.
/// Unique within one automaton.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventId(u32);

impl EventId {
    pub fn new(raw: u32) -> Self {
        EventId(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of an automaton's event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub label: String,
    /// `observable[i - 1]` is controller i's observability flag.
    pub observable: Vec<bool>,
    /// `controllable[i - 1]` is controller i's controllability flag.
    pub controllable: Vec<bool>,
}

impl Event {
    pub fn new(id: EventId, label: &str, observable: Vec<bool>, controllable: Vec<bool>) -> Self {
        Event {
            id,
            label: label.to_string(),
            observable,
            controllable,
        }
    }

    /// Number of controllers this event's flag vectors cover.
    pub fn controllers(&self) -> usize {
        self.observable.len()
    }

    /// Whether controller `controller` (1-based) observes this event.
    ///
    /// The observability flag is authoritative, further restricted by the
    /// label: a `*` component at the controller's position, or at position 0,
    /// hides the event from that controller regardless of the flag.
    pub fn observable_to(&self, controller: usize) -> bool {
        if controller == 0 || controller > self.observable.len() {
            return false;
        }
        let vector = self.vector();
        if vector.is_vector()
            && (vector.is_globally_unobservable()
                || vector.is_unobservable_to_controller(controller))
        {
            return false;
        }
        self.observable[controller - 1]
    }

    /// Whether controller `controller` (1-based) controls this event.
    pub fn controllable_by(&self, controller: usize) -> bool {
        controller >= 1 && controller <= self.controllable.len() && self.controllable[controller - 1]
    }

    /// Parsed decomposition of this event's label.
    pub fn vector(&self) -> LabelVector {
        LabelVector::parse(&self.label)
    }
}

fn vector_envelope() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<(.*)>$").expect("static regex"))
}

/// Parsed decomposition of a composite label written `<c1,c2,...,cn>`.
///
/// Controller i (1-based) owns component i − 1. A `*` component marks the
/// event unobservable to that controller; a `*` at position 0 additionally
/// marks it globally unobservable. A label without the `<...>` envelope is
/// not a vector: its size is −1 and it has no components to iterate.
/// The component count is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVector {
    label: String,
    components: Option<Vec<String>>,
}

impl LabelVector {
    pub fn parse(label: &str) -> Self {
        let components = vector_envelope().captures(label).map(|caps| {
            caps.get(1)
                .map_or("", |m| m.as_str())
                .split(',')
                .map(str::to_string)
                .collect()
        });
        LabelVector {
            label: label.to_string(),
            components,
        }
    }

    /// The label this vector was parsed from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_vector(&self) -> bool {
        self.components.is_some()
    }

    /// Component count, or −1 for a plain (non-vector) label.
    pub fn size(&self) -> i64 {
        match &self.components {
            Some(parts) => parts.len() as i64,
            None => -1,
        }
    }

    /// The components of a vector label, in order. Fails with an
    /// unsupported-operation error on a plain label.
    pub fn components(&self) -> Result<&[String], DesolveError> {
        self.components.as_deref().ok_or_else(|| {
            DesolveError::UnsupportedOperation(format!(
                "label '{}' is not a vector; it has no components",
                self.label
            ))
        })
    }

    /// Component at `index`, or `None` past the end / on a plain label.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components
            .as_ref()
            .and_then(|parts| parts.get(index))
            .map(String::as_str)
    }

    /// `*` at position 0 marks the event unobservable to every controller.
    pub fn is_globally_unobservable(&self) -> bool {
        self.component(0) == Some("*")
    }

    /// `*` at controller `controller`'s position (1-based) marks the event
    /// unobservable specifically to that controller. Plain labels and
    /// out-of-range controllers answer false.
    pub fn is_unobservable_to_controller(&self, controller: usize) -> bool {
        controller >= 1 && self.component(controller - 1) == Some("*")
    }

    /// Whether two vectors can fire as one synchronized step: same component
    /// count, and at every position the components agree or at least one is
    /// the `*` wildcard.
    pub fn synchronizes_with(&self, other: &LabelVector) -> bool {
        match (&self.components, &other.components) {
            (Some(a), Some(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| x == y || x == "*" || y == "*")
            }
            _ => false,
        }
    }

    /// Label of the synchronized step: componentwise, the non-`*` side wins.
    /// `None` when the vectors do not synchronize.
    pub fn merge(&self, other: &LabelVector) -> Option<String> {
        if !self.synchronizes_with(other) {
            return None;
        }
        let a = self.components.as_ref()?;
        let b = other.components.as_ref()?;
        let merged: Vec<&str> = a
            .iter()
            .zip(b)
            .map(|(x, y)| if x == "*" { y.as_str() } else { x.as_str() })
            .collect();
        Some(format!("<{}>", merged.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_parse_and_star_positions() {
        let v = LabelVector::parse("<a,*,c>");
        assert_eq!(v.size(), 3);
        assert!(v.is_unobservable_to_controller(2));
        assert!(!v.is_unobservable_to_controller(1));
        assert!(!v.is_globally_unobservable());

        let g = LabelVector::parse("<*,b>");
        assert!(g.is_globally_unobservable());
    }

    #[test]
    fn plain_label_is_not_a_vector() {
        let v = LabelVector::parse("plain");
        assert_eq!(v.size(), -1);
        assert!(matches!(
            v.components(),
            Err(DesolveError::UnsupportedOperation(_))
        ));
        assert!(!v.is_unobservable_to_controller(1));
    }

    #[test]
    fn synchronization_and_merge() {
        let a = LabelVector::parse("<a,*>");
        let b = LabelVector::parse("<*,b>");
        assert!(a.synchronizes_with(&b));
        assert_eq!(a.merge(&b).unwrap(), "<a,b>");

        let c = LabelVector::parse("<a,c>");
        assert!(!b.synchronizes_with(&c));
        assert!(b.merge(&c).is_none());
        assert!(!LabelVector::parse("<a>").synchronizes_with(&LabelVector::parse("<a,b>")));
        assert!(!LabelVector::parse("x").synchronizes_with(&LabelVector::parse("x")));
    }

    #[test]
    fn merge_is_symmetric_per_position() {
        let a = LabelVector::parse("<a,*,c>");
        let b = LabelVector::parse("<*,b,c>");
        assert_eq!(a.merge(&b), b.merge(&a));
    }
}
