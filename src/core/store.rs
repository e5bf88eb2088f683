//! Persistent automaton store.
//!
//! One automaton is two files: a JSON header (`<name>.hdr`) holding the
//! controller count, the event table, the state count, the optional initial
//! state id, and the body-record capacities; and a binary body (`<name>.bdy`)
//! holding one fixed-size record per state. A state lookup is a single seek
//! at `(id - 1) * record_size`, never a scan, so automata larger than
//! available memory stay usable with a bounded resident working set.
//!
//! All mutation is append/flush. There is no internal locking: a single
//! logical owner must serialize writes to a given file pair, and concurrent
//! external mutation is undefined behavior. Derived automata are always
//! written as new file pairs; a source is never mutated in place.
//!
//! Body record layout:
//!
//! ```text
//! flags: u8          bit 0 = exists, bit 1 = marked
//! label_len: u16 le  followed by the label bytes, padded to max_label_bytes
//! n_transitions: u16 le
//! transitions        max_transitions × (event_id: u32 le, raw_target: u64 le)
//! ```
//!
//! A raw target of 0 is the null sentinel ("no state"); it decodes to `None`.
//! Transition order within a state is append order and is preserved across
//! a flush/reopen round trip.

use crate::core::diag::DiagHandle;
use crate::core::error::DesolveError;
use crate::core::event::{Event, EventId};
use crate::core::state::{self, State, StateId};
use crate::core::transition::Transition;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FLAG_EXISTS: u8 = 0b0000_0001;
const FLAG_MARKED: u8 = 0b0000_0010;

/// Bytes per encoded transition slot: event id (u32) + raw target (u64).
const TRANSITION_SLOT_BYTES: usize = 4 + 8;

/// Per-record capacities fixed in the header. A record that outgrows
/// `max_transitions` triggers a body rewrite with doubled capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCapacity {
    pub max_label_bytes: usize,
    pub max_transitions: usize,
}

impl RecordCapacity {
    pub fn new(max_label_bytes: usize, max_transitions: usize) -> Self {
        RecordCapacity {
            max_label_bytes: max_label_bytes.clamp(1, u16::MAX as usize),
            max_transitions: max_transitions.clamp(1, u16::MAX as usize),
        }
    }

    pub fn record_size(&self) -> usize {
        1 + 2 + self.max_label_bytes + 2 + self.max_transitions * TRANSITION_SLOT_BYTES
    }
}

impl Default for RecordCapacity {
    fn default() -> Self {
        RecordCapacity::new(64, 8)
    }
}

/// Header file contents. Small enough to load whole; rewritten on flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub controllers: usize,
    pub events: Vec<Event>,
    pub state_count: u64,
    pub initial: Option<StateId>,
    pub capacity: RecordCapacity,
}

/// Handle on one persisted automaton (header + body file pair).
pub struct AutomatonStore {
    header: Header,
    header_path: PathBuf,
    body_path: PathBuf,
    body: File,
    event_index: FxHashMap<EventId, usize>,
    diag: DiagHandle,
}

impl AutomatonStore {
    /// Creates a fresh, empty file pair at `dir/<name>.{hdr,bdy}`.
    ///
    /// The event table is fixed for the life of the automaton; event ids must
    /// be unique and every flag vector must cover `controllers` entries.
    pub fn create(
        dir: &Path,
        name: &str,
        controllers: usize,
        events: Vec<Event>,
        capacity: RecordCapacity,
        diag: DiagHandle,
    ) -> Result<Self, DesolveError> {
        let event_index = index_events(&events, controllers)?;
        fs::create_dir_all(dir)?;
        let header_path = dir.join(format!("{name}.hdr"));
        let body_path = dir.join(format!("{name}.bdy"));
        let body = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&body_path)?;
        let mut store = AutomatonStore {
            header: Header {
                controllers,
                events,
                state_count: 0,
                initial: None,
                capacity,
            },
            header_path,
            body_path,
            body,
            event_index,
            diag,
        };
        store.flush()?;
        Ok(store)
    }

    /// Opens an existing file pair.
    pub fn open(dir: &Path, name: &str, diag: DiagHandle) -> Result<Self, DesolveError> {
        let header_path = dir.join(format!("{name}.hdr"));
        let body_path = dir.join(format!("{name}.bdy"));
        if !header_path.exists() {
            return Err(DesolveError::NotFound(format!(
                "automaton header {}",
                header_path.display()
            )));
        }
        let header: Header = serde_json::from_str(&fs::read_to_string(&header_path)?)?;
        let event_index = index_events(&header.events, header.controllers)?;
        let body = OpenOptions::new().read(true).write(true).open(&body_path)?;
        Ok(AutomatonStore {
            header,
            header_path,
            body_path,
            body,
            event_index,
            diag,
        })
    }

    pub fn controllers(&self) -> usize {
        self.header.controllers
    }

    pub fn state_count(&self) -> u64 {
        self.header.state_count
    }

    pub fn initial(&self) -> Option<StateId> {
        self.header.initial
    }

    pub fn capacity(&self) -> RecordCapacity {
        self.header.capacity
    }

    pub fn events(&self) -> &[Event] {
        &self.header.events
    }

    pub fn diag(&self) -> DiagHandle {
        self.diag.clone()
    }

    /// Dense ids of all persisted states, in append order.
    pub fn state_ids(&self) -> impl Iterator<Item = StateId> + use<> {
        (1..=self.header.state_count).map(|raw| StateId::new(raw).expect("raw ≥ 1"))
    }

    /// Event-table lookup. A missing id is a dangling reference.
    pub fn event(&self, id: EventId) -> Result<&Event, DesolveError> {
        self.event_index
            .get(&id)
            .map(|&i| &self.header.events[i])
            .ok_or_else(|| DesolveError::StructuralViolation(format!("dangling event id {id}")))
    }

    pub fn set_initial(&mut self, initial: Option<StateId>) {
        self.header.initial = initial;
    }

    /// Appends a state, assigning the next dense id.
    pub fn append_state(&mut self, label: &str, marked: bool) -> Result<StateId, DesolveError> {
        if label.len() > self.header.capacity.max_label_bytes {
            return Err(DesolveError::ValidationError(format!(
                "label '{label}' exceeds the record capacity of {} bytes",
                self.header.capacity.max_label_bytes
            )));
        }
        let id = StateId::new(self.header.state_count + 1).expect("raw ≥ 1");
        let record = encode_record(label, marked, &[], self.header.capacity);
        self.write_record(id, &record)?;
        self.header.state_count += 1;
        Ok(id)
    }

    /// Reads one state by direct offset. Fails with NotFound when the id is
    /// past the persisted range, and with a structural violation on a
    /// corrupt record or a dangling event reference.
    pub fn state(&mut self, id: StateId) -> Result<State, DesolveError> {
        let record = self.read_record(id)?;
        let (label, marked, raw_transitions) = decode_record(&record, self.header.capacity)
            .ok_or_else(|| {
                DesolveError::StructuralViolation(format!("corrupt body record for state {id}"))
            })?;
        let mut transitions = Vec::with_capacity(raw_transitions.len());
        for (event, raw_target) in raw_transitions {
            self.event(event)?;
            if raw_target > self.header.state_count {
                return Err(DesolveError::StructuralViolation(format!(
                    "transition target {raw_target} of state {id} is past the persisted range"
                )));
            }
            transitions.push(Transition {
                event,
                target: state::raw_to_target(raw_target),
            });
        }
        Ok(State {
            id,
            label,
            marked,
            transitions,
        })
    }

    /// Appends one outgoing transition to `source`. A target past the
    /// persisted range is a structural violation and nothing is written;
    /// append states before the transitions that point at them. A full
    /// record triggers a body rewrite with doubled transition capacity.
    pub fn append_transition(
        &mut self,
        source: StateId,
        event: EventId,
        target: Option<StateId>,
    ) -> Result<(), DesolveError> {
        self.event(event)?;
        if let Some(target) = target {
            if target.get() > self.header.state_count {
                return Err(DesolveError::StructuralViolation(format!(
                    "transition target {target} of state {source} is past the persisted range"
                )));
            }
        }
        let record = self.read_record(source)?;
        let (label, marked, mut raw_transitions) = decode_record(&record, self.header.capacity)
            .ok_or_else(|| {
                DesolveError::StructuralViolation(format!("corrupt body record for state {source}"))
            })?;
        if raw_transitions.len() >= self.header.capacity.max_transitions {
            self.grow_transition_capacity()?;
        }
        raw_transitions.push((event, state::target_to_raw(target)));
        let record = encode_record(&label, marked, &raw_transitions, self.header.capacity);
        self.write_record(source, &record)
    }

    /// Raw-target variant for callers replaying external data. The reserved
    /// value 0 is accepted, reported through the diagnostic sink, and stored
    /// as "no target".
    pub fn append_transition_raw(
        &mut self,
        source: StateId,
        event: EventId,
        raw_target: u64,
    ) -> Result<(), DesolveError> {
        let target = state::raw_to_target(raw_target);
        if raw_target == 0 {
            self.diag.warn(&format!(
                "transition on event {event} from state {source} targets the reserved id 0; \
                 storing it as \"no target\""
            ));
        }
        self.append_transition(source, event, target)
    }

    /// Writes the header and syncs the body. Call before reopening the pair.
    pub fn flush(&mut self) -> Result<(), DesolveError> {
        let rendered = serde_json::to_string_pretty(&self.header)?;
        fs::write(&self.header_path, rendered)?;
        self.body.sync_all()?;
        Ok(())
    }

    fn record_offset(&self, id: StateId) -> u64 {
        (id.get() - 1) * self.header.capacity.record_size() as u64
    }

    fn read_record(&mut self, id: StateId) -> Result<Vec<u8>, DesolveError> {
        if id.get() > self.header.state_count {
            return Err(DesolveError::NotFound(format!("state {id}")));
        }
        let mut buffer = vec![0u8; self.header.capacity.record_size()];
        self.body.seek(SeekFrom::Start(self.record_offset(id)))?;
        self.body.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_record(&mut self, id: StateId, record: &[u8]) -> Result<(), DesolveError> {
        self.body.seek(SeekFrom::Start(self.record_offset(id)))?;
        self.body.write_all(record)?;
        Ok(())
    }

    /// Rewrites the body with doubled per-record transition capacity. The
    /// record prefix layout is unchanged, so each record is copied and
    /// zero-padded.
    fn grow_transition_capacity(&mut self) -> Result<(), DesolveError> {
        let old = self.header.capacity;
        let new = RecordCapacity::new(old.max_label_bytes, old.max_transitions * 2);
        if new.max_transitions == old.max_transitions {
            return Err(DesolveError::ValidationError(
                "transition capacity is already at its maximum".to_string(),
            ));
        }
        self.diag.note(&format!(
            "growing body transition capacity from {} to {} ({})",
            old.max_transitions,
            new.max_transitions,
            self.body_path.display()
        ));

        let tmp_path = self.body_path.with_extension("bdy.tmp");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut old_record = vec![0u8; old.record_size()];
        let mut new_record = vec![0u8; new.record_size()];
        self.body.seek(SeekFrom::Start(0))?;
        for _ in 0..self.header.state_count {
            self.body.read_exact(&mut old_record)?;
            new_record.fill(0);
            new_record[..old.record_size()].copy_from_slice(&old_record);
            tmp.write_all(&new_record)?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.body_path)?;
        self.body = OpenOptions::new().read(true).write(true).open(&self.body_path)?;
        self.header.capacity = new;
        self.flush()
    }
}

fn index_events(
    events: &[Event],
    controllers: usize,
) -> Result<FxHashMap<EventId, usize>, DesolveError> {
    let mut index = FxHashMap::default();
    for (i, event) in events.iter().enumerate() {
        if event.observable.len() != controllers || event.controllable.len() != controllers {
            return Err(DesolveError::ValidationError(format!(
                "event '{}' flag vectors do not cover {controllers} controllers",
                event.label
            )));
        }
        if index.insert(event.id, i).is_some() {
            return Err(DesolveError::ValidationError(format!(
                "duplicate event id {}",
                event.id
            )));
        }
    }
    Ok(index)
}

fn encode_record(
    label: &str,
    marked: bool,
    transitions: &[(EventId, u64)],
    capacity: RecordCapacity,
) -> Vec<u8> {
    debug_assert!(label.len() <= capacity.max_label_bytes);
    debug_assert!(transitions.len() <= capacity.max_transitions);
    let mut record = vec![0u8; capacity.record_size()];
    record[0] = FLAG_EXISTS | if marked { FLAG_MARKED } else { 0 };
    record[1..3].copy_from_slice(&(label.len() as u16).to_le_bytes());
    record[3..3 + label.len()].copy_from_slice(label.as_bytes());
    let counter_at = 3 + capacity.max_label_bytes;
    record[counter_at..counter_at + 2].copy_from_slice(&(transitions.len() as u16).to_le_bytes());
    let mut at = counter_at + 2;
    for (event, raw_target) in transitions {
        record[at..at + 4].copy_from_slice(&event.get().to_le_bytes());
        record[at + 4..at + 12].copy_from_slice(&raw_target.to_le_bytes());
        at += TRANSITION_SLOT_BYTES;
    }
    record
}

fn decode_record(
    record: &[u8],
    capacity: RecordCapacity,
) -> Option<(String, bool, Vec<(EventId, u64)>)> {
    if record.len() != capacity.record_size() || record[0] & FLAG_EXISTS == 0 {
        return None;
    }
    let marked = record[0] & FLAG_MARKED != 0;
    let label_len = u16::from_le_bytes([record[1], record[2]]) as usize;
    if label_len > capacity.max_label_bytes {
        return None;
    }
    let label = String::from_utf8(record[3..3 + label_len].to_vec()).ok()?;
    let counter_at = 3 + capacity.max_label_bytes;
    let n_transitions =
        u16::from_le_bytes([record[counter_at], record[counter_at + 1]]) as usize;
    if n_transitions > capacity.max_transitions {
        return None;
    }
    let mut transitions = Vec::with_capacity(n_transitions);
    let mut at = counter_at + 2;
    for _ in 0..n_transitions {
        let event = u32::from_le_bytes(record[at..at + 4].try_into().ok()?);
        let raw_target = u64::from_le_bytes(record[at + 4..at + 12].try_into().ok()?);
        transitions.push((EventId::new(event), raw_target));
        at += TRANSITION_SLOT_BYTES;
    }
    Some((label, marked, transitions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_codec_round_trip() {
        let capacity = RecordCapacity::new(16, 4);
        let transitions = vec![(EventId::new(2), 3u64), (EventId::new(0), 0u64)];
        let record = encode_record("s1", true, &transitions, capacity);
        assert_eq!(record.len(), capacity.record_size());
        let (label, marked, decoded) = decode_record(&record, capacity).expect("decode");
        assert_eq!(label, "s1");
        assert!(marked);
        assert_eq!(decoded, transitions);
    }

    #[test]
    fn blank_record_does_not_decode() {
        let capacity = RecordCapacity::default();
        let record = vec![0u8; capacity.record_size()];
        assert!(decode_record(&record, capacity).is_none());
    }
}
