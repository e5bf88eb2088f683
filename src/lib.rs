//! desolve: decentralized supervisory control analysis for discrete-event
//! systems.
//!
//! A discrete-event system is a finite automaton watched by several
//! independent controllers, each with only partial observability and
//! controllability over its events. This crate models such systems and
//! answers the central question of decentralized control: when controllers
//! cannot distinguish enough on their own, who should tell whom what, how
//! often, and at what cost, so that the system becomes observable again —
//! with the answer framed as a game-theoretic equilibrium.
//!
//! # Pipeline
//!
//! ```text
//! base automaton
//!   → algebra (accessible / product / project)
//!   → U-Structure (per-controller ambiguity)
//!   → optional Crush (merge indistinguishable communications, combine costs)
//!   → Nash solver (equilibrium protocol, or an observability violation)
//! ```
//!
//! # Storage
//!
//! Automata live on disk as a header/body file pair with fixed-size,
//! offset-addressable state records, so state spaces larger than memory stay
//! usable; see [`core::store`]. Every derived automaton is written as a new
//! file pair — sources are never mutated.
//!
//! # Execution model
//!
//! Everything is single-threaded and synchronous; the only suspension point
//! is blocking I/O against the store. One logical owner mutates a file pair
//! at a time. The Nash search has no internal timeout: its cost is bounded
//! by input size and grid resolution alone.
//!
//! # Crate structure
//!
//! - [`core`]: fundamental types, error taxonomy, diagnostics, configuration,
//!   and the persistent automaton store
//! - [`analysis`]: the automaton algebra, U-Structure builder, Crush reducer,
//!   and Nash equilibrium solver

pub mod analysis;
pub mod core;

pub use crate::analysis::algebra::{accessible, product, project};
pub use crate::analysis::crush::{CombiningCosts, Crush};
pub use crate::analysis::nash::{NashOutcome, NashSolver, Protocol, ProtocolEntry};
pub use crate::analysis::ustructure::{Combination, UStructure};
pub use crate::core::config::AnalysisConfig;
pub use crate::core::diag::{ConsoleSink, DiagHandle, DiagSink, NullSink};
pub use crate::core::error::DesolveError;
pub use crate::core::event::{Event, EventId, LabelVector};
pub use crate::core::state::{State, StateId};
pub use crate::core::store::{AutomatonStore, RecordCapacity};
pub use crate::core::transition::{
    CommunicationData, NashCommunicationData, Role, Transition, TransitionData,
};
