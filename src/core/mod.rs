//! Fundamental types and the persistent automaton store.

pub mod config;
pub mod diag;
pub mod error;
pub mod event;
pub mod state;
pub mod store;
pub mod transition;
