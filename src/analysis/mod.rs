//! Algorithms over persisted automata: the composition/projection algebra,
//! U-Structure derivation, Crush reduction, and the equilibrium search.

pub mod algebra;
pub mod crush;
pub mod nash;
pub mod ustructure;
