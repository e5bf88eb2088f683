//! Nash equilibrium search over communication protocols.
//!
//! Given a (possibly crushed) U-Structure's ambiguous states and priced
//! communications, the solver looks for an assignment of usage probabilities
//! under which no controller can unilaterally re-price the communications it
//! sends, keep the system observable, and strictly reduce its own expected
//! cost. The search is exhaustive over a finite probability grid; it is
//! combinatorial in the number of communications, and callers bound its cost
//! by bounding input size and grid resolution. There is no internal timeout.

use crate::core::config::NashConfig;
use crate::core::error::DesolveError;
use crate::core::state::StateId;
use crate::core::transition::NashCommunicationData;

const COST_EPSILON: f64 = 1e-12;

/// One communication with its assigned usage probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolEntry {
    pub communication: NashCommunicationData,
    pub usage: f64,
}

/// A complete protocol: usage per communication plus each controller's
/// expected cost (index i − 1 for controller i).
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    pub entries: Vec<ProtocolEntry>,
    pub expected_costs: Vec<f64>,
}

/// Result of a search that proved the input observable. Distinct from an
/// observability failure, which is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum NashOutcome {
    Equilibrium(Protocol),
    /// Feasible protocols exist, but none is a fixed point of best
    /// responses over the configured grid.
    NoEquilibrium,
}

/// Exhaustive equilibrium search over a usage-probability grid.
pub struct NashSolver {
    grid: Vec<f64>,
}

impl NashSolver {
    /// Builds a solver over `grid`. Values are clamped to [0, 1], NaN is
    /// dropped, and the grid is sorted and deduplicated; an empty grid falls
    /// back to the default `{0.0, 0.5, 1.0}`.
    pub fn new(grid: &[f64]) -> Self {
        let mut cleaned: Vec<f64> = grid
            .iter()
            .filter(|p| !p.is_nan())
            .map(|p| p.clamp(0.0, 1.0))
            .collect();
        cleaned.sort_by(|a, b| a.partial_cmp(b).expect("NaN filtered out"));
        cleaned.dedup();
        if cleaned.is_empty() {
            cleaned = NashConfig::default().probability_grid;
        }
        NashSolver { grid: cleaned }
    }

    pub fn from_config(config: &NashConfig) -> Self {
        NashSolver::new(&config.probability_grid)
    }

    /// Searches for a communication protocol in Nash equilibrium.
    ///
    /// Inputs are assumed pre-validated (costs ≥ 0, probabilities in [0, 1]
    /// by construction of [`NashCommunicationData`]) and are not re-checked.
    ///
    /// A protocol is feasible when every ambiguous state has at least one
    /// incident communication (source or target) with positive usage. An
    /// ambiguous state with no incident communication at all, or a grid over
    /// which no assignment is feasible, is an observability violation: no
    /// protocol renders the system observable, and no degenerate or partial
    /// protocol is returned. Feasible-but-equilibrium-free inputs report
    /// [`NashOutcome::NoEquilibrium`] instead.
    ///
    /// When several equilibria exist the lexicographically smallest usage
    /// vector wins, with communications ordered by (source, event, target,
    /// sender, receiver). The selection is deterministic.
    pub fn solve(
        &self,
        communications: &[NashCommunicationData],
        ambiguous: &[StateId],
        controllers: usize,
    ) -> Result<NashOutcome, DesolveError> {
        let mut comms: Vec<NashCommunicationData> = communications.to_vec();
        comms.sort_by_key(|c| {
            (
                c.transition(),
                c.communication.sender(),
                c.communication.receiver(),
            )
        });

        // Which communications can resolve each ambiguity.
        let mut incident: Vec<Vec<usize>> = Vec::with_capacity(ambiguous.len());
        for &state in ambiguous {
            let touching: Vec<usize> = comms
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    let t = c.transition();
                    t.source == state || t.target == state
                })
                .map(|(k, _)| k)
                .collect();
            if touching.is_empty() {
                return Err(DesolveError::ObservabilityViolation(format!(
                    "ambiguity at state {state} has no communication that can resolve it"
                )));
            }
            incident.push(touching);
        }

        // Per-controller deviation freedom: the communications it sends.
        let sends: Vec<Vec<usize>> = (1..=controllers)
            .map(|i| {
                comms
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.communication.sender() == Some(i))
                    .map(|(k, _)| k)
                    .collect()
            })
            .collect();

        let mut assignment = vec![0usize; comms.len()];
        let mut any_feasible = false;
        loop {
            if self.feasible(&assignment, &incident) {
                any_feasible = true;
                if self.is_equilibrium(&assignment, &comms, &incident, &sends) {
                    return Ok(NashOutcome::Equilibrium(
                        self.protocol(&assignment, &comms, controllers),
                    ));
                }
            }
            if !next_assignment(&mut assignment, self.grid.len()) {
                break;
            }
        }

        if any_feasible {
            Ok(NashOutcome::NoEquilibrium)
        } else {
            Err(DesolveError::ObservabilityViolation(
                "no protocol over the configured probability grid renders the system observable"
                    .to_string(),
            ))
        }
    }

    fn feasible(&self, assignment: &[usize], incident: &[Vec<usize>]) -> bool {
        incident
            .iter()
            .all(|touching| touching.iter().any(|&k| self.grid[assignment[k]] > 0.0))
    }

    /// Controller `controller`'s expected cost under `assignment`.
    fn cost(
        &self,
        controller: usize,
        assignment: &[usize],
        comms: &[NashCommunicationData],
    ) -> f64 {
        comms
            .iter()
            .enumerate()
            .filter(|(_, c)| c.communication.involves(controller))
            .map(|(k, c)| c.cost() * c.probability() * self.grid[assignment[k]])
            .sum()
    }

    /// True when no controller can re-price its own sends, stay feasible,
    /// and strictly lower its own expected cost.
    fn is_equilibrium(
        &self,
        assignment: &[usize],
        comms: &[NashCommunicationData],
        incident: &[Vec<usize>],
        sends: &[Vec<usize>],
    ) -> bool {
        for (index, own) in sends.iter().enumerate() {
            let controller = index + 1;
            if own.is_empty() {
                continue;
            }
            let current_cost = self.cost(controller, assignment, comms);
            let mut deviation = vec![0usize; own.len()];
            let mut candidate = assignment.to_vec();
            loop {
                for (slot, &k) in deviation.iter().zip(own) {
                    candidate[k] = *slot;
                }
                if candidate != assignment
                    && self.feasible(&candidate, incident)
                    && self.cost(controller, &candidate, comms) < current_cost - COST_EPSILON
                {
                    return false;
                }
                if !next_assignment(&mut deviation, self.grid.len()) {
                    break;
                }
            }
        }
        true
    }

    fn protocol(
        &self,
        assignment: &[usize],
        comms: &[NashCommunicationData],
        controllers: usize,
    ) -> Protocol {
        let entries = comms
            .iter()
            .zip(assignment)
            .map(|(communication, &slot)| ProtocolEntry {
                communication: communication.clone(),
                usage: self.grid[slot],
            })
            .collect();
        let expected_costs = (1..=controllers)
            .map(|i| self.cost(i, assignment, comms))
            .collect();
        Protocol {
            entries,
            expected_costs,
        }
    }
}

/// Odometer step, rightmost digit fastest; visits assignments in
/// lexicographic order starting from all zeros. Returns false after the
/// last assignment.
fn next_assignment(assignment: &mut [usize], base: usize) -> bool {
    for slot in assignment.iter_mut().rev() {
        *slot += 1;
        if *slot < base {
            return true;
        }
        *slot = 0;
    }
    false
}
