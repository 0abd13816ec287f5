mod held_karp;
mod open_path;

pub use held_karp::{HeldKarp, MAX_HELD_KARP_NODES};
pub use open_path::{OpenPathConfig, OpenPathTour, solve_open_path};

use shuttle_derive::New;

use crate::{Result, matrix::CostMatrix};

/// A closed tour over every node of a cost matrix.
#[derive(Clone, Debug, PartialEq, Eq, New)]
pub struct ClosedTour {
    /// Visiting order, a permutation of `0..size`.
    pub order: Vec<usize>,
    pub cost: u64,
}

/// Strategy for solving a closed tour. The traversal layer only ever sees the
/// decoded stop order, so an approximate strategy can replace the exact one.
pub trait TourSolver: Send + Sync {
    fn solve(&self, costs: &CostMatrix) -> Result<ClosedTour>;

    /// Largest node count this strategy accepts, `None` when unbounded.
    fn max_nodes(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str;
}
