use shuttle_derive::New;

use crate::{
    Error, Result,
    matrix::{DurationMatrix, symmetrize},
};

use super::TourSolver;

/// Knobs for turning a closed tour into an open visiting order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenPathConfig {
    /// Ghost/real penalty, `None` for `round(10 * max(M))`.
    pub high: Option<u64>,
    /// Charge the final hop back to stop 0. Off for shuttle lines.
    pub return_to_origin: bool,
}

/// Optimal visiting order of the original stops, starting at stop 0.
#[derive(Clone, Debug, PartialEq, Eq, New)]
pub struct OpenPathTour {
    pub order: Vec<usize>,
    /// Cost of the underlying closed tour on the symmetric matrix.
    pub cost: u64,
}

/// Solves the open-path problem on `durations` through its symmetric reduction.
#[shuttle_derive::timer("solver.open_path")]
pub fn solve_open_path(
    durations: &DurationMatrix,
    solver: &dyn TourSolver,
    config: OpenPathConfig,
) -> Result<OpenPathTour> {
    let n = durations.size();
    if n < 2 {
        return Err(Error::invalid_input(format!(
            "need at least 2 stops to route, got {n}"
        )));
    }
    if let Some(max_nodes) = solver.max_nodes()
        && 2 * n > max_nodes
    {
        return Err(Error::invalid_input(format!(
            "{} solves at most {} stops, got {n}",
            solver.name(),
            max_nodes / 2
        )));
    }

    let mut costs = symmetrize(durations, config.high)?;
    if !config.return_to_origin {
        // Arriving back at stop 0 is free, so the tour may end anywhere.
        costs.set_column(0, 0);
    }

    let tour = solver.solve(&costs)?;
    let order = decode(&tour.order, n)?;

    log::debug!(
        "solver.open_path: n={n} solver={} cost={} order={order:?}",
        solver.name(),
        tour.cost
    );
    Ok(OpenPathTour::new(order, tour.cost))
}

/// Every second node of the closed tour, read from the real copy of stop 0.
fn decode(tour: &[usize], n: usize) -> Result<Vec<usize>> {
    if tour.len() != 2 * n {
        return Err(Error::invariant(format!(
            "tour has {} nodes, expected {}",
            tour.len(),
            2 * n
        )));
    }
    let start = tour
        .iter()
        .position(|&node| node == 0)
        .ok_or_else(|| Error::invariant("tour does not visit stop 0"))?;

    let order: Vec<usize> = tour
        .iter()
        .cycle()
        .skip(start)
        .take(2 * n)
        .step_by(2)
        .copied()
        .collect();

    let mut seen = vec![false; n];
    for &stop in &order {
        if stop >= n || seen[stop] {
            return Err(Error::invariant(format!(
                "tour does not alternate real and ghost stops: {tour:?}"
            )));
        }
        seen[stop] = true;
    }
    Ok(order)
}
