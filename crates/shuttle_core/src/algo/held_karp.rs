use crate::{Error, Result, matrix::CostMatrix};

use super::{ClosedTour, TourSolver};

/// Hard ceiling on nodes. Memory is `2^(n-1) * (n-1)` cells, ~90MB at 20 nodes.
pub const MAX_HELD_KARP_NODES: usize = 20;

const NO_PARENT: u8 = u8::MAX;

/// Exact dynamic programming over subsets (Held-Karp).
///
/// Runs in `O(2^n * n^2)` time, so it is only viable for the handful of stops a
/// single line carries. `max_nodes` is enforced rather than degrading silently.
#[derive(Clone, Copy, Debug)]
pub struct HeldKarp {
    max_nodes: usize,
}

impl HeldKarp {
    pub fn new(max_nodes: usize) -> Result<Self> {
        if !(2..=MAX_HELD_KARP_NODES).contains(&max_nodes) {
            return Err(Error::invalid_input(format!(
                "held-karp max_nodes must be in 2..={MAX_HELD_KARP_NODES}, got {max_nodes}"
            )));
        }
        Ok(Self { max_nodes })
    }
}

impl Default for HeldKarp {
    fn default() -> Self {
        Self {
            max_nodes: MAX_HELD_KARP_NODES,
        }
    }
}

impl TourSolver for HeldKarp {
    fn solve(&self, costs: &CostMatrix) -> Result<ClosedTour> {
        let n = costs.size();
        if n < 2 {
            return Err(Error::invalid_input(format!(
                "need at least 2 nodes for a tour, got {n}"
            )));
        }
        if n > self.max_nodes {
            return Err(Error::invalid_input(format!(
                "held-karp accepts at most {} nodes, got {n}",
                self.max_nodes
            )));
        }

        // Node 0 is the fixed start; bit `k` of a mask stands for node `k + 1`.
        let m = n - 1;
        let full = 1usize << m;
        let cell = |mask: usize, last: usize| mask * m + last;

        let mut best = vec![u64::MAX; full * m];
        let mut parent = vec![NO_PARENT; full * m];

        for k in 0..m {
            best[cell(1 << k, k)] = costs.get(0, k + 1);
        }

        for mask in 1..full {
            for last in 0..m {
                if mask & (1 << last) == 0 {
                    continue;
                }
                let current = best[cell(mask, last)];
                if current == u64::MAX {
                    continue;
                }
                for next in 0..m {
                    if mask & (1 << next) != 0 {
                        continue;
                    }
                    let grown = mask | (1 << next);
                    let candidate = current.saturating_add(costs.get(last + 1, next + 1));
                    if candidate < best[cell(grown, next)] {
                        best[cell(grown, next)] = candidate;
                        parent[cell(grown, next)] = last as u8;
                    }
                }
            }
        }

        let (mut last, cost) = (0..m)
            .map(|last| {
                (
                    last,
                    best[cell(full - 1, last)].saturating_add(costs.get(last + 1, 0)),
                )
            })
            .fold((0, u64::MAX), |acc, item| if item.1 < acc.1 { item } else { acc });

        let mut order = Vec::with_capacity(n);
        let mut mask = full - 1;
        loop {
            order.push(last + 1);
            let prev = parent[cell(mask, last)];
            mask &= !(1 << last);
            if prev == NO_PARENT {
                break;
            }
            last = prev as usize;
        }
        if mask != 0 {
            return Err(Error::invariant(format!(
                "held-karp reconstruction left mask={mask:#b}"
            )));
        }
        order.push(0);
        order.reverse();

        log::trace!("held_karp: n={n} cost={cost}");
        Ok(ClosedTour::new(order, cost))
    }

    fn max_nodes(&self) -> Option<usize> {
        Some(self.max_nodes)
    }

    fn name(&self) -> &'static str {
        "held-karp"
    }
}

#[cfg(test)]
mod tests {
    use super::{HeldKarp, MAX_HELD_KARP_NODES};
    use crate::{algo::TourSolver, matrix::CostMatrix};

    fn tour_cost(costs: &CostMatrix, order: &[usize]) -> u64 {
        let n = order.len();
        (0..n)
            .map(|i| costs.get(order[i], order[(i + 1) % n]))
            .sum()
    }

    fn permutations(items: Vec<usize>) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items];
        }
        let mut out = Vec::new();
        for idx in 0..items.len() {
            let mut rest = items.clone();
            let head = rest.remove(idx);
            for mut tail in permutations(rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    fn pseudo_random_costs(n: usize, seed: u64) -> CostMatrix {
        let mut state = seed;
        let mut costs = CostMatrix::filled(n, 0);
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                    costs.set(i, j, (state >> 33) % 100 + 1);
                }
            }
        }
        costs
    }

    #[test]
    fn matches_brute_force_on_small_asymmetric_matrices() {
        let solver = HeldKarp::default();
        for (n, seed) in [(3, 1), (4, 7), (5, 42), (6, 1234)] {
            let costs = pseudo_random_costs(n, seed);
            let tour = solver.solve(&costs).expect("solve");

            let brute = permutations((1..n).collect())
                .into_iter()
                .map(|mut rest| {
                    rest.insert(0, 0);
                    tour_cost(&costs, &rest)
                })
                .min()
                .expect("at least one permutation");

            assert_eq!(tour.cost, brute, "n={n} seed={seed}");
            assert_eq!(tour.cost, tour_cost(&costs, &tour.order));
        }
    }

    #[test]
    fn tour_is_a_permutation_starting_at_zero() {
        let tour = HeldKarp::default()
            .solve(&pseudo_random_costs(7, 99))
            .expect("solve");

        assert_eq!(tour.order[0], 0);
        let mut sorted = tour.order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn solving_twice_is_deterministic() {
        let costs = pseudo_random_costs(8, 5);
        let solver = HeldKarp::default();
        assert_eq!(
            solver.solve(&costs).expect("first"),
            solver.solve(&costs).expect("second")
        );
    }

    #[test]
    fn ceiling_is_enforced() {
        let solver = HeldKarp::new(4).expect("valid ceiling");
        let err = solver
            .solve(&CostMatrix::filled(5, 1))
            .expect_err("above ceiling should fail");
        assert!(err.to_string().contains("at most 4 nodes"));

        assert!(HeldKarp::new(1).is_err());
        assert!(HeldKarp::new(MAX_HELD_KARP_NODES + 1).is_err());
    }

    #[test]
    fn two_nodes_form_a_trivial_tour() {
        let costs = CostMatrix::from_rows(vec![vec![0, 3], vec![5, 0]]).expect("square");
        let tour = HeldKarp::default().solve(&costs).expect("solve");
        assert_eq!(tour.order, vec![0, 1]);
        assert_eq!(tour.cost, 8);
    }
}
