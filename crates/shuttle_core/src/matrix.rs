//! Square matrices and the open-path to closed-tour reduction.
//!
//! A duration matrix `M` (n x n, asymmetric) becomes a 2n x 2n symmetric cost
//! matrix in which stop `i` has a real copy at `i` and a ghost copy at `n + i`:
//!
//! ```text
//! | U      M_bar^T |
//! | M_bar  U       |
//! ```
//!
//! `M_bar` is `M` with a zero diagonal and `U` is filled with a `high` penalty
//! (zero diagonal), so an optimal cycle alternates real and ghost copies and
//! every other node of it is the optimal path on `M`.

use crate::{Error, Result};

/// Multiplier applied to the largest duration when no penalty is supplied.
pub const HIGH_PENALTY_FACTOR: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SquareMatrix<T> {
    size: usize,
    values: Vec<T>,
}

/// Travel durations in seconds, `get(i, j)` is the time from stop `i` to stop `j`.
pub type DurationMatrix = SquareMatrix<f64>;

/// Integer weights handed to a tour solver.
pub type CostMatrix = SquareMatrix<u64>;

impl<T: Copy> SquareMatrix<T> {
    pub fn filled(size: usize, value: T) -> Self {
        Self {
            size,
            values: vec![value; size * size],
        }
    }

    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(Error::invalid_input(format!(
                    "matrix row {idx} has {} columns, expected {size}",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.values[row * self.size + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.values[row * self.size + col] = value;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.values.chunks(self.size.max(1))
    }

    pub fn set_column(&mut self, col: usize, value: T) {
        for row in 0..self.size {
            self.set(row, col, value);
        }
    }
}

impl<T: Copy + PartialEq> SquareMatrix<T> {
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

impl DurationMatrix {
    /// Rejects negative or non-finite durations. The diagonal is not inspected.
    pub fn validate(&self) -> Result<()> {
        for i in 0..self.size {
            for j in 0..self.size {
                if i == j {
                    continue;
                }
                let value = self.get(i, j);
                if !value.is_finite() || value < 0.0 {
                    return Err(Error::invalid_input(format!(
                        "duration {i}->{j} must be a finite non-negative number, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Largest off-diagonal duration.
    pub fn max_off_diagonal(&self) -> f64 {
        let mut max = 0.0_f64;
        for i in 0..self.size {
            for j in 0..self.size {
                if i != j {
                    max = max.max(self.get(i, j));
                }
            }
        }
        max
    }

    /// `round(10 * max(M))`, never below 1 so ghost-to-ghost hops always cost
    /// more than an alternating tour on an all-zero matrix.
    pub fn default_high_penalty(&self) -> u64 {
        ((HIGH_PENALTY_FACTOR * self.max_off_diagonal()).round() as u64).max(1)
    }
}

/// Builds the 2n x 2n symmetric cost matrix for `durations`.
///
/// `high` overrides the ghost/real penalty; `None` uses
/// [`DurationMatrix::default_high_penalty`].
pub fn symmetrize(durations: &DurationMatrix, high: Option<u64>) -> Result<CostMatrix> {
    let n = durations.size();
    if n < 2 {
        return Err(Error::invalid_input(format!(
            "need at least 2 stops to symmetrize, got {n}"
        )));
    }
    durations.validate()?;

    let high = high.unwrap_or_else(|| durations.default_high_penalty());
    let mut sym = CostMatrix::filled(2 * n, 0);

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let m_bar = durations.get(i, j).round() as u64;
            sym.set(i, j, high);
            sym.set(n + i, n + j, high);
            // bottom-left = M_bar, top-right = M_bar^T
            sym.set(n + i, j, m_bar);
            sym.set(j, n + i, m_bar);
        }
    }

    Ok(sym)
}
