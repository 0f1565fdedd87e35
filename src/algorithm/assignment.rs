//! This module contains the minimum-cost bipartite assignment solvers used by
//! the graph comparator.
//!
//! Given an N×M nonnegative cost matrix, a solver returns for each row either
//! the column it was assigned or nothing, minimizing the total assigned cost.
//! When there are more rows than columns, the excess rows remain unassigned.

use std::fmt::Debug;

/// A rectangular cost matrix in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct CostMatrix {
    rows: usize,
    columns: usize,
    costs: Vec<f64>,
}

impl CostMatrix {
    /// Constructs a cost matrix of the provided shape, initialized to the
    /// maximal cost of 1.0.
    #[must_use]
    pub fn filled(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            costs: vec![1.0; rows * columns],
        }
    }

    /// Gets the number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Gets the number of columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Gets the cost at `(row, column)`, with non-finite costs sanitized to
    /// the maximal representable cost.
    #[must_use]
    pub fn cost(&self, row: usize, column: usize) -> f64 {
        let value = self.costs[row * self.columns + column];
        if value.is_finite() {
            value
        } else {
            f64::MAX
        }
    }

    /// Sets the cost at `(row, column)`.
    pub fn set(&mut self, row: usize, column: usize, cost: f64) {
        self.costs[row * self.columns + column] = cost;
    }

    /// Checks whether either dimension is empty.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }

    fn transposed(&self) -> Self {
        let mut transposed = Self::filled(self.columns, self.rows);
        for row in 0..self.rows {
            for column in 0..self.columns {
                transposed.set(column, row, self.cost(row, column));
            }
        }
        transposed
    }
}

/// One accepted match from a thresholded assignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
    /// The matched row.
    pub row: usize,

    /// The matched column.
    pub column: usize,

    /// The similarity of the match, defined as `1 − cost`.
    pub similarity: f64,
}

/// The interface to a minimum-cost bipartite assignment solver.
pub trait OptimalAssignment
where
    Self: Debug + Send + Sync,
{
    /// Solves the assignment problem for the provided costs, returning the
    /// assigned column for each row, or [`None`] for rows left unassigned.
    fn solve(&self, costs: &CostMatrix) -> Vec<Option<usize>>;

    /// Solves the assignment problem and keeps only the matches whose
    /// similarity (`1 − cost`) reaches `threshold`.
    fn solve_with_threshold(&self, costs: &CostMatrix, threshold: f64) -> Vec<Match> {
        self.solve(costs)
            .into_iter()
            .enumerate()
            .filter_map(|(row, column)| {
                let column = column?;
                let similarity = 1.0 - costs.cost(row, column);
                (similarity >= threshold).then_some(Match {
                    row,
                    column,
                    similarity,
                })
            })
            .collect()
    }
}

/// A solver implementing the Hungarian method via shortest augmenting paths.
///
/// Runs in `O(n³)`; rectangular matrices are handled by transposition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HungarianSolver;

impl OptimalAssignment for HungarianSolver {
    fn solve(&self, costs: &CostMatrix) -> Vec<Option<usize>> {
        if costs.is_degenerate() {
            return vec![None; costs.rows()];
        }

        // The augmenting-path formulation requires rows <= columns; a wider
        // than tall matrix is solved transposed and the result inverted.
        if costs.rows() > costs.columns() {
            let transposed = costs.transposed();
            let assignment = self.solve(&transposed);
            let mut inverted = vec![None; costs.rows()];
            for (column, row) in assignment.into_iter().enumerate() {
                if let Some(row) = row {
                    inverted[row] = Some(column);
                }
            }
            return inverted;
        }

        solve_rows_not_exceeding_columns(costs)
    }
}

/// The shortest-augmenting-path Hungarian solve for `rows <= columns`.
///
/// This is the classic `O(n²m)` potentials formulation with 1-based dummy
/// indices for the unassigned state.
fn solve_rows_not_exceeding_columns(costs: &CostMatrix) -> Vec<Option<usize>> {
    let rows = costs.rows();
    let columns = costs.columns();

    // Potentials for rows and columns, and for each column the row currently
    // assigned to it (0 = unassigned). Indices are 1-based here.
    let mut row_potential = vec![0.0_f64; rows + 1];
    let mut column_potential = vec![0.0_f64; columns + 1];
    let mut assigned_row = vec![0_usize; columns + 1];
    let mut path = vec![0_usize; columns + 1];

    for row in 1..=rows {
        assigned_row[0] = row;
        let mut current_column = 0_usize;
        let mut minimum_to = vec![f64::MAX; columns + 1];
        let mut used = vec![false; columns + 1];

        loop {
            used[current_column] = true;
            let current_row = assigned_row[current_column];
            let mut delta = f64::MAX;
            let mut next_column = 0_usize;

            for column in 1..=columns {
                if used[column] {
                    continue;
                }
                let reduced = costs.cost(current_row - 1, column - 1)
                    - row_potential[current_row]
                    - column_potential[column];
                if reduced < minimum_to[column] {
                    minimum_to[column] = reduced;
                    path[column] = current_column;
                }
                if minimum_to[column] < delta {
                    delta = minimum_to[column];
                    next_column = column;
                }
            }

            for column in 0..=columns {
                if used[column] {
                    row_potential[assigned_row[column]] += delta;
                    column_potential[column] -= delta;
                } else {
                    minimum_to[column] -= delta;
                }
            }

            current_column = next_column;
            if assigned_row[current_column] == 0 {
                break;
            }
        }

        // Unwind the augmenting path.
        while current_column != 0 {
            let previous = path[current_column];
            assigned_row[current_column] = assigned_row[previous];
            current_column = previous;
        }
    }

    let mut result = vec![None; rows];
    for column in 1..=columns {
        let row = assigned_row[column];
        if row != 0 {
            result[row - 1] = Some(column - 1);
        }
    }
    result
}

/// A solver that greedily assigns each row its cheapest still-unassigned
/// column, in row order.
///
/// Not optimal; retained as a cheap fallback for very large matrices.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GreedySolver;

impl OptimalAssignment for GreedySolver {
    fn solve(&self, costs: &CostMatrix) -> Vec<Option<usize>> {
        let mut taken = vec![false; costs.columns()];
        let mut result = vec![None; costs.rows()];

        for (row, slot) in result.iter_mut().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for column in 0..costs.columns() {
                if taken[column] {
                    continue;
                }
                let cost = costs.cost(row, column);
                if best.is_none() || cost < best.unwrap().1 {
                    best = Some((column, cost));
                }
            }
            if let Some((column, _)) = best {
                taken[column] = true;
                *slot = Some(column);
            }
        }

        result
    }
}

#[cfg(test)]
mod test {
    use crate::algorithm::assignment::{
        CostMatrix,
        GreedySolver,
        HungarianSolver,
        OptimalAssignment,
    };

    fn matrix(rows: usize, columns: usize, costs: &[f64]) -> CostMatrix {
        let mut matrix = CostMatrix::filled(rows, columns);
        for row in 0..rows {
            for column in 0..columns {
                matrix.set(row, column, costs[row * columns + column]);
            }
        }
        matrix
    }

    fn total_cost(costs: &CostMatrix, assignment: &[Option<usize>]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .filter_map(|(row, column)| column.map(|c| costs.cost(row, c)))
            .sum()
    }

    #[test]
    fn hungarian_finds_the_optimal_square_assignment() {
        // The greedy choice (row 0 takes column 0) is suboptimal here.
        let costs = matrix(2, 2, &[0.0, 0.1, 0.0, 0.9]);
        let assignment = HungarianSolver.solve(&costs);
        assert_eq!(assignment, vec![Some(1), Some(0)]);
        assert!((total_cost(&costs, &assignment) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn hungarian_leaves_excess_rows_unassigned() {
        let costs = matrix(3, 2, &[0.0, 1.0, 1.0, 0.0, 0.5, 0.5]);
        let assignment = HungarianSolver.solve(&costs);

        let assigned: Vec<_> = assignment.iter().flatten().collect();
        assert_eq!(assigned.len(), 2);
        assert_eq!(assignment.iter().filter(|a| a.is_none()).count(), 1);

        // The two cheap diagonal matches must win.
        assert_eq!(assignment[0], Some(0));
        assert_eq!(assignment[1], Some(1));
    }

    #[test]
    fn thresholding_rejects_poor_matches() {
        let costs = matrix(2, 2, &[0.0, 1.0, 1.0, 0.8]);
        let matches = HungarianSolver.solve_with_threshold(&costs, 0.7);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].row, 0);
        assert_eq!(matches[0].column, 0);
        assert!((matches[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_matrices_assign_nothing() {
        assert_eq!(HungarianSolver.solve(&CostMatrix::filled(3, 0)), vec![None; 3]);
        assert_eq!(GreedySolver.solve(&CostMatrix::filled(0, 3)), Vec::<Option<usize>>::new());
    }

    #[test]
    fn greedy_is_row_ordered() {
        let costs = matrix(2, 2, &[0.0, 0.1, 0.0, 0.9]);
        let assignment = GreedySolver.solve(&costs);
        // Greedy lets row 0 take the shared cheapest column.
        assert_eq!(assignment, vec![Some(0), Some(1)]);
    }
}
