//! Projected Gauss-Seidel solver for mixed linear complementarity problems
//!
//! Finds `x` with `w = A x + b` such that for every unilateral row
//! `x >= 0`, `w >= 0` and `x * w = 0`, and for every bilateral row `w = 0`
//! with `x` of either sign. Used for both contact forces and impulses;
//! `A` is the symmetric positive semidefinite influence matrix.

/// Result of a solve
#[derive(Debug, Clone, PartialEq)]
pub struct LcpSolution {
    pub x: Vec<f64>,
    pub iterations: usize,
    /// Largest complementarity violation at exit
    pub residual: f64,
    pub converged: bool,
}

/// Diagonal entries below this are treated as rows that nothing can affect
const TINY_DIAGONAL: f64 = 1e-14;

/// Solve the mixed LCP.
///
/// `bilateral[i]` marks rows whose unknown may take either sign.
pub fn solve(
    a: &[Vec<f64>],
    b: &[f64],
    bilateral: &[bool],
    max_iterations: usize,
    tolerance: f64,
) -> LcpSolution {
    let n = b.len();
    let mut x = vec![0.0; n];
    if n == 0 {
        return LcpSolution {
            x,
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let scale = b.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    let threshold = tolerance * scale;
    let mut residual = f64::INFINITY;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        for i in 0..n {
            let diag = a[i][i];
            if diag < TINY_DIAGONAL {
                continue;
            }
            let w = row_dot(&a[i], &x) + b[i];
            let mut xi = x[i] - w / diag;
            if !bilateral[i] {
                xi = xi.max(0.0);
            }
            x[i] = xi;
        }
        residual = max_residual(a, b, bilateral, &x);
        if residual < threshold {
            break;
        }
    }

    LcpSolution {
        converged: residual < threshold,
        x,
        iterations,
        residual,
    }
}

fn row_dot(row: &[f64], x: &[f64]) -> f64 {
    row.iter().zip(x).map(|(r, v)| r * v).sum()
}

fn max_residual(a: &[Vec<f64>], b: &[f64], bilateral: &[bool], x: &[f64]) -> f64 {
    (0..b.len())
        .filter(|&i| a[i][i] >= TINY_DIAGONAL)
        .map(|i| {
            let w = row_dot(&a[i], x) + b[i];
            if bilateral[i] || x[i] > 0.0 {
                w.abs()
            } else {
                (-w).max(0.0)
            }
        })
        .fold(0.0, f64::max)
}
