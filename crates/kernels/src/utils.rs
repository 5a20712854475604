//! Shared helpers for kernel implementations.

use crate::config::MatvecProblem;
use crate::matvec::MatvecInputs;
use anyhow::{bail, Result};
use ndarray::ArrayView1;

pub fn validate_matvec_inputs(problem: &MatvecProblem, inputs: &MatvecInputs<'_>) -> Result<()> {
    let (rows, cols) = problem.matrix_dims();
    if inputs.matrix.dim() != (rows, cols) {
        bail!(
            "matrix is {:?} but problem m={} n={} transpose={} expects {}x{}",
            inputs.matrix.dim(),
            problem.m,
            problem.n,
            problem.transpose,
            rows,
            cols
        );
    }
    if inputs.x.len() != problem.n {
        bail!(
            "x has {} elements, expected {}",
            inputs.x.len(),
            problem.n
        );
    }
    if let Some(y) = &inputs.y {
        if y.len() != problem.m {
            bail!("y has {} elements, expected {}", y.len(), problem.m);
        }
    }
    Ok(())
}

/// Largest element-wise difference, scaled by the reference magnitude when
/// that exceeds one.
pub fn max_relative_error(output: ArrayView1<'_, f32>, reference: ArrayView1<'_, f32>) -> f32 {
    if output.len() != reference.len() {
        return f32::INFINITY;
    }
    output
        .iter()
        .zip(reference.iter())
        .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
        .fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn rejects_mismatched_vector() {
        let problem = MatvecProblem::new(4, 8);
        let matrix = Array2::<f32>::zeros((4, 8));
        let x = Array1::<f32>::zeros(4);
        let inputs = MatvecInputs::new(matrix.view(), x.view());
        assert!(validate_matvec_inputs(&problem, &inputs).is_err());
    }

    #[test]
    fn relative_error_is_scaled() {
        let a = Array1::from_vec(vec![101.0f32, 0.5]);
        let b = Array1::from_vec(vec![100.0f32, 0.5]);
        assert!((max_relative_error(a.view(), b.view()) - 0.01).abs() < 1e-6);
    }
}
