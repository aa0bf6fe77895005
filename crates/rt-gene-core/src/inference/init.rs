//! Weight initialisers for linear layers.

// Allow common ML code patterns
#![allow(clippy::cast_possible_truncation)]

use candle_core::{Device, Tensor};

use crate::error::Result;

/// Samples a `(rows, cols)` matrix from `N(0, std²)`.
///
/// # Errors
///
/// Returns an error if tensor creation fails.
pub fn normal(rows: usize, cols: usize, std: f64, device: &Device) -> Result<Tensor> {
    Ok(Tensor::randn(0f32, std as f32, (rows, cols), device)?)
}

/// Samples a `(rows, cols)` (semi-)orthogonal matrix.
///
/// A Gaussian sample is orthonormalised in its tall orientation, so rows are
/// orthonormal when `rows <= cols` and columns are orthonormal otherwise. The
/// implicit triangular factor has a positive diagonal, which makes the result
/// uniformly distributed over orthogonal matrices.
///
/// The orthonormalisation runs in scalar `f64` on the CPU and costs
/// `O(rows * cols * min(rows, cols))`. A 1026-square ResNet-18 head takes a
/// few seconds; the 4098-square ResNet-50/101 heads take minutes. Those
/// variants default to [`normal`].
///
/// # Errors
///
/// Returns an error if tensor creation fails or the sample is rank deficient.
pub fn orthogonal(rows: usize, cols: usize, device: &Device) -> Result<Tensor> {
    if rows == 0 || cols == 0 {
        return Ok(Tensor::zeros(
            (rows, cols),
            candle_core::DType::F32,
            device,
        )?);
    }

    let transpose = rows < cols;
    let (n, m) = if transpose { (cols, rows) } else { (rows, cols) };

    let sample = Tensor::randn(0f32, 1.0, n * m, &Device::Cpu)?.to_vec1::<f32>()?;
    let mut columns: Vec<Vec<f64>> = sample
        .chunks(n)
        .map(|c| c.iter().copied().map(f64::from).collect())
        .collect();
    orthonormalize(&mut columns)?;

    // `columns[j][i]` is entry (i, j) of the tall n x m factor.
    let data: Vec<f32> = if transpose {
        columns.iter().flatten().map(|&v| v as f32).collect()
    } else {
        (0..n)
            .flat_map(|i| columns.iter().map(move |c| c[i] as f32))
            .collect()
    };

    Ok(Tensor::from_vec(data, (rows, cols), device)?)
}

/// Modified Gram-Schmidt with one re-orthogonalisation pass.
fn orthonormalize(columns: &mut [Vec<f64>]) -> Result<()> {
    for j in 0..columns.len() {
        let (done, rest) = columns.split_at_mut(j);
        let v = &mut rest[0];
        for _ in 0..2 {
            for q in done.iter() {
                let proj = dot(q, v);
                v.iter_mut().zip(q).for_each(|(x, &qi)| *x -= proj * qi);
            }
        }
        let norm = dot(v, v).sqrt();
        if norm <= f64::EPSILON {
            return Err(candle_core::Error::Msg(
                "orthogonal init: rank deficient sample".to_string(),
            )
            .into());
        }
        v.iter_mut().for_each(|x| *x /= norm);
    }
    Ok(())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
