//! Summary statistics over probability vectors.
//!
//! An element of a vector is *prominent* when it lies more than `sigma` population standard
//! deviations above the vector's mean. The prominence of a row of the observation matrix is a
//! rough count of how many observations a state strongly prefers.
use crate::ndarray_utils::*;
use itertools::Itertools;
use ndarray::prelude::*;
use ndarray::{s, Data};

pub const DEFAULT_SIGMA: f64 = 1.0;

/// Standard scores of `x` using the population standard deviation.
///
/// A constant array has a standard deviation of zero, so every score is NaN.
pub fn zscores<S>(x: &ArrayBase<S, Ix1>) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    match x.mean_std() {
        Some((mean, std)) => x.mapv(|v| (v - mean) / std),
        None => Array1::zeros(0),
    }
}

/// A mask of the elements of `x` whose z-score is greater than `sigma`.
///
/// Empty and constant arrays have no prominent elements.
pub fn prominent_elements<S>(x: &ArrayBase<S, Ix1>, sigma: f64) -> Array1<bool>
where
    S: Data<Elem = f64>,
{
    zscores(x).mapv(|z| z > sigma)
}

/// The number of prominent elements of `x`
pub fn prominence<S>(x: &ArrayBase<S, Ix1>, sigma: f64) -> usize
where
    S: Data<Elem = f64>,
{
    prominent_elements(x, sigma).iter().filter(|&&p| p).count()
}

/// Element `i` of the result is the number of rows whose prominence is `i`.
///
/// The result has length `max prominence + 1`, or is empty when there are no rows.
pub fn prominence_frequencies<'a, I>(rows: I, sigma: f64) -> Array1<usize>
where
    I: IntoIterator<Item = ArrayView1<'a, f64>>,
{
    let prominences = rows
        .into_iter()
        .map(|row| prominence(&row, sigma))
        .collect_vec();
    let len = prominences.iter().max().map_or(0, |&max| max + 1);
    let mut frequencies = Array1::zeros(len);
    for p in prominences {
        frequencies[p] += 1;
    }
    frequencies
}

/// [`prominence_frequencies`] as proportions of the number of rows
pub fn prominence_proportions<'a, I>(rows: I, sigma: f64) -> Array1<f64>
where
    I: IntoIterator<Item = ArrayView1<'a, f64>>,
{
    let frequencies = prominence_frequencies(rows, sigma);
    let total = frequencies.sum() as f64;
    frequencies.mapv(|f| f as f64 / total)
}

/// The cosine similarity of two vectors. If the vectors are of different lengths, the shorter
/// one is padded with zeroes.
///
/// If either vector has a norm of zero the result is NaN.
pub fn cosine_similarity<S, T>(a: &ArrayBase<S, Ix1>, b: &ArrayBase<T, Ix1>) -> f64
where
    S: Data<Elem = f64>,
    T: Data<Elem = f64>,
{
    // Padding contributes nothing to the dot product
    let len = a.len().min(b.len());
    let dot = a.slice(s![..len]).dot(&b.slice(s![..len]));
    dot / (a.l2_norm() * b.l2_norm())
}
