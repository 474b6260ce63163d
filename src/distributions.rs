//! Distributions of the largest probabilities in a model, and histograms of them.
use crate::model_io::{Model, ModelType, ProbMap, ProbTable};
use crate::ndarray_utils::*;
use itertools::Itertools;
use ndarray::prelude::*;
use statrs::distribution::{Continuous, Normal};
use std::io::{self, Write};
use tracing::trace;

pub const DEFAULT_BINS: usize = 50;

/// A function applied to probabilities before they are summarized
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transform {
    Identity,
    /// Natural-log probabilities back to probabilities
    Exp,
}

impl Transform {
    /// The transform that puts a model's probabilities on a linear scale
    pub fn for_model(model_type: ModelType) -> Self {
        match model_type {
            ModelType::Hmm => Transform::Identity,
            ModelType::LogHmm => Transform::Exp,
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::Exp => x.exp(),
        }
    }
}

fn max_per_state(table: &ProbTable) -> ProbMap {
    table
        .iter()
        .map(|(state, row)| {
            let max = row.values().cloned().fold(f64::NEG_INFINITY, f64::max);
            (state.clone(), max)
        })
        .collect()
}

/// Each state's largest observation probability. A state with no observations maps to `-∞`.
pub fn max_observation_probs(model: &Model) -> ProbMap {
    max_per_state(&model.observation_prob)
}

/// Each state's largest transition probability. A state with no transitions maps to `-∞`.
pub fn max_transition_probs(model: &Model) -> ProbMap {
    max_per_state(&model.transition_prob)
}

/// The transformed values of `distribution`, in ascending order
pub fn sorted_distribution<F>(distribution: &ProbMap, transform: F) -> Array1<f64>
where
    F: Fn(f64) -> f64,
{
    distribution
        .values()
        .map(|&p| transform(p))
        .sorted_by(|x, y| x.total_cmp(y))
        .collect()
}

/// A histogram with equal-width bins, normalized to a probability density, together with the
/// normal distribution that has the same mean and standard deviation.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// Bin edges, one more than the number of bins
    pub edges: Array1<f64>,
    pub counts: Array1<usize>,
    /// `counts` scaled so that the histogram integrates to 1
    pub density: Array1<f64>,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// The fitted normal density at each edge. `None` when `std` is zero.
    pub normal_pdf: Option<Array1<f64>>,
}

impl Histogram {
    /// Bin the finite values of `values` into `bins` bins spanning their range.
    ///
    /// Non-finite values are skipped. If every value is the same, the range is widened to half a
    /// unit on each side. Returns `None` if `bins` is zero or there are no finite values.
    pub fn new<I>(values: I, bins: usize) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        if bins == 0 {
            return None;
        }
        let (finite, skipped): (Vec<f64>, Vec<f64>) =
            values.into_iter().partition(|x| x.is_finite());
        if !skipped.is_empty() {
            trace!(skipped = skipped.len(), "skipping non-finite values");
        }
        let finite = Array1::from(finite);
        let (mean, std) = finite.mean_std()?;

        let mut lo = finite.fold(f64::INFINITY, |acc, &x| acc.min(x));
        let mut hi = finite.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges = Array1::linspace(lo, hi, bins + 1);

        let mut counts = Array1::zeros(bins);
        for &x in &finite {
            // The last bin is closed on the right
            let bin = (((x - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        let scale = finite.len() as f64 * width;
        let density = counts.mapv(|c: usize| c as f64 / scale);

        let normal_pdf = Normal::new(mean, std)
            .ok()
            .map(|normal| edges.mapv(|x| normal.pdf(x)));

        Some(Self {
            edges,
            counts,
            density,
            mean,
            std,
            normal_pdf,
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Write one tab-separated row per bin: left edge, right edge, count, density, and the
    /// normal density at the left edge.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "left\tright\tcount\tdensity\tnormal_pdf")?;
        for i in 0..self.bins() {
            let pdf = match &self.normal_pdf {
                Some(pdf) => pdf[i].to_string(),
                None => String::new(),
            };
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                self.edges[i],
                self.edges[i + 1],
                self.counts[i],
                self.density[i],
                pdf
            )?;
        }
        writer.flush()
    }
}

/// A histogram of the transformed values of `distribution`
pub fn histogram<F>(distribution: &ProbMap, transform: F, bins: usize) -> Option<Histogram>
where
    F: Fn(f64) -> f64,
{
    Histogram::new(distribution.values().map(|&p| transform(p)), bins)
}
