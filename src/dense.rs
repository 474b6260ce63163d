//! Dense matrix form of a parsed model.
//!
//! Model files do not have to mention every (state, state) or (state, observation) pair, and
//! parsing does not check that the identifiers used inside the probability maps were declared.
//! [`DenseModel::from_model`] does both: every identifier must be declared, and every pair that
//! the file leaves out gets the model's zero probability (`0.0`, or `-∞` in log space).
use crate::edn::Value;
use crate::error::{ModelError, Result};
use crate::model_io::{
    Model, ModelType, ProbMap, INITIAL_PROB, OBSERVATION_PROB, TRANSITION_PROB,
};
use crate::ndarray_utils::*;
use ndarray::prelude::*;
use tracing::debug;

/// The probabilities of a [`Model`] laid out in declaration order.
///
/// With $N$ states and $K$ observations:
/// * `pi`, the $N$-length initial state distribution: $π_i=P(X_1=i)$
/// * `a`, the $N × N$ state transition matrix: $a_{ij}=P(X_t=j|X_{t-1}=i)$
/// * `b`, the $N × K$ observation matrix: $b_{ik}=P(Y_t=y_k|X_t=i)$
///
/// For `LogHMM` models every entry is a natural-log probability.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize))]
pub struct DenseModel {
    pub model_type: ModelType,
    pub states: Vec<Value>,
    pub observations: Vec<Value>,
    pub pi: Array1<f64>,
    pub a: Array2<f64>,
    pub b: Array2<f64>,
}

fn index_of(ids: &[Value], field: &'static str, id: &Value) -> Result<usize> {
    ids.iter()
        .position(|declared| declared == id)
        .ok_or_else(|| ModelError::UnknownIdentifier {
            field,
            id: id.to_string(),
        })
}

/// Fill `row` from `probs`, where keys of `probs` are looked up in `ids`
fn scatter(
    mut row: ArrayViewMut1<f64>,
    ids: &[Value],
    field: &'static str,
    probs: &ProbMap,
) -> Result<()> {
    for (id, &p) in probs.iter() {
        row[index_of(ids, field, id)?] = p;
    }
    Ok(())
}

impl Model {
    /// Check that the probability maps only mention declared states and observations.
    ///
    /// Parsing does not do this. The first undeclared identifier is reported as
    /// [`ModelError::UnknownIdentifier`].
    pub fn validate_references(&self) -> Result<()> {
        for state in self.initial_prob.keys() {
            index_of(&self.states, INITIAL_PROB, state)?;
        }
        for (state, row) in self.transition_prob.iter() {
            index_of(&self.states, TRANSITION_PROB, state)?;
            for next in row.keys() {
                index_of(&self.states, TRANSITION_PROB, next)?;
            }
        }
        for (state, row) in self.observation_prob.iter() {
            index_of(&self.states, OBSERVATION_PROB, state)?;
            for observation in row.keys() {
                index_of(&self.observations, OBSERVATION_PROB, observation)?;
            }
        }
        Ok(())
    }
}

impl DenseModel {
    pub fn from_model(model: &Model) -> Result<Self> {
        let n = model.states.len();
        let k = model.observations.len();
        let zero = model.model_type.zero_probability();

        let mut pi = Array1::from_elem(n, zero);
        scatter(pi.view_mut(), &model.states, INITIAL_PROB, &model.initial_prob)?;

        let mut a = Array2::from_elem((n, n), zero);
        for (state, row) in model.transition_prob.iter() {
            let i = index_of(&model.states, TRANSITION_PROB, state)?;
            scatter(a.row_mut(i), &model.states, TRANSITION_PROB, row)?;
        }

        let mut b = Array2::from_elem((n, k), zero);
        for (state, row) in model.observation_prob.iter() {
            let i = index_of(&model.states, OBSERVATION_PROB, state)?;
            scatter(b.row_mut(i), &model.observations, OBSERVATION_PROB, row)?;
        }

        debug!(n, k, "built dense model");
        Ok(Self {
            model_type: model.model_type,
            states: model.states.clone(),
            observations: model.observations.clone(),
            pi,
            a,
            b,
        })
    }

    /// $N$, the number of states in this model
    pub fn n(&self) -> usize {
        self.states.len()
    }

    /// $K$, the number of possible observations that this model can emit
    pub fn k(&self) -> usize {
        self.observations.len()
    }

    /// The largest transition probability out of each state
    pub fn max_transition_probs(&self) -> Array1<f64> {
        self.row_maxima(&self.a)
    }

    /// The probability of each state's most likely observation
    pub fn max_observation_probs(&self) -> Array1<f64> {
        self.row_maxima(&self.b)
    }

    fn row_maxima(&self, matrix: &Array2<f64>) -> Array1<f64> {
        let zero = self.model_type.zero_probability();
        matrix
            .rows()
            .into_iter()
            .map(|row| row.maxf().map_or(zero, |(_i, p)| p))
            .collect()
    }

    /// Sum of `pi` and of each row of `a` and `b`, in probability space.
    pub fn totals(&self) -> Totals {
        let to_prob = |p: f64| match self.model_type {
            ModelType::Hmm => p,
            ModelType::LogHmm => p.exp(),
        };
        let total = |row: ArrayView1<f64>| row.iter().map(|&p| to_prob(p)).sum::<f64>();
        Totals {
            pi: total(self.pi.view()),
            a: self.a.rows().into_iter().map(total).collect(),
            b: self.b.rows().into_iter().map(total).collect(),
        }
    }
}

/// Returned by [`DenseModel::totals`]. A well-formed model has every total close to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Totals {
    pub pi: f64,
    pub a: Array1<f64>,
    pub b: Array1<f64>,
}

impl Totals {
    /// Whether `pi` and every row of `a` and `b` sum to 1 within `tolerance`
    pub fn is_stochastic(&self, tolerance: f64) -> bool {
        let close = |t: &f64| (t - 1.0).abs() <= tolerance;
        close(&self.pi) && self.a.iter().all(close) && self.b.iter().all(close)
    }
}
