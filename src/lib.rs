//! This library reads Hidden Markov Model parameter files and summarizes the probability
//! distributions inside them.
//!
//! Model files are [EDN](https://github.com/edn-format/edn) maps holding the states,
//! observations, and the initial, transition and observation probabilities of a discrete HMM.
//! See [`model_io`](model_io/index.html) for the format and [`Model`](struct.Model.html) for the
//! parsed representation.
//!
//! Below, a small log-space model is parsed and the most likely observation of each state is
//! summarized.
//!
//! ```
//! use hmm_stats::{distributions, parse_from_str, ModelType};
//!
//! let model = parse_from_str(
//!     "{:type :LogHMM, :states [a b], :observations [x y],
//!       :initial-prob {a -0.69, b -0.69},
//!       :transition-prob {a {a -0.1, b -2.3}, b {a -Infinity, b 0.0}},
//!       :observation-prob {a {x 0.0, y -Infinity}, b {x -1.2, y -0.36}}}",
//! )
//! .unwrap();
//!
//! assert_eq!(model.model_type, ModelType::LogHmm);
//! let max_obs = distributions::max_observation_probs(&model);
//! assert_eq!(max_obs.get_named("a"), Some(&0.0));
//! assert_eq!(max_obs.get_named("b"), Some(&-0.36));
//! ```
//!
//! ## Command line
//!
//! The `hmm-stats` binary parses a model file and writes histogram tables of its transition and
//! observation probabilities. Run `hmm-stats --help` for details.
//!
//! ## Features
//!
//! The `serde-1` feature derives `Serialize` for the parsed model types.
pub mod dense;
pub mod distributions;
pub mod edn;
mod error;
pub mod features;
pub mod model_io;

pub use crate::dense::DenseModel;
pub use crate::error::{ModelError, Result, SyntaxError};
pub use crate::model_io::{
    parse_from_path, parse_from_reader, parse_from_str, KeyedMap, Model, ModelType, ProbMap,
    ProbTable,
};

mod ndarray_utils {
    use itertools::Itertools;
    use ndarray::prelude::*;
    use ndarray::Data;
    use num_traits::Float;

    pub trait Array1Float<T: Float> {
        /// Along a 1D array, return the maximum float value and its index
        ///
        /// If there are multiple equal maximum values, one of them will be returned with its index.
        ///
        /// The behavior of this function is unspecified if the array contains NaNs.
        fn maxf(&self) -> Option<(usize, T)>;

        /// Mean and population standard deviation, or `None` for an empty array
        fn mean_std(&self) -> Option<(T, T)>;

        fn l2_norm(&self) -> T;
    }

    impl<T, S> Array1Float<T> for ArrayBase<S, Ix1>
    where
        T: Float,
        S: Data<Elem = T>,
    {
        fn maxf(&self) -> Option<(usize, T)> {
            self.iter()
                .enumerate()
                .fold1(|(i0, v0), (i1, v1)| if v0 > v1 { (i0, v0) } else { (i1, v1) })
                .map(|(i, &v)| (i, v))
        }

        fn mean_std(&self) -> Option<(T, T)> {
            if self.is_empty() {
                return None;
            }
            let n = T::from(self.len())?;
            let mean = self.iter().fold(T::zero(), |acc, &x| acc + x) / n;
            let var = self
                .iter()
                .fold(T::zero(), |acc, &x| acc + (x - mean).powi(2))
                / n;
            Some((mean, var.sqrt()))
        }

        fn l2_norm(&self) -> T {
            self.iter()
                .fold(T::zero(), |acc, &x| acc + x.powi(2))
                .sqrt()
        }
    }

}
