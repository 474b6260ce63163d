//! Reading HMM parameter files.
//!
//! A model file is an EDN map with six required keys:
//!
//! ```text
//! {:type             :HMM                       ; or :LogHMM
//!  :states           [s0 s1 ...]
//!  :observations     [o0 o1 ...]
//!  :initial-prob     {s0 p, ...}
//!  :transition-prob  {s0 {s0 p, s1 p, ...}, ...}
//!  :observation-prob {s0 {o0 p, ...}, ...}}
//! ```
//!
//! EDN has no literal for non-finite floats, so log-space models write a zero probability as the
//! symbol `-Infinity`. Only probability leaves are converted; `:states` and `:observations` are
//! copied through as written.
use crate::edn::{self, Value};
use crate::error::{ModelError, Result};
use std::fs::File;
use std::io::Read;
use std::iter::FromIterator;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// The symbol that stands in for negative infinity at probability leaves
pub const NEGATIVE_INFINITY: &str = "-Infinity";

pub const TYPE: &str = "type";
pub const STATES: &str = "states";
pub const OBSERVATIONS: &str = "observations";
pub const INITIAL_PROB: &str = "initial-prob";
pub const TRANSITION_PROB: &str = "transition-prob";
pub const OBSERVATION_PROB: &str = "observation-prob";

/// Whether the probabilities in a model are plain or natural-log probabilities.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize))]
pub enum ModelType {
    #[cfg_attr(feature = "serde-1", serde(rename = "HMM"))]
    Hmm,
    #[cfg_attr(feature = "serde-1", serde(rename = "LogHMM"))]
    LogHmm,
}

impl ModelType {
    /// The name used in model files
    pub fn name(self) -> &'static str {
        match self {
            ModelType::Hmm => "HMM",
            ModelType::LogHmm => "LogHMM",
        }
    }

    /// The value that represents an impossible event in this kind of model
    pub fn zero_probability(self) -> f64 {
        match self {
            ModelType::Hmm => 0.0,
            ModelType::LogHmm => f64::NEG_INFINITY,
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Keyword(name) | Value::Symbol(name) if name == "HMM" => Ok(ModelType::Hmm),
            Value::Keyword(name) | Value::Symbol(name) if name == "LogHMM" => {
                Ok(ModelType::LogHmm)
            }
            other => Err(ModelError::schema(
                TYPE,
                format!("expected :HMM or :LogHMM, found {}", other.describe()),
            )),
        }
    }
}

/// A map that keeps the order in which its keys appeared in the model file.
///
/// Models are small, so lookups are linear scans.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize), serde(transparent))]
pub struct KeyedMap<V> {
    entries: Vec<(Value, V)>,
}

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &Value) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _v)| k == key)
            .map(|(_k, v)| v)
    }

    /// Look up a key by its name, whether it was written as a symbol, keyword or string.
    pub fn get_named(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _v)| k.name() == Some(name))
            .map(|(_k, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _v)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_k, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(Value, V)> for KeyedMap<V> {
    fn from_iter<I: IntoIterator<Item = (Value, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// state → probability
pub type ProbMap = KeyedMap<f64>;

/// state → (state or observation → probability)
pub type ProbTable = KeyedMap<ProbMap>;

/// A parsed model file. See the [module documentation](index.html) for the file format.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize))]
pub struct Model {
    #[cfg_attr(feature = "serde-1", serde(rename = "type"))]
    pub model_type: ModelType,
    pub states: Vec<Value>,
    pub observations: Vec<Value>,
    #[cfg_attr(feature = "serde-1", serde(rename = "initial-prob"))]
    pub initial_prob: ProbMap,
    #[cfg_attr(feature = "serde-1", serde(rename = "transition-prob"))]
    pub transition_prob: ProbTable,
    #[cfg_attr(feature = "serde-1", serde(rename = "observation-prob"))]
    pub observation_prob: ProbTable,
}

impl Model {
    /// Build a model from an already-read EDN document.
    ///
    /// All six keys are looked up before anything is converted, so a document missing a key
    /// fails with [`ModelError::MissingKey`] naming the first absent key, in the order
    /// `type`, `states`, `observations`, `initial-prob`, `transition-prob`, `observation-prob`.
    /// Other top-level keys are ignored.
    pub fn from_document(document: &Value) -> Result<Self> {
        if document.as_map().is_none() {
            return Err(ModelError::NotAMap(document.describe()));
        }
        let required = |key: &'static str| {
            document
                .get(&Value::keyword(key))
                .ok_or(ModelError::MissingKey(key))
        };

        let model_type = required(TYPE)?;
        let states = required(STATES)?;
        let observations = required(OBSERVATIONS)?;
        let initial_prob = required(INITIAL_PROB)?;
        let transition_prob = required(TRANSITION_PROB)?;
        let observation_prob = required(OBSERVATION_PROB)?;

        Ok(Model {
            model_type: ModelType::from_value(model_type)?,
            states: read_identifiers(STATES, states)?,
            observations: read_identifiers(OBSERVATIONS, observations)?,
            initial_prob: read_prob_map(INITIAL_PROB, initial_prob)?,
            transition_prob: read_prob_table(TRANSITION_PROB, transition_prob)?,
            observation_prob: read_prob_table(OBSERVATION_PROB, observation_prob)?,
        })
    }
}

impl FromStr for Model {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        parse_from_str(s)
    }
}

/// Read and parse the model file at `path`. The file is closed before this returns.
pub fn parse_from_path<P: AsRef<Path>>(path: P) -> Result<Model> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading model file");
    let file = File::open(path).map_err(|source| ModelError::Open {
        path: path.to_owned(),
        source,
    })?;
    parse_from_reader(file)
}

/// Read a model from everything remaining in `reader`.
pub fn parse_from_reader<R: Read>(mut reader: R) -> Result<Model> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_from_str(&text)
}

/// Parse a model from EDN text.
pub fn parse_from_str(text: &str) -> Result<Model> {
    let document = edn::parse(text)?;
    let model = Model::from_document(&document)?;
    debug!(
        model_type = model.model_type.name(),
        states = model.states.len(),
        observations = model.observations.len(),
        "parsed model"
    );
    Ok(model)
}

fn read_identifiers(field: &'static str, value: &Value) -> Result<Vec<Value>> {
    value.as_seq().map(<[Value]>::to_vec).ok_or_else(|| {
        ModelError::schema(
            field,
            format!("expected a vector or list, found {}", value.describe()),
        )
    })
}

/// Convert a single probability leaf. `-Infinity` is matched by identity before any numeric
/// interpretation. Every leaf is either finite or negative infinity.
fn read_probability(field: &'static str, value: &Value) -> Result<f64> {
    if value.is_symbol(NEGATIVE_INFINITY) {
        return Ok(f64::NEG_INFINITY);
    }
    match value.as_f64() {
        Some(p) if p.is_finite() || p == f64::NEG_INFINITY => Ok(p),
        _ => Err(ModelError::schema(
            field,
            format!("expected a probability, found {}", value.describe()),
        )),
    }
}

fn entries<'v>(field: &'static str, value: &'v Value) -> Result<&'v [(Value, Value)]> {
    value.as_map().ok_or_else(|| {
        ModelError::schema(field, format!("expected a map, found {}", value.describe()))
    })
}

/// One level: state → probability
fn read_prob_map(field: &'static str, value: &Value) -> Result<ProbMap> {
    entries(field, value)?
        .iter()
        .map(|(k, v)| Ok((k.clone(), read_probability(field, v)?)))
        .collect()
}

/// Two levels: state → (state or observation → probability)
fn read_prob_table(field: &'static str, value: &Value) -> Result<ProbTable> {
    entries(field, value)?
        .iter()
        .map(|(outer, row)| {
            let row = entries(field, row)?
                .iter()
                .map(|(inner, v)| Ok((inner.clone(), read_probability(field, v)?)))
                .collect::<Result<ProbMap>>()?;
            Ok((outer.clone(), row))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use spectral::prelude::*;
    use std::io::{Cursor, Write};

    pub(crate) const EXAMPLE: &str = "
        {:type :HMM, :states [a b], :observations [x],
         :initial-prob {a 0.5, b -Infinity},
         :transition-prob {a {a 0.1, b 0.9}, b {a -Infinity, b 1.0}},
         :observation-prob {a {x 1.0}, b {x -Infinity}}}";

    lazy_static! {
        static ref MODEL: Model = parse_from_str(EXAMPLE).unwrap();
    }

    fn sym(name: &str) -> Value {
        Value::symbol(name)
    }

    fn without_key(key: &str) -> String {
        let document = edn::parse(EXAMPLE).unwrap();
        let entries = document
            .as_map()
            .unwrap()
            .iter()
            .filter(|(k, _v)| *k != Value::keyword(key))
            .cloned()
            .collect();
        Value::Map(entries).to_string()
    }

    #[test]
    fn example_model() {
        assert_eq!(MODEL.model_type, ModelType::Hmm);
        assert_eq!(MODEL.states, vec![sym("a"), sym("b")]);
        assert_eq!(MODEL.observations, vec![sym("x")]);

        assert_eq!(MODEL.initial_prob.get_named("a"), Some(&0.5));
        assert_eq!(MODEL.initial_prob.get_named("b"), Some(&f64::NEG_INFINITY));

        let tran_a = MODEL.transition_prob.get_named("a").unwrap();
        let tran_b = MODEL.transition_prob.get_named("b").unwrap();
        assert_eq!(tran_a.get_named("a"), Some(&0.1));
        assert_eq!(tran_a.get_named("b"), Some(&0.9));
        assert_eq!(tran_b.get_named("a"), Some(&f64::NEG_INFINITY));
        assert_eq!(tran_b.get_named("b"), Some(&1.0));

        let obs = &MODEL.observation_prob;
        assert_eq!(obs.get_named("a").unwrap().get_named("x"), Some(&1.0));
        assert_eq!(
            obs.get_named("b").unwrap().get_named("x"),
            Some(&f64::NEG_INFINITY)
        );
    }

    #[test]
    fn keys_keep_document_order() {
        let model = parse_from_str(
            "{:type :HMM :states [z a] :observations []
              :initial-prob {z 0 a 1}
              :transition-prob {z {a 1 z 0} a {z 1}}
              :observation-prob {}}",
        )
        .unwrap();
        let keys = |map: &ProbMap| map.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&model.initial_prob), vec![sym("z"), sym("a")]);
        assert_eq!(
            keys(model.transition_prob.get_named("z").unwrap()),
            vec![sym("a"), sym("z")]
        );
        assert_that(&model.observation_prob.is_empty()).is_true();
    }

    #[test]
    fn integers_become_floats() {
        let model = parse_from_str(
            "{:type LogHMM :states [s] :observations [o]
              :initial-prob {s 0} :transition-prob {s {s 0}} :observation-prob {s {o -1}}}",
        )
        .unwrap();
        assert_eq!(model.model_type, ModelType::LogHmm);
        assert_eq!(model.initial_prob.get_named("s"), Some(&0.0));
        assert_eq!(
            model.observation_prob.get_named("s").unwrap().get_named("o"),
            Some(&-1.0)
        );
    }

    #[test]
    fn identifiers_are_copied_verbatim() {
        let model = parse_from_str(
            "{:type :HMM :states [-Infinity \"s\" 3] :observations (-Infinity)
              :initial-prob {} :transition-prob {} :observation-prob {}}",
        )
        .unwrap();
        assert_eq!(
            model.states,
            vec![sym("-Infinity"), Value::String("s".into()), Value::Integer(3)]
        );
        assert_eq!(model.observations, vec![sym("-Infinity")]);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let open = EXAMPLE.trim_end().strip_suffix('}').unwrap();
        let text = format!("{} :comment \"hi\"}}", open);
        assert_eq!(parse_from_str(&text).unwrap(), *MODEL);
    }

    #[test]
    fn missing_observation_prob() {
        let result = parse_from_str(&without_key(OBSERVATION_PROB));
        assert!(matches!(result, Err(ModelError::MissingKey("observation-prob"))));
    }

    #[test]
    fn missing_type() {
        let result = parse_from_str(&without_key(TYPE));
        assert!(matches!(result, Err(ModelError::MissingKey("type"))));
    }

    #[test]
    fn first_missing_key_is_reported() {
        let result = parse_from_str("{:type :HMM}");
        assert!(matches!(result, Err(ModelError::MissingKey("states"))));
    }

    #[test]
    fn keys_must_be_keywords() {
        let result = parse_from_str(&EXAMPLE.replace(":type", "type"));
        assert!(matches!(result, Err(ModelError::MissingKey("type"))));
    }

    #[test]
    fn unknown_model_type() {
        let result = parse_from_str(&EXAMPLE.replace(":HMM", ":CRF"));
        assert!(matches!(result, Err(ModelError::Schema { field: "type", .. })));
    }

    #[test]
    fn other_symbols_are_not_probabilities() {
        let text = EXAMPLE.replace("{a 0.5, b -Infinity}", "{a 0.5, b Infinity}");
        let result = parse_from_str(&text);
        assert!(matches!(result, Err(ModelError::Schema { field: "initial-prob", .. })));
    }

    #[test]
    fn nan_and_positive_infinity_are_not_probabilities() {
        for leaf in &["##NaN", "##Inf"] {
            let text = EXAMPLE.replace("{a 0.5, b -Infinity}", &format!("{{a 0.5, b {}}}", leaf));
            let result = parse_from_str(&text);
            assert!(
                matches!(result, Err(ModelError::Schema { field: "initial-prob", .. })),
                "{} was accepted",
                leaf
            );
        }
        let text = EXAMPLE.replace("{x -Infinity}", "{x ##-Inf}");
        assert_eq!(parse_from_str(&text).unwrap(), *MODEL);
    }

    #[test]
    fn lookup_by_value() {
        let model = parse_from_str(
            "{:type :HMM :states [3 \"s\"] :observations []
              :initial-prob {3 0.25 \"s\" 0.75} :transition-prob {} :observation-prob {}}",
        )
        .unwrap();
        let initial = &model.initial_prob;
        assert_eq!(initial.get(&Value::Integer(3)), Some(&0.25));
        assert_eq!(initial.get(&Value::String("s".into())), Some(&0.75));
        assert_eq!(initial.get(&sym("s")), None);
        assert_eq!(initial.get_named("s"), Some(&0.75));
        assert_eq!(initial.len(), 2);
    }

    #[test]
    fn rows_must_be_maps() {
        let text = EXAMPLE.replace("{a {x 1.0}, b {x -Infinity}}", "{a [1.0]}");
        let result = parse_from_str(&text);
        assert!(matches!(
            result,
            Err(ModelError::Schema {
                field: "observation-prob",
                ..
            })
        ));
    }

    #[test]
    fn document_must_be_a_map() {
        assert!(matches!(parse_from_str("[1 2]"), Err(ModelError::NotAMap(_))));
    }

    #[test]
    fn syntax_errors_propagate() {
        let result = parse_from_str("{:type :HMM");
        assert!(matches!(result, Err(ModelError::Syntax(_))));
    }

    /// Write a random model containing no `-Infinity` symbols
    fn random_document<R: Rng>(rng: &mut R, n: usize, k: usize) -> (String, Vec<f64>) {
        let mut leaves = Vec::new();
        let mut row = |rng: &mut R, prefix: &str, len: usize| {
            let cells: Vec<String> = (0..len)
                .map(|i| {
                    let p: f64 = rng.gen();
                    leaves.push(p);
                    format!("{}{} {:?}", prefix, i, p)
                })
                .collect();
            format!("{{{}}}", cells.join(", "))
        };

        let initial = row(&mut *rng, "s", n);
        let transition: Vec<String> = (0..n)
            .map(|i| format!("s{} {}", i, row(&mut *rng, "s", n)))
            .collect();
        let observation: Vec<String> = (0..n)
            .map(|i| format!("s{} {}", i, row(&mut *rng, "o", k)))
            .collect();
        let states: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
        let observations: Vec<String> = (0..k).map(|i| format!("o{}", i)).collect();
        let text = format!(
            "{{:type :HMM :states [{}] :observations [{}] :initial-prob {}
               :transition-prob {{{}}} :observation-prob {{{}}}}}",
            states.join(" "),
            observations.join(" "),
            initial,
            transition.join(", "),
            observation.join(", ")
        );
        (text, leaves)
    }

    #[test]
    fn numeric_leaves_are_unchanged() {
        let mut rng = StdRng::seed_from_u64(1337);
        for _ in 0..20 {
            let n = rng.gen_range(1..6);
            let k = rng.gen_range(1..6);
            let (text, expected) = random_document(&mut rng, n, k);
            let model = parse_from_str(&text).unwrap();

            let actual: Vec<f64> = model
                .initial_prob
                .values()
                .cloned()
                .chain(model.transition_prob.values().flat_map(|row| row.values().cloned()))
                .chain(model.observation_prob.values().flat_map(|row| row.values().cloned()))
                .collect();
            assert_eq!(actual, expected);
            assert_eq!(model.states.len(), n);
            assert_eq!(model.observations.len(), k);
            assert_eq!(
                model.states,
                model.transition_prob.keys().cloned().collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn from_str() {
        let model: Model = EXAMPLE.parse().unwrap();
        assert_eq!(model, *MODEL);
    }

    #[test]
    fn from_reader() {
        assert_eq!(parse_from_reader(Cursor::new(EXAMPLE)).unwrap(), *MODEL);
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();
        assert_eq!(parse_from_path(file.path()).unwrap(), *MODEL);
    }

    #[test]
    fn from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_from_path(dir.path().join("missing.edn"));
        assert!(matches!(result, Err(ModelError::Open { .. })));
    }

    #[cfg(feature = "serde-1")]
    #[test]
    fn serialize() {
        let json = serde_json::to_value(&*MODEL).unwrap();
        assert_eq!(json["type"], "HMM");
        assert_eq!(json["initial-prob"][0][1], 0.5);
        assert_that(&json["observation-prob"].as_array().unwrap().len()).is_equal_to(2);
    }
}
