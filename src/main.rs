//! Command-line summaries of HMM parameter files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hmm_stats::distributions::{self, histogram, Transform, DEFAULT_BINS};
use hmm_stats::features::{prominence_proportions, DEFAULT_SIGMA};
use hmm_stats::{parse_from_path, DenseModel, Model, ProbMap};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Rows of probability-space totals further than this from 1 are reported
const TOLERANCE: f64 = 1e-5;

#[derive(Parser)]
#[command(name = "hmm-stats")]
#[command(about = "Summarize the probabilities in an HMM parameter file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shape of a model and check it for consistency
    Summary {
        /// Model file
        model: PathBuf,
    },

    /// Write histogram tables of the largest transition and observation probabilities
    Hist {
        /// Model file
        model: PathBuf,

        /// Directory that receives obs.tsv, tran.tsv, obs/NN.tsv and tran/NN.tsv
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Number of histogram bins
        #[arg(short, long, default_value_t = DEFAULT_BINS)]
        bins: usize,

        #[arg(short, long, value_enum, default_value_t = TransformArg::Auto)]
        transform: TransformArg,
    },

    /// Print the distribution of prominence over the rows of the observation matrix
    Prominence {
        /// Model file
        model: PathBuf,

        /// Number of standard deviations above the mean for an observation to be prominent
        #[arg(short, long, default_value_t = DEFAULT_SIGMA)]
        sigma: f64,

        #[arg(short, long, value_enum, default_value_t = TransformArg::Auto)]
        transform: TransformArg,
    },
}

/// Transform applied to probabilities before summarizing them
#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransformArg {
    /// exp for LogHMM models, identity otherwise
    Auto,
    Identity,
    Exp,
}

impl TransformArg {
    fn resolve(self, model: &Model) -> Transform {
        match self {
            TransformArg::Auto => Transform::for_model(model.model_type),
            TransformArg::Identity => Transform::Identity,
            TransformArg::Exp => Transform::Exp,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Summary { model } => summary(&load(&model)?),
        Commands::Hist {
            model,
            out_dir,
            bins,
            transform,
        } => {
            if bins == 0 {
                bail!("--bins must be at least 1");
            }
            let model = load(&model)?;
            write_histograms(&model, &out_dir, bins, transform.resolve(&model))
        }
        Commands::Prominence {
            model,
            sigma,
            transform,
        } => {
            let model = load(&model)?;
            let stdout = io::stdout();
            prominence(&model, sigma, transform.resolve(&model), stdout.lock())
        }
    }
}

fn load(path: &Path) -> Result<Model> {
    parse_from_path(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn summary(model: &Model) -> Result<()> {
    println!("type:         {}", model.model_type.name());
    println!("states:       {}", model.states.len());
    println!("observations: {}", model.observations.len());

    if let Err(e) = model.validate_references() {
        println!("references:   invalid ({})", e);
        return Ok(());
    }
    println!("references:   ok");

    let dense = DenseModel::from_model(model)?;
    let totals = dense.totals();
    if totals.is_stochastic(TOLERANCE) {
        println!("totals:       ok");
    } else {
        println!("totals:       not stochastic");
        println!("  initial:    {}", totals.pi);
        for (state, (a, b)) in model
            .states
            .iter()
            .zip(totals.a.iter().zip(totals.b.iter()))
        {
            println!("  {}: transitions {}, observations {}", state, a, b);
        }
    }
    Ok(())
}

fn write_histogram(
    path: &Path,
    distribution: &ProbMap,
    transform: Transform,
    bins: usize,
) -> Result<()> {
    match histogram(distribution, |p| transform.apply(p), bins) {
        Some(hist) => {
            let file =
                File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            hist.write_tsv(BufWriter::new(file))
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => warn!("no finite probabilities for {}, skipping", path.display()),
    }
    Ok(())
}

fn write_histograms(
    model: &Model,
    out_dir: &Path,
    bins: usize,
    transform: Transform,
) -> Result<()> {
    info!("transform: {:?}, bins: {}", transform, bins);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let max_obs = distributions::max_observation_probs(model);
    let max_tran = distributions::max_transition_probs(model);
    write_histogram(&out_dir.join("obs.tsv"), &max_obs, transform, bins)?;
    write_histogram(&out_dir.join("tran.tsv"), &max_tran, transform, bins)?;

    for (name, table) in &[
        ("obs", &model.observation_prob),
        ("tran", &model.transition_prob),
    ] {
        let dir = out_dir.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for (i, (_state, row)) in table.iter().enumerate() {
            write_histogram(&dir.join(format!("{:02}.tsv", i)), row, transform, bins)?;
        }
    }
    Ok(())
}

fn prominence<W: Write>(
    model: &Model,
    sigma: f64,
    transform: Transform,
    mut out: W,
) -> Result<()> {
    let dense = DenseModel::from_model(model)?;
    let b = dense.b.mapv(|p| transform.apply(p));
    let proportions = prominence_proportions(b.rows(), sigma);
    info!("prominence over {} states at sigma {}", dense.n(), sigma);

    writeln!(out, "prominence\tproportion")?;
    for (p, proportion) in proportions.iter().enumerate() {
        writeln!(out, "{}\t{}", p, proportion)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmm_stats::parse_from_str;
    use spectral::prelude::*;

    const MODEL: &str = "
        {:type :HMM, :states [s0 s1 s2], :observations [x y z],
         :initial-prob {s0 1.0, s1 0, s2 0},
         :transition-prob {s0 {s0 0.5, s1 0.5}, s1 {s2 1.0}, s2 {s2 1.0}},
         :observation-prob {s0 {x 0.8, y 0.1, z 0.1}, s1 {x 0.4, y 0.3, z 0.3}, s2 {}}}";

    fn model() -> Model {
        parse_from_str(MODEL).unwrap()
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn auto_transform_follows_model_type() {
        let model = model();
        assert_eq!(TransformArg::Auto.resolve(&model), Transform::Identity);
        assert_eq!(TransformArg::Exp.resolve(&model), Transform::Exp);

        let log_model = parse_from_str(&MODEL.replace(":HMM", ":LogHMM")).unwrap();
        assert_eq!(TransformArg::Auto.resolve(&log_model), Transform::Exp);
        assert_eq!(TransformArg::Identity.resolve(&log_model), Transform::Identity);
    }

    #[test]
    fn histograms_are_written_to_a_new_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let out_dir = tmp.path().join("out");
        write_histograms(&model(), &out_dir, 4, Transform::Identity).unwrap();

        for file in &["obs.tsv", "tran.tsv", "obs/00.tsv", "obs/01.tsv"] {
            assert!(out_dir.join(file).is_file(), "{} is missing", file);
        }
        for file in &["tran/00.tsv", "tran/01.tsv", "tran/02.tsv"] {
            assert!(out_dir.join(file).is_file(), "{} is missing", file);
        }
        // s2 has no observations, so there is nothing to plot
        assert!(!out_dir.join("obs/02.tsv").exists());

        let obs = lines(&out_dir.join("obs.tsv"));
        assert_eq!(obs.len(), 5);
        assert_eq!(obs[0], "left\tright\tcount\tdensity\tnormal_pdf");
        // the largest observation probabilities are 0.8 and 0.4; -inf is skipped
        let counts: usize = obs[1..]
            .iter()
            .map(|line| line.split('\t').nth(2).unwrap().parse::<usize>().unwrap())
            .sum();
        assert_eq!(counts, 2);
    }

    #[test]
    fn rows_are_numbered_in_document_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_histograms(&model(), tmp.path(), 1, Transform::Identity).unwrap();
        // tran/00.tsv is the row of s0, whose two values are both 0.5
        let row = lines(&tmp.path().join("tran/00.tsv"));
        assert_eq!(row.len(), 2);
        assert_eq!(row[1].split('\t').take(3).collect::<Vec<_>>(), vec!["0", "1", "2"]);
    }

    #[test]
    fn prominence_table() {
        let mut out = Vec::new();
        prominence(&model(), DEFAULT_SIGMA, Transform::Identity, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows: Vec<Vec<&str>> = text.lines().map(|line| line.split('\t').collect()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["prominence", "proportion"]);
        // s2 is constant after filling, so it has no prominent observations
        assert_eq!(rows[1][0], "0");
        assert_that(&rows[1][1].parse::<f64>().unwrap()).is_close_to(1.0 / 3.0, 1e-12);
        assert_eq!(rows[2][0], "1");
        assert_that(&rows[2][1].parse::<f64>().unwrap()).is_close_to(2.0 / 3.0, 1e-12);
    }
}
