use std::{fs, path::PathBuf};

use chaosveil_core::{
    isometry_probe, load_config, retrieval_accuracy, ConfigFormat, ObfuscationEngine,
    SyntheticCorpus, ValidationCriteria, ValidationReport,
};
use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, Result, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod pairs;

use pairs::EmbeddingPairs;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    Auto,
    Toml,
    Yaml,
}

impl From<FormatArg> for ConfigFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => ConfigFormat::Auto,
            FormatArg::Toml => ConfigFormat::Toml,
            FormatArg::Yaml => ConfigFormat::Yaml,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "chaosveil-validator",
    version,
    about = "Checks that encrypted retrieval matches plaintext retrieval"
)]
struct Cli {
    /// Path to configuration file (TOML or YAML).
    #[arg(long, default_value = "configs/chaosveil.toml")]
    config: PathBuf,
    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    config_format: FormatArg,
    /// JSON file of real (query, passage) embeddings. Synthetic data is used when absent.
    #[arg(long)]
    pairs: Option<PathBuf>,
    /// Number of synthetic passages.
    #[arg(long, default_value_t = 100)]
    documents: usize,
    /// Per-component noise separating a synthetic query from its passage.
    #[arg(long, default_value_t = 0.05)]
    noise: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Upper bound on vectors fed to the pairwise isometry probe.
    #[arg(long, default_value_t = 200)]
    probe_samples: usize,
    /// Top-1 accuracy, in percent, that a passing run must exceed.
    #[arg(long, default_value_t = 90.0)]
    min_accuracy: f64,
    #[arg(long, default_value = "logs/validation_report.json")]
    out: PathBuf,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

struct Workload {
    dataset: String,
    model: String,
    queries: Vec<Vec<f64>>,
    passages: Vec<Vec<f64>>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn workload(cli: &Cli, dimension: usize) -> Result<Workload> {
    match &cli.pairs {
        Some(path) => {
            let pairs = EmbeddingPairs::load(path)?;
            Ok(Workload {
                dataset: pairs
                    .dataset
                    .unwrap_or_else(|| path.display().to_string()),
                model: pairs.model.unwrap_or_else(|| "external".into()),
                queries: pairs.queries,
                passages: pairs.passages,
            })
        }
        None => {
            let mut corpus = SyntheticCorpus::new(dimension, cli.seed)?;
            let (queries, passages) = corpus.query_passage_pairs(cli.documents, cli.noise);
            Ok(Workload {
                dataset: format!("synthetic (seed {})", cli.seed),
                model: format!("gaussian, noise {}", cli.noise),
                queries,
                passages,
            })
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = load_config(&cli.config, cli.config_format.into())
        .wrap_err_with(|| format!("loading {}", cli.config.display()))?;
    let work = workload(&cli, config.key.dimension)?;
    if let Some(width) = work.passages.first().map(Vec::len) {
        if width != config.key.dimension {
            warn!(
                configured = config.key.dimension,
                width, "pairs file overrides configured dimension"
            );
            config.key.dimension = width;
        }
    }

    let engine = ObfuscationEngine::from_config(&config)?;
    let probe_len = work.passages.len().min(cli.probe_samples);
    let probe = isometry_probe(&engine, &work.passages[..probe_len])?;
    let retrieval = retrieval_accuracy(&engine, &work.queries, &work.passages)?;
    let criteria = ValidationCriteria {
        min_accuracy: cli.min_accuracy,
        ..ValidationCriteria::default()
    };
    let report = ValidationReport::assemble(
        work.dataset,
        work.model,
        &engine,
        &retrieval,
        probe,
        &criteria,
    );

    if let Some(parent) = cli.out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&cli.out, report.to_json_pretty()?)
        .wrap_err_with(|| format!("writing {}", cli.out.display()))?;
    info!(path = %cli.out.display(), "report written");

    print!("{}", report.render_summary());
    if !report.passed() {
        bail!(
            "validation failed: accuracy {:.1}% (must exceed {:.1}%), worst probe error {:.3e}",
            report.accuracy,
            criteria.min_accuracy,
            report.probe.worst_error()
        );
    }
    Ok(())
}
