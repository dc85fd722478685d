#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;

use stepstab::bootstrap::BootstrapProgressObserver;
use stepstab::config::{AnalysisConfig, Separator};
use stepstab::data::load_dataset;
use stepstab::pipeline::{StabilityReport, run_analysis};
use stepstab::report::{RunSummary, write_report};
use stepstab::selection::Criterion;

#[derive(Clone, Copy, ValueEnum)]
pub enum SeparatorCli {
    Tab,
    Comma,
}

impl From<SeparatorCli> for Separator {
    fn from(value: SeparatorCli) -> Self {
        match value {
            SeparatorCli::Tab => Separator::Tab,
            SeparatorCli::Comma => Separator::Comma,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CriterionCli {
    Aic,
    Bic,
}

impl From<CriterionCli> for Criterion {
    fn from(value: CriterionCli) -> Self {
        match value {
            CriterionCli::Aic => Criterion::Aic,
            CriterionCli::Bic => Criterion::Bic,
        }
    }
}

/// Column selection shared by `analyze` and `init-config`.
#[derive(Args)]
pub struct ColumnArgs {
    /// Name of the outcome column
    #[arg(long)]
    pub outcome: Option<String>,

    /// Comma-separated predictors that are never eliminated
    #[arg(long, value_delimiter = ',')]
    pub forced: Option<Vec<String>>,

    /// Comma-separated predictors that backward elimination may drop
    #[arg(long, value_delimiter = ',')]
    pub candidates: Option<Vec<String>>,
}

impl ColumnArgs {
    fn apply(self, config: &mut AnalysisConfig) {
        if let Some(outcome) = self.outcome {
            config.outcome = outcome;
        }
        if let Some(forced) = self.forced {
            config.forced = forced;
        }
        if let Some(candidates) = self.candidates {
            config.candidates = candidates;
        }
    }
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to the input table (header row required)
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// TOML analysis config; flags given on the command line take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Number of bootstrap resamples
    #[arg(long, value_name = "B")]
    pub bootstraps: Option<usize>,

    /// Seed of the bootstrap run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Significance level of the pairwise inclusion test
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Worker threads for the bootstrap (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Field separator of the input table
    #[arg(long, value_enum)]
    pub separator: Option<SeparatorCli>,

    /// Selection criterion used by backward elimination
    #[arg(long, value_enum)]
    pub criterion: Option<CriterionCli>,

    /// Skip leave-one-out shrinkage of the selected model
    #[arg(long)]
    pub no_shrinkage: bool,

    /// Disable Yates' continuity correction in the pairwise test
    #[arg(long)]
    pub no_yates: bool,

    /// Directory that receives the result tables
    #[arg(long, default_value = "stepstab_results")]
    pub out_dir: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "stepstab",
    about = "Bootstrap stability analysis of backward-elimination linear regression",
    long_about = "Refits backward elimination on bootstrap resamples and reports inclusion \
                 frequencies, selection bias, pairwise co-inclusion, model frequencies and \
                 shrinkage factors."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stability analysis on a data table
    #[command(about = "Run the analysis (outputs: overview.tsv, pairwise.tsv, ...)")]
    Analyze(AnalyzeArgs),

    /// Write a config file with every default filled in
    #[command(about = "Write a default analysis config (outputs: TOML file)")]
    InitConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[command(flatten)]
        columns: ColumnArgs,
    },

    /// Display version information
    Version,
}

/// Drives an indicatif bar from bootstrap progress callbacks.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("> Bootstrap [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        Self { bar }
    }
}

impl BootstrapProgressObserver for BarProgress {
    fn on_start(&self, total_iterations: usize) {
        self.bar.set_length(total_iterations as u64);
    }

    fn on_iteration_complete(&self) {
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = match Cli::parse().command {
        Commands::Analyze(args) => analyze(args),
        Commands::InitConfig { path, columns } => init_config(&path, columns),
        Commands::Version => {
            println!("stepstab {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn build_config(
    config_path: Option<&Path>,
    args: AnalyzeArgs,
) -> Result<(AnalysisConfig, PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            println!("Loading analysis config from: {}", path.display());
            AnalysisConfig::load(path)?
        }
        None => AnalysisConfig::default(),
    };
    args.columns.apply(&mut config);
    if let Some(bootstraps) = args.bootstraps {
        config.bootstrap_iterations = bootstraps;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(alpha) = args.alpha {
        config.significance_level = alpha;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    if let Some(separator) = args.separator {
        config.separator = separator.into();
    }
    if let Some(criterion) = args.criterion {
        config.criterion = criterion.into();
    }
    if args.no_shrinkage {
        config.shrinkage = false;
    }
    if args.no_yates {
        config.yates_correction = false;
    }
    config.validate()?;
    Ok((config, args.data, args.out_dir))
}

fn analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = args.config.clone();
    let (config, data_path, out_dir) = build_config(config_path.as_deref(), args)?;

    println!("Loading data from: {}", data_path.display());
    let data = load_dataset(
        &data_path,
        &config.outcome,
        &config.predictor_set().all(),
        config.separator.as_byte(),
    )?;
    println!(
        "Loaded {} rows: outcome '{}', {} forced and {} candidate predictors",
        data.n_rows(),
        config.outcome,
        config.forced.len(),
        config.candidates.len()
    );

    let progress = BarProgress::new();
    let report = run_analysis(&data, &config, &progress)?;
    print_summary(&report);

    let summary = RunSummary::new(&report, &config, data.n_rows());
    let written = write_report(&report, &summary, &out_dir)?;
    for path in written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &StabilityReport) {
    let selected = report.selected_predictors();
    println!(
        "Selected model: {}",
        if selected.is_empty() {
            "(intercept only)".to_string()
        } else {
            selected.join(", ")
        }
    );
    println!(
        "Reproduced exactly in {:.1}% of {} bootstrap samples",
        report.reproduction_frequency,
        report.ensemble.iterations()
    );
    println!("{:<24} {:>8} {:>10} {:>12}", "variable", "BIF", "RMSD ratio", "rel. bias");
    for row in &report.overview {
        println!(
            "{:<24} {:>8.1} {:>10.3} {:>12.1}",
            row.name, row.bif, row.rmsd_ratio, row.relative_conditional_bias
        );
    }
    if let Some(shrinkage) = &report.shrinkage {
        println!("Global shrinkage factor: {:.4}", shrinkage.global.factors[0]);
    }
}

fn init_config(path: &Path, columns: ColumnArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AnalysisConfig::default();
    columns.apply(&mut config);
    config.save(path)?;
    println!("Wrote default analysis config to {}", path.display());
    Ok(())
}
