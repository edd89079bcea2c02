use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use cohortmed::pipeline::{derive_stage, fit_stage, impute_stage};
use cohortmed::{PipelineConfig, PipelineError, StudyDesign, run_pipeline};

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// TOML configuration file; flags below override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Wide raw survey table (CSV with a `pid` column)
    #[arg(long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Directory for artifacts and report tables
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of completed datasets (M)
    #[arg(long, value_name = "M")]
    pub imputations: Option<usize>,

    /// Master seed for imputation and sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Ignore cached model fits
    #[arg(long)]
    pub refit: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(m) = self.imputations {
            config.imputation.imputations = m;
        }
        if let Some(seed) = self.seed {
            config.imputation.seed = seed;
            config.sampler.seed = seed.wrapping_add(1);
            config.pairing_seed = seed.wrapping_add(2);
        }
        config.refit |= self.refit;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser)]
#[command(
    name = "cohortmed",
    about = "Imputation, multilevel Poisson models and mediation for the cohort study",
    long_about = "Derives screen and subscale indicators from the raw survey table, imputes \
                 missing cells by chained equations, fits the nested multilevel Poisson models \
                 to every completed dataset and summarizes indirect effects."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive indicators and write derived.csv
    Derive(RunArgs),
    /// Derive, then write the imputation artifact
    Impute(RunArgs),
    /// Derive, impute (or reuse), then fit every model
    Fit(RunArgs),
    /// Full pipeline including mediation and reports
    Run(RunArgs),
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// How far a subcommand runs the pipeline.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Derive,
    Impute,
    Fit,
    Run,
}

fn run(command: Commands) -> Result<(), PipelineError> {
    let (args, stage) = match &command {
        Commands::Derive(a) => (a, Stage::Derive),
        Commands::Impute(a) => (a, Stage::Impute),
        Commands::Fit(a) => (a, Stage::Fit),
        Commands::Run(a) => (a, Stage::Run),
    };
    init_logging(args.verbose);
    let config = args.resolve()?;
    if stage == Stage::Run {
        let output = run_pipeline(&config)?;
        for estimate in &output.mediation {
            if let (Some(indirect), Some(percent)) = (estimate.indirect, estimate.percent_mediated) {
                println!(
                    "{}: indirect RR {:.3} [{:.3}, {:.3}], {:.1}% mediated [{:.1}, {:.1}]",
                    estimate.mediator,
                    indirect.mean,
                    indirect.lower,
                    indirect.upper,
                    percent.mean,
                    percent.lower,
                    percent.upper
                );
            }
        }
        println!("Reports written to {}", config.output.display());
        return Ok(());
    }

    let design = StudyDesign::cohort()?;
    let (table, _) = derive_stage(&config, &design)?;
    if stage == Stage::Derive {
        println!("Derived table written to {}", config.derived_path().display());
        return Ok(());
    }
    let artifact = impute_stage(&config, &design, &table)?;
    if stage == Stage::Impute {
        println!("Imputations written to {}", config.imputation_path().display());
        return Ok(());
    }
    let fits = fit_stage(&config, &design, &artifact)?;
    println!("{} model fits stored in {}", fits.len(), config.fits_dir().display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Some(command) => run(command),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
