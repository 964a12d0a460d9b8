use anyhow::{Context, Result};
use clap::Parser;
use dnr_pso::{
    best_of, ieee33, CachedOracle, Configuration, FitnessOracle, GlobalBestUpdate,
    NetworkOracle, OracleWrapper, RadialityValidator, ReconfigurationReport, Reconfigurer,
    Settings, TableOracle, ValidatedOracle,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

/// Tie-switch reconfiguration of the IEEE 33-bus feeder with a binary particle swarm
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed of the swarm, overrides the settings file
    #[arg(long)]
    seed: Option<u64>,

    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,

    /// Number of generations
    #[arg(long)]
    iters: Option<u64>,

    /// When the global best is updated: immediate or deferred
    #[arg(long, value_parser = parse_update)]
    update: Option<GlobalBestUpdate>,

    /// Independent runs (seeded seed, seed+1, ...) evaluated in parallel
    #[arg(long, default_value_t = 1)]
    restarts: u64,

    /// Penalize configurations that are not radial
    #[arg(long)]
    check_radiality: bool,

    /// Look losses up in a JSON table instead of running a power flow
    #[arg(long)]
    losses: Option<PathBuf>,

    /// Write every generation of the swarm to this directory
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Write the report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the convergence record as .npy
    #[arg(long)]
    record: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,
}

fn parse_update(s: &str) -> Result<GlobalBestUpdate, String> {
    match s {
        "immediate" => Ok(GlobalBestUpdate::Immediate),
        "deferred" => Ok(GlobalBestUpdate::Deferred),
        other => Err(format!("unknown update policy `{}`", other)),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_toml_file(path)
            .with_context(|| format!("Error reading settings {}", path.display()))?,
        None => Settings::default(),
    };
    if cli.seed.is_some() {
        settings.seed = cli.seed;
    }
    if let Some(particles) = cli.particles {
        settings.pso.num_particles = particles;
    }
    if let Some(iters) = cli.iters {
        settings.pso.max_iters = iters;
    }
    if let Some(update) = cli.update {
        settings.pso.update = update;
    }
    settings.pso.validate()?;
    Ok(settings)
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let settings = load_settings(&cli)?;
    let network = Arc::new(ieee33(&settings.grid.dg)?);
    info!(
        network = %network.name,
        ties = ?network.tie_switch_names(),
        "network loaded"
    );

    let base: OracleWrapper = match &cli.losses {
        Some(path) => TableOracle::from_json_file(path)?.into(),
        None => NetworkOracle::new(network.clone(), settings.power_flow).into(),
    };
    let checked: Box<dyn FitnessOracle> = if cli.check_radiality {
        Box::new(ValidatedOracle::new(
            base,
            RadialityValidator::new(network.clone()),
        ))
    } else {
        Box::new(base)
    };
    let oracle: Box<dyn FitnessOracle> = match settings.cache.capacity() {
        Some(capacity) => Box::new(CachedOracle::new(checked, capacity)),
        None => checked,
    };

    let reconfigurer = Reconfigurer::new(&*oracle, settings.pso.clone());
    reconfigurer.check()?;
    reconfigurer.check_switch_count(network.tie_switches().len())?;

    let result = if cli.restarts > 1 {
        let first = settings.seed.unwrap_or_else(rand::random);
        let seeds: Vec<u64> = (0..cli.restarts).map(|i| first.wrapping_add(i)).collect();
        let results = reconfigurer.fit_restarts(&seeds)?;
        for r in &results {
            info!(seed = ?r.seed, loss_kw = r.best_loss_kw, "restart finished");
        }
        best_of(results).context("no restart finished")?
    } else {
        reconfigurer.fit(settings.seed, cli.trace_dir.as_deref(), cli.progress)?
    };

    let initial_loss_kw = reconfigurer.loss(&Configuration::open(oracle.switch_count()));
    let report =
        ReconfigurationReport::new(&network, &settings.power_flow, &result, initial_loss_kw)?;
    println!("{}", report);

    if let Some(path) = &cli.output {
        report.write_json(path)?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = &cli.record {
        result.iteration_record.write_npy(path)?;
        info!(path = %path.display(), "convergence record written");
    }
    Ok(())
}
