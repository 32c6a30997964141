use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use ambient_brightness::config::AppConfig;
use ambient_brightness::engine::{
    AggregationMode, CancelHandle, ConvergenceLoop, EngineHandle, RecordingActuator,
    ReplaySensor, SessionOutcome,
};
use ambient_brightness::profile::{parse_profile, ProfileCurve, ProfileStore};
use ambient_brightness::sampling::AggregateSnapshot;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(
    name = "ambient_cli",
    about = "Ambient light to backlight brightness harness"
)]
struct Cli {
    /// Configuration file (defaults to ./ambient_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map lux values through a profile file
    Interpolate {
        #[arg(long)]
        profile: PathBuf,
        #[arg(long, required = true, num_args = 1..)]
        lux: Vec<f32>,
    },
    /// List stored profiles
    Profiles {
        /// Override the profile directory from the configuration
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Import a profile file into the store
    Import {
        #[arg(long)]
        name: String,
        #[arg(long)]
        dir: Option<PathBuf>,
        file: PathBuf,
    },
    /// Run one session against a replayed sensor, printing JSON lines
    Simulate {
        #[arg(long)]
        profile: PathBuf,
        /// Constant illuminance, repeated until the session stops
        /// (with a zero period the reading queue is filled once)
        #[arg(long, conflicts_with = "trace", required_unless_present = "trace")]
        lux: Option<f32>,
        /// File of whitespace-separated lux values, replayed once
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Uniform noise added to every reading, in lux
        #[arg(long, default_value_t = 0.0)]
        jitter: f32,
        /// Delay between two replayed readings
        #[arg(long, default_value_t = 200)]
        period_ms: u64,
        #[arg(long, value_enum, default_value_t = ModeArg::Average)]
        mode: ModeArg,
    },
    /// Drive the backlight from the IIO sensor until Ctrl-C
    Run,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Average,
    OneShot,
}

impl From<ModeArg> for AggregationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Average => AggregationMode::Average,
            ModeArg::OneShot => AggregationMode::OneShot,
        }
    }
}

fn main() -> ExitCode {
    ambient_brightness::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Interpolate { profile, lux } => run_interpolate(&profile, &lux),
        Commands::Profiles { dir } => run_profiles(dir.unwrap_or(config.profiles.directory)),
        Commands::Import { name, dir, file } => {
            run_import(dir.unwrap_or(config.profiles.directory), &name, &file)
        }
        Commands::Simulate {
            profile,
            lux,
            trace,
            jitter,
            period_ms,
            mode,
        } => {
            let sensor = replay_sensor(lux, trace.as_deref(), Duration::from_millis(period_ms))?
                .with_jitter(jitter);
            block_on(run_simulate(config, &profile, sensor, mode.into()))
        }
        Commands::Run => block_on(run_devices(config)),
    }
}

fn block_on<F: std::future::Future<Output = Result<ExitCode>>>(future: F) -> Result<ExitCode> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(future)
}

fn load_profile_file(path: &Path) -> Result<ProfileCurve> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let parsed = parse_profile(file).with_context(|| format!("reading {}", path.display()))?;
    for line in &parsed.skipped {
        log::warn!(
            "[Cli] {}: skipping malformed line {}: {:?}",
            path.display(),
            line.line_number,
            line.content
        );
    }
    if parsed.curve.is_empty() {
        bail!("profile {} has no valid point", path.display());
    }
    Ok(parsed.curve)
}

fn replay_sensor(lux: Option<f32>, trace: Option<&Path>, period: Duration) -> Result<ReplaySensor> {
    match (lux, trace) {
        (Some(lux), _) => Ok(ReplaySensor::constant(lux, period)),
        (None, Some(path)) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let readings = contents
                .split_whitespace()
                .map(|value| {
                    value
                        .parse::<f32>()
                        .with_context(|| format!("invalid lux value {value:?}"))
                })
                .collect::<Result<Vec<f32>>>()?;
            Ok(ReplaySensor::new(readings, period))
        }
        (None, None) => bail!("either --lux or --trace is required"),
    }
}

fn run_interpolate(profile: &Path, lux: &[f32]) -> Result<ExitCode> {
    let curve = load_profile_file(profile)?;
    for &value in lux {
        let line = InterpolationLine {
            lux: value,
            brightness: curve.interpolate(value),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(ExitCode::from(0))
}

fn run_profiles(dir: PathBuf) -> Result<ExitCode> {
    let store = ProfileStore::new(dir);
    let profiles = store.load_all().context("listing profiles")?;
    if profiles.is_empty() {
        println!("No profiles found under {}", store.dir().display());
        return Ok(ExitCode::from(0));
    }

    for (name, curve) in profiles {
        println!("{} ({} points)", name, curve.len());
    }
    Ok(ExitCode::from(0))
}

fn run_import(dir: PathBuf, name: &str, file: &Path) -> Result<ExitCode> {
    let store = ProfileStore::new(dir);
    let reader = fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let curve = store
        .import(name, reader)
        .with_context(|| format!("importing {} as '{}'", file.display(), name))?;
    println!(
        "Imported '{}' ({} points) into {}",
        name,
        curve.len(),
        store.dir().display()
    );
    Ok(ExitCode::from(0))
}

async fn run_simulate(
    config: AppConfig,
    profile: &Path,
    sensor: ReplaySensor,
    mode: AggregationMode,
) -> Result<ExitCode> {
    let curve = Arc::new(load_profile_file(profile)?);
    let actuator = RecordingActuator::new();
    let (progress_tx, mut progress_rx) = broadcast::channel(64);
    let mut session = ConvergenceLoop::new(sensor, actuator.clone()).with_progress(progress_tx);

    let printer = tokio::spawn(async move {
        loop {
            match progress_rx.recv().await {
                Ok(progress) => match serde_json::to_string(&progress) {
                    Ok(json) => println!("{json}"),
                    Err(err) => log::warn!("[Cli] Failed to encode progress: {}", err),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[Cli] Skipped {} progress reports", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancelHandle::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = session
        .run(mode, &config.session, curve, &cancel)
        .await
        .context("running session")?;
    ctrl_c.abort();
    drop(session);
    printer.await.context("progress printer")?;

    println!("{}", serde_json::to_string(&OutcomeReport::from(&outcome))?);
    if outcome.committed_brightness().is_some() {
        Ok(ExitCode::from(0))
    } else {
        Ok(ExitCode::from(2))
    }
}

async fn run_devices(config: AppConfig) -> Result<ExitCode> {
    let engine = EngineHandle::with_linux_devices(config).context("opening sensor devices")?;
    engine
        .activate_configured_profile()
        .context("activating profiles.active_profile")?;
    engine.start_scheduler().await.context("starting scheduler")?;

    let mut telemetry = engine.subscribe_telemetry();
    let printer = tokio::spawn(async move {
        while let Ok(event) = telemetry.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("{json}");
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    log::info!("[Cli] Ctrl-C received, stopping");
    engine.stop_scheduler().await;
    printer.abort();
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct InterpolationLine {
    lux: f32,
    brightness: Option<u8>,
}

#[derive(Serialize)]
struct OutcomeReport {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<AggregateSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&SessionOutcome> for OutcomeReport {
    fn from(outcome: &SessionOutcome) -> Self {
        let mut report = OutcomeReport {
            outcome: "",
            brightness: None,
            snapshot: None,
            error: None,
        };
        match outcome {
            SessionOutcome::Committed {
                brightness,
                snapshot,
            } => {
                report.outcome = "committed";
                report.brightness = Some(*brightness);
                report.snapshot = Some(*snapshot);
            }
            SessionOutcome::Skipped => report.outcome = "skipped",
            SessionOutcome::ActuationFailed { brightness, error } => {
                report.outcome = "actuation_failed";
                report.brightness = Some(*brightness);
                report.error = Some(error.to_string());
            }
            SessionOutcome::TimedOut { .. } => report.outcome = "timed_out",
            SessionOutcome::Cancelled => report.outcome = "cancelled",
        }
        report
    }
}
