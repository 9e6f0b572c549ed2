use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use triggerengine::{PatternGenerator, ProbePolicy, SchedPolicy, TriggerConfig};

#[derive(Parser, Debug, Clone)]
#[command(about = "Hardware trigger square wave on GPIO lines")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long, env = "SIGGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Label of the GPIO controller to drive
    #[arg(long, env = "SIGGEN_LABEL")]
    label: Option<String>,

    /// Line offset(s) on the controller, comma separated
    #[arg(long = "line", env = "SIGGEN_LINE", value_delimiter = ',')]
    lines: Vec<u32>,

    /// Period in seconds
    #[arg(long, env = "SIGGEN_PERIOD")]
    period: Option<f64>,

    /// Fraction of the period the lines are held high
    #[arg(long, env = "SIGGEN_DUTY")]
    duty: Option<f64>,

    /// Normalized realtime priority in [0, 1]
    #[arg(long, env = "SIGGEN_PRIORITY")]
    priority: Option<f64>,

    /// Use SCHED_FIFO instead of SCHED_RR
    #[arg(long)]
    fifo: bool,

    /// Keep probing past controllers that fail to open
    #[arg(long)]
    skip_failed_probes: bool,

    /// Run without memory lock and realtime scheduling
    #[arg(long)]
    no_elevate: bool,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(long, env = "SIGGEN_RUN_FOR")]
    run_for: Option<f64>,
}

fn build_config(args: &Args) -> Result<TriggerConfig> {
    let mut config = match &args.config {
        Some(path) => TriggerConfig::from_json_file(path)?,
        None => TriggerConfig::default(),
    };

    if let Some(label) = &args.label {
        config.controller_label = label.clone();
    }
    if !args.lines.is_empty() {
        config.lines = args.lines.clone();
    }
    if let Some(period) = args.period {
        config.period = period;
    }
    if let Some(duty) = args.duty {
        config.duty_cycle = duty;
    }
    if let Some(priority) = args.priority {
        config.realtime.priority = priority;
    }
    if args.fifo {
        config.realtime.policy = SchedPolicy::Fifo;
    }
    if args.skip_failed_probes {
        config.probe.policy = ProbePolicy::SkipFailedOpens;
    }
    if args.no_elevate {
        config.realtime.elevate = false;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let run_for = args
        .run_for
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid --run-for")?;

    let mut generator = PatternGenerator::new(config.clone());
    generator
        .open_configured()
        .context("HW triggering failed to start")?;
    generator.generate_square_wave()?;
    log::info!(
        "Hardware triggering is configured as; period: {}, duty cycle: {}",
        config.period,
        config.duty_cycle
    );

    let handle = generator.spawn()?;

    match run_for {
        Some(duration) => std::thread::sleep(duration),
        None => {
            println!("Press enter to exit.");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
        }
    }

    log::info!("Stopping hw trigger signal.");
    let stats = handle.stop_and_join()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
