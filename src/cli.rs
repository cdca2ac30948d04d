//! CLI definition and dispatch.

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvAdapter, load_sector_map};
use crate::adapters::csv_report_adapter::{
    CsvReportAdapter, render_optimization, render_scan, render_summary,
};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    load_backtest_config, load_run_settings, load_strategy, RunSettings,
};
use crate::domain::error::QuantError;
use crate::domain::metrics::sector_breakdown;
use crate::domain::optimize::{ParameterGrid, optimize};
use crate::domain::scan::run_scan;
use crate::domain::strategy::Preset;
use crate::domain::universe::run_batch;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "dailyquant", about = "Daily-bar strategy backtester")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest one strategy over a set of instruments
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Preset name, overriding [strategy] preset
        #[arg(short, long, value_parser = clap::builder::PossibleValuesParser::new(preset_names()))]
        strategy: Option<String>,
        /// Data directory, overriding [data] directory
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Restrict the run to these instruments (repeatable)
        #[arg(short, long = "instrument")]
        instruments: Vec<String>,
        /// Run instruments one at a time
        #[arg(long)]
        sequential: bool,
    },
    /// Grid-search strategy parameters on one instrument
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Preset name, overriding [strategy] preset
        #[arg(short, long, value_parser = clap::builder::PossibleValuesParser::new(preset_names()))]
        strategy: Option<String>,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        instrument: String,
        /// Combinations to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Score combinations one at a time
        #[arg(long)]
        sequential: bool,
    },
    /// Run every preset over a set of instruments and report last-bar positions
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Restrict the scan to these instruments (repeatable)
        #[arg(short, long = "instrument")]
        instruments: Vec<String>,
        #[arg(long)]
        sequential: bool,
    },
    /// Validate a configuration file without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List instruments available in a data directory
    List {
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Install the stderr fmt subscriber. `RUST_LOG` applies unless `-v` was given.
pub fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Backtest {
            config,
            strategy,
            data,
            output,
            instruments,
            sequential,
        } => run_backtest(&RunArgs {
            config,
            strategy,
            data,
            output,
            instruments,
            sequential,
        }),
        Command::Optimize {
            config,
            strategy,
            data,
            output,
            instrument,
            top,
            sequential,
        } => run_optimize(
            &RunArgs {
                config,
                strategy,
                data,
                output,
                instruments: vec![instrument],
                sequential,
            },
            top,
        ),
        Command::Scan {
            config,
            data,
            output,
            instruments,
            sequential,
        } => run_scan_command(&RunArgs {
            config,
            strategy: None,
            data,
            output,
            instruments,
            sequential,
        }),
        Command::Validate { config } => run_validate(&config),
        Command::List { data } => run_list(data),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

struct RunArgs {
    config: PathBuf,
    strategy: Option<String>,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    instruments: Vec<String>,
    sequential: bool,
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, QuantError> {
    FileConfigAdapter::from_file(path)
}

/// Fold command-line overrides into the configured run settings.
fn apply_overrides(mut settings: RunSettings, args: &RunArgs) -> RunSettings {
    if let Some(dir) = &args.data {
        settings.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output {
        settings.report_dir = dir.clone();
    }
    if !args.instruments.is_empty() {
        settings.instruments = Some(args.instruments.clone());
    }
    if args.sequential {
        settings.parallel = false;
    }
    settings
}

/// Configured or listed instruments; an empty universe is a data error.
fn resolve_instruments(data: &CsvAdapter, settings: &RunSettings) -> Result<Vec<String>, QuantError> {
    let instruments = match settings.instruments.clone() {
        Some(list) => list,
        None => data.list_instruments()?,
    };
    if instruments.is_empty() {
        return Err(QuantError::Data {
            reason: format!("no instruments found in {}", settings.data_dir.display()),
        });
    }
    Ok(instruments)
}

fn run_backtest(args: &RunArgs) -> Result<(), QuantError> {
    info!(config = %args.config.display(), "loading config");
    let adapter = load_config(&args.config)?;

    let bt_config = load_backtest_config(&adapter)?;
    let strategy = load_strategy(&adapter, args.strategy.as_deref())?;
    let settings = apply_overrides(load_run_settings(&adapter)?, args);

    let data = CsvAdapter::new(settings.data_dir.clone()).with_start_date(settings.start_date);
    let instruments = resolve_instruments(&data, &settings)?;

    let mut outcome = run_batch(&data, &instruments, &strategy, &bt_config, settings.parallel)?;
    if let Some(path) = &settings.sector_file {
        let sectors = load_sector_map(path)?;
        info!(file = %path.display(), mapped = sectors.len(), "loaded sector map");
        outcome.summary.sectors = sector_breakdown(&outcome.summaries(), &sectors);
    }

    let report = CsvReportAdapter::new(settings.report_dir.clone());
    report.write_batch(strategy.name(), &outcome)?;
    if settings.bar_records {
        for result in &outcome.results {
            report.write_instrument(result)?;
        }
    }
    info!(directory = %report.output_dir().display(), "reports written");

    print!("{}", render_summary(strategy.name(), &outcome));
    Ok(())
}

fn run_optimize(args: &RunArgs, top: usize) -> Result<(), QuantError> {
    info!(config = %args.config.display(), "loading config");
    let adapter = load_config(&args.config)?;

    let bt_config = load_backtest_config(&adapter)?;
    let base = load_strategy(&adapter, args.strategy.as_deref())?;
    let settings = apply_overrides(load_run_settings(&adapter)?, args);
    let instrument = args.instruments.first().ok_or_else(|| QuantError::Data {
        reason: "no instrument given".to_string(),
    })?;

    let data = CsvAdapter::new(settings.data_dir.clone()).with_start_date(settings.start_date);
    let bars = data.load_bars(instrument)?;
    let grid = ParameterGrid::from_config(&adapter, base.preset);
    let outcome = optimize(
        instrument,
        &bars,
        base.preset,
        &grid,
        &adapter,
        &bt_config,
        settings.parallel,
    )?;

    let report = CsvReportAdapter::new(settings.report_dir.clone());
    report.write_optimization(&outcome)?;
    info!(directory = %report.output_dir().display(), "reports written");

    print!("{}", render_optimization(&outcome, top));
    Ok(())
}

fn run_scan_command(args: &RunArgs) -> Result<(), QuantError> {
    info!(config = %args.config.display(), "loading config");
    let adapter = load_config(&args.config)?;

    let bt_config = load_backtest_config(&adapter)?;
    let settings = apply_overrides(load_run_settings(&adapter)?, args);

    let data = CsvAdapter::new(settings.data_dir.clone()).with_start_date(settings.start_date);
    let instruments = resolve_instruments(&data, &settings)?;
    let outcome = run_scan(&data, &instruments, &Preset::ALL, &bt_config, settings.parallel)?;

    let report = CsvReportAdapter::new(settings.report_dir.clone());
    report.write_scan(&outcome)?;
    info!(directory = %report.output_dir().display(), "reports written");

    print!("{}", render_scan(&outcome));
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), QuantError> {
    let adapter = load_config(config_path)?;

    let bt_config = load_backtest_config(&adapter)?;
    let strategy = load_strategy(&adapter, None)?;
    let settings = load_run_settings(&adapter)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  strategy:        {}", strategy.name());
    let indicators: Vec<String> = strategy
        .required_indicators()
        .iter()
        .map(|ty| ty.to_string())
        .collect();
    println!("  indicators:      {}", indicators.join(", "));
    println!("  initial capital: {:.2}", bt_config.initial_capital);
    println!("  commission:      {}", bt_config.commission_rate);
    match bt_config.fixed_shares {
        Some(n) => println!("  sizing:          {} shares", n),
        None => println!("  sizing:          lots of {}", bt_config.lot_size),
    }
    println!("  data:            {}", settings.data_dir.display());
    match &settings.instruments {
        Some(list) => println!("  instruments:     {}", list.join(", ")),
        None => println!("  instruments:     all files in data directory"),
    }
    println!("  reports:         {}", settings.report_dir.display());
    if let Some(path) = &settings.sector_file {
        println!("  sectors:         {}", path.display());
    }
    Ok(())
}

fn run_list(data_dir: PathBuf) -> Result<(), QuantError> {
    let instruments = CsvAdapter::new(data_dir.clone()).list_instruments()?;
    if instruments.is_empty() {
        eprintln!("No instruments found in {}", data_dir.display());
    }
    for id in &instruments {
        println!("{}", id);
    }
    Ok(())
}

/// Names accepted by `--strategy`.
pub fn preset_names() -> Vec<&'static str> {
    Preset::ALL.iter().map(|p| p.name()).collect()
}
