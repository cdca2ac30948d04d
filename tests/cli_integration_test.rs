//! CLI integration tests.
//!
//! Tests cover:
//! - Loading INI files from disk into typed run parameters
//! - `validate`, `list`, `backtest`, `optimize` and `scan` commands end to end
//!   over CSV files
//! - Exit codes for configuration and data failures

mod common;

use clap::Parser;
use common::*;
use dailyquant::adapters::file_config_adapter::FileConfigAdapter;
use dailyquant::cli::{self, Cli};
use dailyquant::domain::config_validation::{load_backtest_config, load_run_settings, load_strategy};
use dailyquant::domain::error::QuantError;
use dailyquant::domain::strategy::{Preset, StopRule};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn run_args(args: &[&str]) -> ExitCode {
    let mut argv = vec!["dailyquant"];
    argv.extend_from_slice(args);
    cli::run(Cli::try_parse_from(argv).unwrap())
}

// ExitCode has no PartialEq; compare the debug form.
fn same_code(actual: ExitCode, expected: u8) -> bool {
    format!("{actual:?}") == format!("{:?}", ExitCode::from(expected))
}

fn ini_for(data_dir: &Path, output_dir: &Path, extra_strategy: &str) -> String {
    format!(
        r#"
[backtest]
initial_capital = 100000
commission_rate = 0.0003
risk_free_rate = 0.03
lot_size = 100
min_bars = 100
win_rate = trades
parallel = true

[data]
directory = {}

[strategy]
preset = dual_moving_average
{}

[report]
directory = {}
bar_records = true
"#,
        data_dir.display(),
        extra_strategy,
        output_dir.display()
    )
}

mod config_loading {
    use super::*;

    #[test]
    fn full_file_loads() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = ini_for(dir.path(), &dir.path().join("out"), "stop_loss = 0.05");
        let file = write_temp_ini(&ini);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();

        let bt = load_backtest_config(&adapter).unwrap();
        assert_eq!(bt.initial_capital, 100_000.0);
        assert_eq!(bt.lot_size, 100);

        let strategy = load_strategy(&adapter, None).unwrap();
        assert_eq!(strategy.preset, Preset::DualMovingAverage);
        assert_eq!(strategy.exits.stop, StopRule::Percent(0.05));

        let settings = load_run_settings(&adapter).unwrap();
        assert_eq!(settings.data_dir, dir.path());
        assert!(settings.bar_records);
        assert!(settings.parallel);
    }

    #[test]
    fn missing_file_is_config_parse_error() {
        let err = cli::load_config(Path::new("/nonexistent/path/config.ini"))
            .err()
            .unwrap();
        assert!(matches!(err, QuantError::ConfigParse { .. }));
    }
}

mod commands {
    use super::*;

    fn seed_data(dir: &Path) {
        write_csv(dir, "600519", &wave_bars(300, 40.0));
        write_csv(dir, "000001", &wave_bars(260, 12.0));
        write_csv(dir, "300750", &wave_bars(40, 80.0));
    }

    #[test]
    fn validate_accepts_good_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = write_temp_ini(&ini_for(dir.path(), dir.path(), ""));
        let code = run_args(&["validate", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 0));
    }

    #[test]
    fn validate_rejects_bad_value_with_config_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = write_temp_ini(&ini_for(dir.path(), dir.path(), "fast_period = 50"));
        let code = run_args(&["validate", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 2));
    }

    #[test]
    fn list_succeeds_on_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        seed_data(dir.path());
        let code = run_args(&["list", "--data", dir.path().to_str().unwrap()]);
        assert!(same_code(code, 0));
    }

    #[test]
    fn backtest_writes_reports() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let file = write_temp_ini(&ini_for(data.path(), out.path(), ""));

        let code = run_args(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 0));

        let results =
            std::fs::read_to_string(out.path().join("dual_moving_average_results.csv")).unwrap();
        let rows: Vec<&str> = results.lines().collect();
        assert_eq!(rows.len(), 3, "header plus two successful instruments");
        assert!(rows[1].starts_with("000001,"));
        assert!(rows[2].starts_with("600519,"));

        let summary =
            std::fs::read_to_string(out.path().join("dual_moving_average_summary.txt")).unwrap();
        assert!(summary.contains("Instruments attempted: 3"));
        assert!(summary.contains("300750"));

        assert!(out.path().join("600519_bars.csv").exists());
        assert!(out.path().join("600519_trades.csv").exists());
        assert!(!out.path().join("300750_bars.csv").exists());
    }

    #[test]
    fn backtest_overrides_preset_and_instruments() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let file = write_temp_ini(&ini_for(data.path(), data.path(), ""));

        let code = run_args(&[
            "backtest",
            "--config",
            file.path().to_str().unwrap(),
            "--strategy",
            "box_breakout",
            "--output",
            out.path().to_str().unwrap(),
            "--instrument",
            "600519",
            "--sequential",
        ]);
        assert!(same_code(code, 0));

        let results =
            std::fs::read_to_string(out.path().join("box_breakout_results.csv")).unwrap();
        assert_eq!(results.lines().count(), 2);
    }

    #[test]
    fn backtest_with_no_usable_instrument_fails() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        write_csv(data.path(), "300750", &wave_bars(40, 80.0));
        let file = write_temp_ini(&ini_for(data.path(), out.path(), ""));

        let code = run_args(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 5));
        assert!(!out.path().join("dual_moving_average_results.csv").exists());
    }

    #[test]
    fn backtest_with_empty_directory_is_data_error() {
        let data = tempfile::TempDir::new().unwrap();
        let file = write_temp_ini(&ini_for(data.path(), data.path(), ""));

        let code = run_args(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 3));
    }

    #[test]
    fn backtest_groups_results_by_sector() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        let meta = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let sectors = meta.path().join("sectors.csv");
        std::fs::write(&sectors, "code,industry\n600519,beverages\n").unwrap();
        let mut ini = ini_for(data.path(), out.path(), "");
        ini.push_str(&format!("sectors = {}\n", sectors.display()));
        let file = write_temp_ini(&ini);

        let code = run_args(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 0));

        let csv =
            std::fs::read_to_string(out.path().join("dual_moving_average_sectors.csv")).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().any(|r| r.starts_with("beverages,1,")));
        assert!(rows.iter().any(|r| r.starts_with("unknown,1,")));
    }

    #[test]
    fn optimize_writes_ranked_grid() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let mut ini = ini_for(data.path(), out.path(), "");
        ini.push_str("\n[optimize]\nfast_period = 5, 10\nslow_period = 20, 30\n");
        let file = write_temp_ini(&ini);

        let code = run_args(&[
            "optimize",
            "--config",
            file.path().to_str().unwrap(),
            "--instrument",
            "600519",
            "--top",
            "2",
        ]);
        assert!(same_code(code, 0));

        let csv = std::fs::read_to_string(
            out.path().join("dual_moving_average_600519_optimize.csv"),
        )
        .unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 5, "header plus four combinations");
        assert!(rows[0].starts_with("rank,fast_period,slow_period,"));
        assert!(rows[1].starts_with("1,"));
    }

    #[test]
    fn optimize_rejects_short_series() {
        let data = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let file = write_temp_ini(&ini_for(data.path(), data.path(), ""));
        let code = run_args(&[
            "optimize",
            "--config",
            file.path().to_str().unwrap(),
            "--instrument",
            "300750",
        ]);
        assert!(same_code(code, 5));
    }

    #[test]
    fn scan_writes_row_per_instrument_and_preset() {
        let data = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        seed_data(data.path());
        let file = write_temp_ini(&ini_for(data.path(), out.path(), ""));

        let code = run_args(&["scan", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, 0));

        let csv = std::fs::read_to_string(out.path().join("batch_summary.csv")).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 1 + 2 * Preset::ALL.len(), "300750 is too short");
        assert!(rows[1].starts_with("000001,moving_average,"));
        assert!(rows[7].starts_with("600519,moving_average,"));
    }

    #[test]
    fn unknown_preset_rejected_by_parser() {
        let parsed = Cli::try_parse_from([
            "dailyquant",
            "backtest",
            "--config",
            "x.ini",
            "--strategy",
            "turtle",
        ]);
        assert!(parsed.is_err());
    }
}
