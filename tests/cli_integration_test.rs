//! CLI integration tests for config loading and the run pipeline.
//!
//! Tests cover:
//! - Config loading from real INI files on disk
//! - The full pipeline: INI + CSV history -> engine -> metrics
//! - Command-line overrides for history, jobs and sequential mode
//! - CSV report output
//! - Exit codes for validate and run

mod common;

use common::*;
use fxtrader::cli::{self, Cli, Command, RunOverrides};
use fxtrader::domain::arithmetic::Backend;
use fxtrader::domain::error::FxError;
use fxtrader::domain::run_result::RunStatus;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const RATES_CSV: &str = "date,EUR/USD,volume:EUR/USD\n\
2024-01-01,1.1000,100\n\
2024-01-02,1.1050,110\n\
2024-01-03,1.0980,90\n\
2024-01-04,1.1020,95\n\
2024-01-05,1.1100,120\n\
2024-01-08,1.1150,130\n\
2024-01-09,1.1080,100\n\
2024-01-10,1.1000,105\n\
2024-01-11,1.0950,115\n\
2024-01-12,1.1010,100\n";

fn config_ini(history: &Path, extra_engine: &str) -> String {
    format!(
        r#"
[arithmetic]
backend = fast_decimal
precision = 24
max_fraction_digits = 8
rounding_mode = half_even

[engine]
base_currency = USD
initial_deposit = 10000
window_size = 3
step_size = 1
{extra_engine}

[data]
history = {}

[metrics]
risk_free_rate = 0.01

[strategies]
names = trend, hold

[strategy.trend]
kind = sma_crossover
pair = EUR/USD
fast = 2
slow = 3
fraction = 0.5

[strategy.hold]
kind = buy_and_hold
pair = EUR/USD
"#,
        history.display()
    )
}

fn exit_report(code: ExitCode) -> String {
    format!("{code:?}")
}

fn assert_exit(code: ExitCode, expected: u8) {
    assert_eq!(exit_report(code), exit_report(ExitCode::from(expected)));
}

mod config_loading {
    use super::*;

    #[test]
    fn loads_config_from_disk() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));

        let config = cli::load_config(ini.path()).unwrap();

        assert_eq!(config.arithmetic.backend, Backend::FastDecimal);
        assert_eq!(config.history_path, Some(PathBuf::from(csv.path())));
        assert_eq!(config.strategies.len(), 2);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = cli::load_config(Path::new("/nonexistent/path/config.ini")).unwrap_err();
        assert!(matches!(err, FxError::ConfigParse { .. }));
    }
}

mod pipeline {
    use super::*;

    #[test]
    fn runs_every_strategy() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let config = cli::load_config(ini.path()).unwrap();

        let outcome = cli::run_pipeline(&config, &RunOverrides::default()).unwrap();

        let ids: Vec<&str> = outcome.results.ids().collect();
        assert_eq!(ids, vec!["trend", "hold"]);
        assert_eq!(outcome.metrics.len(), 2);
        for result in &outcome.results {
            assert_eq!(result.status, RunStatus::Completed);
            assert_eq!(result.windows_processed, 8);
            assert_eq!(result.equity_curve.len(), 8);
        }
        let hold = &outcome.metrics[1];
        assert_eq!(hold.strategy_id, "hold");
        assert_eq!(hold.executed_trades, 1);
        assert!(hold.final_equity.is_some());
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let config = cli::load_config(ini.path()).unwrap();

        let sequential = cli::run_pipeline(
            &config,
            &RunOverrides {
                sequential: true,
                ..RunOverrides::default()
            },
        )
        .unwrap();
        let parallel = cli::run_pipeline(
            &config,
            &RunOverrides {
                jobs: Some(2),
                ..RunOverrides::default()
            },
        )
        .unwrap();

        assert_eq!(sequential.results, parallel.results);
        assert_eq!(render(&sequential.results), render(&parallel.results));
        assert_eq!(sequential.metrics, parallel.metrics);
    }

    #[test]
    fn history_override_wins() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let short = write_temp_file(".csv", "EUR/USD\n1.1\n1.2\n1.3\n");
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let config = cli::load_config(ini.path()).unwrap();

        let outcome = cli::run_pipeline(
            &config,
            &RunOverrides {
                history: Some(short.path().to_path_buf()),
                ..RunOverrides::default()
            },
        )
        .unwrap();

        assert_eq!(outcome.results.get("hold").unwrap().windows_processed, 1);
    }

    #[test]
    fn range_beyond_history_is_an_engine_error() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), "end_index = 50"));
        let config = cli::load_config(ini.path()).unwrap();

        let err = cli::run_pipeline(&config, &RunOverrides::default()).unwrap_err();
        assert!(matches!(err, FxError::Engine(_)));
    }

    #[test]
    fn bad_history_is_a_data_error() {
        let csv = write_temp_file(".csv", "EUR/USD\n1.1\nnot-a-price\n");
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let config = cli::load_config(ini.path()).unwrap();

        let err = cli::run_pipeline(&config, &RunOverrides::default()).unwrap_err();
        assert!(matches!(err, FxError::Data { .. }));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_accepts_valid_config() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        assert_exit(cli::run_validate(ini.path()), 0);
    }

    #[test]
    fn logging_can_be_initialized_twice() {
        cli::init_logging("debug");
        cli::init_logging("info");
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        assert_exit(cli::run_validate(ini.path()), 0);
    }

    #[test]
    fn validate_rejects_invalid_config() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), "window_size = 0"));
        assert_exit(cli::run_validate(ini.path()), 2);
    }

    #[test]
    fn run_writes_csv_report() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("report.csv");

        let code = cli::run(Cli {
            command: Command::Run {
                config: ini.path().to_path_buf(),
                history: None,
                output: Some(output.clone()),
                sequential: true,
                jobs: None,
                log_level: "warn".to_string(),
            },
        });

        assert_exit(code, 0);
        let report = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("trend,completed,8,"), "{}", lines[1]);
        assert!(lines[2].starts_with("hold,completed,8,1,0,"), "{}", lines[2]);
    }

    #[test]
    fn reports_are_byte_identical_across_modes() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let dir = tempfile::TempDir::new().unwrap();
        let mut reports = Vec::new();
        for (i, (sequential, jobs)) in [(true, None), (false, Some(3)), (false, Some(1))]
            .into_iter()
            .enumerate()
        {
            let output = dir.path().join(format!("report-{i}.csv"));
            let code = cli::run(Cli {
                command: Command::Run {
                    config: ini.path().to_path_buf(),
                    history: None,
                    output: Some(output.clone()),
                    sequential,
                    jobs,
                    log_level: "warn".to_string(),
                },
            });
            assert_exit(code, 0);
            reports.push(std::fs::read(&output).unwrap());
        }
        assert_eq!(reports[0], reports[1]);
        assert_eq!(reports[0], reports[2]);
    }

    #[test]
    fn run_without_history_exits_with_config_code() {
        let ini = write_temp_file(
            ".ini",
            "[engine]\nbase_currency = USD\ninitial_deposit = 100\n\
             [strategies]\nnames = hold\n\
             [strategy.hold]\nkind = buy_and_hold\npair = EUR/USD\n",
        );
        let code = cli::run(Cli {
            command: Command::Run {
                config: ini.path().to_path_buf(),
                history: None,
                output: None,
                sequential: true,
                jobs: None,
                log_level: "warn".to_string(),
            },
        });
        assert_exit(code, 2);
    }

    #[test]
    fn zero_jobs_exits_with_engine_code() {
        let csv = write_temp_file(".csv", RATES_CSV);
        let ini = write_temp_file(".ini", &config_ini(csv.path(), ""));
        let code = cli::run(Cli {
            command: Command::Run {
                config: ini.path().to_path_buf(),
                history: None,
                output: None,
                sequential: false,
                jobs: Some(0),
                log_level: "warn".to_string(),
            },
        });
        assert_exit(code, 4);
    }
}
