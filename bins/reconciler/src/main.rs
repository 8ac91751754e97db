//! Operator CLI for the Saldo ledger.
//!
//! Every command prints its result as JSON on stdout. Logs go to stderr.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use saldo_core::{Ledger, LedgerError, LedgerOptions, SystemClock};
use saldo_db::PgLedgerStore;
use saldo_shared::AppConfig;
use saldo_shared::config::LoggingConfig;
use saldo_shared::types::AccountingPeriodId;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type PgLedger = Ledger<PgLedgerStore, SystemClock>;

#[derive(Parser)]
#[command(name = "saldo")]
#[command(about = "Ledger consistency checks and period closing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare stored balances with the journal; exits 1 on drift
    Verify,
    /// Rewrite drifted balances from the journal with an audit record
    Repair {
        /// Why the repair is needed (stored with every correction)
        #[arg(long)]
        reason: String,
    },
    /// Check Assets = Liabilities + Equity
    Equation,
    /// Per-account debit and credit columns
    TrialBalance,
    /// List accounting periods
    Periods,
    /// Show what closing a range would post
    Preview {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Close revenue and expense into retained earnings
    Close {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Reopen a closed period by reversing its closing entry
    Reopen {
        period_id: AccountingPeriodId,
        #[arg(long)]
        reason: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    let db = saldo_db::connect_with(&config.database).await?;
    let lock_timeout = Duration::from_millis(config.ledger.lock_timeout_ms);
    let ledger = Ledger::new(
        PgLedgerStore::new(db, lock_timeout),
        SystemClock::new(config.ledger.timezone),
        LedgerOptions::from(&config.ledger),
    );
    info!("Connected to database");

    let mutates_periods = matches!(cli.command, Command::Close { .. } | Command::Reopen { .. });
    if mutates_periods && config.ledger.verify_on_startup {
        if let Err(err) = ledger.verify().await {
            error!(%err, "refusing to change periods while balances have drifted");
            return report_failure(&err);
        }
    }

    match run(&ledger, cli.command).await {
        Ok(code) => Ok(code),
        Err(err) => match err.downcast_ref::<LedgerError>() {
            Some(ledger_err) => report_failure(ledger_err),
            None => Err(err),
        },
    }
}

async fn run(ledger: &PgLedger, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Verify => {
            let report = ledger.reconcile().await?;
            print_json(&report)?;
            if !report.is_consistent() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Repair { reason } => print_json(&ledger.repair_balances(&reason).await?)?,
        Command::Equation => {
            let equation = ledger.accounting_equation().await?;
            print_json(&equation)?;
            if !equation.holds() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::TrialBalance => print_json(&ledger.trial_balance().await?)?,
        Command::Periods => print_json(&ledger.periods().await?)?,
        Command::Preview { start, end } => print_json(&ledger.preview_close(start, end).await?)?,
        Command::Close {
            start,
            end,
            description,
        } => print_json(&ledger.close_period(start, end, &description).await?)?,
        Command::Reopen { period_id, reason } => {
            print_json(&ledger.reopen_period(period_id, &reason).await?)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct Failure<'a> {
    error_code: &'a str,
    message: String,
    retryable: bool,
}

fn report_failure(err: &LedgerError) -> anyhow::Result<ExitCode> {
    print_json(&Failure {
        error_code: err.error_code(),
        message: err.to_string(),
        retryable: err.is_retryable(),
    })?;
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_close_dates() {
        let cli = Cli::try_parse_from([
            "saldo", "close", "--start", "2026-01-01", "--end", "2026-01-31",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Close { start, .. } if start == NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        ));
    }

    #[test]
    fn test_repair_requires_reason() {
        assert!(Cli::try_parse_from(["saldo", "repair"]).is_err());
    }
}
