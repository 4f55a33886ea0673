// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! aipipe - a metered reverse proxy for LLM APIs.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod ledger_cmd;
mod serve;
mod shutdown;

use std::path::PathBuf;

use aipipe_config::AipipeConfig;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// aipipe - a metered reverse proxy for LLM APIs.
#[derive(Parser, Debug)]
#[command(name = "aipipe", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve,
    /// Sign an access credential for an identity.
    IssueToken {
        /// Identity (email) the credential is issued to.
        email: String,
    },
    /// Print a usage report, or the whole ledger when no email is given.
    Usage {
        email: Option<String>,
        /// Window length; defaults to the identity's budget window.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Overwrite one day's recorded cost for an identity.
    SetCost {
        email: String,
        cost: f64,
        /// Day to overwrite (YYYY-MM-DD, UTC). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> AipipeConfig {
    let loaded = match path {
        Some(path) => aipipe_config::load_and_validate_path(path),
        None => aipipe_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            aipipe_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::IssueToken { email }) => ledger_cmd::issue_token(&config, &email),
        Some(Commands::Usage { email, days }) => {
            ledger_cmd::usage(&config, email.as_deref(), days).await
        }
        Some(Commands::SetCost { email, cost, date }) => {
            ledger_cmd::set_cost(&config, &email, cost, date).await
        }
        Some(Commands::CheckConfig) => {
            eprintln!(
                "aipipe: config ok ({}:{}, {} budget entries)",
                config.server.host,
                config.server.port,
                config.budget.len()
            );
            Ok(())
        }
        None => {
            println!("aipipe: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn set_cost_parses_date() {
        let cli = Cli::try_parse_from([
            "aipipe",
            "set-cost",
            "user@example.com",
            "0.5",
            "--date",
            "2026-01-31",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::SetCost { email, cost, date }) => {
                assert_eq!(email, "user@example.com");
                assert_eq!(cost, 0.5);
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 31));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["aipipe", "check-config", "--config", "/tmp/a.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
    }
}
