//! Issue Triage CLI: GitHub issue triage with an MCP server.
//!
//! Usage:
//!   issue-triage mcp [--transport stdio]
//!   issue-triage triage <owner> <repo> <number>
//!   issue-triage batch <owner> <repo> [--dry-run] [--limit N]
//!   issue-triage stats <owner> <repo>
//!   issue-triage rank <owner> <repo> [--label L]... [--limit N]

use clap::{Args, Parser, Subcommand};
use issue_triage::mcp::{error_payload, repo_ref, run_mcp_server};
use issue_triage::oracle::{DEFAULT_ANTHROPIC_API, DEFAULT_MODEL};
use issue_triage::store::DEFAULT_GITHUB_API;
use issue_triage::{
    fetch_repo_stats, find_contributor_issues, BatchOptions, GitHubConfig, OracleConfig, RetryPolicy,
    Triage, TriageConfig, TriageError,
};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "issue-triage",
    version,
    about = "Classify, label and rank GitHub issues"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log filter used when RUST_LOG is not set (logs go to stderr)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// GitHub token with read/write access to issues
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    /// GitHub REST API base URL
    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_GITHUB_API)]
    github_api: String,
    /// Anthropic API key for the classifier
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
    /// Anthropic Messages API URL
    #[arg(long, global = true, env = "ANTHROPIC_API_URL", default_value = DEFAULT_ANTHROPIC_API)]
    anthropic_api: String,
    /// Model used for classification
    #[arg(long, global = true, env = "TRIAGE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, global = true, env = "TRIAGE_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,
    /// Attempts per remote call when rate limited (including the first)
    #[arg(long, global = true, env = "TRIAGE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,
    /// Backoff before the first retry, doubled for each retry after
    #[arg(long, global = true, env = "TRIAGE_RETRY_BASE_MS", default_value_t = 1000)]
    retry_base_ms: u64,
    /// Pause between classifier calls in batch mode
    #[arg(long, global = true, env = "TRIAGE_BATCH_DELAY_MS", default_value_t = 2000)]
    batch_delay_ms: u64,
    /// Default number of issues a batch run processes (1-100)
    #[arg(long, global = true, env = "TRIAGE_BATCH_LIMIT", default_value_t = 100)]
    batch_limit: usize,
    /// Days without updates before an issue counts as stale (1-36500)
    #[arg(
        long,
        global = true,
        env = "TRIAGE_STALE_DAYS",
        default_value_t = 30,
        value_parser = clap::value_parser!(i64).range(1..=36_500)
    )]
    stale_days: i64,
}

impl Settings {
    fn into_config(self) -> TriageConfig {
        let defaults = TriageConfig::default();
        TriageConfig {
            github: GitHubConfig {
                token: self.github_token,
                api_base: self.github_api,
                ..defaults.github
            },
            oracle: OracleConfig {
                api_key: self.anthropic_api_key,
                model: self.model,
                api_url: self.anthropic_api,
                max_tokens: self.max_tokens,
                ..defaults.oracle
            },
            retry: RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_base_ms)),
            batch: BatchOptions::default()
                .with_limit(self.batch_limit)
                .with_delay(Duration::from_millis(self.batch_delay_ms)),
            stale_after_days: self.stale_days,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP (Model Context Protocol) server
    Mcp {
        /// Transport type (currently only stdio)
        #[arg(long, default_value = "stdio")]
        transport: String,
    },
    /// Classify one issue, sync its labels and post the analysis comment
    Triage {
        owner: String,
        repo: String,
        number: u64,
    },
    /// Classify and label open issues in sequence
    Batch {
        owner: String,
        repo: String,
        /// Report what would change without touching labels
        #[arg(long)]
        dry_run: bool,
        /// Number of open issues to process (1-100)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Label and staleness statistics for open issues
    Stats { owner: String, repo: String },
    /// Rank unassigned issues for a new contributor
    Rank {
        owner: String,
        repo: String,
        /// Only issues carrying this label (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize output: {}", e);
            1
        }
    }
}

fn report_error(e: TriageError) -> i32 {
    if !e.is_controlled() {
        tracing::error!(error = ?e, "unexpected failure");
    }
    match serde_json::to_string_pretty(&error_payload(&e)) {
        Ok(text) => eprintln!("{}", text),
        Err(_) => eprintln!("Error: {}", e),
    }
    1
}

async fn run_command(triage: Triage, config: &TriageConfig, command: Commands) -> Result<i32, TriageError> {
    match command {
        Commands::Mcp { transport } => {
            if transport != "stdio" {
                return Err(TriageError::InvalidInput(
                    "only 'stdio' transport is currently supported".to_string(),
                ));
            }
            Ok(run_mcp_server(triage, config).await)
        }
        Commands::Triage { owner, repo, number } => {
            let repo = repo_ref(&owner, &repo)?;
            let outcome = triage.triage_issue(&repo, number).await?;
            Ok(print_json(&outcome))
        }
        Commands::Batch {
            owner,
            repo,
            dry_run,
            limit,
        } => {
            let repo = repo_ref(&owner, &repo)?;
            let mut options = config.batch.clone().dry_run(dry_run);
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            let summary = triage.batch_triage(&repo, &options).await?;
            eprint!("{}", summary.report());
            Ok(print_json(&summary))
        }
        Commands::Stats { owner, repo } => {
            let repo = repo_ref(&owner, &repo)?;
            let stats = fetch_repo_stats(triage.store(), &repo, config.stale_after_days).await?;
            Ok(print_json(&stats))
        }
        Commands::Rank {
            owner,
            repo,
            labels,
            limit,
        } => {
            let repo = repo_ref(&owner, &repo)?;
            let ranked = find_contributor_issues(triage.store(), &repo, labels, limit.max(1)).await?;
            Ok(print_json(&ranked))
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config = cli.settings.into_config();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    let triage = match config.build_engine() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = rt
        .block_on(run_command(triage, &config, cli.command))
        .unwrap_or_else(report_error);
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(["issue-triage"].iter().chain(args))
    }

    #[test]
    fn stale_days_flag_is_range_checked() {
        assert!(parse(&["--stale-days", "0", "stats", "acme", "widgets"]).is_err());
        assert!(parse(&["--stale-days=-5", "stats", "acme", "widgets"]).is_err());
        assert!(parse(&["--stale-days", "1000000000", "stats", "acme", "widgets"]).is_err());

        let cli = parse(&["stats", "acme", "widgets", "--stale-days", "90"]).unwrap();
        assert_eq!(cli.settings.into_config().stale_after_days, 90);
    }
}
