//! Matchgate daemon - session and matchmaking credential service
//!
//! `matchgated` serves the signup/login/info/cancel/submit API. The
//! `issue-result` subcommand mints a game-result credential with the shared
//! secret, the way a trusted game server would.

use chrono::Duration;
use clap::{Parser, Subcommand};
use matchgate_credential::CredentialAuthority;
use matchgate_daemon::error::{DaemonError, DaemonResult};
use matchgate_daemon::{DaemonConfig, Server};
use matchgate_types::{CredentialKind, GameOutcome, PlayerId, SessionId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Matchgate daemon CLI
#[derive(Parser)]
#[command(name = "matchgated")]
#[command(about = "Matchgate - session and matchmaking credential daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MATCHGATE_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "MATCHGATE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "MATCHGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MATCHGATE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP daemon (default)
    Serve,

    /// Mint a game-result credential and print it
    IssueResult {
        /// Player the credential is issued to
        #[arg(long)]
        pid: u64,

        /// Session the result belongs to
        #[arg(long)]
        session: u64,

        /// Both players, comma separated
        #[arg(long, value_delimiter = ',')]
        players: Vec<u64>,

        /// Both scores in player order, comma separated
        #[arg(long, value_delimiter = ',')]
        scores: Vec<f64>,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 300)]
        ttl_secs: i64,
    },
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                listen = %config.server.listen_addr,
                storage = ?config.storage,
                "starting matchgate daemon"
            );
            let server = Server::new(config).await?;
            server.run().await
        }
        Commands::IssueResult {
            pid,
            session,
            players,
            scores,
            ttl_secs,
        } => {
            let token = issue_result(&config, pid, session, &players, &scores, ttl_secs)?;
            println!("{}", token);
            Ok(())
        }
    }
}

fn issue_result(
    config: &DaemonConfig,
    pid: u64,
    session: u64,
    players: &[u64],
    scores: &[f64],
    ttl_secs: i64,
) -> DaemonResult<String> {
    let (&[a, b], &[score_a, score_b]) = (players, scores) else {
        return Err(DaemonError::Config(
            "--players and --scores each take exactly two values".to_string(),
        ));
    };
    let ttl = Duration::try_seconds(ttl_secs)
        .filter(|ttl| *ttl > Duration::zero())
        .ok_or_else(|| DaemonError::Config("--ttl-secs must be positive".to_string()))?;
    if config.credentials.secret.is_empty() {
        return Err(DaemonError::Config("credentials.secret must be set".to_string()));
    }

    let authority = CredentialAuthority::new(config.credentials.secret.as_bytes())?;
    let signed = authority.issue(
        CredentialKind::GameResult {
            pid: PlayerId(pid),
            session_id: SessionId(session),
            outcome: GameOutcome::new([PlayerId(a), PlayerId(b)], [score_a, score_b]),
        },
        Some(ttl),
    )?;
    Ok(signed.token)
}
