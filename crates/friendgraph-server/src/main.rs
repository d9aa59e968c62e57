//! friendgraph: Steam friends-graph crawler and graph server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use friendgraph_core::{load_credentials, AccountId, FriendGraphConfig};
use friendgraph_runtime::{CrawlOutcome, Orchestrator};
use friendgraph_source::{CredentialStatus, SteamWebApi};

mod cli;
mod routes;
mod state;

use cli::{Command, CrawlArgs};
use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("FRIENDGRAPH_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("{}. Use 'friendgraph help' for usage.", msg);
            std::process::exit(1);
        }
    };
    if command == Command::Help {
        print!("{}", cli::USAGE);
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let mut config = FriendGraphConfig::from_env(&data_dir)?;
    if let Command::Crawl(args) = &command {
        args.apply(&mut config);
    }
    let credentials = load_credentials(&config.data_paths)?;
    let orchestrator = Orchestrator::new(&config, Arc::new(SteamWebApi::new()), credentials)?;

    match command {
        Command::Crawl(args) => run_crawl(&orchestrator, &args, config.crawl.depth_cap).await,
        Command::CheckKeys => check_keys(&orchestrator).await,
        Command::Stat { account } => {
            let profile = orchestrator.profile(&AccountId::new(account)).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }
        Command::Serve => serve(orchestrator, config.port).await,
        Command::Help => Ok(()),
    }
}

async fn run_crawl(
    orchestrator: &Orchestrator<SteamWebApi>,
    args: &CrawlArgs,
    depth_cap: u8,
) -> anyhow::Result<()> {
    let targets: Vec<AccountId> = args.targets.iter().map(AccountId::new).collect();
    let outcome = orchestrator.run(&targets, depth_cap).await?;
    print_outcome(&outcome, targets.len() == 2);
    Ok(())
}

fn print_outcome(outcome: &CrawlOutcome, paired: bool) {
    println!("Graph {} for {}", outcome.short_id, outcome.identifier);
    println!("  Document: {}", outcome.document_path.display());
    if outcome.reused {
        println!("  Existing graph reused, nothing crawled (use --force to rebuild)");
    }
    for report in &outcome.reports {
        println!();
        println!("  Root {} (depth {})", report.root, report.depth_cap);
        println!("    Total friends:   {}", report.total_friends_seen);
        println!("    Crawled friends: {}", report.reachable_friends);
        println!(
            "    Expanded:        {} ({} cached, {} fetched)",
            report.accounts_expanded, report.cache_hits, report.fetched
        );
        for (level, count) in &report.friends_per_level {
            println!("    Level {}: {}", level, count);
        }
        if !report.failures.is_empty() {
            println!("    Not crawled:     {}", report.failures.len());
        }
        for key in &report.revoked_credentials {
            println!("    Revoked key:     {}", key);
        }
    }
    if paired {
        println!();
        match &outcome.path {
            Some(path) => println!("  Path: {}", path.join(" -> ")),
            None => println!("  No path found"),
        }
    }
}

async fn check_keys(orchestrator: &Orchestrator<SteamWebApi>) -> anyhow::Result<()> {
    let checks = orchestrator.check_credentials().await;
    for check in &checks {
        let label = match check.status {
            CredentialStatus::Valid => "valid",
            CredentialStatus::Invalid => "INVALID",
            CredentialStatus::Unknown => "unknown (check failed)",
        };
        println!("  {}  {}", check.key, label);
    }
    let invalid = checks
        .iter()
        .filter(|c| c.status == CredentialStatus::Invalid)
        .count();
    println!("{} keys checked, {} invalid", checks.len(), invalid);
    Ok(())
}

async fn serve(orchestrator: Orchestrator<SteamWebApi>, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(orchestrator));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("friendgraph server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
