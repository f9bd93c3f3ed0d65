use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::auth::{AuthGate, OidcProvider};
use crate::config;
use crate::domain::score::Score;
use crate::http::server::HttpServer;
use crate::storage::operations::ScoreStore;

#[derive(Parser)]
#[command(name = "scoredeck")]
#[command(version = "0.1")]
#[command(about = "Catalog manager for musical scores")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server hosting the catalog
    Serve,
    /// List all scores in the catalog
    List,
    /// Find scores whose title contains a fragment (case-sensitive)
    Search {
        /// Title fragment to look for
        fragment: String,
    },
}

fn print_score(score: &Score) {
    println!(
        "[{}] {} | no. {} | composer: {} | arranger: {}",
        score.id,
        score.title,
        score.number.as_deref().unwrap_or("-"),
        score.composer.as_deref().unwrap_or("-"),
        score.arranger.as_deref().unwrap_or("-"),
    );
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::Config::load(&cli.config)?;
    let storage = ScoreStore::new(&cfg.database).context("Failed to initialize storage")?;

    match &cli.command {
        Commands::Serve => {
            println!("Starting HTTP server...");

            let provider =
                OidcProvider::discover(&cfg.oidc).context("Failed to set up identity provider")?;
            let gate = AuthGate::new(Box::new(provider), cfg.session.ttl());
            let http_server = HttpServer::new(storage, gate, cfg.http, cfg.session);

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::List => {
            let scores = storage.list_all()?;
            println!("Catalog contains {} scores", scores.len());
            for score in &scores {
                print_score(score);
            }
        }

        Commands::Search { fragment } => {
            let scores = storage.search_by_title(fragment)?;
            if scores.is_empty() {
                println!("No score title contains \"{fragment}\"");
            }
            for score in &scores {
                print_score(score);
            }
        }
    }
    Ok(())
}
