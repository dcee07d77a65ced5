use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

mod api;
mod commentary;
mod config;
mod db;
mod error;
mod forecast;
mod sync;

use api::cache::ResponseCache;
use api::AppState;
use commentary::{CommentaryGenerator, OllamaClient};
use config::{Command, Config};
use db::Database;
use forecast::PredictionEngine;
use sync::{run_sync, FeedProvider, Understat};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    info!("Database opened: {}", config.database_path);

    let feed: Arc<dyn FeedProvider> = Arc::new(Understat::new(
        &config.understat_url,
        &config.league,
        &config.season,
    )?);
    let commentary: Arc<dyn CommentaryGenerator> = Arc::new(OllamaClient::new(
        &config.ollama_url,
        &config.ollama_model,
        Duration::from_secs(config.commentary_timeout_secs),
    )?);
    let engine = PredictionEngine::new(db.clone())
        .with_lookback(config.form_lookback)
        .with_key_players(config.key_players);

    match config.command() {
        Command::Serve => {
            let state = AppState {
                db,
                cache: ResponseCache::new(
                    Duration::from_secs(config.cache_ttl_secs),
                    config.cache_enabled,
                ),
                commentary,
                feed,
                pass_lock: Mutex::new(()),
                lookback: config.form_lookback,
                key_players: config.key_players,
            };
            let app = api::router(state);
            let addr: SocketAddr = config.api_addr.parse()?;
            info!("API listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::Sync => {
            let report = run_sync(feed.as_ref(), &db).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Predict => {
            let summary = engine.run_prediction_pass()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Analyze { match_id, refresh } => {
            let lock = Mutex::new(());
            let result =
                commentary::commentate(&engine, commentary.as_ref(), &lock, match_id, refresh)
                    .await?;
            let Some(preview) = result else {
                anyhow::bail!("No prediction can be made for match {}", match_id);
            };
            if let Some(analysis) = engine.render_analysis_document(match_id)? {
                println!("{}\n", analysis);
            }
            println!("{}", preview.text);
        }
    }

    Ok(())
}
