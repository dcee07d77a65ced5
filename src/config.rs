use clap::{Parser, Subcommand};
use url::Url;

/// Premier League match forecasts with optional LLM previews
#[derive(Parser, Debug, Clone)]
#[command(name = "matchcast", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchcast.db")]
    pub database_path: String,

    /// HTTP API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8000")]
    pub api_addr: String,

    /// Understat base URL
    #[arg(long, env = "UNDERSTAT_URL", default_value = "https://understat.com")]
    pub understat_url: String,

    /// Understat league code
    #[arg(long, env = "LEAGUE", default_value = "EPL")]
    pub league: String,

    /// Season start year (2025 = 2025/26)
    #[arg(long, env = "SEASON", default_value = "2025")]
    pub season: String,

    /// Ollama server URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://ollama:11434")]
    pub ollama_url: String,

    /// Model used for match previews
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3")]
    pub ollama_model: String,

    /// Timeout for one commentary request in seconds
    #[arg(long, env = "COMMENTARY_TIMEOUT_SECS", default_value = "120")]
    pub commentary_timeout_secs: u64,

    /// Lifetime of cached API responses in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "300")]
    pub cache_ttl_secs: u64,

    /// Cache GET /table and GET /matches responses
    #[arg(long, env = "CACHE_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub cache_enabled: bool,

    /// Finished matches per team used for form
    #[arg(long, env = "FORM_LOOKBACK", default_value = "5")]
    pub form_lookback: usize,

    /// Players per side listed in the analysis
    #[arg(long, env = "KEY_PLAYERS", default_value = "4")]
    pub key_players: usize,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Fetch the league feed once and rebuild the table
    Sync,
    /// Run one prediction pass over all upcoming fixtures
    Predict,
    /// Print the analysis and generated preview for one match
    Analyze {
        match_id: i64,
        /// Regenerate even if a preview is stored
        #[arg(long)]
        refresh: bool,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.form_lookback == 0 {
            anyhow::bail!("form_lookback must be at least 1");
        }
        if self.key_players == 0 {
            anyhow::bail!("key_players must be at least 1");
        }
        if self.commentary_timeout_secs == 0 {
            anyhow::bail!("commentary_timeout_secs must be positive");
        }
        for (name, value) in [
            ("UNDERSTAT_URL", &self.understat_url),
            ("OLLAMA_URL", &self.ollama_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} '{}' is not a valid URL: {}", name, value, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("{} must be an http(s) URL", name);
            }
        }
        if self.league.trim().is_empty() || self.season.trim().is_empty() {
            anyhow::bail!("league and season must not be empty");
        }
        Ok(())
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
