use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::provider::{Feed, FeedMatch, FeedPlayer, FeedProvider, FeedTeam};
use crate::db::models::MatchStatus;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// League data provider backed by Understat's JSON endpoint.
pub struct Understat {
    http: Client,
    base_url: String,
    league: String,
    season: String,
}

impl Understat {
    pub fn new(base_url: &str, league: &str, season: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Understat {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            league: league.to_string(),
            season: season.to_string(),
        })
    }

    fn data_url(&self) -> String {
        format!("{}/getLeagueData/{}/{}", self.base_url, self.league, self.season)
    }

    fn referer(&self) -> String {
        format!("{}/league/{}/{}", self.base_url, self.league, self.season)
    }

    /// Browser-like headers; the endpoint rejects obvious scripts.
    fn headers(&self) -> Result<HeaderMap> {
        let agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            REFERER,
            HeaderValue::from_str(&self.referer()).context("Invalid referer")?,
        );
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        Ok(headers)
    }
}

#[async_trait]
impl FeedProvider for Understat {
    fn name(&self) -> &str {
        "Understat"
    }

    async fn fetch_feed(&self) -> Result<Feed> {
        let url = self.data_url();
        debug!("Fetching league data from {}", url);

        let resp = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .context("Understat request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Understat error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            );
        }

        let raw: Value = resp
            .json()
            .await
            .context("Understat response is not JSON (likely blocked)")?;

        let feed = parse_league_data(&raw);
        info!(
            "Understat: {} teams, {} matches, {} players ({} rejected)",
            feed.teams.len(),
            feed.matches.len(),
            feed.players.len(),
            feed.rejected
        );
        Ok(feed)
    }
}

/// Parse a `getLeagueData` payload. Records that fail to parse are logged and
/// counted, never fatal.
pub fn parse_league_data(raw: &Value) -> Feed {
    let mut feed = Feed::default();

    if let Some(teams) = raw["teams"].as_object() {
        for (key, t) in teams {
            match parse_team(t, Some(key)) {
                Ok(team) => feed.teams.push(team),
                Err(e) => {
                    warn!("Skipping team {}: {:#}", key, e);
                    feed.rejected += 1;
                }
            }
        }
        feed.teams.sort_by_key(|t| t.external_id);
    }

    for m in raw["dates"].as_array().into_iter().flatten() {
        match parse_match(m) {
            Ok(parsed) => feed.matches.push(parsed),
            Err(e) => {
                warn!("Skipping match {}: {:#}", m["id"], e);
                feed.rejected += 1;
            }
        }
    }

    for p in raw["players"].as_array().into_iter().flatten() {
        match parse_player(p) {
            Ok(parsed) => feed.players.push(parsed),
            Err(e) => {
                debug!("Skipping player {}: {:#}", p["id"], e);
                feed.rejected += 1;
            }
        }
    }

    feed
}

fn parse_team(t: &Value, fallback_id: Option<&str>) -> Result<FeedTeam> {
    let external_id = int_field(&t["id"])
        .or_else(|| fallback_id.and_then(|s| s.parse().ok()))
        .ok_or_else(|| anyhow!("missing team id"))?;
    let name = t["title"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("missing team title"))?
        .to_string();
    Ok(FeedTeam { external_id, name })
}

fn parse_match(m: &Value) -> Result<FeedMatch> {
    let external_id = int_field(&m["id"]).ok_or_else(|| anyhow!("missing id"))?;
    let datetime = m["datetime"]
        .as_str()
        .ok_or_else(|| anyhow!("missing datetime"))?;
    let kickoff = NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("bad datetime '{}'", datetime))?
        .and_utc();
    let home = parse_team(&m["h"], None).context("home side")?;
    let away = parse_team(&m["a"], None).context("away side")?;

    let finished = m["isResult"].as_bool().unwrap_or(false);
    let (status, home_goals, away_goals, xg) = if finished {
        let hg = count_field(&m["goals"]["h"], "home goals")?;
        let ag = count_field(&m["goals"]["a"], "away goals")?;
        let xg = float_field(&m["xG"]["h"]).zip(float_field(&m["xG"]["a"]));
        (MatchStatus::Finished, Some(hg), Some(ag), xg)
    } else {
        (MatchStatus::Scheduled, None, None, None)
    };

    Ok(FeedMatch {
        external_id,
        kickoff,
        home,
        away,
        status,
        home_goals,
        away_goals,
        xg,
    })
}

fn parse_player(p: &Value) -> Result<FeedPlayer> {
    let external_id = int_field(&p["id"]).ok_or_else(|| anyhow!("missing id"))?;
    let name = p["player_name"]
        .as_str()
        .ok_or_else(|| anyhow!("missing player_name"))?
        .to_string();
    let team_title = p["team_title"]
        .as_str()
        .ok_or_else(|| anyhow!("missing team_title"))?
        .to_string();
    let count = |key: &str| count_field(&p[key], key);
    Ok(FeedPlayer {
        external_id,
        name,
        team_title,
        position: p["position"].as_str().unwrap_or("Unknown").to_string(),
        games: count("games")?,
        goals: count("goals")?,
        assists: count("assists")?,
        shots: count("shots")?,
        xg: float_field(&p["xG"]).ok_or_else(|| anyhow!("missing xG"))?,
        xa: float_field(&p["xA"]).ok_or_else(|| anyhow!("missing xA"))?,
    })
}

/// Understat sends most numbers as strings.
fn int_field(v: &Value) -> Option<i64> {
    v.as_str()
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| v.as_i64())
}

/// A non-negative tally that fits the stored column.
fn count_field(v: &Value, what: &str) -> Result<i32> {
    let n = int_field(v).ok_or_else(|| anyhow!("missing {}", what))?;
    let n = i32::try_from(n).with_context(|| format!("{} {} out of range", what, n))?;
    if n < 0 {
        bail!("negative {} {}", what, n);
    }
    Ok(n)
}

fn float_field(v: &Value) -> Option<f64> {
    v.as_str()
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| v.as_f64())
        .filter(|x: &f64| x.is_finite())
}
