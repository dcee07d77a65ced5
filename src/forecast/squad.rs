use std::cmp::Ordering;

use super::MatchRepository;
use crate::db::models::Player;
use crate::error::StoreError;

/// Number of players listed per side in the analysis.
pub const DEFAULT_KEY_PLAYERS: usize = 4;

/// Rendered in place of a player list when a team has no players on record.
pub const NO_PLAYER_DATA: &str = "No player data available";

const SEPARATOR: &str = "; ";

/// Players ordered by goals, then expected goals, both descending.
pub fn rank_players(players: &[Player]) -> Vec<&Player> {
    let mut ranked: Vec<&Player> = players.iter().collect();
    ranked.sort_by(|a, b| by_production(b, a));
    ranked
}

fn by_production(a: &Player, b: &Player) -> Ordering {
    a.goals.cmp(&b.goals).then(a.xg.total_cmp(&b.xg))
}

/// `"Name (7 goals, 3 assists, xG 6.20)"`; assists and xG appear only when
/// positive.
pub fn player_blurb(p: &Player) -> String {
    let mut parts = vec![plural(p.goals, "goal")];
    if p.assists > 0 {
        parts.push(plural(p.assists, "assist"));
    }
    if p.xg > 0.0 {
        parts.push(format!("xG {:.2}", p.xg));
    }
    format!("{} ({})", p.name, parts.join(", "))
}

fn plural(n: i32, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

/// Blurbs for the `n` most productive players, joined into one line.
pub fn summarize_squad(players: &[Player], n: usize) -> String {
    if players.is_empty() {
        return NO_PLAYER_DATA.to_string();
    }
    rank_players(players)
        .into_iter()
        .take(n)
        .map(player_blurb)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

pub fn top_players<R: MatchRepository + ?Sized>(
    repo: &R,
    team_id: i64,
    n: usize,
) -> Result<String, StoreError> {
    let players = repo.find_players_by_team(team_id)?;
    Ok(summarize_squad(&players, n))
}
