use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

pub mod models;
use models::*;

use crate::error::StoreError;
use crate::forecast::MatchRepository;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Thread-safe SQLite handle (single connection behind a mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Teams ────────────────────────────────────────────────────────────────

    /// Insert a team by external id, or refresh its name. Returns the internal id.
    pub fn upsert_team(&self, external_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let id = conn.query_row(
            "INSERT INTO teams (external_id, name, short_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![external_id, name, short_name(name)],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn set_team_logo(&self, team_id: i64, logo_url: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE teams SET logo_url = ?1 WHERE id = ?2",
            params![logo_url, team_id],
        )?;
        Ok(())
    }

    /// League table: points, then goal difference, then goals scored.
    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, external_id, name, short_name, logo_url,
                    matches_played, wins, draws, losses, goals_for, goals_against,
                    points, xg_for, xg_against
             FROM teams
             ORDER BY points DESC, (goals_for - goals_against) DESC, goals_for DESC, name",
        )?;
        let teams = stmt
            .query_map([], map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// Replace every team's season record. Teams missing from `rows` are
    /// reset to zero, so the table always reflects exactly one reduction.
    pub fn write_standings(&self, rows: &BTreeMap<i64, StandingsRow>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE teams SET matches_played = 0, wins = 0, draws = 0, losses = 0,
                              goals_for = 0, goals_against = 0, points = 0,
                              xg_for = 0, xg_against = 0",
            [],
        )?;
        {
            let mut stmt = tx.prepare(
                "UPDATE teams SET matches_played = ?1, wins = ?2, draws = ?3, losses = ?4,
                                  goals_for = ?5, goals_against = ?6, points = ?7,
                                  xg_for = ?8, xg_against = ?9
                 WHERE id = ?10",
            )?;
            for (team_id, r) in rows {
                stmt.execute(params![
                    r.matches_played,
                    r.wins,
                    r.draws,
                    r.losses,
                    r.goals_for,
                    r.goals_against,
                    r.points,
                    r.xg_for,
                    r.xg_against,
                    team_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Players ──────────────────────────────────────────────────────────────

    pub fn upsert_player(&self, p: &Player) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO players (external_id, team_id, name, position,
                                  games, goals, assists, shots, xg, xa)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(external_id) DO UPDATE SET
                team_id=excluded.team_id,
                name=excluded.name,
                position=excluded.position,
                games=excluded.games,
                goals=excluded.goals,
                assists=excluded.assists,
                shots=excluded.shots,
                xg=excluded.xg,
                xa=excluded.xa",
            params![
                p.external_id,
                p.team_id,
                p.name,
                p.position,
                p.games,
                p.goals,
                p.assists,
                p.shots,
                p.xg,
                p.xa,
            ],
        )?;
        Ok(())
    }

    pub fn players_by_team(&self, team_id: i64) -> Result<Vec<Player>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT external_id, team_id, name, position, games, goals, assists, shots, xg, xa
             FROM players WHERE team_id = ?1 ORDER BY id",
        )?;
        let players = stmt
            .query_map(params![team_id], map_player)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    }

    // ── Matches ──────────────────────────────────────────────────────────────

    /// Insert or update a match by external id. A finished match is never
    /// reverted to an unplayed state. Returns the internal id.
    pub fn upsert_match(&self, m: &NewMatch) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO matches (external_id, kickoff, home_team_id, away_team_id,
                                  home_score, away_score, status)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(external_id) DO UPDATE SET
                kickoff=excluded.kickoff,
                home_team_id=excluded.home_team_id,
                away_team_id=excluded.away_team_id,
                home_score=excluded.home_score,
                away_score=excluded.away_score,
                status=excluded.status
             WHERE matches.status != 'FINISHED' OR excluded.status = 'FINISHED'",
            params![
                m.external_id,
                m.kickoff,
                m.home_team_id,
                m.away_team_id,
                m.home_score,
                m.away_score,
                m.status,
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM matches WHERE external_id = ?1",
            params![m.external_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn upsert_match_stat(&self, match_id: i64, home_xg: f64, away_xg: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO match_stats (match_id, home_xg, away_xg) VALUES (?1,?2,?3)
             ON CONFLICT(match_id) DO UPDATE SET
                home_xg=excluded.home_xg,
                away_xg=excluded.away_xg",
            params![match_id, home_xg, away_xg],
        )?;
        Ok(())
    }

    /// Every finished match with both scores, oldest first. Rows that fail to
    /// decode are logged and left out.
    pub fn finished_matches(&self) -> Result<Vec<FinishedMatch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{FINISHED_SELECT} ORDER BY m.kickoff, m.id"
        ))?;
        let rows = stmt.query_map([], map_finished)?;
        collect_decodable(rows, "finished match")
    }

    /// A team's most recent finished matches on either side, newest first.
    pub fn team_results(&self, team_id: i64, limit: usize) -> Result<Vec<FinishedMatch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{FINISHED_SELECT} AND (m.home_team_id = ?1 OR m.away_team_id = ?1)
             ORDER BY m.kickoff DESC, m.id DESC LIMIT ?2"
        ))?;
        let matches = stmt
            .query_map(params![team_id, limit as i64], map_finished)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Ids of all matches not yet finished, in kickoff order. Only the id is
    /// decoded, so a malformed row still shows up here.
    pub fn fixture_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM matches WHERE status != 'FINISHED' ORDER BY kickoff, id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn fixture(&self, match_id: i64) -> Result<Option<Fixture>> {
        let conn = self.conn()?;
        let fixture = conn
            .query_row(
                &format!("{FIXTURE_SELECT} WHERE m.id = ?1"),
                params![match_id],
                map_fixture,
            )
            .optional()?;
        Ok(fixture)
    }

    // ── Predictions ──────────────────────────────────────────────────────────

    pub fn prediction_by_match(&self, match_id: i64) -> Result<Option<Prediction>> {
        let conn = self.conn()?;
        let prediction = conn
            .query_row(
                &format!("{PREDICTION_SELECT} WHERE match_id = ?1"),
                params![match_id],
                |row| map_prediction(row, 0),
            )
            .optional()?;
        Ok(prediction)
    }

    /// Returns whether a row was removed.
    pub fn delete_prediction(&self, match_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM predictions WHERE match_id = ?1",
            params![match_id],
        )?;
        Ok(n > 0)
    }

    /// Delete any existing prediction for the match and insert this one, in a
    /// single transaction.
    pub fn replace_prediction(&self, p: &Prediction) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM predictions WHERE match_id = ?1",
            params![p.match_id],
        )?;
        tx.execute(
            "INSERT INTO predictions (match_id, predicted_winner_id, is_draw, confidence,
                                      analysis_content, ai_commentary)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                p.match_id,
                p.predicted_winner_id,
                p.is_draw,
                p.confidence,
                p.analysis_content,
                p.ai_commentary,
            ],
        )?;
        tx.commit()?;
        debug!("Prediction stored for match {}", p.match_id);
        Ok(())
    }

    /// Set or clear the commentary on an existing prediction. Returns whether
    /// a prediction existed.
    pub fn set_commentary(&self, match_id: i64, commentary: Option<&str>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE predictions SET ai_commentary = ?1 WHERE match_id = ?2",
            params![commentary, match_id],
        )?;
        Ok(n > 0)
    }

    /// Not-finished matches joined with their prediction, if any. Rows that
    /// fail to decode are logged and left out.
    pub fn fixtures_with_predictions(&self) -> Result<Vec<(Fixture, Option<Prediction>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.kickoff, m.status,
                    h.id, h.name, h.logo_url, a.id, a.name, a.logo_url,
                    p.match_id, p.predicted_winner_id, p.is_draw, p.confidence,
                    p.analysis_content, p.ai_commentary
             FROM matches m
             JOIN teams h ON h.id = m.home_team_id
             JOIN teams a ON a.id = m.away_team_id
             LEFT JOIN predictions p ON p.match_id = m.id
             WHERE m.status != 'FINISHED'
             ORDER BY m.kickoff, m.id",
        )?;
        let rows = stmt.query_map([], |row| {
            let fixture = map_fixture(row)?;
            let has_prediction: Option<i64> = row.get(9)?;
            let prediction = match has_prediction {
                Some(_) => Some(map_prediction(row, 9)?),
                None => None,
            };
            Ok((fixture, prediction))
        })?;
        collect_decodable(rows, "fixture")
    }
}

impl MatchRepository for Database {
    fn find_team_results(&self, team_id: i64, limit: usize) -> Result<Vec<FinishedMatch>> {
        self.team_results(team_id, limit)
    }

    fn find_players_by_team(&self, team_id: i64) -> Result<Vec<Player>> {
        self.players_by_team(team_id)
    }

    fn find_fixture_ids(&self) -> Result<Vec<i64>> {
        self.fixture_ids()
    }

    fn find_fixture(&self, match_id: i64) -> Result<Option<Fixture>> {
        self.fixture(match_id)
    }

    fn find_prediction_by_match(&self, match_id: i64) -> Result<Option<Prediction>> {
        self.prediction_by_match(match_id)
    }

    fn delete_prediction_by_match(&self, match_id: i64) -> Result<bool> {
        self.delete_prediction(match_id)
    }

    fn replace_prediction(&self, prediction: &Prediction) -> Result<()> {
        Database::replace_prediction(self, prediction)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

/// Collect rows, skipping the ones that fail to decode. Any other error
/// still aborts.
fn collect_decodable<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    what: &str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    let mut skipped = 0;
    for row in rows {
        match row.map_err(StoreError::from) {
            Ok(v) => out.push(v),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping undecodable {} row: {}", what, e);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("{} {} row(s) skipped", skipped, what);
    }
    Ok(out)
}

/// First three letters of the name, upper-cased.
fn short_name(name: &str) -> String {
    name.chars().take(3).collect::<String>().to_uppercase()
}

const FINISHED_SELECT: &str = "SELECT m.id, m.kickoff, m.home_team_id, m.away_team_id,
        m.home_score, m.away_score, s.home_xg, s.away_xg
 FROM matches m LEFT JOIN match_stats s ON s.match_id = m.id
 WHERE m.status = 'FINISHED'
   AND m.home_score IS NOT NULL AND m.away_score IS NOT NULL";

const FIXTURE_SELECT: &str = "SELECT m.id, m.kickoff, m.status,
        h.id, h.name, h.logo_url, a.id, a.name, a.logo_url
 FROM matches m
 JOIN teams h ON h.id = m.home_team_id
 JOIN teams a ON a.id = m.away_team_id";

const PREDICTION_SELECT: &str = "SELECT match_id, predicted_winner_id, is_draw, confidence,
        analysis_content, ai_commentary
 FROM predictions";

fn map_team(row: &rusqlite::Row) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        short_name: row.get(3)?,
        logo_url: row.get(4)?,
        matches_played: row.get(5)?,
        wins: row.get(6)?,
        draws: row.get(7)?,
        losses: row.get(8)?,
        goals_for: row.get(9)?,
        goals_against: row.get(10)?,
        points: row.get(11)?,
        xg_for: row.get(12)?,
        xg_against: row.get(13)?,
    })
}

fn map_player(row: &rusqlite::Row) -> rusqlite::Result<Player> {
    Ok(Player {
        external_id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        games: row.get(4)?,
        goals: row.get(5)?,
        assists: row.get(6)?,
        shots: row.get(7)?,
        xg: row.get(8)?,
        xa: row.get(9)?,
    })
}

fn map_finished(row: &rusqlite::Row) -> rusqlite::Result<FinishedMatch> {
    Ok(FinishedMatch {
        match_id: row.get(0)?,
        kickoff: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        home_score: row.get(4)?,
        away_score: row.get(5)?,
        home_xg: row.get(6)?,
        away_xg: row.get(7)?,
    })
}

fn map_fixture(row: &rusqlite::Row) -> rusqlite::Result<Fixture> {
    Ok(Fixture {
        match_id: row.get(0)?,
        kickoff: row.get(1)?,
        status: row.get(2)?,
        home_team_id: row.get(3)?,
        home_team: row.get(4)?,
        home_logo: row.get(5)?,
        away_team_id: row.get(6)?,
        away_team: row.get(7)?,
        away_logo: row.get(8)?,
    })
}

/// Map prediction columns starting at `base`.
fn map_prediction(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        match_id: row.get(base)?,
        predicted_winner_id: row.get(base + 1)?,
        is_draw: row.get(base + 2)?,
        confidence: row.get(base + 3)?,
        analysis_content: row.get(base + 4)?,
        ai_commentary: row.get(base + 5)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id    INTEGER NOT NULL UNIQUE,
    name           TEXT    NOT NULL,
    short_name     TEXT    NOT NULL,
    logo_url       TEXT,
    matches_played INTEGER NOT NULL DEFAULT 0,
    wins           INTEGER NOT NULL DEFAULT 0,
    draws          INTEGER NOT NULL DEFAULT 0,
    losses         INTEGER NOT NULL DEFAULT 0,
    goals_for      INTEGER NOT NULL DEFAULT 0,
    goals_against  INTEGER NOT NULL DEFAULT 0,
    points         INTEGER NOT NULL DEFAULT 0,
    xg_for         REAL    NOT NULL DEFAULT 0,
    xg_against     REAL    NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS players (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL UNIQUE,
    team_id     INTEGER NOT NULL,
    name        TEXT    NOT NULL,
    position    TEXT    NOT NULL DEFAULT 'Unknown',
    games       INTEGER NOT NULL DEFAULT 0,
    goals       INTEGER NOT NULL DEFAULT 0,
    assists     INTEGER NOT NULL DEFAULT 0,
    shots       INTEGER NOT NULL DEFAULT 0,
    xg          REAL    NOT NULL DEFAULT 0,
    xa          REAL    NOT NULL DEFAULT 0,
    FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS matches (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id  INTEGER NOT NULL UNIQUE,
    kickoff      TEXT    NOT NULL,
    home_team_id INTEGER NOT NULL,
    away_team_id INTEGER NOT NULL,
    home_score   INTEGER,
    away_score   INTEGER,
    status       TEXT    NOT NULL DEFAULT 'SCHEDULED',
    FOREIGN KEY (home_team_id) REFERENCES teams(id),
    FOREIGN KEY (away_team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS match_stats (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id INTEGER NOT NULL UNIQUE,
    home_xg  REAL    NOT NULL,
    away_xg  REAL    NOT NULL,
    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS predictions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id            INTEGER NOT NULL UNIQUE,
    predicted_winner_id INTEGER,
    is_draw             INTEGER NOT NULL,
    confidence          REAL    NOT NULL,
    analysis_content    TEXT    NOT NULL,
    ai_commentary       TEXT,
    CHECK (is_draw = (predicted_winner_id IS NULL)),
    CHECK (confidence BETWEEN 0.5 AND 0.95),
    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE,
    FOREIGN KEY (predicted_winner_id) REFERENCES teams(id)
);

CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_team_id, kickoff);
CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_team_id, kickoff);
CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);
"#;
