//! Form-based match prediction.
//!
//! Each side's last few matches are reduced to per-match attack and defence
//! rates, with expected goals counted alongside real goals:
//!
//!   attack  = (goals_for + xg_for) / n
//!   defence = (goals_against + xg_against) / n
//!
//! A projected scoring rate for each side is its attack minus the opponent's
//! defence, with a flat bonus for playing at home. The difference between
//! the two projections decides the call:
//!
//!   diff >  DRAW_MARGIN  → home win, confidence 0.5 + min(diff / 3, 0.45)
//!   diff < -DRAW_MARGIN  → away win, confidence 0.5 + min(|diff| / 3, 0.45)
//!   otherwise            → draw,     confidence 0.5 + (DRAW_MARGIN − |diff|)
//!
//! Every confidence is finally clamped into [0.5, 0.95].

use serde::Serialize;

use super::form::FormSummary;
use crate::db::models::{Fixture, Prediction};

pub const HOME_ADVANTAGE: f64 = 0.25;
/// Half-width of the dead zone around zero in which a draw is called.
pub const DRAW_MARGIN: f64 = 0.35;
const EDGE_SCALE: f64 = 3.0;
const MAX_EDGE: f64 = 0.45;
pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Per-match attacking output and defensive leakage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamStrength {
    pub attack: f64,
    pub defense: f64,
}

impl TeamStrength {
    /// `None` when there are no matches to average over.
    pub fn from_form(form: &FormSummary) -> Option<TeamStrength> {
        if form.is_empty() {
            return None;
        }
        let n = form.matches_considered as f64;
        Some(TeamStrength {
            attack: (form.goals_for as f64 + form.xg_for) / n,
            defense: (form.goals_against as f64 + form.xg_against) / n,
        })
    }
}

/// Home projection minus away projection.
pub fn score_differential(home: TeamStrength, away: TeamStrength) -> f64 {
    let home_projected = home.attack - away.defense + HOME_ADVANTAGE;
    let away_projected = away.attack - home.defense;
    home_projected - away_projected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    HomeWin,
    AwayWin,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub confidence: f64,
}

pub fn decide(diff: f64) -> Verdict {
    let (outcome, confidence) = if diff > DRAW_MARGIN {
        (Outcome::HomeWin, MIN_CONFIDENCE + (diff / EDGE_SCALE).min(MAX_EDGE))
    } else if diff < -DRAW_MARGIN {
        (
            Outcome::AwayWin,
            MIN_CONFIDENCE + (diff.abs() / EDGE_SCALE).min(MAX_EDGE),
        )
    } else {
        (Outcome::Draw, MIN_CONFIDENCE + (DRAW_MARGIN - diff.abs()))
    };
    Verdict {
        outcome,
        confidence: clamp_confidence(confidence),
    }
}

/// Also maps NaN to the no-edge floor.
fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        MIN_CONFIDENCE
    } else {
        c.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }
}

/// One side of a matchup as it appears in the analysis.
#[derive(Debug, Clone, Copy)]
pub struct SideReport<'a> {
    pub name: &'a str,
    pub form: &'a FormSummary,
    /// Key-player line from the squad summary
    pub squad: &'a str,
}

/// Deterministic plain-text analysis of a matchup. The available-players
/// section is the only source of player names a commentary writer may use.
pub fn render_analysis(
    fixture: &Fixture,
    verdict: &Verdict,
    home: &SideReport<'_>,
    away: &SideReport<'_>,
) -> String {
    let call = match verdict.outcome {
        Outcome::HomeWin => format!("{} to win", home.name),
        Outcome::AwayWin => format!("{} to win", away.name),
        Outcome::Draw => "Draw".to_string(),
    };

    let mut out = String::new();
    out.push_str(&format!(
        "Match: {} vs {} ({})\n",
        home.name,
        away.name,
        fixture.kickoff.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!(
        "Prediction: {} ({}% confidence)\n",
        call,
        (verdict.confidence * 100.0).round() as i64
    ));
    for side in [home, away] {
        out.push_str(&form_line(side));
    }
    out.push_str("\nAVAILABLE PLAYERS (name no one outside this list):\n");
    for side in [home, away] {
        out.push_str(&format!("{}: {}\n", side.name, side.squad));
    }
    out
}

fn form_line(side: &SideReport<'_>) -> String {
    let f = side.form;
    format!(
        "{} form (last {}): {} | {} pts | goals {} scored, {} conceded | xG {:.2} for, {:.2} against\n",
        side.name,
        f.matches_considered,
        f.trail_string(),
        f.points,
        f.goals_for,
        f.goals_against,
        f.xg_for,
        f.xg_against,
    )
}

/// A freshly computed prediction and the numbers behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionDraft {
    pub prediction: Prediction,
    pub verdict: Verdict,
    pub diff: f64,
}

/// The whole prediction pipeline for one fixture, free of I/O. Returns
/// `None` when either side has no finished matches to go on.
pub fn forecast_fixture(
    fixture: &Fixture,
    home_form: &FormSummary,
    away_form: &FormSummary,
    home_squad: &str,
    away_squad: &str,
) -> Option<PredictionDraft> {
    let home_strength = TeamStrength::from_form(home_form)?;
    let away_strength = TeamStrength::from_form(away_form)?;

    let diff = score_differential(home_strength, away_strength);
    let verdict = decide(diff);

    let analysis_content = render_analysis(
        fixture,
        &verdict,
        &SideReport {
            name: &fixture.home_team,
            form: home_form,
            squad: home_squad,
        },
        &SideReport {
            name: &fixture.away_team,
            form: away_form,
            squad: away_squad,
        },
    );

    let predicted_winner_id = match verdict.outcome {
        Outcome::HomeWin => Some(fixture.home_team_id),
        Outcome::AwayWin => Some(fixture.away_team_id),
        Outcome::Draw => None,
    };

    Some(PredictionDraft {
        prediction: Prediction {
            match_id: fixture.match_id,
            predicted_winner_id,
            is_draw: predicted_winner_id.is_none(),
            confidence: verdict.confidence,
            analysis_content,
            ai_commentary: None,
        },
        verdict,
        diff,
    })
}
