use std::collections::BTreeMap;

use crate::db::models::{FinishedMatch, StandingsRow};

/// Season record for every team that appears in `matches`, rebuilt from
/// scratch. Running it twice over the same matches gives the same table.
pub fn recompute_standings(matches: &[FinishedMatch]) -> BTreeMap<i64, StandingsRow> {
    let mut table: BTreeMap<i64, StandingsRow> = BTreeMap::new();

    for m in matches {
        let sides = [
            (m.home_team_id, m.home_score, m.away_score, m.home_xg, m.away_xg),
            (m.away_team_id, m.away_score, m.home_score, m.away_xg, m.home_xg),
        ];
        for (team_id, scored, conceded, xg_for, xg_against) in sides {
            let row = table.entry(team_id).or_default();
            row.matches_played += 1;
            row.goals_for += scored;
            row.goals_against += conceded;
            row.xg_for += xg_for.unwrap_or(0.0);
            row.xg_against += xg_against.unwrap_or(0.0);
            if scored > conceded {
                row.wins += 1;
                row.points += 3;
            } else if scored == conceded {
                row.draws += 1;
                row.points += 1;
            } else {
                row.losses += 1;
            }
        }
    }

    table
}
