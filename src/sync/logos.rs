use tracing::debug;

use crate::db::Database;
use crate::error::StoreError;

/// Crest URLs keyed by a fragment of the team name.
const CRESTS: &[(&str, &str)] = &[
    ("Arsenal", "https://upload.wikimedia.org/wikipedia/en/5/53/Arsenal_FC.svg"),
    ("Aston Villa", "https://crests.football-data.org/58.svg"),
    ("Bournemouth", "https://upload.wikimedia.org/wikipedia/en/e/e5/AFC_Bournemouth_%282013%29.svg"),
    ("Brentford", "https://upload.wikimedia.org/wikipedia/en/2/2a/Brentford_FC_crest.svg"),
    ("Brighton", "https://crests.football-data.org/397.svg"),
    ("Burnley", "https://crests.football-data.org/328.svg"),
    ("Chelsea", "https://upload.wikimedia.org/wikipedia/en/c/cc/Chelsea_FC.svg"),
    ("Crystal Palace", "https://crests.football-data.org/354.svg"),
    ("Everton", "https://upload.wikimedia.org/wikipedia/en/7/7c/Everton_FC_logo.svg"),
    ("Fulham", "https://crests.football-data.org/63.svg"),
    ("Ipswich", "https://upload.wikimedia.org/wikipedia/en/4/43/Ipswich_Town.svg"),
    ("Leicester", "https://upload.wikimedia.org/wikipedia/en/2/2d/Leicester_City_crest.svg"),
    ("Leeds", "https://crests.football-data.org/341.svg"),
    ("Liverpool", "https://upload.wikimedia.org/wikipedia/en/0/0c/Liverpool_FC.svg"),
    ("Manchester City", "https://upload.wikimedia.org/wikipedia/en/e/eb/Manchester_City_FC_badge.svg"),
    ("Manchester United", "https://upload.wikimedia.org/wikipedia/en/7/7a/Manchester_United_FC_crest.svg"),
    ("Newcastle United", "https://upload.wikimedia.org/wikipedia/en/5/56/Newcastle_United_Logo.svg"),
    ("Nottingham Forest", "https://upload.wikimedia.org/wikipedia/en/e/e5/Nottingham_Forest_F.C._logo.svg"),
    ("Southampton", "https://upload.wikimedia.org/wikipedia/en/c/c9/FC_Southampton.svg"),
    ("Sunderland", "https://crests.football-data.org/71.svg"),
    ("Tottenham", "https://upload.wikimedia.org/wikipedia/en/b/b4/Tottenham_Hotspur.svg"),
    ("West Ham", "https://upload.wikimedia.org/wikipedia/en/c/c2/West_Ham_United_FC_logo.svg"),
    ("Wolverhampton Wanderers", "https://upload.wikimedia.org/wikipedia/en/f/fc/Wolverhampton_Wanderers.svg"),
    ("Wolves", "https://upload.wikimedia.org/wikipedia/en/f/fc/Wolverhampton_Wanderers.svg"),
];

pub fn crest_for(team_name: &str) -> Option<&'static str> {
    CRESTS
        .iter()
        .find(|(fragment, _)| team_name.contains(fragment))
        .map(|(_, url)| *url)
}

/// Attach crests to every team with a known name. Returns how many matched.
pub fn apply_logos(db: &Database) -> Result<usize, StoreError> {
    let mut updated = 0;
    for team in db.list_teams()? {
        if let Some(url) = crest_for(&team.name) {
            if team.logo_url.as_deref() != Some(url) {
                db.set_team_logo(team.id, url)?;
            }
            updated += 1;
        }
    }
    debug!("Crests matched for {} teams", updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crest_lookup_matches_name_fragments() {
        assert_eq!(crest_for("Brighton & Hove Albion"), Some("https://crests.football-data.org/397.svg"));
        assert!(crest_for("Manchester United").unwrap().contains("Manchester_United"));
        assert_eq!(crest_for("Wolves"), crest_for("Wolverhampton Wanderers"));
        assert_eq!(crest_for("Real Madrid"), None);
    }

    #[test]
    fn test_apply_logos_updates_known_teams_only() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_team(1, "Fulham").unwrap();
        db.upsert_team(2, "Hull City").unwrap();
        assert_eq!(apply_logos(&db).unwrap(), 1);

        let teams = db.list_teams().unwrap();
        let fulham = teams.iter().find(|t| t.name == "Fulham").unwrap();
        assert_eq!(fulham.logo_url.as_deref(), Some("https://crests.football-data.org/63.svg"));
        let hull = teams.iter().find(|t| t.name == "Hull City").unwrap();
        assert!(hull.logo_url.is_none());
    }
}
