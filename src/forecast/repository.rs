use crate::db::models::{FinishedMatch, Fixture, Player, Prediction};
use crate::error::StoreError;

/// Queries and writes the prediction engine needs from storage.
pub trait MatchRepository {
    /// A team's finished, scored matches on either side, newest first, at
    /// most `limit` of them.
    fn find_team_results(&self, team_id: i64, limit: usize)
        -> Result<Vec<FinishedMatch>, StoreError>;

    fn find_players_by_team(&self, team_id: i64) -> Result<Vec<Player>, StoreError>;

    /// Ids of every match that is not finished, in kickoff order.
    fn find_fixture_ids(&self) -> Result<Vec<i64>, StoreError>;

    fn find_fixture(&self, match_id: i64) -> Result<Option<Fixture>, StoreError>;

    fn find_prediction_by_match(&self, match_id: i64) -> Result<Option<Prediction>, StoreError>;

    fn delete_prediction_by_match(&self, match_id: i64) -> Result<bool, StoreError>;

    /// Drop any existing prediction for the match and store this one,
    /// committed atomically.
    fn replace_prediction(&self, prediction: &Prediction) -> Result<(), StoreError>;
}
