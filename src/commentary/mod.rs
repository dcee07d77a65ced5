pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{AnalyzeError, CommentaryError};
use crate::forecast::PredictionEngine;

/// A text generator that turns an analysis document into a match preview.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CommentaryError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Wrap an analysis document in the fixed preview instructions.
pub fn build_prompt(analysis: &str) -> String {
    format!(
        "You are a professional Premier League football analyst.\n\
         Analyze the following match data and prediction:\n\
         \n\
         {analysis}\n\
         \n\
         Write a match preview that gives an exact final score, who will score first \
         and which side will collect more cards.\n\
         Explain why the predicted winner is favored based on recent form.\n\
         Only mention players listed under AVAILABLE PLAYERS; do not invent or name anyone else.\n\
         Do not mention 'algorithm' or 'confidence score' explicitly.\n",
        analysis = analysis.trim()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentaryStatus {
    Generated,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commentary {
    pub status: CommentaryStatus,
    pub text: String,
}

/// Make sure the match has a prediction, then return its commentary,
/// generating it at most once unless `refresh` is set.
///
/// Returns `None` when no prediction exists and none can be made. Prediction
/// writes happen under `pass_lock`; the generator call does not. The text is
/// stored only if the prediction it describes is still the current one.
pub async fn commentate(
    engine: &PredictionEngine<Database>,
    generator: &dyn CommentaryGenerator,
    pass_lock: &Mutex<()>,
    match_id: i64,
    refresh: bool,
) -> Result<Option<Commentary>, AnalyzeError> {
    let db = engine.repo();

    let prediction = {
        let _guard = pass_lock.lock().await;
        if db.prediction_by_match(match_id)?.is_none() {
            engine.predict_match(match_id)?;
        }
        db.prediction_by_match(match_id)?
    };
    let Some(prediction) = prediction else {
        return Ok(None);
    };

    if let (Some(text), false) = (&prediction.ai_commentary, refresh) {
        return Ok(Some(Commentary {
            status: CommentaryStatus::Cached,
            text: text.clone(),
        }));
    }

    let text = generator
        .generate(&build_prompt(&prediction.analysis_content))
        .await?;

    let _guard = pass_lock.lock().await;
    match db.prediction_by_match(match_id)? {
        Some(current) if current.same_forecast(&prediction) => {
            db.set_commentary(match_id, Some(&text))?;
        }
        _ => {
            warn!("Prediction for match {} moved on; discarding commentary", match_id);
            return Err(AnalyzeError::Superseded(match_id));
        }
    }
    info!("Commentary from {} stored for match {}", generator.name(), match_id);

    Ok(Some(Commentary {
        status: CommentaryStatus::Generated,
        text,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that echoes a canned reply and counts calls.
    pub(crate) struct CannedGenerator {
        pub reply: Result<String, u16>,
        pub calls: AtomicUsize,
    }

    impl CannedGenerator {
        pub(crate) fn ok(text: &str) -> Self {
            CannedGenerator {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(status: u16) -> Self {
            CannedGenerator {
                reply: Err(status),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CommentaryGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, CommentaryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(CommentaryError::Status {
                    status: *status,
                    body: "unavailable".into(),
                }),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_prompt_embeds_the_analysis_and_the_player_rule() {
        let analysis = "Match: Arsenal vs Chelsea\n\nAVAILABLE PLAYERS (name no one outside this list):\nArsenal: Saka";
        let prompt = build_prompt(analysis);
        assert!(prompt.contains(analysis));
        assert!(prompt.contains("AVAILABLE PLAYERS"));
        assert!(prompt.contains("exact final score"));
        assert!(prompt.contains("Do not mention 'algorithm'"));
        assert!(prompt.starts_with("You are a professional Premier League football analyst."));
    }

    #[tokio::test]
    async fn test_generator_trait_objects_are_usable() {
        let gen: Box<dyn CommentaryGenerator> = Box::new(CannedGenerator::ok("Arsenal 2-1"));
        assert_eq!(gen.generate("p").await.unwrap(), "Arsenal 2-1");

        let failing = CannedGenerator::failing(503);
        let err = failing.generate("p").await.unwrap_err();
        assert!(matches!(err, CommentaryError::Status { status: 503, .. }));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    fn engine_with_fixture() -> (PredictionEngine<Database>, i64) {
        use crate::db::models::{MatchStatus, NewMatch};
        use chrono::{TimeZone, Utc};

        let (db, home, away) = crate::db::tests::seeded(3);
        let match_id = db
            .upsert_match(&NewMatch {
                external_id: 900,
                kickoff: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
                home_team_id: home,
                away_team_id: away,
                home_score: None,
                away_score: None,
                status: MatchStatus::Timed,
            })
            .unwrap();
        (PredictionEngine::new(db), match_id)
    }

    #[tokio::test]
    async fn test_commentary_is_generated_once_then_served_from_the_row() {
        let (engine, match_id) = engine_with_fixture();
        let gen = CannedGenerator::ok("Arsenal 2-1 Chelsea");
        let lock = Mutex::new(());

        let first = commentate(&engine, &gen, &lock, match_id, false).await.unwrap().unwrap();
        assert_eq!(first.status, CommentaryStatus::Generated);
        let second = commentate(&engine, &gen, &lock, match_id, false).await.unwrap().unwrap();
        assert_eq!(second.status, CommentaryStatus::Cached);
        assert_eq!(second.text, "Arsenal 2-1 Chelsea");
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);

        let stored = engine.repo().prediction_by_match(match_id).unwrap().unwrap();
        assert_eq!(stored.ai_commentary.as_deref(), Some("Arsenal 2-1 Chelsea"));
    }

    #[tokio::test]
    async fn test_refresh_regenerates_and_failures_leave_the_row_alone() {
        let (engine, match_id) = engine_with_fixture();
        let lock = Mutex::new(());
        commentate(&engine, &CannedGenerator::ok("old"), &lock, match_id, false)
            .await
            .unwrap();

        let failing = CannedGenerator::failing(502);
        let err = commentate(&engine, &failing, &lock, match_id, true).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::Commentary(_)));
        let stored = engine.repo().prediction_by_match(match_id).unwrap().unwrap();
        assert_eq!(stored.ai_commentary.as_deref(), Some("old"));

        let fresh = commentate(&engine, &CannedGenerator::ok("new"), &lock, match_id, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((fresh.status, fresh.text.as_str()), (CommentaryStatus::Generated, "new"));
    }

    #[tokio::test]
    async fn test_unknown_or_unpredictable_matches_yield_nothing() {
        let (engine, _) = engine_with_fixture();
        let gen = CannedGenerator::ok("text");
        let lock = Mutex::new(());
        assert!(commentate(&engine, &gen, &lock, 12345, false).await.unwrap().is_none());

        let db = engine.repo();
        let newcomer = db.upsert_team(77, "Sunderland").unwrap();
        let fixture = db
            .upsert_match(&crate::db::models::NewMatch {
                external_id: 901,
                kickoff: chrono::Utc::now(),
                home_team_id: newcomer,
                away_team_id: db.list_teams().unwrap()[0].id,
                home_score: None,
                away_score: None,
                status: crate::db::models::MatchStatus::Scheduled,
            })
            .unwrap();
        assert!(commentate(&engine, &gen, &lock, fixture, false).await.unwrap().is_none());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 0);
    }
}
