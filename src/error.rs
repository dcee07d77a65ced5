use thiserror::Error;

/// Failures raised by the SQLite repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("unknown match status '{0}'")]
    UnknownStatus(String),
}

impl StoreError {
    /// Whether the error means the store itself is unusable, as opposed to a
    /// single row that failed to decode.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => !matches!(
                e,
                rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..)
            ),
            StoreError::Poisoned => true,
            StoreError::UnknownStatus(_) => false,
        }
    }
}

/// Failures raised while predicting a single fixture.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("match {0} is already finished")]
    AlreadyFinished(i64),

    #[error("match {match_id} lists team {team_id} on both sides")]
    SameTeam { match_id: i64, team_id: i64 },
}

impl ForecastError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ForecastError::Store(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Failures of the out-of-band commentary call.
#[derive(Debug, Error)]
pub enum CommentaryError {
    #[error("commentary request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("commentary service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("commentary service returned no text")]
    Empty,
}

/// Failures of the analyze workflow (prediction plus commentary).
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Commentary(#[from] CommentaryError),

    #[error("prediction for match {0} changed while commentary was generated")]
    Superseded(i64),
}

impl From<StoreError> for AnalyzeError {
    fn from(e: StoreError) -> Self {
        AnalyzeError::Forecast(ForecastError::Store(e))
    }
}
