pub mod engine;
pub mod form;
pub mod predictor;
pub mod repository;
pub mod squad;

pub use engine::PredictionEngine;
pub use repository::MatchRepository;
