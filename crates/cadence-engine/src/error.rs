use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] cadence_core::CoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
