use redlead_db::DbError;
use redlead_reddit::RedditError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Reddit(#[from] RedditError),

    #[error("no active Reddit account for organization {0}")]
    NoActiveAccount(Uuid),
}

impl PipelineError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Db(e) if e.is_not_found())
    }

    /// The target record is in a state that does not allow the operation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Db(e) => e.is_invalid_transition(),
            Self::NoActiveAccount(_) => true,
            Self::Reddit(_) => false,
        }
    }
}
