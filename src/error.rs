use sea_orm::DbErr;
use thiserror::Error;

pub type Result<T, E = ProcessEventError> = std::result::Result<T, E>;

/// Errors that abort processing of a whole event batch. Per-event payload
/// problems are logged and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum ProcessEventError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// An insert lost the unique-hash race but the winning row could not be
    /// read back. Retrying the batch is the only sane response.
    #[error("issue hash {hash} for project {project_id} vanished after conflict")]
    HashVanished { project_id: i32, hash: String },
}
