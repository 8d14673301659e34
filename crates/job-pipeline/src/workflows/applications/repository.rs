use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationHistory, ApplicationId, ApplicationRecord, OwnerId, StatusHistoryEntry,
};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Implementations own identity allocation and must apply each method as a single
/// atomic unit: readers never observe a record without its first entry, or an
/// appended entry without the matching pointer update.
pub trait ApplicationRepository: Send + Sync {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError>;

    /// Persist a new record together with its first history entry.
    fn create(
        &self,
        record: ApplicationRecord,
        first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError>;

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError>;

    /// Append `entry` and move the record's `current_status_id` and
    /// `last_record_timestamp` to it, provided the stored `last_record_timestamp`
    /// still equals `expected_last_record`. Fails with [`RepositoryError::StaleWrite`]
    /// otherwise.
    fn append(
        &self,
        entry: StatusHistoryEntry,
        expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError>;

    /// Remove every history entry of the application, then the record itself.
    fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError>;

    /// All applications of one owner with their ordered histories.
    fn histories_for_owner(&self, owner: &OwnerId)
        -> Result<Vec<ApplicationHistory>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed since it was read")]
    StaleWrite,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
