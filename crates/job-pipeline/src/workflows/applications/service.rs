use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::domain::{
    ApplicationHistory, ApplicationId, ApplicationRecord, IntegrityViolation, NewApplication,
    OwnerId, StatusHistoryEntry,
};
use super::locks::{ApplicationGuard, ApplicationLocks};
use super::repository::{ApplicationRepository, RepositoryError};
use crate::config::PipelineConfig;
use crate::workflows::analytics::{ActivityAggregator, ActivityCalendar, FlowGraph};
use crate::workflows::catalog::{StatusCatalog, StatusId};

/// Source of "now" for transitions recorded without an explicit timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Read filter for [`PipelineService::list`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ListFilter {
    /// Drop applications whose current status sits in the Outcome stage.
    pub hide_completed: bool,
}

/// Facade applying status changes while keeping record and history in step.
pub struct PipelineService<R, C = SystemClock> {
    catalog: Arc<StatusCatalog>,
    repository: Arc<R>,
    clock: C,
    locks: ApplicationLocks,
    config: PipelineConfig,
}

impl<R> PipelineService<R, SystemClock>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(catalog: Arc<StatusCatalog>, repository: Arc<R>, config: PipelineConfig) -> Self {
        Self::with_clock(catalog, repository, config, SystemClock)
    }
}

impl<R, C> PipelineService<R, C>
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    pub fn with_clock(
        catalog: Arc<StatusCatalog>,
        repository: Arc<R>,
        config: PipelineConfig,
        clock: C,
    ) -> Self {
        Self {
            catalog,
            repository,
            clock,
            locks: ApplicationLocks::new(config.lock_timeout),
            config,
        }
    }

    pub fn catalog(&self) -> &StatusCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a record and its first history entry as one unit.
    pub fn create_application(
        &self,
        application: NewApplication,
    ) -> Result<ApplicationRecord, PipelineError> {
        let NewApplication {
            owner,
            company_id,
            title,
            location,
            applied_date,
            initial_status_id,
        } = application;

        self.ensure_known(initial_status_id)?;

        let id = self.repository.next_id()?;
        let record = ApplicationRecord {
            id,
            owner,
            company_id,
            title,
            location,
            applied_date,
            current_status_id: initial_status_id,
            last_record_timestamp: applied_date,
        };
        let first_entry = StatusHistoryEntry {
            application_id: id,
            timestamp: applied_date,
            status_id: initial_status_id,
        };

        let stored = self.repository.create(record, first_entry)?;
        if let Some(violation) = stored.integrity_violation() {
            warn!(
                application_id = %id,
                %violation,
                "storage returned an inconsistent application"
            );
            if let Err(err) = self.repository.delete(id) {
                error!(
                    application_id = %id,
                    error = %err,
                    "failed to roll back inconsistent application"
                );
            }
            return Err(violation.into());
        }
        info!(
            application_id = %id,
            status_id = %initial_status_id,
            "created application"
        );
        Ok(stored.record)
    }

    /// Record `new_status_id` as of now.
    pub fn transition(
        &self,
        application_id: ApplicationId,
        owner: &OwnerId,
        new_status_id: StatusId,
    ) -> Result<ApplicationRecord, PipelineError> {
        let timestamp = self.clock.now();
        self.transition_at(application_id, owner, new_status_id, timestamp)
    }

    /// Append one history entry and move the cached current status to it.
    pub fn transition_at(
        &self,
        application_id: ApplicationId,
        owner: &OwnerId,
        new_status_id: StatusId,
        timestamp: DateTime<Utc>,
    ) -> Result<ApplicationRecord, PipelineError> {
        self.ensure_known(new_status_id)?;

        let _guard = self.lock(application_id)?;
        let history = self.owned(application_id, owner)?;
        let last = history.record.last_record_timestamp;
        if timestamp < last {
            return Err(PipelineError::OutOfOrderTimestamp {
                application_id,
                last,
                requested: timestamp,
            });
        }

        let entry = StatusHistoryEntry {
            application_id,
            timestamp,
            status_id: new_status_id,
        };
        let record = match self.repository.append(entry, last) {
            Ok(record) => record,
            Err(RepositoryError::StaleWrite) => {
                return Err(PipelineError::ConcurrentModification { application_id })
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            application_id = %application_id,
            from_status = %history.record.current_status_id,
            to_status = %new_status_id,
            "recorded status transition"
        );
        Ok(record)
    }

    /// Remove the application and its whole history.
    pub fn delete_application(
        &self,
        application_id: ApplicationId,
        owner: &OwnerId,
    ) -> Result<(), PipelineError> {
        let _guard = self.lock(application_id)?;
        self.owned(application_id, owner)?;
        self.repository.delete(application_id)?;
        info!(application_id = %application_id, "deleted application");
        Ok(())
    }

    pub fn get(
        &self,
        application_id: ApplicationId,
        owner: &OwnerId,
    ) -> Result<ApplicationHistory, PipelineError> {
        self.owned(application_id, owner)
    }

    /// Applications of `owner`, most recently touched first.
    pub fn list(
        &self,
        owner: &OwnerId,
        filter: ListFilter,
    ) -> Result<Vec<ApplicationHistory>, PipelineError> {
        let mut histories = self.repository.histories_for_owner(owner)?;
        if filter.hide_completed {
            histories.retain(|history| !history.is_completed(&self.catalog));
        }
        histories.sort_by(|left, right| {
            right
                .record
                .last_record_timestamp
                .cmp(&left.record.last_record_timestamp)
                .then(right.record.id.cmp(&left.record.id))
        });
        Ok(histories)
    }

    pub fn flow_graph(&self, owner: &OwnerId) -> Result<FlowGraph, PipelineError> {
        let histories = self.repository.histories_for_owner(owner)?;
        Ok(FlowGraph::from_histories(&histories))
    }

    pub fn activity(&self, owner: &OwnerId) -> Result<ActivityCalendar, PipelineError> {
        let histories = self.repository.histories_for_owner(owner)?;
        let mut aggregator = ActivityAggregator::new(self.config.activity_offset);
        for history in &histories {
            aggregator.push(history);
        }
        Ok(aggregator.finish())
    }

    fn ensure_known(&self, status_id: StatusId) -> Result<(), PipelineError> {
        if self.catalog.contains(status_id) {
            Ok(())
        } else {
            warn!(status_id = %status_id, "rejected unknown status");
            Err(PipelineError::InvalidStatus { status_id })
        }
    }

    fn lock(
        &self,
        application_id: ApplicationId,
    ) -> Result<ApplicationGuard<'_>, PipelineError> {
        self.locks.acquire(application_id).ok_or_else(|| {
            debug!(application_id = %application_id, "application lock contended");
            PipelineError::ConcurrentModification { application_id }
        })
    }

    fn owned(
        &self,
        application_id: ApplicationId,
        owner: &OwnerId,
    ) -> Result<ApplicationHistory, PipelineError> {
        self.repository
            .fetch(application_id)?
            .filter(|history| history.record.is_owned_by(owner))
            .ok_or(PipelineError::NotFound)
    }
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("status {status_id} is not in the catalog")]
    InvalidStatus { status_id: StatusId },
    #[error("application not found")]
    NotFound,
    #[error(transparent)]
    IntegrityViolation(#[from] IntegrityViolation),
    #[error("application {application_id} was modified concurrently; retry with a fresh read")]
    ConcurrentModification { application_id: ApplicationId },
    #[error(
        "transition for application {application_id} at {requested} precedes its last record at {last}"
    )]
    OutOfOrderTimestamp {
        application_id: ApplicationId,
        last: DateTime<Utc>,
        requested: DateTime<Utc>,
    },
    #[error(transparent)]
    Repository(RepositoryError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NotFound => StatusCode::NOT_FOUND,
            PipelineError::ConcurrentModification { .. }
            | PipelineError::OutOfOrderTimestamp { .. } => StatusCode::CONFLICT,
            PipelineError::IntegrityViolation(_) | PipelineError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}
