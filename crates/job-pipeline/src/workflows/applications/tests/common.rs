use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::workflows::applications::domain::{
    ApplicationHistory, ApplicationId, ApplicationRecord, CompanyId, NewApplication, OwnerId,
    StatusHistoryEntry,
};
use crate::workflows::applications::repository::{ApplicationRepository, RepositoryError};
use crate::workflows::applications::{pipeline_router, FixedClock, PipelineService};
use crate::workflows::catalog::{StatusCatalog, StatusId};

pub(super) const OWNER: &str = "cian@example.com";
pub(super) const OTHER_OWNER: &str = "someone.else@example.com";

pub(super) fn owner() -> OwnerId {
    OwnerId::new(OWNER)
}

pub(super) fn other_owner() -> OwnerId {
    OwnerId::new(OTHER_OWNER)
}

pub(super) fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn now() -> DateTime<Utc> {
    day(2, 1)
}

pub(super) fn new_application(status: u32, applied: DateTime<Utc>) -> NewApplication {
    NewApplication {
        owner: owner(),
        company_id: CompanyId(42),
        title: "Platform Engineer".to_string(),
        location: "Dublin".to_string(),
        applied_date: applied,
        initial_status_id: StatusId(status),
    }
}

pub(super) type TestService = PipelineService<MemoryRepository, FixedClock>;

pub(super) fn build_service() -> (TestService, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = service_with(repository.clone());
    (service, repository)
}

pub(super) fn service_with<R>(repository: Arc<R>) -> PipelineService<R, FixedClock>
where
    R: ApplicationRepository + 'static,
{
    PipelineService::with_clock(
        Arc::new(StatusCatalog::standard()),
        repository,
        PipelineConfig::default(),
        FixedClock(now()),
    )
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<ApplicationId, ApplicationRecord>,
    history: BTreeMap<ApplicationId, Vec<StatusHistoryEntry>>,
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    sequence: Arc<AtomicU64>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub(super) fn history_len(&self, id: ApplicationId) -> usize {
        let state = self.state.lock().expect("repository mutex poisoned");
        state.history.get(&id).map(Vec::len).unwrap_or(0)
    }

    pub(super) fn record_count(&self) -> usize {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .records
            .len()
    }

    /// Plant a record with no history to simulate a broken store.
    pub(super) fn insert_bare_record(&self, record: ApplicationRecord) {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.records.insert(record.id, record);
    }
}

impl ApplicationRepository for MemoryRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        Ok(ApplicationId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn create(
        &self,
        record: ApplicationRecord,
        first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        if state.records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        state.records.insert(record.id, record.clone());
        state.history.insert(record.id, vec![first_entry.clone()]);
        Ok(ApplicationHistory {
            record,
            entries: vec![first_entry],
        })
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.records.get(&id).map(|record| ApplicationHistory {
            record: record.clone(),
            entries: state.history.get(&id).cloned().unwrap_or_default(),
        }))
    }

    fn append(
        &self,
        entry: StatusHistoryEntry,
        expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let record = state
            .records
            .get_mut(&entry.application_id)
            .ok_or(RepositoryError::NotFound)?;
        if record.last_record_timestamp != expected_last_record {
            return Err(RepositoryError::StaleWrite);
        }
        record.current_status_id = entry.status_id;
        record.last_record_timestamp = entry.timestamp;
        let updated = record.clone();
        state
            .history
            .entry(entry.application_id)
            .or_default()
            .push(entry);
        Ok(updated)
    }

    fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.history.remove(&id);
        state
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn histories_for_owner(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<ApplicationHistory>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .records
            .values()
            .filter(|record| record.is_owned_by(owner))
            .map(|record| ApplicationHistory {
                record: record.clone(),
                entries: state.history.get(&record.id).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

/// Store whose writes always lose the optimistic concurrency check.
#[derive(Default)]
pub(super) struct StaleWriteRepository {
    pub(super) inner: MemoryRepository,
}

impl ApplicationRepository for StaleWriteRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        self.inner.next_id()
    }

    fn create(
        &self,
        record: ApplicationRecord,
        first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError> {
        self.inner.create(record, first_entry)
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn append(
        &self,
        _entry: StatusHistoryEntry,
        _expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::StaleWrite)
    }

    fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }

    fn histories_for_owner(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<ApplicationHistory>, RepositoryError> {
        self.inner.histories_for_owner(owner)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        Ok(ApplicationId(1))
    }

    fn create(
        &self,
        _record: ApplicationRecord,
        _first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn append(
        &self,
        _entry: StatusHistoryEntry,
        _expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: ApplicationId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn histories_for_owner(
        &self,
        _owner: &OwnerId,
    ) -> Result<Vec<ApplicationHistory>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Store that accepts a record but drops its first entry on the floor.
#[derive(Default)]
pub(super) struct HistoryDroppingRepository {
    pub(super) inner: MemoryRepository,
}

impl ApplicationRepository for HistoryDroppingRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        self.inner.next_id()
    }

    fn create(
        &self,
        record: ApplicationRecord,
        _first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError> {
        self.inner.insert_bare_record(record.clone());
        Ok(ApplicationHistory {
            record,
            entries: Vec::new(),
        })
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn append(
        &self,
        entry: StatusHistoryEntry,
        expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.append(entry, expected_last_record)
    }

    fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }

    fn histories_for_owner(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<ApplicationHistory>, RepositoryError> {
        self.inner.histories_for_owner(owner)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    pipeline_router(Arc::new(service))
}
