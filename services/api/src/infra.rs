use chrono::{DateTime, Utc};
use job_pipeline::workflows::applications::{
    ApplicationHistory, ApplicationId, ApplicationRecord, ApplicationRepository, OwnerId,
    RepositoryError, StatusHistoryEntry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Store {
    next_id: u64,
    records: HashMap<ApplicationId, ApplicationRecord>,
    history: HashMap<ApplicationId, Vec<StatusHistoryEntry>>,
}

impl Store {
    fn history_of(&self, record: &ApplicationRecord) -> ApplicationHistory {
        ApplicationHistory {
            record: record.clone(),
            entries: self.history.get(&record.id).cloned().unwrap_or_default(),
        }
    }
}

/// Process-local store; records and history share one lock so every write is atomic.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryApplicationRepository {
    fn store(&self) -> Result<MutexGuard<'_, Store>, RepositoryError> {
        self.store
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        let mut store = self.store()?;
        store.next_id += 1;
        Ok(ApplicationId(store.next_id))
    }

    fn create(
        &self,
        record: ApplicationRecord,
        first_entry: StatusHistoryEntry,
    ) -> Result<ApplicationHistory, RepositoryError> {
        let mut store = self.store()?;
        if store.records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        store.history.insert(record.id, vec![first_entry]);
        store.records.insert(record.id, record.clone());
        Ok(store.history_of(&record))
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationHistory>, RepositoryError> {
        let store = self.store()?;
        Ok(store.records.get(&id).map(|record| store.history_of(record)))
    }

    fn append(
        &self,
        entry: StatusHistoryEntry,
        expected_last_record: DateTime<Utc>,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut store = self.store()?;
        let record = store
            .records
            .get_mut(&entry.application_id)
            .ok_or(RepositoryError::NotFound)?;
        if record.last_record_timestamp != expected_last_record {
            return Err(RepositoryError::StaleWrite);
        }
        record.current_status_id = entry.status_id;
        record.last_record_timestamp = entry.timestamp;
        let updated = record.clone();
        store
            .history
            .entry(entry.application_id)
            .or_default()
            .push(entry);
        Ok(updated)
    }

    fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        let mut store = self.store()?;
        if !store.records.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        store.history.remove(&id);
        store.records.remove(&id);
        Ok(())
    }

    fn histories_for_owner(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<ApplicationHistory>, RepositoryError> {
        let store = self.store()?;
        Ok(store
            .records
            .values()
            .filter(|record| record.is_owned_by(owner))
            .map(|record| store.history_of(record))
            .collect())
    }
}
