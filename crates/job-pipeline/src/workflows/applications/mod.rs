//! Application records, their append-only status history, and the service that
//! keeps the two consistent.

pub mod domain;
mod locks;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationHistory, ApplicationId, ApplicationRecord, ApplicationView, CompanyId,
    HistoryEntryView, IntegrityViolation, NewApplication, OwnerId, StatusHistoryEntry,
};
pub use repository::{ApplicationRepository, RepositoryError};
pub use router::{pipeline_router, OWNER_HEADER};
pub use service::{Clock, FixedClock, ListFilter, PipelineError, PipelineService, SystemClock};
