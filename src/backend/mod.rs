pub mod http;

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::domain::{BackendEvent, CalendarInfo, Instant};

#[derive(Debug, Clone)]
pub struct AddEventRequest {
    pub title: String,
    pub start: Instant,
    pub end: Instant,
    pub notes: Option<String>,
    pub calendar_id: String,
}

#[derive(Debug, Clone)]
pub struct AddEventResponse {
    pub id: String,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    #[error("calendar backend unavailable: {0}")]
    Unavailable(String),
    #[error("calendar backend rejected the request: {0}")]
    Rejected(String),
    #[error("calendar backend response could not be parsed: {0}")]
    Malformed(String),
}

/// The calendar backend HTTP contract pinned in spec §6, as a capability
/// trait so the scheduler/allotter test suite can swap in a fake.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn status(&self) -> Result<bool, BackendError>;
    async fn calendars(&self) -> Result<Vec<CalendarInfo>, BackendError>;
    async fn events(
        &self,
        days: u32,
        calendar_id: Option<&str>,
        exclude_holidays: bool,
        tz: Tz,
    ) -> Result<Vec<BackendEvent>, BackendError>;
    async fn add(&self, req: AddEventRequest) -> Result<AddEventResponse, BackendError>;
    /// Returns `true` on success; a backend "not found" is also success
    /// (idempotent delete, spec §4.8).
    async fn delete(&self, event_id: &str) -> Result<bool, BackendError>;
}
