//! Live HTTP adapter for the `CalBridge`-shaped calendar backend (spec §6).
//!
//! Follows the teacher's `reqwest::Client` usage (plain client, JSON
//! (de)serialization via `serde`) rather than introducing a second HTTP
//! stack for this collaborator.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::{BackendEvent, CalendarInfo};

use super::{AddEventRequest, AddEventResponse, BackendError, CalendarBackend};

pub struct HttpCalendarBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCalendarBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct StatusResp {
    authorized: bool,
}

#[derive(Deserialize)]
struct CalendarResp {
    id: String,
    title: String,
    allows_modifications: bool,
}

#[derive(Deserialize)]
struct EventResp {
    id: String,
    title: String,
    start_iso: String,
    end_iso: String,
    calendar_id: String,
    calendar_title: String,
}

#[derive(Serialize)]
struct AddReq {
    title: String,
    start_iso: String,
    end_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    calendar_id: String,
}

#[derive(Deserialize)]
struct AddResp {
    id: String,
}

#[derive(Deserialize)]
struct DeleteResp {
    deleted: bool,
}

fn parse_iso(s: &str, tz: Tz) -> Result<DateTime<Tz>, BackendError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&tz))
        .map_err(|e| BackendError::Malformed(format!("bad timestamp {s:?}: {e}")))
}

fn fmt_iso(dt: &DateTime<Tz>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

#[async_trait]
impl CalendarBackend for HttpCalendarBackend {
    async fn status(&self) -> Result<bool, BackendError> {
        let resp = self
            .http
            .get(self.url("/status"))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status: StatusResp = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(status.authorized)
    }

    async fn calendars(&self) -> Result<Vec<CalendarInfo>, BackendError> {
        let resp = self
            .http
            .get(self.url("/calendars"))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let cals: Vec<CalendarResp> = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(cals
            .into_iter()
            .map(|c| CalendarInfo {
                id: c.id,
                title: c.title,
                writable: c.allows_modifications,
            })
            .collect())
    }

    async fn events(
        &self,
        days: u32,
        calendar_id: Option<&str>,
        exclude_holidays: bool,
        tz: Tz,
    ) -> Result<Vec<BackendEvent>, BackendError> {
        let mut req = self
            .http
            .get(self.url("/events"))
            .query(&[("days", days.to_string())]);
        if let Some(cal) = calendar_id {
            req = req.query(&[("calendar_id", cal)]);
        }
        if exclude_holidays {
            req = req.query(&[("exclude_holidays", "true")]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let events: Vec<EventResp> = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        events
            .into_iter()
            .map(|e| {
                Ok(BackendEvent {
                    id: e.id,
                    title: e.title,
                    start: parse_iso(&e.start_iso, tz)?,
                    end: parse_iso(&e.end_iso, tz)?,
                    calendar_id: e.calendar_id,
                    calendar_title: e.calendar_title,
                })
            })
            .collect()
    }

    async fn add(&self, req: AddEventRequest) -> Result<AddEventResponse, BackendError> {
        let body = AddReq {
            title: req.title,
            start_iso: fmt_iso(&req.start),
            end_iso: fmt_iso(&req.end),
            notes: req.notes,
            calendar_id: req.calendar_id,
        };
        let resp = self
            .http
            .post(self.url("/add"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "backend returned {}",
                resp.status()
            )));
        }
        let added: AddResp = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(AddEventResponse { id: added.id })
    }

    async fn delete(&self, event_id: &str) -> Result<bool, BackendError> {
        let resp = self
            .http
            .post(self.url("/delete"))
            .query(&[("event_id", event_id)])
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }
        let deleted: DeleteResp = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(deleted.deleted)
    }
}
