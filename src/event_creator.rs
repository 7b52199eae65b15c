//! EventCreator (EC) — spec §4.8. The only side-effecting leaf: POSTs
//! backend events, persists `tasks`/`event_map` rows, and performs
//! cascade/idempotent deletes.
//!
//! Commits per child, immediately after each successful POST, rather than
//! holding one transaction across the whole backend round-trip (spec §9)
//! — a partial failure midway still leaves a coherent DB.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{AddEventRequest, CalendarBackend};
use crate::domain::{EventMapping, PersistedTask, ScheduledTask};
use crate::error::PipelineError;
use crate::store::Store;

fn note_for(id: Uuid, parent_id: Option<Uuid>) -> String {
    match parent_id {
        Some(p) => format!("id: {id}, parent_id: {p}"),
        None => format!("id: {id}, parent_id: null"),
    }
}

/// Result of committing one [`ScheduledTask`]. `EcPartial` surfaces in the
/// trace but is not itself fatal — the successes already persisted.
pub struct CommitResult {
    pub created_backend_events: usize,
    pub total_backend_events: usize,
    pub failures: Vec<String>,
}

pub async fn commit(
    backend: &Arc<dyn CalendarBackend>,
    store: &Store,
    task: &ScheduledTask,
) -> Result<CommitResult, PipelineError> {
    match task {
        ScheduledTask::Simple { calendar_id, title, slot, id } => {
            let req = AddEventRequest {
                title: title.clone(),
                start: slot.start,
                end: slot.end,
                notes: Some(note_for(*id, None)),
                calendar_id: calendar_id.clone(),
            };
            match backend.add(req).await {
                Ok(resp) => {
                    store
                        .insert_task(&PersistedTask { id: *id, title: title.clone(), parent_id: None })
                        .await
                        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
                    store
                        .insert_event_mapping(&EventMapping {
                            task_id: *id,
                            backend_event_id: resp.id,
                            calendar_id: calendar_id.clone(),
                        })
                        .await
                        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
                    Ok(CommitResult {
                        created_backend_events: 1,
                        total_backend_events: 1,
                        failures: Vec::new(),
                    })
                }
                Err(e) => Err(PipelineError::BackendUnavailable(e.to_string())),
            }
        }
        ScheduledTask::Complex { calendar_id, title, id, subtasks } => {
            store
                .insert_task(&PersistedTask { id: *id, title: title.clone(), parent_id: None })
                .await
                .map_err(|e| PipelineError::TaValidation(e.to_string()))?;

            let total = subtasks.len();
            let mut created = 0;
            let mut failures = Vec::new();

            for child in subtasks {
                let req = AddEventRequest {
                    title: child.title.clone(),
                    start: child.slot.start,
                    end: child.slot.end,
                    notes: Some(note_for(child.id, Some(*id))),
                    calendar_id: calendar_id.clone(),
                };
                match backend.add(req).await {
                    Ok(resp) => {
                        store
                            .insert_task(&PersistedTask {
                                id: child.id,
                                title: child.title.clone(),
                                parent_id: Some(*id),
                            })
                            .await
                            .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
                        store
                            .insert_event_mapping(&EventMapping {
                                task_id: child.id,
                                backend_event_id: resp.id,
                                calendar_id: calendar_id.clone(),
                            })
                            .await
                            .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
                        created += 1;
                    }
                    Err(e) => {
                        tracing::warn!(subtask = %child.title, error = %e, "EC subtask POST failed");
                        failures.push(format!("{}: {e}", child.title));
                    }
                }
            }

            Ok(CommitResult {
                created_backend_events: created,
                total_backend_events: total,
                failures,
            })
        }
    }
}

/// Cascade-deletes a task by id: if it is a parent, deletes every child's
/// backend event first, then the parent row; a simple task deletes its
/// one backend event and row. Backend "not found" counts as success
/// (spec invariant 9, idempotent delete).
pub async fn delete_by_task_id(
    backend: &Arc<dyn CalendarBackend>,
    store: &Store,
    task_id: Uuid,
) -> Result<usize, PipelineError> {
    let mut deleted = 0;
    let children = store
        .children_of(task_id)
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;

    for child in &children {
        deleted += delete_one(backend, store, child.id).await?;
    }
    deleted += delete_one(backend, store, task_id).await?;
    Ok(deleted)
}

/// Deletes only the children of `parent_id`, leaving the parent row.
pub async fn delete_by_parent_id(
    backend: &Arc<dyn CalendarBackend>,
    store: &Store,
    parent_id: Uuid,
) -> Result<usize, PipelineError> {
    let children = store
        .children_of(parent_id)
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
    let mut deleted = 0;
    for child in &children {
        deleted += delete_one(backend, store, child.id).await?;
    }
    Ok(deleted)
}

/// Deletes one row and, if it has a backend mapping, its backend event.
/// Returns 1 only when a backend event was actually deleted — a parent
/// row never has one (spec §4.8), so cascade-deleting a complex task
/// reports the child count, not the row count (spec §8 S5).
async fn delete_one(
    backend: &Arc<dyn CalendarBackend>,
    store: &Store,
    task_id: Uuid,
) -> Result<usize, PipelineError> {
    let had_backend_event = store
        .event_mapping_for(task_id)
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
    if let Some(mapping) = &had_backend_event {
        backend
            .delete(&mapping.backend_event_id)
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
    }
    store
        .delete_task_row(task_id)
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
    Ok(if had_backend_event.is_some() { 1 } else { 0 })
}

/// Deletes every task, attempting the backend delete for each one with a
/// mapping first, then clearing both tables. Requires the caller to have
/// already collected the `yes` confirmation sentinel (spec §6).
pub async fn delete_all(
    backend: &Arc<dyn CalendarBackend>,
    store: &Store,
) -> Result<usize, PipelineError> {
    let tasks = store
        .list_tasks()
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
    let mut deleted = 0;
    for task in &tasks {
        if let Some(mapping) = store
            .event_mapping_for(task.id)
            .await
            .map_err(|e| PipelineError::TaValidation(e.to_string()))?
        {
            backend
                .delete(&mapping.backend_event_id)
                .await
                .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
            deleted += 1;
        }
    }
    store
        .delete_all_rows()
        .await
        .map_err(|e| PipelineError::TaValidation(e.to_string()))?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pins the reconciliation-key format spec §6 relies on for matching a
    /// backend event back to its DB row: `"id: <uuid>, parent_id: <uuid|null>"`.
    #[test]
    fn note_format_matches_spec_reconciliation_key() {
        let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(
            note_for(id, None),
            "id: 11111111-1111-1111-1111-111111111111, parent_id: null"
        );

        let parent = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        assert_eq!(
            note_for(id, Some(parent)),
            "id: 11111111-1111-1111-1111-111111111111, parent_id: 22222222-2222-2222-2222-222222222222"
        );
    }
}
