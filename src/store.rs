//! Embedded persistence (spec §6 "Persistence"): the `tasks`/`event_map`
//! tables behind a `SqlitePool`, bootstrapped the way the teacher's
//! `App::build` does (`Sqlite::database_exists`/`create_database` then
//! `sqlx::migrate!`).
//!
//! A single-writer discipline is enforced with an internal `tokio::sync::Mutex`
//! guarding write statements; `SqlitePool` already serializes at the
//! connection level for SQLite, but the mutex keeps multi-statement writes
//! (e.g. cascade deletes) atomic from the caller's perspective without
//! holding a long-lived transaction across backend HTTP calls (spec §9).

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{Sqlite, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{EventMapping, PersistedTask};

pub struct Store {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl Store {
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        if !Sqlite::database_exists(db_path).await.unwrap_or(false) {
            Sqlite::create_database(db_path).await?;
        }
        let pool = SqlitePool::connect(db_path).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, write_lock: Mutex::new(()) })
    }

    /// Inserts one task row. Commits immediately — callers insert per child
    /// after each successful backend POST so partial EC failures leave a
    /// coherent DB (spec §9).
    pub async fn insert_task(&self, task: &PersistedTask) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO tasks (id, title, parent_id) VALUES (?, ?, ?)")
            .bind(task.id.to_string())
            .bind(&task.title)
            .bind(task.parent_id.map(|id| id.to_string()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_event_mapping(&self, mapping: &EventMapping) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO event_map (task_id, backend_event_id, calendar_id) VALUES (?, ?, ?)",
        )
        .bind(mapping.task_id.to_string())
        .bind(&mapping.backend_event_id)
        .bind(&mapping.calendar_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_tasks(&self) -> Result<Vec<PersistedTask>, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, title, parent_id FROM tasks ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, title, parent_id)| {
                Some(PersistedTask {
                    id: Uuid::parse_str(&id).ok()?,
                    title,
                    parent_id: parent_id.and_then(|p| Uuid::parse_str(&p).ok()),
                })
            })
            .collect())
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<PersistedTask>, sqlx::Error> {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, title, parent_id FROM tasks WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, title, parent_id)| PersistedTask {
            id: Uuid::parse_str(&id).unwrap(),
            title,
            parent_id: parent_id.and_then(|p| Uuid::parse_str(&p).ok()),
        }))
    }

    pub async fn children_of(&self, parent_id: Uuid) -> Result<Vec<PersistedTask>, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, title, parent_id FROM tasks WHERE parent_id = ? ORDER BY rowid",
        )
        .bind(parent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, title, parent_id)| PersistedTask {
                id: Uuid::parse_str(&id).unwrap(),
                title,
                parent_id: parent_id.and_then(|p| Uuid::parse_str(&p).ok()),
            })
            .collect())
    }

    pub async fn event_mapping_for(
        &self,
        task_id: Uuid,
    ) -> Result<Option<EventMapping>, sqlx::Error> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT backend_event_id, calendar_id FROM event_map WHERE task_id = ?",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(backend_event_id, calendar_id)| EventMapping {
            task_id,
            backend_event_id,
            calendar_id,
        }))
    }

    /// Deletes one task row and its event mapping. Cascading to children is
    /// the caller's responsibility (`EventCreator` deletes backend events
    /// first, one per child, then calls this per row).
    pub async fn delete_task_row(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM event_map WHERE task_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_all_rows(&self) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM event_map").execute(&self.pool).await?;
        sqlx::query("DELETE FROM tasks").execute(&self.pool).await?;
        Ok(())
    }
}
