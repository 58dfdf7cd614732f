use chrono::{DateTime, Utc};
use hive_core::lifecycle::StateTransition;
use hive_core::state::TaskStatus;
use hive_core::types::{NewTask, Task, TaskId};
use hive_core::workspace::{database_path, events_dir, state_dir};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("timestamp parse error for value '{value}': {source}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unknown status tag '{value}'")]
    UnknownStatus { value: String },
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("task {id} does not exist")]
    TaskNotFound { id: TaskId },
}

/// One row of the transition audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
    /// Action tag, `None` for forced changes and reconciliation.
    pub action: Option<String>,
    pub forced: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open the store of an initialized repository.
    pub fn open_repository(repo: &Path) -> Result<Self, StoreError> {
        let store = Self::open(database_path(repo))?;
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status_tag);

CREATE TABLE IF NOT EXISTS transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    from_tag TEXT NOT NULL,
    to_tag TEXT NOT NULL,
    action TEXT,
    forced INTEGER NOT NULL DEFAULT 0,
    at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transitions_task ON transitions(task_id, id);
"#,
        )?;
        Ok(())
    }

    /// Insert a task; the id comes from the table's AUTOINCREMENT sequence so
    /// ids are never reused, even after deletes.
    pub fn create_task(&self, new: NewTask, at: DateTime<Utc>) -> Result<Task, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
INSERT INTO tasks (status_tag, payload_json, created_at, updated_at)
VALUES (?1, '{}', ?2, ?2)
"#,
            params![TaskStatus::Todo.as_str(), at.to_rfc3339()],
        )?;
        let id = TaskId(tx.last_insert_rowid() as u64);
        let task = new.into_task(id, at);
        tx.execute(
            "UPDATE tasks SET payload_json = ?1 WHERE id = ?2",
            params![serde_json::to_string(&task)?, id.0 as i64],
        )?;
        tx.commit()?;
        tracing::info!(task_id = %id, title = %task.title, "task created");
        Ok(task)
    }

    pub fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let payload = serde_json::to_string(task)?;
        let updated = self.conn.execute(
            r#"
UPDATE tasks
SET status_tag = ?1, payload_json = ?2, updated_at = ?3
WHERE id = ?4
"#,
            params![
                task.status.as_str(),
                payload,
                task.updated_at.to_rfc3339(),
                task.id.0 as i64,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id: task.id });
        }
        Ok(())
    }

    pub fn load_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM tasks WHERE id = ?1",
                params![task_id.0 as i64],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Task>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM tasks ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tasks = Vec::new();
        for row in rows {
            let payload = row?;
            tasks.push(serde_json::from_str::<Task>(&payload)?);
        }
        Ok(tasks)
    }

    pub fn record_transition(
        &self,
        task_id: TaskId,
        transition: &StateTransition,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
INSERT INTO transitions (task_id, from_tag, to_tag, action, forced, at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                task_id.0 as i64,
                transition.from.as_str(),
                transition.to.as_str(),
                transition.action.map(|action| action.as_str()),
                transition.forced,
                transition.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_transitions(&self, task_id: TaskId) -> Result<Vec<TransitionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT from_tag, to_tag, action, forced, at
FROM transitions WHERE task_id = ?1 ORDER BY id ASC
"#,
        )?;
        let rows = stmt.query_map(params![task_id.0 as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (from_tag, to_tag, action, forced, at) = row?;
            records.push(TransitionRecord {
                task_id,
                from: parse_status(from_tag)?,
                to: parse_status(to_tag)?,
                action,
                forced,
                at: parse_timestamp(at)?,
            });
        }
        Ok(records)
    }
}

fn parse_status(value: String) -> Result<TaskStatus, StoreError> {
    value
        .parse::<TaskStatus>()
        .map_err(|_| StoreError::UnknownStatus { value })
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse { value, source })
}

/// Create `.hive/`, `.hive/events/` and a migrated database under `repo`.
pub fn init_repository(repo: &Path) -> Result<SqliteStore, StoreError> {
    for dir in [state_dir(repo), events_dir(repo)] {
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }
    let store = SqliteStore::open_repository(repo)?;
    tracing::info!(repo = %repo.display(), "repository initialized");
    Ok(store)
}

pub fn is_initialized(repo: &Path) -> bool {
    database_path(repo).is_file()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use hive_core::lifecycle::{force_status, start_task, transition_task, TaskAction};
    use hive_core::state::TaskStatus;
    use hive_core::types::{NewTask, TaskId};
    use hive_core::workspace::{check_health, events_dir, RepoHealth};

    use super::*;

    fn mk_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("in-memory store");
        store.migrate().expect("migrate");
        store
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let store = mk_store();
        let first = store
            .create_task(NewTask::titled("Fix login"), t0())
            .expect("create first");
        let second = store
            .create_task(NewTask::titled("Add docs"), t0())
            .expect("create second");
        assert_eq!(first.id, TaskId(1));
        assert_eq!(second.id, TaskId(2));

        store
            .conn
            .execute("DELETE FROM tasks WHERE id = 2", [])
            .expect("delete");
        let third = store
            .create_task(NewTask::titled("Retry"), t0())
            .expect("create third");
        assert_eq!(third.id, TaskId(3));
    }

    #[test]
    fn update_and_reload_task_payload() {
        let store = mk_store();
        let mut task = store
            .create_task(NewTask::titled("Refactor parser"), t0())
            .expect("create");
        start_task(&mut task, "claude", "hive-app-1", t0() + Duration::seconds(5))
            .expect("start");
        store.update_task(&task).expect("update");

        let loaded = store.load_task(task.id).expect("load").expect("present");
        assert_eq!(loaded, task);
        assert_eq!(loaded.status, TaskStatus::InProgress);

        let listed = store.list_tasks().expect("list");
        assert_eq!(listed, vec![task.clone()]);
        assert!(store.load_task(TaskId(99)).expect("load").is_none());
    }

    #[test]
    fn updating_a_missing_task_is_an_error() {
        let store = mk_store();
        let task = NewTask::titled("ghost").into_task(TaskId(7), t0());
        let err = store.update_task(&task).expect_err("missing task");
        assert!(matches!(err, StoreError::TaskNotFound { id } if id == TaskId(7)));
    }

    #[test]
    fn list_tasks_is_ordered_by_id() {
        let store = mk_store();
        for title in ["a", "b", "c"] {
            store
                .create_task(NewTask::titled(title), t0())
                .expect("create");
        }
        let titles: Vec<_> = store
            .list_tasks()
            .expect("list")
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn transitions_are_audited_with_forced_flag() {
        let store = mk_store();
        let mut task = store
            .create_task(NewTask::titled("Audit me"), t0())
            .expect("create");

        let started = start_task(&mut task, "codex", "hive-app-1", t0()).expect("start");
        store.record_transition(task.id, &started).expect("record");
        let stopped =
            transition_task(&mut task, TaskAction::Stop, t0() + Duration::seconds(1)).expect("stop");
        store.record_transition(task.id, &stopped).expect("record");
        let forced = force_status(&mut task, TaskStatus::Done, t0() + Duration::seconds(2))
            .expect("force");
        store.record_transition(task.id, &forced).expect("record");

        let records = store.list_transitions(task.id).expect("list");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].action.as_deref(), Some("start"));
        assert_eq!(records[1].to, TaskStatus::Stopped);
        assert!(records[2].forced);
        assert_eq!(records[2].action, None);
        assert_eq!(records[2].from, TaskStatus::Stopped);
        assert_eq!(records[2].to, TaskStatus::Done);
        assert_eq!(records[2].at, t0() + Duration::seconds(2));
    }

    #[test]
    fn init_repository_makes_repo_healthy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = dir.path().join("app");
        std::fs::create_dir_all(repo.join(".git")).expect("git dir");
        assert!(!is_initialized(&repo));
        assert_eq!(check_health(&repo, None), RepoHealth::Uninitialized);

        let store = init_repository(&repo).expect("init");
        assert!(is_initialized(&repo));
        assert!(events_dir(&repo).is_dir());
        assert_eq!(check_health(&repo, None), RepoHealth::Healthy);

        let task = store
            .create_task(NewTask::titled("persisted"), t0())
            .expect("create");
        drop(store);
        let reopened = SqliteStore::open_repository(&repo).expect("reopen");
        assert_eq!(reopened.load_task(task.id).expect("load"), Some(task));
    }
}
