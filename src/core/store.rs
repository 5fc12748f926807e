use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::settings::config_dir;

/// Task priority. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Unknown values fall back to the default rather than failing a row read.
    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

/// Status filter for task listings. Anything unrecognized behaves as `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => StatusFilter::Pending,
            "completed" => StatusFilter::Completed,
            _ => StatusFilter::All,
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// SQLite-backed store for tasks, conversations, and messages.
///
/// Every query is scoped by user id in the SQL itself; a row belonging to
/// another user is indistinguishable from a missing row.
pub struct Store {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    completed INTEGER NOT NULL DEFAULT 0,
    priority TEXT NOT NULL DEFAULT 'medium',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);";

impl Store {
    /// Open (or create) the database at ~/.taskchat/tasks.db
    pub fn open() -> Result<Self> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Self::open_at(dir.join("tasks.db"))
    }

    /// Open the database at a specific path.
    pub fn open_at(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("lock error: {}", e))
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    pub fn create_task(&self, user_id: &str, title: &str, description: &str) -> Result<Task> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks (user_id, title, description) VALUES (?1, ?2, ?3)",
            params![user_id, title, description],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_task(user_id, id)?
            .ok_or_else(|| anyhow::anyhow!("task {} vanished after insert", id))
    }

    pub fn get_task(&self, user_id: &str, task_id: i64) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn list_tasks(&self, user_id: &str, filter: StatusFilter) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut sql = String::from(
            "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
             FROM tasks WHERE user_id = ?1",
        );
        match filter {
            StatusFilter::Pending => sql.push_str(" AND completed = 0"),
            StatusFilter::Completed => sql.push_str(" AND completed = 1"),
            StatusFilter::All => {}
        }
        sql.push_str(" ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![user_id], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Exact-title lookup used by the argument resolver. When several tasks
    /// share a title, the one with the lowest id wins.
    pub fn find_task_by_title(&self, user_id: &str, title: &str) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                "SELECT id, user_id, title, description, completed, priority, created_at, updated_at
                 FROM tasks WHERE user_id = ?1 AND title = ?2 ORDER BY id ASC LIMIT 1",
                params![user_id, title],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Partial update: `None` fields are left unchanged. Returns the updated
    /// row, or `None` if no task with that id belongs to the user.
    pub fn update_task(
        &self,
        user_id: &str,
        task_id: i64,
        title: Option<&str>,
        description: Option<&str>,
        completed: Option<bool>,
    ) -> Result<Option<Task>> {
        {
            let conn = self.lock()?;
            let changed = conn.execute(
                "UPDATE tasks SET
                     title = COALESCE(?3, title),
                     description = COALESCE(?4, description),
                     completed = COALESCE(?5, completed),
                     updated_at = datetime('now')
                 WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id, title, description, completed],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_task(user_id, task_id)
    }

    /// Permanent delete. Returns false when the task does not exist for the
    /// user (including tasks owned by someone else).
    pub fn delete_task(&self, user_id: &str, task_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(changed > 0)
    }

    // ── Conversations & messages ────────────────────────────────────────

    pub fn create_conversation(&self, user_id: &str) -> Result<Conversation> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversations (user_id) VALUES (?1)",
            params![user_id],
        )?;
        let id = conn.last_insert_rowid();
        let conversation = conn.query_row(
            "SELECT id, user_id, created_at, updated_at FROM conversations WHERE id = ?1",
            params![id],
            conversation_from_row,
        )?;
        Ok(conversation)
    }

    pub fn get_conversation(&self, user_id: &str, id: i64) -> Result<Option<Conversation>> {
        let conn = self.lock()?;
        let conversation = conn
            .query_row(
                "SELECT id, user_id, created_at, updated_at
                 FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn touch_conversation(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn append_message(
        &self,
        conversation_id: i64,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (conversation_id, user_id, role, content) VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, user_id, role.as_str(), content],
        )?;
        Ok(())
    }

    /// Message history in creation order (id breaks same-second ties).
    pub fn list_messages(&self, user_id: &str, conversation_id: i64) -> Result<Vec<StoredMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, user_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1 AND user_id = ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let messages = stmt
            .query_map(params![conversation_id, user_id], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    user_id: row.get(2)?,
                    role: row.get(3)?,
                    content: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

fn task_from_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let priority: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        completed: row.get(4)?,
        priority: Priority::parse(&priority),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn conversation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}
