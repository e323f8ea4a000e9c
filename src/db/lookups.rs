//! Per-user category and priority lookups joined into task views.

use super::{now_local, Database};
use crate::error::{Result, TaskError};
use crate::types::{CategoryInfo, PriorityInfo, UserId};
use rusqlite::{params, Connection, OptionalExtension};

pub fn category_owned(conn: &Connection, user_id: UserId, category_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1 AND user_id = ?2",
            params![category_id, user_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn create_category(
    conn: &Connection,
    user_id: UserId,
    name: &str,
    description: Option<&str>,
    icon: Option<&str>,
) -> Result<CategoryInfo> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TaskError::InvalidArgument("category name is required".into()));
    }

    conn.execute(
        "INSERT INTO categories (user_id, name, description, icon) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, name, description, icon],
    )?;

    Ok(CategoryInfo {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        description: description.map(str::to_string),
        icon: icon.map(str::to_string),
    })
}

pub fn list_categories(conn: &Connection, user_id: UserId) -> Result<Vec<CategoryInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, icon FROM categories WHERE user_id = ?1 ORDER BY name, id",
    )?;
    let categories = stmt
        .query_map(params![user_id], |row| {
            Ok(CategoryInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                icon: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

/// Insert or recolor a priority level. Levels are unique per user.
pub fn set_priority(conn: &Connection, user_id: UserId, level: &str, color: &str) -> Result<PriorityInfo> {
    let level = level.trim();
    if level.is_empty() || color.trim().is_empty() {
        return Err(TaskError::InvalidArgument(
            "priority level and color are required".into(),
        ));
    }

    let now = now_local();
    conn.execute(
        "INSERT INTO priorities (user_id, level, color, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (level, user_id) DO UPDATE SET color = excluded.color, updated_at = excluded.updated_at",
        params![user_id, level, color, now],
    )?;

    Ok(PriorityInfo {
        level: level.to_string(),
        color: Some(color.to_string()),
    })
}

pub fn list_priorities(conn: &Connection, user_id: UserId) -> Result<Vec<PriorityInfo>> {
    let mut stmt =
        conn.prepare("SELECT level, color FROM priorities WHERE user_id = ?1 ORDER BY id")?;
    let priorities = stmt
        .query_map(params![user_id], |row| {
            Ok(PriorityInfo {
                level: row.get(0)?,
                color: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(priorities)
}

/// Display color for a priority label, if the user defined one.
pub fn priority_color(conn: &Connection, user_id: UserId, level: &str) -> Result<Option<String>> {
    let color = conn
        .query_row(
            "SELECT color FROM priorities WHERE level = ?1 AND user_id = ?2",
            params![level, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(color)
}

impl Database {
    pub fn create_category(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
    ) -> Result<CategoryInfo> {
        self.with_conn(|conn| create_category(conn, user_id, name, description, icon))
    }

    pub fn list_categories(&self, user_id: UserId) -> Result<Vec<CategoryInfo>> {
        self.with_conn(|conn| list_categories(conn, user_id))
    }

    pub fn set_priority(&self, user_id: UserId, level: &str, color: &str) -> Result<PriorityInfo> {
        self.with_conn(|conn| set_priority(conn, user_id, level, color))
    }

    pub fn list_priorities(&self, user_id: UserId) -> Result<Vec<PriorityInfo>> {
        self.with_conn(|conn| list_priorities(conn, user_id))
    }

    pub fn priority_color(&self, user_id: UserId, level: &str) -> Result<Option<String>> {
        self.with_conn(|conn| priority_color(conn, user_id, level))
    }
}
