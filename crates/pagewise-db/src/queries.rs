use crate::models::{FileRow, MessageRow, NewFile, SubscriptionUpdate, UserRow};
use crate::{Database, format_timestamp};
use anyhow::{Result, bail};
use chrono::Utc;
use pagewise_types::models::UploadStatus;
use rusqlite::{Connection, Row};

const FILE_COLUMNS: &str = "id, name, upload_status, url, key, user_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, text, is_user_message, user_id, file_id, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert the user if unknown. Returns true when a row was created.
    pub fn upsert_user(&self, id: &str, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
                (id, email),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, stripe_customer_id, stripe_subscription_id,
                        stripe_price_id, stripe_current_period_end
                 FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_subscription(&self, subscription_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, stripe_customer_id, stripe_subscription_id,
                        stripe_price_id, stripe_current_period_end
                 FROM users WHERE stripe_subscription_id = ?1",
                [subscription_id],
                user_from_row,
            )
            .optional()
        })
    }

    /// Record a new subscription on the user. Returns false for unknown users.
    pub fn set_user_subscription(&self, user_id: &str, update: &SubscriptionUpdate<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET stripe_customer_id = ?2, stripe_subscription_id = ?3,
                     stripe_price_id = ?4, stripe_current_period_end = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    user_id,
                    update.customer_id,
                    update.subscription_id,
                    update.price_id,
                    format_timestamp(update.current_period_end),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    /// Refresh price and period of an existing subscription (renewals).
    pub fn renew_subscription(
        &self,
        subscription_id: &str,
        price_id: &str,
        current_period_end: chrono::DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET stripe_price_id = ?2, stripe_current_period_end = ?3
                 WHERE stripe_subscription_id = ?1",
                rusqlite::params![subscription_id, price_id, format_timestamp(current_period_end)],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Files --

    /// Create the record for a freshly stored upload, already in `PROCESSING`.
    pub fn create_file(&self, file: &NewFile<'_>) -> Result<FileRow> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO files (id, name, upload_status, url, key, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    file.id,
                    file.name,
                    UploadStatus::Processing.as_str(),
                    file.url,
                    file.key,
                    file.user_id,
                    now,
                ],
            )?;
            Ok(FileRow {
                id: file.id.to_string(),
                name: file.name.to_string(),
                upload_status: UploadStatus::Processing.as_str().to_string(),
                url: file.url.to_string(),
                key: file.key.to_string(),
                user_id: file.user_id.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn list_files(&self, user_id: &str) -> Result<Vec<FileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], file_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_file(&self, id: &str, user_id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| query_file(conn, "id", id, user_id))
    }

    pub fn get_file_by_key(&self, key: &str, user_id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| query_file(conn, "key", key, user_id))
    }

    pub fn count_files(&self, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM files WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Delete a file owned by `user_id`, returning the deleted record.
    /// Its messages go with it (ON DELETE CASCADE).
    pub fn delete_file(&self, id: &str, user_id: &str) -> Result<Option<FileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(row) = query_file(&tx, "id", id, user_id)? else {
                return Ok(None);
            };
            tx.execute(
                "DELETE FROM files WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Move a file out of `PROCESSING` into a terminal status.
    ///
    /// Returns false when the file was not processing, which leaves
    /// already-finished files untouched.
    pub fn finish_processing(&self, id: &str, status: UploadStatus) -> Result<bool> {
        if !status.is_terminal() {
            bail!("{} is not a terminal upload status", status);
        }

        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE files SET upload_status = ?2, updated_at = ?3
                 WHERE id = ?1 AND upload_status = ?4",
                rusqlite::params![
                    id,
                    status.as_str(),
                    format_timestamp(Utc::now()),
                    UploadStatus::Processing.as_str(),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        file_id: &str,
        user_id: &str,
        text: &str,
        is_user_message: bool,
    ) -> Result<MessageRow> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, is_user_message, user_id, file_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, text, is_user_message, user_id, file_id, now],
            )?;
            Ok(MessageRow {
                id: id.to_string(),
                text: text.to_string(),
                is_user_message,
                user_id: user_id.to_string(),
                file_id: file_id.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// The latest `limit` messages of a file, oldest first.
    pub fn recent_messages(&self, file_id: &str, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE file_id = ?1 AND user_id = ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![file_id, user_id, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// One page of a file's messages, newest first.
    ///
    /// With a cursor, the page starts at the cursor message itself. An
    /// unknown cursor yields an empty page. `take` rows at most.
    pub fn page_messages(
        &self,
        file_id: &str,
        user_id: &str,
        cursor: Option<&str>,
        take: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE file_id = ?1 AND user_id = ?2
                   AND (?3 IS NULL OR (created_at, rowid) <= (
                        SELECT created_at, rowid FROM messages WHERE id = ?3 AND file_id = ?1))
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![file_id, user_id, cursor, take], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_file(conn: &Connection, column: &str, value: &str, user_id: &str) -> Result<Option<FileRow>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE {column} = ?1 AND user_id = ?2");
    conn.query_row(&sql, (value, user_id), file_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        stripe_customer_id: row.get(2)?,
        stripe_subscription_id: row.get(3)?,
        stripe_price_id: row.get(4)?,
        stripe_current_period_end: row.get(5)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        name: row.get(1)?,
        upload_status: row.get(2)?,
        url: row.get(3)?,
        key: row.get(4)?,
        user_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        is_user_message: row.get(2)?,
        user_id: row.get(3)?,
        file_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
