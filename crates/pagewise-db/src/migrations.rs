use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                          TEXT PRIMARY KEY,
                email                       TEXT NOT NULL UNIQUE,
                stripe_customer_id          TEXT UNIQUE,
                stripe_subscription_id      TEXT UNIQUE,
                stripe_price_id             TEXT,
                stripe_current_period_end   TEXT
            );

            CREATE TABLE files (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                upload_status   TEXT NOT NULL DEFAULT 'PENDING'
                    CHECK (upload_status IN ('PENDING', 'PROCESSING', 'SUCCESS', 'FAILED')),
                url             TEXT NOT NULL,
                key             TEXT NOT NULL UNIQUE,
                user_id         TEXT NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_files_user ON files(user_id, created_at);

            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                text                TEXT NOT NULL,
                is_user_message     INTEGER NOT NULL,
                user_id             TEXT NOT NULL REFERENCES users(id),
                file_id             TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_messages_file ON messages(file_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
