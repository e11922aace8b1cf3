//! SQLite-backed credential storage.
//!
//! Keeps the single active OAuth credential so it survives process restarts.

use super::{Credential, CredentialStore, IssuedToken};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE oauth_tokens (
///     id INTEGER PRIMARY KEY,
///     access_token TEXT NOT NULL,
///     refresh_token TEXT NOT NULL,
///     token_type TEXT NOT NULL,
///     expires_at TEXT NOT NULL,   -- RFC 3339 timestamp
///     scope TEXT,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// The table holds at most one row. `save` deletes the previous row and
/// inserts the new one inside a single transaction.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Creates or opens a credential store at `db_path`.
    ///
    /// Pass `":memory:"` for a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open credential database")?;
        Self::with_connection(conn)
    }

    /// Wraps an already opened connection, creating the schema if needed.
    pub fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                id INTEGER PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                token_type TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                scope TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create oauth_tokens table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn get(&self) -> Result<Option<Credential>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT access_token, refresh_token, token_type, expires_at, scope
                FROM oauth_tokens
                ORDER BY id DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read credential")?;

        let Some((access_token, refresh_token, token_type, expires_at, scope)) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Failed to parse expires_at timestamp")?;

        Ok(Some(Credential {
            access_token,
            refresh_token,
            expires_at,
            token_type,
            scope,
        }))
    }

    fn save(&self, token: &IssuedToken) -> Result<Credential> {
        let now = Utc::now();
        let credential = token.clone().into_credential(now)?;
        let now = now.to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to begin credential transaction")?;

        // Only the latest credential is kept
        tx.execute("DELETE FROM oauth_tokens", [])
            .context("Failed to clear previous credential")?;
        tx.execute(
            r#"
            INSERT INTO oauth_tokens (
                access_token, refresh_token, token_type, expires_at, scope,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                credential.access_token,
                credential.refresh_token,
                credential.token_type,
                credential.expires_at.to_rfc3339(),
                credential.scope,
                now,
                now,
            ],
        )
        .context("Failed to store credential")?;
        tx.commit().context("Failed to commit credential")?;

        Ok(credential)
    }
}
