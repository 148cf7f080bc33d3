//! SQLite database client
//!
//! Durable [`DatabaseClient`] over a single connection. ETag preconditions
//! are enforced inside the write statement itself (`WHERE key = ? AND etag = ?`)
//! so a stale writer can never touch the row; zero affected rows means the
//! precondition failed.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use converge_core::errors::Error;
use converge_core::model::ResourceId;
use rusqlite::{Connection, OptionalExtension};

use crate::client::{
    DatabaseClient, DeleteOptions, Metadata, Object, QueryOptions, QueryResult, SaveOptions,
};
use crate::db;
use crate::errors::{from_rusqlite, poison_err, Result};
use crate::memory::new_etag;
use crate::migrations::apply_migrations;
use crate::query::{paginate, Query};

/// SQLite-backed [`DatabaseClient`]
pub struct SqliteClient {
    conn: Mutex<Connection>,
}

impl SqliteClient {
    /// Open (creating if needed) a database file and apply migrations
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = db::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database and apply migrations
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self.conn.lock().map_err(poison_err)?;
        f(&conn)
    }
}

fn to_object(id: String, etag: String, data: &str) -> Result<Object> {
    Ok(Object {
        metadata: Metadata { id, etag },
        data: serde_json::from_str(data)?,
    })
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn get(&self, id: &str) -> Result<Object> {
        let key = ResourceId::parse(id)?.storage_key();
        let row: Option<(String, String, String)> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, etag, data FROM resources WHERE key = ?1",
                [&key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(from_rusqlite)
        })?;

        let (stored_id, etag, data) = row.ok_or_else(|| Error::not_found(id).with_op("get"))?;
        to_object(stored_id, etag, &data)
    }

    async fn query(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult> {
        query.validate()?;

        let rows: Vec<(String, String, String, String)> = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key, id, etag, data FROM resources
                     WHERE is_scope = ?1 AND (?2 = '' OR resource_type = ?2)
                     ORDER BY key",
                )
                .map_err(from_rusqlite)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        query.is_scope_query,
                        query.resource_type.to_ascii_lowercase()
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            Ok(rows)
        })?;

        let mut matched = Vec::new();
        for (key, id, etag, data) in rows {
            let object = to_object(id, etag, &data)?;
            if query.matches(object.id(), &object.data) {
                matched.push((key, object));
            }
        }

        paginate(matched, options)
    }

    async fn save(&self, object: &mut Object, options: &SaveOptions) -> Result<()> {
        let id = ResourceId::parse(&object.metadata.id)?;
        let key = id.storage_key();
        let data = serde_json::to_string(&object.data)?;
        let etag = new_etag();
        let now = chrono::Utc::now().timestamp();

        let affected = self.with_conn(|conn| {
            let result = match &options.etag {
                Some(expected) => conn.execute(
                    "UPDATE resources SET id = ?1, etag = ?2, data = ?3, updated_at = ?4
                     WHERE key = ?5 AND etag = ?6",
                    rusqlite::params![id.as_str(), etag, data, now, key, expected],
                ),
                None => conn.execute(
                    "INSERT INTO resources (key, id, root_scope, resource_type, is_scope, etag, data, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(key) DO UPDATE SET
                        id = excluded.id,
                        etag = excluded.etag,
                        data = excluded.data,
                        updated_at = excluded.updated_at",
                    rusqlite::params![
                        key,
                        id.as_str(),
                        id.root_scope().to_ascii_lowercase(),
                        id.type_name().to_ascii_lowercase(),
                        id.is_scope(),
                        etag,
                        data,
                        now,
                    ],
                ),
            };
            result.map_err(from_rusqlite)
        })?;

        if affected == 0 {
            return Err(Error::concurrency(id.as_str()).with_op("save"));
        }

        object.metadata.etag = etag;
        Ok(())
    }

    async fn delete(&self, id: &str, options: &DeleteOptions) -> Result<()> {
        let key = ResourceId::parse(id)?.storage_key();

        let affected = self.with_conn(|conn| {
            let result = match &options.etag {
                Some(expected) => conn.execute(
                    "DELETE FROM resources WHERE key = ?1 AND etag = ?2",
                    rusqlite::params![key, expected],
                ),
                None => conn.execute("DELETE FROM resources WHERE key = ?1", [&key]),
            };
            result.map_err(from_rusqlite)
        })?;

        if affected == 0 {
            return Err(match options.etag {
                Some(_) => Error::concurrency(id).with_op("delete"),
                None => Error::not_found(id).with_op("delete"),
            });
        }
        Ok(())
    }
}
