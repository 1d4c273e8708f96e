//! Shared SQLite plumbing for the versioned feature databases.
//!
//! Each store (discovery, enrichment, library) owns its own database file
//! and declares its schema as a list of [`VersionedSchema`]s. The stored
//! `PRAGMA user_version` is offset by [`BASE_DB_VERSION`] so an empty or
//! foreign database is never mistaken for version 0 of ours.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Offset added to the schema version when stored in `PRAGMA user_version`.
pub const BASE_DB_VERSION: usize = 100;

/// A single table definition: raw DDL plus its indices.
pub struct Table {
    pub name: &'static str,
    pub schema: &'static str,
    pub indices: &'static [&'static str],
}

/// A complete schema at a given version.
pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Migration from the previous version, if any.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    /// Create all tables and indices of this schema on a fresh connection
    /// and stamp the user_version.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            conn.execute(table.schema, [])
                .with_context(|| format!("Failed to create table {}", table.name))?;
            for index in table.indices {
                conn.execute(index, [])
                    .with_context(|| format!("Failed to create index on {}", table.name))?;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }
}

/// Open (or create) a database governed by the given schema list.
///
/// A missing file gets the latest schema; an existing file is version
/// checked and migrated forward as needed.
pub fn open_versioned<P: AsRef<std::path::Path>>(
    db_path: P,
    schemas: &[VersionedSchema],
    db_name: &str,
) -> Result<Connection> {
    let latest = schemas.last().context("No schemas defined")?;

    if !db_path.as_ref().exists() {
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        latest.create(&conn)?;
        tracing::info!("Created new {} database at {:?}", db_name, db_path.as_ref());
        return Ok(conn);
    }

    let conn = Connection::open_with_flags(
        &db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let raw_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
        .context("Failed to read database version")?;
    let version = raw_version - BASE_DB_VERSION as i64;

    if version < 0 {
        bail!(
            "{} database version {} is too old, does not contain base db version {}",
            db_name,
            raw_version,
            BASE_DB_VERSION
        );
    }
    let version = version as usize;

    if version >= schemas.len() {
        bail!(
            "{} database version {} is too new (max supported: {})",
            db_name,
            version,
            schemas.len() - 1
        );
    }

    migrate_if_needed(&conn, schemas, version, db_name)?;

    Ok(conn)
}

/// Create the latest schema on an in-memory connection (tests).
pub fn open_in_memory(schemas: &[VersionedSchema]) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schemas
        .last()
        .context("No schemas defined")?
        .create(&conn)?;
    Ok(conn)
}

fn migrate_if_needed(
    conn: &Connection,
    schemas: &[VersionedSchema],
    current_version: usize,
    db_name: &str,
) -> Result<()> {
    let target_version = schemas.len() - 1;
    if current_version >= target_version {
        return Ok(());
    }

    tracing::info!(
        "Migrating {} database from version {} to {}",
        db_name,
        current_version,
        target_version
    );

    for schema in schemas.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            tracing::info!("Running {} migration to version {}", db_name, schema.version);
            migration_fn(conn)?;
        }
    }

    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
        [],
    )?;

    Ok(())
}
