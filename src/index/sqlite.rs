// src/index/sqlite.rs

//! Package index backed by a SQLite database
//!
//! The database is produced by `whatpkgs import`. Opening an index never
//! migrates it: a database written before pre-install requirements were
//! tracked separately is still readable, but reports that it cannot
//! serve closures that rely on them.

use super::{latest_per_name_arch, sort_packages, PackageIndex, Query};
use crate::db::{self, models::PackageRecord, schema};
use crate::error::{Error, Result};
use crate::packages::Package;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SqliteIndex {
    conn: Mutex<Connection>,
    schema_version: i32,
}

impl SqliteIndex {
    /// Open an imported database read for querying
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = db::open(db_path)?;
        Self::from_connection(conn)
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let schema_version = schema::get_schema_version(&conn)?;
        if schema_version == 0 {
            return Err(Error::InitError(
                "database holds no package index, run `whatpkgs import` first".to_string(),
            ));
        }
        if schema_version < schema::REQUIRES_PRE_VERSION {
            warn!(
                "Database schema version {} does not track pre-install requirements",
                schema_version
            );
        }

        debug!("Opened SQLite index at schema version {}", schema_version);
        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    pub fn len(&self) -> Result<usize> {
        PackageRecord::count(&self.conn.lock())
    }
}

impl PackageIndex for SqliteIndex {
    fn filter(&self, query: &Query) -> Result<Vec<Arc<Package>>> {
        let conn = self.conn.lock();

        let ids = PackageRecord::find_ids(
            &conn,
            query.name.as_deref(),
            query.provides.as_deref(),
            query.arch.as_deref(),
        )?;

        let mut matched = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = PackageRecord::find_by_id(&conn, id)? {
                matched.push(Arc::new(record.package));
            }
        }
        drop(conn);

        if query.latest_only {
            matched = latest_per_name_arch(matched);
        }
        sort_packages(&mut matched);

        Ok(matched)
    }

    fn supports_requires_pre(&self) -> bool {
        self.schema_version >= schema::REQUIRES_PRE_VERSION
    }
}

/// Replace the packages of `repository` in the database at `db_path`
///
/// Creates and migrates the database when needed. Returns the number of
/// packages written.
pub fn import_packages(db_path: &str, repository: &str, packages: &[Package]) -> Result<usize> {
    let mut conn = db::init(db_path)?;

    let written = db::transaction(&mut conn, |tx| {
        let removed = PackageRecord::delete_repository(tx, repository)?;
        if removed > 0 {
            debug!("Replaced {} packages from {}", removed, repository);
        }

        for pkg in packages {
            PackageRecord::new(repository, pkg.clone()).insert(tx)?;
        }
        Ok(packages.len())
    })?;

    info!("Imported {} packages from {} into {}", written, repository, db_path);
    Ok(written)
}
