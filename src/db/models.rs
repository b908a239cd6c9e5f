// src/db/models.rs

//! Data models for the package index database
//!
//! This module maps [`Package`] values onto the `packages` and
//! `package_relations` tables and back.

use crate::error::Result;
use crate::packages::Package;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Kind of a package relation row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Provides,
    Requires,
    RequiresPre,
    Recommends,
}

impl RelationKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelationKind::Provides => "provides",
            RelationKind::Requires => "requires",
            RelationKind::RequiresPre => "requires_pre",
            RelationKind::Recommends => "recommends",
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "provides" => Ok(RelationKind::Provides),
            "requires" => Ok(RelationKind::Requires),
            "requires_pre" => Ok(RelationKind::RequiresPre),
            "recommends" => Ok(RelationKind::Recommends),
            _ => Err(format!("Invalid relation kind: {}", s)),
        }
    }
}

/// A stored package row together with the repository it came from
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub id: Option<i64>,
    pub repository: String,
    pub package: Package,
}

impl PackageRecord {
    pub fn new(repository: &str, package: Package) -> Self {
        Self {
            id: None,
            repository: repository.to_string(),
            package,
        }
    }

    /// Insert this package and all of its relations
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let pkg = &self.package;
        conn.execute(
            "INSERT INTO packages (name, epoch, version, release, arch, source_name, repository)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &pkg.name,
                pkg.epoch,
                &pkg.version,
                &pkg.release,
                &pkg.arch,
                &pkg.source_name,
                &self.repository,
            ],
        )?;

        let id = conn.last_insert_rowid();

        let mut stmt = conn.prepare_cached(
            "INSERT INTO package_relations (package_id, kind, capability, position)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let relations = [
            (RelationKind::Provides, &pkg.provides),
            (RelationKind::Requires, &pkg.requires),
            (RelationKind::RequiresPre, &pkg.requires_pre),
            (RelationKind::Recommends, &pkg.recommends),
        ];
        for (kind, capabilities) in relations {
            for (position, capability) in capabilities.iter().enumerate() {
                stmt.execute(params![id, kind.as_str(), capability, position as i64])?;
            }
        }

        self.id = Some(id);
        Ok(id)
    }

    /// Load a package and its relations by id
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, epoch, version, release, arch, source_name, repository
             FROM packages WHERE id = ?1",
        )?;

        let record = stmt.query_row([id], Self::from_row).optional()?;

        match record {
            Some(mut record) => {
                record.load_relations(conn)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Ids of packages matching optional name, provided capability and arch
    ///
    /// Every package provides its own name.
    pub fn find_ids(
        conn: &Connection,
        name: Option<&str>,
        provides: Option<&str>,
        arch: Option<&str>,
    ) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT p.id FROM packages p
             LEFT JOIN package_relations r
                ON r.package_id = p.id AND r.kind = 'provides' AND r.capability = ?2
             WHERE (?1 IS NULL OR p.name = ?1)
               AND (?3 IS NULL OR p.arch = ?3)
               AND (?2 IS NULL OR p.name = ?2 OR r.id IS NOT NULL)
             ORDER BY p.id",
        )?;

        let ids = stmt
            .query_map(params![name, provides, arch], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        Ok(ids)
    }

    /// Number of stored packages
    pub fn count(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every package imported from `repository`
    pub fn delete_repository(conn: &Connection, repository: &str) -> Result<usize> {
        let removed = conn.execute("DELETE FROM packages WHERE repository = ?1", [repository])?;
        Ok(removed)
    }

    fn load_relations(&mut self, conn: &Connection) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT kind, capability FROM package_relations
             WHERE package_id = ?1 ORDER BY kind, position",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let pkg = &mut self.package;
        for row in rows {
            let (kind, capability) = row?;
            match RelationKind::from_str(&kind) {
                Ok(RelationKind::Provides) => pkg.provides.push(capability),
                Ok(RelationKind::Requires) => pkg.requires.push(capability),
                Ok(RelationKind::RequiresPre) => pkg.requires_pre.push(capability),
                Ok(RelationKind::Recommends) => pkg.recommends.push(capability),
                Err(e) => tracing::warn!("Skipping relation of package {}: {}", id, e),
            }
        }

        Ok(())
    }

    /// Convert a database row to a PackageRecord without relations
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let mut package = Package::new(
            &row.get::<_, String>(1)?,
            &row.get::<_, String>(3)?,
            &row.get::<_, String>(4)?,
            &row.get::<_, String>(5)?,
        )
        .with_epoch(row.get(2)?);
        package.source_name = row.get(6)?;

        Ok(Self {
            id: Some(row.get(0)?),
            repository: row.get(7)?,
            package,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn bash() -> Package {
        Package::new("bash", "4.4.12", "1.fc25", "x86_64")
            .with_epoch(1)
            .with_provides(["/bin/sh", "/bin/bash"])
            .with_requires(["libtinfo.so.6()(64bit)", "glibc"])
            .with_requires_pre(["/sbin/ldconfig"])
            .with_recommends(["bash-doc"])
            .with_source("bash")
    }

    #[test]
    fn test_relation_kind_round_trip() {
        for kind in [
            RelationKind::Provides,
            RelationKind::Requires,
            RelationKind::RequiresPre,
            RelationKind::Recommends,
        ] {
            assert_eq!(RelationKind::from_str(kind.as_str()), Ok(kind));
        }
        assert!(RelationKind::from_str("conflicts").is_err());
    }

    #[test]
    fn test_insert_and_find_by_id() {
        let (_temp, conn) = create_test_db();

        let mut record = PackageRecord::new("fedora", bash());
        let id = record.insert(&conn).unwrap();

        let found = PackageRecord::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.repository, "fedora");
        assert_eq!(found.package, bash());
    }

    #[test]
    fn test_find_missing_id() {
        let (_temp, conn) = create_test_db();
        assert!(PackageRecord::find_by_id(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_find_ids_by_capability_and_own_name() {
        let (_temp, conn) = create_test_db();

        let bash_id = PackageRecord::new("fedora", bash()).insert(&conn).unwrap();
        let dash_id = PackageRecord::new(
            "fedora",
            Package::new("dash", "0.5", "1", "x86_64").with_provides(["/bin/sh"]),
        )
        .insert(&conn)
        .unwrap();

        let providers = PackageRecord::find_ids(&conn, None, Some("/bin/sh"), None).unwrap();
        assert_eq!(providers, vec![bash_id, dash_id]);

        let by_own_name = PackageRecord::find_ids(&conn, None, Some("dash"), None).unwrap();
        assert_eq!(by_own_name, vec![dash_id]);

        let wrong_arch =
            PackageRecord::find_ids(&conn, None, Some("/bin/sh"), Some("i686")).unwrap();
        assert!(wrong_arch.is_empty());

        let by_name = PackageRecord::find_ids(&conn, Some("bash"), None, None).unwrap();
        assert_eq!(by_name, vec![bash_id]);
    }

    #[test]
    fn test_delete_repository_cascades() {
        let (_temp, conn) = create_test_db();

        PackageRecord::new("fedora", bash()).insert(&conn).unwrap();
        PackageRecord::new("updates", Package::new("zsh", "5", "1", "x86_64"))
            .insert(&conn)
            .unwrap();

        assert_eq!(PackageRecord::delete_repository(&conn, "fedora").unwrap(), 1);
        assert_eq!(PackageRecord::count(&conn).unwrap(), 1);

        let relations: i64 = conn
            .query_row("SELECT COUNT(*) FROM package_relations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(relations, 0);
    }
}
