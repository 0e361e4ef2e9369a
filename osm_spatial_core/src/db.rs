/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use std::path::Path;

use log::{debug, warn};
use rusqlite::{Connection as SqliteConnection, OpenFlags};

use crate::error::{Error, Result};

/// Candidate library names for the SpatiaLite loadable extension, tried in
/// order until one loads. Mirrors the single `mod_spatialite` name the
/// original Go tool passes to `go-sqlite3`, generalized across platforms
/// since `sqlite3_load_extension` resolves a bare name against the
/// platform's shared-library naming convention.
const SPATIALITE_CANDIDATES: &[&str] = &[
    "mod_spatialite",
    "mod_spatialite.so",
    "libspatialite.so",
    "mod_spatialite.dylib",
    "mod_spatialite.dll",
];

/// Thin wrapper around a `rusqlite::Connection` opened in shared-cache mode
/// with the SpatiaLite extension loaded and foreign keys enabled (spec §6).
pub struct Connection {
    inner: SqliteConnection,
}

impl Connection {
    /// Opens `path` read-write (creating it if absent), loads SpatiaLite,
    /// and enables foreign-key enforcement.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_SHARED_CACHE
            | OpenFlags::SQLITE_OPEN_URI;

        let inner = SqliteConnection::open_with_flags(path, flags)
            .map_err(|e| Error::db("open database", e))?;

        let mut conn = Connection { inner };
        conn.load_spatialite()?;
        conn.execute_raw("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Opens an in-memory database with SpatiaLite loaded; used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let inner =
            SqliteConnection::open_in_memory().map_err(|e| Error::db("open :memory:", e))?;
        let mut conn = Connection { inner };
        conn.load_spatialite()?;
        conn.execute_raw("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn load_spatialite(&mut self) -> Result<()> {
        unsafe {
            self.inner
                .load_extension_enable()
                .map_err(|e| Error::db("enable extension loading", e))?;
        }

        let mut last_err = None;
        let mut loaded = false;
        for candidate in SPATIALITE_CANDIDATES {
            let outcome = unsafe { self.inner.load_extension(candidate, None) };
            match outcome {
                Ok(()) => {
                    debug!("loaded spatial extension `{candidate}`");
                    loaded = true;
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let disable_result = unsafe { self.inner.load_extension_disable() };
        disable_result.map_err(|e| Error::db("disable extension loading", e))?;

        if !loaded {
            let e = last_err.expect("SPATIALITE_CANDIDATES is non-empty");
            return Err(Error::db("load mod_spatialite", e));
        }

        Ok(())
    }

    pub fn inner(&self) -> &SqliteConnection {
        &self.inner
    }

    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.inner
            .execute(sql, [])
            .map(|_| ())
            .map_err(|e| Error::db(sql, e))
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner
            .execute_batch(sql)
            .map_err(|e| Error::db(sql, e))
    }

    /// Runs `sql`, demoting a "duplicate column name" failure to a warning
    /// and continuing (spec §7: the only demotable error, a residue of
    /// re-running the tag expander / reclassifier against an already
    /// widened table).
    pub fn execute_allow_duplicate_column(&self, sql: &str) -> Result<()> {
        match self.inner.execute(sql, []) {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_column_error(&e) => {
                warn!("ignoring duplicate column while running `{sql}`: {e}");
                Ok(())
            }
            Err(e) => Err(Error::db(sql, e)),
        }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self
            .inner
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(|e| Error::db("check table existence", e))?;
        Ok(count > 0)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        if !self.table_exists(table)? {
            return Ok(false);
        }

        let sql = format!("SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?1");
        let count: i64 = self
            .inner
            .query_row(&sql, [column], |row| row.get(0))
            .map_err(|e| Error::db(sql, e))?;
        Ok(count > 0)
    }

    /// Returns the ordered, comma-joined list of column names of `table`
    /// excluding `ogc_fid` and `GEOMETRY` (mirrors `getColsSql` in the
    /// original Go tool: these two are handled specially by every caller
    /// that needs the "all other attribute columns" projection).
    pub fn other_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT name FROM pragma_table_info('{table}')");
        let mut stmt = self.inner.prepare(&sql).map_err(|e| Error::db(&sql, e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::db(&sql, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::db(&sql, e))?;

        Ok(names
            .into_iter()
            .filter(|n| n != "ogc_fid" && n != "GEOMETRY")
            .collect())
    }

    /// Runs `body` inside a single transaction, committing on `Ok` and
    /// rolling back (by dropping without committing) on `Err` (spec §5:
    /// every major phase executes in exactly one explicit transaction).
    pub fn transaction<F, T>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let tx = self
            .inner
            .transaction()
            .map_err(|e| Error::db("BEGIN", e))?;
        let result = body(&tx)?;
        tx.commit().map_err(|e| Error::db("COMMIT", e))?;
        Ok(result)
    }
}

pub fn is_duplicate_column_error(err: &rusqlite::Error) -> bool {
    err.to_string().contains("duplicate column name")
}
