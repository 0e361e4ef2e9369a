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
//! Tag Expander (spec §4.2): parses the packed `other_tags` blob and
//! projects selected keys into typed columns of a per-layer side table.

use std::collections::HashSet;

use log::info;

use crate::config::{TagExtractConfig, TagExtractDocument};
use crate::db::Connection;
use crate::error::Result;
use crate::tag_blob;

/// Runs every config entry in `doc` against `conn`, in document order.
pub fn run(conn: &mut Connection, doc: &TagExtractDocument) -> Result<()> {
    for config in &doc.configs {
        run_one(conn, config)?;
    }
    Ok(())
}

fn run_one(conn: &mut Connection, config: &TagExtractConfig) -> Result<()> {
    info!(
        "extracting tags from `{}` into `{}`",
        config.layer, config.ref_table
    );

    recreate_ref_table(conn, config)?;

    let select_sql = format!(
        "SELECT osm_id, other_tags FROM {} WHERE other_tags IS NOT NULL",
        config.layer
    );

    let rows: Vec<(i64, String)> = {
        let conn_inner = conn.inner();
        let mut stmt = conn_inner
            .prepare(&select_sql)
            .map_err(|e| crate::error::Error::db(&select_sql, e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| crate::error::Error::db(&select_sql, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::error::Error::db(&select_sql, e))?;
        rows
    };

    conn.transaction(|tx| {
        for (osm_id, blob) in &rows {
            let parsed = tag_blob::parse(blob);

            let mut columns: Vec<&str> = Vec::new();
            let mut values: Vec<&str> = Vec::new();
            for tag in &config.tags {
                if let Some(v) = parsed.get(&tag.name) {
                    columns.push(&tag.field);
                    values.push(v.as_str());
                }
            }

            if columns.is_empty() {
                continue;
            }

            let column_list = std::iter::once("osm_id")
                .chain(columns.iter().copied())
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=values.len() + 1)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");

            let insert_sql = format!(
                "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
                config.ref_table
            );

            let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(values.len() + 1);
            params.push(osm_id);
            for v in &values {
                params.push(v);
            }

            tx.execute(&insert_sql, params.as_slice())
                .map_err(|e| crate::error::Error::db(&insert_sql, e))?;
        }
        Ok(())
    })?;

    info!("finished extracting tags from `{}`", config.layer);
    Ok(())
}

fn recreate_ref_table(conn: &Connection, config: &TagExtractConfig) -> Result<()> {
    conn.execute_raw(&format!("DROP TABLE IF EXISTS {}", config.ref_table))?;

    let mut create_sql = format!(
        "CREATE TABLE {} (ogc_fid INTEGER PRIMARY KEY AUTOINCREMENT, osm_id INTEGER",
        config.ref_table
    );
    for tag in &config.tags {
        create_sql.push_str(&format!(", {} {}", tag.field, tag.field_type));
    }
    create_sql.push(')');

    conn.execute_raw(&create_sql)
}

/// Diagnostic helper (§7 of SPEC_FULL.md, ported from the original's
/// `FetchAllTags`): returns the distinct set of `other_tags` keys present
/// in `table`, or an empty list if the table has no `other_tags` column.
pub fn fetch_all_tag_keys(conn: &Connection, table: &str) -> Result<Vec<String>> {
    if !conn.column_exists(table, "other_tags")? {
        return Ok(Vec::new());
    }

    let sql = format!("SELECT other_tags FROM {table} WHERE other_tags IS NOT NULL");
    let blobs: Vec<String> = {
        let conn_inner = conn.inner();
        let mut stmt = conn_inner
            .prepare(&sql)
            .map_err(|e| crate::error::Error::db(&sql, e))?;
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| crate::error::Error::db(&sql, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::error::Error::db(&sql, e))?
    };

    let mut keys = HashSet::new();
    for blob in &blobs {
        keys.extend(tag_blob::parse(blob).into_keys());
    }

    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagDescriptor;

    fn harness() -> Connection {
        let conn = Connection::open_in_memory().expect("spatialite must be available for tests");
        conn.execute_batch(
            "CREATE TABLE lines (
                ogc_fid INTEGER PRIMARY KEY AUTOINCREMENT,
                osm_id INTEGER,
                other_tags TEXT
            );",
        )
        .unwrap();
        conn
    }

    fn config() -> TagExtractConfig {
        TagExtractConfig {
            layer: "lines".into(),
            ref_table: "lines_tags".into(),
            tags: vec![
                TagDescriptor {
                    name: "bridge".into(),
                    field: "is_bridge".into(),
                    field_type: "VARCHAR".into(),
                },
                TagDescriptor {
                    name: "maxspeed".into(),
                    field: "maxspeed".into(),
                    field_type: "VARCHAR".into(),
                },
            ],
        }
    }

    #[test]
    fn tag_extraction_projects_matching_keys() {
        let mut conn = harness();
        conn.execute_raw(
            r#"INSERT INTO lines (osm_id, other_tags) VALUES (42, '"bridge"=>"yes","maxspeed"=>"50","lit"=>"no"')"#,
        )
        .unwrap();

        let cfg = config();
        run_one(&mut conn, &cfg).unwrap();

        let (osm_id, bridge, maxspeed): (i64, String, String) = conn
            .inner()
            .query_row(
                "SELECT osm_id, is_bridge, maxspeed FROM lines_tags",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(osm_id, 42);
        assert_eq!(bridge, "yes");
        assert_eq!(maxspeed, "50");
    }

    #[test]
    fn row_with_no_matching_tags_is_skipped() {
        let mut conn = harness();
        conn.execute_raw(r#"INSERT INTO lines (osm_id, other_tags) VALUES (1, '"lit"=>"no"')"#)
            .unwrap();

        let cfg = config();
        run_one(&mut conn, &cfg).unwrap();

        let count: i64 = conn
            .inner()
            .query_row("SELECT COUNT(*) FROM lines_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn rerun_produces_identical_table() {
        let mut conn = harness();
        conn.execute_raw(
            r#"INSERT INTO lines (osm_id, other_tags) VALUES (1, '"bridge"=>"yes"')"#,
        )
        .unwrap();

        let cfg = config();
        run_one(&mut conn, &cfg).unwrap();
        run_one(&mut conn, &cfg).unwrap();

        let count: i64 = conn
            .inner()
            .query_row("SELECT COUNT(*) FROM lines_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn fetch_all_tag_keys_lists_distinct_keys() {
        let conn = harness();
        conn.execute_raw(
            r#"INSERT INTO lines (osm_id, other_tags) VALUES (1, '"bridge"=>"yes","lit"=>"no"')"#,
        )
        .unwrap();
        conn.execute_raw(
            r#"INSERT INTO lines (osm_id, other_tags) VALUES (2, '"bridge"=>"no"')"#,
        )
        .unwrap();

        let keys = fetch_all_tag_keys(&conn, "lines").unwrap();
        assert_eq!(keys, vec!["bridge".to_string(), "lit".to_string()]);
    }

    #[test]
    fn fetch_all_tag_keys_on_missing_column_is_empty() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_raw("CREATE TABLE points (ogc_fid INTEGER PRIMARY KEY)")
            .unwrap();
        let keys = fetch_all_tag_keys(&conn, "points").unwrap();
        assert!(keys.is_empty());
    }
}
