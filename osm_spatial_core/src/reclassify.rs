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
//! Line Reclassifier (spec §4.1): moves/duplicates rows between layers
//! based on attribute predicates, materializing classification and
//! sub-classification values as literal columns.

use log::info;

use crate::config::{ExtField, LineExtractConfig, LineExtractDocument};
use crate::db::Connection;
use crate::error::{ConfigError, Error, Result};

/// Runs every config entry in `doc` against `conn`, in document order.
pub fn run(conn: &mut Connection, doc: &LineExtractDocument) -> Result<()> {
    for config in &doc.configs {
        run_one(conn, config)?;
    }
    Ok(())
}

fn run_one(conn: &mut Connection, config: &LineExtractConfig) -> Result<()> {
    info!(
        "reclassifying layer `{}` into `{}`",
        config.layer, config.table
    );

    if !conn.table_exists(&config.layer)? {
        return Err(Error::Config(ConfigError::UnknownTable(
            config.layer.clone(),
        )));
    }

    for ext_field in &config.ext_fields {
        run_predicate(conn, config, ext_field)?;
    }

    info!("finished reclassifying layer `{}`", config.layer);
    Ok(())
}

fn run_predicate(conn: &mut Connection, config: &LineExtractConfig, ext_field: &ExtField) -> Result<()> {
    if !conn.column_exists(&config.layer, &ext_field.field)? {
        return Err(Error::Config(ConfigError::UnknownColumn {
            table: config.layer.clone(),
            column: ext_field.field.clone(),
        }));
    }

    let (predicate_sql, bind_value) = build_predicate(ext_field);
    let mut where_sql = predicate_sql;
    if ext_field.field != "highway" {
        where_sql.push_str(" AND highway IS NULL");
    }

    let field = &ext_field.field;
    let table_exists = conn.table_exists(&config.table)?;

    let select_cols = format!(
        "ogc_fid, osm_id, name, '{field}' AS {f_col}, {field} AS {s_col}, z_order, other_tags, GEOMETRY",
        field = field,
        f_col = config.field,
        s_col = config.sub_field,
    );

    let sql = if table_exists {
        format!(
            "INSERT INTO {table}(ogc_fid, osm_id, name, {f_col}, {s_col}, z_order, other_tags, GEOMETRY) SELECT {select_cols} FROM {layer} WHERE {where_sql}",
            table = config.table,
            f_col = config.field,
            s_col = config.sub_field,
            select_cols = select_cols,
            layer = config.layer,
            where_sql = where_sql,
        )
    } else {
        format!(
            "CREATE TABLE {table} AS SELECT {select_cols} FROM {layer} WHERE {where_sql}",
            table = config.table,
            select_cols = select_cols,
            layer = config.layer,
            where_sql = where_sql,
        )
    };

    exec_with_optional_bind(conn, &sql, &bind_value)?;

    let delete_sql = format!("DELETE FROM {} WHERE {}", config.layer, where_sql);
    exec_with_optional_bind(conn, &delete_sql, &bind_value)?;

    if ext_field.value.is_empty() {
        let alter_sql = format!("ALTER TABLE {} DROP COLUMN {}", config.layer, ext_field.field);
        conn.execute_raw(&alter_sql)?;
    }

    Ok(())
}

/// Builds the `WHERE` fragment and an optional bound value for predicate
/// `P` (spec §4.1 step 1). `field = value` comparisons bind the value as a
/// parameter rather than splicing it into the SQL text (the original Go
/// tool splices unescaped; binding is strictly safer and observably
/// identical for well-formed config values).
fn build_predicate(ext_field: &ExtField) -> (String, Option<String>) {
    if ext_field.value.is_empty() {
        (format!("{} IS NOT NULL", ext_field.field), None)
    } else if ext_field.value == "NULL" {
        (format!("{} IS NULL", ext_field.field), None)
    } else {
        (
            format!("{} = ?1", ext_field.field),
            Some(ext_field.value.clone()),
        )
    }
}

fn exec_with_optional_bind(conn: &Connection, sql: &str, bind_value: &Option<String>) -> Result<()> {
    match bind_value {
        Some(v) => conn
            .inner()
            .execute(sql, [v])
            .map(|_| ())
            .map_err(|e| Error::db(sql, e)),
        None => conn.execute_raw(sql),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineExtractConfig;

    fn harness() -> Connection {
        let conn = Connection::open_in_memory().expect("spatialite must be available for tests");
        conn.execute_batch(
            "CREATE TABLE lines (
                ogc_fid INTEGER PRIMARY KEY AUTOINCREMENT,
                osm_id INTEGER,
                name TEXT,
                highway TEXT,
                waterway TEXT,
                z_order INTEGER,
                other_tags TEXT,
                GEOMETRY BLOB
            );",
        )
        .unwrap();
        conn
    }

    fn config(field: &str, value: &str) -> LineExtractConfig {
        LineExtractConfig {
            layer: "lines".into(),
            table: "waterways".into(),
            field: "type".into(),
            sub_field: "sub_type".into(),
            ext_fields: vec![ExtField {
                field: field.into(),
                value: value.into(),
            }],
        }
    }

    #[test]
    fn reclassification_moves_row_and_drops_column() {
        let mut conn = harness();
        conn.execute_raw(
            "INSERT INTO lines (osm_id, name, highway, waterway, z_order, other_tags) \
             VALUES (1, 'river x', NULL, 'river', 0, NULL)",
        )
        .unwrap();

        let cfg = config("waterway", "");
        run_one(&mut conn, &cfg).unwrap();

        let remaining: i64 = conn
            .inner()
            .query_row("SELECT COUNT(*) FROM lines", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);

        let moved: i64 = conn
            .inner()
            .query_row("SELECT COUNT(*) FROM waterways", [], |r| r.get(0))
            .unwrap();
        assert_eq!(moved, 1);

        let (f_val, s_val): (String, String) = conn
            .inner()
            .query_row("SELECT type, sub_type FROM waterways", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(f_val, "waterway");
        assert_eq!(s_val, "river");

        assert!(!conn.column_exists("lines", "waterway").unwrap());
    }

    #[test]
    fn value_predicate_does_not_drop_column() {
        let mut conn = harness();
        conn.execute_raw(
            "INSERT INTO lines (osm_id, name, highway, waterway, z_order, other_tags) \
             VALUES (1, 'a', NULL, 'river', 0, NULL)",
        )
        .unwrap();

        let cfg = config("waterway", "river");
        run_one(&mut conn, &cfg).unwrap();

        assert!(conn.column_exists("lines", "waterway").unwrap());
    }

    #[test]
    fn highway_rows_are_reserved() {
        let mut conn = harness();
        conn.execute_raw(
            "INSERT INTO lines (osm_id, name, highway, waterway, z_order, other_tags) \
             VALUES (1, 'a', 'primary', 'river', 0, NULL)",
        )
        .unwrap();

        let cfg = config("waterway", "");
        run_one(&mut conn, &cfg).unwrap();

        let remaining: i64 = conn
            .inner()
            .query_row("SELECT COUNT(*) FROM lines", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1, "row with a highway classification must stay");
    }

    #[test]
    fn missing_layer_is_config_error() {
        let mut conn = harness();
        let mut cfg = config("waterway", "");
        cfg.layer = "does_not_exist".into();
        let err = run_one(&mut conn, &cfg).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownTable(_))));
    }

    #[test]
    fn missing_column_is_config_error() {
        let mut conn = harness();
        let cfg = config("not_a_column", "");
        let err = run_one(&mut conn, &cfg).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownColumn { .. })
        ));
    }
}
