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
//! Phase B of the line splitter (spec §4.3 step B): re-cuts every line at
//! its interior vertices with a multiplicity greater than one, duplicating
//! the line's attribute row across the resulting segments, then rebuilds a
//! deduplicated node layer and the line-to-node cross-reference.
//!
//! Grounded directly on `split`/`splitLine`/`createNode`/`createNodeRef` in
//! the original Go tool's `osmnode.go`, with the per-line cut delegated to
//! the database (`ST_LinesCutAtNodes`), per SPEC_FULL.md §9.2.

use geo_types::MultiPoint;
use log::{info, warn};

use crate::config::LineSplitConfig;
use crate::db::Connection;
use crate::error::{Error, Result};
use crate::geom;

use super::vertex;

pub fn run(conn: &mut Connection, config: &LineSplitConfig) -> Result<()> {
    let line_layer = &config.line_layer;
    let node_layer = &config.line_node_layer;

    vertex::recreate_vertex_layer(conn, node_layer)?;
    vertex::populate_vertices(conn, line_layer, node_layer, false)?;
    vertex::build_indices(conn, node_layer)?;
    vertex::update_intersections(conn, node_layer)?;

    cut_lines(conn, line_layer, node_layer)?;

    drop_tmp_table(conn, line_layer)?;
    conn.execute_raw("VACUUM")?;

    vertex::recreate_vertex_layer(conn, node_layer)?;
    vertex::populate_vertices(conn, line_layer, node_layer, true)?;
    vertex::build_indices(conn, node_layer)?;
    vertex::update_intersections(conn, node_layer)?;

    build_node_layer(conn, node_layer, &config.node_layer)?;
    build_node_ref(conn, node_layer, &config.node_layer)?;
    discard_vertex_bookkeeping(conn, node_layer)?;
    conn.execute_raw("VACUUM")?;

    info!(
        "finished splitting `{line_layer}` (nodes in `{}`, references in `{node_layer}`)",
        config.node_layer
    );
    Ok(())
}

fn tmp_table_name(line_layer: &str) -> String {
    format!("tmp_{line_layer}")
}

fn clone_tmp_table(conn: &Connection, line_layer: &str) -> Result<String> {
    let tmp = tmp_table_name(line_layer);
    conn.execute_raw(&format!("DROP TABLE IF EXISTS {tmp}"))?;
    conn.execute_raw(&format!("CREATE TABLE {tmp} AS SELECT * FROM {line_layer}"))?;
    conn.execute_raw(&format!(
        "CREATE UNIQUE INDEX idx_{tmp}_ogc_fid ON {tmp} (ogc_fid)"
    ))?;
    Ok(tmp)
}

fn drop_tmp_table(conn: &Connection, line_layer: &str) -> Result<()> {
    conn.execute_raw(&format!("DROP TABLE IF EXISTS {}", tmp_table_name(line_layer)))
}

/// Groups of `(lines_fid, [interior order_ids with intersections > 1])`,
/// read in `lines_fid` order (spec §4.3 "ordering and tie-breaks": lines
/// are processed in ascending `ogc_fid` order).
fn cut_candidates(conn: &Connection, node_layer: &str) -> Result<Vec<(i64, Vec<i64>)>> {
    let sql = format!(
        "SELECT lines_fid, GROUP_CONCAT(order_id) FROM (
            SELECT lines_fid, order_id FROM {node_layer}
            WHERE intersections > 1 AND pos_type = 0
            ORDER BY lines_fid, order_id
        ) GROUP BY lines_fid ORDER BY lines_fid"
    );

    let rows: Vec<(i64, String)> = {
        let inner = conn.inner();
        let mut stmt = inner.prepare(&sql).map_err(|e| Error::db(&sql, e))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| Error::db(&sql, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::db(&sql, e))?
    };

    Ok(rows
        .into_iter()
        .map(|(lines_fid, csv)| {
            let order_ids = csv
                .split(',')
                .filter_map(|s| s.parse::<i64>().ok())
                .collect();
            (lines_fid, order_ids)
        })
        .collect())
}

fn cut_lines(conn: &mut Connection, line_layer: &str, node_layer: &str) -> Result<()> {
    let tmp = clone_tmp_table(conn, line_layer)?;
    let attr_columns = conn.other_columns(&tmp)?;
    let groups = cut_candidates(conn, node_layer)?;

    if groups.is_empty() {
        drop_tmp_table(conn, line_layer)?;
        return Ok(());
    }

    conn.transaction(|tx| {
        for (lines_fid, order_ids) in &groups {
            cut_one(tx, line_layer, &tmp, &attr_columns, *lines_fid, order_ids)?;
        }
        Ok(())
    })
}

fn cut_one(
    tx: &rusqlite::Transaction,
    line_layer: &str,
    tmp: &str,
    attr_columns: &[String],
    lines_fid: i64,
    order_ids: &[i64],
) -> Result<()> {
    let select_sql = format!("SELECT ST_AsBinary(GEOMETRY) FROM {tmp} WHERE ogc_fid = ?1");
    let wkb: Vec<u8> = tx
        .query_row(&select_sql, [lines_fid], |row| row.get(0))
        .map_err(|e| Error::db(&select_sql, e))?;

    let geometry = geom::decode(&wkb)?;
    let points = geom::flatten_vertices(&geometry)?;

    let cut_points: Vec<_> = order_ids
        .iter()
        .filter_map(|&order_id| points.get((order_id - 1) as usize).copied())
        .collect();

    if cut_points.is_empty() {
        return Ok(());
    }

    let cut_wkt = geom::multi_point_to_wkt(&MultiPoint(cut_points));

    let cut_sql = format!(
        "SELECT ST_AsBinary(ST_LinesCutAtNodes(GEOMETRY, GeomFromText(?1, 4326))) FROM {tmp} WHERE ogc_fid = ?2"
    );
    let cut_wkb: Vec<u8> = tx
        .query_row(&cut_sql, rusqlite::params![cut_wkt, lines_fid], |row| row.get(0))
        .map_err(|e| Error::db(&cut_sql, e))?;

    let Some(segments) = geom::decode_multi_line_string(&cut_wkb)? else {
        warn!("ST_LinesCutAtNodes did not return a line geometry for ogc_fid {lines_fid}; leaving line unsplit");
        return Ok(());
    };

    let update_sql = format!("UPDATE {line_layer} SET GEOMETRY = GeomFromText(?1, 4326) WHERE ogc_fid = ?2");

    let column_list = attr_columns.join(", ");
    let insert_sql = format!(
        "INSERT INTO {line_layer} ({column_list}, GEOMETRY) \
         SELECT {column_list}, GeomFromText(?1, 4326) FROM {tmp} WHERE ogc_fid = ?2"
    );

    for (i, segment) in segments.0.iter().enumerate() {
        let wkt = geom::line_string_to_wkt(segment);
        if i == 0 {
            tx.execute(&update_sql, rusqlite::params![wkt, lines_fid])
                .map_err(|e| Error::db(&update_sql, e))?;
        } else {
            tx.execute(&insert_sql, rusqlite::params![wkt, lines_fid])
                .map_err(|e| Error::db(&insert_sql, e))?;
        }
    }

    Ok(())
}

/// Rebuilds `node_layer` as the set of distinct vertex points, carrying
/// over each point's intersection count (spec §4.3 step B.f: "the node
/// layer holds one row per distinct point reached by `intersections > 1`
/// processing, deduplicated by exact coordinate equality"). Builds a plain
/// index on `GEOMETRY` alongside the spatial index, matching the original
/// tool's `idx_nodes_geo` (`osmnode.go`): the plain index is what the
/// equality-based dedup join in `build_node_ref` actually benefits from.
fn build_node_layer(conn: &Connection, vertex_layer: &str, node_layer: &str) -> Result<()> {
    if conn.table_exists(node_layer)? {
        conn.execute_raw(&format!("SELECT DropGeoTable('{node_layer}')"))?;
    }
    conn.execute_raw(&format!("DROP TABLE IF EXISTS {node_layer}"))?;

    conn.execute_raw(&format!(
        "CREATE TABLE {node_layer} (
            ogc_fid INTEGER PRIMARY KEY AUTOINCREMENT,
            intersections INTEGER NOT NULL DEFAULT 0
        )"
    ))?;
    conn.execute_allow_duplicate_column(&format!(
        "SELECT AddGeometryColumn('{node_layer}', 'GEOMETRY', 4326, 'POINT', 'XY')"
    ))?;

    conn.execute_raw(&format!(
        "INSERT INTO {node_layer} (intersections, GEOMETRY) \
         SELECT intersections, GEOMETRY FROM {vertex_layer} GROUP BY GEOMETRY"
    ))?;

    conn.execute_raw(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{node_layer}_geometry ON {node_layer} (GEOMETRY)"
    ))?;
    conn.execute_raw(&format!(
        "SELECT CreateSpatialIndex('{node_layer}', 'GEOMETRY')"
    ))
}

/// Sets `node_fid` on every vertex row to the `ogc_fid` of its deduplicated
/// counterpart in `node_layer` (spec §4.3 step B.g, the line-to-node
/// cross-reference property 5 requires).
fn build_node_ref(conn: &Connection, vertex_layer: &str, node_layer: &str) -> Result<()> {
    conn.execute_raw(&format!(
        "UPDATE {vertex_layer} SET node_fid = (
            SELECT ogc_fid FROM {node_layer} WHERE {node_layer}.GEOMETRY = {vertex_layer}.GEOMETRY
        )"
    ))
}

/// Strips the bookkeeping-only `GEOMETRY`/`intersections` columns off the
/// vertex layer once node references are built, leaving a plain
/// `lines_fid -> node_fid` cross-reference table (spec §4.3: the vertex
/// layer's public surface is the cross-reference, not its geometry). The
/// plain `idx_{vertex_layer}_geometry` index built by `build_indices` has to
/// be dropped before `ALTER TABLE DROP COLUMN GEOMETRY`, since SQLite
/// refuses to drop a column referenced by an index; the original tool does
/// the same (`DROP INDEX idx_ln_geo` before the column drop, `osmnode.go`).
fn discard_vertex_bookkeeping(conn: &Connection, vertex_layer: &str) -> Result<()> {
    conn.execute_raw(&format!(
        "SELECT DiscardGeometryColumn('{vertex_layer}', 'GEOMETRY')"
    ))?;
    conn.execute_raw(&format!(
        "DROP INDEX IF EXISTS idx_{vertex_layer}_geometry"
    ))?;
    conn.execute_raw(&format!(
        "ALTER TABLE {vertex_layer} DROP COLUMN GEOMETRY"
    ))?;
    conn.execute_raw(&format!(
        "ALTER TABLE {vertex_layer} DROP COLUMN intersections"
    ))
}
