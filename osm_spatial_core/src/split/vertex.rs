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
//! Phase A of the line splitter (spec §4.3 step A): enumerate every vertex
//! of every line into the vertex layer, tag the first/last vertex of each
//! line, and count how many lines pass through each distinct point.
//!
//! Vertex enumeration happens in Rust rather than via the recursive CTE the
//! original Go tool uses (`createLineNode` in `osmnode.go`), because that
//! CTE's `ST_NumPoints`/`ST_PointN` walk only covers a single `LINESTRING`.
//! A line that is itself a multi-polyline (spec §4.3: vertex indices are
//! global across its concatenated constituents) needs the geometry decoded
//! first; doing that decode once and flattening in Rust handles both cases
//! uniformly and is the flatten-to-global-index strategy SPEC_FULL.md §9.2
//! records as the resolution for multi-polyline lines.

use log::warn;

use crate::db::Connection;
use crate::error::{Error, Result};
use crate::geom;

/// Drops and recreates `node_layer` with the schema spec §4.3 describes for
/// the vertex layer (one row per vertex, plus bookkeeping columns used only
/// during the split and discarded once node references are built).
pub fn recreate_vertex_layer(conn: &Connection, node_layer: &str) -> Result<()> {
    if conn.table_exists(node_layer)? {
        conn.execute_raw(&format!("SELECT DropGeoTable('{node_layer}')"))?;
    }
    conn.execute_raw(&format!("DROP TABLE IF EXISTS {node_layer}"))?;

    conn.execute_raw(&format!(
        "CREATE TABLE {node_layer} (
            ogc_fid INTEGER PRIMARY KEY AUTOINCREMENT,
            lines_fid INTEGER NOT NULL,
            osm_id INTEGER,
            order_id INTEGER NOT NULL,
            pos_type INTEGER NOT NULL DEFAULT 0,
            node_fid INTEGER,
            intersections INTEGER NOT NULL DEFAULT 0
        )"
    ))?;
    conn.execute_allow_duplicate_column(&format!(
        "SELECT AddGeometryColumn('{node_layer}', 'GEOMETRY', 4326, 'POINT', 'XY')"
    ))
}

/// Populates `node_layer` with one row per vertex of every line in
/// `line_layer`. When `endpoints_only` is set, interior vertices (those
/// that are neither the first nor the last of their line) are omitted —
/// used for the re-enumeration pass after cutting (spec §4.3 step B.e),
/// where only the endpoints of the now-split segments are needed to
/// rebuild the deduplicated node layer.
pub fn populate_vertices(
    conn: &mut Connection,
    line_layer: &str,
    node_layer: &str,
    endpoints_only: bool,
) -> Result<()> {
    let select_sql = format!("SELECT ogc_fid, osm_id, ST_AsBinary(GEOMETRY) FROM {line_layer} ORDER BY ogc_fid");
    let rows: Vec<(i64, i64, Vec<u8>)> = {
        let inner = conn.inner();
        let mut stmt = inner
            .prepare(&select_sql)
            .map_err(|e| Error::db(&select_sql, e))?;
        stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                row.get::<_, Vec<u8>>(2)?,
            ))
        })
        .map_err(|e| Error::db(&select_sql, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::db(&select_sql, e))?
    };

    let insert_sql = format!(
        "INSERT INTO {node_layer} (lines_fid, osm_id, order_id, pos_type, GEOMETRY) \
         VALUES (?1, ?2, ?3, ?4, GeomFromText(?5, 4326))"
    );

    conn.transaction(|tx| {
        for (ogc_fid, osm_id, wkb) in &rows {
            let geometry = geom::decode(wkb)?;
            let points = match geom::flatten_vertices(&geometry) {
                Ok(points) => points,
                Err(e) => {
                    warn!("skipping line {ogc_fid}: {e}");
                    continue;
                }
            };

            let total = points.len();
            if total < 2 {
                warn!("skipping line {ogc_fid}: fewer than two vertices");
                continue;
            }

            for (idx, point) in points.iter().enumerate() {
                let order_id = (idx + 1) as i64;
                let pos_type = if order_id == 1 {
                    1
                } else if order_id as usize == total {
                    2
                } else {
                    0
                };

                if endpoints_only && pos_type == 0 {
                    continue;
                }

                let wkt = format!("POINT({} {})", point.x(), point.y());
                tx.execute(
                    &insert_sql,
                    rusqlite::params![ogc_fid, osm_id, order_id, pos_type, wkt],
                )
                .map_err(|e| Error::db(&insert_sql, e))?;
            }
        }
        Ok(())
    })
}

/// Builds the lookup indices the later steps rely on (spec §4.3 step A.3:
/// "Build indices on `osm_id` and on the geometry column; create a spatial
/// index"), plus a plain index on `lines_fid` for grouping cut candidates.
/// The plain `GEOMETRY` index is what actually accelerates the byte-equality
/// self-join in `update_intersections` and the dedup join in
/// `build_node_ref`; the R-tree spatial index only accelerates bounding-box
/// predicates, not exact-equality ones, but the original tool builds both
/// (`idx_osm_id`/`idx_ln_geo` plus `CreateSpatialIndex` in `osmnode.go`), so
/// this mirrors that three-index set.
pub fn build_indices(conn: &Connection, node_layer: &str) -> Result<()> {
    conn.execute_raw(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{node_layer}_lines_fid ON {node_layer} (lines_fid)"
    ))?;
    conn.execute_raw(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{node_layer}_osm_id ON {node_layer} (osm_id)"
    ))?;
    conn.execute_raw(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{node_layer}_geometry ON {node_layer} (GEOMETRY)"
    ))?;
    conn.execute_raw(&format!(
        "SELECT CreateSpatialIndex('{node_layer}', 'GEOMETRY')"
    ))
}

/// Counts, for every vertex row, how many rows across the whole layer share
/// its exact point geometry (spec §4.3 step A.3 / property 6: "a vertex's
/// final `intersections` count is exact"). Quadratic in the number of
/// vertices sharing a coordinate, which spec §9 explicitly sanctions
/// provided the geometry index is in place first.
pub fn update_intersections(conn: &Connection, node_layer: &str) -> Result<()> {
    conn.execute_raw(&format!(
        "UPDATE {node_layer} SET intersections = (
            SELECT COUNT(*) FROM {node_layer} AS other WHERE other.GEOMETRY = {node_layer}.GEOMETRY
        )"
    ))
}
