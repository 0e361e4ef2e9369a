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
//! WKB/WKT conversion glue (spec §6: "Well-Known Binary for reads,
//! Well-Known Text for writes, both in SRID 4326").
//!
//! Decoding reuses the `wkb` crate; encoding is hand-rolled because the
//! splitter only ever needs to emit two narrow shapes (a `MULTIPOINT` of
//! cut locations, and the `LINESTRING`/`MULTILINESTRING` segments produced
//! by `ST_LinesCutAtNodes`) and SpatiaLite's `GeomFromText` only cares
//! about the textual grammar, not round-trip fidelity with an arbitrary
//! writer. This mirrors the teacher crate's `convert/` modules, which hand
//! -write geometry conversions between GDAL, GEOS and `geo` rather than
//! reaching for a generic adapter.

use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPoint, Point};
use std::io::Cursor;

use crate::error::{Error, Result};

pub fn decode(bytes: &[u8]) -> Result<Geometry<f64>> {
    let mut cursor = Cursor::new(bytes);
    wkb::wkb_to_geom(&mut cursor).map_err(|e| Error::GeometryDecode(format!("{e:?}")))
}

/// Flattens a line feature's geometry into its global, 1-based vertex
/// sequence (spec §4.3 "ordering and tie-breaks": "When a line is itself a
/// multi-polyline, it is processed as the concatenation of its
/// constituent polylines; vertex indices are global across the
/// concatenation"). This is the flatten-to-global-index strategy recorded
/// as the resolution to the open question in spec §9 / SPEC_FULL.md §9.2.
pub fn flatten_vertices(geometry: &Geometry<f64>) -> Result<Vec<Point<f64>>> {
    match geometry {
        Geometry::LineString(ls) => Ok(ls.points().collect()),
        Geometry::MultiLineString(mls) => {
            Ok(mls.0.iter().flat_map(|ls| ls.points()).collect())
        }
        other => Err(Error::GeometryDecode(format!(
            "expected LineString or MultiLineString, got {other:?}"
        ))),
    }
}

/// Splits a flattened vertex sequence back into a multi-polyline at the
/// given 1-based global cut indices (the inverse of `flatten_vertices`,
/// used to translate a cut decided on the global sequence back into
/// per-constituent-polyline boundaries when the source was itself a
/// multi-polyline). Unused when cutting is delegated to
/// `ST_LinesCutAtNodes` (the chosen strategy, SPEC_FULL.md §9.2); kept as
/// the documented alternative for the flatten/re-split approach.
#[allow(dead_code)]
pub fn resplit_at(points: &[Point<f64>], boundaries: &[usize]) -> Vec<LineString<f64>> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for &end in boundaries {
        out.push(LineString(
            points[start..end].iter().map(|p| p.0).collect(),
        ));
        start = end - 1;
    }
    out
}

/// Decodes a `ST_DissolvePoints` result (spec §4.3 step B.a: read the
/// line's full vertex sequence as a point collection).
pub fn decode_multi_point(bytes: &[u8]) -> Result<MultiPoint<f64>> {
    match decode(bytes)? {
        Geometry::MultiPoint(mp) => Ok(mp),
        Geometry::Point(p) => Ok(MultiPoint(vec![p])),
        other => Err(Error::GeometryDecode(format!(
            "expected MultiPoint, got {other:?}"
        ))),
    }
}

/// Decodes a `ST_LinesCutAtNodes` result. A cut that yields a single
/// remaining segment decodes to a bare `LineString`; this is treated as a
/// one-element `MultiLineString` so callers have one shape to iterate.
pub fn decode_multi_line_string(bytes: &[u8]) -> Result<Option<MultiLineString<f64>>> {
    match decode(bytes)? {
        Geometry::MultiLineString(ml) => Ok(Some(ml)),
        Geometry::LineString(l) => Ok(Some(MultiLineString(vec![l]))),
        _ => Ok(None),
    }
}

fn fmt_coord(c: &Coord<f64>) -> String {
    format!("{} {}", c.x, c.y)
}

pub fn line_string_to_wkt(line: &LineString<f64>) -> String {
    let coords = line
        .coords()
        .map(fmt_coord)
        .collect::<Vec<_>>()
        .join(", ");
    format!("LINESTRING({coords})")
}

pub fn multi_point_to_wkt(points: &MultiPoint<f64>) -> String {
    let coords = points
        .0
        .iter()
        .map(|p| fmt_coord(&p.0))
        .collect::<Vec<_>>()
        .join(", ");
    format!("MULTIPOINT({coords})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn formats_multi_point_wkt() {
        let mp = MultiPoint(vec![Point::new(1.0, 0.0), Point::new(1.0, 1.0)]);
        assert_eq!(multi_point_to_wkt(&mp), "MULTIPOINT(1 0, 1 1)");
    }

    #[test]
    fn formats_line_string_wkt() {
        let ls = LineString(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }]);
        assert_eq!(line_string_to_wkt(&ls), "LINESTRING(0 0, 1 0)");
    }

    #[test]
    fn flattens_multi_line_string_into_a_global_vertex_sequence() {
        let mls = MultiLineString(vec![
            LineString(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 5.0, y: 5.0 }]),
            LineString(vec![Coord { x: 5.0, y: 5.0 }, Coord { x: 10.0, y: 10.0 }]),
        ]);
        let points = flatten_vertices(&Geometry::MultiLineString(mls)).unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 0.0),
                Point::new(5.0, 5.0),
                Point::new(5.0, 5.0),
                Point::new(10.0, 10.0),
            ]
        );
    }

    #[test]
    fn flatten_rejects_point_geometry() {
        let err = flatten_vertices(&Geometry::Point(Point::new(0.0, 0.0))).unwrap_err();
        assert!(matches!(err, Error::GeometryDecode(_)));
    }
}
