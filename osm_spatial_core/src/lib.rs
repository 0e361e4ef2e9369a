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
//! Post-processing passes for OSM data loaded into a SpatiaLite database:
//! line reclassification, tag extraction, and line splitting at shared
//! interior vertices.

pub mod config;
pub mod db;
pub mod error;
pub mod geom;
pub mod reclassify;
pub mod split;
pub mod tag_blob;
pub mod tag_expand;

pub use config::{LineExtractDocument, LineSplitDocument, TagExtractDocument};
pub use db::Connection;
pub use error::{ConfigError, Error, Result};

/// Runs the three passes in the fixed order the splitter's correctness
/// depends on: reclassification first (so the splitter's line layers hold
/// their final row sets), then tag extraction, then splitting.
pub fn run_all(
    conn: &mut Connection,
    reclassify_doc: Option<&LineExtractDocument>,
    tag_extract_doc: Option<&TagExtractDocument>,
    split_doc: Option<&LineSplitDocument>,
) -> Result<()> {
    if let Some(doc) = reclassify_doc {
        reclassify::run(conn, doc)?;
    }
    if let Some(doc) = tag_extract_doc {
        tag_expand::run(conn, doc)?;
    }
    if let Some(doc) = split_doc {
        split::run(conn, doc)?;
    }
    Ok(())
}
