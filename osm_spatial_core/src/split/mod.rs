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
//! Line Splitter (spec §4.3): the core pass. Re-cuts every polyline at the
//! interior vertices it shares with at least one other line, then rebuilds
//! a deduplicated node layer and a line-to-node cross-reference.
//!
//! Split into two phases, grounded on the two halves of `SplitLines` in the
//! original Go tool's `osmnode.go`: [`vertex`] enumerates vertices and
//! counts their multiplicity, [`cut`] performs the actual re-cutting and
//! rebuilds the node layer.

mod cut;
mod vertex;

use crate::config::LineSplitDocument;
use crate::db::Connection;
use crate::error::{ConfigError, Error, Result};
use log::info;

/// Runs every config entry in `doc` against `conn`, in document order.
pub fn run(conn: &mut Connection, doc: &LineSplitDocument) -> Result<()> {
    for config in &doc.configs {
        if !conn.table_exists(&config.line_layer)? {
            return Err(Error::Config(ConfigError::UnknownTable(
                config.line_layer.clone(),
            )));
        }

        info!(
            "splitting `{}` at shared interior vertices",
            config.line_layer
        );
        cut::run(conn, config)?;
    }
    Ok(())
}
