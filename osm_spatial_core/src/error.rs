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
use thiserror::Error;

/// Error taxonomy for the three post-processing passes (spec §7).
///
/// Every variant is fatal to the run except the duplicate-column case,
/// which callers are expected to catch and demote to a warning (see
/// `db::is_duplicate_column_error`).
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error while executing `{statement}`: {source}")]
    Database {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("geometry decode error: {0}")]
    GeometryDecode(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config references unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("config references unknown table `{0}`")]
    UnknownTable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn db(statement: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Database {
            statement: statement.into(),
            source,
        }
    }
}
