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
//! Declarative configuration documents consumed by the three passes
//! (spec §6). Each is a YAML document with a single top-level `configs`
//! list, matching `gopkg.in/yaml.v3` decoding in the original tool.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let path_str = path.display().to_string();
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path_str,
        source,
    })
}

/// One `{name, field, type}` tag descriptor (spec §4.2, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagDescriptor {
    pub name: String,
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagExtractConfig {
    pub layer: String,
    #[serde(rename = "ref")]
    pub ref_table: String,
    pub tags: Vec<TagDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagExtractDocument {
    pub configs: Vec<TagExtractConfig>,
}

impl TagExtractDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

/// One `{field, value}` reclassification predicate (spec §4.1, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtField {
    pub field: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineExtractConfig {
    pub layer: String,
    pub table: String,
    pub field: String,
    pub sub_field: String,
    pub ext_fields: Vec<ExtField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineExtractDocument {
    pub configs: Vec<LineExtractConfig>,
}

impl LineExtractDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

/// One `{line_layer, line_node_layer, node_layer}` splitter triple (spec §4.3, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineSplitConfig {
    pub line_layer: String,
    pub line_node_layer: String,
    pub node_layer: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineSplitDocument {
    pub configs: Vec<LineSplitConfig>,
}

impl LineSplitDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile_path::TempFile {
        tempfile_path::TempFile::new(contents)
    }

    mod tempfile_path {
        use std::fs::File;
        use std::io::Write;
        use std::path::PathBuf;

        /// Minimal scratch-file helper so tests don't need a `tempfile` dev
        /// dependency for a handful of small YAML fixtures.
        pub struct TempFile {
            path: PathBuf,
        }

        impl TempFile {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                let unique = format!(
                    "osm_spatial_core_test_{}_{}.yaml",
                    std::process::id(),
                    contents.len()
                );
                path.push(unique);
                let mut f = File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                TempFile { path }
            }

            pub fn path(&self) -> &std::path::Path {
                &self.path
            }
        }

        impl Drop for TempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn parses_tag_extract_document() {
        let yaml = r#"
configs:
  - layer: lines
    ref: lines_tags
    tags:
      - name: bridge
        field: is_bridge
        type: VARCHAR
      - name: maxspeed
        field: maxspeed
        type: VARCHAR
"#;
        let f = write_temp(yaml);
        let doc = TagExtractDocument::load(f.path()).unwrap();
        assert_eq!(doc.configs.len(), 1);
        assert_eq!(doc.configs[0].layer, "lines");
        assert_eq!(doc.configs[0].ref_table, "lines_tags");
        assert_eq!(doc.configs[0].tags.len(), 2);
        assert_eq!(doc.configs[0].tags[0].name, "bridge");
    }

    #[test]
    fn parses_line_extract_document() {
        let yaml = r#"
configs:
  - layer: lines
    table: waterways
    field: type
    sub_field: sub_type
    ext_fields:
      - field: waterway
        value: ""
"#;
        let f = write_temp(yaml);
        let doc = LineExtractDocument::load(f.path()).unwrap();
        assert_eq!(doc.configs[0].ext_fields[0].field, "waterway");
        assert_eq!(doc.configs[0].ext_fields[0].value, "");
    }

    #[test]
    fn parses_line_split_document() {
        let yaml = r#"
configs:
  - line_layer: lines
    line_node_layer: lines_node
    node_layer: node
"#;
        let f = write_temp(yaml);
        let doc = LineSplitDocument::load(f.path()).unwrap();
        assert_eq!(doc.configs[0].line_layer, "lines");
        assert_eq!(doc.configs[0].node_layer, "node");
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = TagExtractDocument::load("/nonexistent/path/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = r#"
configs:
  - layer: lines
    ref: lines_tags
    tags: []
    bogus: true
"#;
        let f = write_temp(yaml);
        let err = TagExtractDocument::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
