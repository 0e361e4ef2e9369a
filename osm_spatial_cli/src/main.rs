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
use anyhow::{Context, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use structopt::StructOpt;

use osm_spatial_core::config::{LineExtractDocument, LineSplitDocument, TagExtractDocument};
use osm_spatial_core::{tag_expand, Connection};

#[derive(StructOpt)]
#[structopt(about = "Post-processes OSM data loaded into a SpatiaLite database")]
struct Cli {
    #[structopt(long, default_value = "Warn")]
    log_level: LevelFilter,

    #[structopt(short = "f", long, parse(from_os_str))]
    spatialite_file: std::path::PathBuf,

    #[structopt(short = "t", long, parse(from_os_str))]
    tag_extract_config: Option<std::path::PathBuf>,

    #[structopt(short = "e", long, parse(from_os_str))]
    line_extract_config: Option<std::path::PathBuf>,

    #[structopt(short = "s", long, parse(from_os_str))]
    line_split_config: Option<std::path::PathBuf>,

    /// Lists the distinct `other_tags` keys present on a layer and exits,
    /// without running any of the three passes (a diagnostic aid for
    /// hand-writing a tag-extraction config; ported from `FetchAllTags` in
    /// the original tool, see SPEC_FULL.md §7).
    #[structopt(long)]
    list_tags: Option<String>,
}

fn run() -> Result<()> {
    let args = Cli::from_args();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let mut conn = Connection::open(&args.spatialite_file)
        .with_context(|| format!("opening {}", args.spatialite_file.display()))?;

    if let Some(layer) = &args.list_tags {
        for key in tag_expand::fetch_all_tag_keys(&conn, layer)? {
            println!("{key}");
        }
        return Ok(());
    }

    let line_extract_doc = args
        .line_extract_config
        .as_deref()
        .map(LineExtractDocument::load)
        .transpose()
        .context("loading line-extraction config")?;

    let tag_extract_doc = args
        .tag_extract_config
        .as_deref()
        .map(TagExtractDocument::load)
        .transpose()
        .context("loading tag-extraction config")?;

    let line_split_doc = args
        .line_split_config
        .as_deref()
        .map(LineSplitDocument::load)
        .transpose()
        .context("loading line-split config")?;

    osm_spatial_core::run_all(
        &mut conn,
        line_extract_doc.as_ref(),
        tag_extract_doc.as_ref(),
        line_split_doc.as_ref(),
    )?;

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
