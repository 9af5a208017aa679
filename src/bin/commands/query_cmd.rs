use anyhow::{Context, Result};
use ip2proxy::{Attribute, IoMode, ProxyDatabase, Request};
use std::path::PathBuf;

use crate::cli_utils::result_to_json;

pub fn cmd_query(database: PathBuf, ip: String, field: Option<String>, io_mode: IoMode, quiet: bool) -> Result<()> {
    let db = ProxyDatabase::from_path(&database, io_mode)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let attribute = field
        .as_deref()
        .map(str::parse::<Attribute>)
        .transpose()
        .context("Invalid --field")?;

    let request = attribute.map_or(Request::All, Request::Only);
    let result = db
        .query(&ip, request)
        .with_context(|| format!("Query failed for: {}", ip))?;

    let found = result.is_found();

    if quiet {
        std::process::exit(if found { 0 } else { 1 });
    }

    match attribute {
        Some(attr) => println!("{}", result.value(attr)),
        None => println!("{}", serde_json::to_string_pretty(&result_to_json(&ip, &result))?),
    }

    std::process::exit(if found { 0 } else { 1 });
}
