use anyhow::{Context, Result};
use ip2proxy::schema::schema_for;
use ip2proxy::{IoMode, ProxyDatabase};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::format_number;

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = ProxyDatabase::from_path(&database, IoMode::Buffered)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let info = db
        .info()
        .with_context(|| format!("Database not loaded: {}", database.display()))?;

    let columns: Vec<String> = schema_for(info.db_type)
        .map(|schema| schema.columns().map(|c| format!("{:?}", c)).collect())
        .unwrap_or_default();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "package": format!("PX{}", info.db_type),
            "database_version": db.database_version(),
            "module_version": db.module_version(),
            "header": info,
            "columns": columns,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    println!("Package:  PX{}", info.db_type);
    let version = db.database_version();
    println!("Version:  {}", if version.is_empty() { "(unset)" } else { version.as_str() });
    println!();
    println!("Tables:");
    println!(
        "  IPv4 rows:       {} (width {} bytes)",
        format_number(info.ipv4.rows as usize),
        info.ipv4.row_width
    );
    if info.ipv6.is_empty() {
        println!("  IPv6 rows:       ✗");
    } else {
        println!(
            "  IPv6 rows:       {} (width {} bytes)",
            format_number(info.ipv6.rows as usize),
            info.ipv6.row_width
        );
    }
    println!("  IPv6 index:      {}", if info.has_ipv6_index() { "✓" } else { "✗" });
    println!();
    println!("Columns ({}):", info.column_count);
    for column in columns {
        println!("  {}", column);
    }

    Ok(())
}
