use anyhow::{Context, Result};
use ip2proxy::{IoMode, LookupStatus, ProxyDatabase, QueryResult};
use rayon::prelude::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{format_number, format_qps, open_input, result_to_json};

pub fn cmd_batch(
    database: PathBuf,
    inputs: Vec<PathBuf>,
    threads: Option<usize>,
    io_mode: IoMode,
    stats: bool,
) -> Result<()> {
    let db = ProxyDatabase::from_path(&database, io_mode)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut addresses = Vec::new();
    for input in &inputs {
        let reader = open_input(input).with_context(|| format!("Failed to open input: {}", input.display()))?;
        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read: {}", input.display()))?;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                addresses.push(trimmed.to_string());
            }
        }
    }

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        pool = pool.num_threads(n);
    }
    let pool = pool.build().context("Failed to start worker threads")?;

    let start = Instant::now();
    let results: Vec<QueryResult> = pool.install(|| {
        addresses
            .par_iter()
            .map(|ip| db.lookup(ip))
            .collect::<ip2proxy::Result<Vec<_>>>()
    })?;
    let elapsed = start.elapsed();

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for (ip, result) in addresses.iter().zip(&results) {
        serde_json::to_writer(&mut out, &result_to_json(ip, result))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    if stats {
        let count = |status: LookupStatus| results.iter().filter(|r| r.status == status).count();
        let proxies = results.iter().filter(|r| r.is_proxy > 0).count();
        let secs = elapsed.as_secs_f64();
        eprintln!("[INFO] Lookups:        {}", format_number(results.len()));
        eprintln!("[INFO] Found:          {}", format_number(count(LookupStatus::Found)));
        eprintln!("[INFO] Proxies:        {}", format_number(proxies));
        eprintln!("[INFO] Invalid:        {}", format_number(count(LookupStatus::InvalidAddress)));
        eprintln!("[INFO] IPv6 missing:   {}", format_number(count(LookupStatus::Ipv6Unsupported)));
        eprintln!("[INFO] Lookup time:    {:.3}s", secs);
        if secs > 0.0 {
            eprintln!("[INFO] Throughput:     {} lookups/s", format_qps(results.len() as f64 / secs));
        }
    }

    Ok(())
}
