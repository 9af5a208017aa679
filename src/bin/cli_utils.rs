use flate2::read::MultiGzDecoder;
use ip2proxy::QueryResult;
use serde_json::json;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader};
use std::path::Path;

/// Buffer size for input files
const BUFFER_SIZE: usize = 128 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open an address list. "-" reads stdin; gzip input is detected by its
/// magic bytes and decompressed.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(path)?);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        let decoder = MultiGzDecoder::new(reader);
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder)));
    }

    Ok(Box::new(reader))
}

/// JSON object for one lookup: the address, its status and every attribute
pub fn result_to_json(ip: &str, result: &QueryResult) -> serde_json::Value {
    let mut value = json!(result);
    if let serde_json::Value::Object(ref mut map) = value {
        map.insert("ip".to_string(), json!(ip));
        map.insert("status".to_string(), json!(result.status));
    }
    value
}

pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub fn format_qps(qps: f64) -> String {
    if qps >= 1_000_000.0 {
        format!("{:.2}M", qps / 1_000_000.0)
    } else if qps >= 1_000.0 {
        format!("{:.2}K", qps / 1_000.0)
    } else {
        format!("{:.2}", qps)
    }
}
