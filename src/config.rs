//! Configuration loading.
//!
//! Mirrors the original tool's config format: one `name = value` pair per
//! line, `#` starts a line comment, blank lines are ignored. This is
//! intentionally not TOML/JSON — the source project never needed nested
//! structure, and a flat key=value file is what operators already have on
//! disk.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const DEFAULT_DATA_DIR: &str = "/var/lib/carbon-pool";
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_SEGMENTS: usize = 10;
pub const DEFAULT_INGEST_ADDR: &str = "127.0.0.1:2003";
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:2002";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub segment_size: u64,
    pub max_segments: usize,
    pub ingest_addr: SocketAddr,
    pub api_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            segment_size: DEFAULT_SEGMENT_SIZE,
            max_segments: DEFAULT_MAX_SEGMENTS,
            ingest_addr: DEFAULT_INGEST_ADDR.parse().expect("valid default addr"),
            api_addr: DEFAULT_API_ADDR.parse().expect("valid default addr"),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let raw = parse_kv(content)?;
        let mut cfg = Config::default();

        if let Some(v) = raw.get("data-dir") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = raw.get("segment-size") {
            cfg.segment_size = size_to_bytes(v)?;
        }
        if let Some(v) = raw.get("max-segments") {
            cfg.max_segments = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid max-segments: {v}")))?;
            if cfg.max_segments == 0 {
                return Err(Error::Config("max-segments must be at least 1".into()));
            }
        }
        if let Some(v) = raw.get("ingest-addr") {
            cfg.ingest_addr = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid ingest-addr: {v}")))?;
        }
        if let Some(v) = raw.get("api-addr") {
            cfg.api_addr = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid api-addr: {v}")))?;
        }

        Ok(cfg)
    }
}

fn parse_kv(content: &str) -> Result<HashMap<String, String>> {
    let mut cfg = HashMap::new();
    for (lineno, raw_line) in content.split('\n').enumerate() {
        let line = match raw_line.find('#') {
            Some(i) => &raw_line[..i],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let (name, value) = match (parts.next(), parts.next()) {
            (Some(n), Some(v)) => (n.trim(), v.trim()),
            _ => {
                return Err(Error::Config(format!(
                    "invalid syntax at line {}",
                    lineno + 1
                )))
            }
        };
        cfg.insert(name.to_string(), value.to_string());
    }
    Ok(cfg)
}

/// Parse a human size string (`16M`, `512K`, `1G`, a bare byte count) into
/// a byte count. Case-insensitive unit suffix.
pub fn size_to_bytes(size: &str) -> Result<u64> {
    let size = size.trim();
    if size.is_empty() {
        return Err(Error::Config("empty size".into()));
    }

    let (digits, multiplier) = match size.as_bytes()[size.len() - 1] {
        b'B' | b'b' => (&size[..size.len() - 1], 1u64),
        b'K' | b'k' => (&size[..size.len() - 1], 1024u64),
        b'M' | b'm' => (&size[..size.len() - 1], 1024u64 * 1024),
        b'G' | b'g' => (&size[..size.len() - 1], 1024u64 * 1024 * 1024),
        _ => (size, 1u64),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("invalid size format: {size}")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("size overflows: {size}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_to_bytes_parses_units() {
        assert_eq!(size_to_bytes("1024").unwrap(), 1024);
        assert_eq!(size_to_bytes("512K").unwrap(), 512 * 1024);
        assert_eq!(size_to_bytes("16M").unwrap(), 16 * 1024 * 1024);
        assert_eq!(size_to_bytes("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(size_to_bytes("4k").unwrap(), 4 * 1024);
    }

    #[test]
    fn size_to_bytes_rejects_garbage() {
        assert!(size_to_bytes("sixteen megabytes").is_err());
        assert!(size_to_bytes("").is_err());
    }

    #[test]
    fn parse_kv_ignores_comments_and_blanks() {
        let cfg = parse_kv(
            "# a comment\n\n  data-dir = /tmp/pool  \nmax-segments=5 # inline\n",
        )
        .unwrap();
        assert_eq!(cfg.get("data-dir").unwrap(), "/tmp/pool");
        assert_eq!(cfg.get("max-segments").unwrap(), "5");
    }

    #[test]
    fn parse_kv_rejects_missing_equals() {
        assert!(parse_kv("this-is-not-valid").is_err());
    }

    #[test]
    fn from_str_overrides_defaults() {
        let cfg = Config::from_str("segment-size = 32M\nmax-segments = 4\n").unwrap();
        assert_eq!(cfg.segment_size, 32 * 1024 * 1024);
        assert_eq!(cfg.max_segments, 4);
        assert_eq!(cfg.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn from_str_rejects_zero_max_segments() {
        assert!(Config::from_str("max-segments = 0\n").is_err());
    }
}
