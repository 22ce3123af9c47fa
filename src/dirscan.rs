//! Enumerating and ordering the `.seg` files present in a log directory.

use std::fs;
use std::path::Path;

use crate::segment::parse_base;
use crate::Result;

/// Bases of all `.seg` files in `dir`, ascending. Corresponding `.idx`
/// files are not inspected here; `Segment::open` is the source of truth
/// for `write_offset`.
pub fn segment_bases(dir: &Path) -> Result<Vec<u64>> {
    let mut bases = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if let Some(base) = parse_base(&name) {
            bases.push(base);
        }
    }
    bases.sort_unstable();
    Ok(bases)
}
