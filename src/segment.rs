//! A segment is one (data, index) file pair covering a contiguous byte
//! range `[base, base + capacity)` of the log's global offset namespace.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Width of the zero-padded base in a segment's filename. Wide enough to
/// hold `u64::MAX` (20 decimal digits) so lexicographic directory order
/// agrees with numeric base order.
const BASE_WIDTH: usize = 20;

pub const DATA_EXT: &str = "seg";
pub const INDEX_EXT: &str = "idx";

/// Render a segment's filename stem from its base offset.
pub fn base_name(base: u64) -> String {
    format!("{base:0width$}", width = BASE_WIDTH)
}

pub fn data_path(dir: &Path, base: u64) -> PathBuf {
    dir.join(format!("{}.{DATA_EXT}", base_name(base)))
}

pub fn index_path(dir: &Path, base: u64) -> PathBuf {
    dir.join(format!("{}.{INDEX_EXT}", base_name(base)))
}

/// Parse a `.seg` filename's stem back into a base offset.
pub fn parse_base(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(&format!(".{DATA_EXT}"))?;
    stem.parse::<u64>().ok()
}

pub struct Segment {
    base: u64,
    capacity: u64,
    write_offset: u64,
    data_path: PathBuf,
    index_path: PathBuf,
    file: File,
}

impl Segment {
    /// Open (or create) the segment rooted at `base` with the given
    /// preallocation `capacity`. Follows the open contract in full:
    /// index file is authoritative for `write_offset`, data file size is
    /// authoritative for `capacity`.
    pub fn open(dir: &Path, base: u64, capacity: u64) -> Result<Self> {
        let data_path = data_path(dir, base);
        let index_path = index_path(dir, base);

        let write_offset = match read_index(&index_path) {
            Ok(offset) => offset,
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                if data_path.exists() {
                    return Err(Error::Corrupt("data file exists with no index sidecar"));
                }
                write_index(&index_path, 0)?;
                0
            }
            Err(err) => return Err(err),
        };

        if !data_path.exists() {
            preallocate(&data_path, capacity)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&data_path)?;
        let actual_capacity = file.metadata()?.len();
        file.seek(SeekFrom::Start(write_offset))?;

        if write_offset > actual_capacity {
            return Err(Error::Corrupt("write_offset exceeds data file size"));
        }

        Ok(Self {
            base,
            capacity: actual_capacity,
            write_offset,
            data_path,
            index_path,
            file,
        })
    }

    /// Create a brand new segment, preallocating its data file.
    pub fn create(dir: &Path, base: u64, capacity: u64) -> Result<Self> {
        Self::open(dir, base, capacity)
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Append `block` if it fits in the remaining capacity. Returns
    /// `false` ("no room") without touching the file if it does not.
    pub fn append(&mut self, block: &[u8]) -> Result<bool> {
        let block_len = block.len() as u64;
        if self.write_offset + block_len > self.capacity {
            return Ok(false);
        }

        self.file.seek(SeekFrom::Start(self.write_offset))?;
        self.file.write_all(block)?;
        self.write_offset += block_len;
        write_index(&self.index_path, self.write_offset)?;
        Ok(true)
    }

    /// Read up to `max_lines` complete newline-terminated lines starting
    /// at local offset `from_local`. Never returns a trailing partial
    /// line. Restores the write cursor on exit so concurrent appends are
    /// unaffected.
    pub fn read(&mut self, from_local: u64, max_lines: usize) -> Result<(Vec<u8>, u64)> {
        if from_local > self.write_offset {
            return Err(Error::BadOffset {
                offset: from_local,
                limit: self.write_offset,
            });
        }

        let write_cursor = self.file.stream_position()?;

        let mut out = Vec::new();
        let mut pos = from_local;
        let mut lines_read = 0usize;
        let mut carry: Vec<u8> = Vec::new();

        self.file.seek(SeekFrom::Start(pos))?;
        let mut reader_buf = [0u8; 4096];
        'outer: while lines_read < max_lines && pos < self.write_offset {
            let remaining = (self.write_offset - pos) as usize;
            let want = remaining.min(reader_buf.len());
            if want == 0 {
                break;
            }
            let n = self.file.read(&mut reader_buf[..want])?;
            if n == 0 {
                break;
            }
            carry.extend_from_slice(&reader_buf[..n]);

            let mut consumed_in_chunk = 0usize;
            loop {
                if lines_read >= max_lines {
                    break;
                }
                match carry[consumed_in_chunk..].iter().position(|&b| b == b'\n') {
                    Some(rel) => {
                        let end = consumed_in_chunk + rel + 1;
                        let line = &carry[consumed_in_chunk..end];
                        if line.is_empty() {
                            // Zero-length line is an end marker.
                            break 'outer;
                        }
                        out.extend_from_slice(line);
                        pos += line.len() as u64;
                        lines_read += 1;
                        consumed_in_chunk = end;
                    }
                    None => break,
                }
            }
            carry.drain(..consumed_in_chunk);
            // A line without a trailing newline before write_offset is a
            // partial tail; stop without returning it.
            if pos >= self.write_offset {
                break;
            }
        }

        self.file.seek(SeekFrom::Start(write_cursor))?;
        Ok((out, pos))
    }

    /// Flush buffered writes. The index file is already current on disk.
    pub fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

fn read_index(path: &Path) -> Result<u64> {
    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text)?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| Error::Corrupt("index file does not contain a decimal offset"))
}

fn write_index(path: &Path, write_offset: u64) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    write!(file, "{write_offset}")?;
    file.flush()?;
    Ok(())
}

/// Preallocate `size` bytes of NUL at `path`, reserving the disk space
/// up front rather than relying on a sparse hole.
fn preallocate(path: &Path, size: u64) -> Result<()> {
    const CHUNK: usize = 64 * 1024;
    let zeros = [0u8; CHUNK];
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(CHUNK as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn naming_round_trips() {
        assert_eq!(parse_base("00000000000000000000.seg"), Some(0));
        assert_eq!(parse_base("00000000000000005120.seg"), Some(5120));
        assert_eq!(parse_base("not-a-segment.seg"), None);
        assert_eq!(parse_base("00000000000000000000.idx"), None);
    }

    #[test]
    fn create_preallocates_and_opens_empty() {
        let dir = tempdir().expect("tempdir");
        let seg = Segment::create(dir.path(), 0, 64).expect("create");
        assert_eq!(seg.capacity(), 64);
        assert_eq!(seg.write_offset(), 0);
        assert_eq!(
            std::fs::metadata(seg.data_path()).expect("stat").len(),
            64
        );
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().expect("tempdir");
        let mut seg = Segment::create(dir.path(), 0, 64).expect("create");
        assert!(seg.append(b"abcd\n").expect("append"));
        assert!(seg.append(b"efgh\n").expect("append"));
        let (data, new_offset) = seg.read(0, 10).expect("read");
        assert_eq!(data, b"abcd\nefgh\n");
        assert_eq!(new_offset, 10);
    }

    #[test]
    fn append_no_room_leaves_state_unchanged() {
        let dir = tempdir().expect("tempdir");
        let mut seg = Segment::create(dir.path(), 0, 8).expect("create");
        assert!(!seg.append(b"0123456789\n").expect("append"));
        assert_eq!(seg.write_offset(), 0);
    }

    #[test]
    fn read_withholds_partial_trailing_line() {
        let dir = tempdir().expect("tempdir");
        let mut seg = Segment::create(dir.path(), 0, 64).expect("create");
        seg.append(b"abcd\npartial").expect("append");
        let (data, new_offset) = seg.read(0, 10).expect("read");
        assert_eq!(data, b"abcd\n");
        assert_eq!(new_offset, 5);
    }

    #[test]
    fn read_out_of_range_fails() {
        let dir = tempdir().expect("tempdir");
        let mut seg = Segment::create(dir.path(), 0, 64).expect("create");
        seg.append(b"abcd\n").expect("append");
        assert!(matches!(seg.read(100, 1), Err(Error::BadOffset { .. })));
    }

    #[test]
    fn reopen_recovers_write_offset_from_index() {
        let dir = tempdir().expect("tempdir");
        {
            let mut seg = Segment::create(dir.path(), 0, 64).expect("create");
            seg.append(b"abcd\n").expect("append");
            seg.close().expect("close");
        }
        let seg = Segment::open(dir.path(), 0, 64).expect("reopen");
        assert_eq!(seg.write_offset(), 5);
        assert_eq!(seg.capacity(), 64);
    }

    #[test]
    fn open_fails_on_data_file_with_missing_index() {
        let dir = tempdir().expect("tempdir");
        {
            let mut seg = Segment::create(dir.path(), 0, 64).expect("create");
            seg.append(b"abcd\n").expect("append");
            seg.close().expect("close");
        }
        std::fs::remove_file(index_path(dir.path(), 0)).expect("remove index");

        assert!(matches!(
            Segment::open(dir.path(), 0, 64),
            Err(Error::Corrupt(_))
        ));
    }
}
