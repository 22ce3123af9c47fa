//! The ordered collection of segments that makes up one log directory:
//! global offset namespace, append routing, read traversal, rollover,
//! and retention eviction.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use parking_lot::ReentrantMutex;

use crate::dirscan::segment_bases;
use crate::segment::{data_path as seg_data_path, index_path as seg_index_path, Segment};
use crate::{Error, Result};

/// Returned as `next_offset` when a requested cursor is invalid (beyond
/// the write frontier, or pointing at a segment that retention already
/// evicted).
pub const SENTINEL: i64 = -1;

struct Inner {
    active: Segment,
}

/// A single-node append-only segmented log.
///
/// Every public operation (`append`, `read`, `offset`) serializes
/// through one re-entrant lock: the hot path is I/O-bound and the
/// per-call line budget is small, so coarse locking is a deliberate
/// simplification rather than an oversight. Re-entrance lets `offset`
/// be called as a nested operation from within `append`/`read`.
pub struct Log {
    dir: PathBuf,
    segment_size: u64,
    max_segments: usize,
    lock: ReentrantMutex<RefCell<Inner>>,
}

impl Log {
    /// Open the log rooted at `dir`, creating it if empty. Scans for the
    /// greatest-base `.seg` file and adopts it as active; sealed
    /// segments are left closed on disk.
    pub fn open(dir: impl AsRef<Path>, segment_size: u64, max_segments: usize) -> Result<Self> {
        assert!(segment_size > 0, "segment_size must be positive");
        assert!(max_segments >= 1, "max_segments must be at least 1");

        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let bases = segment_bases(&dir)?;
        let base = bases.last().copied().unwrap_or(0);
        let active = Segment::open(&dir, base, segment_size)?;

        Ok(Self {
            dir,
            segment_size,
            max_segments,
            lock: ReentrantMutex::new(RefCell::new(Inner { active })),
        })
    }

    /// Flush the active segment's file handle. Sidecar index files are
    /// already current on disk after every append.
    pub fn close(&self) -> Result<()> {
        let guard = self.lock.lock();
        guard.borrow_mut().active.close()
    }

    /// The live write frontier: `active.base + active.write_offset`.
    pub fn offset(&self) -> u64 {
        let guard = self.lock.lock();
        let inner = guard.borrow();
        inner.active.base() + inner.active.write_offset()
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append `block` to the active segment, rolling over to a fresh
    /// segment (and evicting the oldest on retention overflow) if it
    /// does not fit. Returns `false`, leaving the log untouched, when
    /// the block by itself exceeds `segment_size` and so could never
    /// fit even a freshly rolled, empty segment.
    pub fn append(&self, block: &[u8]) -> Result<bool> {
        if block.len() as u64 > self.segment_size {
            return Ok(false);
        }

        let guard = self.lock.lock();
        let mut inner = guard.borrow_mut();

        if inner.active.append(block)? {
            return Ok(true);
        }

        let sealed_base = inner.active.base();
        let sealed_capacity = inner.active.capacity();
        inner.active.close()?;

        let next_base = sealed_base + sealed_capacity;
        self.evict_if_over_retention()?;

        // block.len() <= self.segment_size was checked above, so this
        // always succeeds against a fresh, empty segment.
        let mut fresh = Segment::create(&self.dir, next_base, self.segment_size)?;
        let fit = fresh.append(block)?;
        inner.active = fresh;
        Ok(fit)
    }

    /// Return up to `max_lines` complete lines starting at `global_offset`,
    /// plus the cursor following the last returned line. See spec §4.2
    /// for the full case analysis this implements.
    pub fn read(&self, global_offset: u64, max_lines: usize) -> Result<(Vec<u8>, i64)> {
        if max_lines == 0 {
            return Err(Error::BadLimit);
        }

        let guard = self.lock.lock();
        let mut inner = guard.borrow_mut();

        let mut offset = global_offset;
        let mut remaining = max_lines;
        let mut result = Vec::new();

        loop {
            let active_base = inner.active.base();
            let active_hi = active_base + inner.active.write_offset();

            if offset >= active_base {
                if offset < active_hi {
                    let local = offset - active_base;
                    let (data, new_local) = inner.active.read(local, remaining)?;
                    result.extend_from_slice(&data);
                    return Ok((result, (active_base + new_local) as i64));
                }
                if offset == active_hi {
                    return Ok((result, offset as i64));
                }
                // offset > active_hi: invalid future cursor.
                return Ok((result, if result.is_empty() { SENTINEL } else { offset as i64 }));
            }

            // offset < active_base: look among sealed segments.
            let bases = segment_bases(&self.dir)?;
            let sealed_base = match bases.iter().rev().find(|&&b| b <= offset) {
                Some(&b) => b,
                None => {
                    return Ok((result, if result.is_empty() { SENTINEL } else { offset as i64 }));
                }
            };

            let mut sealed = Segment::open(&self.dir, sealed_base, self.segment_size)?;
            let local = offset - sealed_base;
            let read_result = sealed.read(local, remaining);
            let sealed_capacity = sealed.capacity();
            let sealed_write_offset = sealed.write_offset();
            sealed.close()?;

            let (data, new_local) = match read_result {
                Ok(v) => v,
                Err(Error::BadOffset { .. }) => {
                    // `offset` falls in a rollover hole past this
                    // segment's write_offset but before its capacity.
                    return Ok((result, if result.is_empty() { SENTINEL } else { offset as i64 }));
                }
                Err(err) => return Err(err),
            };

            result.extend_from_slice(&data);
            remaining = remaining.saturating_sub(count_lines(&data));

            if new_local < sealed_write_offset {
                // Budget satisfied before draining the segment.
                return Ok((result, (sealed_base + new_local) as i64));
            }

            // Segment drained; cross the contiguity boundary using
            // capacity (not write_offset) so a rollover hole is skipped.
            offset = sealed_base + sealed_capacity;
            if remaining == 0 {
                return Ok((result, offset as i64));
            }
        }
    }

    fn evict_if_over_retention(&self) -> Result<()> {
        let bases = segment_bases(&self.dir)?;
        if bases.len() < self.max_segments {
            return Ok(());
        }
        if let Some(&oldest) = bases.first() {
            std::fs::remove_file(seg_data_path(&self.dir, oldest))?;
            std::fs::remove_file(seg_index_path(&self.dir, oldest))?;
            log::info!(target: "carbon_pool::log", "retention evicted segment base={oldest}");
        }
        Ok(())
    }
}

fn count_lines(data: &[u8]) -> usize {
    data.iter().filter(|&&b| b == b'\n').count()
}
