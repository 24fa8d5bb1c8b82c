//! Fixed-capacity free-store allocator.
//!
//! The arena is a single `Vec<u8>` carved into blocks. Every block starts with
//! an 8-byte header and ends with an 8-byte footer, both holding the block size
//! and a used flag (boundary tags), so a freed block can find and merge with
//! both physical neighbours in O(1). Free blocks keep `next`/`prev` links in
//! their own payload and are threaded into one list per power-of-two size
//! class.
//!
//! Fit policy is segregated first-fit: the request's own class is scanned
//! first-fit, then the head of the next non-empty larger class is taken (any
//! block there is big enough). Oversized blocks are split when the remainder
//! can hold a minimum block.

use std::fmt;

use log::debug;
use thiserror::Error;

/// Block granularity. Every block size and offset is a multiple of this.
pub const ALIGNMENT: usize = 16;
const HEADER: usize = 8;
const FOOTER: usize = 8;
/// Header + two free-list links + footer, rounded up to the alignment.
pub const MIN_BLOCK: usize = 32;
const NUM_CLASSES: usize = 27;
const NIL: u32 = u32::MAX;
const MAGIC: u32 = 0x7A11_0C8D;
const USED: u32 = 1;

/// Offset of a block's payload inside the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub fn offset(self) -> u32 {
        self.0
    }

    pub(crate) fn from_offset(offset: u32) -> Self {
        Handle(offset)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: requested {requested} bytes, largest free block holds {largest_free}")]
    OutOfMemory { requested: usize, largest_free: usize },

    #[error("invalid or already freed handle at offset {0}")]
    InvalidHandle(u32),

    #[error("arena corrupted: {0}")]
    Corrupt(String),
}

pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation counters: `current` live blocks, `total` operations ever performed.
#[derive(Debug, Clone, Copy, Default)]
struct Bookkeeper {
    current: usize,
    total: usize,
}

/// Snapshot of arena usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    pub capacity: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub live_blocks: usize,
    pub free_blocks: usize,
    pub largest_free: usize,
    pub total_operations: usize,
}

pub struct Allocator {
    memory: Vec<u8>,
    free_heads: [u32; NUM_CLASSES],
    free_bytes: usize,
    book: Bookkeeper,
}

impl Allocator {
    /// Create an allocator over a zeroed arena of `capacity` bytes, rounded
    /// down to the block alignment. An arena smaller than one block can never
    /// satisfy a request.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize) & !(ALIGNMENT - 1);
        let capacity = if capacity < MIN_BLOCK { 0 } else { capacity };
        let mut allocator = Allocator {
            memory: vec![0; capacity],
            free_heads: [NIL; NUM_CLASSES],
            free_bytes: 0,
            book: Bookkeeper::default(),
        };
        allocator.free_all();
        allocator
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Bytes held by free blocks, headers and footers included.
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// Number of blocks currently handed out.
    pub fn live_blocks(&self) -> usize {
        self.book.current
    }

    /// Allocate a block with at least `size` payload bytes.
    pub fn allocate(&mut self, size: usize) -> AllocResult<Handle> {
        let need = match block_size_for(size) {
            Some(need) if need <= self.memory.len() => need,
            _ => return Err(self.out_of_memory(size)),
        };
        let block = match self.find_fit(need) {
            Some(block) => block,
            None => return Err(self.out_of_memory(size)),
        };

        self.unlink(block);
        let size_found = self.block_size_at(block);
        let taken = if size_found - need >= MIN_BLOCK {
            self.set_tags(block, need, true);
            let rest = block + need;
            self.set_tags(rest, size_found - need, false);
            self.link(rest);
            need
        } else {
            self.set_tags(block, size_found, true);
            size_found
        };

        self.free_bytes -= taken;
        self.book.current += 1;
        self.book.total += 1;
        Ok(Handle((block + HEADER) as u32))
    }

    /// Release a block and merge it with free neighbours.
    /// Freeing a handle twice is reported as `InvalidHandle`.
    pub fn free(&mut self, handle: Handle) -> AllocResult<()> {
        let block = self.block_of(handle)?;
        let size = self.block_size_at(block);
        self.free_bytes += size;
        self.book.current -= 1;
        self.book.total += 1;

        let mut start = block;
        let mut merged = size;

        let next = block + size;
        if next < self.memory.len() && !self.is_used(next) {
            merged += self.block_size_at(next);
            self.unlink(next);
            self.clear_header(next);
        }

        if block > 0 {
            let (prev_size, prev_used) = self.tag_at(block - FOOTER);
            if !prev_used {
                let prev = block - prev_size;
                self.unlink(prev);
                self.clear_header(block);
                start = prev;
                merged += prev_size;
            }
        }

        self.set_tags(start, merged, false);
        self.link(start);
        Ok(())
    }

    /// Change the payload size of a block. Shrinks and growth into a free
    /// successor happen in place; otherwise the contents move to a new block
    /// and the returned handle differs from `handle`.
    pub fn resize(&mut self, handle: Handle, new_size: usize) -> AllocResult<Handle> {
        let block = self.block_of(handle)?;
        let current = self.block_size_at(block);
        let need = match block_size_for(new_size) {
            Some(need) if need <= self.memory.len() => need,
            _ => return Err(self.out_of_memory(new_size)),
        };

        if need <= current {
            if current - need >= MIN_BLOCK {
                self.set_tags(block, need, true);
                let rest = block + need;
                let mut rest_size = current - need;
                self.free_bytes += rest_size;
                let next = block + current;
                if next < self.memory.len() && !self.is_used(next) {
                    rest_size += self.block_size_at(next);
                    self.unlink(next);
                    self.clear_header(next);
                }
                self.set_tags(rest, rest_size, false);
                self.link(rest);
            }
            return Ok(handle);
        }

        let next = block + current;
        if next < self.memory.len() && !self.is_used(next) {
            let next_size = self.block_size_at(next);
            if current + next_size >= need {
                self.unlink(next);
                self.clear_header(next);
                let total = current + next_size;
                if total - need >= MIN_BLOCK {
                    self.set_tags(block, need, true);
                    self.set_tags(block + need, total - need, false);
                    self.link(block + need);
                    self.free_bytes -= need - current;
                } else {
                    self.set_tags(block, total, true);
                    self.free_bytes -= next_size;
                }
                return Ok(handle);
            }
        }

        let moved = self.allocate(new_size)?;
        let old_payload = current - HEADER - FOOTER;
        let from = handle.0 as usize;
        self.memory
            .copy_within(from..from + old_payload, moved.0 as usize);
        self.free(handle)?;
        Ok(moved)
    }

    /// Forget every allocation and turn the arena back into one free block.
    pub fn free_all(&mut self) {
        self.free_heads = [NIL; NUM_CLASSES];
        self.book.current = 0;
        let capacity = self.memory.len();
        self.free_bytes = capacity;
        if capacity >= MIN_BLOCK {
            self.set_tags(0, capacity, false);
            self.link(0);
        }
    }

    /// Payload bytes of a live block.
    pub fn bytes(&self, handle: Handle) -> &[u8] {
        let start = handle.0 as usize;
        let end = start - HEADER + self.block_size_at(start - HEADER) - FOOTER;
        &self.memory[start..end]
    }

    pub fn bytes_mut(&mut self, handle: Handle) -> &mut [u8] {
        let start = handle.0 as usize;
        let end = start - HEADER + self.block_size_at(start - HEADER) - FOOTER;
        &mut self.memory[start..end]
    }

    /// Full size of the block behind `handle`, boundary tags included.
    pub fn block_size(&self, handle: Handle) -> AllocResult<usize> {
        let block = self.block_of(handle)?;
        Ok(self.block_size_at(block))
    }

    /// Largest payload a single `allocate` call can currently satisfy.
    pub fn largest_allocatable(&self) -> usize {
        self.largest_free_block()
            .map(|size| size - HEADER - FOOTER)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> AllocStats {
        let mut free_blocks = 0;
        let mut largest_free = 0;
        for &head in &self.free_heads {
            let mut current = head;
            while current != NIL {
                free_blocks += 1;
                largest_free = largest_free.max(self.block_size_at(current as usize));
                current = self.next_link(current as usize);
            }
        }
        AllocStats {
            capacity: self.memory.len(),
            used_bytes: self.memory.len() - self.free_bytes,
            free_bytes: self.free_bytes,
            live_blocks: self.book.current,
            free_blocks,
            largest_free,
            total_operations: self.book.total,
        }
    }

    /// Walk the whole arena and its free lists, verifying every structural
    /// invariant. Intended for tests and debugging; O(arena blocks).
    pub fn check(&self) -> AllocResult<()> {
        let corrupt = |msg: String| Err(AllocError::Corrupt(msg));
        let len = self.memory.len();

        let mut offset = 0;
        let mut prev_free = false;
        let mut free_count = 0;
        let mut free_total = 0;
        let mut used_count = 0;
        while offset < len {
            let (size, used) = self.tag_at(offset);
            if self.read_u32(offset + 4) != MAGIC {
                return corrupt(format!("missing header at {}", offset));
            }
            if size < MIN_BLOCK || size % ALIGNMENT != 0 || offset + size > len {
                return corrupt(format!("bad block size {} at {}", size, offset));
            }
            if self.tag_at(offset + size - FOOTER) != (size, used) {
                return corrupt(format!("header/footer mismatch at {}", offset));
            }
            if used {
                used_count += 1;
                prev_free = false;
            } else {
                if prev_free {
                    return corrupt(format!("adjacent free blocks at {}", offset));
                }
                free_count += 1;
                free_total += size;
                prev_free = true;
            }
            offset += size;
        }

        if free_total != self.free_bytes {
            return corrupt(format!(
                "free byte count {} does not match arena ({})",
                self.free_bytes, free_total
            ));
        }
        if used_count != self.book.current {
            return corrupt(format!(
                "live block count {} does not match arena ({})",
                self.book.current, used_count
            ));
        }

        let mut listed = 0;
        for (class, &head) in self.free_heads.iter().enumerate() {
            let mut prev = NIL;
            let mut current = head;
            while current != NIL {
                let block = current as usize;
                listed += 1;
                if listed > free_count {
                    return corrupt("free lists hold more blocks than the arena".into());
                }
                let (size, used) = self.tag_at(block);
                if used {
                    return corrupt(format!("used block {} on a free list", block));
                }
                if class_of(size) != class {
                    return corrupt(format!("block {} filed under class {}", block, class));
                }
                if self.prev_link(block) != prev {
                    return corrupt(format!("broken back link at {}", block));
                }
                prev = current;
                current = self.next_link(block);
            }
        }
        if listed != free_count {
            return corrupt(format!(
                "{} free blocks in the arena but {} on free lists",
                free_count, listed
            ));
        }
        Ok(())
    }

    fn out_of_memory(&self, requested: usize) -> AllocError {
        let largest_free = self.largest_allocatable();
        debug!(
            "allocation of {} bytes failed ({} free, largest payload {})",
            requested, self.free_bytes, largest_free
        );
        AllocError::OutOfMemory {
            requested,
            largest_free,
        }
    }

    fn largest_free_block(&self) -> Option<usize> {
        // Only the highest non-empty class can hold the largest block.
        let head = self.free_heads.iter().rev().copied().find(|&h| h != NIL)?;
        let mut largest = 0;
        let mut current = head;
        while current != NIL {
            largest = largest.max(self.block_size_at(current as usize));
            current = self.next_link(current as usize);
        }
        Some(largest)
    }

    fn find_fit(&self, need: usize) -> Option<usize> {
        let class = class_of(need);
        let mut current = self.free_heads[class];
        while current != NIL {
            if self.block_size_at(current as usize) >= need {
                return Some(current as usize);
            }
            current = self.next_link(current as usize);
        }
        self.free_heads[class + 1..]
            .iter()
            .find(|&&head| head != NIL)
            .map(|&head| head as usize)
    }

    /// Validate a handle and return the offset of its block.
    fn block_of(&self, handle: Handle) -> AllocResult<usize> {
        let invalid = Err(AllocError::InvalidHandle(handle.0));
        let payload = handle.0 as usize;
        if payload < HEADER || (payload - HEADER) % ALIGNMENT != 0 {
            return invalid;
        }
        let block = payload - HEADER;
        if block + MIN_BLOCK > self.memory.len() || self.read_u32(block + 4) != MAGIC {
            return invalid;
        }
        let (size, used) = self.tag_at(block);
        if !used || size < MIN_BLOCK || block + size > self.memory.len() {
            return invalid;
        }
        if self.tag_at(block + size - FOOTER) != (size, true) {
            return invalid;
        }
        Ok(block)
    }

    fn link(&mut self, block: usize) {
        let class = class_of(self.block_size_at(block));
        let head = self.free_heads[class];
        self.set_next_link(block, head);
        self.set_prev_link(block, NIL);
        if head != NIL {
            self.set_prev_link(head as usize, block as u32);
        }
        self.free_heads[class] = block as u32;
    }

    fn unlink(&mut self, block: usize) {
        let class = class_of(self.block_size_at(block));
        let next = self.next_link(block);
        let prev = self.prev_link(block);
        if prev == NIL {
            self.free_heads[class] = next;
        } else {
            self.set_next_link(prev as usize, next);
        }
        if next != NIL {
            self.set_prev_link(next as usize, prev);
        }
    }

    fn set_tags(&mut self, block: usize, size: usize, used: bool) {
        let tag = size as u32 | if used { USED } else { 0 };
        self.write_u32(block, tag);
        self.write_u32(block + 4, MAGIC);
        self.write_u32(block + size - FOOTER, tag);
        self.write_u32(block + size - FOOTER + 4, MAGIC);
    }

    /// Erase the header of a block swallowed by a merge so stale handles to it
    /// no longer validate.
    fn clear_header(&mut self, block: usize) {
        self.write_u32(block, 0);
        self.write_u32(block + 4, 0);
    }

    fn tag_at(&self, offset: usize) -> (usize, bool) {
        let tag = self.read_u32(offset);
        ((tag & !(ALIGNMENT as u32 - 1)) as usize, tag & USED != 0)
    }

    fn block_size_at(&self, block: usize) -> usize {
        self.tag_at(block).0
    }

    fn is_used(&self, block: usize) -> bool {
        self.tag_at(block).1
    }

    fn next_link(&self, block: usize) -> u32 {
        self.read_u32(block + HEADER)
    }

    fn prev_link(&self, block: usize) -> u32 {
        self.read_u32(block + HEADER + 4)
    }

    fn set_next_link(&mut self, block: usize, next: u32) {
        self.write_u32(block + HEADER, next);
    }

    fn set_prev_link(&mut self, block: usize, prev: u32) {
        self.write_u32(block + HEADER + 4, prev);
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0; 4];
        raw.copy_from_slice(&self.memory[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.memory[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Total block size needed for a payload of `size` bytes.
fn block_size_for(size: usize) -> Option<usize> {
    let raw = size.checked_add(HEADER + FOOTER + ALIGNMENT - 1)?;
    let aligned = (raw & !(ALIGNMENT - 1)).max(MIN_BLOCK);
    if aligned > u32::MAX as usize {
        None
    } else {
        Some(aligned)
    }
}

/// Class `k` holds blocks of size `[2^(k+5), 2^(k+6))`; the last class is open ended.
fn class_of(size: usize) -> usize {
    let log2 = (usize::BITS - 1 - size.leading_zeros()) as usize;
    (log2 - 5).min(NUM_CLASSES - 1)
}
