use log::debug;

use crate::allocator::{AllocStats, Allocator, Handle};
use crate::error::{YalError, YalResult};
use crate::value::{ClosureId, FrameId, PairId, StrId, SymbolId, Value, SLOT_SIZE};

/// Position of a region on the region stack. Region 0 is persistent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub u32);

pub const PERSISTENT: RegionId = RegionId(0);

// Every block starts with the id of the region that owns it.
const REGION_OFFSET: usize = 0;
const PAIR_CAR: usize = 16;
const PAIR_CDR: usize = 32;
const PAIR_SIZE: usize = 48;
const STR_LEN: usize = 4;
const STR_DATA: usize = 8;
const CLOSURE_FRAME: usize = 4;
const CLOSURE_NAME: usize = 8;
const CLOSURE_PARAMS: usize = 16;
const CLOSURE_BODY: usize = 32;
const CLOSURE_SIZE: usize = 48;
const NO_NAME: u32 = u32::MAX;

/// A closure as stored in the heap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Closure {
    pub params: Value,
    /// List of body expressions.
    pub body: Value,
    pub env: FrameId,
    pub name: Option<SymbolId>,
}

/// What happened to a region when it was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionExit {
    /// Nothing escaped; every block was freed.
    Released { blocks: usize },
    /// Something escaped; the blocks now belong to the parent region.
    Merged { blocks: usize },
}

struct Region {
    blocks: Vec<Handle>,
    escaped: bool,
}

impl Region {
    fn new() -> Self {
        Region {
            blocks: Vec::new(),
            escaped: false,
        }
    }
}

/// Owner of every heap-resident value. Pairs, strings and closures are
/// allocator blocks; each block is recorded in the region that was current
/// when it was allocated.
pub struct Heap {
    alloc: Allocator,
    regions: Vec<Region>,
}

impl Heap {
    pub fn new(arena_size: usize) -> Self {
        Heap {
            alloc: Allocator::new(arena_size),
            regions: vec![Region::new()],
        }
    }

    // === Regions ===

    pub fn current_region(&self) -> RegionId {
        RegionId(self.regions.len() as u32 - 1)
    }

    /// Open a new innermost region.
    pub fn enter_region(&mut self) -> RegionId {
        self.regions.push(Region::new());
        self.current_region()
    }

    /// Close the innermost region: free its blocks in bulk, or hand them to
    /// the parent region if anything escaped.
    pub fn leave_region(&mut self) -> YalResult<RegionExit> {
        if self.regions.len() == 1 {
            return Err(YalError::Internal("cannot leave the persistent region".into()));
        }
        let region = self.regions.pop().ok_or_else(|| {
            YalError::Internal("region stack is empty".into())
        })?;
        let blocks = region.blocks.len();

        if region.escaped {
            let parent = self.current_region();
            for &handle in &region.blocks {
                self.write_u32(handle, REGION_OFFSET, parent.0);
            }
            let last = self.regions.len() - 1;
            self.regions[last].blocks.extend(region.blocks);
            debug!("region {} escaped, merged {} blocks into {}", parent.0 + 1, blocks, parent.0);
            Ok(RegionExit::Merged { blocks })
        } else {
            for handle in region.blocks {
                self.alloc.free(handle)?;
            }
            debug!("region {} released {} blocks", self.regions.len(), blocks);
            Ok(RegionExit::Released { blocks })
        }
    }

    /// Record that `val` was stored into a structure owned by `target`.
    /// If `val` points into the heap, every region newer than `target` may
    /// now be referenced from it and must survive until `target` is closed.
    pub fn note_store(&mut self, target: RegionId, val: Value) {
        if !val.is_heap_ref() {
            return;
        }
        let start = target.0 as usize + 1;
        for region in self.regions.iter_mut().skip(start) {
            region.escaped = true;
        }
    }

    pub fn region_escaped(&self, region: RegionId) -> bool {
        self.regions
            .get(region.0 as usize)
            .map(|r| r.escaped)
            .unwrap_or(false)
    }

    /// Number of blocks owned by a region.
    pub fn region_blocks(&self, region: RegionId) -> usize {
        self.regions
            .get(region.0 as usize)
            .map(|r| r.blocks.len())
            .unwrap_or(0)
    }

    fn alloc_block(&mut self, size: usize) -> YalResult<Handle> {
        let handle = self.alloc.allocate(size)?;
        let region = self.current_region();
        self.write_u32(handle, REGION_OFFSET, region.0);
        let last = self.regions.len() - 1;
        self.regions[last].blocks.push(handle);
        Ok(handle)
    }

    fn region_of(&self, handle: Handle) -> RegionId {
        RegionId(self.read_u32(handle, REGION_OFFSET))
    }

    // === Pairs ===

    /// Allocate a new cons cell.
    pub fn cons(&mut self, car: Value, cdr: Value) -> YalResult<PairId> {
        let handle = self.alloc_block(PAIR_SIZE)?;
        self.write_value(handle, PAIR_CAR, car);
        self.write_value(handle, PAIR_CDR, cdr);
        Ok(PairId(handle))
    }

    #[inline]
    pub fn car(&self, id: PairId) -> Value {
        self.read_value(id.0, PAIR_CAR)
    }

    #[inline]
    pub fn cdr(&self, id: PairId) -> Value {
        self.read_value(id.0, PAIR_CDR)
    }

    /// Mutate the car of a pair (set-car!).
    pub fn set_car(&mut self, id: PairId, val: Value) {
        self.note_store(self.region_of(id.0), val);
        self.write_value(id.0, PAIR_CAR, val);
    }

    /// Mutate the cdr of a pair (set-cdr!).
    pub fn set_cdr(&mut self, id: PairId, val: Value) {
        self.note_store(self.region_of(id.0), val);
        self.write_value(id.0, PAIR_CDR, val);
    }

    pub fn pair_region(&self, id: PairId) -> RegionId {
        self.region_of(id.0)
    }

    /// Car of a pair, or nil for nil.
    pub fn car_val(&self, val: Value) -> YalResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.car(id)),
            other => Err(YalError::Type(format!("car of {}", other.type_name()))),
        }
    }

    /// Cdr of a pair, or nil for nil.
    pub fn cdr_val(&self, val: Value) -> YalResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.cdr(id)),
            other => Err(YalError::Type(format!("cdr of {}", other.type_name()))),
        }
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> YalResult<Value> {
        self.list_with_tail(values, Value::Nil)
    }

    /// Build a list from `values` ending in `tail` instead of nil.
    pub fn list_with_tail(&mut self, values: &[Value], tail: Value) -> YalResult<Value> {
        let mut result = tail;
        for &val in values.iter().rev() {
            result = Value::Pair(self.cons(val, result)?);
        }
        Ok(result)
    }

    pub fn is_proper_list(&self, val: Value) -> bool {
        let mut current = val;
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(id) => current = self.cdr(id),
                _ => return false,
            }
        }
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, val: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    // === Strings ===

    pub fn alloc_string(&mut self, text: &str) -> YalResult<StrId> {
        let handle = self.alloc_block(STR_DATA + text.len())?;
        self.write_u32(handle, STR_LEN, text.len() as u32);
        self.alloc.bytes_mut(handle)[STR_DATA..STR_DATA + text.len()]
            .copy_from_slice(text.as_bytes());
        Ok(StrId(handle))
    }

    pub fn string(&self, id: StrId) -> &str {
        let len = self.read_u32(id.0, STR_LEN) as usize;
        let bytes = &self.alloc.bytes(id.0)[STR_DATA..STR_DATA + len];
        // Only ever written from a &str.
        std::str::from_utf8(bytes).unwrap_or_default()
    }

    // === Closures ===

    pub fn alloc_closure(&mut self, closure: Closure) -> YalResult<ClosureId> {
        let handle = self.alloc_block(CLOSURE_SIZE)?;
        self.write_u32(handle, CLOSURE_FRAME, closure.env.0);
        self.write_u32(handle, CLOSURE_NAME, closure.name.map_or(NO_NAME, |s| s.0));
        self.write_value(handle, CLOSURE_PARAMS, closure.params);
        self.write_value(handle, CLOSURE_BODY, closure.body);
        Ok(ClosureId(handle))
    }

    pub fn closure(&self, id: ClosureId) -> Closure {
        let name = self.read_u32(id.0, CLOSURE_NAME);
        Closure {
            params: self.read_value(id.0, CLOSURE_PARAMS),
            body: self.read_value(id.0, CLOSURE_BODY),
            env: FrameId(self.read_u32(id.0, CLOSURE_FRAME)),
            name: if name == NO_NAME { None } else { Some(SymbolId(name)) },
        }
    }

    /// Give an anonymous closure the name it was first defined under.
    pub fn name_closure(&mut self, id: ClosureId, name: SymbolId) {
        if self.read_u32(id.0, CLOSURE_NAME) == NO_NAME {
            self.write_u32(id.0, CLOSURE_NAME, name.0);
        }
    }

    // === Accounting ===

    pub fn stats(&self) -> AllocStats {
        self.alloc.stats()
    }

    pub fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    fn read_value(&self, handle: Handle, offset: usize) -> Value {
        Value::decode(&self.alloc.bytes(handle)[offset..offset + SLOT_SIZE])
    }

    fn write_value(&mut self, handle: Handle, offset: usize, val: Value) {
        self.alloc.bytes_mut(handle)[offset..offset + SLOT_SIZE].copy_from_slice(&val.encode());
    }

    fn read_u32(&self, handle: Handle, offset: usize) -> u32 {
        let mut raw = [0; 4];
        raw.copy_from_slice(&self.alloc.bytes(handle)[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    fn write_u32(&mut self, handle: Handle, offset: usize, val: u32) {
        self.alloc.bytes_mut(handle)[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }
}
