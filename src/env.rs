//! Chained environment frames.
//!
//! Frames live in an arena indexed by `FrameId`; a frame refers to its
//! parent by id and never owns it. Each frame belongs to the heap region
//! that was current when it was created and is released or merged together
//! with that region.

use std::collections::HashMap;

use crate::heap::{Heap, RegionId, PERSISTENT};
use crate::value::{FrameId, SymbolId, Value};

pub struct Frame {
    bindings: HashMap<SymbolId, Value>,
    parent: Option<FrameId>,
    region: RegionId,
}

pub struct Environments {
    frames: Vec<Option<Frame>>,
    free: Vec<FrameId>,
    /// Frames owned by each region, indexed by region id.
    by_region: Vec<Vec<FrameId>>,
}

const GLOBAL: FrameId = FrameId(0);

impl Environments {
    pub fn new() -> Self {
        let global = Frame {
            bindings: HashMap::new(),
            parent: None,
            region: PERSISTENT,
        };
        Environments {
            frames: vec![Some(global)],
            free: Vec::new(),
            by_region: vec![vec![GLOBAL]],
        }
    }

    pub fn global(&self) -> FrameId {
        GLOBAL
    }

    /// Create a frame whose parent is `parent`, owned by the heap's current region.
    pub fn extend(
        &mut self,
        heap: &Heap,
        parent: FrameId,
        bindings: impl IntoIterator<Item = (SymbolId, Value)>,
    ) -> FrameId {
        let region = heap.current_region();
        let frame = Frame {
            bindings: bindings.into_iter().collect(),
            parent: Some(parent),
            region,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.frames[id.0 as usize] = Some(frame);
                id
            }
            None => {
                self.frames.push(Some(frame));
                FrameId(self.frames.len() as u32 - 1)
            }
        };
        let slot = region.0 as usize;
        if self.by_region.len() <= slot {
            self.by_region.resize_with(slot + 1, Vec::new);
        }
        self.by_region[slot].push(id);
        id
    }

    fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Bind `name` in `frame` itself, overwriting any existing binding there.
    pub fn define(&mut self, heap: &mut Heap, frame: FrameId, name: SymbolId, value: Value) {
        if let Some(f) = self.frame_mut(frame) {
            heap.note_store(f.region, value);
            f.bindings.insert(name, value);
        }
    }

    /// Walk the chain innermost-to-outermost and return the first binding.
    pub fn lookup(&self, frame: FrameId, name: SymbolId) -> Option<Value> {
        let mut current = self.frame(frame);
        while let Some(f) = current {
            if let Some(&val) = f.bindings.get(&name) {
                return Some(val);
            }
            current = f.parent.and_then(|p| self.frame(p));
        }
        None
    }

    /// Overwrite the nearest existing binding of `name`. Returns false if unbound.
    pub fn set(&mut self, heap: &mut Heap, frame: FrameId, name: SymbolId, value: Value) -> bool {
        let mut current = Some(frame);
        while let Some(id) = current {
            let f = match self.frame_mut(id) {
                Some(f) => f,
                None => return false,
            };
            if let Some(slot) = f.bindings.get_mut(&name) {
                *slot = value;
                heap.note_store(f.region, value);
                return true;
            }
            current = f.parent;
        }
        false
    }

    /// Drop every frame created in `region`.
    pub fn release_region(&mut self, region: RegionId) {
        if let Some(ids) = self.by_region.get_mut(region.0 as usize) {
            for id in std::mem::take(ids) {
                self.frames[id.0 as usize] = None;
                self.free.push(id);
            }
        }
    }

    /// Hand every frame created in `region` to `parent`.
    pub fn merge_region(&mut self, region: RegionId, parent: RegionId) {
        let ids = match self.by_region.get_mut(region.0 as usize) {
            Some(ids) => std::mem::take(ids),
            None => return,
        };
        for &id in &ids {
            if let Some(f) = self.frame_mut(id) {
                f.region = parent;
            }
        }
        self.by_region[parent.0 as usize].extend(ids);
    }

    pub fn live_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }
}

impl Default for Environments {
    fn default() -> Self {
        Self::new()
    }
}
