use std::fmt;

use crate::allocator::Handle;
use crate::primitives::Primitive;

/// Unique identifier for an interned symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Handle to a cons cell block in the heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairId(pub(crate) Handle);

/// Handle to an immutable string block in the heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub(crate) Handle);

/// Handle to a closure block in the heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureId(pub(crate) Handle);

/// Index of an environment frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// Size of an encoded value inside a heap block.
pub const SLOT_SIZE: usize = 16;

/// A yal value. Copy semantics: pairs, strings and closures live in the heap
/// and are referred to by handle.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Symbol(SymbolId),
    Str(StrId),
    Pair(PairId),
    Closure(ClosureId),
    Primitive(Primitive),
}

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_REAL: u8 = 3;
const TAG_SYMBOL: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_PAIR: u8 = 6;
const TAG_CLOSURE: u8 = 7;
const TAG_PRIMITIVE: u8 = 8;

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Value::Pair(_))
    }

    /// Only `#f` and `nil` are false.
    pub fn is_truthy(self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_procedure(self) -> bool {
        matches!(self, Value::Closure(_) | Value::Primitive(_))
    }

    /// True for values that point at an arena block.
    pub fn is_heap_ref(self) -> bool {
        matches!(self, Value::Pair(_) | Value::Str(_) | Value::Closure(_))
    }

    pub fn as_symbol(self) -> Option<SymbolId> {
        match self {
            Value::Symbol(id) => Some(id),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Symbol(_) => "symbol",
            Value::Str(_) => "string",
            Value::Pair(_) => "pair",
            Value::Closure(_) => "closure",
            Value::Primitive(_) => "primitive",
        }
    }

    /// Encode into a heap slot: tag byte at 0, payload little-endian at 8.
    pub fn encode(self) -> [u8; SLOT_SIZE] {
        let (tag, payload): (u8, u64) = match self {
            Value::Nil => (TAG_NIL, 0),
            Value::Bool(b) => (TAG_BOOL, b as u64),
            Value::Int(n) => (TAG_INT, n as u64),
            Value::Real(x) => (TAG_REAL, x.to_bits()),
            Value::Symbol(id) => (TAG_SYMBOL, id.0 as u64),
            Value::Str(id) => (TAG_STR, id.0.offset() as u64),
            Value::Pair(id) => (TAG_PAIR, id.0.offset() as u64),
            Value::Closure(id) => (TAG_CLOSURE, id.0.offset() as u64),
            Value::Primitive(p) => (TAG_PRIMITIVE, p.code() as u64),
        };
        let mut slot = [0; SLOT_SIZE];
        slot[0] = tag;
        slot[8..].copy_from_slice(&payload.to_le_bytes());
        slot
    }

    /// Inverse of `encode`. Slots are only ever written by `encode`, so an
    /// unknown tag decodes as `Nil`.
    pub fn decode(slot: &[u8]) -> Value {
        let mut raw = [0; 8];
        raw.copy_from_slice(&slot[8..SLOT_SIZE]);
        let payload = u64::from_le_bytes(raw);
        let handle = || Handle::from_offset(payload as u32);
        match slot[0] {
            TAG_BOOL => Value::Bool(payload != 0),
            TAG_INT => Value::Int(payload as i64),
            TAG_REAL => Value::Real(f64::from_bits(payload)),
            TAG_SYMBOL => Value::Symbol(SymbolId(payload as u32)),
            TAG_STR => Value::Str(StrId(handle())),
            TAG_PAIR => Value::Pair(PairId(handle())),
            TAG_CLOSURE => Value::Closure(ClosureId(handle())),
            TAG_PRIMITIVE => Primitive::from_code(payload as u8)
                .map(Value::Primitive)
                .unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Real(x) => write!(f, "Real({})", x),
            Value::Symbol(id) => write!(f, "Sym({})", id.0),
            Value::Str(id) => write!(f, "Str({})", id.0.offset()),
            Value::Pair(id) => write!(f, "Pair({})", id.0.offset()),
            Value::Closure(id) => write!(f, "Closure({})", id.0.offset()),
            Value::Primitive(p) => write!(f, "Primitive({})", p.name()),
        }
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairId({})", self.0.offset())
    }
}

impl fmt::Debug for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrId({})", self.0.offset())
    }
}

impl fmt::Debug for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClosureId({})", self.0.offset())
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}
