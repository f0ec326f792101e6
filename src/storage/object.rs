//! Stored Objects
//!
//! An [`Object`] is a value cell owned by exactly one store. It carries an
//! opaque payload, a type tag and the packed access field described in
//! [`clock`](super::clock).
//!
//! Each object gets a stable [`ObjectId`] when it is created. The expiry
//! table is keyed by that handle, never by the object's address, and objects
//! are deliberately not `Clone` so two live objects can never share one.

use super::clock::{self, incr_lfu_counter};
use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle identifying one object for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Type tag of a stored object.
///
/// The discriminants are part of the on-disk format of external collaborators
/// (dump/restore, AOF), so gaps are kept.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    String = 0,
    Json = 3,
    ByteArray = 4,
    Int = 5,
    Set = 6,
    SsMap = 7,
    SortedSet = 8,
    CountMinSketch = 9,
    BloomFilter = 10,
    Dequeue = 11,
    Hll = 12,
    Float = 13,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::Json => "json",
            ObjectType::ByteArray => "bytes",
            ObjectType::Int => "int",
            ObjectType::Set => "set",
            ObjectType::SsMap => "ssmap",
            ObjectType::SortedSet => "sortedset",
            ObjectType::CountMinSketch => "countminsketch",
            ObjectType::BloomFilter => "bf",
            ObjectType::Dequeue => "dequeue",
            ObjectType::Hll => "hll",
            ObjectType::Float => "float",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of an object.
///
/// Auxiliary data structures (sorted sets, bloom filters, queues) live behind
/// `Opaque`; the storage engine never looks inside them.
#[derive(Clone)]
pub enum Value {
    Bytes(Bytes),
    Int(i64),
    Float(f64),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Returns the payload as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Downcasts an opaque payload to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(Bytes::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// A value cell stored under one key.
#[derive(Debug)]
pub struct Object {
    id: ObjectId,
    object_type: ObjectType,
    /// Packed LFU counter (high 8 bits) and LRU clock (low 24 bits)
    last_accessed_at: u32,
    value: Value,
}

impl Object {
    /// Creates a new object with a fresh handle and a zeroed access field.
    pub fn new(value: impl Into<Value>, object_type: ObjectType) -> Self {
        Self {
            id: ObjectId::next(),
            object_type,
            last_accessed_at: 0,
            value: value.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Replaces the payload and type tag, keeping the handle and access field.
    pub fn set_value(&mut self, value: impl Into<Value>, object_type: ObjectType) {
        self.value = value.into();
        self.object_type = object_type;
    }

    /// The packed access field.
    #[inline]
    pub fn last_accessed_at(&self) -> u32 {
        self.last_accessed_at
    }

    pub fn set_last_accessed_at(&mut self, access: u32) {
        self.last_accessed_at = access;
    }

    #[inline]
    pub fn lfu_counter(&self) -> u8 {
        clock::lfu_counter(self.last_accessed_at)
    }

    /// Records an access at `now_clock`.
    ///
    /// The clock bits are replaced and the LFU counter is bumped with the
    /// logarithmic probability controlled by `log_factor`.
    pub fn touch(&mut self, now_clock: u32, log_factor: u32) {
        let counter = incr_lfu_counter(self.lfu_counter(), log_factor, &mut rand::thread_rng());
        self.last_accessed_at = clock::pack_access(now_clock, counter);
    }
}
