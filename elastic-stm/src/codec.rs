//! Typed access to a single memory word.
//!
//! Every transactional field is stored as one `AtomicU64`. The codec is the
//! only place that loads or stores those words; everything above it works on
//! [`Value`]s tagged with a [`Kind`].

use std::sync::atomic::{AtomicU64, Ordering};

/// The closed set of semantic kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Opaque reference word, see [`ObjRef`].
    Ref,
}

/// Opaque reference stored in a field.
///
/// The runtime never dereferences it. Clients use it as an index into their
/// own arena of objects, or as a tagged pointer they manage themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjRef(pub u64);

impl ObjRef {
    pub const NULL: ObjRef = ObjRef(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A value read from or destined to a field, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Ref(ObjRef),
}

impl Value {
    /// Kind tag of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::Char(_) => Kind::Char,
            Value::I8(_) => Kind::I8,
            Value::I16(_) => Kind::I16,
            Value::I32(_) => Kind::I32,
            Value::I64(_) => Kind::I64,
            Value::U8(_) => Kind::U8,
            Value::U16(_) => Kind::U16,
            Value::U32(_) => Kind::U32,
            Value::U64(_) => Kind::U64,
            Value::F32(_) => Kind::F32,
            Value::F64(_) => Kind::F64,
            Value::Ref(_) => Kind::Ref,
        }
    }

    /// Zero value of a kind. Fresh fields hold this.
    pub fn zero(kind: Kind) -> Value {
        Value::decode(0, kind)
    }

    /// The same raw word seen as another kind.
    pub fn reinterpret(self, kind: Kind) -> Value {
        if self.kind() == kind {
            self
        } else {
            Value::decode(self.encode(), kind)
        }
    }

    /// Raw word representation.
    pub fn encode(self) -> u64 {
        match self {
            Value::Bool(b) => u64::from(b),
            Value::Char(c) => u64::from(u32::from(c)),
            Value::I8(x) => x as u8 as u64,
            Value::I16(x) => x as u16 as u64,
            Value::I32(x) => x as u32 as u64,
            Value::I64(x) => x as u64,
            Value::U8(x) => u64::from(x),
            Value::U16(x) => u64::from(x),
            Value::U32(x) => u64::from(x),
            Value::U64(x) => x,
            Value::F32(x) => u64::from(x.to_bits()),
            Value::F64(x) => x.to_bits(),
            Value::Ref(r) => r.0,
        }
    }

    /// Interpret a raw word as `kind`.
    ///
    /// Words that are not valid for the kind (e.g. a surrogate code point for
    /// `Char`) decode to the kind's replacement value rather than panicking:
    /// a transaction may observe garbage before it is invalidated.
    pub fn decode(word: u64, kind: Kind) -> Value {
        match kind {
            Kind::Bool => Value::Bool(word != 0),
            Kind::Char => Value::Char(char::from_u32(word as u32).unwrap_or('\u{FFFD}')),
            Kind::I8 => Value::I8(word as u8 as i8),
            Kind::I16 => Value::I16(word as u16 as i16),
            Kind::I32 => Value::I32(word as u32 as i32),
            Kind::I64 => Value::I64(word as i64),
            Kind::U8 => Value::U8(word as u8),
            Kind::U16 => Value::U16(word as u16),
            Kind::U32 => Value::U32(word as u32),
            Kind::U64 => Value::U64(word),
            Kind::F32 => Value::F32(f32::from_bits(word as u32)),
            Kind::F64 => Value::F64(f64::from_bits(word)),
            Kind::Ref => Value::Ref(ObjRef(word)),
        }
    }
}

/// Rust types that can live in a transactional field.
pub trait FieldType: Copy + Send + Sync + 'static {
    const KIND: Kind;

    fn into_value(self) -> Value;

    /// Convert back from a value. A value of another kind is reinterpreted
    /// through its raw word.
    fn from_value(value: Value) -> Self;
}

macro_rules! field_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                const KIND: Kind = Kind::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Self {
                    match value.reinterpret(Kind::$variant) {
                        Value::$variant(x) => x,
                        _ => unreachable!("reinterpret returns the requested kind"),
                    }
                }
            }
        )*
    };
}

field_type! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    ObjRef => Ref,
}

/// Load a field word and decode it.
#[inline]
pub fn read(word: &AtomicU64, kind: Kind) -> Value {
    Value::decode(word.load(Ordering::Acquire), kind)
}

/// Encode a value and store it into a field word.
///
/// Callers must hold the lock covering the word.
#[inline]
pub fn write(word: &AtomicU64, value: Value) {
    word.store(value.encode(), Ordering::Release);
}
