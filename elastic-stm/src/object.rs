use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::codec::{self, FieldType, Kind, Value};
use crate::result::StmClosureResult;
use crate::transaction::TxContext;

/// Identity of one mutable field: the address of its object plus the field
/// offset inside it.
///
/// Only used for hashing and comparison, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId {
    object: usize,
    offset: usize,
}

impl LocationId {
    pub fn new(object: usize, offset: usize) -> LocationId {
        LocationId { object, offset }
    }

    pub fn object(self) -> usize {
        self.object
    }

    pub fn offset(self) -> usize {
        self.offset
    }
}

/// A shared object made of a fixed number of word-sized transactional fields.
///
/// Objects are always handled through an `Arc`, whose allocation provides the
/// stable identity used by the lock table.
pub struct TObject {
    fields: Box<[AtomicU64]>,
}

impl TObject {
    /// Object with `len` fields, all zero.
    pub fn new(len: usize) -> Arc<TObject> {
        Arc::new(TObject {
            fields: (0..len).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    /// Object whose fields start with the given values.
    pub fn with_values(values: &[Value]) -> Arc<TObject> {
        Arc::new(TObject {
            fields: values.iter().map(|v| AtomicU64::new(v.encode())).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn address(&self) -> usize {
        std::ptr::from_ref::<TObject>(self) as usize
    }

    /// Identity of field `offset`.
    pub fn location(&self, offset: usize) -> LocationId {
        LocationId::new(self.address(), offset)
    }

    /// Raw word of field `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is out of bounds.
    pub(crate) fn word(&self, offset: usize) -> &AtomicU64 {
        &self.fields[offset]
    }

    /// Read a field without starting a transaction.
    ///
    /// The value is the last committed one, but two such reads are not
    /// guaranteed to be mutually consistent.
    pub fn read_atomic(&self, offset: usize, kind: Kind) -> Value {
        codec::read(self.word(offset), kind)
    }

    /// Typed handle on field `offset`.
    pub fn field<T: FieldType>(self: &Arc<Self>, offset: usize) -> TField<T> {
        assert!(offset < self.len(), "field {offset} out of bounds for object of {} fields", self.len());
        TField {
            object: self.clone(),
            offset,
            _marker: PhantomData,
        }
    }
}

impl Debug for TObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("TObject")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Typed handle on a single field of a [`TObject`].
pub struct TField<T> {
    object: Arc<TObject>,
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for TField<T> {
    fn clone(&self) -> Self {
        TField {
            object: self.object.clone(),
            offset: self.offset,
            _marker: PhantomData,
        }
    }
}

impl<T: FieldType> TField<T> {
    pub fn object(&self) -> &Arc<TObject> {
        &self.object
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn location(&self) -> LocationId {
        self.object.location(self.offset)
    }

    /// Last committed value, read outside of any transaction.
    pub fn read_atomic(&self) -> T {
        T::from_value(self.object.read_atomic(self.offset, T::KIND))
    }

    /// The normal way to access a field.
    ///
    /// It is equivalent to `transaction.read(&field)`.
    pub fn read(&self, transaction: &mut TxContext) -> StmClosureResult<T> {
        transaction.read(self)
    }

    /// The normal way to write a field.
    ///
    /// It is equivalent to `transaction.write(&field, value)`.
    pub fn write(&self, transaction: &mut TxContext, value: T) -> StmClosureResult<()> {
        transaction.write(self, value)
    }

    /// Modify the content of the field with the function `f`.
    pub fn modify<F>(&self, transaction: &mut TxContext, f: F) -> StmClosureResult<()>
    where
        F: FnOnce(T) -> T,
    {
        let old = self.read(transaction)?;
        self.write(transaction, f(old))
    }

    /// Replace the value of the field, returning the old one.
    pub fn replace(&self, transaction: &mut TxContext, value: T) -> StmClosureResult<T> {
        let old = self.read(transaction)?;
        self.write(transaction, value)?;
        Ok(old)
    }

    /// Check if two handles refer to the same field.
    pub fn ref_eq(this: &TField<T>, other: &TField<T>) -> bool {
        Arc::ptr_eq(&this.object, &other.object) && this.offset == other.offset
    }
}

impl<T> Debug for TField<T>
where
    T: FieldType + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("TField")
            .field("offset", &self.offset)
            .field("value", &self.read_atomic())
            .finish()
    }
}

/// A standalone transactional variable: a one-field object.
#[derive(Clone)]
pub struct TVar<T> {
    field: TField<T>,
}

impl<T: FieldType> TVar<T> {
    /// Create a new `TVar`.
    pub fn new(val: T) -> TVar<T> {
        TVar {
            field: TObject::with_values(&[val.into_value()]).field(0),
        }
    }

    /// `read_atomic` reads a value atomically, without starting a transaction.
    ///
    /// ```
    /// # use elastic_stm::*;
    /// let var = TVar::new(21_i64);
    /// assert_eq!(var.read_atomic(), 21);
    /// ```
    pub fn read_atomic(&self) -> T {
        self.field.read_atomic()
    }

    pub fn read(&self, transaction: &mut TxContext) -> StmClosureResult<T> {
        self.field.read(transaction)
    }

    pub fn write(&self, transaction: &mut TxContext, value: T) -> StmClosureResult<()> {
        self.field.write(transaction, value)
    }

    /// Modify the content of a `TVar` with the function f.
    ///
    /// ```
    /// # use elastic_stm::*;
    /// let stm = Stm::default();
    /// let mut tx = stm.context();
    /// let var = TVar::new(21_i64);
    /// tx.atomically(0, "", |tx| var.modify(tx, |x| x * 2)).unwrap();
    ///
    /// assert_eq!(var.read_atomic(), 42);
    /// ```
    pub fn modify<F>(&self, transaction: &mut TxContext, f: F) -> StmClosureResult<()>
    where
        F: FnOnce(T) -> T,
    {
        self.field.modify(transaction, f)
    }

    pub fn replace(&self, transaction: &mut TxContext, value: T) -> StmClosureResult<T> {
        self.field.replace(transaction, value)
    }

    /// Check if two `TVar`s refer to the same position.
    pub fn ref_eq(this: &TVar<T>, other: &TVar<T>) -> bool {
        TField::ref_eq(&this.field, &other.field)
    }

    /// The underlying field handle.
    pub fn as_field(&self) -> &TField<T> {
        &self.field
    }
}

impl<T> Debug for TVar<T>
where
    T: FieldType + Debug,
{
    #[inline(never)]
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let x = self.read_atomic();
        f.debug_struct("TVar").field("value", &x).finish()
    }
}
