//! The element envelope that flows through the chain, and the type-erasure machinery that lets
//! operators of different concrete element types sit in the same chain.
//!
//! Operators are wired together from a [`crate::config::StreamConfig`] tree, not from a single
//! monomorphic call graph, so the element type each operator exchanges with its neighbors can't
//! stay generic all the way down: past its own signature it survives only as a runtime type
//! token. [`ErasedValue`] is that token; [`StreamRecord::erase`] / [`StreamRecord::downcast`] are
//! the only two places the boundary is crossed.

use std::any::Any;
use std::fmt;

/// Event-time timestamp. `i64::MIN` is reserved as "no timestamp/watermark observed yet".
pub type Timestamp = i64;

/// Sentinel used by watermark gauges before any watermark has been observed.
pub const NO_WATERMARK: Timestamp = i64::MIN;

/// An envelope pairing a value of element type `T` with an optional event timestamp.
#[derive(Clone)]
pub struct StreamRecord<T> {
    value: T,
    timestamp: Option<Timestamp>,
}

impl<T> StreamRecord<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    pub fn with_timestamp(value: T, timestamp: Timestamp) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// A shallow copy: same value (cloned reference-for-reference when `T` is cheap to clone,
    /// e.g. an `Rc`/`Box`), new envelope. Used by the broadcasting/directed outputs to hand every
    /// recipient but the last its own envelope without touching the underlying value.
    pub fn shallow_copy(&self) -> Self
    where
        T: Clone,
    {
        Self {
            value: self.value.clone(),
            timestamp: self.timestamp,
        }
    }

    /// A deep copy: the value is round-tripped through `serializer`, producing a genuinely
    /// distinct instance. Used by the copying output variants when object reuse is disabled.
    pub fn deep_copy(&self, serializer: &dyn TypeSerializer<T>) -> Self {
        Self {
            value: serializer.copy(&self.value),
            timestamp: self.timestamp,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StreamRecord<U> {
        StreamRecord {
            value: f(self.value),
            timestamp: self.timestamp,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StreamRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRecord")
            .field("value", &self.value)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Produces an independent copy of a value, the way a (de)serialization round-trip would.
///
/// Implementations are not required to actually serialize; a `Clone`-backed implementation is
/// sufficient for a type serializer whose wire format is irrelevant to the chain, as long as the
/// copy it returns is not reference-identical to the input when that matters to the caller.
pub trait TypeSerializer<T>: Send + Sync {
    fn copy(&self, value: &T) -> T;
}

/// A `TypeSerializer` built directly from `Clone`. Adequate whenever cloning already produces an
/// independent instance (owned data, no interior `Rc`/`Arc` sharing the caller cares about).
#[derive(Debug, Default, Clone, Copy)]
pub struct CloneSerializer;

impl<T: Clone> TypeSerializer<T> for CloneSerializer {
    fn copy(&self, value: &T) -> T {
        value.clone()
    }
}

/// A `TypeSerializer` that round-trips through `bincode`, matching the wire format the rest of
/// the engine uses for inter-task records.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSerializer;

impl<T> TypeSerializer<T> for BincodeSerializer
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn copy(&self, value: &T) -> T {
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(value, config)
            .expect("value must be serializable by its declared type serializer");
        let (copy, _) = bincode::serde::decode_from_slice(&bytes, config)
            .expect("serialized value must deserialize back to the same type");
        copy
    }
}

/// The erased carrier every value takes once it crosses into the chain's output-sink layer.
pub type ErasedValue = Box<dyn Any + Send>;

/// A [`StreamRecord`] carrying an [`ErasedValue`]: what every [`crate::output::OutputSink`] and
/// [`crate::operator::StreamOperator`] actually exchanges.
pub type ErasedRecord = StreamRecord<ErasedValue>;

impl<T: Send + 'static> StreamRecord<T> {
    pub fn erase(self) -> ErasedRecord {
        self.map(|v| Box::new(v) as ErasedValue)
    }
}

impl ErasedRecord {
    /// Attempt to recover the concrete value. Returns the original erased record unchanged on a
    /// type mismatch so the caller can decide how to report it.
    pub fn downcast<T: 'static>(self) -> Result<StreamRecord<T>, ErasedRecord> {
        let timestamp = self.timestamp;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(StreamRecord {
                value: *value,
                timestamp,
            }),
            Err(value) => Err(StreamRecord { value, timestamp }),
        }
    }

    pub fn value_type_id(&self) -> std::any::TypeId {
        (*self.value).type_id()
    }

    /// A deep copy using an [`ErasedSerializer`], the erased counterpart of
    /// [`StreamRecord::deep_copy`] used once the concrete element type is gone.
    pub fn deep_copy_erased(&self, serializer: &dyn ErasedSerializer) -> ErasedRecord {
        StreamRecord {
            value: serializer.copy(&self.value),
            timestamp: self.timestamp,
        }
    }
}

/// A `TypeSerializer` operating on [`ErasedValue`]s, used by the copying output sinks which no
/// longer know the concrete element type of the edge they're wired to.
pub trait ErasedSerializer: Send + Sync {
    fn copy(&self, value: &ErasedValue) -> ErasedValue;
}

/// Bridges a concrete [`TypeSerializer<T>`] into the erased world. Built once by the chain
/// builder for each copying sink, never re-chosen per record.
pub struct TypeSerializerAdapter<T> {
    inner: Box<dyn TypeSerializer<T>>,
}

impl<T> TypeSerializerAdapter<T> {
    pub fn new(inner: impl TypeSerializer<T> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl<T: Send + 'static> ErasedSerializer for TypeSerializerAdapter<T> {
    fn copy(&self, value: &ErasedValue) -> ErasedValue {
        let typed = value
            .downcast_ref::<T>()
            .expect("erased serializer invoked with a value of the wrong concrete type");
        Box::new(self.inner.copy(typed))
    }
}
