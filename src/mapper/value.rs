//! # Type-erased payload holder.
//!
//! A [`Value`] owns one concrete parameter or result of a registered method.
//! Callers obtain a zero-valued holder from [`Mapper::params`](crate::Mapper::params),
//! decode wire bytes straight into it and pass it to [`Mapper::call`](crate::Mapper::call);
//! no intermediate generic representation is needed.

use std::any::{Any, type_name};
use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CallError;

/// Object-safe view of a payload type.
trait Payload: Any + Send {
    fn decode_json(&mut self, bytes: &[u8]) -> Result<(), serde_json::Error>;
    fn encode_json(&self) -> Result<Vec<u8>, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn type_name(&self) -> &'static str;
}

impl<T> Payload for T
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn decode_json(&mut self, bytes: &[u8]) -> Result<(), serde_json::Error> {
        *self = serde_json::from_slice(bytes)?;
        Ok(())
    }

    fn encode_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Owned, type-erased method parameter or result.
///
/// ## Example
/// ```rust
/// use natsrpc::Value;
///
/// let mut v = Value::new(String::new());
/// v.decode_json(br#""hello""#).unwrap();
/// assert_eq!(v.downcast_ref::<String>().map(String::as_str), Some("hello"));
/// assert_eq!(v.take::<String>().unwrap(), "hello");
/// ```
pub struct Value {
    inner: Box<dyn Payload>,
}

impl Value {
    /// Wraps a concrete payload.
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        Self {
            inner: Box::new(value),
        }
    }

    /// Fully qualified name of the concrete type held.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// True if the held value is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Borrows the held value as `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Mutably borrows the held value as `T`.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.inner.as_any_mut().downcast_mut::<T>()
    }

    /// Takes the held value out as `T`, or gives the holder back untouched.
    pub fn take<T: 'static>(self) -> Result<T, Value> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.inner.into_any().downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(_) => unreachable!("type checked above"),
        }
    }

    /// Replaces the held value with one decoded from JSON of the same type.
    pub fn decode_json(&mut self, bytes: &[u8]) -> Result<(), CallError> {
        let type_name = self.type_name();
        self.inner
            .decode_json(bytes)
            .map_err(|source| CallError::Decode { type_name, source })
    }

    /// Encodes the held value as JSON.
    pub fn encode_json(&self) -> Result<Vec<u8>, CallError> {
        self.inner.encode_json().map_err(|source| CallError::Encode {
            type_name: self.type_name(),
            source,
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name())
            .finish_non_exhaustive()
    }
}
