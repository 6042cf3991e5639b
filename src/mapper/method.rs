//! # Registered methods.
//!
//! A method qualifies for registration only with the shape `(P) -> Result<R, E>`:
//! exactly one input, one result, one failure. The shape is enforced by the
//! bounds of [`Methods::add`] and [`Mapper::add`](crate::Mapper::add), so a
//! non-qualifying method is a compile error rather than something skipped at runtime.
//!
//! ```text
//! Receiver::methods(&mut Methods<Self>)
//!     └─► methods.add("Echo", Self::echo)      // fn(&Self, P) -> Result<R, E>
//!            └─► MethodEntry { info, new_params, new_result, invoke }
//!                   invoke: Value ─► take::<P>() ─► f(&receiver, p) ─► Value::new(r)
//! ```

use std::any::type_name;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use super::value::Value;
use crate::error::BoxError;

/// Describes one registered method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    /// Name the receiver was registered under.
    pub receiver: String,
    /// Method name.
    pub method: String,
    /// Fully qualified name of the parameter type.
    pub params_type: &'static str,
    /// Fully qualified name of the result type.
    pub result_type: &'static str,
}

type Invoke = Box<dyn Fn(Value) -> Result<Value, BoxError> + Send + Sync>;

/// Type-erased callable stored in the registry. Immutable once built.
pub(crate) struct MethodEntry {
    pub(crate) info: MethodInfo,
    pub(crate) new_params: fn() -> Value,
    pub(crate) new_result: fn() -> Value,
    invoke: Invoke,
}

impl MethodEntry {
    /// Wraps `f` as a method of `receiver`.
    pub(crate) fn new<P, R, E, F>(receiver: &str, method: &str, f: F) -> Self
    where
        P: Serialize + DeserializeOwned + Default + Send + 'static,
        R: Serialize + DeserializeOwned + Default + Send + 'static,
        E: Into<BoxError>,
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
    {
        let info = MethodInfo {
            receiver: receiver.to_string(),
            method: method.to_string(),
            params_type: type_name::<P>(),
            result_type: type_name::<R>(),
        };
        let label = format!("{receiver}.{method}");

        let invoke: Invoke = Box::new(move |params: Value| {
            let params = match params.take::<P>() {
                Ok(p) => p,
                Err(other) => panic!(
                    "{label} expects parameter to be of type {} but type {} was passed instead",
                    type_name::<P>(),
                    other.type_name()
                ),
            };
            f(params).map(Value::new).map_err(Into::into)
        });

        Self {
            info,
            new_params: zero_value::<P>,
            new_result: zero_value::<R>,
            invoke,
        }
    }

    /// Runs the method synchronously on the calling task.
    ///
    /// # Panics
    /// If `params` does not hold the declared parameter type.
    pub(crate) fn invoke(&self, params: Value) -> Result<Value, BoxError> {
        (self.invoke)(params)
    }
}

fn zero_value<T>() -> Value
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    Value::new(T::default())
}

/// An object exposing RPC-callable methods.
///
/// ## Example
/// ```rust
/// use natsrpc::{Methods, Receiver};
/// use std::convert::Infallible;
///
/// struct Calculator;
///
/// impl Calculator {
///     fn double(&self, n: i64) -> Result<i64, Infallible> {
///         Ok(n * 2)
///     }
/// }
///
/// impl Receiver for Calculator {
///     fn methods(methods: &mut Methods<Self>) {
///         methods.add("Double", Self::double);
///     }
/// }
/// ```
pub trait Receiver: Send + Sync + 'static {
    /// Declares the receiver's callable methods.
    fn methods(methods: &mut Methods<Self>)
    where
        Self: Sized;
}

/// Collects the methods of one receiver instance during registration.
pub struct Methods<R> {
    receiver_name: String,
    receiver: Arc<R>,
    entries: Vec<MethodEntry>,
}

impl<R: Send + Sync + 'static> Methods<R> {
    pub(crate) fn new(receiver_name: String, receiver: Arc<R>) -> Self {
        Self {
            receiver_name,
            receiver,
            entries: Vec::new(),
        }
    }

    /// Adds a method `fn(&R, P) -> Result<T, E>`.
    ///
    /// Adding the same name twice keeps the later one.
    pub fn add<P, T, E, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        P: Serialize + DeserializeOwned + Default + Send + 'static,
        T: Serialize + DeserializeOwned + Default + Send + 'static,
        E: Into<BoxError>,
        F: Fn(&R, P) -> Result<T, E> + Send + Sync + 'static,
    {
        let receiver = Arc::clone(&self.receiver);
        self.entries.push(MethodEntry::new(
            &self.receiver_name,
            name,
            move |p: P| f(&receiver, p),
        ));
        self
    }

    pub(crate) fn into_entries(self) -> Vec<MethodEntry> {
        self.entries
    }
}
