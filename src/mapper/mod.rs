//! # Dispatch registry.
//!
//! [`Mapper`] is a two-level call-routing table `{receiver → {method → callable}}`.
//! It is usable on its own as an RPC method table and knows nothing about the
//! pipeline layer or the wire format.
//!
//! ## Call flow
//! ```text
//! params(r, m) ─► Value(P::default()) ─► decode wire bytes into it
//!                                              │
//! call(r, m, value) ─► lookup (read lock, released) ─► invoke on caller's task
//!                                              │
//!                              Ok(Value(R)) / Err(CallError::Method)
//! ```
//!
//! ## Rules
//! - Registration is additive; re-registering `(receiver, method)` replaces the entry.
//! - Lookups take the read lock only for the map access; methods never run under the lock.
//! - Lookup misses are ordinary errors (`ReceiverNotFound`, `MethodNotFound`).
//! - Passing a `Value` of the wrong type to [`Mapper::call`] is a caller bug and panics.

mod method;
mod value;

pub use method::{MethodInfo, Methods, Receiver};
pub use value::Value;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{BoxError, CallError};
use method::MethodEntry;

type MethodTable = HashMap<String, Arc<MethodEntry>>;

/// Thread-safe registry of receivers and their methods.
///
/// ## Example
/// ```rust
/// use std::convert::Infallible;
/// use natsrpc::{Mapper, CallError};
///
/// let mapper = Mapper::new();
/// mapper.add("Echo", "Echos", |s: String| Ok::<_, Infallible>(s));
///
/// let mut params = mapper.params("Echo", "Echos").unwrap();
/// params.decode_json(br#""hello world!""#).unwrap();
/// let result = mapper.call("Echo", "Echos", params).unwrap();
/// assert_eq!(result.take::<String>().unwrap(), "hello world!");
///
/// assert!(matches!(mapper.params("Nope", "Echos"), Err(CallError::ReceiverNotFound)));
/// ```
#[derive(Default)]
pub struct Mapper {
    receivers: RwLock<HashMap<String, MethodTable>>,
}

impl Mapper {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers all methods declared by `receiver` under `name`.
    ///
    /// The receiver entry exists afterwards even if it declares no methods,
    /// so calls against it report `MethodNotFound` rather than `ReceiverNotFound`.
    pub fn register<R: Receiver>(&self, name: impl Into<String>, receiver: Arc<R>) {
        let name = name.into();
        let mut methods = Methods::new(name.clone(), receiver);
        R::methods(&mut methods);
        self.insert(name, methods.into_entries());
    }

    /// Registers a single method backed by a closure.
    pub fn add<P, T, E, F>(&self, receiver: &str, method: &str, f: F)
    where
        P: Serialize + DeserializeOwned + Default + Send + 'static,
        T: Serialize + DeserializeOwned + Default + Send + 'static,
        E: Into<BoxError>,
        F: Fn(P) -> Result<T, E> + Send + Sync + 'static,
    {
        let entry = MethodEntry::new(receiver, method, f);
        self.insert(receiver.to_string(), vec![entry]);
    }

    fn insert(&self, receiver: String, entries: Vec<MethodEntry>) {
        let mut receivers = self.receivers.write();
        let table = receivers.entry(receiver).or_default();
        for entry in entries {
            table.insert(entry.info.method.clone(), Arc::new(entry));
        }
    }

    fn get(&self, receiver: &str, method: &str) -> Result<Arc<MethodEntry>, CallError> {
        let receivers = self.receivers.read();
        let table = receivers
            .get(receiver)
            .ok_or(CallError::ReceiverNotFound)?;
        table
            .get(method)
            .cloned()
            .ok_or(CallError::MethodNotFound)
    }

    /// True if `receiver.method` is registered. Never fails.
    pub fn is_defined(&self, receiver: &str, method: &str) -> bool {
        self.get(receiver, method).is_ok()
    }

    /// Allocates a zero-valued parameter holder for `receiver.method`.
    pub fn params(&self, receiver: &str, method: &str) -> Result<Value, CallError> {
        self.get(receiver, method).map(|m| (m.new_params)())
    }

    /// Allocates a zero-valued result holder for `receiver.method`.
    pub fn result(&self, receiver: &str, method: &str) -> Result<Value, CallError> {
        self.get(receiver, method).map(|m| (m.new_result)())
    }

    /// Describes `receiver.method`.
    pub fn method_info(&self, receiver: &str, method: &str) -> Result<MethodInfo, CallError> {
        self.get(receiver, method).map(|m| m.info.clone())
    }

    /// Invokes `receiver.method` synchronously on the calling task.
    ///
    /// # Errors
    /// - [`CallError::ReceiverNotFound`] / [`CallError::MethodNotFound`] on lookup misses;
    /// - [`CallError::Method`] with the method's own failure.
    ///
    /// # Panics
    /// If `params` does not hold the method's declared parameter type. Obtain
    /// holders from [`params`](Self::params) to rule this out.
    pub fn call(&self, receiver: &str, method: &str, params: Value) -> Result<Value, CallError> {
        let entry = self.get(receiver, method)?;
        entry.invoke(params).map_err(CallError::Method)
    }

    /// Sorted names of all registered receivers.
    pub fn receivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.receivers.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Sorted method names of `receiver`.
    pub fn methods(&self, receiver: &str) -> Result<Vec<String>, CallError> {
        let receivers = self.receivers.read();
        let table = receivers
            .get(receiver)
            .ok_or(CallError::ReceiverNotFound)?;
        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::fmt;

    #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
    pub struct EchoParams {
        message: String,
    }

    #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
    pub struct EchoResult {
        message: String,
    }

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("refused")
        }
    }

    impl std::error::Error for Refused {}

    struct EchoReceiver;

    impl EchoReceiver {
        fn echo(&self, params: EchoParams) -> Result<EchoResult, Infallible> {
            Ok(EchoResult {
                message: params.message,
            })
        }

        fn echos(&self, params: String) -> Result<String, Infallible> {
            Ok(params)
        }

        fn refuse(&self, _params: String) -> Result<String, Refused> {
            Err(Refused)
        }
    }

    impl Receiver for EchoReceiver {
        fn methods(methods: &mut Methods<Self>) {
            methods
                .add("Echo", Self::echo)
                .add("Echos", Self::echos)
                .add("Refuse", Self::refuse);
        }
    }

    struct Silent;

    impl Receiver for Silent {
        fn methods(_methods: &mut Methods<Self>) {}
    }

    fn mapper() -> Mapper {
        let m = Mapper::new();
        m.register("Echo", Arc::new(EchoReceiver));
        m
    }

    #[test]
    fn test_call_echo_struct() {
        let m = mapper();
        let mut params = m.params("Echo", "Echo").unwrap();
        *params.downcast_mut::<EchoParams>().unwrap() = EchoParams {
            message: "hello world!".into(),
        };
        let result = m.call("Echo", "Echo", params).unwrap();
        assert_eq!(result.take::<EchoResult>().unwrap().message, "hello world!");
    }

    #[test]
    fn test_call_echo_builtin() {
        let m = mapper();
        let result = m
            .call("Echo", "Echos", Value::new(String::from("hello world!")))
            .unwrap();
        assert_eq!(result.take::<String>().unwrap(), "hello world!");
    }

    #[test]
    fn test_call_undefined_method() {
        let m = mapper();
        let err = m.call("Echo", "Undefined", Value::new(())).unwrap_err();
        assert!(matches!(err, CallError::MethodNotFound));
    }

    #[test]
    fn test_call_unregistered_receiver() {
        let m = Mapper::new();
        let err = m.call("Undefined", "Undefined", Value::new(())).unwrap_err();
        assert!(matches!(err, CallError::ReceiverNotFound));
    }

    #[test]
    fn test_method_failure_is_error_value() {
        let m = mapper();
        let err = m
            .call("Echo", "Refuse", Value::new(String::new()))
            .unwrap_err();
        assert!(matches!(err, CallError::Method(_)));
        assert_eq!(err.to_string(), "refused");
    }

    #[test]
    #[should_panic(expected = "Echo.Echos expects parameter to be of type")]
    fn test_wrong_param_type_panics() {
        let m = mapper();
        let _ = m.call("Echo", "Echos", Value::new(42u64));
    }

    #[test]
    fn test_params_and_result_are_zero_valued() {
        let m = mapper();
        let params = m.params("Echo", "Echo").unwrap();
        assert_eq!(params.downcast_ref::<EchoParams>(), Some(&EchoParams::default()));
        let result = m.result("Echo", "Echo").unwrap();
        assert_eq!(result.downcast_ref::<EchoResult>(), Some(&EchoResult::default()));
        assert!(matches!(
            m.result("Echo", "Nope"),
            Err(CallError::MethodNotFound)
        ));
    }

    #[test]
    fn test_is_defined() {
        let m = mapper();
        assert!(m.is_defined("Echo", "Echo"));
        assert!(!m.is_defined("Echo", "echo"));
        assert!(!m.is_defined("Other", "Echo"));
    }

    #[test]
    fn test_receiver_without_methods_exists() {
        let m = Mapper::new();
        m.register("Silent", Arc::new(Silent));
        assert_eq!(m.receivers(), vec!["Silent".to_string()]);
        assert!(matches!(
            m.call("Silent", "Any", Value::new(())),
            Err(CallError::MethodNotFound)
        ));
    }

    #[test]
    fn test_reregister_overwrites() {
        let m = mapper();
        m.add("Echo", "Echos", |s: String| {
            Ok::<_, Infallible>(s.to_uppercase())
        });
        let out = m.call("Echo", "Echos", Value::new("abc".to_string())).unwrap();
        assert_eq!(out.take::<String>().unwrap(), "ABC");
        assert_eq!(m.methods("Echo").unwrap(), vec!["Echo", "Echos", "Refuse"]);
    }

    #[test]
    fn test_method_info() {
        let m = mapper();
        let info = m.method_info("Echo", "Echos").unwrap();
        assert_eq!(info.receiver, "Echo");
        assert_eq!(info.params_type, "alloc::string::String");
        assert_eq!(info.result_type, "alloc::string::String");
    }

    #[test]
    fn test_concurrent_register_and_call() {
        let m = Arc::new(mapper());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    let name = format!("Adder{i}");
                    m.add(&name, "Add", move |n: i64| Ok::<_, Infallible>(n + i));
                    for _ in 0..100 {
                        let out = m.call(&name, "Add", Value::new(1i64)).unwrap();
                        assert_eq!(out.take::<i64>().unwrap(), 1 + i);
                        assert!(m.is_defined("Echo", "Echo"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.receivers().len(), 9);
    }
}
