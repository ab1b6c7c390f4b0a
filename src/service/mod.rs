//! Service module - published receivers and their methods.
//!
//! A service is a receiver value plus a set of named methods. Every method
//! takes the shared receiver and one deserializable argument, and resolves
//! to either a serializable reply or an error whose text is sent back to
//! the caller. Anything else does not type-check, so there is no runtime
//! filtering of "qualifying" methods.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tinyrpc::service::Service;
//!
//! struct Foo;
//!
//! let service = Service::builder(Foo)
//!     .method("Double", |_: Arc<Foo>, n: i64| async move { Ok::<_, String>(n * 2) })
//!     .build();
//!
//! assert_eq!(service.name(), "Foo");
//! assert!(service.method("Double").is_some());
//! ```

mod method;
mod registry;

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use method::{BoxFuture, Handler, MethodType, TypedHandler};
pub use registry::ServiceRegistry;

use crate::error::{Result, RpcError};

/// A named receiver and its methods.
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodType>>,
    /// Method names added more than once.
    duplicates: Vec<String>,
}

impl Service {
    /// Start building a service named after the receiver's type.
    pub fn builder<S: Send + Sync + 'static>(receiver: S) -> ServiceBuilder<S> {
        Self::from_arc(Arc::new(receiver))
    }

    /// Start building a service under an explicit name.
    pub fn named<S: Send + Sync + 'static>(name: impl Into<String>, receiver: S) -> ServiceBuilder<S> {
        ServiceBuilder {
            name: name.into(),
            receiver: Arc::new(receiver),
            methods: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Start building a service around a receiver shared with other code.
    pub fn from_arc<S: Send + Sync + 'static>(receiver: Arc<S>) -> ServiceBuilder<S> {
        ServiceBuilder {
            name: short_type_name::<S>().to_string(),
            receiver,
            methods: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    /// Iterate over all methods.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodType>> {
        self.methods.values()
    }

    /// Check that every method is addressable as `Service.Method`.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RpcError::InvalidService("empty service name".to_string()));
        }
        if self.methods.is_empty() {
            return Err(RpcError::InvalidService(format!(
                "{} has no methods",
                self.name
            )));
        }
        if let Some(name) = self.duplicates.first() {
            return Err(RpcError::InvalidService(format!(
                "{} defines method {:?} more than once",
                self.name, name
            )));
        }
        for name in self.methods.keys() {
            if name.is_empty() || name.contains('.') {
                return Err(RpcError::InvalidService(format!(
                    "{} has bad method name {:?}",
                    self.name, name
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fluent builder binding methods to a receiver.
pub struct ServiceBuilder<S> {
    name: String,
    receiver: Arc<S>,
    methods: HashMap<String, Arc<MethodType>>,
    duplicates: Vec<String>,
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    /// Add a method.
    ///
    /// Adding the same name twice makes the service invalid; registering it
    /// fails with [`RpcError::InvalidService`].
    pub fn method<F, A, R, E, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let handler = TypedHandler::new(self.receiver.clone(), handler);
        let method = MethodType::new(
            name.to_string(),
            std::any::type_name::<A>(),
            std::any::type_name::<R>(),
            Box::new(handler),
        );
        if self.methods.insert(name.to_string(), Arc::new(method)).is_some() {
            self.duplicates.push(name.to_string());
        }
        self
    }

    /// Finish the service.
    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
            duplicates: self.duplicates,
        }
    }
}

impl<S: Send + Sync + 'static> From<ServiceBuilder<S>> for Service {
    fn from(builder: ServiceBuilder<S>) -> Self {
        builder.build()
    }
}

/// Last path segment of a type name, generics stripped.
fn short_type_name<S>() -> &'static str {
    let full = std::any::type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
