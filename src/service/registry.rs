//! Service registry for dispatching requests by `Service.Method` name.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use tinyrpc::service::{Service, ServiceRegistry};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Args { num1: i32, num2: i32 }
//!
//! struct Foo;
//!
//! let registry = ServiceRegistry::new();
//! registry
//!     .register(
//!         Service::builder(Foo)
//!             .method("Sum", |_: Arc<Foo>, a: Args| async move { Ok::<_, String>(a.num1 + a.num2) })
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let (service, method) = registry.find_service("Foo.Sum").unwrap();
//! assert_eq!(service.name(), "Foo");
//! assert_eq!(method.name(), "Sum");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{MethodType, Service};
use crate::error::{Result, RpcError};

/// Concurrent map of services by name.
///
/// Lookups take a shared lock; registration takes the write lock once.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a service.
    ///
    /// Fails with [`RpcError::InvalidService`] if a name is empty or dotted,
    /// the service has no methods, or a method name was added twice. Fails
    /// with [`RpcError::DuplicateService`] if the service name is taken.
    pub fn register(&self, service: Service) -> Result<()> {
        service.validate()?;

        let mut services = self.services.write();
        if services.contains_key(service.name()) {
            return Err(RpcError::DuplicateService(service.name().to_string()));
        }

        for method in service.methods() {
            info!(
                "rpc server: register {}.{} ({} -> {})",
                service.name(),
                method.name(),
                method.arg_type(),
                method.reply_type()
            );
        }
        services.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Resolve `Service.Method`, splitting at the last `.`.
    pub fn find_service(&self, service_method: &str) -> Result<(Arc<Service>, Arc<MethodType>)> {
        let (service_name, method_name) = service_method.rsplit_once('.').ok_or_else(|| {
            RpcError::Dispatch(format!(
                "service/method request ill-formed: {}",
                service_method
            ))
        })?;

        let service = self
            .services
            .read()
            .get(service_name)
            .cloned()
            .ok_or_else(|| RpcError::Dispatch(format!("can't find service {}", service_name)))?;

        let method = service
            .method(method_name)
            .ok_or_else(|| RpcError::Dispatch(format!("can't find method {}", method_name)))?;

        Ok((service, method))
    }

    /// Invocation count of `Service.Method`, if registered.
    pub fn num_calls(&self, service_method: &str) -> Option<u64> {
        self.find_service(service_method)
            .ok()
            .map(|(_, method)| method.num_calls())
    }

    /// Names of all registered services.
    pub fn service_names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo;
    struct Bar;

    fn foo() -> Service {
        Service::builder(Foo)
            .method("Sum", |_: Arc<Foo>, (a, b): (i32, i32)| async move {
                Ok::<_, String>(a + b)
            })
            .build()
    }

    #[test]
    fn test_find_service() {
        let registry = ServiceRegistry::new();
        registry.register(foo()).unwrap();

        let (service, method) = registry.find_service("Foo.Sum").unwrap();
        assert_eq!(service.name(), "Foo");
        assert_eq!(method.name(), "Sum");
    }

    #[test]
    fn test_duplicate_service() {
        let registry = ServiceRegistry::new();
        registry.register(foo()).unwrap();

        let err = registry.register(foo()).unwrap_err();
        assert_eq!(err.to_string(), "rpc: service already defined: Foo");
    }

    #[test]
    fn test_method_added_twice_is_rejected() {
        let registry = ServiceRegistry::new();
        let service = Service::builder(Foo)
            .method("Sum", |_: Arc<Foo>, (a, b): (i32, i32)| async move {
                Ok::<_, String>(a + b)
            })
            .method("Sum", |_: Arc<Foo>, (a, b): (i32, i32)| async move {
                Ok::<_, String>(a - b)
            })
            .build();

        let err = registry.register(service).unwrap_err();
        assert!(matches!(err, RpcError::InvalidService(_)));
        assert!(registry.find_service("Foo.Sum").is_err());
    }

    #[test]
    fn test_ill_formed_name() {
        let registry = ServiceRegistry::new();
        registry.register(foo()).unwrap();

        let err = registry.find_service("FooSum").unwrap_err();
        assert_eq!(
            err.to_string(),
            "rpc server: service/method request ill-formed: FooSum"
        );
    }

    #[test]
    fn test_unknown_service_and_method() {
        let registry = ServiceRegistry::new();
        registry.register(foo()).unwrap();

        let err = registry.find_service("Baz.Sum").unwrap_err();
        assert_eq!(err.to_string(), "rpc server: can't find service Baz");

        let err = registry.find_service("Foo.DoesNotExist").unwrap_err();
        assert_eq!(err.to_string(), "rpc server: can't find method DoesNotExist");
    }

    #[test]
    fn test_dotted_service_name_splits_at_last_dot() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                Service::named("math.v1.Calc", Bar)
                    .method("Neg", |_: Arc<Bar>, x: i64| async move { Ok::<_, String>(-x) })
                    .build(),
            )
            .unwrap();

        let (service, method) = registry.find_service("math.v1.Calc.Neg").unwrap();
        assert_eq!(service.name(), "math.v1.Calc");
        assert_eq!(method.name(), "Neg");
    }

    #[test]
    fn test_num_calls_unknown() {
        let registry = ServiceRegistry::new();
        assert_eq!(registry.num_calls("Foo.Sum"), None);

        registry.register(foo()).unwrap();
        assert_eq!(registry.num_calls("Foo.Sum"), Some(0));
        assert_eq!(registry.service_names(), vec!["Foo".to_string()]);
    }
}
