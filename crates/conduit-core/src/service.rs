//! Named lookup table for cross-plugin object sharing.
//!
//! The registry stores `Arc`s and never owns a service's lifecycle: the
//! registrant keeps its own handle, and callers must not assume a service
//! outlives the plugin that provided it.
//!
//! # Trait-object services
//!
//! Only sized types can be recovered through [`ServiceRegistry::get`].  To
//! share a trait object, register the `Arc<dyn Trait>` itself as the value:
//!
//! ```rust,ignore
//! let store: Arc<dyn VectorStore> = Arc::new(ChromaStore::new());
//! services.register("vector_store", Arc::new(store));
//! let store = services.get::<Arc<dyn VectorStore>>("vector_store");
//! ```

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Type-erased service handle as stored in the registry.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

struct ServiceEntry {
    value: ServiceArc,
    type_name: &'static str,
}

/// Process-wide name → service map.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceEntry>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`.
    ///
    /// Last writer wins: an existing registration is replaced after a warning
    /// is logged.
    pub fn register<T>(&self, name: impl Into<String>, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.insert(name.into(), service, type_name::<T>());
    }

    /// Registers an already type-erased service.
    pub fn register_raw(&self, name: impl Into<String>, service: ServiceArc) {
        self.insert(name.into(), service, "<erased>");
    }

    fn insert(&self, name: String, value: ServiceArc, type_name: &'static str) {
        let mut map = self.services.write();
        if let Some(previous) = map.get(&name) {
            warn!(
                service = %name,
                previous_type = previous.type_name,
                new_type = type_name,
                "Service already registered — overwriting"
            );
        }
        debug!(service = %name, service_type = type_name, "Service registered");
        map.insert(name, ServiceEntry { value, type_name });
    }

    /// Removes `name`, returning the removed handle.
    pub fn unregister(&self, name: &str) -> Option<ServiceArc> {
        let removed = self.services.write().remove(name).map(|e| e.value);
        if removed.is_some() {
            debug!(service = %name, "Service unregistered");
        }
        removed
    }

    /// Looks up `name` and downcasts it to `T`.
    ///
    /// Returns `None` when nothing is registered under `name` or when the
    /// registered value is not a `T`.
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_raw(name)?.downcast::<T>().ok()
    }

    /// Looks up `name` without downcasting.
    pub fn get_raw(&self, name: &str) -> Option<ServiceArc> {
        self.services.read().get(name).map(|e| Arc::clone(&e.value))
    }

    /// Returns `true` if a service is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Names of all registered services, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Store(&'static str);

    #[test]
    fn test_last_writer_wins() {
        let registry = ServiceRegistry::new();
        registry.register("svc", Arc::new(Store("a")));
        registry.register("svc", Arc::new(Store("b")));
        assert_eq!(registry.get::<Store>("svc").as_deref(), Some(&Store("b")));
        assert_eq!(registry.names(), vec!["svc".to_string()]);
    }

    #[test]
    fn test_get_with_wrong_type() {
        let registry = ServiceRegistry::new();
        registry.register("svc", Arc::new(42_u32));
        assert!(registry.get::<Store>("svc").is_none());
        assert_eq!(registry.get::<u32>("svc").as_deref(), Some(&42));
        assert!(registry.get::<u32>("missing").is_none());
    }

    #[test]
    fn test_trait_object_service() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> String;
        }
        struct Hello;
        impl Greeter for Hello {
            fn greet(&self) -> String {
                "hello".into()
            }
        }

        let registry = ServiceRegistry::new();
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        registry.register("greeter", Arc::new(greeter));
        let found = registry.get::<Arc<dyn Greeter>>("greeter");
        assert_eq!(found.map(|g| g.greet()), Some("hello".to_string()));
    }

    #[test]
    fn test_unregister() {
        let registry = ServiceRegistry::new();
        registry.register("svc", Arc::new(1_u8));
        assert!(registry.contains("svc"));
        assert!(registry.unregister("svc").is_some());
        assert!(registry.unregister("svc").is_none());
        assert!(!registry.contains("svc"));
    }
}
