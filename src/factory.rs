//! Core functionality for creating [ScopeContext](crate::context::ScopeContext)s and declaring
//! per-scope singleton types.
//!
//! The [ScopeContextFactory] owns the root [ServiceRegistry] and tracks which types have been
//! declared as per-scope singletons. Declaring a type installs a scoped constructor for it which
//! first consults the scope's [ScopeValuesHolder] for an explicitly supplied value, and otherwise
//! falls back to [Service::create] bound to the same scope. Since declared types are known only
//! at runtime, each declaration is captured in a generic registration record and stored
//! type-erased, keyed by [TypeId].

use crate::context::ScopeContext;
use crate::error::{ServiceRegistryError, ServiceResolutionError};
use crate::holder::ScopeValuesHolder;
use crate::registry::{
    ScopeResolver, ServiceInstancePtr, ServiceLifetime, ServiceRegistry,
};
use crate::service::Service;
use fxhash::{FxHashMap, FxHashSet};
use std::any::{type_name, Any, TypeId};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Scoped service guarding the per-scope singleton protocol: using a type as a per-scope
/// singleton before declaring it via
/// [ScopeContextFactory::register_singleton_type] is always a programming error and fails
/// loudly.
pub struct ScopeValidation {
    singleton_types: Arc<RwLock<FxHashSet<TypeId>>>,
}

impl ScopeValidation {
    pub(crate) fn validate_singleton_type(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<(), ServiceResolutionError> {
        let singleton_types = self
            .singleton_types
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if singleton_types.contains(&type_id) {
            Ok(())
        } else {
            Err(ServiceResolutionError::UnregisteredSingletonType(type_name))
        }
    }
}

type SingletonRegistrationPtr = Box<dyn SingletonRegistration + Send + Sync>;

/// Type-erasure boundary for per-type singleton registrations: the generic record captures the
/// type parameter at the declaration site and installs a scoped constructor for it.
trait SingletonRegistration {
    fn install_into(&self, registry: &ServiceRegistry) -> Result<(), ServiceRegistryError>;
}

struct TypedSingletonRegistration<T> {
    _service: PhantomData<fn() -> T>,
}

impl<T: Service> TypedSingletonRegistration<T> {
    fn new() -> Self {
        Self {
            _service: PhantomData,
        }
    }

    fn resolve_singleton_value(
        resolver: &ScopeResolver,
    ) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> {
        resolver
            .resolve::<ScopeValidation>()?
            .validate_singleton_type(TypeId::of::<T>(), type_name::<T>())?;

        let holder = resolver.resolve::<ScopeValuesHolder>()?;
        if let Some(value) = holder.singleton_value(TypeId::of::<T>()) {
            return value
                .downcast()
                .map_err(|_| ServiceResolutionError::SingletonValueTypeMismatch(type_name::<T>()));
        }

        T::create(resolver).map(ServiceInstancePtr::new)
    }
}

impl<T: Service> SingletonRegistration for TypedSingletonRegistration<T> {
    fn install_into(&self, registry: &ServiceRegistry) -> Result<(), ServiceRegistryError> {
        registry.register(ServiceLifetime::Scoped, |resolver: &ScopeResolver| {
            Self::resolve_singleton_value(resolver)
        })
    }
}

/// Owner of the root [ServiceRegistry] and entry point for creating scopes.
///
/// The factory is constructed once per process (or per test). Each
/// [created scope](Self::create_scope) receives a label derived from a factory-owned atomic
/// counter, unique for the life of the factory.
pub struct ScopeContextFactory {
    registry: Arc<ServiceRegistry>,
    singleton_types: Arc<RwLock<FxHashSet<TypeId>>>,
    registrations: Mutex<FxHashMap<TypeId, SingletonRegistrationPtr>>,
    scope_counter: AtomicU64,
    disposed: AtomicBool,
}

impl ScopeContextFactory {
    /// Creates a new factory with a fresh root registry. The per-scope infrastructure services
    /// ([ScopeValuesHolder], [ScopeValidation]) are registered with scoped lifetime.
    pub fn new() -> Result<Self, ServiceRegistryError> {
        let registry = Arc::new(ServiceRegistry::new());
        let singleton_types = Arc::new(RwLock::new(FxHashSet::default()));

        registry.register(ServiceLifetime::Scoped, |_resolver: &ScopeResolver| {
            Ok(ServiceInstancePtr::new(ScopeValuesHolder::default()))
        })?;

        let validated_types = Arc::clone(&singleton_types);
        registry.register(ServiceLifetime::Scoped, move |_resolver: &ScopeResolver| {
            Ok(ServiceInstancePtr::new(ScopeValidation {
                singleton_types: Arc::clone(&validated_types),
            }))
        })?;

        Ok(Self {
            registry,
            singleton_types,
            registrations: Mutex::default(),
            scope_counter: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    /// Declares `T` as eligible for per-scope singleton treatment and installs its scoped
    /// constructor. Idempotent - re-declaring an already declared type is a no-op, also under
    /// concurrent declaration.
    pub fn register_singleton_type<T: Service>(&self) -> Result<(), ServiceRegistryError> {
        let type_id = TypeId::of::<T>();

        let mut singleton_types = self
            .singleton_types
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if singleton_types.contains(&type_id) {
            return Ok(());
        }

        let registration = TypedSingletonRegistration::<T>::new();
        registration.install_into(&self.registry)?;
        singleton_types.insert(type_id);

        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_id, Box::new(registration));

        debug!("Registered per-scope singleton type: {}", type_name::<T>());
        Ok(())
    }

    /// Hands the root registry to an application wiring callback, for registering arbitrary
    /// services with scoped or transient lifetime.
    pub fn register_services<F>(&self, register: F) -> Result<(), ServiceRegistryError>
    where
        F: FnOnce(&ServiceRegistry) -> Result<(), ServiceRegistryError>,
    {
        register(&self.registry)
    }

    /// Opens a new scope under the root registry and returns the context wrapping it. Scope
    /// labels are derived from an atomically incremented counter starting at 1, so concurrently
    /// created scopes never share one.
    pub fn create_scope(&self) -> Result<ScopeContext, ServiceRegistryError> {
        let scope_number = self.scope_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let scope = self.registry.open_scope(format!("scope_{scope_number}"))?;
        Ok(ScopeContext::new(scope))
    }

    /// Checks whether `T` has been declared as a per-scope singleton type.
    pub fn is_singleton_type<T: Any>(&self) -> bool {
        self.singleton_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&TypeId::of::<T>())
    }

    /// Disposes the root registry, transitively disposing every still-open scope. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.registry.dispose();
    }
}

impl Drop for ScopeContextFactory {
    fn drop(&mut self) {
        self.dispose();
    }
}
