//! The root [ServiceRegistry] and the scopes opened from it. The registry owns all registered
//! service constructors and is the parent of every scope. Scopes cache instances of
//! [scoped](ServiceLifetime::Scoped) services for their lifetime and release them on disposal, in
//! reverse construction order.
//!
//! The registry is deliberately narrow: it knows how to register a constructor for a type with a
//! given lifetime, open a labeled scope, resolve a type within a scope, and dispose. It performs
//! no dependency-graph analysis - constructors resolve their own dependencies through the
//! [ScopeResolver] they are given.

use crate::error::{ServiceRegistryError, ServiceResolutionError};
use derivative::Derivative;
use fxhash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::debug;

/// Pointer to a service instance shared within a scope.
pub type ServiceInstancePtr<T> = Arc<T>;

/// Type-erased [ServiceInstancePtr].
pub type ServiceInstanceAnyPtr = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor stored for a registered service.
pub type ServiceConstructor =
    Arc<dyn Fn(&ScopeResolver) -> Result<ServiceInstanceAnyPtr, ServiceResolutionError> + Send + Sync>;

/// Lifetime of a registered service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceLifetime {
    /// One instance per scope, cached for the scope's lifetime.
    Scoped,
    /// A fresh instance per resolution, never cached.
    Transient,
}

/// Definition of a registered service.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ServiceDefinition {
    pub type_name: &'static str,
    pub lifetime: ServiceLifetime,
    #[derivative(Debug = "ignore")]
    constructor: ServiceConstructor,
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
struct ScopeState {
    #[derivative(Debug = "ignore")]
    instances: FxHashMap<TypeId, ServiceInstanceAnyPtr>,
    construction_order: Vec<TypeId>,
}

#[derive(Debug)]
struct ScopeInner {
    registry: Arc<ServiceRegistry>,
    label: String,
    // None marks the scope as disposed
    state: Mutex<Option<ScopeState>>,
}

impl ScopeInner {
    fn resolve(scope: &Arc<Self>, type_id: TypeId, requested: &'static str) -> Result<ServiceInstanceAnyPtr, ServiceResolutionError> {
        let definition = scope
            .registry
            .definition(type_id)
            .ok_or(ServiceResolutionError::UnregisteredService(requested))?;

        {
            let guard = scope.state.lock().unwrap_or_else(PoisonError::into_inner);
            let state = guard
                .as_ref()
                .ok_or_else(|| ServiceResolutionError::ScopeClosed(scope.label.clone()))?;

            if definition.lifetime == ServiceLifetime::Scoped {
                if let Some(instance) = state.instances.get(&type_id) {
                    return Ok(Arc::clone(instance));
                }
            }
        }

        // the constructor runs unlocked, since it may re-enter the resolver for dependencies
        let resolver = ScopeResolver {
            scope: Arc::clone(scope),
        };
        let instance = (definition.constructor)(&resolver)?;

        if definition.lifetime == ServiceLifetime::Transient {
            return Ok(instance);
        }

        let mut guard = scope.state.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            // disposed while constructing - the fresh instance is released, not leaked
            None => Err(ServiceResolutionError::ScopeClosed(scope.label.clone())),
            Some(state) => {
                if let Some(existing) = state.instances.get(&type_id) {
                    return Ok(Arc::clone(existing));
                }

                state.instances.insert(type_id, Arc::clone(&instance));
                state.construction_order.push(type_id);
                Ok(instance)
            }
        }
    }

    fn resolve_typed<T: Any + Send + Sync>(
        scope: &Arc<Self>,
    ) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> {
        Self::resolve(scope, TypeId::of::<T>(), type_name::<T>())?
            .downcast()
            .map_err(|_| ServiceResolutionError::IncompatibleServiceInstance(type_name::<T>()))
    }

    fn dispose(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut state) = state {
            // newest-first, so dependents are released before their dependencies
            while let Some(type_id) = state.construction_order.pop() {
                state.instances.remove(&type_id);
            }

            debug!("Disposed scope: {}", self.label);
        }
    }

    fn is_disposed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// A disposable resolution boundary opened from the [ServiceRegistry]. All scoped instances
/// resolved through it are owned by it and released on disposal. Dropping the handle disposes the
/// scope.
#[derive(Debug)]
pub struct ServiceScope {
    inner: Arc<ScopeInner>,
}

impl ServiceScope {
    /// The label this scope was opened with.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Resolves an instance of the given type within this scope.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> {
        ScopeInner::resolve_typed(&self.inner)
    }

    /// Disposes the scope, releasing all instances it owns in reverse construction order.
    /// Disposal is idempotent; later resolutions fail with
    /// [ServiceResolutionError::ScopeClosed].
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Checks whether this scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// Resolver bound to a single scope, handed to service constructors. Resolutions performed
/// through it are owned by the same scope as the instance under construction.
#[derive(Debug)]
pub struct ScopeResolver {
    scope: Arc<ScopeInner>,
}

impl ScopeResolver {
    /// The label of the scope this resolver is bound to.
    pub fn label(&self) -> &str {
        &self.scope.label
    }

    /// Resolves an instance of the given type within the bound scope.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> {
        ScopeInner::resolve_typed(&self.scope)
    }
}

/// The process-wide root registry. Created once, it owns all registered service definitions and
/// is the parent of every [ServiceScope]. Registrations are first-write-wins - a definition, once
/// stored for a type, is never replaced.
#[derive(Debug)]
pub struct ServiceRegistry {
    definitions: RwLock<FxHashMap<TypeId, ServiceDefinition>>,
    scopes: Mutex<Vec<Weak<ScopeInner>>>,
    disposed: AtomicBool,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::default(),
            scopes: Mutex::default(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Registers a constructor for `T` with the given lifetime. Registering a type twice is an
    /// error - definitions are never replaced.
    pub fn register<T, F>(&self, lifetime: ServiceLifetime, constructor: F) -> Result<(), ServiceRegistryError>
    where
        T: Any + Send + Sync,
        F: Fn(&ScopeResolver) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> + Send + Sync + 'static,
    {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ServiceRegistryError::RegistryDisposed);
        }

        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if definitions.contains_key(&TypeId::of::<T>()) {
            return Err(ServiceRegistryError::DuplicateServiceType(type_name::<T>()));
        }

        definitions.insert(
            TypeId::of::<T>(),
            ServiceDefinition {
                type_name: type_name::<T>(),
                lifetime,
                constructor: Arc::new(move |resolver| {
                    constructor(resolver).map(|instance| instance as ServiceInstanceAnyPtr)
                }),
            },
        );

        debug!("Registered service: {}", type_name::<T>());
        Ok(())
    }

    /// Opens a new scope with the given label. The registry keeps a weak handle to the scope, so
    /// that disposing the registry disposes all still-open scopes.
    pub fn open_scope(self: &Arc<Self>, label: String) -> Result<ServiceScope, ServiceRegistryError> {
        let inner = Arc::new(ScopeInner {
            registry: Arc::clone(self),
            label,
            state: Mutex::new(Some(ScopeState::default())),
        });

        {
            let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);

            // checked under the scopes lock: a concurrent dispose either sees this scope in
            // the list and disposes it, or this call fails
            if self.disposed.load(Ordering::Acquire) {
                return Err(ServiceRegistryError::RegistryDisposed);
            }

            scopes.retain(|scope| scope.strong_count() > 0);
            scopes.push(Arc::downgrade(&inner));
        }

        debug!("Opened scope: {}", inner.label);
        Ok(ServiceScope { inner })
    }

    /// Disposes the registry and transitively every still-open scope. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let scopes = std::mem::take(&mut *self.scopes.lock().unwrap_or_else(PoisonError::into_inner));
        for scope in scopes {
            if let Some(scope) = scope.upgrade() {
                scope.dispose();
            }
        }

        debug!("Disposed service registry");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn definition(&self, type_id: TypeId) -> Option<ServiceDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
