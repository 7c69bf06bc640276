//! The caller-facing handle for a unit of work. A [ScopeContext] wraps a scope opened on the root
//! registry: resolutions through it are bound to that scope's lifetime, and disposing it releases
//! every instance the scope owns.

use crate::error::ServiceResolutionError;
use crate::factory::ScopeValidation;
use crate::holder::ScopeValuesHolder;
use crate::registry::{ServiceInstancePtr, ServiceScope};
use std::any::{type_name, Any, TypeId};

/// A single unit-of-work lifetime created by
/// [ScopeContextFactory::create_scope](crate::factory::ScopeContextFactory::create_scope).
#[derive(Debug)]
pub struct ScopeContext {
    scope: ServiceScope,
}

impl ScopeContext {
    pub(crate) fn new(scope: ServiceScope) -> Self {
        Self { scope }
    }

    /// The unique label assigned to this scope.
    pub fn label(&self) -> &str {
        self.scope.label()
    }

    /// Resolves an instance of the given type within this scope. Per-scope singleton types go
    /// through the singleton value protocol; other types resolve per their registered lifetime.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<ServiceInstancePtr<T>, ServiceResolutionError> {
        self.scope.resolve()
    }

    /// Supplies the value this scope should use for the per-scope singleton type `T`, instead of
    /// constructing one. Fails if `T` has not been declared via
    /// [ScopeContextFactory::register_singleton_type](crate::factory::ScopeContextFactory::register_singleton_type).
    pub fn set_singleton_value<T: Any + Send + Sync>(
        &self,
        value: ServiceInstancePtr<T>,
    ) -> Result<(), ServiceResolutionError> {
        self.scope
            .resolve::<ScopeValidation>()?
            .validate_singleton_type(TypeId::of::<T>(), type_name::<T>())?;
        self.scope
            .resolve::<ScopeValuesHolder>()?
            .set_singleton_value(value);
        Ok(())
    }

    /// This scope's [ScopeValuesHolder].
    pub fn values_holder(&self) -> Result<ServiceInstancePtr<ScopeValuesHolder>, ServiceResolutionError> {
        self.scope.resolve()
    }

    /// Disposes the underlying scope and all instances it owns. Idempotent; also runs when the
    /// context is dropped. Resolving through a disposed context fails with
    /// [ServiceResolutionError::ScopeClosed].
    pub fn dispose(&self) {
        self.scope.dispose();
    }

    /// Checks whether this scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ServiceResolutionError;
    use crate::factory::ScopeContextFactory;
    use crate::registry::{ScopeResolver, ServiceInstancePtr};
    use crate::service::Service;

    #[derive(Debug)]
    struct Clock;

    impl Service for Clock {
        fn create(_resolver: &ScopeResolver) -> Result<Self, ServiceResolutionError> {
            Ok(Clock)
        }
    }

    #[test]
    fn should_assign_sequential_labels() {
        let factory = ScopeContextFactory::new().unwrap();

        assert_eq!(factory.create_scope().unwrap().label(), "scope_1");
        assert_eq!(factory.create_scope().unwrap().label(), "scope_2");
    }

    #[test]
    fn should_fail_resolution_after_dispose() {
        let factory = ScopeContextFactory::new().unwrap();
        factory.register_singleton_type::<Clock>().unwrap();

        let scope = factory.create_scope().unwrap();
        scope.dispose();
        scope.dispose();

        assert!(scope.is_disposed());
        assert_eq!(
            scope.resolve::<Clock>().unwrap_err(),
            ServiceResolutionError::ScopeClosed("scope_1".to_string())
        );
    }

    #[test]
    fn should_keep_singleton_value_for_scope_lifetime() {
        let factory = ScopeContextFactory::new().unwrap();
        factory.register_singleton_type::<Clock>().unwrap();

        let scope = factory.create_scope().unwrap();
        let clock = ServiceInstancePtr::new(Clock);
        scope.set_singleton_value(clock.clone()).unwrap();

        assert!(ServiceInstancePtr::ptr_eq(
            &scope.values_holder().unwrap().get_singleton_value::<Clock>().unwrap(),
            &clock
        ));
    }
}
