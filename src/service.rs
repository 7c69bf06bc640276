//! Services are objects whose lifetime is managed by the [registry](crate::registry). A service
//! can depend on other services, which it resolves through the [ScopeResolver] passed to its
//! constructor - all such resolutions are bound to the scope the service is being created in.

use crate::error::ServiceResolutionError;
use crate::registry::ScopeResolver;

/// Base trait for services constructed through the registry.
///
/// Implementing this trait defines how an instance is built when no explicit value has been
/// supplied for the type. Dependencies should be resolved through the given [ScopeResolver],
/// which ties them to the same scope as the instance under construction.
pub trait Service: Send + Sync + 'static {
    /// Creates an instance of this service, resolving dependencies from the given resolver.
    fn create(resolver: &ScopeResolver) -> Result<Self, ServiceResolutionError>
    where
        Self: Sized;
}
