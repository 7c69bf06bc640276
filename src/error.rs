use thiserror::Error;

/// Errors related to resolving service instances within a scope.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ServiceResolutionError {
    #[error("No service registered for type: {0}")]
    UnregisteredService(&'static str),
    #[error("Type not registered as a per-scope singleton type: {0}")]
    UnregisteredSingletonType(&'static str),
    #[error("Stored singleton value for type '{0}' has an incompatible type")]
    SingletonValueTypeMismatch(&'static str),
    #[error("Cannot downcast resolved instance to requested type: {0}")]
    IncompatibleServiceInstance(&'static str),
    #[error("Scope '{0}' has been disposed")]
    ScopeClosed(String),
}

/// Errors related to registering services and opening scopes on the root registry.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ServiceRegistryError {
    #[error("Attempted to re-register service type: {0}")]
    DuplicateServiceType(&'static str),
    #[error("Service registry has been disposed")]
    RegistryDisposed,
}
