//! Scope-lifetime management layered on a narrow service registry: create hierarchical scopes
//! (one per request or unit of work) from a shared root registry, declare types as *per-scope
//! singletons* (one instance shared by all resolutions within a scope), and optionally supply the
//! value such a type should use in a given scope, falling back to normal construction otherwise.
//!
//! ```
//! use scope_context::error::ServiceResolutionError;
//! use scope_context::factory::ScopeContextFactory;
//! use scope_context::registry::{ScopeResolver, ServiceInstancePtr};
//! use scope_context::service::Service;
//!
//! struct Clock {
//!     millis: u64,
//! }
//!
//! impl Service for Clock {
//!     fn create(_resolver: &ScopeResolver) -> Result<Self, ServiceResolutionError> {
//!         Ok(Clock { millis: 0 })
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ScopeContextFactory::new()?;
//! factory.register_singleton_type::<Clock>()?;
//!
//! // this scope uses an explicitly supplied clock...
//! let scope = factory.create_scope()?;
//! scope.set_singleton_value(ServiceInstancePtr::new(Clock { millis: 42 }))?;
//! assert_eq!(scope.resolve::<Clock>()?.millis, 42);
//!
//! // ...while other scopes construct their own
//! let other = factory.create_scope()?;
//! assert_eq!(other.resolve::<Clock>()?.millis, 0);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod factory;
pub mod holder;
pub mod registry;
pub mod service;
