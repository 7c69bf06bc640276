//! Per-scope storage for explicit singleton values. The holder is itself registered as a scoped
//! service, so every scope lazily gets exactly one instance, and values stored in one scope are
//! never visible to another.

use crate::registry::{ServiceInstanceAnyPtr, ServiceInstancePtr};
use fxhash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::{Mutex, PoisonError};

/// Keyed store mapping a type to the value a scope should use for it instead of normal
/// construction. Populated by the caller around scope-creation time.
#[derive(Debug, Default)]
pub struct ScopeValuesHolder {
    values: Mutex<FxHashMap<TypeId, ServiceInstanceAnyPtr>>,
}

impl ScopeValuesHolder {
    /// Stores or replaces the value to use for `T` within this scope.
    pub fn set_singleton_value<T: Any + Send + Sync>(&self, value: ServiceInstancePtr<T>) {
        self.set_singleton_value_any(TypeId::of::<T>(), value as ServiceInstanceAnyPtr);
    }

    /// Stores or replaces the value for a type known only at runtime. The value must downcast to
    /// the keyed type when resolved, otherwise resolution fails with a type-mismatch error.
    pub fn set_singleton_value_any(&self, type_id: TypeId, value: ServiceInstanceAnyPtr) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_id, value);
    }

    /// Returns the stored value for `T`, or `None` if none was set in this scope.
    pub fn get_singleton_value<T: Any + Send + Sync>(&self) -> Option<ServiceInstancePtr<T>> {
        self.singleton_value(TypeId::of::<T>())
            .and_then(|value| value.downcast().ok())
    }

    pub(crate) fn singleton_value(&self, type_id: TypeId) -> Option<ServiceInstanceAnyPtr> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use crate::holder::ScopeValuesHolder;
    use crate::registry::ServiceInstancePtr;
    use std::any::TypeId;

    #[test]
    fn should_store_and_return_value() {
        let holder = ScopeValuesHolder::default();
        holder.set_singleton_value(ServiceInstancePtr::new(1i8));

        assert_eq!(*holder.get_singleton_value::<i8>().unwrap(), 1);
    }

    #[test]
    fn should_replace_stored_value() {
        let holder = ScopeValuesHolder::default();
        holder.set_singleton_value(ServiceInstancePtr::new(1i8));
        holder.set_singleton_value(ServiceInstancePtr::new(2i8));

        assert_eq!(*holder.get_singleton_value::<i8>().unwrap(), 2);
    }

    #[test]
    fn should_return_none_for_missing_value() {
        let holder = ScopeValuesHolder::default();

        assert!(holder.get_singleton_value::<i8>().is_none());
    }

    #[test]
    fn should_not_downcast_mismatched_value() {
        let holder = ScopeValuesHolder::default();
        holder.set_singleton_value_any(TypeId::of::<i8>(), ServiceInstancePtr::new("value"));

        assert!(holder.get_singleton_value::<i8>().is_none());
        assert!(holder.singleton_value(TypeId::of::<i8>()).is_some());
    }
}
