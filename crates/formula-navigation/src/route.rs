#![forbid(unsafe_code)]

//! Destination identity.
//!
//! A [`RouteId`] pairs a generated [`InstanceId`] with a user-defined key
//! describing *what* the destination shows. Identity is the instance id
//! alone: pushing two equal keys yields two distinct live destinations.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

/// A value describing a destination. Implemented for every
/// `Debug + Send + Sync + 'static` type.
pub trait RouteKey: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T> RouteKey for T
where
    T: Any + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Opaque per-instance identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(Arc<str>);

impl InstanceId {
    /// A fresh random (v4 UUID) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Restore an identifier, e.g. one the platform persisted.
    #[must_use]
    pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live destination: instance id plus key.
#[derive(Clone)]
pub struct RouteId {
    instance_id: InstanceId,
    key: Arc<dyn RouteKey>,
}

impl RouteId {
    /// New destination for `key` with a freshly generated instance id.
    pub fn new<K: RouteKey>(key: K) -> Self {
        Self::with_instance_id(InstanceId::generate(), key)
    }

    pub fn with_instance_id<K: RouteKey>(instance_id: InstanceId, key: K) -> Self {
        Self {
            instance_id,
            key: Arc::new(key),
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    #[must_use]
    pub fn key(&self) -> &dyn RouteKey {
        &*self.key
    }

    /// The key as `K`, if that is its concrete type.
    #[must_use]
    pub fn key_as<K: 'static>(&self) -> Option<&K> {
        RouteKey::as_any(&*self.key).downcast_ref::<K>()
    }

    #[must_use]
    pub fn key_type_id(&self) -> TypeId {
        RouteKey::as_any(&*self.key).type_id()
    }

    #[must_use]
    pub fn key_type_name(&self) -> &'static str {
        RouteKey::type_name(&*self.key)
    }
}

impl PartialEq for RouteId {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
    }
}

impl Eq for RouteId {}

impl Hash for RouteId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instance_id.hash(state);
    }
}

impl fmt::Debug for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteId")
            .field("instance_id", &self.instance_id.as_str())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq)]
    struct Detail {
        item: u32,
    }

    #[test]
    fn equal_keys_are_distinct_destinations() {
        let a = RouteId::new(Detail { item: 7 });
        let b = RouteId::new(Detail { item: 7 });
        assert_ne!(a, b);
        assert_eq!(a.key_as::<Detail>(), b.key_as::<Detail>());
        let set: HashSet<_> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn identity_is_instance_id_only() {
        let id = InstanceId::from_raw("fixed");
        let a = RouteId::with_instance_id(id.clone(), Detail { item: 1 });
        let b = RouteId::with_instance_id(id, "something else");
        assert_eq!(a, b);
    }

    #[test]
    fn key_downcasts_to_concrete_type() {
        let id = RouteId::new(Detail { item: 3 });
        assert_eq!(id.key_as::<Detail>().map(|d| d.item), Some(3));
        assert!(id.key_as::<String>().is_none());
        assert_eq!(id.key_type_id(), TypeId::of::<Detail>());
        assert!(id.key_type_name().ends_with("Detail"));
    }

    #[test]
    fn generated_ids_are_uuids() {
        let id = InstanceId::generate();
        assert_eq!(id.as_str().len(), 36);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }
}
