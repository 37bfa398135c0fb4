#![forbid(unsafe_code)]

//! Type-erased identity keys.
//!
//! Every declarative element a formula produces (actions, children,
//! listeners) is identified by a [`Key`]. Two declarations with equal keys
//! in consecutive evaluations are treated as the *same* element, which is
//! what lets the runtime leave a running action untouched when it is
//! redeclared.
//!
//! A key is one of:
//!
//! - a **type sentinel** ([`Key::of`]): identity derived from a Rust type;
//! - a **call site** ([`Key::caller`]): identity derived from a
//!   `#[track_caller]` source location;
//! - a **value** ([`Key::new`]): any `Hash + Eq` value;
//! - a **pair** ([`Key::pair`]): two keys composed, used to qualify a type
//!   sentinel with a user key.
//!
//! # Invariants
//!
//! 1. `a == b` implies `hash(a) == hash(b)`.
//! 2. Value keys of different Rust types never compare equal, even if their
//!    debug representations match.
//! 3. Cloning a key is O(1).

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Object-safe view of a hashable, comparable key value.
trait DynKeyValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynKeyValue) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> DynKeyValue for T
where
    T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynKeyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone)]
enum Repr {
    Type {
        id: TypeId,
        name: &'static str,
    },
    Caller(&'static Location<'static>),
    Value(Arc<dyn DynKeyValue>),
    Pair(Arc<(Key, Key)>),
}

/// Identity of a declared action, child, or listener.
#[derive(Clone)]
pub struct Key {
    repr: Repr,
}

impl Key {
    /// Key wrapping an arbitrary hashable value.
    pub fn new<T>(value: T) -> Self
    where
        T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            repr: Repr::Value(Arc::new(value)),
        }
    }

    /// Type sentinel: every call with the same `T` yields an equal key.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            repr: Repr::Type {
                id: TypeId::of::<T>(),
                name: std::any::type_name::<T>(),
            },
        }
    }

    /// Key identifying the source location of the caller.
    ///
    /// Functions that forward to this must themselves be `#[track_caller]`
    /// for the location to point at user code.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        Self {
            repr: Repr::Caller(Location::caller()),
        }
    }

    /// Compose two keys. Order matters: `pair(a, b) != pair(b, a)`.
    #[must_use]
    pub fn pair(first: Key, second: Key) -> Self {
        Self {
            repr: Repr::Pair(Arc::new((first, second))),
        }
    }

    /// Borrow the wrapped value if this is a value key of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match &self.repr {
            Repr::Value(value) => value.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether this key is a type sentinel.
    #[must_use]
    pub fn is_type_sentinel(&self) -> bool {
        matches!(self.repr, Repr::Type { .. })
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Type { id: a, .. }, Repr::Type { id: b, .. }) => a == b,
            (Repr::Caller(a), Repr::Caller(b)) => a == b,
            (Repr::Value(a), Repr::Value(b)) => Arc::ptr_eq(a, b) || a.dyn_eq(&**b),
            (Repr::Pair(a), Repr::Pair(b)) => Arc::ptr_eq(a, b) || (a.0 == b.0 && a.1 == b.1),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            Repr::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Repr::Caller(location) => {
                1u8.hash(state);
                location.hash(state);
            }
            Repr::Value(value) => {
                2u8.hash(state);
                value.dyn_hash(state);
            }
            Repr::Pair(pair) => {
                3u8.hash(state);
                pair.0.hash(state);
                pair.1.hash(state);
            }
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Type { name, .. } => write!(f, "Key(type {name})"),
            Repr::Caller(location) => write!(f, "Key({location})"),
            Repr::Value(value) => {
                f.write_str("Key(")?;
                value.dyn_fmt(f)?;
                f.write_str(")")
            }
            Repr::Pair(pair) => write!(f, "Key({:?} / {:?})", pair.0, pair.1),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::new(value)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key::new(value)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::new(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::new(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::new(value)
    }
}
