#![forbid(unsafe_code)]

//! Resolution from a destination to its [`Feature`].
//!
//! Bindings are an ordered list of (matcher, factory) pairs. The first
//! binding whose matcher accepts a destination wins; later bindings are
//! never consulted for it.
//!
//! # Invariants
//!
//! 1. A key type registered with [`bind`](FeatureBindingsBuilder::bind)
//!    appears at most once across the built list, including bindings
//!    pulled in with [`include`](FeatureBindingsBuilder::include).
//! 2. [`FeatureBindings::init`] never panics: factory errors and factory
//!    panics both become [`FeatureEvent::Failure`].
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Type bound twice | `BindingError::DuplicateBinding` from `build()` |
//! | No matcher accepts | `FeatureEvent::MissingBinding` |
//! | Factory returns `Err` | `FeatureEvent::Failure(err)` |
//! | Factory panics | `FeatureEvent::Failure(FeatureError::Panicked)` |

use std::any::TypeId;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{BindingError, FeatureError};
use crate::feature::{Feature, FeatureEvent};
use crate::route::RouteId;

type Matcher = Arc<dyn Fn(&RouteId) -> bool + Send + Sync>;
type Factory<C, R> = Arc<dyn Fn(&C, &RouteId) -> Result<Feature<R>, FeatureError> + Send + Sync>;

struct Binding<C, R> {
    name: &'static str,
    /// Set for whole-type bindings, which must be unique.
    exclusive: Option<TypeId>,
    matches: Matcher,
    factory: Factory<C, R>,
}

/// Accumulates bindings in declaration order.
pub struct FeatureBindingsBuilder<C, R> {
    bindings: Vec<Binding<C, R>>,
}

impl<C, R> Default for FeatureBindingsBuilder<C, R> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }
}

impl<C, R> fmt::Debug for FeatureBindingsBuilder<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| b.name))
            .finish()
    }
}

impl<C: 'static, R: Send + 'static> FeatureBindingsBuilder<C, R> {
    /// Bind every destination whose key is a `K`.
    #[must_use]
    pub fn bind<K, F>(mut self, factory: F) -> Self
    where
        K: Send + Sync + 'static,
        F: Fn(&C, &K) -> Result<Feature<R>, FeatureError> + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            name: std::any::type_name::<K>(),
            exclusive: Some(TypeId::of::<K>()),
            matches: Arc::new(|id: &RouteId| id.key_as::<K>().is_some()),
            factory: typed_factory(factory),
        });
        self
    }

    /// Bind destinations whose key is a `K` accepted by `predicate`. Several
    /// predicate bindings may share a key type.
    #[must_use]
    pub fn bind_when<K, P, F>(mut self, predicate: P, factory: F) -> Self
    where
        K: Send + Sync + 'static,
        P: Fn(&K) -> bool + Send + Sync + 'static,
        F: Fn(&C, &K) -> Result<Feature<R>, FeatureError> + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            name: std::any::type_name::<K>(),
            exclusive: None,
            matches: Arc::new(move |id: &RouteId| id.key_as::<K>().is_some_and(&predicate)),
            factory: typed_factory(factory),
        });
        self
    }

    /// Bind destinations accepted by an arbitrary predicate over the whole
    /// [`RouteId`].
    #[must_use]
    pub fn bind_matching<P, F>(mut self, name: &'static str, predicate: P, factory: F) -> Self
    where
        P: Fn(&RouteId) -> bool + Send + Sync + 'static,
        F: Fn(&C, &RouteId) -> Result<Feature<R>, FeatureError> + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            name,
            exclusive: None,
            matches: Arc::new(predicate),
            factory: Arc::new(factory),
        });
        self
    }

    /// Append another module's bindings. Their factories receive the
    /// component produced by `map_component`.
    #[must_use]
    pub fn include<D, M>(mut self, other: &FeatureBindings<D, R>, map_component: M) -> Self
    where
        D: 'static,
        M: Fn(&C) -> D + Send + Sync + 'static,
    {
        let map_component = Arc::new(map_component);
        for binding in other.bindings.iter() {
            let inner = Arc::clone(&binding.factory);
            let map_component = Arc::clone(&map_component);
            self.bindings.push(Binding {
                name: binding.name,
                exclusive: binding.exclusive,
                matches: Arc::clone(&binding.matches),
                factory: Arc::new(move |component: &C, id: &RouteId| {
                    inner(&map_component(component), id)
                }),
            });
        }
        self
    }

    /// Freeze the list, rejecting whole-type bindings registered twice.
    ///
    /// A duplicate is a programming error; callers usually `expect` this at
    /// startup.
    #[must_use = "a duplicate binding is only reported through the returned error"]
    pub fn build(self) -> Result<FeatureBindings<C, R>, BindingError> {
        let mut seen: AHashMap<TypeId, &'static str> = AHashMap::new();
        for binding in &self.bindings {
            let Some(type_id) = binding.exclusive else {
                continue;
            };
            if seen.insert(type_id, binding.name).is_some() {
                return Err(BindingError::DuplicateBinding {
                    type_name: binding.name,
                });
            }
        }
        tracing::debug!(bindings = self.bindings.len(), "feature bindings built");
        Ok(FeatureBindings {
            bindings: self.bindings.into(),
        })
    }
}

fn typed_factory<C, K, R, F>(factory: F) -> Factory<C, R>
where
    C: 'static,
    K: 'static,
    R: 'static,
    F: Fn(&C, &K) -> Result<Feature<R>, FeatureError> + Send + Sync + 'static,
{
    Arc::new(move |component: &C, id: &RouteId| match id.key_as::<K>() {
        Some(key) => factory(component, key),
        None => Err(FeatureError::MissingBinding {
            type_name: id.key_type_name(),
        }),
    })
}

/// Immutable, cheaply cloneable binding list.
pub struct FeatureBindings<C, R> {
    bindings: Arc<[Binding<C, R>]>,
}

impl<C, R> Clone for FeatureBindings<C, R> {
    fn clone(&self) -> Self {
        Self {
            bindings: Arc::clone(&self.bindings),
        }
    }
}

impl<C, R> Default for FeatureBindings<C, R> {
    fn default() -> Self {
        Self {
            bindings: Arc::from(Vec::new()),
        }
    }
}

impl<C, R> fmt::Debug for FeatureBindings<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| b.name))
            .finish()
    }
}

impl<C: 'static, R: Send + 'static> FeatureBindings<C, R> {
    #[must_use]
    pub fn builder() -> FeatureBindingsBuilder<C, R> {
        FeatureBindingsBuilder::default()
    }

    /// Bind `id`: the first matching factory runs with `component`.
    pub fn init(&self, component: &C, id: &RouteId) -> FeatureEvent<R> {
        let Some(binding) = self.bindings.iter().find(|b| (b.matches)(id)) else {
            tracing::debug!(route = ?id, "no feature binding matched");
            return FeatureEvent::MissingBinding;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (binding.factory)(component, id)));
        match outcome {
            Ok(Ok(feature)) => {
                tracing::debug!(route = ?id, binding = binding.name, "feature bound");
                FeatureEvent::Init(feature)
            }
            Ok(Err(error)) => {
                tracing::debug!(route = ?id, binding = binding.name, %error, "feature init failed");
                FeatureEvent::Failure(Arc::new(error))
            }
            Err(payload) => {
                let error = FeatureError::from_panic(payload.as_ref());
                tracing::debug!(route = ?id, binding = binding.name, %error, "feature factory panicked");
                FeatureEvent::Failure(Arc::new(error))
            }
        }
    }
}

impl<C, R> FeatureBindings<C, R> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
