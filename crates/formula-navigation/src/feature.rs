#![forbid(unsafe_code)]

//! Features: what a destination runs while it is active.
//!
//! A [`Feature`] pairs a state-producing [`Action`] with an optional
//! [`ViewFactory`]. The store starts the action when the destination is
//! added and cancels it when the destination is removed; every value the
//! action emits replaces the destination's render model.

use std::fmt;
use std::sync::Arc;

use formula_core::{Action, Emitter};

use crate::error::FeatureError;

/// Renders a destination's latest model. Implemented for every
/// `Fn(&R) + Send + Sync`.
pub trait ViewFactory<R>: Send + Sync {
    fn render(&self, model: &R);
}

impl<R, F> ViewFactory<R> for F
where
    F: Fn(&R) + Send + Sync,
{
    fn render(&self, model: &R) {
        self(model)
    }
}

struct FeatureInner<R> {
    state: Action<Result<R, FeatureError>>,
    view_factory: Option<Arc<dyn ViewFactory<R>>>,
}

impl<R> Clone for FeatureInner<R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            view_factory: self.view_factory.clone(),
        }
    }
}

/// A bound destination: state source plus render boundary.
///
/// Equality is identity: two features are equal only if one is a clone
/// of the other.
pub struct Feature<R> {
    inner: Arc<FeatureInner<R>>,
}

impl<R> Clone for Feature<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> PartialEq for Feature<R> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<R> fmt::Debug for Feature<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("state", &self.inner.state)
            .field("has_view_factory", &self.inner.view_factory.is_some())
            .finish()
    }
}

impl<R: Send + 'static> Feature<R> {
    /// Feature whose state action cannot fail.
    pub fn new(state: Action<R>) -> Self {
        Self::fallible(Action::new(move |emitter: Emitter<Result<R, FeatureError>>| {
            state.start(emitter.map(Ok))
        }))
    }

    /// Feature whose state action reports errors in-band. The first `Err`
    /// stops the destination: the action is cancelled and the error is
    /// reported to the store's environment.
    pub fn fallible(state: Action<Result<R, FeatureError>>) -> Self {
        Self {
            inner: Arc::new(FeatureInner {
                state,
                view_factory: None,
            }),
        }
    }

    #[must_use]
    pub fn with_view_factory(self, factory: impl ViewFactory<R> + 'static) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.inner);
        inner.view_factory = Some(Arc::new(factory));
        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Action<Result<R, FeatureError>> {
        &self.inner.state
    }

    #[must_use]
    pub fn view_factory(&self) -> Option<&Arc<dyn ViewFactory<R>>> {
        self.inner.view_factory.as_ref()
    }
}

/// Outcome of binding a destination. Fixed for the destination's lifetime.
pub enum FeatureEvent<R> {
    Init(Feature<R>),
    Failure(Arc<FeatureError>),
    MissingBinding,
}

impl<R> FeatureEvent<R> {
    #[must_use]
    pub fn feature(&self) -> Option<&Feature<R>> {
        match self {
            Self::Init(feature) => Some(feature),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&FeatureError> {
        match self {
            Self::Failure(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init(_))
    }

    #[must_use]
    pub fn is_missing_binding(&self) -> bool {
        matches!(self, Self::MissingBinding)
    }
}

impl<R> Clone for FeatureEvent<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Init(feature) => Self::Init(feature.clone()),
            Self::Failure(error) => Self::Failure(Arc::clone(error)),
            Self::MissingBinding => Self::MissingBinding,
        }
    }
}

impl<R> PartialEq for FeatureEvent<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Init(a), Self::Init(b)) => a == b,
            (Self::Failure(a), Self::Failure(b)) => Arc::ptr_eq(a, b),
            (Self::MissingBinding, Self::MissingBinding) => true,
            _ => false,
        }
    }
}

impl<R> fmt::Debug for FeatureEvent<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(feature) => f.debug_tuple("Init").field(feature).finish(),
            Self::Failure(error) => f.debug_tuple("Failure").field(error).finish(),
            Self::MissingBinding => f.write_str("MissingBinding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn infallible_state_is_wrapped_in_ok() {
        let feature = Feature::new(Action::from_iter(vec!["a", "b"]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        feature.state().start(Emitter::new(move |value: Result<&'static str, FeatureError>| {
            sink.lock().unwrap().push(value.ok());
        }));
        assert_eq!(*seen.lock().unwrap(), vec![Some("a"), Some("b")]);
    }

    #[test]
    fn view_factory_renders_model() {
        let rendered = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&rendered);
        let feature = Feature::new(Action::from_iter(Vec::<u32>::new()))
            .with_view_factory(move |model: &u32| *sink.lock().unwrap() = Some(*model));
        feature
            .view_factory()
            .expect("view factory set")
            .render(&5);
        assert_eq!(*rendered.lock().unwrap(), Some(5));
    }

    #[test]
    fn equality_is_identity() {
        let a = Feature::new(Action::from_iter(vec![1_u8]));
        let b = Feature::new(Action::from_iter(vec![1_u8]));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(FeatureEvent::Init(a.clone()), FeatureEvent::Init(a));
        assert_eq!(
            FeatureEvent::<u8>::MissingBinding,
            FeatureEvent::MissingBinding
        );
    }

    #[test]
    fn event_accessors() {
        let failure: FeatureEvent<u8> =
            FeatureEvent::Failure(Arc::new(FeatureError::Init("bad config".into())));
        assert!(failure.feature().is_none());
        assert!(failure.error().is_some_and(|e| e.to_string().contains("bad config")));
        assert!(!failure.is_init());
        assert!(FeatureEvent::<u8>::MissingBinding.is_missing_binding());
    }
}
