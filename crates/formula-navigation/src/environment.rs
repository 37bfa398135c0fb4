#![forbid(unsafe_code)]

//! How the store reports destination failures.

use std::fmt;
use std::sync::Arc;

use crate::error::FeatureError;
use crate::route::RouteId;

type ErrorHandler = Arc<dyn Fn(&RouteId, &FeatureError) + Send + Sync>;

/// Collaborators the navigation store calls out to.
///
/// The default handler panics, so a failing binding or feature surfaces
/// where it happened. [`logging`] logs at `error` and keeps going, leaving
/// the failure visible only as a [`FeatureEvent`](crate::FeatureEvent).
///
/// [`logging`]: NavigationEnvironment::logging
#[derive(Clone)]
pub struct NavigationEnvironment {
    on_error: ErrorHandler,
}

impl Default for NavigationEnvironment {
    fn default() -> Self {
        Self::strict()
    }
}

impl fmt::Debug for NavigationEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationEnvironment").finish_non_exhaustive()
    }
}

impl NavigationEnvironment {
    #[must_use]
    pub fn with_error_handler(handler: impl Fn(&RouteId, &FeatureError) + Send + Sync + 'static) -> Self {
        Self {
            on_error: Arc::new(handler),
        }
    }

    /// Panic on the first feature error. Same as the default.
    #[must_use]
    pub fn strict() -> Self {
        Self::with_error_handler(|id, error| {
            panic!("navigation feature error for {id:?}: {error}");
        })
    }

    /// Log feature errors at `error` and keep running.
    #[must_use]
    pub fn logging() -> Self {
        Self::with_error_handler(|id, error| {
            tracing::error!(route = ?id, %error, "navigation feature error");
        })
    }

    pub fn on_error(&self, id: &RouteId, error: &FeatureError) {
        (self.on_error)(id, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn custom_handler_receives_route_and_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let env = NavigationEnvironment::with_error_handler(move |id, error| {
            sink.lock()
                .unwrap()
                .push((id.key_as::<&str>().copied(), error.to_string()));
        });
        env.on_error(&RouteId::new("home"), &FeatureError::Runtime("lost".into()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some("home"), "feature state failed: lost".to_owned())]
        );
    }

    #[test]
    #[should_panic(expected = "navigation feature error")]
    fn strict_panics() {
        NavigationEnvironment::strict().on_error(&RouteId::new("x"), &FeatureError::Init("bad".into()));
    }

    #[test]
    #[should_panic(expected = "feature state failed: oops")]
    fn default_propagates() {
        NavigationEnvironment::default().on_error(&RouteId::new("x"), &FeatureError::Runtime("oops".into()));
    }

    #[tracing_test::traced_test]
    #[test]
    fn logging_logs_error_and_continues() {
        let env = NavigationEnvironment::logging();
        env.on_error(&RouteId::new("x"), &FeatureError::Runtime("oops".into()));
        env.on_error(&RouteId::new("y"), &FeatureError::Runtime("again".into()));
        assert!(logs_contain("navigation feature error"));
        assert!(logs_contain("again"));
    }
}
