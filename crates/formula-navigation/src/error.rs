#![forbid(unsafe_code)]

//! Errors raised by the navigation layer.
//!
//! [`BindingError`] is a configuration mistake and is returned from
//! [`FeatureBindingsBuilder::build`](crate::binding::FeatureBindingsBuilder::build).
//! [`FeatureError`] describes a single destination failing; it never
//! escapes the store, it is attached to that destination and reported to
//! the [`NavigationEnvironment`](crate::environment::NavigationEnvironment).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeatureError>;

/// A destination's feature could not be produced or stopped producing.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature initialization failed: {0}")]
    Init(String),

    #[error("feature factory panicked: {0}")]
    Panicked(String),

    #[error("feature state failed: {0}")]
    Runtime(String),

    #[error("no feature binding matches destination {type_name}")]
    MissingBinding { type_name: &'static str },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl FeatureError {
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked(message)
    }
}

/// Binding registration rejected at build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("destination type {type_name} is bound more than once")]
    DuplicateBinding { type_name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(
            FeatureError::from_panic(payload.as_ref()).to_string(),
            "feature factory panicked: boom"
        );
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert!(matches!(
            FeatureError::from_panic(payload.as_ref()),
            FeatureError::Panicked(msg) if msg == "owned"
        ));
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert!(
            FeatureError::from_panic(payload.as_ref())
                .to_string()
                .contains("non-string")
        );
    }

    #[test]
    fn boxed_errors_convert() {
        let io = std::io::Error::other("disk gone");
        let err: FeatureError = FeatureError::from(Box::new(io) as Box<dyn std::error::Error + Send + Sync>);
        assert_eq!(err.to_string(), "disk gone");
    }
}
