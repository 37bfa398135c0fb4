#![forbid(unsafe_code)]

//! Runtime configuration.

use std::fmt;
use std::sync::Arc;

use crate::inspector::{Inspector, TracingInspector};

/// Configuration for a [`FormulaRuntime`](crate::FormulaRuntime).
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Fail loudly on duplicate keys and re-evaluate every formula to
    /// check that `evaluate` is deterministic.
    /// Default: on in debug builds, off in release builds.
    pub validation: bool,

    /// Panic when `on_input`/`terminate` are called from a thread other
    /// than the one that created the runtime.
    /// Default: true.
    pub thread_confinement: bool,

    /// Skip delivering an output equal to the previously delivered one.
    /// Default: true.
    pub dedupe_outputs: bool,

    /// Observability hooks. Default: none.
    pub inspector: Option<Arc<dyn Inspector>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            thread_confinement: true,
            dedupe_outputs: true,
            inspector: None,
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("validation", &self.validation)
            .field("thread_confinement", &self.thread_confinement)
            .field("dedupe_outputs", &self.dedupe_outputs)
            .field("inspector", &self.inspector.is_some())
            .finish()
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FORMULA_VALIDATION`, `FORMULA_THREAD_CHECKS`
    /// and `FORMULA_TRACE` (`1`/`true`/`0`/`false`). `FORMULA_TRACE` installs
    /// a [`TracingInspector`].
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(on) = env_flag("FORMULA_VALIDATION") {
            config.validation = on;
        }
        if let Some(on) = env_flag("FORMULA_THREAD_CHECKS") {
            config.thread_confinement = on;
        }
        if env_flag("FORMULA_TRACE") == Some(true) {
            config.inspector = Some(Arc::new(TracingInspector));
        }
        config
    }

    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_thread_confinement(mut self, confined: bool) -> Self {
        self.thread_confinement = confined;
        self
    }

    #[must_use]
    pub fn with_dedupe_outputs(mut self, dedupe: bool) -> Self {
        self.dedupe_outputs = dedupe;
        self
    }

    #[must_use]
    pub fn with_inspector(mut self, inspector: Arc<dyn Inspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    parse_flag(&std::env::var(name).ok()?)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(value = other, "ignoring unrecognised boolean flag");
            None
        }
    }
}
