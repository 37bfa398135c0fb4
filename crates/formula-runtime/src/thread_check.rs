#![forbid(unsafe_code)]

//! Thread-confinement assertions for public entry points.

use std::thread::{self, ThreadId};

use formula_core::FormulaError;

/// Records the thread that created an object and asserts that confined
/// operations run on it.
#[derive(Debug, Clone)]
pub struct ThreadChecker {
    owner: ThreadId,
    enabled: bool,
}

impl ThreadChecker {
    /// Confine to the calling thread.
    #[must_use]
    pub fn current(enabled: bool) -> Self {
        Self {
            owner: thread::current().id(),
            enabled,
        }
    }

    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Panic with [`FormulaError::ThreadViolation`] if called off the owner
    /// thread while checks are enabled.
    #[track_caller]
    pub fn check(&self, operation: &'static str) {
        if !self.enabled {
            return;
        }
        let actual = thread::current().id();
        if actual != self.owner {
            FormulaError::ThreadViolation {
                operation,
                expected: self.owner,
                actual,
            }
            .raise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_thread_passes() {
        let checker = ThreadChecker::current(true);
        checker.check("on_input");
        assert!(checker.is_owner_thread());
    }

    #[test]
    fn other_thread_panics() {
        let checker = ThreadChecker::current(true);
        let result = thread::spawn(move || checker.check("on_input")).join();
        assert!(result.is_err());
    }

    #[test]
    fn disabled_checker_allows_any_thread() {
        let checker = ThreadChecker::current(false);
        let result = thread::spawn(move || checker.check("on_input")).join();
        assert!(result.is_ok());
    }
}
