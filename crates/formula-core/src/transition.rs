#![forbid(unsafe_code)]

//! The result of handling one event.
//!
//! A [`Transition`] is produced synchronously by an event handler and says
//! whether the owning formula's state changes and which side effects must
//! run afterwards.
//!
//! # Invariants
//!
//! 1. Effects run strictly after the new state has been committed and the
//!    tree re-evaluated with it.
//! 2. Effects of one transition run in the order they were added.
//! 3. Transitions triggered while another is being applied are queued and
//!    applied later, in emission order.

use std::fmt;

use smallvec::SmallVec;

/// A deferred side effect.
pub type Effect = Box<dyn FnOnce() + Send>;

/// Ordered list of side effects attached to a transition.
#[derive(Default)]
pub struct Effects {
    items: SmallVec<[Effect; 2]>,
}

impl Effects {
    /// No effects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an effect.
    pub fn push(&mut self, effect: impl FnOnce() + Send + 'static) {
        self.items.push(Box::new(effect));
    }

    /// Append every effect from `other`, preserving order.
    pub fn extend(&mut self, other: Effects) {
        self.items.extend(other.items);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run all effects in order, consuming them.
    pub fn execute(self) {
        for effect in self.items {
            effect();
        }
    }
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effects")
            .field("len", &self.items.len())
            .finish()
    }
}

/// Outcome of handling one event for a formula with state `S`.
pub enum Transition<S> {
    /// Nothing changes.
    None,
    /// Commit `state`, then run `effects`.
    Stateful { state: S, effects: Effects },
    /// Keep the current state; run `effects`.
    EffectsOnly(Effects),
}

impl<S> Transition<S> {
    /// No change.
    #[must_use]
    pub fn none() -> Self {
        Self::None
    }

    /// Move to `state`.
    #[must_use]
    pub fn to(state: S) -> Self {
        Self::Stateful {
            state,
            effects: Effects::new(),
        }
    }

    /// Move to `state`, then run `effect`.
    pub fn to_with(state: S, effect: impl FnOnce() + Send + 'static) -> Self {
        Self::to(state).and_then(effect)
    }

    /// Keep the state and run `effect`.
    pub fn effects(effect: impl FnOnce() + Send + 'static) -> Self {
        Self::None.and_then(effect)
    }

    /// Append an effect that runs after those already attached.
    #[must_use]
    pub fn and_then(self, effect: impl FnOnce() + Send + 'static) -> Self {
        match self {
            Self::None => {
                let mut effects = Effects::new();
                effects.push(effect);
                Self::EffectsOnly(effects)
            }
            Self::Stateful { state, mut effects } => {
                effects.push(effect);
                Self::Stateful { state, effects }
            }
            Self::EffectsOnly(mut effects) => {
                effects.push(effect);
                Self::EffectsOnly(effects)
            }
        }
    }

    /// Whether this transition replaces the state.
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::Stateful { .. })
    }

    /// Split into the optional new state and the effects.
    pub fn into_parts(self) -> (Option<S>, Effects) {
        match self {
            Self::None => (None, Effects::new()),
            Self::Stateful { state, effects } => (Some(state), effects),
            Self::EffectsOnly(effects) => (None, effects),
        }
    }
}

impl<S> Default for Transition<S> {
    fn default() -> Self {
        Self::None
    }
}

impl<S: fmt::Debug> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Transition::None"),
            Self::Stateful { state, effects } => f
                .debug_struct("Transition::Stateful")
                .field("state", state)
                .field("effects", &effects.len())
                .finish(),
            Self::EffectsOnly(effects) => f
                .debug_tuple("Transition::EffectsOnly")
                .field(&effects.len())
                .finish(),
        }
    }
}
