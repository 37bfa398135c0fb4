#![forbid(unsafe_code)]

//! The reconciled navigation snapshot.
//!
//! # Invariants
//!
//! 1. `visible_ids` is a subset of `active_ids`.
//! 2. Every key of `features` and `outputs` is in `active_ids`.
//! 3. Removing a destination purges it from every collection in one step.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::feature::FeatureEvent;
use crate::route::RouteId;

/// Values a destination can render. Implemented for every type meeting the
/// bounds.
pub trait RenderModel: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> RenderModel for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Latest render model of one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOutput<R> {
    pub id: RouteId,
    pub render_model: R,
}

type Map<K, V> = HashMap<K, V, ahash::RandomState>;

/// Active and visible destinations with their features and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState<R> {
    /// Live destinations in the order they were added.
    pub active_ids: Vec<RouteId>,
    /// Destinations currently shown, in the order they became visible.
    pub visible_ids: Vec<RouteId>,
    pub features: Map<RouteId, FeatureEvent<R>>,
    pub outputs: Map<RouteId, FeatureOutput<R>>,
    halted: HashSet<RouteId, ahash::RandomState>,
}

impl<R> Default for NavigationState<R> {
    fn default() -> Self {
        Self {
            active_ids: Vec::new(),
            visible_ids: Vec::new(),
            features: Map::default(),
            outputs: Map::default(),
            halted: HashSet::default(),
        }
    }
}

impl<R> NavigationState<R> {
    #[must_use]
    pub fn is_active(&self, id: &RouteId) -> bool {
        self.active_ids.contains(id)
    }

    #[must_use]
    pub fn is_visible(&self, id: &RouteId) -> bool {
        self.visible_ids.contains(id)
    }

    #[must_use]
    pub fn output(&self, id: &RouteId) -> Option<&FeatureOutput<R>> {
        self.outputs.get(id)
    }

    #[must_use]
    pub fn feature(&self, id: &RouteId) -> Option<&FeatureEvent<R>> {
        self.features.get(id)
    }

    /// Outputs of visible destinations, in visibility order. Destinations
    /// that have not produced a model yet are skipped.
    #[must_use]
    pub fn visible_outputs(&self) -> Vec<&FeatureOutput<R>> {
        self.visible_ids
            .iter()
            .filter_map(|id| self.outputs.get(id))
            .collect()
    }

    /// Whether the destination's state action failed and was stopped.
    #[must_use]
    pub fn is_halted(&self, id: &RouteId) -> bool {
        self.halted.contains(id)
    }

    pub(crate) fn add(&mut self, id: RouteId, feature: FeatureEvent<R>) {
        self.features.insert(id.clone(), feature);
        self.active_ids.push(id);
    }

    pub(crate) fn remove(&mut self, id: &RouteId) {
        self.active_ids.retain(|active| active != id);
        self.visible_ids.retain(|visible| visible != id);
        self.features.remove(id);
        self.outputs.remove(id);
        self.halted.remove(id);
    }

    pub(crate) fn set_visible(&mut self, id: RouteId) {
        self.visible_ids.push(id);
    }

    pub(crate) fn set_hidden(&mut self, id: &RouteId) {
        self.visible_ids.retain(|visible| visible != id);
    }

    pub(crate) fn set_output(&mut self, id: RouteId, render_model: R) {
        self.outputs
            .insert(id.clone(), FeatureOutput { id, render_model });
    }

    pub(crate) fn halt(&mut self, id: RouteId) {
        self.halted.insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_purges_everything() {
        let id = RouteId::new("detail");
        let mut state = NavigationState::<u32>::default();
        state.add(id.clone(), FeatureEvent::MissingBinding);
        state.set_visible(id.clone());
        state.set_output(id.clone(), 3);
        state.halt(id.clone());

        state.remove(&id);
        assert!(!state.is_active(&id));
        assert!(!state.is_visible(&id));
        assert!(state.feature(&id).is_none());
        assert!(state.output(&id).is_none());
        assert!(!state.is_halted(&id));
    }

    #[test]
    fn visible_outputs_follow_visibility_order() {
        let a = RouteId::new("a");
        let b = RouteId::new("b");
        let c = RouteId::new("c");
        let mut state = NavigationState::<&str>::default();
        for id in [&a, &b, &c] {
            state.add(id.clone(), FeatureEvent::MissingBinding);
        }
        state.set_output(a.clone(), "model-a");
        state.set_output(b.clone(), "model-b");
        state.set_visible(b.clone());
        state.set_visible(a.clone());
        state.set_visible(c.clone());

        let models: Vec<_> = state
            .visible_outputs()
            .into_iter()
            .map(|output| output.render_model)
            .collect();
        assert_eq!(models, ["model-b", "model-a"]);

        state.set_hidden(&b);
        assert_eq!(state.visible_ids, vec![a, c]);
    }
}
