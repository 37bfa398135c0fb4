#![forbid(unsafe_code)]

//! Observability hooks.
//!
//! An [`Inspector`] sees every lifecycle step the runtime takes. All
//! methods have empty defaults so implementations only override what they
//! need. Hooks run synchronously on the thread currently driving the
//! runtime and must not block.

use std::sync::Arc;

use formula_core::Key;
use web_time::Duration;

use crate::node::NodeId;

pub trait Inspector: Send + Sync {
    /// A node was created and its initial state computed.
    fn on_formula_started(&self, _formula: &'static str, _node: NodeId) {}

    /// A node was torn down.
    fn on_formula_finished(&self, _formula: &'static str, _node: NodeId) {}

    /// `evaluate` finished (`evaluated == true`) or was skipped because
    /// input and state are unchanged (`evaluated == false`).
    fn on_evaluate_finished(
        &self,
        _formula: &'static str,
        _node: NodeId,
        _evaluated: bool,
        _elapsed: Duration,
    ) {
    }

    fn on_action_started(&self, _formula: &'static str, _key: &Key) {}

    fn on_action_finished(&self, _formula: &'static str, _key: &Key) {}

    /// A handler returned a transition.
    fn on_transition(&self, _formula: &'static str, _node: NodeId, _stateful: bool) {}

    fn on_state_changed(&self, _formula: &'static str, _node: NodeId) {}

    /// An event reached a node or handler that no longer exists.
    fn on_event_dropped(&self, _node: NodeId) {}

    /// The runtime began processing one queued update.
    fn on_run_started(&self, _evaluate: bool) {}

    fn on_run_finished(&self) {}
}

/// Forwards every hook to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInspector;

impl Inspector for TracingInspector {
    fn on_formula_started(&self, formula: &'static str, node: NodeId) {
        tracing::debug!(formula, node = node.get(), "formula started");
    }

    fn on_formula_finished(&self, formula: &'static str, node: NodeId) {
        tracing::debug!(formula, node = node.get(), "formula finished");
    }

    fn on_evaluate_finished(
        &self,
        formula: &'static str,
        node: NodeId,
        evaluated: bool,
        elapsed: Duration,
    ) {
        tracing::trace!(
            formula,
            node = node.get(),
            evaluated,
            elapsed_us = elapsed.as_micros() as u64,
            "evaluate"
        );
    }

    fn on_action_started(&self, formula: &'static str, key: &Key) {
        tracing::trace!(formula, key = %key, "action started");
    }

    fn on_action_finished(&self, formula: &'static str, key: &Key) {
        tracing::trace!(formula, key = %key, "action finished");
    }

    fn on_transition(&self, formula: &'static str, node: NodeId, stateful: bool) {
        tracing::trace!(formula, node = node.get(), stateful, "transition");
    }

    fn on_state_changed(&self, formula: &'static str, node: NodeId) {
        tracing::trace!(formula, node = node.get(), "state changed");
    }

    fn on_event_dropped(&self, node: NodeId) {
        tracing::debug!(node = node.get(), "event dropped: target no longer live");
    }

    fn on_run_started(&self, evaluate: bool) {
        tracing::trace!(evaluate, "run started");
    }

    fn on_run_finished(&self) {
        tracing::trace!("run finished");
    }
}

/// Fans every hook out to several inspectors, in order.
#[derive(Default, Clone)]
pub struct ListInspector {
    inspectors: Vec<Arc<dyn Inspector>>,
}

impl ListInspector {
    #[must_use]
    pub fn new(inspectors: Vec<Arc<dyn Inspector>>) -> Self {
        Self { inspectors }
    }

    pub fn push(&mut self, inspector: Arc<dyn Inspector>) {
        self.inspectors.push(inspector);
    }
}

impl Inspector for ListInspector {
    fn on_formula_started(&self, formula: &'static str, node: NodeId) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_formula_started(formula, node));
    }

    fn on_formula_finished(&self, formula: &'static str, node: NodeId) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_formula_finished(formula, node));
    }

    fn on_evaluate_finished(
        &self,
        formula: &'static str,
        node: NodeId,
        evaluated: bool,
        elapsed: Duration,
    ) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_evaluate_finished(formula, node, evaluated, elapsed));
    }

    fn on_action_started(&self, formula: &'static str, key: &Key) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_action_started(formula, key));
    }

    fn on_action_finished(&self, formula: &'static str, key: &Key) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_action_finished(formula, key));
    }

    fn on_transition(&self, formula: &'static str, node: NodeId, stateful: bool) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_transition(formula, node, stateful));
    }

    fn on_state_changed(&self, formula: &'static str, node: NodeId) {
        self.inspectors
            .iter()
            .for_each(|i| i.on_state_changed(formula, node));
    }

    fn on_event_dropped(&self, node: NodeId) {
        self.inspectors.iter().for_each(|i| i.on_event_dropped(node));
    }

    fn on_run_started(&self, evaluate: bool) {
        self.inspectors.iter().for_each(|i| i.on_run_started(evaluate));
    }

    fn on_run_finished(&self) {
        self.inspectors.iter().for_each(|i| i.on_run_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Inspector for Recorder {
        fn on_action_started(&self, formula: &'static str, _key: &Key) {
            self.0.lock().unwrap().push(format!("start {formula}"));
        }
    }

    #[test]
    fn list_inspector_fans_out_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let list = ListInspector::new(vec![first.clone(), second.clone()]);
        list.on_action_started("Demo", &Key::new(1));
        list.on_run_finished();
        assert_eq!(*first.0.lock().unwrap(), vec!["start Demo".to_string()]);
        assert_eq!(*second.0.lock().unwrap(), vec!["start Demo".to_string()]);
    }

    #[tracing_test::traced_test]
    #[test]
    fn tracing_inspector_logs_structured_fields() {
        TracingInspector.on_formula_started("CounterFormula", NodeId::new(3));
        assert!(logs_contain("formula started"));
        assert!(logs_contain("CounterFormula"));
    }
}
