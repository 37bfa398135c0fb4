#![forbid(unsafe_code)]

//! Node identity and the type-erased plumbing that routes events to nodes.
//!
//! Every formula instance in a running tree is a node with a [`NodeId`]
//! allocated from a monotonically increasing counter. Ids are never reused,
//! so an event addressed to a node that has since been removed finds no
//! target and is dropped.
//!
//! Events travel as [`NodeEvent`]s: the target id plus a boxed closure that
//! downcasts the node to its concrete manager type and applies the handler.
//! The closure returns a [`Delivery`] describing what happened.

use std::any::Any;
use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use formula_core::{Effects, Key};

use crate::config::RuntimeConfig;
use crate::inspector::Inspector;

/// Identity of one formula instance inside a running tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of applying one event at its target node.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// The handler or action instance is gone; nothing happened.
    Stale,
    Applied {
        state_changed: bool,
        effects: Effects,
    },
}

impl Delivery {
    pub(crate) fn state_changed(&self) -> bool {
        matches!(
            self,
            Self::Applied {
                state_changed: true,
                ..
            }
        )
    }
}

type DeliverFn = Box<dyn FnOnce(&mut dyn Any, &Env) -> Delivery + Send>;

/// An event on its way to a node.
pub(crate) struct NodeEvent {
    pub(crate) node: NodeId,
    pub(crate) deliver: DeliverFn,
}

impl NodeEvent {
    pub(crate) fn new(
        node: NodeId,
        deliver: impl FnOnce(&mut dyn Any, &Env) -> Delivery + Send + 'static,
    ) -> Self {
        Self {
            node,
            deliver: Box::new(deliver),
        }
    }
}

impl fmt::Debug for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEvent").field("node", &self.node).finish()
    }
}

/// Receiver of events produced by actions and listeners. Implemented by the
/// root runtime; nodes hold it weakly so a dropped runtime silently stops
/// accepting events.
pub(crate) trait EventSink: Send + Sync {
    fn submit_event(&self, event: NodeEvent);
}

/// Per-runtime environment shared by every node in the tree.
pub(crate) struct Env {
    pub(crate) config: RuntimeConfig,
    pub(crate) sink: Weak<dyn EventSink>,
    next_node: AtomicU64,
    next_instance: AtomicU64,
}

impl Env {
    pub(crate) fn new(config: RuntimeConfig, sink: Weak<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            next_node: AtomicU64::new(1),
            next_instance: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    /// Unique id for one running action instance.
    pub(crate) fn next_instance_id(&self) -> u64 {
        self.next_instance.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn inspect(&self, hook: impl FnOnce(&dyn Inspector)) {
        if let Some(inspector) = &self.config.inspector {
            hook(inspector.as_ref());
        }
    }

    /// Report a duplicate key. Fatal under validation; otherwise logged and
    /// the later declaration is ignored.
    #[track_caller]
    pub(crate) fn duplicate_key(
        &self,
        scope: formula_core::KeyScope,
        key: &Key,
        formula: &'static str,
    ) {
        let error = formula_core::FormulaError::DuplicateKey {
            scope,
            key: key.clone(),
            formula,
        };
        if self.config.validation {
            error.raise();
        }
        tracing::error!(%error, "ignoring duplicate declaration");
    }
}

/// Object-safe view of a formula node used for children and routing.
pub(crate) trait ErasedNode: Send {
    fn id(&self) -> NodeId;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Route `event` to its target inside this subtree. Returns the event
    /// back when the target is not here.
    fn deliver(&mut self, event: NodeEvent, env: &Env) -> Result<Delivery, NodeEvent>;

    /// Tear down children and cancel actions that the last evaluation
    /// dropped, recursively.
    fn reconcile_removals(&mut self, env: &Env, effects: &mut Effects);

    /// Start actions that the last evaluation introduced, recursively.
    fn reconcile_starts(&mut self, env: &Env);

    /// Cancel everything in this subtree, children first.
    fn terminate(&mut self, env: &Env, effects: &mut Effects);
}
