#![forbid(unsafe_code)]

//! Ordered stack of live destinations and the events that changing it
//! implies.
//!
//! Every mutation returns a [`BackStackChange`] describing which
//! destinations left, which arrived, and how the top (the visible
//! destination) moved. [`BackStackChange::into_events`] turns it into the
//! event sequence a [`NavigationStore`](crate::store::NavigationStore)
//! expects.
//!
//! # Invariants
//!
//! 1. Entries are unique by instance id.
//! 2. Removals are reported in reverse stack order (top first), before any
//!    additions, which are reported bottom to top.
//! 3. `hidden` and `visible` are only set when the top entry changed.

use ahash::AHashSet;

use crate::event::{LifecycleEvent, NavigationEvent, VisibilityEvent};
use crate::route::{RouteId, RouteKey};

/// Destinations in back-stack order; the last entry is on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackStack {
    entries: Vec<RouteId>,
}

/// The difference between two back-stack states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackStackChange {
    /// Destinations that left, top first.
    pub removed: Vec<RouteId>,
    /// Destinations that arrived, bottom first.
    pub added: Vec<RouteId>,
    /// The previous top, if the top changed.
    pub hidden: Option<RouteId>,
    /// The new top, if the top changed.
    pub visible: Option<RouteId>,
}

impl BackStackChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.added.is_empty()
            && self.hidden.is_none()
            && self.visible.is_none()
    }

    /// Removed events (without last outputs) followed by Added events.
    #[must_use]
    pub fn lifecycle_events<R>(&self) -> Vec<LifecycleEvent<R>> {
        self.removed
            .iter()
            .cloned()
            .map(LifecycleEvent::removed)
            .chain(self.added.iter().cloned().map(LifecycleEvent::Added))
            .collect()
    }

    /// Hidden for the old top, then Visible for the new top.
    #[must_use]
    pub fn visibility_changes(&self) -> Vec<VisibilityEvent> {
        self.hidden
            .iter()
            .cloned()
            .map(VisibilityEvent::Hidden)
            .chain(self.visible.iter().cloned().map(VisibilityEvent::Visible))
            .collect()
    }

    /// Full event sequence: the old top is hidden while it is still active,
    /// lifecycle events follow, and the new top is shown once it exists.
    #[must_use]
    pub fn into_events<R>(self) -> Vec<NavigationEvent<R>> {
        let mut events = Vec::with_capacity(self.removed.len() + self.added.len() + 2);
        if let Some(id) = self.hidden {
            events.push(VisibilityEvent::Hidden(id).into());
        }
        events.extend(
            self.removed
                .into_iter()
                .map(|id| LifecycleEvent::removed(id).into()),
        );
        events.extend(
            self.added
                .into_iter()
                .map(|id| LifecycleEvent::Added(id).into()),
        );
        if let Some(id) = self.visible {
            events.push(VisibilityEvent::Visible(id).into());
        }
        events
    }
}

impl BackStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fresh destination for `key`.
    pub fn push<K: RouteKey>(&mut self, key: K) -> BackStackChange {
        self.push_id(RouteId::new(key))
    }

    /// Push `id`. Pushing an id that is already on the stack moves it to
    /// the top.
    pub fn push_id(&mut self, id: RouteId) -> BackStackChange {
        let mut next = self.entries.clone();
        next.retain(|entry| entry != &id);
        next.push(id);
        self.reconcile(next)
    }

    /// Remove the top destination. Empty stacks produce an empty change.
    pub fn pop(&mut self) -> BackStackChange {
        let mut next = self.entries.clone();
        next.pop();
        self.reconcile(next)
    }

    /// Replace the top destination with a fresh one for `key`.
    pub fn replace_top<K: RouteKey>(&mut self, key: K) -> BackStackChange {
        let mut next = self.entries.clone();
        next.pop();
        next.push(RouteId::new(key));
        self.reconcile(next)
    }

    pub fn clear(&mut self) -> BackStackChange {
        self.reconcile(Vec::new())
    }

    /// Replace the whole stack. Duplicate ids in `entries` keep their first
    /// position.
    pub fn reconcile(&mut self, entries: Vec<RouteId>) -> BackStackChange {
        let mut seen = AHashSet::with_capacity(entries.len());
        let next: Vec<RouteId> = entries
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let previous: AHashSet<&RouteId> = self.entries.iter().collect();
        let added = next
            .iter()
            .filter(|id| !previous.contains(id))
            .cloned()
            .collect();
        let removed = self
            .entries
            .iter()
            .rev()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();

        let (hidden, visible) = if self.entries.last() == next.last() {
            (None, None)
        } else {
            (self.entries.last().cloned(), next.last().cloned())
        };

        tracing::trace!(
            from = self.entries.len(),
            to = next.len(),
            "back stack reconciled"
        );
        self.entries = next;
        BackStackChange {
            removed,
            added,
            hidden,
            visible,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[RouteId] {
        &self.entries
    }

    #[must_use]
    pub fn top(&self) -> Option<&RouteId> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &RouteId) -> bool {
        self.entries.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[NavigationEvent<()>]) -> Vec<String> {
        events
            .iter()
            .map(|event| match event {
                NavigationEvent::Lifecycle(LifecycleEvent::Added(id)) => {
                    format!("added {:?}", id.key_as::<&str>().copied().unwrap_or("?"))
                }
                NavigationEvent::Lifecycle(LifecycleEvent::Removed { id, .. }) => {
                    format!("removed {:?}", id.key_as::<&str>().copied().unwrap_or("?"))
                }
                NavigationEvent::Visibility(VisibilityEvent::Visible(id)) => {
                    format!("visible {:?}", id.key_as::<&str>().copied().unwrap_or("?"))
                }
                NavigationEvent::Visibility(VisibilityEvent::Hidden(id)) => {
                    format!("hidden {:?}", id.key_as::<&str>().copied().unwrap_or("?"))
                }
            })
            .collect()
    }

    #[test]
    fn push_adds_and_moves_visibility() {
        let mut stack = BackStack::new();
        let first = stack.push("list");
        assert_eq!(kinds(&first.into_events()), ["added \"list\"", "visible \"list\""]);

        let second = stack.push("detail");
        assert_eq!(
            kinds(&second.into_events()),
            ["hidden \"list\"", "added \"detail\"", "visible \"detail\""]
        );
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.top().and_then(|id| id.key_as::<&str>()), Some(&"detail"));
    }

    #[test]
    fn pop_hides_before_removing() {
        let mut stack = BackStack::new();
        stack.push("list");
        stack.push("detail");
        let change = stack.pop();
        assert_eq!(
            kinds(&change.into_events()),
            ["hidden \"detail\"", "removed \"detail\"", "visible \"list\""]
        );
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn pop_on_empty_is_a_no_op() {
        let mut stack = BackStack::new();
        assert!(stack.pop().is_empty());
    }

    #[test]
    fn removals_are_reported_top_first() {
        let mut stack = BackStack::new();
        stack.push("a");
        stack.push("b");
        stack.push("c");
        let change = stack.clear();
        let removed: Vec<_> = change
            .removed
            .iter()
            .filter_map(|id| id.key_as::<&str>().copied())
            .collect();
        assert_eq!(removed, ["c", "b", "a"]);
        assert_eq!(change.visible, None);
        assert!(stack.is_empty());
    }

    #[test]
    fn reconcile_keeps_surviving_entries() {
        let mut stack = BackStack::new();
        stack.push("a");
        stack.push("b");
        let a = stack.entries()[0].clone();
        let c = RouteId::new("c");
        let change = stack.reconcile(vec![a.clone(), c.clone(), a.clone()]);
        assert_eq!(change.added, vec![c.clone()]);
        assert_eq!(change.removed.len(), 1);
        assert_eq!(change.hidden.as_ref().and_then(|id| id.key_as::<&str>()), Some(&"b"));
        assert_eq!(change.visible, Some(c.clone()));
        assert_eq!(stack.entries(), &[a, c]);
    }

    #[test]
    fn replace_top_swaps_instances_of_equal_keys() {
        let mut stack = BackStack::new();
        stack.push("detail");
        let old = stack.top().cloned();
        let change = stack.replace_top("detail");
        assert_eq!(change.removed.first(), old.as_ref());
        assert_eq!(change.added.len(), 1);
        assert_ne!(stack.top(), old.as_ref());
    }

    #[test]
    fn push_existing_id_moves_it_to_top() {
        let mut stack = BackStack::new();
        stack.push("a");
        stack.push("b");
        let a = stack.entries()[0].clone();
        let change = stack.push_id(a.clone());
        assert!(change.added.is_empty());
        assert!(change.removed.is_empty());
        assert_eq!(change.visible, Some(a.clone()));
        assert_eq!(stack.top(), Some(&a));
        assert!(stack.contains(&a));
    }

    #[test]
    fn lifecycle_and_visibility_split() {
        let mut stack = BackStack::new();
        stack.push("a");
        let change = stack.push("b");
        let lifecycle = change.lifecycle_events::<()>();
        assert_eq!(lifecycle.len(), 1);
        assert!(matches!(lifecycle[0], LifecycleEvent::Added(_)));
        let visibility = change.visibility_changes();
        assert!(matches!(visibility[0], VisibilityEvent::Hidden(_)));
        assert!(matches!(visibility[1], VisibilityEvent::Visible(_)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn pool() -> Vec<RouteId> {
            (0..6_u32).map(RouteId::new).collect()
        }

        proptest! {
            #[test]
            fn change_replays_previous_into_next(
                before in proptest::collection::vec(0..6_usize, 0..8),
                after in proptest::collection::vec(0..6_usize, 0..8),
            ) {
                let ids = pool();
                let mut stack = BackStack::new();
                stack.reconcile(before.iter().map(|&i| ids[i].clone()).collect());
                let previous = stack.entries().to_vec();

                let change = stack.reconcile(after.iter().map(|&i| ids[i].clone()).collect());

                let mut replayed: Vec<RouteId> = previous
                    .iter()
                    .filter(|id| !change.removed.contains(id))
                    .cloned()
                    .collect();
                replayed.extend(change.added.iter().cloned());
                let mut expected = stack.entries().to_vec();
                let by_instance =
                    |a: &RouteId, b: &RouteId| a.instance_id().as_str().cmp(b.instance_id().as_str());
                replayed.sort_by(by_instance);
                expected.sort_by(by_instance);
                prop_assert_eq!(replayed, expected);

                prop_assert!(change.added.iter().all(|id| !change.removed.contains(id)));
                let entries = stack.entries();
                prop_assert!(entries.iter().enumerate().all(|(i, id)| !entries[..i].contains(id)));
                if change.visible.is_some() || change.hidden.is_some() {
                    prop_assert_ne!(previous.last(), stack.top());
                    prop_assert_eq!(change.visible.as_ref(), stack.top());
                } else {
                    prop_assert_eq!(previous.last(), stack.top());
                }
            }
        }
    }
}
