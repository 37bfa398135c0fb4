#![forbid(unsafe_code)]

//! Events the platform reports to the navigation store.

use crate::route::RouteId;

/// A destination attached to or detached from the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent<R> {
    Added(RouteId),
    /// `last_output` is the last render model the platform saw for the
    /// destination, if any.
    Removed { id: RouteId, last_output: Option<R> },
}

impl<R> LifecycleEvent<R> {
    #[must_use]
    pub fn removed(id: RouteId) -> Self {
        Self::Removed {
            id,
            last_output: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &RouteId {
        match self {
            Self::Added(id) | Self::Removed { id, .. } => id,
        }
    }
}

/// A destination became visible to, or hidden from, the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityEvent {
    Visible(RouteId),
    Hidden(RouteId),
}

impl VisibilityEvent {
    #[must_use]
    pub fn id(&self) -> &RouteId {
        match self {
            Self::Visible(id) | Self::Hidden(id) => id,
        }
    }
}

/// Everything the store reduces, in the order it was reported.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent<R> {
    Lifecycle(LifecycleEvent<R>),
    Visibility(VisibilityEvent),
}

impl<R> NavigationEvent<R> {
    #[must_use]
    pub fn id(&self) -> &RouteId {
        match self {
            Self::Lifecycle(event) => event.id(),
            Self::Visibility(event) => event.id(),
        }
    }
}

impl<R> From<LifecycleEvent<R>> for NavigationEvent<R> {
    fn from(event: LifecycleEvent<R>) -> Self {
        Self::Lifecycle(event)
    }
}

impl<R> From<VisibilityEvent> for NavigationEvent<R> {
    fn from(event: VisibilityEvent) -> Self {
        Self::Visibility(event)
    }
}
