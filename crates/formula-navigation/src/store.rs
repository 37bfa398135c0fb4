#![forbid(unsafe_code)]

//! Host-facing navigation store.
//!
//! [`NavigationStore`] runs a [`NavigationStoreFormula`] on a
//! [`FormulaRuntime`] and exposes three surfaces:
//!
//! - event input (`on_lifecycle_event`, `on_visibility_changed`, `apply`),
//!   callable from any thread and serialized by the runtime;
//! - a lock-free latest snapshot (`state`, `render_model`, `render`);
//! - subscriptions delivered on a caller-chosen [`Executor`] with
//!   latest-value collapsing.
//!
//! # Invariants
//!
//! 1. Published snapshots carry strictly increasing versions.
//! 2. A subscriber never sees a version older than one it already saw.
//! 3. After `dispose`, no further snapshots are published.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwap;
use formula_core::{Cancelable, Relay};
use formula_runtime::{Executor, FormulaRuntime, LatestValueScheduler, RuntimeConfig};

use crate::backstack::BackStackChange;
use crate::binding::FeatureBindings;
use crate::environment::NavigationEnvironment;
use crate::event::{LifecycleEvent, NavigationEvent, VisibilityEvent};
use crate::route::RouteId;
use crate::state::{NavigationState, RenderModel};
use crate::store_formula::NavigationStoreFormula;

struct Published<R> {
    version: u64,
    state: Arc<NavigationState<R>>,
}

type Subscribers<R> = Mutex<Vec<(u64, LatestValueScheduler<Arc<Published<R>>>)>>;

struct Shared<R> {
    latest: ArcSwap<Published<R>>,
    subscribers: Subscribers<R>,
    next_subscriber: AtomicU64,
}

impl<R: RenderModel> Shared<R> {
    fn publish(&self, version: u64, state: NavigationState<R>) {
        let published = Arc::new(Published {
            version,
            state: Arc::new(state),
        });
        self.latest.store(Arc::clone(&published));
        // Dispatch outside the lock so a subscriber may (un)subscribe.
        let subscribers: Vec<_> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, scheduler)| scheduler.clone())
            .collect();
        tracing::trace!(version, subscribers = subscribers.len(), "navigation state published");
        for scheduler in subscribers {
            scheduler.dispatch(Arc::clone(&published));
        }
    }
}

/// Reconciles platform navigation events into per-destination feature
/// state.
pub struct NavigationStore<C: Send + Sync + 'static, R: RenderModel> {
    runtime: FormulaRuntime<NavigationStoreFormula<C, R>>,
    events: Relay<NavigationEvent<R>>,
    shared: Arc<Shared<R>>,
}

/// Configures a [`NavigationStore`].
pub struct NavigationStoreBuilder<C, R> {
    component: Arc<C>,
    bindings: FeatureBindings<C, R>,
    environment: NavigationEnvironment,
    config: RuntimeConfig,
}

impl<C, R> fmt::Debug for NavigationStoreBuilder<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationStoreBuilder")
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C, R> NavigationStoreBuilder<C, R>
where
    C: Send + Sync + 'static,
    R: RenderModel,
{
    #[must_use]
    pub fn bindings(mut self, bindings: FeatureBindings<C, R>) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: NavigationEnvironment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the store. The calling thread becomes the store's owner for
    /// thread-confined operations.
    pub fn build(self) -> NavigationStore<C, R> {
        let events = Relay::new();
        let shared = Arc::new(Shared {
            latest: ArcSwap::from_pointee(Published {
                version: 0,
                state: Arc::new(NavigationState::default()),
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
        });

        let formula = NavigationStoreFormula::new(
            self.component,
            self.bindings,
            events.clone(),
            self.environment,
        );
        let sink = Arc::clone(&shared);
        let mut version = 0_u64;
        let runtime = FormulaRuntime::new(formula, self.config, move |state| {
            version += 1;
            sink.publish(version, state);
        });
        // The first evaluation subscribes to `events`; nothing is lost
        // after this returns.
        runtime.on_input(());
        tracing::debug!("navigation store started");

        NavigationStore {
            runtime,
            events,
            shared,
        }
    }
}

impl<C, R> NavigationStore<C, R>
where
    C: Send + Sync + 'static,
    R: RenderModel,
{
    pub fn builder(component: C) -> NavigationStoreBuilder<C, R> {
        Self::builder_shared(Arc::new(component))
    }

    /// Like [`builder`](Self::builder) for a component that is already
    /// shared with the host.
    pub fn builder_shared(component: Arc<C>) -> NavigationStoreBuilder<C, R> {
        NavigationStoreBuilder {
            component,
            bindings: FeatureBindings::default(),
            environment: NavigationEnvironment::default(),
            config: RuntimeConfig::default(),
        }
    }

    /// Report a destination attach/detach. Safe from any thread.
    pub fn on_lifecycle_event(&self, event: LifecycleEvent<R>) {
        self.events.accept(event.into());
    }

    /// Report a visibility change. Safe from any thread.
    pub fn on_visibility_changed(&self, event: VisibilityEvent) {
        self.events.accept(event.into());
    }

    /// Feed a back-stack change. Removed events carry the destination's
    /// last output as currently known.
    pub fn apply(&self, change: BackStackChange) {
        let state = self.state();
        for event in change.into_events::<R>() {
            let event = match event {
                NavigationEvent::Lifecycle(LifecycleEvent::Removed { id, .. }) => {
                    let last_output = state.output(&id).map(|output| output.render_model.clone());
                    LifecycleEvent::Removed { id, last_output }.into()
                }
                other => other,
            };
            self.events.accept(event);
        }
    }

    /// Latest reconciled state.
    #[must_use]
    pub fn state(&self) -> Arc<NavigationState<R>> {
        Arc::clone(&self.shared.latest.load().state)
    }

    /// Render model of `id`, if it is active, visible, and has produced one.
    #[must_use]
    pub fn render_model(&self, id: &RouteId) -> Option<R> {
        let state = self.state();
        if !state.is_visible(id) {
            return None;
        }
        state.output(id).map(|output| output.render_model.clone())
    }

    /// Hand `id`'s latest model to its feature's view factory. Returns
    /// whether anything was rendered.
    pub fn render(&self, id: &RouteId) -> bool {
        let state = self.state();
        if !state.is_visible(id) {
            return false;
        }
        let Some(output) = state.output(id) else {
            return false;
        };
        let Some(view_factory) = state
            .feature(id)
            .and_then(|feature| feature.feature())
            .and_then(|feature| feature.view_factory())
        else {
            return false;
        };
        view_factory.render(&output.render_model);
        true
    }

    /// Deliver every new state to `callback` on `executor`. Bursts collapse
    /// to the latest state. The current state is delivered right away if
    /// one has been published. Cancel the returned handle to unsubscribe.
    pub fn subscribe(
        &self,
        executor: Arc<dyn Executor>,
        mut callback: impl FnMut(Arc<NavigationState<R>>) + Send + 'static,
    ) -> Cancelable {
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Shared<R>> = Arc::downgrade(&self.shared);
        let mut seen = 0_u64;
        let scheduler = LatestValueScheduler::new(executor, move |offered: Arc<Published<R>>| {
            // The offered snapshot may be older than what is already
            // published; prefer the newest.
            let newest = match weak.upgrade() {
                Some(shared) => {
                    let current = shared.latest.load_full();
                    if current.version > offered.version { current } else { offered }
                }
                None => offered,
            };
            if newest.version <= seen {
                return;
            }
            seen = newest.version;
            callback(Arc::clone(&newest.state));
        });

        let current = {
            let mut subscribers = self
                .shared
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.push((id, scheduler.clone()));
            self.shared.latest.load_full()
        };
        if current.version > 0 {
            scheduler.dispatch(current);
        }
        tracing::debug!(subscriber = id, "navigation store subscriber added");

        let weak = Arc::downgrade(&self.shared);
        Cancelable::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared
                    .subscribers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(subscriber, _)| *subscriber != id);
                tracing::debug!(subscriber = id, "navigation store subscriber removed");
            }
        })
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every feature and stop publishing. Thread-confined to the
    /// thread that built the store.
    #[track_caller]
    pub fn dispose(&self) {
        self.runtime.terminate();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.runtime.is_terminated()
    }
}

impl<C: Send + Sync + 'static, R: RenderModel> fmt::Debug for NavigationStore<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let published = self.shared.latest.load();
        f.debug_struct("NavigationStore")
            .field("version", &published.version)
            .field("active", &published.state.active_ids.len())
            .field("runtime", &self.runtime)
            .finish()
    }
}
