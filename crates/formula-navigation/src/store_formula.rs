#![forbid(unsafe_code)]

//! The navigation reconciliation formula.
//!
//! State is a [`NavigationState`]. Two kinds of action are declared on
//! every evaluation:
//!
//! - one subscription to the navigation event [`Relay`], whose events are
//!   reduced into the active/visible sets;
//! - one state action per active destination with an initialized feature,
//!   keyed by the destination id. When a destination is removed it is no
//!   longer declared, and the runtime cancels its action.
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `Added` for an active id | Ignored (debug log) |
//! | `Removed` for an unknown id | Ignored (warn log) |
//! | Visibility event for an inactive id | Ignored (debug log) |
//! | Repeated `Visible`/`Hidden` | Ignored (trace log) |
//! | Factory fails, or no binding | Destination kept with `Failure`/`MissingBinding`; error reported |
//! | State action emits `Err` | Destination halted, last output kept; error reported |
//! | State emitted after removal | Dropped |

use std::fmt;
use std::sync::Arc;

use formula_core::{Action, Key, Relay, Transition};
use formula_runtime::{Evaluation, Formula, Snapshot};

use crate::binding::FeatureBindings;
use crate::environment::NavigationEnvironment;
use crate::error::FeatureError;
use crate::event::{LifecycleEvent, NavigationEvent, VisibilityEvent};
use crate::feature::FeatureEvent;
use crate::route::RouteId;
use crate::state::{NavigationState, RenderModel};

/// Reduces navigation events into a [`NavigationState`] and runs the
/// features of active destinations.
pub struct NavigationStoreFormula<C, R> {
    component: Arc<C>,
    bindings: FeatureBindings<C, R>,
    events: Relay<NavigationEvent<R>>,
    environment: NavigationEnvironment,
}

impl<C, R> Clone for NavigationStoreFormula<C, R> {
    fn clone(&self) -> Self {
        Self {
            component: Arc::clone(&self.component),
            bindings: self.bindings.clone(),
            events: self.events.clone(),
            environment: self.environment.clone(),
        }
    }
}

impl<C, R> fmt::Debug for NavigationStoreFormula<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationStoreFormula")
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl<C, R> NavigationStoreFormula<C, R>
where
    C: Send + Sync + 'static,
    R: RenderModel,
{
    pub fn new(
        component: Arc<C>,
        bindings: FeatureBindings<C, R>,
        events: Relay<NavigationEvent<R>>,
        environment: NavigationEnvironment,
    ) -> Self {
        Self {
            component,
            bindings,
            events,
            environment,
        }
    }

    /// Apply one navigation event.
    fn reduce(
        &self,
        state: &NavigationState<R>,
        event: NavigationEvent<R>,
    ) -> Transition<NavigationState<R>> {
        match event {
            NavigationEvent::Lifecycle(LifecycleEvent::Added(id)) => self.route_added(state, id),
            NavigationEvent::Lifecycle(LifecycleEvent::Removed { id, last_output }) => {
                route_removed(state, &id, last_output.as_ref())
            }
            NavigationEvent::Visibility(VisibilityEvent::Visible(id)) => route_visible(state, id),
            NavigationEvent::Visibility(VisibilityEvent::Hidden(id)) => route_hidden(state, &id),
        }
    }

    fn route_added(&self, state: &NavigationState<R>, id: RouteId) -> Transition<NavigationState<R>> {
        if state.is_active(&id) {
            tracing::debug!(route = ?id, "destination already active; duplicate Added ignored");
            return Transition::none();
        }
        let feature = self.bindings.init(&self.component, &id);
        let report = match &feature {
            FeatureEvent::Init(_) => None,
            FeatureEvent::Failure(error) => Some(Arc::clone(error)),
            FeatureEvent::MissingBinding => Some(Arc::new(FeatureError::MissingBinding {
                type_name: id.key_type_name(),
            })),
        };
        tracing::debug!(route = ?id, bound = feature.is_init(), "destination added");

        let mut next = state.clone();
        next.add(id.clone(), feature);
        match report {
            None => Transition::to(next),
            Some(error) => {
                let environment = self.environment.clone();
                Transition::to_with(next, move || environment.on_error(&id, &error))
            }
        }
    }

    /// Handle one value from `id`'s state action.
    fn feature_output(
        &self,
        state: &NavigationState<R>,
        id: &RouteId,
        result: Result<R, FeatureError>,
    ) -> Transition<NavigationState<R>> {
        if !state.is_active(id) || state.is_halted(id) {
            tracing::trace!(route = ?id, "state for inactive destination dropped");
            return Transition::none();
        }
        match result {
            Ok(render_model) => {
                if state
                    .output(id)
                    .is_some_and(|output| output.render_model == render_model)
                {
                    return Transition::none();
                }
                let mut next = state.clone();
                next.set_output(id.clone(), render_model);
                Transition::to(next)
            }
            Err(error) => {
                tracing::debug!(route = ?id, %error, "feature state failed; destination halted");
                let mut next = state.clone();
                next.halt(id.clone());
                let environment = self.environment.clone();
                let id = id.clone();
                Transition::to_with(next, move || environment.on_error(&id, &error))
            }
        }
    }
}

fn route_removed<R: RenderModel>(
    state: &NavigationState<R>,
    id: &RouteId,
    last_output: Option<&R>,
) -> Transition<NavigationState<R>> {
    if !state.is_active(id) {
        tracing::warn!(route = ?id, "Removed for a destination that is not active");
        return Transition::none();
    }
    tracing::debug!(route = ?id, last_output = ?last_output, "destination removed");
    let mut next = state.clone();
    next.remove(id);
    Transition::to(next)
}

fn route_visible<R: RenderModel>(
    state: &NavigationState<R>,
    id: RouteId,
) -> Transition<NavigationState<R>> {
    if !state.is_active(&id) {
        tracing::warn!(route = ?id, "Visible for an inactive destination ignored");
        return Transition::none();
    }
    if state.is_visible(&id) {
        tracing::trace!(route = ?id, "destination already visible");
        return Transition::none();
    }
    let mut next = state.clone();
    next.set_visible(id);
    Transition::to(next)
}

fn route_hidden<R: RenderModel>(
    state: &NavigationState<R>,
    id: &RouteId,
) -> Transition<NavigationState<R>> {
    if !state.is_active(id) {
        tracing::debug!(route = ?id, "Hidden for an inactive destination ignored");
        return Transition::none();
    }
    if !state.is_visible(id) {
        tracing::trace!(route = ?id, "destination already hidden");
        return Transition::none();
    }
    let mut next = state.clone();
    next.set_hidden(id);
    Transition::to(next)
}

impl<C, R> Formula for NavigationStoreFormula<C, R>
where
    C: Send + Sync + 'static,
    R: RenderModel,
{
    type Input = ();
    type State = NavigationState<R>;
    type Output = NavigationState<R>;

    fn initial_state(&self, _input: &()) -> NavigationState<R> {
        NavigationState::default()
    }

    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<NavigationState<R>> {
        let state = snapshot.state;
        let context = snapshot.context;

        let reducer = self.clone();
        context.run(
            Action::from_stream(self.events.clone()),
            move |_, state, event| reducer.reduce(state, event),
        );

        for id in &state.active_ids {
            let Some(feature) = state.feature(id).and_then(FeatureEvent::feature) else {
                continue;
            };
            if state.is_halted(id) {
                continue;
            }
            let formula = self.clone();
            let route = id.clone();
            context.run(
                feature.state().clone().with_key(Key::new(id.clone())),
                move |_, state, result| formula.feature_output(state, &route, result),
            );
        }

        Evaluation::new(state.clone())
    }

    fn type_name(&self) -> &'static str {
        "NavigationStoreFormula"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use formula_runtime::{FormulaRuntime, RuntimeConfig};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Screen(&'static str);

    type Latest = Arc<Mutex<Option<NavigationState<String>>>>;

    fn start(
        bindings: FeatureBindings<(), String>,
    ) -> (
        FormulaRuntime<NavigationStoreFormula<(), String>>,
        Relay<NavigationEvent<String>>,
        Latest,
    ) {
        let events = Relay::new();
        let formula = NavigationStoreFormula::new(
            Arc::new(()),
            bindings,
            events.clone(),
            NavigationEnvironment::default(),
        );
        let latest: Latest = Arc::default();
        let sink = Arc::clone(&latest);
        let runtime = FormulaRuntime::new(
            formula,
            RuntimeConfig::default().with_validation(true),
            move |state| *sink.lock().unwrap() = Some(state),
        );
        runtime.on_input(());
        (runtime, events, latest)
    }

    fn screen_bindings() -> FeatureBindings<(), String> {
        FeatureBindings::builder()
            .bind::<Screen, _>(|_, screen| {
                Ok(Feature::new(Action::from_iter(vec![format!("{}-ready", screen.0)])))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn added_destination_binds_and_outputs() {
        let (_runtime, events, latest) = start(screen_bindings());
        let id = RouteId::new(Screen("home"));
        events.accept(LifecycleEvent::Added(id.clone()).into());

        let state = latest.lock().unwrap().clone().unwrap();
        assert_eq!(state.active_ids, vec![id.clone()]);
        assert!(state.feature(&id).is_some_and(FeatureEvent::is_init));
        assert_eq!(
            state.output(&id).map(|o| o.render_model.as_str()),
            Some("home-ready")
        );
    }

    #[test]
    fn visibility_requires_active_destination() {
        let (_runtime, events, latest) = start(screen_bindings());
        let id = RouteId::new(Screen("home"));
        events.accept(VisibilityEvent::Visible(id.clone()).into());
        assert!(latest.lock().unwrap().as_ref().unwrap().visible_ids.is_empty());

        events.accept(LifecycleEvent::Added(id.clone()).into());
        events.accept(VisibilityEvent::Visible(id.clone()).into());
        events.accept(VisibilityEvent::Visible(id.clone()).into());
        assert_eq!(latest.lock().unwrap().as_ref().unwrap().visible_ids, vec![id.clone()]);

        events.accept(VisibilityEvent::Hidden(id.clone()).into());
        assert!(latest.lock().unwrap().as_ref().unwrap().visible_ids.is_empty());
    }

    #[test]
    fn removing_cancels_feature_action() {
        let (runtime, events, latest) = start(screen_bindings());
        let id = RouteId::new(Screen("home"));
        events.accept(LifecycleEvent::Added(id.clone()).into());
        assert_eq!(runtime.running_root_actions().map(|keys| keys.len()), Some(2));

        events.accept(LifecycleEvent::removed(id.clone()).into());
        assert_eq!(runtime.running_root_actions().map(|keys| keys.len()), Some(1));
        let state = latest.lock().unwrap().clone().unwrap();
        assert!(state.active_ids.is_empty());
        assert!(state.outputs.is_empty());
        assert!(state.features.is_empty());
    }

    #[test]
    fn missing_binding_is_reported_not_fatal() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let events = Relay::new();
        let formula = NavigationStoreFormula::<(), String>::new(
            Arc::new(()),
            FeatureBindings::default(),
            events.clone(),
            NavigationEnvironment::with_error_handler(move |_, error| {
                sink.lock().unwrap().push(error.to_string());
            }),
        );
        let latest: Latest = Arc::default();
        let out = Arc::clone(&latest);
        let runtime = FormulaRuntime::new(formula, RuntimeConfig::default(), move |state| {
            *out.lock().unwrap() = Some(state);
        });
        runtime.on_input(());

        let id = RouteId::new(Screen("orphan"));
        events.accept(LifecycleEvent::Added(id.clone()).into());
        let state = latest.lock().unwrap().clone().unwrap();
        assert!(state.feature(&id).is_some_and(FeatureEvent::is_missing_binding));
        assert_eq!(reported.lock().unwrap().len(), 1);
        assert!(reported.lock().unwrap()[0].contains("Screen"));
    }
}
