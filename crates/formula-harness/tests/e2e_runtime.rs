#![forbid(unsafe_code)]

//! End-to-end runtime scenarios driven through the harness.
//!
//! Validates that:
//! 1. A search formula restarts its request only when the query or a
//!    refresh changes the action key.
//! 2. Results from a superseded request never reach state.
//! 3. Outputs forwarded through a latest-value scheduler reach a UI
//!    executor collapsed to the latest.
//! 4. The tracing inspector reports the action lifecycle with structured
//!    fields.
//! 5. Terminal effects run when the owner is torn down.

use std::sync::{Arc, Mutex};

use formula_harness::{ActionProbe, FormulaTest, FormulaTestExt, ManualExecutor, capture_logs};
use formula_runtime::{
    Action, Evaluation, Formula, FormulaRuntime, Key, LatestValueScheduler, Listener,
    RuntimeConfig, Snapshot, TracingInspector, Transition,
};
use tracing::Level;

// ============================================================================
// Search formula
// ============================================================================

struct Search {
    requests: ActionProbe<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
struct SearchState {
    results: Vec<String>,
    generation: u64,
}

#[derive(Clone, Debug, PartialEq)]
struct SearchOutput {
    query: String,
    results: Vec<String>,
    refresh: Listener<()>,
}

impl Formula for Search {
    type Input = String;
    type State = SearchState;
    type Output = SearchOutput;

    fn initial_state(&self, _query: &String) -> SearchState {
        SearchState::default()
    }

    fn on_input_changed(&self, _old: &String, _new: &String, state: &SearchState) -> SearchState {
        SearchState {
            results: Vec::new(),
            generation: state.generation,
        }
    }

    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<SearchOutput> {
        let query = snapshot.input;
        let state = snapshot.state;
        if !query.is_empty() {
            let key = Key::pair(Key::from(query.clone()), Key::from(state.generation));
            snapshot
                .context
                .run(self.requests.keyed(key), |_, state: &SearchState, results| {
                    Transition::to(SearchState {
                        results,
                        generation: state.generation,
                    })
                });
        }
        let refresh = snapshot.context.callback(|_, state: &SearchState| {
            Transition::to(SearchState {
                results: state.results.clone(),
                generation: state.generation + 1,
            })
        });
        Evaluation::new(SearchOutput {
            query: query.clone(),
            results: state.results.clone(),
            refresh,
        })
    }
}

fn search() -> (Search, ActionProbe<Vec<String>>) {
    let requests = ActionProbe::new("search");
    (
        Search {
            requests: requests.clone(),
        },
        requests,
    )
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

// ============================================================================
// Action keys drive restarts
// ============================================================================

#[test]
fn request_restarts_only_when_its_key_changes() {
    let (formula, requests) = search();
    let test = formula.test("ru".to_owned());
    assert_eq!((requests.starts(), requests.cancels()), (1, 0));

    test.input("ru".to_owned());
    assert_eq!(requests.starts(), 1);

    test.input("rus".to_owned());
    assert_eq!((requests.starts(), requests.cancels()), (2, 1));

    requests.emit(strings(&["rust", "rustc"]));
    assert_eq!(test.output().results, strings(&["rust", "rustc"]));

    test.output().refresh.call();
    assert_eq!((requests.starts(), requests.cancels()), (3, 2));
    assert_eq!(test.output().results, strings(&["rust", "rustc"]));
    assert_eq!(requests.live(), 1);
}

#[test]
fn superseded_results_never_reach_state() {
    let (formula, requests) = search();
    let test = formula.test("a".to_owned());
    test.input(String::new());
    assert_eq!(requests.live(), 0);

    requests.emit(strings(&["stale"]));
    assert!(test.output().results.is_empty());
    assert_eq!(test.output().query, "");
}

// ============================================================================
// Forwarding outputs to a UI executor
// ============================================================================

#[test]
fn ui_sees_the_latest_output_only() {
    let (formula, requests) = search();
    let ui = Arc::new(ManualExecutor::new());
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rendered);
    let scheduler = LatestValueScheduler::new(ui.clone(), move |output: SearchOutput| {
        sink.lock().unwrap().push(output.results);
    });

    let runtime = FormulaRuntime::new(
        formula,
        RuntimeConfig::default().with_validation(true),
        move |output| scheduler.dispatch(output),
    );
    runtime.on_input("q".to_owned());
    requests.emit(strings(&["one"]));
    requests.emit(strings(&["one", "two"]));
    assert!(rendered.lock().unwrap().is_empty());

    assert_eq!(ui.run_pending(), 1);
    assert_eq!(*rendered.lock().unwrap(), vec![strings(&["one", "two"])]);

    runtime.terminate();
    assert_eq!(requests.live(), 0);
}

// ============================================================================
// Inspector logging
// ============================================================================

#[test]
fn tracing_inspector_reports_action_lifecycle() {
    let (formula, requests) = search();
    let config = RuntimeConfig::default()
        .with_validation(true)
        .with_inspector(Arc::new(TracingInspector));

    let ((), events) = capture_logs(|| {
        let test = FormulaTest::with_config(formula, "x".to_owned(), config);
        test.input("xy".to_owned());
        test.dispose();
    });

    let named = |message: &str| {
        events
            .iter()
            .filter(|event| event.message == message)
            .collect::<Vec<_>>()
    };
    let started = named("action started");
    assert_eq!(started.len(), 2);
    assert!(started.iter().all(|event| event.field("formula") == Some("Search")));
    assert!(started.iter().all(|event| event.level == Level::TRACE));
    assert_eq!(named("action finished").len(), 2);
    assert_eq!(named("formula started").len(), 1);
    assert_eq!(named("formula finished").len(), 1);
    assert_eq!(requests.starts(), requests.cancels());
}

// ============================================================================
// Terminal effects
// ============================================================================

/// Declares a terminate hook while `input` is true.
struct Session {
    closed: Arc<Mutex<Vec<&'static str>>>,
}

impl Formula for Session {
    type Input = bool;
    type State = ();
    type Output = bool;

    fn initial_state(&self, _open: &bool) {}

    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<bool> {
        if *snapshot.input {
            let closed = Arc::clone(&self.closed);
            snapshot.context.run(Action::on_terminate(), move |_, _, ()| {
                let closed = Arc::clone(&closed);
                Transition::effects(move || closed.lock().unwrap().push("closed"))
            });
        }
        Evaluation::new(*snapshot.input)
    }
}

#[test]
fn terminate_hook_runs_once_on_teardown() {
    let closed = Arc::new(Mutex::new(Vec::new()));
    let test = Session {
        closed: Arc::clone(&closed),
    }
    .test(true);
    test.input(true);
    assert!(closed.lock().unwrap().is_empty());

    test.input(false);
    assert_eq!(*closed.lock().unwrap(), vec!["closed"]);

    test.input(true);
    test.dispose();
    assert_eq!(*closed.lock().unwrap(), vec!["closed", "closed"]);
}
