#![forbid(unsafe_code)]

//! Property-based invariant tests for action diffing.
//!
//! A formula declares one probe action per key in its input. Random input
//! sequences then add, keep, and drop keys, and a ledger checks:
//!
//! 1. A key declared in consecutive evaluations is started exactly once
//!    and never restarted.
//! 2. A key that stops being declared is cancelled exactly once.
//! 3. At most one subscription per key is live, and it is live exactly
//!    while the key is declared.
//! 4. Events from a live action reach state; events from a dropped action
//!    never do.
//! 5. Disposing the runtime cancels everything still running.

use std::sync::Arc;

use formula_harness::{ActionProbe, FormulaTestExt};
use formula_runtime::{Evaluation, Formula, Snapshot, Transition};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

const SLOTS: usize = 6;

/// Declares `probes[k]` for every `k` in the input, summing what they emit.
struct KeyedActions {
    probes: Arc<Vec<ActionProbe<u32>>>,
}

impl Formula for KeyedActions {
    type Input = Vec<usize>;
    type State = u32;
    type Output = u32;

    fn initial_state(&self, _input: &Vec<usize>) -> u32 {
        0
    }

    fn evaluate(&self, snapshot: Snapshot<'_, Self>) -> Evaluation<u32> {
        for &slot in snapshot.input {
            snapshot.context.run(self.probes[slot].action(), |_, sum, value| {
                Transition::to(sum + value)
            });
        }
        Evaluation::new(*snapshot.state)
    }
}

fn probes() -> Arc<Vec<ActionProbe<u32>>> {
    Arc::new(
        (0..SLOTS)
            .map(|slot| ActionProbe::new(format!("slot-{slot}")))
            .collect(),
    )
}

/// Key sets in declaration order, without duplicates.
fn arb_key_sets() -> impl Strategy<Value = Vec<Vec<usize>>> {
    proptest::collection::vec(proptest::collection::vec(0..SLOTS, 0..=SLOTS), 1..=12).prop_map(
        |sets| {
            sets.into_iter()
                .map(|set| {
                    let mut seen = [false; SLOTS];
                    set.into_iter()
                        .filter(|&slot| !std::mem::replace(&mut seen[slot], true))
                        .collect()
                })
                .collect()
        },
    )
}

/// Expected starts and cancels per slot for a sequence of key sets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Ledger {
    starts: usize,
    cancels: usize,
    declared: bool,
}

fn advance(ledger: &mut [Ledger; SLOTS], set: &[usize]) {
    for (slot, entry) in ledger.iter_mut().enumerate() {
        let declared = set.contains(&slot);
        match (entry.declared, declared) {
            (false, true) => entry.starts += 1,
            (true, false) => entry.cancels += 1,
            _ => {}
        }
        entry.declared = declared;
    }
}

fn check(probes: &[ActionProbe<u32>], ledger: &[Ledger; SLOTS]) {
    for (slot, probe) in probes.iter().enumerate() {
        let expected = ledger[slot];
        assert_eq!(probe.starts(), expected.starts, "starts of slot {slot}");
        assert_eq!(probe.cancels(), expected.cancels, "cancels of slot {slot}");
        assert_eq!(probe.live(), usize::from(expected.declared), "live of slot {slot}");
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Start once, cancel once, at most one live subscription
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn diffing_matches_ledger(sets in arb_key_sets()) {
        let probes = probes();
        let mut ledger = [Ledger::default(); SLOTS];

        let test = KeyedActions { probes: Arc::clone(&probes) }.test(sets[0].clone());
        advance(&mut ledger, &sets[0]);
        check(&probes, &ledger);

        for set in &sets[1..] {
            test.input(set.clone());
            advance(&mut ledger, set);
            check(&probes, &ledger);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Only declared actions drive state
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn only_declared_actions_reach_state(
        sets in arb_key_sets(),
        values in proptest::collection::vec((0..SLOTS, 1u32..100), 1..=8),
    ) {
        let probes = probes();
        let test = KeyedActions { probes: Arc::clone(&probes) }.test(sets[0].clone());
        let mut expected = 0u32;

        for set in &sets {
            test.input(set.clone());
            for &(slot, value) in &values {
                probes[slot].emit(value);
                if set.contains(&slot) {
                    expected += value;
                }
            }
            prop_assert_eq!(test.output(), expected);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Disposal cancels every running action
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dispose_cancels_everything(sets in arb_key_sets()) {
        let probes = probes();
        let test = KeyedActions { probes: Arc::clone(&probes) }.test(sets[0].clone());
        for set in &sets[1..] {
            test.input(set.clone());
        }
        test.dispose();

        prop_assert!(test.is_disposed());
        for probe in probes.iter() {
            prop_assert_eq!(probe.live(), 0);
            prop_assert_eq!(probe.starts(), probe.cancels());
        }
    }
}

#[test]
fn redeclaring_the_same_set_never_restarts() {
    let probes = probes();
    let test = KeyedActions {
        probes: Arc::clone(&probes),
    }
    .test(vec![0, 1]);
    for _ in 0..10 {
        test.input(vec![1, 0]);
        test.input(vec![0, 1]);
    }
    assert_eq!((probes[0].starts(), probes[1].starts()), (1, 1));
    assert_eq!((probes[0].cancels(), probes[1].cancels()), (0, 0));
}
