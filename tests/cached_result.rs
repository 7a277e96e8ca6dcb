//! Tests for cache lookups without recomputation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dynamic_selectors::compare::same_value_or_empty;
use dynamic_selectors::key::{debug_key, unit_key};
use dynamic_selectors::{RootContext, Selector, SelectorContext, SelectorOptions};

#[derive(Debug, Default)]
struct State {
    letter_by_id: HashMap<u32, char>,
}

fn state(letters: &[(u32, char)]) -> Arc<State> {
    Arc::new(State {
        letter_by_id: letters.iter().copied().collect(),
    })
}

fn letter_selector(runs: Arc<AtomicUsize>) -> Selector<State, u32, Option<char>> {
    Selector::root(
        SelectorOptions::new()
            .name("select_letter")
            .key_fn(debug_key)
            .result_comparator(same_value_or_empty),
        move |ctx: &mut RootContext<State>, id: &u32| {
            runs.fetch_add(1, Ordering::Relaxed);
            Ok(ctx.state().letter_by_id.get(id).copied())
        },
    )
    .unwrap()
}

fn word_selector(select_letter: &Selector<State, u32, Option<char>>) -> Selector<State, Vec<u32>, String> {
    let select_letter = select_letter.clone();
    Selector::derived(
        SelectorOptions::new().name("select_word").key_fn(debug_key),
        move |ctx: &mut SelectorContext<State>, ids: &Vec<u32>| {
            let mut word = String::new();
            for id in ids {
                word.extend(*ctx.select(&select_letter, id)?);
            }
            Ok(word)
        },
    )
    .unwrap()
}

// =============================================================================
// Root selectors
// =============================================================================

#[test]
fn test_lookup_before_first_call() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let state = state(&[(1, 'a')]);

    assert!(!select_letter.has_cached_result(&state, &1));
    assert_eq!(runs.load(Ordering::Relaxed), 0);

    let counters = select_letter.record(&1).unwrap().counters;
    assert_eq!(counters.invoke_count, 1);
    assert_eq!(counters.aborted_run_count, 1);
    assert_eq!(counters.run_count(), 0);
}

#[test]
fn test_lookup_after_call_with_same_state() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let state = state(&[(1, 'a')]);

    select_letter.select(&state, &1).unwrap();
    assert!(select_letter.has_cached_result(&state, &1));
    assert!(!select_letter.has_cached_result(&state, &2));
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn test_lookup_with_new_state_leaves_record_alone() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let first = select_letter.select(&state(&[(1, 'a')]), &1).unwrap();

    // Same contents, new state: a root selector would have to run to know
    let state2 = state(&[(1, 'a')]);
    assert!(!select_letter.has_cached_result(&state2, &1));
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    let record = select_letter.record(&1).unwrap();
    assert!(Arc::ptr_eq(record.return_value.as_ref().unwrap(), &first));
    assert_eq!(record.counters.full_run_count, 1);
    assert_eq!(record.counters.aborted_run_count, 1);

    // A real call afterwards still works normally
    let second = select_letter.select(&state2, &1).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(select_letter.record(&1).unwrap().counters.phantom_run_count, 1);
}

// =============================================================================
// Derived selectors
// =============================================================================

#[test]
fn test_derived_lookup_does_not_rerun_dependencies() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let select_word = word_selector(&select_letter);

    let state1 = state(&[(1, 'a'), (2, 'b')]);
    let word = select_word.select(&state1, &vec![1, 2]).unwrap();
    assert!(select_word.has_cached_result(&state1, &vec![1, 2]));

    let state2 = state(&[(1, 'a'), (2, 'b')]);
    assert!(!select_word.has_cached_result(&state2, &vec![1, 2]));
    assert_eq!(runs.load(Ordering::Relaxed), 2);

    let record = select_word.record(&vec![1, 2]).unwrap();
    assert!(Arc::ptr_eq(record.return_value.as_ref().unwrap(), &word));
    assert_eq!(record.counters.aborted_run_count, 1);
    assert_eq!(record.counters.full_run_count, 1);
}

#[test]
fn test_derived_lookup_after_dependencies_are_fresh() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let select_word = word_selector(&select_letter);

    let state1 = state(&[(1, 'a'), (2, 'b')]);
    select_word.select(&state1, &vec![1, 2]).unwrap();

    // Bring the letters up to date first; the word can then be answered
    // from its recorded dependencies alone.
    let state2 = state(&[(1, 'a'), (2, 'b'), (3, 'c')]);
    select_letter.select(&state2, &1).unwrap();
    select_letter.select(&state2, &2).unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 4);

    assert!(select_word.has_cached_result(&state2, &vec![1, 2]));
    assert!(select_word.has_cached_result(&state2, &vec![1, 2]));
    assert_eq!(runs.load(Ordering::Relaxed), 4);

    let counters = select_word.record(&vec![1, 2]).unwrap().counters;
    assert_eq!(counters.skipped_run_count, 2);
    assert_eq!(counters.full_run_count, 1);
}

#[test]
fn test_lookup_inside_a_transform_is_not_a_dependency() {
    let runs = Arc::new(AtomicUsize::new(0));
    let select_letter = letter_selector(runs.clone());
    let letter = select_letter.clone();
    let select_is_warm = Selector::derived(
        SelectorOptions::new().name("select_is_warm").key_fn(unit_key),
        move |ctx: &mut SelectorContext<State>, _: &()| Ok(ctx.has_cached_result(&letter, &1)),
    )
    .unwrap();

    let state1 = state(&[(1, 'a')]);
    assert!(!*select_is_warm.select(&state1, &()).unwrap());
    assert_eq!(runs.load(Ordering::Relaxed), 0);

    let record = select_is_warm.record(&()).unwrap();
    assert!(record.own_dependencies.is_empty());
    assert!(record.root_dependencies.is_empty());
}
