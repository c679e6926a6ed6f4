//! A best-first queue of candidate edges whose scores are kept current as the model grows.

use crate::{DecomposableModel, GraphAction, GraphActionScorer, ScoredGraphAction, Variable};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::mem::take;
use tracing::debug;

/// Candidate edges ordered by score, best first.
///
/// Scores go stale whenever the model changes. Rather than rescoring eagerly, stale candidates
/// are collected in a dirty set and rescored together by [`settle`][Self::settle], which may use
/// several threads. Nothing can be polled while the dirty set is non-empty.
///
/// Candidates with equal scores come out lowest pair first, comparing the lower endpoints and
/// then the higher ones.
///
/// Candidates that can't currently be added to the model are parked: they stay tracked but
/// aren't polled until a later change invalidates them and a rescore finds them addable.
#[derive(Debug)]
pub struct CandidateQueue {
    n_variables: usize,
    heap: BinaryHeap<Entry>,
    candidates: HashMap<GraphAction, Candidate>,
    dirty: BTreeSet<GraphAction>,
    scored: usize,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    generation: u32,
    state: State,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Pending,
    Scored,
    Parked,
    Polled,
}

/// A heap entry is only valid while its generation matches its candidate's.
#[derive(Clone, Copy, Debug)]
struct Entry {
    score: f64,
    action: GraphAction,
    generation: u32,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.action.cmp(&self.action))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl CandidateQueue {
    /// Creates an empty queue for edges among `n_variables` variables.
    pub fn new(n_variables: usize) -> Self {
        CandidateQueue {
            n_variables,
            heap: BinaryHeap::new(),
            candidates: HashMap::new(),
            dirty: BTreeSet::new(),
            scored: 0,
        }
    }

    /// Starts tracking `action`, or tracks it again after it was polled. It must be settled
    /// before it can be polled.
    pub fn enable(&mut self, action: GraphAction) {
        assert!(
            (action.b() as usize) < self.n_variables,
            "{:?} is outside a queue over {} variables",
            action,
            self.n_variables
        );
        // Polled candidates keep their generation, so their old heap entries stay stale.
        let candidate = self.candidates.entry(action).or_insert(Candidate {
            generation: 0,
            state: State::Polled,
        });
        if candidate.state == State::Polled {
            candidate.state = State::Parked;
        }
        self.invalidate(action);
    }

    /// Enables the edge between every pair of distinct variables.
    pub fn enable_all(&mut self) {
        let n = self.n_variables as Variable;
        self.candidates.reserve(self.n_variables * self.n_variables.saturating_sub(1) / 2);
        for a in 0..n {
            for b in a + 1..n {
                self.enable(GraphAction::add_edge(a, b));
            }
        }
    }

    /// Marks `action`'s score as stale. Actions that aren't tracked, including ones already
    /// polled, are ignored.
    pub fn invalidate(&mut self, action: GraphAction) {
        if let Some(candidate) = self.candidates.get_mut(&action) {
            if candidate.state == State::Polled {
                return;
            }
            if candidate.state == State::Scored {
                self.scored -= 1;
            }
            candidate.state = State::Pending;
            candidate.generation = candidate.generation.wrapping_add(1);
            self.dirty.insert(action);
        }
    }

    /// Rescores every stale candidate against `model`.
    ///
    /// Scoring is spread across threads, but every score is computed before any is applied,
    /// and they're applied in a fixed order, so the result doesn't depend on scheduling.
    pub fn settle<S>(&mut self, model: &DecomposableModel, scorer: &S)
    where
        S: GraphActionScorer + ?Sized,
    {
        if self.dirty.is_empty() {
            return;
        }

        let batch: Vec<GraphAction> = take(&mut self.dirty).into_iter().collect();
        let scores: Vec<Option<f64>> = batch
            .par_iter()
            .map(|action| scorer.score(model, *action))
            .collect();

        let mut parked = 0;
        for (action, score) in batch.iter().copied().zip(scores) {
            let candidate = match self.candidates.get_mut(&action) {
                Some(candidate) if candidate.state == State::Pending => candidate,
                _ => continue,
            };
            match score {
                Some(score) => {
                    candidate.state = State::Scored;
                    self.scored += 1;
                    self.heap.push(Entry {
                        score,
                        action,
                        generation: candidate.generation,
                    });
                }
                None => {
                    candidate.state = State::Parked;
                    parked += 1;
                }
            }
        }
        debug!(rescored = batch.len(), parked, "settled candidates");

        // Superseded entries are skipped when polled, but don't let them pile up.
        if self.heap.len() > 2 * self.scored + 64 {
            let candidates = &self.candidates;
            self.heap = take(&mut self.heap)
                .into_iter()
                .filter(|entry| is_current(candidates, entry))
                .collect();
        }
    }

    /// Removes and returns the best candidate, or `None` if no candidate can be added.
    ///
    /// # Panics
    ///
    /// Panics if any candidate is stale: the queue must be [settled][Self::settle] after every
    /// change to the model.
    pub fn poll(&mut self) -> Option<ScoredGraphAction> {
        assert!(
            self.dirty.is_empty(),
            "polled with {} stale candidates",
            self.dirty.len()
        );

        while let Some(entry) = self.heap.pop() {
            if is_current(&self.candidates, &entry) {
                if let Some(candidate) = self.candidates.get_mut(&entry.action) {
                    candidate.state = State::Polled;
                }
                self.scored -= 1;
                return Some(ScoredGraphAction {
                    action: entry.action,
                    score: entry.score,
                });
            }
        }
        None
    }

    /// The number of candidates that could be polled right now.
    pub fn len(&self) -> usize {
        self.scored
    }

    /// Returns `true` if no candidate could be polled right now.
    pub fn is_empty(&self) -> bool {
        self.scored == 0
    }

    /// Returns `true` if no candidate is waiting to be rescored.
    pub fn is_settled(&self) -> bool {
        self.dirty.is_empty()
    }

    /// The number of candidates waiting to be rescored.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// The number of candidates being tracked, whether scored, stale, or parked. Polled
    /// candidates don't count until they're enabled again.
    pub fn tracked_len(&self) -> usize {
        self.candidates
            .values()
            .filter(|candidate| candidate.state != State::Polled)
            .count()
    }
}

fn is_current(candidates: &HashMap<GraphAction, Candidate>, entry: &Entry) -> bool {
    candidates.get(&entry.action).map_or(false, |candidate| {
        candidate.state == State::Scored && candidate.generation == entry.generation
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dataset, Format, Lattice, MessageLengthComputer, MissingValues};

    /// Scores every edge by a fixed table, regardless of the model.
    struct Fixed(HashMap<GraphAction, Option<f64>>);

    impl GraphActionScorer for Fixed {
        fn score(&self, _model: &DecomposableModel, action: GraphAction) -> Option<f64> {
            self.0.get(&action).copied().flatten()
        }
    }

    fn model(n: usize) -> DecomposableModel {
        let header: Vec<String> = (0..n).map(|i| format!("v{}", i)).collect();
        let row: Vec<&str> = (0..n).map(|_| "x").collect();
        let text = format!("{}\n{}\n", header.join("\t"), row.join("\t"));
        let data = Dataset::from_reader(text.as_bytes(), Format::Tsv).unwrap();
        let lattice = Lattice::from_dataset(&data, MissingValues::Reserve).unwrap();
        DecomposableModel::independence(&MessageLengthComputer::new(lattice))
    }

    fn edge(a: Variable, b: Variable) -> GraphAction {
        GraphAction::add_edge(a, b)
    }

    #[test]
    fn polls_best_first_with_lowest_pair_on_ties() {
        let model = model(4);
        let mut queue = CandidateQueue::new(4);
        queue.enable_all();
        assert_eq!(queue.tracked_len(), 6);
        let scorer = Fixed(
            vec![
                (edge(0, 1), Some(1.0)),
                (edge(0, 2), Some(5.0)),
                (edge(0, 3), Some(-2.0)),
                (edge(1, 2), Some(5.0)),
                (edge(1, 3), None),
                (edge(2, 3), Some(3.0)),
            ]
            .into_iter()
            .collect(),
        );
        queue.settle(&model, &scorer);
        assert_eq!(queue.len(), 5);

        let order: Vec<GraphAction> = std::iter::from_fn(|| queue.poll())
            .map(|scored| scored.action)
            .collect();
        assert_eq!(
            order,
            vec![edge(0, 2), edge(1, 2), edge(2, 3), edge(0, 1), edge(0, 3)]
        );
        assert!(queue.is_empty());
        // The parked candidate is still tracked.
        assert_eq!(queue.tracked_len(), 1);
    }

    #[test]
    fn rescored_candidates_replace_stale_entries() {
        let model = model(3);
        let mut queue = CandidateQueue::new(3);
        queue.enable_all();
        let mut scores: HashMap<_, _> = vec![
            (edge(0, 1), Some(4.0)),
            (edge(0, 2), Some(3.0)),
            (edge(1, 2), Some(2.0)),
        ]
        .into_iter()
        .collect();
        queue.settle(&model, &Fixed(scores.clone()));

        scores.insert(edge(0, 1), Some(1.0));
        queue.invalidate(edge(0, 1));
        assert!(!queue.is_settled());
        queue.settle(&model, &Fixed(scores));

        assert_eq!(queue.len(), 3);
        let first = queue.poll().unwrap();
        assert_eq!(first.action, edge(0, 2));
        assert_eq!(first.score, 3.0);
        assert_eq!(queue.poll().unwrap().action, edge(1, 2));
        assert_eq!(queue.poll().unwrap().score, 1.0);
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn parked_candidates_return_after_invalidation() {
        let model = model(2);
        let mut queue = CandidateQueue::new(2);
        queue.enable(edge(0, 1));
        queue.settle(&model, &Fixed(vec![(edge(0, 1), None)].into_iter().collect()));
        assert_eq!(queue.poll(), None);

        queue.invalidate(edge(0, 1));
        queue.settle(&model, &Fixed(vec![(edge(0, 1), Some(0.5))].into_iter().collect()));
        assert_eq!(queue.poll().map(|scored| scored.action), Some(edge(0, 1)));
    }

    #[test]
    fn polled_candidates_ignore_invalidation() {
        let model = model(2);
        let mut queue = CandidateQueue::new(2);
        queue.enable_all();
        queue.settle(&model, &Fixed(vec![(edge(0, 1), Some(1.0))].into_iter().collect()));
        assert!(queue.poll().is_some());
        queue.invalidate(edge(0, 1));
        assert!(queue.is_settled());
    }

    #[test]
    fn re_enabled_candidates_never_revive_old_scores() {
        let model = model(2);
        let mut queue = CandidateQueue::new(2);
        let scores = |score| Fixed(vec![(edge(0, 1), Some(score))].into_iter().collect());

        queue.enable(edge(0, 1));
        queue.settle(&model, &scores(3.0));
        // The 3.0 entry is superseded but stays in the heap.
        queue.invalidate(edge(0, 1));
        queue.settle(&model, &scores(5.0));
        assert_eq!(queue.poll().map(|scored| scored.score), Some(5.0));
        assert_eq!(queue.tracked_len(), 0);

        queue.enable(edge(0, 1));
        assert_eq!(queue.tracked_len(), 1);
        queue.settle(&model, &scores(1.0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.poll().map(|scored| scored.score), Some(1.0));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn polling_while_dirty_panics() {
        let mut queue = CandidateQueue::new(2);
        queue.enable_all();
        queue.poll();
    }
}
