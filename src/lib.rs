#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate learns a decomposable graphical model from a categorical dataset using the
//! Minimum Message Length (MML) criterion, following the forward-selection approach described
//! in these papers:
//!
//! - Petitjean, Webb and Nicholson, [Scaling log-linear analysis to high-dimensional data][icdm],
//!   ICDM 2013
//! - Petitjean and Webb, [Scaling log-linear analysis to datasets with thousands of
//!   variables][sdm], SDM 2015
//!
//! [icdm]: https://doi.org/10.1109/ICDM.2013.17
//! [sdm]: https://doi.org/10.1137/1.9781611974010.53
//!
//! The search starts from the independence model, where every variable is its own clique, and
//! repeatedly adds the single edge that shortens the description of the data the most, as long
//! as that saving pays for the longer description of the graph itself. Every model visited is
//! chordal, so its likelihood factorizes exactly over its cliques and separators.
//!
//! ```
//! use chordalysis::{Dataset, Explorer, Format, SearchConfig};
//!
//! let mut text = String::from("a\tb\n");
//! for _ in 0..50 {
//!     text.push_str("x\tp\ny\tq\n");
//! }
//! let dataset = Dataset::from_reader(text.as_bytes(), Format::Tsv).unwrap();
//!
//! let mut explorer = Explorer::new(&dataset, &SearchConfig::default()).unwrap();
//! let exploration = explorer.explore();
//! assert_eq!(exploration.steps, 1);
//! assert!(explorer.model().is_adjacent(0, 1));
//! ```

pub use sorted_iter;

use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use std::iter;

mod data;
mod error;
mod explorer;
mod lattice;
mod message_length;
mod model;
mod queue;
mod scorer;

pub use data::{Dataset, Format, Schema, VariableInfo};
pub use error::{Error, Result, StructureError};
pub use explorer::{Exploration, Explorer, Rejection, SearchConfig, Step, Termination};
pub use lattice::{Lattice, MissingValues};
pub use message_length::{structure_message_length, LogFactorials, MessageLengthComputer};
pub use model::{DecomposableModel, GraphAction, ScoredGraphAction};
pub use queue::CandidateQueue;
pub use scorer::{GraphActionScorer, MmlScorer};

/// Identifies a variable by its column index in the dataset.
pub type Variable = u32;

/// A set of variables.
///
/// Cliques in the models this crate builds are usually small, so sets of up to four variables
/// avoid heap allocation.
#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableSet(SmallVec<[Variable; 4]>);

impl VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn new(ids: &[Variable]) -> Self {
        let mut v = SmallVec::from_slice(ids);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the variables which appear in this set, in increasing order.
    ///
    /// ```
    /// use chordalysis::VariableSet;
    ///
    /// let abc = VariableSet::new(&[2, 3, 1]);
    /// let mut it = abc.iter();
    /// assert_eq!(it.next(), Some(1));
    /// assert_eq!(it.next(), Some(2));
    /// assert_eq!(it.next(), Some(3));
    /// assert_eq!(it.next(), None);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = Variable> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// Returns `true` if `variable` is a member of this set.
    pub fn contains(&self, variable: Variable) -> bool {
        self.0.binary_search(&variable).is_ok()
    }

    /// Returns `true` if `other` contains every variable that `self` does.
    ///
    /// ```
    /// use chordalysis::VariableSet;
    /// let nil = VariableSet::new(&[]);
    /// let one = VariableSet::new(&[1]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }

    /// Returns a copy of this set with `variable` added to it.
    ///
    /// ```
    /// use chordalysis::VariableSet;
    ///
    /// let ac = VariableSet::new(&[1, 3]);
    /// assert_eq!(ac.with(2), VariableSet::new(&[1, 2, 3]));
    /// assert_eq!(ac.with(3), ac);
    /// ```
    pub fn with(&self, variable: Variable) -> Self {
        let mut result = self.clone();
        result.insert(variable);
        result
    }

    /// Adds `variable` to this set if it isn't already present.
    pub fn insert(&mut self, variable: Variable) {
        if let Err(at) = self.0.binary_search(&variable) {
            self.0.insert(at, variable);
        }
    }

    /// Returns the variables present in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        VariableSet(self.iter().intersection(other.iter()).collect())
    }

    /// Returns the variables present in either set.
    pub fn union(&self, other: &Self) -> Self {
        VariableSet(self.iter().union(other.iter()).collect())
    }
}

impl std::fmt::Debug for VariableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl iter::FromIterator<Variable> for VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut v = SmallVec::from_iter(iter);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }
}
