//! Message lengths, in nats, for multinomial tables and for graph structures.

use crate::{Lattice, VariableSet};
use statrs::function::gamma::ln_gamma;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A table of `ln(n!)` for every `n` up to some bound, computed once so that message lengths
/// never need to evaluate a factorial directly.
///
/// Lookups past the end of the table fall back to the log-gamma function.
#[derive(Clone, Debug)]
pub struct LogFactorials {
    table: Vec<f64>,
}

impl LogFactorials {
    /// Tabulates `ln(n!)` for `0 <= n <= max`.
    ///
    /// ```
    /// use chordalysis::LogFactorials;
    ///
    /// let lf = LogFactorials::new(10);
    /// assert_eq!(lf.ln_factorial(0), 0.0);
    /// assert_eq!(lf.ln_factorial(1), 0.0);
    /// assert!((lf.ln_factorial(5) - 120f64.ln()).abs() < 1e-12);
    /// // Beyond the table:
    /// assert!((lf.ln_factorial(20) - 2432902008176640000f64.ln()).abs() < 1e-9);
    /// ```
    pub fn new(max: usize) -> Self {
        let mut table = Vec::with_capacity(max + 1);
        let mut sum = 0.0;
        table.push(sum);
        for n in 1..=max {
            sum += (n as f64).ln();
            table.push(sum);
        }
        LogFactorials { table }
    }

    /// The largest `n` whose factorial is tabulated.
    pub fn max(&self) -> usize {
        self.table.len() - 1
    }

    /// Returns `ln(n!)`.
    pub fn ln_factorial(&self, n: usize) -> f64 {
        match self.table.get(n) {
            Some(value) => *value,
            None => ln_gamma(n as f64 + 1.0),
        }
    }

    /// Returns `ln(k (k+1) ... (k+n-1))`, which is `ln((k+n-1)! / (k-1)!)`, for a whole
    /// number `k >= 1` that may be too large for `usize`.
    ///
    /// Past the table, the two factorials are far too close to subtract, so this sums the
    /// factors instead.
    fn ln_rising_factorial(&self, k: f64, n: usize) -> f64 {
        if k + n as f64 - 1.0 <= self.max() as f64 {
            let k = k as usize;
            self.table[k + n - 1] - self.table[k - 1]
        } else {
            n as f64 * k.ln() + (0..n).map(|i| (i as f64 / k).ln_1p()).sum::<f64>()
        }
    }
}

/// The cost of describing which `n_edges` of the `M = V(V-1)/2` possible edges between
/// `n_variables` variables are present.
///
/// This is `ln(M+1)` to state how many edges there are, under a uniform prior over `0..=M`,
/// plus `ln(C(M, n_edges))` to state which ones.
///
/// ```
/// use chordalysis::{structure_message_length, LogFactorials};
///
/// let lf = LogFactorials::new(100);
/// // Four variables have six possible edges.
/// assert!((structure_message_length(&lf, 4, 0) - 7f64.ln()).abs() < 1e-12);
/// assert!((structure_message_length(&lf, 4, 2) - (7f64.ln() + 15f64.ln())).abs() < 1e-12);
/// ```
///
/// # Panics
///
/// Panics if `n_edges` is more than the number of possible edges.
pub fn structure_message_length(
    log_factorials: &LogFactorials,
    n_variables: usize,
    n_edges: usize,
) -> f64 {
    let max_edges = n_variables * n_variables.saturating_sub(1) / 2;
    assert!(
        n_edges <= max_edges,
        "{} edges requested but {} variables allow at most {}",
        n_edges,
        n_variables,
        max_edges
    );
    ((max_edges + 1) as f64).ln() + log_factorials.ln_factorial(max_edges)
        - log_factorials.ln_factorial(n_edges)
        - log_factorials.ln_factorial(max_edges - n_edges)
}

/// Computes message lengths of contingency tables drawn from a [`Lattice`].
///
/// The message length of the table over a set of variables `S`, with `K` cells, `N` instances
/// and cell counts `n_i`, is that of a multinomial with a uniform prior over its parameters:
///
/// ```text
/// ML(S) = ln((N + K - 1)!) - ln((K - 1)!) - sum_i ln(n_i!)
/// ```
///
/// Results are memoized per variable set. The memo is shared behind a lock, so scoring can run
/// on several threads at once.
#[derive(Debug)]
pub struct MessageLengthComputer {
    lattice: Lattice,
    log_factorials: LogFactorials,
    memo: Mutex<HashMap<VariableSet, f64>>,
}

impl MessageLengthComputer {
    /// Takes ownership of a lattice and tabulates the log-factorials its message lengths need.
    ///
    /// The table covers every cell count, every single-variable table, and the structure cost
    /// over all possible edges.
    pub fn new(lattice: Lattice) -> Self {
        let n_variables = lattice.n_variables();
        let max_edges = n_variables * n_variables.saturating_sub(1) / 2;
        let max_arity = (0..n_variables as u32)
            .map(|variable| lattice.arity(variable) as usize)
            .max()
            .unwrap_or(1);
        let log_factorials = LogFactorials::new((lattice.n_instances() + max_arity).max(max_edges));
        MessageLengthComputer {
            lattice,
            log_factorials,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The data this computer describes.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// The shared log-factorial table.
    pub fn log_factorials(&self) -> &LogFactorials {
        &self.log_factorials
    }

    /// Returns the message length of the contingency table over `variables`.
    ///
    /// The empty set has a single cell that must hold every instance, so it costs nothing.
    pub fn message_length(&self, variables: &VariableSet) -> f64 {
        if variables.is_empty() {
            return 0.0;
        }

        if let Some(length) = self.memo().get(variables) {
            return *length;
        }

        let length = self.compute(variables);
        self.memo().insert(variables.clone(), length);
        length
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<VariableSet, f64>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compute(&self, variables: &VariableSet) -> f64 {
        let lf = &self.log_factorials;
        let n = self.lattice.n_instances();
        let cells = self.lattice.n_cells(variables);

        let data: f64 = self
            .lattice
            .counts(variables)
            .into_iter()
            .map(|count| lf.ln_factorial(count as usize))
            .sum();
        lf.ln_rising_factorial(cells, n) - data
    }

    /// The cost of describing a graph with `n_edges` edges over this lattice's variables. See
    /// [`structure_message_length`].
    pub fn structure_message_length(&self, n_edges: usize) -> f64 {
        structure_message_length(&self.log_factorials, self.lattice.n_variables(), n_edges)
    }
}
