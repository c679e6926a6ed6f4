//! Decomposable models and the edge additions that grow them.

use crate::{CandidateQueue, MessageLengthComputer, Variable, VariableSet};
use std::mem::swap;

/// A proposal to add the edge between two distinct variables.
///
/// The endpoints are stored in increasing order, so the two ways of naming an edge compare
/// equal.
///
/// ```
/// use chordalysis::GraphAction;
///
/// assert_eq!(GraphAction::add_edge(3, 1), GraphAction::add_edge(1, 3));
/// assert_eq!(GraphAction::add_edge(3, 1).endpoints(), (1, 3));
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GraphAction {
    a: Variable,
    b: Variable,
}

impl GraphAction {
    /// Proposes the edge between `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if `a == b`.
    pub fn add_edge(a: Variable, b: Variable) -> Self {
        assert_ne!(a, b, "an edge needs two distinct variables");
        if a < b {
            GraphAction { a, b }
        } else {
            GraphAction { a: b, b: a }
        }
    }

    /// The lower-numbered endpoint.
    pub fn a(&self) -> Variable {
        self.a
    }

    /// The higher-numbered endpoint.
    pub fn b(&self) -> Variable {
        self.b
    }

    /// Both endpoints, lower first.
    pub fn endpoints(&self) -> (Variable, Variable) {
        (self.a, self.b)
    }
}

/// A [`GraphAction`] together with how much it would shorten the data-fit message length of
/// the model it was scored against. Negative scores make the description longer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredGraphAction {
    /// The proposed edge.
    pub action: GraphAction,
    /// The reduction in data-fit message length, in nats.
    pub score: f64,
}

/// A decomposable model: a chordal graph over the variables, whose maximal cliques and
/// separators give an exact factorization of the joint distribution.
///
/// Models only ever grow, one edge at a time, through [`perform_action`][Self::perform_action].
#[derive(Clone, Debug)]
pub struct DecomposableModel {
    neighbours: Vec<VariableSet>,
    components: DisjointSets,
    n_edges: usize,
    message_length: f64,
}

impl DecomposableModel {
    /// Creates the model in which every variable is independent of all the others, so every
    /// variable is its own clique.
    pub fn independence(computer: &MessageLengthComputer) -> Self {
        let n_variables = computer.lattice().n_variables();
        let mut model = DecomposableModel {
            neighbours: vec![VariableSet::default(); n_variables],
            components: DisjointSets::new(n_variables),
            n_edges: 0,
            message_length: 0.0,
        };
        model.message_length = model.compute_message_length(computer);
        model
    }

    /// The number of variables in the model.
    pub fn n_variables(&self) -> usize {
        self.neighbours.len()
    }

    /// The number of edges added so far.
    pub fn edge_count(&self) -> usize {
        self.n_edges
    }

    /// The data-fit message length of this model: the cost of stating the data given the
    /// model's structure.
    pub fn message_length(&self) -> f64 {
        self.message_length
    }

    /// Returns `true` if `a` and `b` are joined by an edge.
    pub fn is_adjacent(&self, a: Variable, b: Variable) -> bool {
        self.neighbours[a as usize].contains(b)
    }

    /// The variables adjacent to `variable`.
    pub fn neighbours(&self, variable: Variable) -> &VariableSet {
        &self.neighbours[variable as usize]
    }

    /// Returns an iterator over every edge, lower endpoint first, in increasing order.
    pub fn edges(&self) -> impl Iterator<Item = GraphAction> + '_ {
        self.neighbours.iter().enumerate().flat_map(|(a, neighbours)| {
            let a = a as Variable;
            neighbours
                .iter()
                .filter(move |b| a < *b)
                .map(move |b| GraphAction::add_edge(a, b))
        })
    }

    /// Returns `true` if `a` and `b` are connected by some path.
    pub fn is_connected(&self, a: Variable, b: Variable) -> bool {
        self.components.find(a) == self.components.find(b)
    }

    /// If adding `action`'s edge leaves the graph chordal, returns the minimal separator between
    /// its endpoints. Otherwise, or if the edge is already present, returns `None`.
    ///
    /// For a chordal graph and non-adjacent `u` and `v`, adding `uv` keeps it chordal exactly
    /// when their common neighbours separate `u` from `v`. Those common neighbours are then the
    /// separator. Variables in different components have no common neighbours and are always
    /// separated.
    ///
    /// ```
    /// use chordalysis::{GraphAction, VariableSet};
    /// # use chordalysis::{Dataset, Explorer, Format, SearchConfig};
    /// # let data = Dataset::from_reader("a\tb\tc\td\nx\tx\tx\tx\ny\ty\ty\ty\n".as_bytes(), Format::Tsv).unwrap();
    /// # let explorer = Explorer::new(&data, &SearchConfig::default()).unwrap();
    /// // In the independence model every edge is addable, with nothing to separate.
    /// let model = explorer.model();
    /// assert_eq!(model.separator(GraphAction::add_edge(0, 3)), Some(VariableSet::new(&[])));
    /// ```
    pub fn separator(&self, action: GraphAction) -> Option<VariableSet> {
        let (u, v) = action.endpoints();
        if self.is_adjacent(u, v) {
            return None;
        }

        let common = self.neighbours(u).intersection(self.neighbours(v));
        if !self.is_connected(u, v) {
            return Some(common);
        }

        // Search outward from u without passing through the common neighbours.
        let mut seen = vec![false; self.n_variables()];
        for w in common.iter() {
            seen[w as usize] = true;
        }
        seen[u as usize] = true;
        let mut stack = vec![u];
        while let Some(x) = stack.pop() {
            for y in self.neighbours(x).iter() {
                if y == v {
                    return None;
                }
                if !seen[y as usize] {
                    seen[y as usize] = true;
                    stack.push(y);
                }
            }
        }
        Some(common)
    }

    /// Adds `action`'s edge, recomputes the data-fit message length, and marks every queued
    /// candidate whose score may have changed as needing a rescore.
    ///
    /// Only candidates with both endpoints in the component that now contains the new edge can
    /// change: elsewhere, neighbourhoods and connectivity are untouched.
    ///
    /// # Panics
    ///
    /// Panics if the edge can't be added while keeping the graph chordal.
    pub fn perform_action(
        &mut self,
        action: GraphAction,
        computer: &MessageLengthComputer,
        queue: &mut CandidateQueue,
    ) {
        assert!(
            self.separator(action).is_some(),
            "adding {:?} would not leave a chordal graph",
            action
        );

        let (a, b) = action.endpoints();
        self.neighbours[a as usize].insert(b);
        self.neighbours[b as usize].insert(a);
        self.components.union(a, b);
        self.n_edges += 1;
        self.message_length = self.compute_message_length(computer);

        let root = self.components.find(a);
        let members: Vec<Variable> = (0..self.n_variables() as Variable)
            .filter(|variable| self.components.find(*variable) == root)
            .collect();
        for (index, u) in members.iter().copied().enumerate() {
            for v in members[index + 1..].iter().copied() {
                if !self.is_adjacent(u, v) {
                    queue.invalidate(GraphAction::add_edge(u, v));
                }
            }
        }
    }

    /// The maximal cliques of the graph, in the order maximum cardinality search discovers
    /// them.
    pub fn cliques(&self) -> Vec<VariableSet> {
        self.junction_tree().0
    }

    /// The separators of a junction tree over [`cliques`][Self::cliques], as a multiset. Empty
    /// separators between disconnected components are left out.
    pub fn separators(&self) -> Vec<VariableSet> {
        self.junction_tree().1
    }

    /// Runs maximum cardinality search, breaking ties by lowest variable, and collects the
    /// cliques and separators of the junction tree it implies.
    ///
    /// In a chordal graph, each newly numbered vertex either extends the clique of the previous
    /// one, when it has more numbered neighbours than that one did, or starts a new clique made
    /// of itself and its numbered neighbours. Those neighbours are the new clique's separator.
    fn junction_tree(&self) -> (Vec<VariableSet>, Vec<VariableSet>) {
        let n = self.n_variables();
        let mut weight = vec![0usize; n];
        let mut numbered = vec![false; n];
        let mut cliques: Vec<VariableSet> = Vec::new();
        let mut separators = Vec::new();
        let mut previous = None;

        while let Some(v) = (0..n)
            .filter(|v| !numbered[*v])
            .max_by(|x, y| weight[*x].cmp(&weight[*y]).then(y.cmp(x)))
        {
            let variable = v as Variable;
            let earlier: VariableSet = self
                .neighbours(variable)
                .iter()
                .filter(|u| numbered[*u as usize])
                .collect();

            let extends = matches!(previous, Some(p) if weight[v] > p);
            match cliques.last_mut() {
                Some(clique) if extends => clique.insert(variable),
                _ => {
                    if !earlier.is_empty() {
                        separators.push(earlier.clone());
                    }
                    cliques.push(earlier.with(variable));
                }
            }

            previous = Some(weight[v]);
            numbered[v] = true;
            for u in self.neighbours(variable).iter() {
                if !numbered[u as usize] {
                    weight[u as usize] += 1;
                }
            }
        }

        (cliques, separators)
    }

    fn compute_message_length(&self, computer: &MessageLengthComputer) -> f64 {
        let (cliques, separators) = self.junction_tree();
        let total: f64 = cliques
            .iter()
            .map(|clique| computer.message_length(clique))
            .sum();
        let shared: f64 = separators
            .iter()
            .map(|separator| computer.message_length(separator))
            .sum();
        total - shared
    }
}

/// Connected components, as a union-find forest with union by rank.
#[derive(Clone, Debug)]
struct DisjointSets(Vec<(Variable, u8)>);

impl DisjointSets {
    fn new(n: usize) -> Self {
        DisjointSets((0..n as Variable).map(|v| (v, 0)).collect())
    }

    // Without path compression this needs only shared access; union by rank keeps the trees
    // logarithmically shallow.
    fn find(&self, mut x: Variable) -> Variable {
        while self.0[x as usize].0 != x {
            x = self.0[x as usize].0;
        }
        x
    }

    fn union(&mut self, a: Variable, b: Variable) {
        let mut a = self.find(a);
        let mut b = self.find(b);
        if a == b {
            return;
        }

        if self.0[a as usize].1 < self.0[b as usize].1 {
            swap(&mut a, &mut b);
        }

        self.0[b as usize].0 = a;
        if self.0[a as usize].1 == self.0[b as usize].1 {
            self.0[a as usize].1 += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dataset, Format, Lattice, MissingValues};

    /// A computer over `n` binary variables with a couple of arbitrary rows, for tests that only
    /// care about graph structure.
    fn computer(n: usize) -> MessageLengthComputer {
        let header: Vec<String> = (0..n).map(|i| format!("v{}", i)).collect();
        let mut text = header.join("\t");
        text.push('\n');
        for row in 0..4 {
            let fields: Vec<String> = (0..n).map(|i| ((row >> (i % 2)) & 1).to_string()).collect();
            text.push_str(&fields.join("\t"));
            text.push('\n');
        }
        let data = Dataset::from_reader(text.as_bytes(), Format::Tsv).unwrap();
        MessageLengthComputer::new(Lattice::from_dataset(&data, MissingValues::Reject).unwrap())
    }

    fn build(n: usize, edges: &[(Variable, Variable)]) -> (DecomposableModel, MessageLengthComputer) {
        let computer = computer(n);
        let mut model = DecomposableModel::independence(&computer);
        let mut queue = CandidateQueue::new(n);
        for &(a, b) in edges {
            model.perform_action(GraphAction::add_edge(a, b), &computer, &mut queue);
        }
        (model, computer)
    }

    #[test]
    fn path_endpoints_are_separated_by_middle() {
        let (model, _) = build(3, &[(0, 1), (1, 2)]);
        assert_eq!(
            model.separator(GraphAction::add_edge(0, 2)),
            Some(VariableSet::new(&[1]))
        );
        assert_eq!(model.separator(GraphAction::add_edge(0, 1)), None);
    }

    #[test]
    fn closing_a_long_cycle_is_not_addable() {
        // 0-1-2-3: joining the ends would make a chordless 4-cycle.
        let (model, _) = build(4, &[(0, 1), (1, 2), (2, 3)]);
        assert_eq!(model.separator(GraphAction::add_edge(0, 3)), None);
        assert_eq!(
            model.separator(GraphAction::add_edge(1, 3)),
            Some(VariableSet::new(&[2]))
        );
    }

    #[test]
    fn separate_components_are_always_addable() {
        let (model, _) = build(4, &[(0, 1), (2, 3)]);
        assert!(!model.is_connected(1, 2));
        assert_eq!(
            model.separator(GraphAction::add_edge(1, 2)),
            Some(VariableSet::new(&[]))
        );
    }

    #[test]
    fn cliques_and_separators_of_two_triangles() {
        // Triangles 012 and 123 sharing the edge 12, plus an isolated 4.
        let (model, _) = build(5, &[(0, 1), (1, 2), (0, 2), (1, 3), (2, 3)]);
        let mut cliques = model.cliques();
        cliques.sort();
        assert_eq!(
            cliques,
            vec![
                VariableSet::new(&[0, 1, 2]),
                VariableSet::new(&[1, 2, 3]),
                VariableSet::new(&[4]),
            ]
        );
        assert_eq!(model.separators(), vec![VariableSet::new(&[1, 2])]);
        assert_eq!(model.edge_count(), 5);
        assert_eq!(model.edges().count(), 5);
    }

    #[test]
    fn message_length_is_cliques_minus_separators() {
        let (model, computer) = build(4, &[(0, 1), (1, 2)]);
        let expected = computer.message_length(&VariableSet::new(&[0, 1]))
            + computer.message_length(&VariableSet::new(&[1, 2]))
            + computer.message_length(&VariableSet::new(&[3]))
            - computer.message_length(&VariableSet::new(&[1]));
        assert!((model.message_length() - expected).abs() < 1e-9);
    }

    #[test]
    #[should_panic]
    fn refuses_chordless_cycles() {
        build(4, &[(0, 1), (1, 2), (2, 3), (0, 3)]);
    }

    #[test]
    fn invalidates_candidates_in_the_merged_component() {
        let computer = computer(4);
        let mut model = DecomposableModel::independence(&computer);
        let mut queue = CandidateQueue::new(4);
        queue.enable_all();
        // Flush the initial candidates so only the invalidations below are pending.
        queue.settle(&model, &crate::MmlScorer::new(&computer));
        assert!(queue.is_settled());

        model.perform_action(GraphAction::add_edge(0, 1), &computer, &mut queue);
        // Only {0, 1} is connected and it's now an edge, so nothing needs rescoring.
        assert!(queue.is_settled());

        model.perform_action(GraphAction::add_edge(1, 2), &computer, &mut queue);
        assert_eq!(queue.dirty_len(), 1);
    }
}
