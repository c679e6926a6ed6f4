//! Ranking candidate edges.

use crate::{DecomposableModel, GraphAction, MessageLengthComputer};

/// Scores edge additions against the current model.
///
/// Scores from one scorer must be comparable across candidates scored against the same model:
/// higher is better. The search accepts an edge only if its score outweighs the extra cost of
/// describing one more edge, so a scorer's unit must match the structure cost's (nats).
///
/// Scorers are shared across the threads that rescore candidates in parallel.
pub trait GraphActionScorer: Sync {
    /// Returns the improvement from adding `action`'s edge to `model`, or `None` if the edge
    /// can't be added to this model.
    fn score(&self, model: &DecomposableModel, action: GraphAction) -> Option<f64>;
}

/// Scores an edge by the exact reduction in data-fit message length it brings.
///
/// Adding the edge `ab` with minimal separator `S` to a decomposable model replaces the cliques
/// `S ∪ {a}` and `S ∪ {b}`, joined through `S`, with the single clique `S ∪ {a, b}`. So the
/// model's message length changes by:
///
/// ```text
/// ML(S ∪ {a, b}) + ML(S) - ML(S ∪ {a}) - ML(S ∪ {b})
/// ```
///
/// The score is the negation of that change.
#[derive(Clone, Copy, Debug)]
pub struct MmlScorer<'a> {
    computer: &'a MessageLengthComputer,
}

impl<'a> MmlScorer<'a> {
    /// Creates a scorer that draws message lengths from `computer`.
    pub fn new(computer: &'a MessageLengthComputer) -> Self {
        MmlScorer { computer }
    }
}

impl GraphActionScorer for MmlScorer<'_> {
    fn score(&self, model: &DecomposableModel, action: GraphAction) -> Option<f64> {
        let separator = model.separator(action)?;
        let (a, b) = action.endpoints();
        let ml = |set| self.computer.message_length(&set);

        let with_a = separator.with(a);
        let with_b = separator.with(b);
        let with_both = with_a.with(b);
        let score = ml(with_a) + ml(with_b) - ml(with_both) - ml(separator);

        // A table too big to size in floating point can't pay for itself.
        if score.is_nan() {
            Some(f64::NEG_INFINITY)
        } else {
            Some(score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dataset, Format, Lattice, MissingValues, VariableSet};

    fn computer(text: &str) -> MessageLengthComputer {
        let data = Dataset::from_reader(text.as_bytes(), Format::Tsv).unwrap();
        MessageLengthComputer::new(Lattice::from_dataset(&data, MissingValues::Reject).unwrap())
    }

    #[test]
    fn score_is_drop_in_model_message_length() {
        let mut text = String::from("a\tb\tc\n");
        for row in ["x\tp\t1", "x\tp\t2", "y\tq\t1", "y\tq\t1", "x\tq\t2"].iter().cycle().take(40) {
            text.push_str(row);
            text.push('\n');
        }
        let computer = computer(&text);
        let scorer = MmlScorer::new(&computer);
        let mut model = DecomposableModel::independence(&computer);
        let mut queue = crate::CandidateQueue::new(3);

        for (a, b) in [(0, 1), (1, 2), (0, 2)].iter().copied() {
            let action = GraphAction::add_edge(a, b);
            let before = model.message_length();
            let score = scorer.score(&model, action).unwrap();
            model.perform_action(action, &computer, &mut queue);
            assert!((before - score - model.message_length()).abs() < 1e-9);
        }
        assert_eq!(model.cliques(), vec![VariableSet::new(&[0, 1, 2])]);
    }

    #[test]
    fn present_edges_have_no_score() {
        let computer = computer("a\tb\nx\t1\ny\t2\n");
        let mut model = DecomposableModel::independence(&computer);
        let action = GraphAction::add_edge(0, 1);
        model.perform_action(action, &computer, &mut crate::CandidateQueue::new(2));
        assert_eq!(MmlScorer::new(&computer).score(&model, action), None);
    }
}
