//! The greedy forward search over decomposable models.

use crate::{
    CandidateQueue, Dataset, DecomposableModel, Format, Lattice, MessageLengthComputer,
    MissingValues, MmlScorer, Result, Schema, ScoredGraphAction, StructureError,
};
use std::io;
use tracing::{debug, info, trace};

/// Settings for one search.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SearchConfig {
    /// How missing values are coded.
    pub missing_values: MissingValues,
    /// The most edges the model may have. The search stops once it has this many, even if more
    /// edges would still shorten the message. `None` leaves the search unbounded.
    ///
    /// This bounds the model's total edge count, not the edges accepted by one call to
    /// [`Explorer::explore`]. The two differ only when `explore` is called again on a model
    /// that already has edges.
    pub max_steps: Option<usize>,
}

impl SearchConfig {
    /// Sets how missing values are coded.
    pub fn with_missing_values(mut self, missing_values: MissingValues) -> Self {
        self.missing_values = missing_values;
        self
    }

    /// Caps the number of edges the search may add.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// Why a search stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// The best remaining candidate would not make the total message strictly shorter.
    NoImprovement,
    /// No edge can be added to the model at all.
    NoCandidates,
    /// The model reached the configured maximum number of edges.
    StepBudget,
}

impl Termination {
    /// Returns `true` if the search stopped because the model can't be improved, rather than
    /// because it ran out of budget.
    pub fn is_natural(self) -> bool {
        self != Termination::StepBudget
    }
}

/// One accepted edge and the message lengths right after accepting it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    /// The edge that was added, with its score.
    pub action: ScoredGraphAction,
    /// The data-fit message length of the model with this edge.
    pub data_fit: f64,
    /// The cost of describing the graph with this edge.
    pub structure: f64,
}

impl Step {
    /// The total message length after this step.
    pub fn full(&self) -> f64 {
        self.data_fit + self.structure
    }
}

/// The candidate that ended a search by failing to shorten the message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rejection {
    /// The best candidate at the time.
    pub action: ScoredGraphAction,
    /// The total message length the model would have had with it.
    pub full: f64,
}

/// The outcome of [`Explorer::explore`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exploration {
    /// Why the search stopped.
    pub termination: Termination,
    /// The data-fit message length of the final model.
    pub data_fit: f64,
    /// The cost of describing the final model's graph.
    pub structure: f64,
    /// The number of edges accepted during this call.
    pub steps: usize,
    /// The candidate that was turned down, when the search stopped for lack of improvement.
    pub rejected: Option<Rejection>,
}

impl Exploration {
    /// The total message length of the final model.
    pub fn full(&self) -> f64 {
        self.data_fit + self.structure
    }
}

/// Searches for the decomposable model with the shortest total message length, adding one
/// edge at a time to the independence model.
///
/// An explorer holds everything one search needs and nothing else. Build a new one for every
/// dataset.
#[derive(Debug)]
pub struct Explorer {
    n_instances: usize,
    n_variables: usize,
    computer: MessageLengthComputer,
    model: DecomposableModel,
    queue: CandidateQueue,
    actions: Vec<ScoredGraphAction>,
    steps: Vec<Step>,
    max_steps: Option<usize>,
}

impl Explorer {
    /// Prepares a search over a materialized dataset without running it.
    ///
    /// Every pair of variables becomes a candidate edge. Candidates are scored when the search
    /// starts.
    pub fn new(dataset: &Dataset, config: &SearchConfig) -> Result<Explorer> {
        if dataset.n_variables() == 0 {
            return Err(StructureError::NoVariables.into());
        }
        let lattice = Lattice::from_dataset(dataset, config.missing_values)?;
        Explorer::from_lattice(dataset.schema(), lattice, config)
    }

    /// Prepares a search over rows streamed from `input`, coded against a `schema` that was
    /// built beforehand, without ever materializing the dataset. The number of instances is
    /// whatever the stream held.
    pub fn from_stream<R: io::Read>(
        schema: &Schema,
        input: R,
        format: Format,
        config: &SearchConfig,
    ) -> Result<Explorer> {
        if schema.is_empty() {
            return Err(StructureError::NoVariables.into());
        }
        let lattice = Lattice::from_stream(schema, input, format, config.missing_values)?;
        Explorer::from_lattice(schema, lattice, config)
    }

    /// Prepares a search over a dataset and runs it to completion.
    pub fn build_model(dataset: &Dataset, config: &SearchConfig) -> Result<(Explorer, Exploration)> {
        let mut explorer = Explorer::new(dataset, config)?;
        let exploration = explorer.explore();
        Ok((explorer, exploration))
    }

    fn from_lattice(schema: &Schema, lattice: Lattice, config: &SearchConfig) -> Result<Explorer> {
        let n_variables = lattice.n_variables();
        let n_instances = lattice.n_instances();
        if n_variables == 0 {
            return Err(StructureError::NoVariables.into());
        }
        if n_instances == 0 {
            return Err(StructureError::NoInstances.into());
        }
        for (index, variable) in schema.variables().enumerate() {
            let arity = lattice.arity(index as u32) as usize;
            if arity < 2 {
                return Err(StructureError::DegenerateVariable {
                    name: variable.name().to_owned(),
                    arity,
                }
                .into());
            }
        }

        let computer = MessageLengthComputer::new(lattice);
        let model = DecomposableModel::independence(&computer);
        let mut queue = CandidateQueue::new(n_variables);
        queue.enable_all();
        info!(
            variables = n_variables,
            instances = n_instances,
            candidates = queue.tracked_len(),
            "prepared search"
        );

        Ok(Explorer {
            n_instances,
            n_variables,
            computer,
            model,
            queue,
            actions: Vec::new(),
            steps: Vec::new(),
            max_steps: config.max_steps,
        })
    }

    /// Runs the greedy search until no candidate shortens the total message, no candidate is
    /// left, or the step budget is spent.
    ///
    /// At each step, the best-scoring candidate edge is accepted only if the data-fit saving it
    /// brings is strictly greater than the extra cost of describing one more edge. Because the
    /// best candidate is always examined first, the first rejection ends the search.
    ///
    /// Calling this again continues from the current model.
    pub fn explore(&mut self) -> Exploration {
        let scorer = MmlScorer::new(&self.computer);
        self.queue.settle(&self.model, &scorer);

        let mut n_edges = self.model.edge_count();
        let mut data_fit = self.model.message_length();
        let mut structure = self.computer.structure_message_length(n_edges);
        let mut full = data_fit + structure;
        let mut steps = 0;
        let mut rejected = None;
        debug!(data_fit, structure, candidates = self.queue.len(), "starting search");

        let termination = loop {
            if self.max_steps.map_or(false, |max| n_edges >= max) {
                break Termination::StepBudget;
            }

            let candidate = match self.queue.poll() {
                Some(candidate) => candidate,
                None => break Termination::NoCandidates,
            };

            let candidate_data_fit = data_fit - candidate.score;
            let candidate_structure = self.computer.structure_message_length(n_edges + 1);
            let candidate_full = candidate_data_fit + candidate_structure;

            // Ties don't count as progress; a NaN never does.
            if !(candidate_full < full) {
                trace!(
                    a = candidate.action.a(),
                    b = candidate.action.b(),
                    score = candidate.score,
                    candidate_full,
                    full,
                    "rejected edge"
                );
                // Put it back so that a later call can reconsider it.
                self.queue.enable(candidate.action);
                rejected = Some(Rejection {
                    action: candidate,
                    full: candidate_full,
                });
                break Termination::NoImprovement;
            }

            self.actions.push(candidate);
            self.model
                .perform_action(candidate.action, &self.computer, &mut self.queue);
            n_edges += 1;
            steps += 1;
            data_fit = candidate_data_fit;
            structure = candidate_structure;
            full = candidate_full;

            debug_assert!(
                (self.model.message_length() - data_fit).abs() <= 1e-6 * data_fit.abs().max(1.0),
                "running data-fit {} drifted from the model's {}",
                data_fit,
                self.model.message_length()
            );
            debug!(
                a = candidate.action.a(),
                b = candidate.action.b(),
                score = candidate.score,
                full,
                "accepted edge"
            );
            self.steps.push(Step {
                action: candidate,
                data_fit,
                structure,
            });

            self.queue.settle(&self.model, &scorer);
        };

        info!(?termination, edges = n_edges, steps, full, "search finished");
        Exploration {
            termination,
            data_fit,
            structure,
            steps,
            rejected,
        }
    }

    /// The model built so far.
    pub fn model(&self) -> &DecomposableModel {
        &self.model
    }

    /// Every accepted action, in the order it was accepted.
    pub fn actions(&self) -> &[ScoredGraphAction] {
        &self.actions
    }

    /// The message lengths after each accepted action.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The candidate queue.
    pub fn queue(&self) -> &CandidateQueue {
        &self.queue
    }

    /// The message-length computer, which also holds the coded data.
    pub fn computer(&self) -> &MessageLengthComputer {
        &self.computer
    }

    /// The number of instances in the data.
    pub fn n_instances(&self) -> usize {
        self.n_instances
    }

    /// The number of variables in the data.
    pub fn n_variables(&self) -> usize {
        self.n_variables
    }

    /// The total message length of the current model: its data-fit cost plus the cost of its
    /// graph.
    pub fn message_length(&self) -> f64 {
        self.model.message_length()
            + self
                .computer
                .structure_message_length(self.model.edge_count())
    }
}
