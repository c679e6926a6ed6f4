use std::io;
use thiserror::Error;

/// A specialized result type for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported while loading data or setting up a search.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input could not be parsed as delimited text.
    #[error("line {line}: {message}")]
    Parse {
        /// The line of the input where the problem was found.
        line: u64,
        /// A human-readable description of the problem.
        message: String,
    },

    /// While streaming rows against a fixed schema, a row used a category that the schema
    /// doesn't know.
    #[error("line {line}: unknown category {category:?} for variable {variable:?}")]
    UnknownCategory {
        /// The line of the input where the category appeared.
        line: u64,
        /// The name of the variable.
        variable: String,
        /// The unrecognized category label.
        category: String,
    },

    /// A row had a missing value, but no category was reserved for missing values.
    #[error("line {line}: missing value for variable {variable:?}")]
    MissingValue {
        /// The line of the input where the value was missing.
        line: u64,
        /// The name of the variable.
        variable: String,
    },

    /// The dataset can't support a search at all.
    #[error("structural input error: {0}")]
    Structure(#[from] StructureError),
}

impl Error {
    /// Returns `true` if this error means the dataset's shape makes a search impossible.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structure(_))
    }
}

/// Ways in which a dataset can be unfit for a search.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    /// The dataset has no columns.
    #[error("the dataset has no variables")]
    NoVariables,

    /// The dataset has no rows.
    #[error("the dataset has no instances")]
    NoInstances,

    /// A variable takes fewer than two distinct values, so it can't carry any information.
    #[error("variable {name:?} has {arity} categories; at least 2 are needed")]
    DegenerateVariable {
        /// The name of the variable.
        name: String,
        /// The number of categories the model would see for this variable.
        arity: usize,
    },
}
