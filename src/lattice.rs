//! Sufficient statistics: contingency counts over any subset of the variables.

use crate::data::{is_missing, read_records};
use crate::{Dataset, Error, Format, Result, Schema, Variable, VariableSet};
use std::collections::HashMap;
use std::io;

/// How missing values are treated when coding the data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MissingValues {
    /// Every variable gets one extra category, which missing values fall into. The extra
    /// category counts toward the variable's arity whether or not any value is actually
    /// missing.
    Reserve,
    /// Variables have exactly their observed categories, and a missing value is an error.
    Reject,
}

impl Default for MissingValues {
    fn default() -> Self {
        MissingValues::Reserve
    }
}

/// The coded dataset, stored by column, from which the counts for any set of variables can be
/// computed.
#[derive(Clone, Debug)]
pub struct Lattice {
    arities: Vec<u32>,
    columns: Vec<Vec<u32>>,
    n_instances: usize,
}

impl Lattice {
    fn with_schema(schema: &Schema, missing: MissingValues) -> Lattice {
        let reserved = match missing {
            MissingValues::Reserve => 1,
            MissingValues::Reject => 0,
        };
        Lattice {
            arities: schema
                .variables()
                .map(|variable| variable.n_categories() as u32 + reserved)
                .collect(),
            columns: vec![Vec::new(); schema.len()],
            n_instances: 0,
        }
    }

    /// Appends one instance. `codes` yields each column's category code, or `None` if missing.
    fn push_row<I>(
        &mut self,
        schema: &Schema,
        line: u64,
        missing: MissingValues,
        codes: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Option<u32>>,
    {
        for (index, code) in codes.into_iter().enumerate() {
            let code = match (code, missing) {
                (Some(code), _) => code,
                (None, MissingValues::Reserve) => self.arities[index] - 1,
                (None, MissingValues::Reject) => {
                    return Err(Error::MissingValue {
                        line,
                        variable: schema.variable(index).name().to_owned(),
                    });
                }
            };
            self.columns[index].push(code);
        }
        self.n_instances += 1;
        Ok(())
    }

    /// Codes a materialized dataset.
    pub fn from_dataset(dataset: &Dataset, missing: MissingValues) -> Result<Lattice> {
        let schema = dataset.schema();
        let mut lattice = Lattice::with_schema(schema, missing);
        for column in lattice.columns.iter_mut() {
            column.reserve_exact(dataset.n_instances());
        }
        for (index, row) in dataset.rows().enumerate() {
            // The header is line 1.
            let line = index as u64 + 2;
            lattice.push_row(schema, line, missing, row.iter().copied())?;
        }
        Ok(lattice)
    }

    /// Codes rows straight from a delimited-text input, using the categories of a schema that
    /// was built beforehand (typically by [`Schema::scan`] over the same input). The rows are
    /// never held in memory as text.
    ///
    /// The input's header must name the same variables as the schema, in the same order.
    pub fn from_stream<R: io::Read>(
        schema: &Schema,
        input: R,
        format: Format,
        missing: MissingValues,
    ) -> Result<Lattice> {
        let mut lattice = Lattice::with_schema(schema, missing);
        let mut header_seen = false;
        let mut codes = Vec::with_capacity(schema.len());

        read_records(input, format, |line, fields| {
            if fields.len() != schema.len() {
                return Err(Error::Parse {
                    line,
                    message: format!("expected {} fields, found {}", schema.len(), fields.len()),
                });
            }

            if !header_seen {
                header_seen = true;
                if let Some((field, variable)) = fields
                    .iter()
                    .zip(schema.variables())
                    .find(|(field, variable)| **field != variable.name())
                {
                    return Err(Error::Parse {
                        line,
                        message: format!(
                            "header names {:?} where the schema has {:?}",
                            field,
                            variable.name()
                        ),
                    });
                }
                return Ok(());
            }

            codes.clear();
            for (label, variable) in fields.iter().zip(schema.variables()) {
                if is_missing(label) {
                    codes.push(None);
                } else {
                    let code = variable.code(label).ok_or_else(|| Error::UnknownCategory {
                        line,
                        variable: variable.name().to_owned(),
                        category: (*label).to_owned(),
                    })?;
                    codes.push(Some(code));
                }
            }
            lattice.push_row(schema, line, missing, codes.iter().copied())
        })?;

        for column in lattice.columns.iter_mut() {
            column.shrink_to_fit();
        }
        Ok(lattice)
    }

    /// The number of instances coded so far.
    pub fn n_instances(&self) -> usize {
        self.n_instances
    }

    /// The number of variables.
    pub fn n_variables(&self) -> usize {
        self.arities.len()
    }

    /// The number of categories of a variable, including the reserved missing-value category if
    /// there is one.
    pub fn arity(&self, variable: Variable) -> u32 {
        self.arities[variable as usize]
    }

    /// The number of cells in the full contingency table over `variables`, which is the product
    /// of their arities. This is computed in floating point because it easily exceeds any
    /// integer type for large sets.
    pub fn n_cells(&self, variables: &VariableSet) -> f64 {
        variables
            .iter()
            .map(|variable| f64::from(self.arity(variable)))
            .product()
    }

    /// Returns the counts of the non-empty cells in the contingency table over `variables`,
    /// sorted in increasing order.
    ///
    /// The table for the empty set has one cell holding every instance.
    pub fn counts(&self, variables: &VariableSet) -> Vec<u64> {
        let mut iter = variables.iter();
        let first = match iter.next() {
            Some(first) => first,
            None if self.n_instances > 0 => return vec![self.n_instances as u64],
            None => return Vec::new(),
        };

        // Refine a partition of the instances one variable at a time. Group ids stay dense, so
        // the final tally fits in a vector.
        let mut groups = self.columns[first as usize].clone();
        let mut n_groups = self.arity(first) as usize;
        let mut ids = HashMap::new();
        for variable in iter {
            ids.clear();
            for (group, value) in groups.iter_mut().zip(self.columns[variable as usize].iter()) {
                let next = ids.len() as u32;
                *group = *ids.entry((*group, *value)).or_insert(next);
            }
            n_groups = ids.len();
        }

        let mut counts = vec![0u64; n_groups];
        for group in groups {
            counts[group as usize] += 1;
        }
        counts.retain(|count| *count > 0);
        counts.sort_unstable();
        counts
    }
}
