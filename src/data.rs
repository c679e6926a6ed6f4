//! Loading categorical data from delimited text.

use crate::{Error, Result};
use csv_core::{ReadFieldResult, ReaderBuilder};
use lasso::{Key, Rodeo, RodeoReader, Spur};
use smallvec::SmallVec;
use std::io;
use std::str;

/// The field delimiter used by an input file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    /// Tab-separated values.
    Tsv,
    /// Comma-separated values.
    Csv,
}

impl Format {
    fn delimiter(self) -> u8 {
        match self {
            Format::Tsv => b'\t',
            Format::Csv => b',',
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Tsv
    }
}

/// Returns `true` for the field values that mean "this value wasn't observed".
pub(crate) fn is_missing(label: &str) -> bool {
    label.is_empty() || label == "?"
}

/// Feeds every record of a delimited-text input to `on_record`, along with its record number.
/// The header counts as record 1.
pub(crate) fn read_records<R, F>(mut input: R, format: Format, mut on_record: F) -> Result<()>
where
    R: io::Read,
    F: FnMut(u64, &[&str]) -> Result<()>,
{
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record = String::new();
    let mut ends = Vec::new();
    let mut line = 0;
    let mut reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = reader.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(Error::Parse {
                        line: line + 1,
                        message: format!("field longer than {} bytes", fieldbuf.len()),
                    });
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen]).map_err(|e| Error::Parse {
                        line: line + 1,
                        message: e.to_string(),
                    })?;
                    record.push_str(field.trim());
                    ends.push(record.len());
                    fieldlen = 0;

                    if record_end {
                        line += 1;
                        {
                            let mut start = 0;
                            let fields: SmallVec<[&str; 16]> = ends
                                .iter()
                                .map(|&end| {
                                    let field = &record[start..end];
                                    start = end;
                                    field
                                })
                                .collect();
                            on_record(line, &fields[..])?;
                        }
                        record.clear();
                        ends.clear();
                    }
                }
                ReadFieldResult::End => return Ok(()),
            }

            // An empty slice tells csv-core the input is over, which is only true once `read`
            // returned 0.
            if bytes.is_empty() && read > 0 {
                break;
            }
        }
    }
}

/// A categorical variable: its name and the labels of the categories it takes.
///
/// Category codes are assigned in order of first appearance, starting at 0.
pub struct VariableInfo {
    name: String,
    categories: RodeoReader<Spur>,
}

impl VariableInfo {
    /// Declares a variable with a known list of categories. Duplicate labels are merged.
    ///
    /// ```
    /// use chordalysis::VariableInfo;
    ///
    /// let colour = VariableInfo::new("colour", ["red", "green", "red"].iter().copied());
    /// assert_eq!(colour.n_categories(), 2);
    /// assert_eq!(colour.code("green"), Some(1));
    /// assert_eq!(colour.category(0), Some("red"));
    /// ```
    pub fn new<'a, I>(name: &str, categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut rodeo: Rodeo<Spur> = Rodeo::new();
        for label in categories {
            rodeo.get_or_intern(label);
        }
        VariableInfo {
            name: name.to_owned(),
            categories: rodeo.into_reader(),
        }
    }

    /// The variable's name, from the header of the input.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of distinct categories observed for this variable, not counting missing
    /// values.
    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }

    /// Looks up the code for a category label.
    pub fn code(&self, label: &str) -> Option<u32> {
        self.categories.get(label).map(|key| key.into_usize() as u32)
    }

    /// Looks up the label for a category code.
    pub fn category(&self, code: u32) -> Option<&str> {
        if code as usize >= self.categories.len() {
            return None;
        }
        let key = Spur::try_from_usize(code as usize)?;
        Some(self.categories.resolve(&key))
    }
}

impl std::fmt::Debug for VariableInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableInfo")
            .field("name", &self.name)
            .field("n_categories", &self.n_categories())
            .finish()
    }
}

/// The variables of a dataset, in column order.
#[derive(Debug, Default)]
pub struct Schema {
    variables: Vec<VariableInfo>,
}

impl Schema {
    /// Creates a schema from variables declared up front.
    pub fn new(variables: Vec<VariableInfo>) -> Self {
        Schema { variables }
    }

    /// Reads the header and every row of a delimited-text input to discover each variable's
    /// categories, without keeping the rows.
    ///
    /// This is the first pass over an input that's then streamed into a
    /// [`Lattice`][crate::Lattice], for datasets too large to hold in memory twice.
    pub fn scan<R: io::Read>(input: R, format: Format) -> Result<Schema> {
        let mut builder = SchemaBuilder::default();
        let mut codes = Vec::new();
        read_records(input, format, |line, fields| {
            builder.observe(line, fields, &mut codes)
        })?;
        Ok(builder.finish())
    }

    /// The number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Returns the variable in the given column.
    pub fn variable(&self, index: usize) -> &VariableInfo {
        &self.variables[index]
    }

    /// Returns an iterator over the variables in column order.
    pub fn variables(&self) -> impl ExactSizeIterator<Item = &VariableInfo> + '_ {
        self.variables.iter()
    }
}

/// Collects variable names from the header and interns category labels from the rows.
#[derive(Default)]
struct SchemaBuilder {
    names: Option<Vec<String>>,
    categories: Vec<Rodeo<Spur>>,
}

impl SchemaBuilder {
    /// Handles one record. For data rows, `codes` is filled with each field's category code,
    /// or `None` for a missing value; it's left empty after the header.
    fn observe(&mut self, line: u64, fields: &[&str], codes: &mut Vec<Option<u32>>) -> Result<()> {
        codes.clear();
        if self.names.is_none() {
            self.names = Some(fields.iter().map(|name| (*name).to_owned()).collect());
            self.categories = fields.iter().map(|_| Rodeo::new()).collect();
            return Ok(());
        }

        let expected = self.categories.len();
        if fields.len() != expected {
            return Err(Error::Parse {
                line,
                message: format!("expected {} fields, found {}", expected, fields.len()),
            });
        }

        codes.extend(
            fields
                .iter()
                .zip(self.categories.iter_mut())
                .map(|(label, rodeo)| {
                    if is_missing(label) {
                        None
                    } else {
                        Some(rodeo.get_or_intern(*label).into_usize() as u32)
                    }
                }),
        );
        Ok(())
    }

    fn finish(self) -> Schema {
        let variables = self
            .names
            .unwrap_or_default()
            .into_iter()
            .zip(self.categories)
            .map(|(name, rodeo)| VariableInfo {
                name,
                categories: rodeo.into_reader(),
            })
            .collect();
        Schema { variables }
    }
}

/// A fully materialized categorical dataset.
#[derive(Debug)]
pub struct Dataset {
    schema: Schema,
    rows: Vec<Box<[Option<u32>]>>,
}

impl Dataset {
    /// Reads a dataset from delimited text. The first record names the variables; every
    /// following record is one instance. An empty field or `?` marks a missing value.
    ///
    /// ```
    /// use chordalysis::{Dataset, Format};
    ///
    /// let dataset = Dataset::from_reader("a,b\nx,1\ny,?\n".as_bytes(), Format::Csv).unwrap();
    /// assert_eq!(dataset.n_variables(), 2);
    /// assert_eq!(dataset.n_instances(), 2);
    /// assert_eq!(dataset.row(1), &[Some(1), None]);
    /// ```
    pub fn from_reader<R: io::Read>(input: R, format: Format) -> Result<Dataset> {
        let mut builder = SchemaBuilder::default();
        let mut codes = Vec::new();
        let mut rows = Vec::new();
        read_records(input, format, |line, fields| {
            builder.observe(line, fields, &mut codes)?;
            if !codes.is_empty() {
                rows.push(codes.as_slice().into());
            }
            Ok(())
        })?;
        rows.shrink_to_fit();
        Ok(Dataset {
            schema: builder.finish(),
            rows,
        })
    }

    /// The variables of this dataset.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The number of variables (columns).
    pub fn n_variables(&self) -> usize {
        self.schema.len()
    }

    /// The number of instances (rows).
    pub fn n_instances(&self) -> usize {
        self.rows.len()
    }

    /// The category codes of one instance, in column order.
    pub fn row(&self, index: usize) -> &[Option<u32>] {
        &self.rows[index]
    }

    /// Returns an iterator over every instance.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[Option<u32>]> + '_ {
        self.rows.iter().map(|row| &row[..])
    }
}
