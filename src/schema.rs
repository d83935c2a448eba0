//! Column insertion: schema rewriting and row projection.

use csv::ByteRecord;

use crate::error::{Error, Result};

/// Compute the schema with `new_col` inserted right after `target`.
///
/// # Examples
/// ```
/// use geoip_enrich::insert_column;
///
/// let schema: Vec<String> = ["a", "ip", "b", "c"].iter().map(|s| s.to_string()).collect();
/// let out = insert_column(&schema, "ip", "geoip").unwrap();
/// assert_eq!(out, ["a", "ip", "geoip", "b", "c"]);
/// ```
pub fn insert_column(schema: &[String], target: &str, new_col: &str) -> Result<Vec<String>> {
    Ok(ColumnInsertion::new(schema, target, new_col)?.output)
}

/// A resolved column insertion plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInsertion {
    /// Index of the source column in the input schema
    index: usize,
    input: Vec<String>,
    output: Vec<String>,
}

impl ColumnInsertion {
    /// Plan the insertion of `new_col` after `target`.
    ///
    /// Fails with [`Error::ColumnNotFound`] if `target` is absent and with
    /// [`Error::SchemaCollision`] if `new_col` already exists.
    pub fn new(schema: &[String], target: &str, new_col: &str) -> Result<Self> {
        let index = schema
            .iter()
            .position(|name| name == target)
            .ok_or_else(|| Error::ColumnNotFound(target.to_string()))?;

        if schema.iter().any(|name| name == new_col) {
            return Err(Error::SchemaCollision(new_col.to_string()));
        }

        let mut output = Vec::with_capacity(schema.len() + 1);
        output.extend_from_slice(&schema[..=index]);
        output.push(new_col.to_string());
        output.extend_from_slice(&schema[index + 1..]);

        Ok(Self {
            index,
            input: schema.to_vec(),
            output,
        })
    }

    /// Index of the source column in the input schema.
    pub fn source_index(&self) -> usize {
        self.index
    }

    /// Name of the source column.
    pub fn source_column(&self) -> &str {
        &self.input[self.index]
    }

    /// Name of the inserted column.
    pub fn new_column(&self) -> &str {
        &self.output[self.index + 1]
    }

    /// The output schema.
    pub fn output_schema(&self) -> &[String] {
        &self.output
    }

    /// Get the source cell of a row.
    pub fn source_cell<'r>(&self, row: &'r ByteRecord) -> Option<&'r [u8]> {
        row.get(self.index)
    }

    /// Rewrite a row for the output schema, placing `value` in the new
    /// column and keeping every other cell in its original order.
    pub fn project(&self, row: &ByteRecord, value: &[u8]) -> ByteRecord {
        let mut out = ByteRecord::with_capacity(row.as_slice().len() + value.len(), row.len() + 1);
        for (i, cell) in row.iter().enumerate() {
            out.push_field(cell);
            if i == self.index {
                out.push_field(value);
            }
        }
        out
    }
}
