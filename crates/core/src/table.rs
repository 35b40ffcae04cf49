//! Tabular results with CSV export

use crate::error::{Error, Result};
use crate::vector::AttributeValue;
use std::io::Write;
use std::path::Path;

/// A small ordered-column table.
///
/// Rows hold [`AttributeValue`]s; `Null` means no-data and exports as an
/// empty CSV field. Row order is meaningful (it matches the zone or point
/// ordering that produced the table) and is never changed by this type.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<AttributeValue>>,
}

impl Table {
    /// Create an empty table; column names must be unique
    pub fn new(columns: Vec<String>) -> Result<Self> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(Error::Table(format!("duplicate column '{}'", name)));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Append a row; arity must match the column count
    pub fn push_row(&mut self, row: Vec<AttributeValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Table(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<AttributeValue>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[AttributeValue]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Table(format!("unknown column '{}'", name)))
    }

    /// Value at (row, column name)
    pub fn value(&self, row: usize, column: &str) -> Result<&AttributeValue> {
        let col = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[col])
            .ok_or_else(|| Error::Table(format!("row {} out of range", row)))
    }

    /// A whole column as numbers; Null/Text become `None`
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let col = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[col].as_f64()).collect())
    }

    /// Write the table as CSV with a header row
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)
            .map_err(|e| Error::Table(e.to_string()))?;
        for row in &self.rows {
            let record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.write_record(&record)
                .map_err(|e| Error::Table(e.to_string()))?;
        }
        out.flush()?;
        Ok(())
    }

    /// CSV as an owned string
    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.to_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::Table(e.to_string()))
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.to_csv(file)
    }
}
