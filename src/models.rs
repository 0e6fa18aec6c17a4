//! Warehouse data models
//!
//! Rows and aggregates read from the ETL control and data-quality tables.
//! Every entity here is owned by the warehouse; this service only reads.

use crate::error::{validation_error, AppError};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// One row of `etl.etl_control`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtlControlRow {
    pub table_name: String,
    pub load_date: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub records_processed: i64,
    pub modified_date: Option<NaiveDateTime>,
}

/// Aggregates over control rows modified today, as computed by SQL
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadSummaryCounts {
    pub total: i64,
    pub successful: i64,
    pub total_records: i64,
    pub avg_duration_minutes: f64,
}

/// Data-quality check counts for the last day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityCounts {
    pub total: i64,
    pub passed: i64,
}

/// Bounded row count for listing queries, always sent as a bind parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimit(i64);

impl RowLimit {
    pub const DEFAULT: RowLimit = RowLimit(10);
    pub const MAX: i64 = 100;

    pub fn new(limit: i64) -> Result<Self, AppError> {
        if (1..=Self::MAX).contains(&limit) {
            Ok(Self(limit))
        } else {
            Err(validation_error(format!(
                "limit must be between 1 and {}, got {}",
                Self::MAX,
                limit
            )))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for RowLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Kind of catalog object a schema check looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    Procedure,
}

/// A schema-qualified warehouse object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub schema: &'static str,
    pub name: &'static str,
}

impl SchemaObject {
    pub const fn table(schema: &'static str, name: &'static str) -> Self {
        Self {
            kind: ObjectKind::Table,
            schema,
            name,
        }
    }

    pub const fn procedure(schema: &'static str, name: &'static str) -> Self {
        Self {
            kind: ObjectKind::Procedure,
            schema,
            name,
        }
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Fixed data-integrity probes on the customer dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityProbe {
    /// Rows with a NULL business key or name
    NullCustomerKeys,
    /// Business keys with more than one current row
    DuplicateCurrentCustomers,
}

impl IntegrityProbe {
    pub const ALL: [IntegrityProbe; 2] = [
        IntegrityProbe::NullCustomerKeys,
        IntegrityProbe::DuplicateCurrentCustomers,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_limit_bounds() {
        assert_eq!(RowLimit::new(1).unwrap().get(), 1);
        assert_eq!(RowLimit::new(100).unwrap().get(), 100);
        assert!(RowLimit::new(0).is_err());
        assert!(RowLimit::new(101).is_err());
        assert!(RowLimit::new(-5).is_err());
        assert_eq!(RowLimit::default().get(), 10);
    }

    #[test]
    fn test_schema_object_display() {
        assert_eq!(SchemaObject::table("dwh", "dim_customer").to_string(), "dwh.dim_customer");
    }
}
