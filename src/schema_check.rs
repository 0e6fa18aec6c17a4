//! Warehouse schema verification
//!
//! Confirms the objects the ETL jobs depend on exist (staging tables,
//! dimension tables, load procedures) and that the customer dimension keeps
//! its key invariants. The expected objects are compiled in; nothing
//! caller-supplied reaches the catalog queries.

use crate::db::Warehouse;
use crate::error::AppError;
use crate::models::{IntegrityProbe, SchemaObject};
use serde::Serialize;
use tracing::{info, warn};

pub const STAGING_TABLES: [SchemaObject; 3] = [
    SchemaObject::table("staging", "customers"),
    SchemaObject::table("staging", "products"),
    SchemaObject::table("staging", "sales_orders"),
];

pub const DIMENSION_TABLES: [SchemaObject; 3] = [
    SchemaObject::table("dwh", "dim_customer"),
    SchemaObject::table("dwh", "dim_product"),
    SchemaObject::table("dwh", "dim_date"),
];

pub const LOAD_PROCEDURES: [SchemaObject; 3] = [
    SchemaObject::procedure("dwh", "load_dim_customer"),
    SchemaObject::procedure("dwh", "load_dim_product"),
    SchemaObject::procedure("dwh", "load_fact_sales"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCheck {
    #[serde(flatten)]
    pub object: SchemaObject,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityCheck {
    pub probe: IntegrityProbe,
    pub violations: i64,
    pub passed: bool,
}

/// `GET /api/warehouse/schema` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaReport {
    pub healthy: bool,
    pub objects: Vec<ObjectCheck>,
    pub integrity: Vec<IntegrityCheck>,
}

/// Run every object and integrity check against `warehouse`
///
/// Integrity probes read `dwh.dim_customer`, so they only run when that
/// table exists.
pub async fn verify(warehouse: &dyn Warehouse) -> Result<SchemaReport, AppError> {
    let mut objects = Vec::new();
    for object in STAGING_TABLES
        .iter()
        .chain(DIMENSION_TABLES.iter())
        .chain(LOAD_PROCEDURES.iter())
    {
        let exists = warehouse.object_exists(object).await?;
        if !exists {
            warn!("Expected {:?} {} does not exist", object.kind, object);
        }
        objects.push(ObjectCheck {
            object: *object,
            exists,
        });
    }

    let customer_dimension_present = objects
        .iter()
        .any(|c| c.object == DIMENSION_TABLES[0] && c.exists);

    let mut integrity = Vec::new();
    if customer_dimension_present {
        for probe in IntegrityProbe::ALL {
            let violations = warehouse.integrity_violations(probe).await?;
            integrity.push(IntegrityCheck {
                probe,
                violations,
                passed: violations == 0,
            });
        }
    }

    let healthy = objects.iter().all(|c| c.exists)
        && integrity.iter().all(|c| c.passed);

    info!(
        "Schema verification: {}/{} objects present, healthy = {}",
        objects.iter().filter(|c| c.exists).count(),
        objects.len(),
        healthy
    );

    Ok(SchemaReport {
        healthy,
        objects,
        integrity,
    })
}
