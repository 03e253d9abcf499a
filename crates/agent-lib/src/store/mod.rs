//! Remote record store integration

mod client;
mod reconcile;
mod types;

pub use client::{StoreClient, StoreError};
pub use reconcile::Reconciler;
pub use types::{
    de_flexible_bool, de_flexible_datetime, de_flexible_f64, de_flexible_i64, CommandRecord,
    ContainerMetricsRecord, ContainerRecord, ListResponse, MetricsRecord, ServerRecord,
};
