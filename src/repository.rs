//! Persistence ports used by the order packing service.
//!
//! `BoxCatalog` supplies box templates, `OrderRepository` opens one
//! `UnitOfWork` per order. A unit of work that is dropped without `commit`
//! is rolled back.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{BoxTemplate, Product};

pub type ProductId = i64;
pub type OrderId = i64;
pub type BoxTemplateId = i64;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("column {column} holds an invalid decimal '{value}'")]
    InvalidDecimal { column: &'static str, value: String },
}

/// Source of the available box templates.
pub trait BoxCatalog: Send + Sync {
    /// Lists all box templates. The result is used as a read-only snapshot.
    fn list_box_templates(
        &self,
    ) -> impl Future<Output = Result<Vec<BoxTemplate>, PersistenceError>> + Send;
}

/// Storage for orders and the products and boxes they reference.
pub trait OrderRepository: BoxCatalog {
    type UnitOfWork: UnitOfWork;

    /// Opens a new transactional unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::UnitOfWork, PersistenceError>> + Send;
}

/// Transactional boundary around the mutations of a single order.
pub trait UnitOfWork: Send {
    /// Returns the id of the product with exactly this name and these
    /// dimensions, creating it on first sighting.
    fn find_or_create_product(
        &mut self,
        product: &Product,
    ) -> impl Future<Output = Result<ProductId, PersistenceError>> + Send;

    /// Creates an order with one item per product id.
    fn create_order(
        &mut self,
        owner_id: i64,
        created_at: DateTime<Utc>,
        items: &[ProductId],
    ) -> impl Future<Output = Result<OrderId, PersistenceError>> + Send;

    /// Resolves a box type to its persisted template.
    fn find_box_template(
        &mut self,
        box_type: &str,
    ) -> impl Future<Output = Result<Option<BoxTemplateId>, PersistenceError>> + Send;

    /// Records that the order uses one box of the given template.
    fn link_order_box(
        &mut self,
        order_id: OrderId,
        box_id: BoxTemplateId,
        observation: Option<&str>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
