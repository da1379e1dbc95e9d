//! Packs a batch of orders and records each one in its own transaction.
//!
//! A persistence failure only affects the order it happened in: that order
//! is rolled back and reported with the sentinel id `0`, while the rest of
//! the batch carries on.

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::model::{OrderPackingResult, OrderRequest, PackedBox, Product};
use crate::optimizer::{FirstFitDecreasing, PackingError, PackingStrategy};
use crate::repository::{OrderId, OrderRepository, PersistenceError, UnitOfWork};

/// Errors that abort a whole `process_orders` call.
#[derive(Debug, Error)]
pub enum ProcessOrdersError {
    #[error(transparent)]
    Packing(#[from] PackingError),

    #[error("could not load the box catalog: {0}")]
    Catalog(#[source] PersistenceError),
}

/// Overall outcome of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every order was persisted.
    Complete,
    /// Some orders were persisted, some were rolled back.
    Partial,
    /// No order was persisted.
    Failed,
}

impl BatchStatus {
    pub fn from_results(results: &[OrderPackingResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_persisted()).count();
        if failed == 0 {
            BatchStatus::Complete
        } else if failed == results.len() {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

/// Drives the packing strategy and persists its decisions per order.
#[derive(Clone, Debug)]
pub struct OrderPackingService<R, S = FirstFitDecreasing> {
    repository: R,
    strategy: S,
}

impl<R, S> OrderPackingService<R, S>
where
    R: OrderRepository,
    S: PackingStrategy,
{
    pub fn new(repository: R, strategy: S) -> Self {
        Self {
            repository,
            strategy,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Packs and persists every order of the batch.
    ///
    /// Returns one result per order, in request order. Fails as a whole only
    /// when an order has no products list or the box catalog cannot be read;
    /// in both cases nothing has been written.
    pub async fn process_orders(
        &self,
        orders: &[OrderRequest],
        owner_id: i64,
    ) -> Result<Vec<OrderPackingResult>, ProcessOrdersError> {
        info!(orders = orders.len(), owner_id, "processing order batch");

        let catalog = self
            .repository
            .list_box_templates()
            .await
            .map_err(ProcessOrdersError::Catalog)?;

        let packed_orders = orders
            .iter()
            .enumerate()
            .map(|(idx, order)| self.strategy.pack_order(order, idx, &catalog))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(orders.len());
        for (idx, (order, packed)) in orders.iter().zip(&packed_orders).enumerate() {
            let order_ref = order.reference(idx);
            let products = order.products.as_deref().unwrap_or_default();

            match self.persist_order(&order_ref, products, packed, owner_id).await {
                Ok(order_id) => {
                    info!(order_ref = %order_ref, order_id, boxes = packed.len(), "order persisted");
                    results.push(OrderPackingResult::persisted(order_id, packed));
                }
                Err(err) => {
                    error!(order_ref = %order_ref, error = %err, "failed to persist order, transaction rolled back");
                    results.push(OrderPackingResult::rolled_back(packed));
                }
            }
        }

        match BatchStatus::from_results(&results) {
            BatchStatus::Complete => info!(orders = results.len(), "order batch completed"),
            status => {
                let failed = results.iter().filter(|r| !r.is_persisted()).count();
                warn!(?status, failed, orders = results.len(), "order batch finished with failures");
            }
        }

        Ok(results)
    }

    /// Writes one order inside its own unit of work.
    async fn persist_order(
        &self,
        order_ref: &str,
        products: &[Product],
        packed: &[PackedBox],
        owner_id: i64,
    ) -> Result<OrderId, PersistenceError> {
        let mut uow = self.repository.begin().await?;

        match write_order(&mut uow, order_ref, products, packed, owner_id).await {
            Ok(order_id) => {
                uow.commit().await?;
                Ok(order_id)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(order_ref, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

async fn write_order<U: UnitOfWork>(
    uow: &mut U,
    order_ref: &str,
    products: &[Product],
    packed: &[PackedBox],
    owner_id: i64,
) -> Result<OrderId, PersistenceError> {
    let mut items = Vec::with_capacity(products.len());
    for product in products {
        items.push(uow.find_or_create_product(product).await?);
    }

    let order_id = uow.create_order(owner_id, Utc::now(), &items).await?;

    for packed_box in packed {
        if packed_box.is_unassigned() {
            // Nothing to link; the result still reports the box.
            warn!(
                order_ref,
                order_id,
                products = %packed_box.product_names().join(", "),
                observation = packed_box.observation.as_deref().unwrap_or_default(),
                "products fit no available box"
            );
            continue;
        }

        match uow.find_box_template(&packed_box.box_type).await? {
            Some(box_id) => {
                uow.link_order_box(order_id, box_id, packed_box.observation.as_deref())
                    .await?;
            }
            None => {
                error!(
                    order_ref,
                    order_id,
                    box_type = %packed_box.box_type,
                    "box type is missing from the persisted catalog, link skipped"
                );
            }
        }
    }

    Ok(order_id)
}
