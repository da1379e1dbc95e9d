//! Data models for order packing.
//!
//! This module defines the fundamental data structures:
//! - `Product`: an item to be packed, identified by name and dimensions
//! - `BoxTemplate`: a box design available in unlimited supply
//! - `PackedBox`: a box opened during one packing run with its products
//! - `OrderRequest` / `OrderPackingResult`: per-order input and outcome

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Dimensional, Dimensions};

/// Box type used for products that fit no available template.
pub const UNASSIGNED_BOX_TYPE: &str = "N/A";

/// Order id reported when packing succeeded but persistence was rolled back.
pub const FAILED_ORDER_ID: i64 = 0;

/// Validation error for incoming orders.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("No orders provided")]
    NoOrders,

    #[error("Order {order_ref} has no products")]
    MissingProducts { order_ref: String },

    #[error("A product of order {order_ref} has an empty name")]
    EmptyProductName { order_ref: String },

    #[error(
        "Product '{name}' of order {order_ref} has invalid dimensions ({height}x{width}x{length}); all must be greater than zero"
    )]
    InvalidDimension {
        order_ref: String,
        name: String,
        height: Decimal,
        width: Decimal,
        length: Decimal,
    },

    #[error("Product '{name}' of order {order_ref} is too large: its volume exceeds the supported range")]
    VolumeOverflow { order_ref: String, name: String },
}

/// A product to be packed.
///
/// # Fields
/// * `name` - Product name, part of its catalog identity
/// * `height`, `width`, `length` - Dimensions, never rotated
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    #[schema(example = "PS5")]
    pub name: String,
    #[schema(value_type = f64, example = 40.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub height: Decimal,
    #[schema(value_type = f64, example = 10.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub width: Decimal,
    #[schema(value_type = f64, example = 25.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub length: Decimal,
}

impl Product {
    pub fn new(name: impl Into<String>, height: Decimal, width: Decimal, length: Decimal) -> Self {
        Self {
            name: name.into(),
            height,
            width,
            length,
        }
    }
}

impl Dimensional for Product {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.height, self.width, self.length)
    }
}

/// A box design from the catalog.
///
/// The supply of every template is unlimited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxTemplate {
    #[schema(example = "Box 1")]
    pub box_type: String,
    #[schema(value_type = f64, example = 30.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub height: Decimal,
    #[schema(value_type = f64, example = 40.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub width: Decimal,
    #[schema(value_type = f64, example = 80.0)]
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub length: Decimal,
}

impl BoxTemplate {
    pub fn new(
        box_type: impl Into<String>,
        height: Decimal,
        width: Decimal,
        length: Decimal,
    ) -> Self {
        Self {
            box_type: box_type.into(),
            height,
            width,
            length,
        }
    }
}

impl Dimensional for BoxTemplate {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.height, self.width, self.length)
    }
}

/// A box opened during a packing run.
///
/// Either a real template holding one or more products, or the `"N/A"`
/// sentinel sized to the single product that fits nowhere, with an
/// explanation in `observation`.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedBox {
    pub box_type: String,
    pub dimensions: Dimensions,
    pub products: Vec<Product>,
    pub observation: Option<String>,
    capacity: Decimal,
    used_volume: Decimal,
}

impl PackedBox {
    /// Opens a box of the given template with its first product.
    ///
    /// `capacity` is the template volume and `volume` the product volume,
    /// both computed by the caller.
    pub fn open(
        template: &BoxTemplate,
        capacity: Decimal,
        product: Product,
        volume: Decimal,
    ) -> Self {
        Self {
            box_type: template.box_type.clone(),
            dimensions: template.dimensions(),
            products: vec![product],
            observation: None,
            capacity,
            used_volume: volume,
        }
    }

    /// Creates the sentinel box for a product no template can hold.
    pub fn unassigned(product: Product) -> Self {
        let observation = format!(
            "Product '{}' does not fit in any of the available boxes.",
            product.name
        );
        Self::sentinel(product, observation)
    }

    /// Sentinel box for a product whose volume cannot be computed.
    pub fn oversized(product: Product) -> Self {
        let observation = format!(
            "Product '{}' is too large to measure and does not fit in any of the available boxes.",
            product.name
        );
        Self::sentinel(product, observation)
    }

    fn sentinel(product: Product, observation: String) -> Self {
        let volume = product.volume().unwrap_or(Decimal::MAX);
        Self {
            box_type: UNASSIGNED_BOX_TYPE.to_string(),
            dimensions: product.dimensions(),
            products: vec![product],
            observation: Some(observation),
            capacity: volume,
            used_volume: volume,
        }
    }

    /// Adds a product whose room was already checked, keeping the running total.
    pub fn place(&mut self, product: Product, volume: Decimal) {
        self.used_volume = self.used_volume.saturating_add(volume);
        self.products.push(product);
    }

    /// Indicates whether this is the `"N/A"` sentinel box.
    pub fn is_unassigned(&self) -> bool {
        self.box_type == UNASSIGNED_BOX_TYPE
    }

    /// Sum of the volumes of all products in the box.
    pub fn used_volume(&self) -> Decimal {
        self.used_volume
    }

    /// Volume of the box template.
    pub fn capacity(&self) -> Decimal {
        self.capacity
    }

    /// Names of the products in placement order.
    pub fn product_names(&self) -> Vec<String> {
        self.products.iter().map(|p| p.name.clone()).collect()
    }
}

impl Dimensional for PackedBox {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// A single order of a packing request.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "order_id": 1,
        "products": [
            { "name": "PS5", "height": 40.0, "width": 10.0, "length": 25.0 },
            { "name": "Volante", "height": 40.0, "width": 30.0, "length": 30.0 }
        ]
    })
)]
pub struct OrderRequest {
    /// Caller-side order reference, only used for logging.
    #[serde(default)]
    #[schema(nullable = true)]
    pub order_id: Option<i64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub products: Option<Vec<Product>>,
}

impl OrderRequest {
    pub fn new(order_id: Option<i64>, products: Vec<Product>) -> Self {
        Self {
            order_id,
            products: Some(products),
        }
    }

    /// Reference used in logs and error messages.
    ///
    /// Falls back to the 1-based position in the batch when the caller sent
    /// no order id.
    pub fn reference(&self, index: usize) -> String {
        match self.order_id {
            Some(id) => id.to_string(),
            None => format!("#{}", index + 1),
        }
    }

    /// Checks the order the way the HTTP layer requires it.
    ///
    /// The packing strategy itself tolerates non-positive dimensions; this
    /// check is where they are rejected.
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        let order_ref = self.reference(index);
        let products = match self.products.as_deref() {
            Some(products) if !products.is_empty() => products,
            _ => return Err(ValidationError::MissingProducts { order_ref }),
        };

        for product in products {
            if product.name.trim().is_empty() {
                return Err(ValidationError::EmptyProductName { order_ref });
            }
            if !product.dimensions().is_valid() {
                return Err(ValidationError::InvalidDimension {
                    order_ref,
                    name: product.name.clone(),
                    height: product.height,
                    width: product.width,
                    length: product.length,
                });
            }
            if product.volume().is_none() {
                return Err(ValidationError::VolumeOverflow {
                    order_ref,
                    name: product.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Validates a whole batch, stopping at the first invalid order.
pub fn validate_orders(orders: &[OrderRequest]) -> Result<(), ValidationError> {
    if orders.is_empty() {
        return Err(ValidationError::NoOrders);
    }
    orders
        .iter()
        .enumerate()
        .try_for_each(|(idx, order)| order.validate(idx))
}

/// One box of an order result.
///
/// # Fields
/// * `box_id` - Box type, or `"N/A"` for products that fit nowhere
/// * `products` - Product names in placement order
/// * `observation` - Explanation for `"N/A"` boxes
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct BoxResult {
    #[schema(example = "Box 2")]
    pub box_id: String,
    pub products: Vec<String>,
    #[schema(nullable = true)]
    pub observation: Option<String>,
}

impl From<&PackedBox> for BoxResult {
    fn from(packed: &PackedBox) -> Self {
        Self {
            box_id: packed.box_type.clone(),
            products: packed.product_names(),
            observation: packed.observation.clone(),
        }
    }
}

/// Outcome of one order of a batch.
///
/// `order_id` is the persisted order id, or `0` when persistence failed and
/// was rolled back. `boxes` always holds the computed grouping.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct OrderPackingResult {
    pub order_id: i64,
    pub boxes: Vec<BoxResult>,
}

impl OrderPackingResult {
    pub fn persisted(order_id: i64, packed: &[PackedBox]) -> Self {
        Self {
            order_id,
            boxes: packed.iter().map(BoxResult::from).collect(),
        }
    }

    pub fn rolled_back(packed: &[PackedBox]) -> Self {
        Self::persisted(FAILED_ORDER_ID, packed)
    }

    pub fn is_persisted(&self) -> bool {
        self.order_id != FAILED_ORDER_ID
    }
}
