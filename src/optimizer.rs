//! Packing heuristic that assigns products to boxes.
//!
//! Implements first-fit-decreasing over a catalog of box templates:
//! - products are handled largest volume first
//! - each product goes into the first open box with room for it
//! - otherwise the smallest template that can hold it is opened
//! - products no template can hold end up in an `"N/A"` box
//!
//! Products are never rotated and weight is not modelled.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{BoxTemplate, OrderRequest, PackedBox, Product};
use crate::types::Dimensional;

/// Errors raised before any packing happens.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PackingError {
    /// The order carried no products list at all.
    #[error("order {order_ref} has no products list")]
    MissingProducts { order_ref: String },
}

/// Strategy that groups products into boxes.
///
/// Implementations must be pure: identical inputs always yield identical
/// output, and no shared state is touched.
pub trait PackingStrategy: Send + Sync {
    /// Groups `products` into boxes built from `templates`.
    ///
    /// Every product appears in exactly one returned box.
    fn pack(&self, products: &[Product], templates: &[BoxTemplate]) -> Vec<PackedBox>;

    /// Packs the products of an order, failing if the order has no products list.
    fn pack_order(
        &self,
        order: &OrderRequest,
        index: usize,
        templates: &[BoxTemplate],
    ) -> Result<Vec<PackedBox>, PackingError> {
        let products = order
            .products
            .as_deref()
            .ok_or_else(|| PackingError::MissingProducts {
                order_ref: order.reference(index),
            })?;
        Ok(self.pack(products, templates))
    }
}

/// First-fit-decreasing packing.
///
/// The first open box that accepts a product wins, even if a later box would
/// leave less unused space.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstFitDecreasing;

impl PackingStrategy for FirstFitDecreasing {
    fn pack(&self, products: &[Product], templates: &[BoxTemplate]) -> Vec<PackedBox> {
        pack_products(products, templates)
    }
}

/// Main packing function.
///
/// # Parameters
/// * `products` - Products to pack, in request order
/// * `templates` - Available box designs, in any order
///
/// # Returns
/// Boxes in the order they were opened, each with its products in placement order
pub fn pack_products(products: &[Product], templates: &[BoxTemplate]) -> Vec<PackedBox> {
    // Templates whose volume overflows can never be compared, so they are left out.
    let mut templates: Vec<(&BoxTemplate, Decimal)> = templates
        .iter()
        .filter_map(|tpl| match tpl.volume() {
            Some(capacity) => Some((tpl, capacity)),
            None => {
                warn!(box_type = %tpl.box_type, "box template volume out of range, skipped");
                None
            }
        })
        .collect();
    // `sort_by` is stable, so equal volumes keep their input order.
    templates.sort_by(|a, b| a.1.cmp(&b.1));

    let mut ordered: Vec<(&Product, Option<Decimal>)> =
        products.iter().map(|p| (p, p.volume())).collect();
    ordered.sort_by(|a, b| compare_volume_desc(a.1, b.1));

    let mut boxes: Vec<PackedBox> = Vec::new();

    for (product, volume) in ordered {
        let Some(volume) = volume else {
            debug!(product = %product.name, "volume out of range");
            boxes.push(PackedBox::oversized(product.clone()));
            continue;
        };

        if let Some(open) = boxes
            .iter_mut()
            .find(|open| accepts(open, product, volume))
        {
            debug!(product = %product.name, box_type = %open.box_type, "placed in open box");
            open.place(product.clone(), volume);
            continue;
        }

        match templates
            .iter()
            .find(|(tpl, capacity)| *capacity >= volume && product.fits_in(*tpl))
        {
            Some((template, capacity)) => {
                debug!(product = %product.name, box_type = %template.box_type, "opened new box");
                boxes.push(PackedBox::open(template, *capacity, product.clone(), volume));
            }
            None => {
                debug!(product = %product.name, "fits no available box");
                boxes.push(PackedBox::unassigned(product.clone()));
            }
        }
    }

    boxes
}

/// Largest first; an uncomputable volume counts as larger than any other.
fn compare_volume_desc(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

/// Checks if an open box still has room for the product.
///
/// `"N/A"` boxes hold exactly one product and never accept more.
fn accepts(open: &PackedBox, product: &Product, volume: Decimal) -> bool {
    !open.is_unassigned()
        && product.fits_in(open)
        && open
            .used_volume()
            .checked_add(volume)
            .is_some_and(|total| total <= open.capacity())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::model::UNASSIGNED_BOX_TYPE;

    fn product(name: &str, h: i64, w: i64, l: i64) -> Product {
        Product::new(name, Decimal::from(h), Decimal::from(w), Decimal::from(l))
    }

    fn template(box_type: &str, h: i64, w: i64, l: i64) -> BoxTemplate {
        BoxTemplate::new(box_type, Decimal::from(h), Decimal::from(w), Decimal::from(l))
    }

    fn seeded_catalog() -> Vec<BoxTemplate> {
        vec![
            template("Box 1", 30, 40, 80),
            template("Box 2", 80, 50, 40),
            template("Box 3", 50, 80, 60),
        ]
    }

    fn name_counts<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<&'a str, usize> {
        let mut counts = HashMap::new();
        for name in names {
            *counts.entry(name).or_insert(0) += 1;
        }
        counts
    }

    fn assert_conserved(products: &[Product], boxes: &[PackedBox]) {
        let expected = name_counts(products.iter().map(|p| p.name.as_str()));
        let actual = name_counts(
            boxes
                .iter()
                .flat_map(|b| b.products.iter())
                .map(|p| p.name.as_str()),
        );
        assert_eq!(expected, actual, "products were lost or duplicated");
    }

    fn assert_fits(boxes: &[PackedBox]) {
        for packed in boxes.iter().filter(|b| !b.is_unassigned()) {
            for p in &packed.products {
                assert!(
                    p.fits_in(packed),
                    "product {} exceeds box {} in some dimension",
                    p.name,
                    packed.box_type
                );
            }
            let summed: Decimal = packed.products.iter().filter_map(Dimensional::volume).sum();
            assert_eq!(packed.used_volume(), summed, "running total drifted");
            assert!(
                packed.used_volume() <= packed.capacity(),
                "box {} is over capacity",
                packed.box_type
            );
        }
    }

    #[test]
    fn two_small_products_share_one_box() {
        let products = vec![product("A", 5, 5, 5), product("B", 5, 5, 5)];
        let boxes = pack_products(&products, &[template("Small", 10, 10, 10)]);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_type, "Small");
        assert_eq!(boxes[0].product_names(), vec!["A", "B"]);
        assert_eq!(boxes[0].observation, None);
    }

    #[test]
    fn oversized_product_gets_unassigned_box() {
        let products = vec![product("Huge", 50, 50, 50)];
        let boxes = pack_products(&products, &[template("Small", 10, 10, 10)]);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_type, UNASSIGNED_BOX_TYPE);
        assert_eq!(boxes[0].product_names(), vec!["Huge"]);
        let observation = boxes[0].observation.as_deref().expect("observation set");
        assert!(observation.contains("Huge"));
        assert!(observation.contains("does not fit in any of the available boxes"));
    }

    #[test]
    fn empty_product_list_opens_no_boxes() {
        assert!(pack_products(&[], &seeded_catalog()).is_empty());
        assert!(pack_products(&[], &[]).is_empty());
    }

    #[test]
    fn capacity_splits_large_items_across_boxes() {
        let products = vec![
            product("Big 1", 8, 8, 8),
            product("Big 2", 8, 8, 8),
            product("Tiny", 2, 2, 2),
        ];
        let boxes = pack_products(&products, &[template("Medium", 10, 10, 10)]);

        // 512 + 512 > 1000, so the second big item needs its own box; the
        // tiny one joins the first box (512 + 8 <= 1000).
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.box_type == "Medium"));
        assert_eq!(boxes[0].product_names(), vec!["Big 1", "Tiny"]);
        assert_eq!(boxes[1].product_names(), vec!["Big 2"]);
        assert_conserved(&products, &boxes);
    }

    #[test]
    fn empty_catalog_marks_everything_unassigned() {
        let products = vec![product("A", 1, 1, 1), product("B", 2, 2, 2)];
        let boxes = pack_products(&products, &[]);

        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(PackedBox::is_unassigned));
        // Largest first.
        assert_eq!(boxes[0].product_names(), vec!["B"]);
        assert_eq!(boxes[1].product_names(), vec!["A"]);
    }

    #[test]
    fn unassigned_box_never_receives_more_products() {
        let products = vec![product("Huge", 50, 50, 50), product("Also huge", 40, 40, 40)];
        let boxes = pack_products(&products, &[template("Small", 10, 10, 10)]);

        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.products.len() == 1));
    }

    #[test]
    fn picks_smallest_template_that_fits() {
        let templates = vec![
            template("Large", 100, 100, 100),
            template("Small", 10, 10, 10),
            template("Medium", 20, 20, 20),
        ];
        let boxes = pack_products(&[product("Cube", 15, 15, 15)], &templates);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_type, "Medium");
    }

    #[test]
    fn no_rotation_skips_templates_with_enough_volume() {
        // Volume is ample in "Flat", but the product is taller than the box.
        let templates = vec![template("Flat", 5, 100, 100), template("Tall", 50, 50, 50)];
        let boxes = pack_products(&[product("Pole", 40, 5, 5)], &templates);

        assert_eq!(boxes[0].box_type, "Tall");
    }

    #[test]
    fn first_fit_prefers_earliest_open_box() {
        let templates = vec![template("Tall", 40, 10, 10), template("Flat", 10, 40, 40)];
        let products = vec![
            product("Rod", 30, 5, 5),
            product("Cube", 5, 5, 5),
            product("Panel", 10, 40, 30),
        ];
        let boxes = pack_products(&products, &templates);

        // Flat has 4000 left after Panel, Tall has 3250 left after Rod.
        // Best-fit would pick Tall for Cube; first-fit takes Flat.
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].box_type, "Flat");
        assert_eq!(boxes[0].product_names(), vec!["Panel", "Cube"]);
        assert_eq!(boxes[1].box_type, "Tall");
        assert_eq!(boxes[1].product_names(), vec!["Rod"]);
    }

    #[test]
    fn equal_volumes_keep_input_order() {
        let products = vec![
            product("first", 2, 3, 4),
            product("second", 4, 3, 2),
            product("third", 3, 4, 2),
        ];
        let boxes = pack_products(&products, &[template("Box", 10, 10, 10)]);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].product_names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn packing_is_deterministic() {
        let products = vec![
            product("Controle", 10, 15, 5),
            product("PS5", 40, 10, 25),
            product("Volante", 40, 30, 30),
            product("Webcam", 7, 10, 5),
            product("Microfone", 25, 10, 10),
            product("Monitor", 50, 60, 20),
            product("Notebook", 2, 35, 25),
        ];
        let first = pack_products(&products, &seeded_catalog());
        let second = pack_products(&products, &seeded_catalog());

        assert_eq!(first, second);
        assert_conserved(&products, &first);
        assert_fits(&first);
    }

    #[test]
    fn conservation_and_fit_hold_with_unfittable_items() {
        let products = vec![
            product("Cadeira Gamer", 120, 60, 70),
            product("Mouse", 5, 8, 12),
            product("Mouse", 5, 8, 12),
            product("Teclado", 4, 45, 15),
            product("Cadeira Gamer", 120, 60, 70),
        ];
        let boxes = pack_products(&products, &seeded_catalog());

        assert_conserved(&products, &boxes);
        assert_fits(&boxes);
        assert_eq!(boxes.iter().filter(|b| b.is_unassigned()).count(), 2);
    }

    #[test]
    fn non_positive_dimensions_are_packed_without_complaint() {
        // Validation happens at the HTTP layer; the heuristic stays permissive.
        let products = vec![product("Zero", 0, 5, 5), product("Negative", -1, 5, 5)];
        let boxes = pack_products(&products, &[template("Small", 10, 10, 10)]);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_type, "Small");
        assert_conserved(&products, &boxes);
    }

    #[test]
    fn decimal_dimensions_compare_exactly() {
        let p = Product::new(
            "Exact",
            Decimal::new(100, 1),
            Decimal::new(1000, 2),
            Decimal::from(10),
        );
        let boxes = pack_products(&[p], &[template("Small", 10, 10, 10)]);
        assert_eq!(boxes[0].box_type, "Small");
    }

    #[test]
    fn pack_order_rejects_missing_products() {
        let order = OrderRequest {
            order_id: Some(9),
            products: None,
        };
        let err = FirstFitDecreasing
            .pack_order(&order, 0, &seeded_catalog())
            .expect_err("missing products must fail");
        assert_eq!(
            err,
            PackingError::MissingProducts {
                order_ref: "9".to_string()
            }
        );

        let order = OrderRequest::new(None, vec![product("A", 1, 1, 1)]);
        let boxes = FirstFitDecreasing
            .pack_order(&order, 0, &seeded_catalog())
            .expect("products present");
        assert_eq!(boxes[0].box_type, "Box 1");
    }

    #[test]
    fn overflowing_volume_goes_to_unassigned_box() {
        let huge = Decimal::from(10_000_000_000_i64);
        let products = vec![
            product("Small", 1, 1, 1),
            Product::new("Beam", huge, huge, huge),
        ];
        let boxes = pack_products(&products, &[template("Small box", 10, 10, 10)]);

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].box_type, UNASSIGNED_BOX_TYPE);
        assert_eq!(boxes[0].product_names(), vec!["Beam"]);
        assert!(
            boxes[0]
                .observation
                .as_deref()
                .is_some_and(|o| o.contains("too large"))
        );
        assert_eq!(boxes[1].box_type, "Small box");
        assert_conserved(&products, &boxes);
    }

    #[test]
    fn template_with_overflowing_volume_is_skipped() {
        let huge = Decimal::from(10_000_000_000_i64);
        let templates = vec![
            BoxTemplate::new("Warehouse", huge, huge, huge),
            template("Small", 10, 10, 10),
        ];
        let boxes = pack_products(&[product("A", 5, 5, 5), product("B", 20, 20, 20)], &templates);

        assert_eq!(boxes[0].box_type, UNASSIGNED_BOX_TYPE);
        assert_eq!(boxes[0].product_names(), vec!["B"]);
        assert_eq!(boxes[1].box_type, "Small");
    }

    #[test]
    fn large_batch_packs_quickly() {
        let products: Vec<Product> = (0..1000)
            .map(|i| product(&format!("Product {i}"), 1 + i % 20, 1 + i % 30, 1 + i % 40))
            .collect();

        let started = Instant::now();
        let boxes = pack_products(&products, &seeded_catalog());
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(5), "packing took {elapsed:?}");
        assert!(!boxes.is_empty());
        assert_conserved(&products, &boxes);
        assert_fits(&boxes);
    }
}
