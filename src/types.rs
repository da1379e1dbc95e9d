//! Common types and traits for box and product geometry.
//!
//! All measurements are exact decimals. Products are never rotated, so a fit
//! check compares height, width and length axis by axis.

use rust_decimal::Decimal;

/// Height, width and length of a product or box.
///
/// # Examples
/// ```ignore
/// let dims = Dimensions::new(Decimal::from(10), Decimal::from(20), Decimal::from(30));
/// assert_eq!(dims.volume(), Some(Decimal::from(6000)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub height: Decimal,
    pub width: Decimal,
    pub length: Decimal,
}

impl Dimensions {
    /// Creates a new dimension triple.
    #[inline]
    pub const fn new(height: Decimal, width: Decimal, length: Decimal) -> Self {
        Self {
            height,
            width,
            length,
        }
    }

    /// Calculates the volume (height × width × length).
    ///
    /// Returns `None` when the product exceeds the decimal range.
    #[inline]
    pub fn volume(&self) -> Option<Decimal> {
        self.height
            .checked_mul(self.width)?
            .checked_mul(self.length)
    }

    /// Checks if every axis fits within the container's matching axis.
    ///
    /// No rotation is attempted: height is compared with height, width with
    /// width and length with length.
    #[inline]
    pub fn fits_within(&self, container: &Self) -> bool {
        self.height <= container.height
            && self.width <= container.width
            && self.length <= container.length
    }

    /// Checks if all components are strictly positive.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.height > Decimal::ZERO && self.width > Decimal::ZERO && self.length > Decimal::ZERO
    }

    /// Returns the same dimensions with trailing zeros stripped.
    ///
    /// `10`, `10.0` and `10.00` normalize to the same value, which keeps
    /// persisted lookups exact.
    #[inline]
    pub fn normalized(&self) -> Self {
        Self::new(
            self.height.normalize(),
            self.width.normalize(),
            self.length.normalize(),
        )
    }
}

/// Trait for objects with three dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Dimensions;

    /// Calculates the volume, `None` on overflow.
    fn volume(&self) -> Option<Decimal> {
        self.dimensions().volume()
    }

    /// Checks if this object fits in a container with the given dimensions.
    fn fits_in(&self, container: &impl Dimensional) -> bool {
        self.dimensions().fits_within(&container.dimensions())
    }
}

impl Dimensional for Dimensions {
    fn dimensions(&self) -> Dimensions {
        *self
    }
}
