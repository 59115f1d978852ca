//! Pixel-bin synthesis: discretize a scaled domain value into an integer
//! screen-space bin.
//!
//! A bin is carried as data rather than as a closure, so the active-column
//! set stays inspectable: the same [`PixelBin`] renders the SQL binning
//! expression and maps numeric predicate endpoints to bin indices.

use crate::scale::{scale_transform, ScaleDescriptor, ScaleTransform};
use crate::sql::{call, float, BinaryOp, SqlExpr};

/// Rounding mode used when snapping a scaled value to a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinMode {
    #[default]
    Floor,
    Ceil,
    Round,
}

impl BinMode {
    /// Parse a client-supplied label, case-insensitively. Unknown labels
    /// fall back to floor.
    pub fn from_label(label: Option<&str>) -> BinMode {
        match label.map(str::to_ascii_lowercase).as_deref() {
            Some("ceil") => BinMode::Ceil,
            Some("round") => BinMode::Round,
            _ => BinMode::Floor,
        }
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            BinMode::Floor => "FLOOR",
            BinMode::Ceil => "CEIL",
            BinMode::Round => "ROUND",
        }
    }

    fn apply(&self, v: f64) -> f64 {
        match self {
            BinMode::Floor => v.floor(),
            BinMode::Ceil => v.ceil(),
            BinMode::Round => v.round(),
        }
    }
}

/// Discretization of one scale into integer pixel bins.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBin {
    mode: BinMode,
    /// Pixels per scaled-domain unit, already divided by the pixel size.
    factor: f64,
    /// Scaled value of the domain minimum.
    offset: f64,
    transform: ScaleTransform,
}

impl PixelBin {
    /// SQL expression computing this bin for `value`:
    /// `FN(<factor>::DOUBLE * ((<scaled value>) - <offset>::DOUBLE))::INTEGER`,
    /// with the factor term omitted when it is 1 and the offset term omitted
    /// when the scaled minimum is 0.
    pub fn expr(&self, value: &SqlExpr) -> SqlExpr {
        let mut scaled = self.transform.sql_apply(value.clone());
        if self.offset != 0.0 {
            scaled = scaled.binary(BinaryOp::Sub, float(self.offset).cast("DOUBLE"));
        }
        let mut arg = scaled.paren();
        if self.factor != 1.0 {
            arg = float(self.factor).cast("DOUBLE").binary(BinaryOp::Mul, arg);
        }
        call(self.mode.sql_name(), vec![arg]).cast("INTEGER")
    }

    /// Numeric twin of [`PixelBin::expr`], used to map predicate range
    /// endpoints onto bin indices.
    pub fn apply(&self, v: f64) -> f64 {
        self.mode.apply(self.factor * (self.transform.apply(v) - self.offset))
    }
}

/// Synthesize the pixel bin for a scale, or `None` when the scale has no SQL
/// transform or its domain/range metadata is unusable.
pub fn pixel_bin(scale: &ScaleDescriptor, pixel_size: f64, mode: Option<&str>) -> Option<PixelBin> {
    let transform = scale_transform(scale)?;
    if scale.domain.is_empty() || pixel_size <= 0.0 {
        return None;
    }
    let lo = transform.apply(scale.domain.iter().copied().fold(f64::INFINITY, f64::min));
    let hi = transform.apply(scale.domain.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    let a = if transform.is_identity() {
        1.0
    } else {
        if scale.range.len() < 2 || hi == lo {
            return None;
        }
        (scale.range[1] - scale.range[0]).abs() / (hi - lo)
    };
    let factor = a / pixel_size;
    if !factor.is_finite() || !lo.is_finite() {
        return None;
    }
    Some(PixelBin { mode: BinMode::from_label(mode), factor, offset: lo, transform })
}
