//! Visual scale metadata and the numeric/SQL transform pairs behind it.
//!
//! A scale descriptor arrives from the client side as JSON. Supported scale
//! types resolve to a [`ScaleTransform`] that can apply the transform to a
//! number and emit the equivalent SQL expression; unsupported types resolve
//! to nothing, which makes the enclosing clause unindexable.

use serde::{Deserialize, Serialize};

use crate::sql::{call, float, int, SqlExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    Identity,
    Linear,
    Log,
    Symlog,
    Sqrt,
    Pow,
    Time,
    Utc,
    /// Any scale type this crate cannot express in SQL (ordinal, band, ...).
    #[serde(other)]
    Other,
}

/// Client-declared scale: type, data domain, and screen range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleDescriptor {
    #[serde(rename = "type")]
    pub scale_type: ScaleType,
    #[serde(default)]
    pub domain: Vec<f64>,
    #[serde(default)]
    pub range: Vec<f64>,
    /// Log base; defaults to e.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<f64>,
    /// Symlog linearization constant; defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<f64>,
    /// Power-scale exponent; defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<f64>,
}

impl ScaleDescriptor {
    pub fn new(scale_type: ScaleType, domain: Vec<f64>, range: Vec<f64>) -> Self {
        ScaleDescriptor {
            scale_type,
            domain,
            range,
            base: None,
            constant: None,
            exponent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Identity,
    Linear,
    Log { base: f64 },
    Symlog { constant: f64 },
    Sqrt,
    Pow { exponent: f64 },
    Time,
}

/// Resolved transform for a supported scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTransform {
    scale_type: ScaleType,
    curve: Curve,
}

impl ScaleTransform {
    pub fn scale_type(&self) -> ScaleType {
        self.scale_type
    }

    pub fn is_identity(&self) -> bool {
        self.scale_type == ScaleType::Identity
    }

    /// Apply the scale transform to a domain value.
    pub fn apply(&self, v: f64) -> f64 {
        match self.curve {
            Curve::Identity | Curve::Linear | Curve::Time => v,
            Curve::Log { base } => v.ln() / base.ln(),
            Curve::Symlog { constant } => v.signum() * (1.0 + (v / constant).abs()).ln(),
            Curve::Sqrt => v.sqrt(),
            Curve::Pow { exponent } => v.powf(exponent),
        }
    }

    /// The in-SQL equivalent of [`ScaleTransform::apply`] over an expression.
    pub fn sql_apply(&self, expr: SqlExpr) -> SqlExpr {
        match self.curve {
            Curve::Identity | Curve::Linear => expr,
            Curve::Log { base } => {
                let ln = call("LN", vec![expr]);
                if (base - std::f64::consts::E).abs() < f64::EPSILON {
                    ln
                } else {
                    ln.binary(crate::sql::BinaryOp::Div, call("LN", vec![float(base)]))
                }
            }
            Curve::Symlog { constant } => {
                let scaled = expr.clone().binary(crate::sql::BinaryOp::Div, float(constant));
                let inner = int(1).binary(crate::sql::BinaryOp::Add, call("ABS", vec![scaled]));
                call("SIGN", vec![expr]).binary(crate::sql::BinaryOp::Mul, call("LN", vec![inner]))
            }
            Curve::Sqrt => call("SQRT", vec![expr]),
            Curve::Pow { exponent } => call("POW", vec![expr, float(exponent)]),
            // Temporal domains are handled as epoch milliseconds.
            Curve::Time => call("epoch_ms", vec![expr]),
        }
    }
}

/// Resolve a descriptor to its transform. `None` means the scale type has no
/// SQL expression and the clause using it cannot be indexed.
pub fn scale_transform(scale: &ScaleDescriptor) -> Option<ScaleTransform> {
    let curve = match scale.scale_type {
        ScaleType::Identity => Curve::Identity,
        ScaleType::Linear => Curve::Linear,
        ScaleType::Log => Curve::Log { base: scale.base.unwrap_or(std::f64::consts::E) },
        ScaleType::Symlog => Curve::Symlog { constant: scale.constant.unwrap_or(1.0) },
        ScaleType::Sqrt => Curve::Sqrt,
        ScaleType::Pow => Curve::Pow { exponent: scale.exponent.unwrap_or(1.0) },
        ScaleType::Time | ScaleType::Utc => Curve::Time,
        ScaleType::Other => return None,
    };
    Some(ScaleTransform { scale_type: scale.scale_type, curve })
}
