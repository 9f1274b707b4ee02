//! Numeric coercion and the arithmetic used by contract maps.

use serde_json::{Number, Value};

use crate::ContractError;

const DECIMALS: f64 = 1e10;
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Reads a number from a JSON number or a numeric string.
///
/// ```
/// use serde_json::json;
/// use wrench_core::numeric::to_f64;
///
/// assert_eq!(to_f64(&json!(2.5)), Some(2.5));
/// assert_eq!(to_f64(&json!(" 42 ")), Some(42.0));
/// assert_eq!(to_f64(&json!("4x")), None);
/// assert_eq!(to_f64(&json!(true)), None);
/// ```
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Converts an arithmetic result back into JSON.
///
/// Results are rounded to ten decimals, which absorbs binary floating point
/// noise (`100 * 1.1`), and integral results are written as integers.
/// Returns `None` for NaN and infinities.
#[allow(clippy::cast_possible_truncation)]
pub fn to_json(value: f64) -> Option<Value> {
    if !value.is_finite() {
        return None;
    }
    let rounded = if value.abs() < 1e15 {
        (value * DECIMALS).round() / DECIMALS
    } else {
        value
    };
    if rounded.fract().abs() < f64::EPSILON && rounded.abs() <= MAX_SAFE_INTEGER {
        Some(Value::from(rounded as i64))
    } else {
        Number::from_f64(rounded).map(Value::Number)
    }
}

/// Arithmetic operator of a math entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl MathOp {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }
}

/// A parsed `path<op>factor` entry such as `price*1.1`.
#[derive(Debug, Clone, PartialEq)]
pub struct MathExpr {
    /// Field path.
    pub path: String,
    /// Operator.
    pub op: MathOp,
    /// Right-hand operand.
    pub factor: f64,
}

impl MathExpr {
    /// Parses an entry. The operator is the first `+ - * /` after the path.
    ///
    /// ```
    /// use wrench_core::numeric::{MathExpr, MathOp};
    ///
    /// let expr = MathExpr::parse("qty/-2").unwrap();
    /// assert_eq!(expr.path, "qty");
    /// assert_eq!(expr.op, MathOp::Div);
    /// assert_eq!(expr.factor, -2.0);
    /// ```
    pub fn parse(entry: &str) -> Result<Self, ContractError> {
        let (index, op) = entry
            .char_indices()
            .skip(1)
            .find_map(|(i, c)| MathOp::from_char(c).map(|op| (i, op)))
            .ok_or_else(|| ContractError::invalid_entry(entry, "missing operator"))?;

        let path = &entry[..index];
        if path.contains(char::is_whitespace) {
            return Err(ContractError::invalid_entry(entry, "path must not contain spaces"));
        }
        let factor = entry[index + 1..]
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| ContractError::invalid_entry(entry, "factor is not a number"))?;

        Ok(Self {
            path: path.to_string(),
            op,
            factor,
        })
    }

    /// Applies the expression to `value`.
    pub fn apply(&self, value: &Value) -> Result<Value, ContractError> {
        let current = to_f64(value).ok_or_else(|| ContractError::NotNumeric {
            path: self.path.clone(),
        })?;
        let result = match self.op {
            MathOp::Add => current + self.factor,
            MathOp::Sub => current - self.factor,
            MathOp::Mul => current * self.factor,
            MathOp::Div => {
                if self.factor == 0.0 {
                    return Err(ContractError::DivisionByZero {
                        path: self.path.clone(),
                    });
                }
                current / self.factor
            }
        };
        to_json(result).ok_or_else(|| ContractError::NotNumeric {
            path: self.path.clone(),
        })
    }
}

/// Shifts `value` by `exponent` powers of ten.
pub fn scale(path: &str, value: &Value, exponent: i32) -> Result<Value, ContractError> {
    let current = to_f64(value).ok_or_else(|| ContractError::NotNumeric {
        path: path.to_string(),
    })?;
    to_json(current * 10f64.powi(exponent)).ok_or_else(|| ContractError::NotNumeric {
        path: path.to_string(),
    })
}
