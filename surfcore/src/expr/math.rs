//! The `math` namespace available to expressions.
use strum::{Display, EnumIter, EnumString};
use surfprop::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MathFn {
    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Sqrt,
    Cbrt,
    Pow,
    Exp,
    Log,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Hypot,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum MathConst {
    #[strum(serialize = "PI")]
    Pi,
    #[strum(serialize = "E")]
    E,
}

impl MathConst {
    pub fn value(self) -> f64 {
        match self {
            MathConst::Pi => std::f64::consts::PI,
            MathConst::E => std::f64::consts::E,
        }
    }
}

impl MathFn {
    /// Accepted argument count as `(min, max)`; `None` means variadic.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            MathFn::Min | MathFn::Max | MathFn::Hypot => (0, None),
            MathFn::Pow | MathFn::Atan2 => (2, Some(2)),
            MathFn::Clamp => (3, Some(3)),
            _ => (1, Some(1)),
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.is_none_or(|max| count <= max)
    }

    /// Apply to already evaluated arguments. Non-numeric input yields NaN.
    pub fn call(self, args: &[Value]) -> Value {
        let nums: Vec<f64> = args.iter().map(Value::to_number).collect();
        let x = nums.first().copied().unwrap_or(f64::NAN);
        let y = nums.get(1).copied().unwrap_or(f64::NAN);

        let result = match self {
            MathFn::Abs => x.abs(),
            MathFn::Min => {
                if nums.iter().any(|n| n.is_nan()) {
                    f64::NAN
                } else {
                    nums.iter().copied().fold(f64::INFINITY, f64::min)
                }
            }
            MathFn::Max => {
                if nums.iter().any(|n| n.is_nan()) {
                    f64::NAN
                } else {
                    nums.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                }
            }
            MathFn::Floor => x.floor(),
            MathFn::Ceil => x.ceil(),
            MathFn::Round => (x + 0.5).floor(),
            MathFn::Trunc => x.trunc(),
            MathFn::Sign => {
                if x.is_nan() || x == 0.0 {
                    x
                } else {
                    x.signum()
                }
            }
            MathFn::Sqrt => x.sqrt(),
            MathFn::Cbrt => x.cbrt(),
            MathFn::Pow => x.powf(y),
            MathFn::Exp => x.exp(),
            MathFn::Log => x.ln(),
            MathFn::Log10 => x.log10(),
            MathFn::Log2 => x.log2(),
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
            MathFn::Tan => x.tan(),
            MathFn::Asin => x.asin(),
            MathFn::Acos => x.acos(),
            MathFn::Atan => x.atan(),
            MathFn::Atan2 => x.atan2(y),
            MathFn::Hypot => nums.iter().map(|n| n * n).sum::<f64>().sqrt(),
            MathFn::Clamp => {
                let hi = nums.get(2).copied().unwrap_or(f64::NAN);
                x.max(y).min(hi)
            }
        };
        Value::number(result)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_parse_in_lowercase() {
        for f in MathFn::iter() {
            assert_eq!(MathFn::from_str(&f.to_string()), Ok(f));
        }
        assert_eq!(MathFn::from_str("log10"), Ok(MathFn::Log10));
        assert!(MathFn::from_str("eval").is_err());
        assert_eq!(MathConst::from_str("PI"), Ok(MathConst::Pi));
    }

    #[test]
    fn rounding_and_clamping() {
        assert_eq!(MathFn::Round.call(&[Value::Float(2.5)]), Value::Int(3));
        assert_eq!(MathFn::Round.call(&[Value::Float(-2.5)]), Value::Int(-2));
        assert_eq!(
            MathFn::Clamp.call(&[Value::Int(15), Value::Int(0), Value::Int(10)]),
            Value::Int(10)
        );
        assert_eq!(MathFn::Max.call(&[]), Value::Float(f64::NEG_INFINITY));
        assert_eq!(
            MathFn::Min.call(&[Value::Int(3), Value::from("1"), Value::Float(2.5)]),
            Value::Int(1)
        );
    }

    #[test]
    fn arity_bounds() {
        assert!(MathFn::Hypot.accepts(0));
        assert!(MathFn::Pow.accepts(2));
        assert!(!MathFn::Pow.accepts(1));
        assert!(!MathFn::Sqrt.accepts(2));
    }
}
