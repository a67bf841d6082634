//! Conservative running error bounds for floating point geometric computation,
//! following the `EFloat`/gamma-bound machinery pbrt-style renderers use to keep
//! ray-shape intersection numerically robust without resorting to a fixed epsilon.

use crate::Float;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub const MACHINE_EPSILON: f32 = std::f32::EPSILON * 0.5;

pub const fn gamma(n: i32) -> Float {
    let n = n as Float;
    (n * MACHINE_EPSILON) / (1.0 - n * MACHINE_EPSILON)
}

pub fn next_float_up(mut v: f32) -> f32 {
    if v == std::f32::INFINITY {
        return v;
    }
    if v == -0.0 {
        v = 0.0
    }
    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits + 1 } else { bits - 1 };
    f32::from_bits(bits)
}

pub fn next_float_down(mut v: f32) -> f32 {
    if v == std::f32::NEG_INFINITY {
        return v;
    }
    if v == 0.0 {
        v = -0.0
    }
    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits - 1 } else { bits + 1 };
    f32::from_bits(bits)
}

/// A value with a conservative absolute error bound, used for the handful of
/// computations (quadric root solving) where naive float error would let rays
/// self-intersect their origin surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EFloat {
    pub v: Float,
    low: Float,
    high: Float,
}

impl EFloat {
    pub fn new(v: Float) -> Self {
        Self { v, low: v, high: v }
    }

    pub fn with_err(v: Float, err: Float) -> Self {
        if err == 0.0 {
            Self { v, low: v, high: v }
        } else {
            Self {
                v,
                low: next_float_down(v - err),
                high: next_float_up(v + err),
            }
        }
    }

    pub fn absolute_error(&self) -> Float {
        Float::max((self.high - self.v).abs(), (self.v - self.low).abs())
    }

    pub fn lower_bound(&self) -> Float {
        self.low
    }

    pub fn upper_bound(&self) -> Float {
        self.high
    }

    pub fn sqrt(self) -> Self {
        Self {
            v: self.v.sqrt(),
            low: next_float_down(self.low.max(0.0).sqrt()),
            high: next_float_up(self.high.sqrt()),
        }
    }
}

impl Add for EFloat {
    type Output = EFloat;
    fn add(self, rhs: EFloat) -> EFloat {
        EFloat {
            v: self.v + rhs.v,
            low: next_float_down(self.low + rhs.low),
            high: next_float_up(self.high + rhs.high),
        }
    }
}

impl Sub for EFloat {
    type Output = EFloat;
    fn sub(self, rhs: EFloat) -> EFloat {
        EFloat {
            v: self.v - rhs.v,
            low: next_float_down(self.low - rhs.high),
            high: next_float_up(self.high - rhs.low),
        }
    }
}

impl Mul for EFloat {
    type Output = EFloat;
    fn mul(self, rhs: EFloat) -> EFloat {
        let prods = [
            self.low * rhs.low,
            self.high * rhs.low,
            self.low * rhs.high,
            self.high * rhs.high,
        ];
        let low = prods.iter().cloned().fold(Float::INFINITY, Float::min);
        let high = prods.iter().cloned().fold(Float::NEG_INFINITY, Float::max);
        EFloat {
            v: self.v * rhs.v,
            low: next_float_down(low),
            high: next_float_up(high),
        }
    }
}

impl Mul<Float> for EFloat {
    type Output = EFloat;
    fn mul(self, rhs: Float) -> EFloat {
        self * EFloat::new(rhs)
    }
}

impl Div for EFloat {
    type Output = EFloat;
    fn div(self, rhs: EFloat) -> EFloat {
        if rhs.low < 0.0 && rhs.high > 0.0 {
            // division by an interval straddling zero; widen to infinity rather
            // than producing a misleadingly tight (and wrong) bound.
            return EFloat {
                v: self.v / rhs.v,
                low: Float::NEG_INFINITY,
                high: Float::INFINITY,
            };
        }
        let divs = [
            self.low / rhs.low,
            self.high / rhs.low,
            self.low / rhs.high,
            self.high / rhs.high,
        ];
        let low = divs.iter().cloned().fold(Float::INFINITY, Float::min);
        let high = divs.iter().cloned().fold(Float::NEG_INFINITY, Float::max);
        EFloat {
            v: self.v / rhs.v,
            low: next_float_down(low),
            high: next_float_up(high),
        }
    }
}

impl Neg for EFloat {
    type Output = EFloat;
    fn neg(self) -> EFloat {
        EFloat {
            v: -self.v,
            low: -self.high,
            high: -self.low,
        }
    }
}

impl Mul<EFloat> for Float {
    type Output = EFloat;
    fn mul(self, rhs: EFloat) -> EFloat {
        EFloat::new(self) * rhs
    }
}

impl Sub<EFloat> for Float {
    type Output = EFloat;
    fn sub(self, rhs: EFloat) -> EFloat {
        EFloat::new(self) - rhs
    }
}

impl PartialEq<Float> for EFloat {
    fn eq(&self, other: &Float) -> bool {
        self.v == *other
    }
}
