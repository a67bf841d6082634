//! Reconstruction filters: `Box`, `Tent` and `Gaussian`, closed over a single enum so the film
//! can dispatch filter evaluation without a trait object. `Box::evaluate` actually clips to its
//! radius rather than unconditionally returning `1.0`.

use crate::{Float, Point2f, Vec2f};

#[derive(Clone, Copy, Debug)]
pub enum Filter {
    Box { radius: Vec2f },
    Tent { radius: Vec2f },
    Gaussian { radius: Vec2f, sigma: Float },
}

impl Filter {
    pub fn radius(&self) -> Vec2f {
        match self {
            Filter::Box { radius } | Filter::Tent { radius } | Filter::Gaussian { radius, .. } => *radius,
        }
    }

    /// `(radius, 1/radius)`.
    pub fn extent(&self) -> (Vec2f, Vec2f) {
        let r = self.radius();
        (r, Vec2f::new(1.0 / r.x, 1.0 / r.y))
    }

    pub fn evaluate(&self, offset: Point2f) -> Float {
        match self {
            Filter::Box { radius } => {
                if offset.x.abs() <= radius.x && offset.y.abs() <= radius.y {
                    1.0
                } else {
                    0.0
                }
            }
            Filter::Tent { radius } => {
                let tx = (radius.x - offset.x.abs()).max(0.0);
                let ty = (radius.y - offset.y.abs()).max(0.0);
                tx * ty
            }
            Filter::Gaussian { radius, sigma } => {
                if offset.x.abs() > radius.x || offset.y.abs() > radius.y {
                    0.0
                } else {
                    gaussian_1d(offset.x, *sigma, radius.x) * gaussian_1d(offset.y, *sigma, radius.y)
                }
            }
        }
    }
}

/// A Gaussian lobe re-centred so it reaches exactly `0` at `radius`, following pbrt's
/// `GaussianFilter1D` (subtracting the value at the radius keeps the filter's support compact).
fn gaussian_1d(x: Float, sigma: Float, radius: Float) -> Float {
    let g = |d: Float| (-d * d / (2.0 * sigma * sigma)).exp();
    (g(x) - g(radius)).max(0.0)
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Box { radius: Vec2f::new(0.5, 0.5) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_filter_clips_outside_radius() {
        let f = Filter::Box { radius: Vec2f::new(0.5, 0.5) };
        assert_eq!(f.evaluate(Point2f::new(0.0, 0.0)), 1.0);
        assert_eq!(f.evaluate(Point2f::new(0.6, 0.0)), 0.0);
    }

    #[test]
    fn tent_filter_peaks_at_center() {
        let f = Filter::Tent { radius: Vec2f::new(1.0, 1.0) };
        assert!(f.evaluate(Point2f::new(0.0, 0.0)) > f.evaluate(Point2f::new(0.5, 0.0)));
        assert_eq!(f.evaluate(Point2f::new(1.0, 0.0)), 0.0);
    }

    #[test]
    fn gaussian_filter_is_zero_at_radius() {
        let f = Filter::Gaussian { radius: Vec2f::new(2.0, 2.0), sigma: 0.5 };
        assert_eq!(f.evaluate(Point2f::new(2.0, 0.0)), 0.0);
    }
}
