//! Sample-warping utilities: mapping uniform `[0,1)^2` samples onto the hemisphere/disk/sphere,
//! plus the piecewise-constant 1D/2D distributions used by image-based infinite lights and the
//! power-weighted light sampler.

use crate::math::consts::PI;
use crate::{Float, Point2f, Vec3f};

pub fn concentric_sample_disk(u: Point2f) -> Point2f {
    let u_offset = Point2f::new(2.0 * u.x - 1.0, 2.0 * u.y - 1.0);
    if u_offset.x == 0.0 && u_offset.y == 0.0 {
        return Point2f::new(0.0, 0.0);
    }

    let (theta, r) = if u_offset.x.abs() > u_offset.y.abs() {
        (PI / 4.0 * (u_offset.y / u_offset.x), u_offset.x)
    } else {
        (PI / 2.0 - PI / 4.0 * (u_offset.x / u_offset.y), u_offset.y)
    };
    Point2f::new(r * theta.cos(), r * theta.sin())
}

pub fn cosine_sample_hemisphere(u: Point2f) -> Vec3f {
    let d = concentric_sample_disk(u);
    let z = Float::max(0.0, 1.0 - d.x * d.x - d.y * d.y).sqrt();
    Vec3f::new(d.x, d.y, z)
}

pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * crate::math::consts::FRAC_1_PI
}

pub fn uniform_sample_sphere(u: Point2f) -> Vec3f {
    let z = 1.0 - 2.0 * u.x;
    let r = Float::max(0.0, 1.0 - z * z).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: Float = 1.0 / (4.0 * PI);

pub fn uniform_sample_cone(u: Point2f, cos_theta_max: Float) -> Vec3f {
    let cos_theta = (1.0 - u.x) + u.x * cos_theta_max;
    let sin_theta = Float::max(0.0, 1.0 - cos_theta * cos_theta).sqrt();
    let phi = u.y * 2.0 * PI;
    Vec3f::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn uniform_cone_pdf(cos_theta_max: Float) -> Float {
    1.0 / (2.0 * PI * (1.0 - cos_theta_max))
}

/// Maps a uniform sample onto barycentric coordinates `(b0, b1)` distributed uniformly by area
/// over a triangle (the third barycentric weight is `1 - b0 - b1`).
pub fn uniform_sample_triangle(u: Point2f) -> [Float; 2] {
    let su0 = u.x.sqrt();
    [1.0 - su0, u.y * su0]
}

/// A piecewise-constant 1D probability distribution built from unnormalized function values,
/// supporting O(log n) inverse-CDF sampling. Backs `LightSampler::Power` and the `v`-axis of
/// `Distribution2D` (environment light importance sampling).
#[derive(Clone)]
pub struct Distribution1D {
    func: Vec<Float>,
    cdf: Vec<Float>,
    pub func_int: Float,
}

impl Distribution1D {
    pub fn new(f: &[Float]) -> Self {
        let n = f.len();
        let mut cdf = vec![0.0; n + 1];
        for i in 1..=n {
            cdf[i] = cdf[i - 1] + f[i - 1] / n as Float;
        }

        let func_int = cdf[n];
        if func_int == 0.0 {
            for (i, c) in cdf.iter_mut().enumerate().skip(1) {
                *c = i as Float / n as Float;
            }
        } else {
            for c in cdf.iter_mut() {
                *c /= func_int;
            }
        }

        Self { func: f.to_vec(), cdf, func_int }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    /// Returns `(sampled value in [0,1), pdf, offset into `func`)`.
    pub fn sample_continuous(&self, u: Float) -> (Float, Float, usize) {
        let offset = find_interval(&self.cdf, u);
        let mut du = u - self.cdf[offset];
        if self.cdf[offset + 1] - self.cdf[offset] > 0.0 {
            du /= self.cdf[offset + 1] - self.cdf[offset];
        }

        let pdf = if self.func_int > 0.0 { self.func[offset] / self.func_int } else { 0.0 };
        let x = (offset as Float + du) / self.count() as Float;
        (x, pdf, offset)
    }

    pub fn discrete_pdf(&self, index: usize) -> Float {
        if self.func_int == 0.0 {
            0.0
        } else {
            self.func[index] / (self.func_int * self.count() as Float)
        }
    }

    pub fn sample_discrete(&self, u: Float) -> (usize, Float) {
        let offset = find_interval(&self.cdf, u);
        (offset, self.discrete_pdf(offset))
    }
}

fn find_interval(cdf: &[Float], u: Float) -> usize {
    match cdf.binary_search_by(|v| v.partial_cmp(&u).unwrap()) {
        Ok(i) => i.min(cdf.len() - 2),
        Err(i) => (i.max(1) - 1).min(cdf.len() - 2),
    }
}

/// A 2D piecewise-constant distribution (marginal over rows, conditional per row), used to
/// importance-sample an environment map proportional to its luminance.
#[derive(Clone)]
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    pub fn new(func: &[Float], width: usize, height: usize) -> Self {
        let conditional: Vec<_> = (0..height).map(|y| Distribution1D::new(&func[y * width..(y + 1) * width])).collect();
        let marginal_func: Vec<Float> = conditional.iter().map(|d| d.func_int).collect();
        let marginal = Distribution1D::new(&marginal_func);
        Self { conditional, marginal }
    }

    pub fn sample_continuous(&self, u: Point2f) -> (Point2f, Float) {
        let (d1, pdf1, v) = self.marginal.sample_continuous(u.y);
        let (d0, pdf0, _) = self.conditional[v].sample_continuous(u.x);
        (Point2f::new(d0, d1), pdf0 * pdf1)
    }

    pub fn pdf(&self, p: Point2f) -> Float {
        let iu = ((p.x * self.conditional[0].count() as Float) as usize).clamp(0, self.conditional[0].count() - 1);
        let iv = ((p.y * self.marginal.count() as Float) as usize).clamp(0, self.marginal.count() - 1);
        if self.marginal.func_int == 0.0 {
            0.0
        } else {
            self.conditional[iv].func[iu] / self.marginal.func_int
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn uniform_distribution_samples_uniformly() {
        let d = Distribution1D::new(&[1.0, 1.0, 1.0, 1.0]);
        let (x, pdf, offset) = d.sample_continuous(0.3);
        assert_abs_diff_eq!(pdf, 1.0, epsilon = 1e-6);
        assert!(x >= 0.0 && x < 1.0);
        assert_eq!(offset, 1);
    }

    #[test]
    fn disk_sample_stays_within_unit_disk() {
        for &u in &[(0.1, 0.2), (0.9, 0.4), (0.5, 0.5)] {
            let p = concentric_sample_disk(Point2f::new(u.0, u.1));
            assert!(p.x * p.x + p.y * p.y <= 1.0 + 1e-5);
        }
    }
}
