use crate::err_float::MACHINE_EPSILON;
use crate::{Float, Normal3, Vec3f};
use cgmath::InnerSpace;

pub const INFINITY: Float = std::f32::INFINITY;
pub const SHADOW_EPSILON: Float = 1e-4;

pub mod consts {
    use crate::Float;
    pub const PI: Float = std::f32::consts::PI;
    pub const FRAC_PI_2: Float = std::f32::consts::FRAC_PI_2;
    pub const FRAC_PI_4: Float = std::f32::consts::FRAC_PI_4;
    pub const FRAC_1_PI: Float = std::f32::consts::FRAC_1_PI;
    pub const INV_2PI: Float = 1.0 / (2.0 * PI);
    pub const INV_4PI: Float = 1.0 / (4.0 * PI);
}

pub fn lerp(t: Float, v1: Float, v2: Float) -> Float {
    (1.0 - t) * v1 + t * v2
}

/// Veach's power heuristic (beta = 2) for combining the pdfs of two sampling
/// strategies in a multiple-importance-sampled estimator.
pub fn power_heuristic(nf: Float, f_pdf: Float, ng: Float, g_pdf: Float) -> Float {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    if f.is_infinite() {
        return 1.0;
    }
    (f * f) / (f * f + g * g)
}

/// Hermite smoothstep of `x` between `a` and `b`, 0 below `a` and 1 above `b`. Used by the
/// spotlight-style cone falloffs (`Light::Spot`/`Light::SpotArea`) to window intensity smoothly
/// between the inner and outer cone angles instead of a hard cutoff.
pub fn smooth_step(x: Float, a: Float, b: Float) -> Float {
    if a == b {
        return if x < a { 0.0 } else { 1.0 };
    }
    let t = ((x - a) / (b - a)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn faceforward(n: Vec3f, v: Vec3f) -> Vec3f {
    if n.dot(v) < 0.0 {
        -n
    } else {
        n
    }
}

pub fn faceforward_normal(n: Normal3, v: Vec3f) -> Normal3 {
    if n.0.dot(v) < 0.0 {
        Normal3(-n.0)
    } else {
        n
    }
}

pub fn abs_dot(a: Vec3f, b: Vec3f) -> Float {
    a.dot(b).abs()
}

/// Builds an orthonormal basis (ss, ts) around `n` using Duff et al.'s
/// branchless construction.
pub fn coordinate_system(n: Vec3f) -> (Vec3f, Vec3f) {
    let sign = 1.0_f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let ss = Vec3f::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let ts = Vec3f::new(b, sign + n.y * n.y * a, -n.y);
    (ss, ts)
}

pub fn spherical_direction(sin_theta: Float, cos_theta: Float, phi: Float) -> Vec3f {
    Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn spherical_theta(v: Vec3f) -> Float {
    v.z.clamp(-1.0, 1.0).acos()
}

pub fn spherical_phi(v: Vec3f) -> Float {
    let p = v.y.atan2(v.x);
    if p < 0.0 {
        p + 2.0 * consts::PI
    } else {
        p
    }
}

/// The index (0, 1, or 2) of `v`'s largest-magnitude component, used by the triangle
/// intersection test to pick the axis permutation that keeps the shear transform well
/// conditioned (following pbrt's watertight ray-triangle algorithm).
pub fn max_dimension(v: Vec3f) -> usize {
    if v.x > v.y {
        if v.x > v.z {
            0
        } else {
            2
        }
    } else if v.y > v.z {
        1
    } else {
        2
    }
}

pub fn permute_vec(v: Vec3f, kx: usize, ky: usize, kz: usize) -> Vec3f {
    Vec3f::new(v[kx], v[ky], v[kz])
}

pub fn permute_point(p: Vec3f, kx: usize, ky: usize, kz: usize) -> Vec3f {
    Vec3f::new(p[kx], p[ky], p[kz])
}

/// Componentwise absolute value, split out as a trait since cgmath's vector types don't carry
/// one directly.
pub trait AbsExt {
    fn abs(self) -> Self;
}

impl AbsExt for Vec3f {
    fn abs(self) -> Self {
        self.map(Float::abs)
    }
}

/// EFloat-tracked quadratic root solver used by quadric intersection tests
/// (sphere) to keep the smaller root's error bound tight enough that the
/// spawned ray does not immediately re-intersect its origin surface.
pub fn quadratic(a: crate::EFloat, b: crate::EFloat, c: crate::EFloat) -> Option<(crate::EFloat, crate::EFloat)> {
    use crate::EFloat;

    let discrim: f64 = b.v as f64 * b.v as f64 - (4.0 * a.v as f64 * c.v as f64);
    if discrim < 0.0 {
        return None;
    }

    let root_discrim = discrim.sqrt();
    let root_discrim = EFloat::with_err(root_discrim as Float, MACHINE_EPSILON * root_discrim as Float);

    let q: EFloat = if b.v < 0.0 {
        -0.5 * (b - root_discrim)
    } else {
        -0.5 * (b + root_discrim)
    };

    let t0 = q / a;
    let t1 = c / q;

    if t0.v > t1.v {
        Some((t1, t0))
    } else {
        Some((t0, t1))
    }
}
