//! The Trowbridge-Reitz (GGX) microfacet distribution, with visible-normal sampling and an
//! energy-compensation lookup table that restores the energy multi-scattering loses at high
//! roughness.

use crate::reflection::{abs_cos_theta, cos2_phi, cos2_theta, same_hemisphere, sin2_phi, tan2_theta, tan_theta};
use crate::{Float, Normal3, Point2f, Vec3f};
use cgmath::InnerSpace;
use once_cell::sync::OnceCell;

#[derive(Clone, Copy, Debug)]
pub struct TrowbridgeReitzDistribution {
    alpha_x: Float,
    alpha_y: Float,
}

impl TrowbridgeReitzDistribution {
    pub fn new(alpha_x: Float, alpha_y: Float) -> Self {
        Self { alpha_x: alpha_x.max(1e-4), alpha_y: alpha_y.max(1e-4) }
    }

    pub fn roughness_to_alpha(roughness: Float) -> Float {
        roughness.max(1e-3).sqrt()
    }

    pub fn is_smooth(&self) -> bool {
        self.alpha_x.max(self.alpha_y) < 1e-3
    }

    /// A single roughness scalar for anisotropic distributions, used to index the energy
    /// compensation table (which is built isotropically).
    pub fn average_alpha(&self) -> Float {
        (self.alpha_x + self.alpha_y) * 0.5
    }

    /// Widens a concentrated distribution in place, following pbrt's `BxDF::Regularize`: caustic
    /// paths that pass through a near-specular lobe before hitting a light sample it with huge
    /// variance, so integrators call this once a path has already had a non-specular bounce.
    pub fn regularize(&mut self) {
        if self.alpha_x < 0.3 {
            self.alpha_x = (self.alpha_x * 2.0).clamp(0.1, 0.3);
        }
        if self.alpha_y < 0.3 {
            self.alpha_y = (self.alpha_y * 2.0).clamp(0.1, 0.3);
        }
    }

    pub fn d(&self, wh: Vec3f) -> Float {
        let tan2_theta = tan2_theta(wh);
        if tan2_theta.is_infinite() {
            return 0.0;
        }
        let cos4_theta = cos2_theta(wh) * cos2_theta(wh);
        let e = tan2_theta * (cos2_phi(wh) / (self.alpha_x * self.alpha_x) + sin2_phi(wh) / (self.alpha_y * self.alpha_y));
        1.0 / (crate::math::consts::PI * self.alpha_x * self.alpha_y * cos4_theta * (1.0 + e) * (1.0 + e))
    }

    fn lambda(&self, w: Vec3f) -> Float {
        let abs_tan_theta = tan_theta(w).abs();
        if abs_tan_theta.is_infinite() {
            return 0.0;
        }
        let alpha = Float::sqrt(cos2_phi(w) * self.alpha_x * self.alpha_x + sin2_phi(w) * self.alpha_y * self.alpha_y);
        let alpha2_tan2_theta = (alpha * abs_tan_theta) * (alpha * abs_tan_theta);
        (-1.0 + Float::sqrt(1.0 + alpha2_tan2_theta)) / 2.0
    }

    pub fn g1(&self, w: Vec3f) -> Float {
        1.0 / (1.0 + self.lambda(w))
    }

    pub fn g(&self, wo: Vec3f, wi: Vec3f) -> Float {
        1.0 / (1.0 + self.lambda(wo) + self.lambda(wi))
    }

    /// Samples a microfacet normal visible from `wo`, following Heitz's visible-normal sampling
    /// for the GGX distribution — produces far less variance at grazing angles than sampling
    /// the unweighted `D` term.
    pub fn sample_wh(&self, wo: Vec3f, u: Point2f) -> Vec3f {
        let wh_stretched = Vec3f::new(self.alpha_x * wo.x, self.alpha_y * wo.y, wo.z).normalize();
        let flipped = wh_stretched.z < 0.0;
        let wh_stretched = if flipped { -wh_stretched } else { wh_stretched };

        let (t1, t2) = if wh_stretched.z < 0.999 {
            let t1 = Vec3f::new(0.0, 0.0, 1.0).cross(wh_stretched).normalize();
            (t1, wh_stretched.cross(t1))
        } else {
            (Vec3f::new(1.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0))
        };

        let r = u.x.sqrt();
        let phi = 2.0 * crate::math::consts::PI * u.y;
        let p1 = r * phi.cos();
        let mut p2 = r * phi.sin();
        let s = 0.5 * (1.0 + wh_stretched.z);
        p2 = (1.0 - s) * (1.0 - p1 * p1).max(0.0).sqrt() + s * p2;

        let n_h = p1 * t1 + p2 * t2 + (1.0 - p1 * p1 - p2 * p2).max(0.0).sqrt() * wh_stretched;
        let wh = Vec3f::new(self.alpha_x * n_h.x, self.alpha_y * n_h.y, n_h.z.max(1e-6)).normalize();
        if flipped {
            -wh
        } else {
            wh
        }
    }

    pub fn pdf(&self, wo: Vec3f, wh: Vec3f) -> Float {
        self.g1(wo) * wo.dot(wh).abs() * self.d(wh) / abs_cos_theta(wo)
    }
}

/// One 32x32 directional-albedo table (`cos(theta) x roughness`) plus the 32-entry average
/// albedo it's reduced to. Shared by the reflection and transmission compensation tables below.
struct AlbedoTable {
    cos_samples: usize,
    alpha_samples: usize,
    table: Vec<Float>,
    avg: Vec<Float>,
}

impl AlbedoTable {
    const COS_SAMPLES: usize = 32;
    const ALPHA_SAMPLES: usize = 32;

    /// `single_scatter(wo, wh, wi)` returns the unweighted BRDF/BTDF value (Fresnel excluded --
    /// the compensation term is tinted by the caller's own Fresnel evaluation, not baked in
    /// here) for one microfacet-sampled direction, used to Monte-Carlo integrate `E(cos, alpha)`.
    fn build(mut single_scatter: impl FnMut(&TrowbridgeReitzDistribution, Vec3f, Point2f) -> Option<(Vec3f, Float, Float)>) -> Self {
        let mut table = vec![0.0; Self::COS_SAMPLES * Self::ALPHA_SAMPLES];
        let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_rand();
        const N_SAMPLES: usize = 256;

        for ai in 0..Self::ALPHA_SAMPLES {
            let alpha = ((ai as Float + 1.0) / Self::ALPHA_SAMPLES as Float).max(1e-3);
            let distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
            for ci in 0..Self::COS_SAMPLES {
                let cos_theta_o = ((ci as Float + 0.5) / Self::COS_SAMPLES as Float).max(1e-3);
                let sin_theta_o = (1.0 - cos_theta_o * cos_theta_o).max(0.0).sqrt();
                let wo = Vec3f::new(sin_theta_o, 0.0, cos_theta_o);

                let mut sum = 0.0;
                for _ in 0..N_SAMPLES {
                    let u = Point2f::new(rng.next_f32(), rng.next_f32());
                    if let Some((wi, f, pdf)) = single_scatter(&distribution, wo, u) {
                        if pdf > 0.0 {
                            sum += f * abs_cos_theta(wi) / pdf;
                        }
                    }
                }
                table[ai * Self::COS_SAMPLES + ci] = (sum / N_SAMPLES as Float).clamp(0.0, 1.0);
            }
        }

        // Reduce each roughness column's directional albedo to a single hemispherical average,
        // weighted by the cosine-projected solid angle (`integral 2*mu*E(mu) dmu`, discretized
        // over the same cos(theta) grid the table itself uses).
        let mut avg = vec![0.0; Self::ALPHA_SAMPLES];
        for ai in 0..Self::ALPHA_SAMPLES {
            let mut sum = 0.0;
            for ci in 0..Self::COS_SAMPLES {
                let cos_theta_o = (ci as Float + 0.5) / Self::COS_SAMPLES as Float;
                sum += table[ai * Self::COS_SAMPLES + ci] * 2.0 * cos_theta_o;
            }
            avg[ai] = (sum / Self::COS_SAMPLES as Float).clamp(0.0, 1.0);
        }

        Self { cos_samples: Self::COS_SAMPLES, alpha_samples: Self::ALPHA_SAMPLES, table, avg }
    }

    fn directional_albedo(&self, cos_theta: Float, alpha: Float) -> Float {
        let ci = (cos_theta.clamp(0.0, 1.0) * self.cos_samples as Float - 0.5).clamp(0.0, (self.cos_samples - 1) as Float);
        let ai = (alpha.clamp(0.0, 1.0) * self.alpha_samples as Float - 0.5).clamp(0.0, (self.alpha_samples - 1) as Float);
        let c0 = ci.floor() as usize;
        let a0 = ai.floor() as usize;
        self.table[a0 * self.cos_samples + c0]
    }

    fn average_albedo(&self, alpha: Float) -> Float {
        let ai = (alpha.clamp(0.0, 1.0) * self.alpha_samples as Float - 0.5).clamp(0.0, (self.alpha_samples - 1) as Float);
        self.avg[ai.floor() as usize]
    }
}

/// Multiple-scattering energy compensation for rough conductors and dielectrics: two 32x32
/// directional-albedo tables (reflection and transmission) over `(cos theta, roughness)`, each
/// reduced to a 32-entry average-albedo table, built once via Monte-Carlo integration over the
/// Trowbridge-Reitz VNDF at process start. `multi_scatter_factor` evaluates
/// `(1 - E(cos_o)) * (1 - E(cos_i)) / (pi * (1 - E_avg))`, the energy the single-scatter lobe
/// alone loses at high roughness; the caller scales it by the interface's own Fresnel
/// reflectance/transmittance and tint.
pub struct EnergyCompensationTable {
    reflection: AlbedoTable,
    transmission: AlbedoTable,
}

impl EnergyCompensationTable {
    fn build() -> Self {
        let reflection = AlbedoTable::build(|distribution, wo, u| {
            let wh = distribution.sample_wh(wo, u);
            let wi = crate::reflection::reflect(wo, wh);
            if !same_hemisphere(wo, wi) {
                return None;
            }
            let pdf = distribution.pdf(wo, wh) / (4.0 * wo.dot(wh));
            let d = distribution.d(wh);
            let g = distribution.g(wo, wi);
            let f = d * g / (4.0 * abs_cos_theta(wo) * abs_cos_theta(wi));
            Some((wi, f, pdf))
        });

        // The transmission lobe's directional albedo depends weakly on the interface's relative
        // IOR; a fixed eta=1.5 (ordinary glass) stands in for the full (cos, alpha, eta) table a
        // production renderer would build, since every dielectric material here defaults to
        // glass-range IORs.
        const TRANSMISSION_ETA: Float = 1.5;
        let transmission = AlbedoTable::build(|distribution, wo, u| {
            let wh = distribution.sample_wh(wo, u);
            if wo.dot(wh) < 0.0 {
                return None;
            }
            let eta = if wo.z > 0.0 { 1.0 / TRANSMISSION_ETA } else { TRANSMISSION_ETA };
            let wi = crate::reflection::refract(wo, Normal3(if wh.z < 0.0 { -wh } else { wh }), eta)?;
            if same_hemisphere(wo, wi) {
                return None;
            }
            let denom = (wi.dot(wh) + wo.dot(wh) / eta).powi(2);
            if denom <= 0.0 {
                return None;
            }
            let pdf = distribution.pdf(wo, wh) * wi.dot(wh).abs() / denom;
            let d = distribution.d(wh);
            let g = distribution.g(wo, wi);
            let f = d * g * (wi.dot(wh) * wo.dot(wh) / (abs_cos_theta(wo) * abs_cos_theta(wi) * denom)).abs();
            Some((wi, f, pdf))
        });

        Self { reflection, transmission }
    }

    /// `(1 - E(cos_o)) * (1 - E(cos_i)) / (pi * (1 - E_avg))`, symmetric in `cos_theta_o`/
    /// `cos_theta_i` so it never breaks BSDF reciprocity.
    pub fn multi_scatter_factor(&self, cos_theta_o: Float, cos_theta_i: Float, alpha: Float, transmission: bool) -> Float {
        let table = if transmission { &self.transmission } else { &self.reflection };
        let e_o = table.directional_albedo(cos_theta_o, alpha);
        let e_i = table.directional_albedo(cos_theta_i, alpha);
        let e_avg = table.average_albedo(alpha);
        let denom = (1.0 - e_avg).max(1e-3);
        ((1.0 - e_o) * (1.0 - e_i) / (crate::math::consts::PI * denom)).max(0.0)
    }
}

static ENERGY_COMPENSATION: OnceCell<EnergyCompensationTable> = OnceCell::new();

pub fn energy_compensation_table() -> &'static EnergyCompensationTable {
    ENERGY_COMPENSATION.get_or_init(EnergyCompensationTable::build)
}

/// Minimal local seeding shim: the table is built once at startup from a fixed seed so repeated
/// runs (and tests) are deterministic.
trait SeedFromRand: Sized {
    fn seed_from_rand() -> Self;
    fn next_f32(&mut self) -> Float;
}

impl SeedFromRand for rand_xoshiro::Xoshiro256Plus {
    fn seed_from_rand() -> Self {
        use rand::SeedableRng;
        rand_xoshiro::Xoshiro256Plus::seed_from_u64(0xE6E6_A5C5)
    }

    fn next_f32(&mut self) -> Float {
        use rand::Rng;
        self.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_scatter_factor_is_symmetric_in_the_two_cosines() {
        let table = energy_compensation_table();
        let a = table.multi_scatter_factor(0.8, 0.3, 0.2, false);
        let b = table.multi_scatter_factor(0.3, 0.8, 0.2, false);
        assert_eq!(a, b);
    }

    #[test]
    fn multi_scatter_factor_is_bounded_and_nonnegative() {
        let table = energy_compensation_table();
        let factor = table.multi_scatter_factor(0.8, 0.8, 0.6, false);
        assert!(factor >= 0.0 && factor < 5.0);
    }
}
