//! Fresnel reflectance terms shared by the dielectric and conductor BxDF variants.

use crate::spectrum::Spectrum;
use crate::Float;

/// Exact dielectric Fresnel reflectance for unpolarized light, following the standard
/// closed-form derivation (Snell's law + the two polarization amplitudes).
pub fn fresnel_dielectric(cos_theta_i: Float, eta_i: Float, eta_t: Float) -> Float {
    let cos_theta_i = cos_theta_i.clamp(-1.0, 1.0);
    let entering = cos_theta_i > 0.0;
    let (eta_i, eta_t, cos_theta_i) = if entering { (eta_i, eta_t, cos_theta_i) } else { (eta_t, eta_i, cos_theta_i.abs()) };

    let sin_theta_i = Float::max(0.0, 1.0 - cos_theta_i * cos_theta_i).sqrt();
    let sin_theta_t = eta_i / eta_t * sin_theta_i;
    if sin_theta_t >= 1.0 {
        return 1.0; // total internal reflection
    }

    let cos_theta_t = Float::max(0.0, 1.0 - sin_theta_t * sin_theta_t).sqrt();

    let r_parl = ((eta_t * cos_theta_i) - (eta_i * cos_theta_t)) / ((eta_t * cos_theta_i) + (eta_i * cos_theta_t));
    let r_perp = ((eta_i * cos_theta_i) - (eta_t * cos_theta_t)) / ((eta_i * cos_theta_i) + (eta_t * cos_theta_t));
    (r_parl * r_parl + r_perp * r_perp) / 2.0
}

/// Fresnel reflectance for a conductor with complex index of refraction `eta + i*k`, evaluated
/// per RGB channel.
pub fn fresnel_conductor(cos_theta_i: Float, eta_i: Spectrum, eta_t: Spectrum, k: Spectrum) -> Spectrum {
    let cos_theta_i = cos_theta_i.clamp(-1.0, 1.0);
    let eta = eta_t / eta_i;
    let eta_k = k / eta_i;

    let cos_theta_i2 = cos_theta_i * cos_theta_i;
    let sin_theta_i2 = 1.0 - cos_theta_i2;
    let eta2 = eta * eta;
    let eta_k2 = eta_k * eta_k;

    let t0 = eta2 - eta_k2 - Spectrum::new(sin_theta_i2);
    let a2plusb2 = (t0 * t0 + 4.0 * eta2 * eta_k2).sqrt();
    let t1 = a2plusb2 + Spectrum::new(cos_theta_i2);
    let a = ((a2plusb2 + t0) * 0.5).clamp_positive().sqrt();
    let t2 = a * (2.0 * cos_theta_i);
    let rs = (t1 - t2) / (t1 + t2);

    let t3 = a2plusb2 * cos_theta_i2 + Spectrum::new(sin_theta_i2 * sin_theta_i2);
    let t4 = t2 * sin_theta_i2;
    let rp = rs * (t3 - t4) / (t3 + t4);

    (rp + rs) * 0.5
}

/// Schlick's cheap approximation to `fresnel_dielectric`/`fresnel_conductor`, parameterized by
/// the normal-incidence reflectance `r0` rather than an index of refraction — the usual form for
/// metallic-roughness-style materials where `r0` is tinted per channel instead of derived from a
/// single eta.
pub fn schlick_fresnel(cos_theta: Float, r0: Spectrum) -> Spectrum {
    let m = (1.0 - cos_theta.clamp(0.0, 1.0)).clamp(0.0, 1.0);
    r0 + (Spectrum::new(1.0) - r0) * (m * m * m * m * m)
}

/// The first moment of the Fresnel dielectric reflectance over the hemisphere, used to
/// renormalize the subsurface exitant lobe (`BxDF::NormalizedFresnel`) so its total reflectance
/// integrates to the same value the diffusion profile assumes. Polynomial fit following pbrt's
/// `FresnelMoment1`.
pub fn fresnel_moment1(eta: Float) -> Float {
    let eta2 = eta * eta;
    let eta3 = eta2 * eta;
    let eta4 = eta3 * eta;
    let eta5 = eta4 * eta;
    if eta < 1.0 {
        0.45966 - 1.73965 * eta + 3.37668 * eta2 - 3.904945 * eta3 + 2.49277 * eta4 - 0.68441 * eta5
    } else {
        -4.61686 + 11.1136 * eta - 10.4646 * eta2 + 5.11455 * eta3 - 1.27198 * eta4 + 0.12746 * eta5
    }
}

/// Tagged-variant dispatch for the Fresnel term a BxDF evaluates, rather than a `dyn Fresnel`
/// trait object, so the common cases monomorphize cleanly.
#[derive(Clone, Copy, Debug)]
pub enum Fresnel {
    Dielectric { eta_i: Float, eta_t: Float },
    Conductor { eta_i: Spectrum, eta_t: Spectrum, k: Spectrum },
    /// Always reflects 100% — perfect mirrors and the outer lobe of a plastic-style coating
    /// where the substrate's own Fresnel behavior is folded into its diffuse albedo.
    NoOp,
}

impl Fresnel {
    pub fn evaluate(&self, cos_theta_i: Float) -> Spectrum {
        match self {
            Fresnel::Dielectric { eta_i, eta_t } => Spectrum::new(fresnel_dielectric(cos_theta_i, *eta_i, *eta_t)),
            Fresnel::Conductor { eta_i, eta_t, k } => fresnel_conductor(cos_theta_i, *eta_i, *eta_t, *k),
            Fresnel::NoOp => Spectrum::new(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normal_incidence_matches_classic_formula() {
        let r = fresnel_dielectric(1.0, 1.0, 1.5);
        let expected = ((1.5 - 1.0) / (1.5 + 1.0)).powi(2);
        assert_abs_diff_eq!(r, expected, epsilon = 1e-5);
    }

    #[test]
    fn grazing_incidence_approaches_total_reflection() {
        let r = fresnel_dielectric(0.01, 1.0, 1.5);
        assert!(r > 0.3);
    }
}
