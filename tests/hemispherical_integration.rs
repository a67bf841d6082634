//! Two Monte Carlo sanity checks any normalized BRDF/sampling pair must satisfy:
//!   1. Hemispherical-directional reflectance, `rho = integral(f(wo,wi) * cos(wi) dwi)`, estimated
//!      by importance-sampling `sample_f`, matches the lobe's known closed-form albedo.
//!   2. The lobe's own `pdf` integrates to 1 over the hemisphere it samples from, estimated here
//!      by uniformly sampling that hemisphere and importance-weighting by `2*pi` (the uniform
//!      hemisphere pdf's reciprocal).

use fluxtracer::fresnel::Fresnel;
use fluxtracer::reflection::microfacet::TrowbridgeReitzDistribution;
use fluxtracer::reflection::{abs_cos_theta, BxDF};
use fluxtracer::spectrum::Spectrum;
use fluxtracer::{Float, Point2f, Vec3f};
use rand::Rng;

const N: usize = 200_000;

fn estimate_rho(bxdf: &BxDF, wo: Vec3f, rng: &mut impl Rng) -> Float {
    // A `sample_f` miss (no valid lobe sample for this `u`) contributes 0 to the estimator, same
    // as any other zero-pdf sample would -- it isn't excluded from the average.
    let mut sum = 0.0;
    for _ in 0..N {
        let u = Point2f::new(rng.gen(), rng.gen());
        if let Some(s) = bxdf.sample_f(wo, u) {
            if s.pdf > 0.0 {
                sum += s.f.r() * abs_cos_theta(s.wi) / s.pdf;
            }
        }
    }
    sum / N as Float
}

/// Uniformly samples the hemisphere on `wo`'s side and estimates `integral(pdf dwi)`, which must
/// be 1 for a properly normalized sampling pdf.
fn estimate_pdf_integral(bxdf: &BxDF, wo: Vec3f, rng: &mut impl Rng) -> Float {
    use fluxtracer::math::consts::PI;
    let sign = if wo.z >= 0.0 { 1.0 } else { -1.0 };
    let mut sum = 0.0;
    for _ in 0..N {
        let u1: Float = rng.gen();
        let u2: Float = rng.gen();
        let cos_theta = u1;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * PI * u2;
        let wi = Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), sign * cos_theta);
        sum += bxdf.pdf(wo, wi);
    }
    // Uniform hemisphere pdf is 1/(2*pi); dividing the average of pdf(wi) by that pdf gives the
    // Monte Carlo estimate of integral(pdf dwi).
    (sum / N as Float) * (2.0 * PI)
}

#[test]
fn lambertian_rho_matches_albedo_and_pdf_integrates_to_one() {
    let mut rng = rand::thread_rng();
    let albedo = 0.6;
    let bxdf = BxDF::Lambertian { r: Spectrum::new(albedo) };
    let wo = Vec3f::new(0.0, 0.0, 1.0);

    let rho = estimate_rho(&bxdf, wo, &mut rng);
    assert!((rho - albedo).abs() < 0.02, "rho={} expected={}", rho, albedo);

    let pdf_integral = estimate_pdf_integral(&bxdf, wo, &mut rng);
    assert!((pdf_integral - 1.0).abs() < 0.02, "pdf integral={}", pdf_integral);
}

#[test]
fn microfacet_reflection_rho_is_below_one_and_pdf_integrates_to_one() {
    let mut rng = rand::thread_rng();
    let distribution = TrowbridgeReitzDistribution::new(0.4, 0.4);
    let bxdf = BxDF::MicrofacetReflection { r: Spectrum::new(0.9), distribution, fresnel: Fresnel::NoOp };
    let wo = Vec3f::new(0.3, 0.0, (1.0_f32 - 0.09).sqrt());

    let rho = estimate_rho(&bxdf, wo, &mut rng);
    assert!(rho > 0.0 && rho < 1.2, "rho={}", rho);

    let pdf_integral = estimate_pdf_integral(&bxdf, wo, &mut rng);
    assert!((pdf_integral - 1.0).abs() < 0.05, "pdf integral={}", pdf_integral);
}
