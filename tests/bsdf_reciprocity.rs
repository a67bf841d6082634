//! BRDFs must be reciprocal: `f(wo, wi) == f(wi, wo)`, since the same microfacet/scattering
//! physics describes light flowing either direction along an edge in the path. This checks it
//! directly for every reflection-only lobe, at a spread of directions on the upper hemisphere.
//! Transmission lobes (`MicrofacetTransmission`) are deliberately excluded: radiance transport
//! carries a `(eta_o/eta_i)^2` non-reciprocal factor across a refractive interface (pbrt's
//! "non-symmetric scattering" correction), so `f(wo, wi) != f(wi, wo)` there by design.

use fluxtracer::fresnel::Fresnel;
use fluxtracer::reflection::microfacet::TrowbridgeReitzDistribution;
use fluxtracer::reflection::BxDF;
use fluxtracer::spectrum::Spectrum;
use fluxtracer::Vec3f;

fn directions() -> Vec<Vec3f> {
    let mut dirs = Vec::new();
    for &cos_theta in &[0.15_f32, 0.4, 0.7, 0.95] {
        for &phi in &[0.0_f32, 1.3, 2.9, 4.4, 5.6] {
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            dirs.push(Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta));
        }
    }
    dirs
}

fn assert_reciprocal(bxdf: &BxDF, label: &str) {
    let dirs = directions();
    for &wo in &dirs {
        for &wi in &dirs {
            let f_fwd = bxdf.f(wo, wi);
            let f_rev = bxdf.f(wi, wo);
            assert!(
                (f_fwd.r() - f_rev.r()).abs() < 1e-4,
                "{label}: f(wo,wi)={:?} != f(wi,wo)={:?} for wo={:?} wi={:?}",
                f_fwd.r(),
                f_rev.r(),
                wo,
                wi
            );
        }
    }
}

#[test]
fn lambertian_is_reciprocal() {
    let bxdf = BxDF::Lambertian { r: Spectrum::rgb(0.6, 0.4, 0.2) };
    assert_reciprocal(&bxdf, "Lambertian");
}

#[test]
fn oren_nayar_is_reciprocal() {
    let bxdf = BxDF::OrenNayar { r: Spectrum::new(0.5), a: 0.9, b: 0.1 };
    assert_reciprocal(&bxdf, "OrenNayar");
}

#[test]
fn microfacet_reflection_is_reciprocal() {
    let distribution = TrowbridgeReitzDistribution::new(0.25, 0.25);
    let bxdf = BxDF::MicrofacetReflection { r: Spectrum::new(0.8), distribution, fresnel: Fresnel::NoOp };
    assert_reciprocal(&bxdf, "MicrofacetReflection");
}

#[test]
fn metallic_roughness_is_reciprocal() {
    let distribution = TrowbridgeReitzDistribution::new(0.3, 0.3);
    let bxdf = BxDF::MetallicRoughness { base_color: Spectrum::rgb(0.7, 0.5, 0.3), metallic: 0.4, distribution };
    assert_reciprocal(&bxdf, "MetallicRoughness");
}

#[test]
fn sheen_is_reciprocal() {
    let bxdf = BxDF::Sheen { r: Spectrum::new(0.5), roughness: 0.4 };
    assert_reciprocal(&bxdf, "Sheen");
}
