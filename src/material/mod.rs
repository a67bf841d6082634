//! The closed set of surface scattering models a scene can assign to a primitive. Each variant
//! maps to a direct combination of the `BxDF` enum's lobes, built fresh per shading point by
//! `add_bxdfs` rather than through a `dyn Material` trait object.

use crate::interaction::SurfaceInteraction;
use crate::reflection::bsdf::Bsdf;
use crate::reflection::microfacet::TrowbridgeReitzDistribution;
use crate::reflection::BxDF;
use crate::fresnel::Fresnel;
use crate::spectrum::Spectrum;
use crate::texture::{FloatTexture, SpectrumTexture};
use crate::Float;
use bumpalo::Bump;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub usize);

#[derive(Clone, Copy, Debug)]
pub enum TransportMode {
    Radiance,
    Importance,
}

#[derive(Clone)]
pub enum Material {
    Diffuse { albedo: SpectrumTexture },
    Conductor { eta: Spectrum, k: Spectrum, roughness: FloatTexture, remap_roughness: bool },
    Dielectric { eta: Float, roughness: FloatTexture, remap_roughness: bool },
    ThinDielectric { eta: Float },
    Mirror { r: SpectrumTexture },
    Plastic { diffuse: SpectrumTexture, specular: SpectrumTexture, roughness: FloatTexture, remap_roughness: bool },
    /// A metallic/roughness principled-style shader built directly on `BxDF::MetallicRoughness`.
    Principled { base_color: SpectrumTexture, roughness: FloatTexture, metallic: FloatTexture },
    /// A dielectric coat over a diffuse substrate (`BxDF::Layered`), e.g. varnished wood or
    /// lacquered plastic. `max_bounces`/`samples` control the random walk that estimates the
    /// coat/substrate interaction: more bounces let light escape after deeper scattering in the
    /// substrate, more samples reduce the walk's variance.
    CoatedDiffuse { base_color: SpectrumTexture, coat_roughness: FloatTexture, coat_eta: Float, remap_roughness: bool, max_bounces: u32, samples: u32 },
    /// A reduced subsurface-scattering approximation: the normalized-Fresnel exitant lobe
    /// (`BxDF::NormalizedFresnel`) tinted by a single-scattering albedo, with no spatial
    /// diffusion profile or BSSRDF random walk.
    Subsurface { albedo: SpectrumTexture, eta: Float },
    /// Blends two sub-materials by a spatially varying weight, used for masked/layered looks
    /// without a full BSDF-layering framework.
    Mixture { a: Box<Material>, b: Box<Material>, amount: FloatTexture },
}

impl Material {
    pub fn compute_scattering_functions<'a>(&self, si: &SurfaceInteraction, _arena: &'a Bump, mode: TransportMode, _allow_multiple_lobes: bool) -> Bsdf<'a> {
        let mut bsdf = Bsdf::new(si, 1.0);
        self.add_bxdfs(si, mode, &mut bsdf, 1.0);
        bsdf
    }

    fn add_bxdfs(&self, si: &SurfaceInteraction, mode: TransportMode, bsdf: &mut Bsdf, weight: Float) {
        match self {
            Material::Diffuse { albedo } => {
                bsdf.add(BxDF::Lambertian { r: albedo.evaluate(si) * weight });
            }
            Material::Conductor { eta, k, roughness, remap_roughness } => {
                let rough = roughness.evaluate(si);
                let alpha = if *remap_roughness { TrowbridgeReitzDistribution::roughness_to_alpha(rough) } else { rough };
                let distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
                let fresnel = Fresnel::Conductor { eta_i: Spectrum::new(1.0), eta_t: *eta, k: *k };
                bsdf.add(BxDF::MicrofacetReflection { r: Spectrum::new(weight), distribution, fresnel });
            }
            Material::Dielectric { eta, roughness, remap_roughness } => {
                let rough = roughness.evaluate(si);
                if rough < 1e-3 {
                    bsdf.add(BxDF::SpecularReflection { r: Spectrum::new(weight), fresnel: Fresnel::Dielectric { eta_i: 1.0, eta_t: *eta } });
                    bsdf.add(BxDF::SpecularTransmission { t: Spectrum::new(weight), eta_a: 1.0, eta_b: *eta, mode });
                } else {
                    let alpha = if *remap_roughness { TrowbridgeReitzDistribution::roughness_to_alpha(rough) } else { rough };
                    let distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
                    bsdf.add(BxDF::MicrofacetReflection {
                        r: Spectrum::new(weight),
                        distribution,
                        fresnel: Fresnel::Dielectric { eta_i: 1.0, eta_t: *eta },
                    });
                    bsdf.add(BxDF::MicrofacetTransmission { t: Spectrum::new(weight), distribution, eta_a: 1.0, eta_b: *eta, mode });
                }
            }
            Material::ThinDielectric { eta } => {
                bsdf.add(BxDF::ThinDielectric { eta: *eta });
            }
            Material::Mirror { r } => {
                bsdf.add(BxDF::SpecularReflection { r: r.evaluate(si) * weight, fresnel: Fresnel::NoOp });
            }
            Material::Plastic { diffuse, specular, roughness, remap_roughness } => {
                bsdf.add(BxDF::Lambertian { r: diffuse.evaluate(si) * weight });
                let rough = roughness.evaluate(si);
                let alpha = if *remap_roughness { TrowbridgeReitzDistribution::roughness_to_alpha(rough) } else { rough };
                let distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
                bsdf.add(BxDF::MicrofacetReflection {
                    r: specular.evaluate(si) * weight,
                    distribution,
                    fresnel: Fresnel::Dielectric { eta_i: 1.0, eta_t: 1.5 },
                });
            }
            Material::Principled { base_color, roughness, metallic } => {
                let base = base_color.evaluate(si) * weight;
                let m = metallic.evaluate(si);
                let rough = roughness.evaluate(si).max(1e-3);
                let alpha = TrowbridgeReitzDistribution::roughness_to_alpha(rough);
                let distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
                bsdf.add(BxDF::MetallicRoughness { base_color: base, metallic: m, distribution });
            }
            Material::CoatedDiffuse { base_color, coat_roughness, coat_eta, remap_roughness, max_bounces, samples } => {
                let base = base_color.evaluate(si) * weight;
                let rough = coat_roughness.evaluate(si).max(1e-3);
                let alpha = if *remap_roughness { TrowbridgeReitzDistribution::roughness_to_alpha(rough) } else { rough };
                let coat_distribution = TrowbridgeReitzDistribution::new(alpha, alpha);
                bsdf.add(BxDF::Layered { base_color: base, coat_distribution, coat_eta: *coat_eta, max_bounces: *max_bounces, samples: *samples });
            }
            Material::Subsurface { albedo, eta } => {
                let a = albedo.evaluate(si) * weight;
                bsdf.add(BxDF::NormalizedFresnel { albedo: a, eta: *eta });
            }
            Material::Mixture { a, b, amount } => {
                let t = amount.evaluate(si).clamp(0.0, 1.0);
                if t < 1.0 {
                    a.add_bxdfs(si, mode, bsdf, weight * (1.0 - t));
                }
                if t > 0.0 {
                    b.add_bxdfs(si, mode, bsdf, weight * t);
                }
            }
        }
    }
}
