//! Light selection for next-event estimation: factored out into its own closed `LightSampler`
//! so integrators can opt into importance-weighted selection (`Power`) without duplicating the
//! uniform fallback everywhere.

use crate::light::LightId;
use crate::sampling::Distribution1D;
use crate::Float;

pub struct SampledLight {
    pub light: LightId,
    pub pmf: Float,
}

pub enum LightSampler {
    Uniform { n: usize },
    Power { distribution: Distribution1D },
}

impl LightSampler {
    pub fn uniform(n_lights: usize) -> Self {
        LightSampler::Uniform { n: n_lights }
    }

    /// Builds a `Distribution1D` over `lights`' `power()`, falling back to uniform if every
    /// light reports zero power (e.g. a scene of only `Infinite` placeholders with `l = 0`).
    pub fn power(lights: &[crate::light::Light]) -> Self {
        let powers: Vec<Float> = lights.iter().map(|l| l.power()).collect();
        if powers.iter().all(|&p| p == 0.0) {
            LightSampler::Uniform { n: lights.len() }
        } else {
            LightSampler::Power { distribution: Distribution1D::new(&powers) }
        }
    }

    pub fn sample(&self, u: Float) -> Option<SampledLight> {
        match self {
            LightSampler::Uniform { n } => {
                if *n == 0 {
                    return None;
                }
                let idx = ((u * *n as Float) as usize).min(n - 1);
                Some(SampledLight { light: LightId(idx), pmf: 1.0 / *n as Float })
            }
            LightSampler::Power { distribution } => {
                if distribution.count() == 0 {
                    return None;
                }
                let (idx, pmf) = distribution.sample_discrete(u);
                if pmf == 0.0 {
                    return None;
                }
                Some(SampledLight { light: LightId(idx), pmf })
            }
        }
    }

    pub fn evaluate_pmf(&self, light: LightId) -> Float {
        match self {
            LightSampler::Uniform { n } => {
                if *n == 0 {
                    0.0
                } else {
                    1.0 / *n as Float
                }
            }
            LightSampler::Power { distribution } => distribution.discrete_pdf(light.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_pmfs_sum_to_one() {
        let sampler = LightSampler::uniform(4);
        let total: Float = (0..4).map(|i| sampler.evaluate_pmf(LightId(i))).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn power_sampler_weights_brighter_lights_more() {
        use crate::geometry::Transform;
        use crate::light::Light;
        use crate::spectrum::Spectrum;
        let lights = vec![
            Light::Point { light_to_world: Transform::IDENTITY, i: Spectrum::new(1.0) },
            Light::Point { light_to_world: Transform::IDENTITY, i: Spectrum::new(100.0) },
        ];
        let sampler = LightSampler::power(&lights);
        assert!(sampler.evaluate_pmf(LightId(1)) > sampler.evaluate_pmf(LightId(0)));
    }
}
