//! The closed `Light` variant set: point, distant, infinite and area (diffuse) lights folded
//! into a single enum rather than a `Light`/`AreaLight` trait hierarchy, with each kind's
//! sampling math kept as that variant's match arm.

use crate::geometry::Transform;
use crate::interaction::SurfaceHit;
use crate::primitive::ShapeId;
use crate::sampling::Distribution2D;
use crate::shapes::Shape;
use crate::spectrum::Spectrum;
use crate::{Float, Point2f, Point3f, Ray, RayDifferential, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightFlags {
    DeltaPosition,
    DeltaDirection,
    Area,
    Infinite,
}

impl LightFlags {
    pub fn is_delta_light(&self) -> bool {
        matches!(self, LightFlags::DeltaPosition | LightFlags::DeltaDirection)
    }

    pub fn is_infinite_light(&self) -> bool {
        matches!(self, LightFlags::Infinite)
    }
}

/// The result of importance-sampling a direction from a reference point towards a light.
pub struct LightSampleLi {
    pub li: Spectrum,
    pub wi: Vec3f,
    pub pdf: Float,
    pub point: SurfaceHit,
}

/// The result of sampling an emission ray off of a light (used by light tracing, BDPT, and
/// photon emission).
pub struct LightSampleLe {
    pub ray: Ray,
    pub le: Spectrum,
    pub pdf_p: Float,
    pub pdf_w: Float,
    pub normal: Vec3f,
}

pub struct VisibilityTester {
    pub p0: SurfaceHit,
    pub p1: SurfaceHit,
}

impl VisibilityTester {
    pub fn unoccluded(&self, scene: &crate::scene::Scene) -> bool {
        !scene.intersect_test(&self.p0.spawn_ray_to_hit(self.p1))
    }

    /// Geometric occlusion test plus, when `medium` is `Some`, the null-scattering
    /// ratio-tracked transmittance through that one medium along the shadow ray -- the `Vol*`
    /// integrators' volumetric shadow weighting. `None` return means fully blocked; `Some`
    /// carries the (possibly attenuated) transmittance to weight the light sample by. Assumes
    /// the shadow ray stays inside a single medium along its whole length, the same
    /// single-current-medium simplification the primary ray's `medium` field already makes.
    pub fn transmittance(&self, scene: &crate::scene::Scene, medium: Option<crate::medium::MediumId>, sampler: &mut crate::sampler::Sampler) -> Option<Spectrum> {
        let ray = self.p0.spawn_ray_to_hit(self.p1);
        if scene.intersect_test(&ray) {
            return None;
        }
        let Some(medium_id) = medium else { return Some(Spectrum::new(1.0)) };
        let t_max = ray.t_max;
        Some(crate::medium::transmittance(&scene.media[medium_id.0], &ray, t_max, sampler))
    }
}

/// The closed light variant set. `DiffuseArea` carries the `ShapeId` of the primitive it's
/// attached to so emission/sampling can be expressed purely in terms of `Scene`-owned data,
/// matching the index-based primitive architecture.
#[derive(Clone)]
pub enum Light {
    Point { light_to_world: Transform, i: Spectrum },
    /// A point light windowed to a cone around its `+z` axis, falling off smoothly between
    /// `cos_falloff_end` (full intensity) and `cos_falloff_start` (zero), following pbrt's
    /// `SpotLight`.
    Spot { light_to_world: Transform, i: Spectrum, cos_falloff_start: Float, cos_falloff_end: Float },
    Distant { direction: Vec3f, l: Spectrum, scene_center: Point3f, scene_radius: Float },
    Infinite { l: Spectrum, scene_center: Point3f, scene_radius: Float },
    ImageInfinite {
        light_to_world: Transform,
        world_to_light: Transform,
        width: usize,
        height: usize,
        pixels: Vec<Spectrum>,
        distribution: Distribution2D,
        scene_center: Point3f,
        scene_radius: Float,
    },
    DiffuseArea { shape: ShapeId, l_emit: Spectrum, two_sided: bool, area: Float },
    /// `DiffuseArea` windowed by the same cone falloff as `Spot`, measured from the shape's own
    /// normal rather than a separate axis -- an area light that only illuminates within a cone
    /// around straight-ahead.
    SpotArea { shape: ShapeId, l_emit: Spectrum, area: Float, cos_falloff_start: Float, cos_falloff_end: Float },
    /// An area light that emits exclusively along its own normal direction rather than over the
    /// cosine-weighted hemisphere `DiffuseArea` spreads over -- a collimated panel emitter. This
    /// makes it a delta light in direction: for a given reference point there is at most one
    /// point on the shape whose normal-direction ray passes through it.
    DirectionalArea { shape: ShapeId, l_emit: Spectrum, area: Float, direction: Vec3f },
}

impl Light {
    pub fn flags(&self) -> LightFlags {
        match self {
            Light::Point { .. } | Light::Spot { .. } => LightFlags::DeltaPosition,
            Light::Distant { .. } | Light::DirectionalArea { .. } => LightFlags::DeltaDirection,
            Light::Infinite { .. } | Light::ImageInfinite { .. } => LightFlags::Infinite,
            Light::DiffuseArea { .. } | Light::SpotArea { .. } => LightFlags::Area,
        }
    }

    pub fn is_delta_light(&self) -> bool {
        self.flags().is_delta_light()
    }

    pub fn is_infinite_light(&self) -> bool {
        self.flags().is_infinite_light()
    }

    /// Caches the scene's bounding sphere so infinite lights can emit finite-density rays
    /// (`Sample_Le`) and so `Le(ray)` knows how far away the "escape point" conceptually is.
    pub fn preprocess(&mut self, center: Point3f, radius: Float) {
        match self {
            Light::Distant { scene_center, scene_radius, .. } => {
                *scene_center = center;
                *scene_radius = radius;
            }
            Light::Infinite { scene_center, scene_radius, .. } => {
                *scene_center = center;
                *scene_radius = radius;
            }
            Light::ImageInfinite { scene_center, scene_radius, .. } => {
                *scene_center = center;
                *scene_radius = radius;
            }
            _ => {}
        }
    }

    /// Radiance returned along a ray that escapes the scene. Non-zero only for infinite lights.
    pub fn le(&self, ray: &RayDifferential) -> Spectrum {
        match self {
            Light::Infinite { l, .. } => *l,
            Light::ImageInfinite { world_to_light, width, height, pixels, .. } => {
                let dir = world_to_light.transform(ray.ray.dir).normalize();
                let theta = crate::math::spherical_theta(dir);
                let phi = crate::math::spherical_phi(dir);
                let u = phi * crate::math::consts::INV_2PI;
                let v = theta * crate::math::consts::FRAC_1_PI;
                let x = ((u * *width as Float) as usize).min(width - 1);
                let y = ((v * *height as Float) as usize).min(height - 1);
                pixels[y * width + x]
            }
            _ => Spectrum::BLACK,
        }
    }

    /// Surface emission in direction `w` for an area light hit at `hit` with geometric normal
    /// `n`. Non-delta, non-infinite lights only.
    pub fn emitted_radiance(&self, n: Vec3f, w: Vec3f) -> Spectrum {
        match self {
            Light::DiffuseArea { l_emit, two_sided, .. } => {
                if *two_sided || n.dot(w) > 0.0 {
                    *l_emit
                } else {
                    Spectrum::BLACK
                }
            }
            Light::SpotArea { l_emit, cos_falloff_start, cos_falloff_end, .. } => {
                let cos_theta = n.dot(w);
                if cos_theta <= 0.0 {
                    Spectrum::BLACK
                } else {
                    *l_emit * crate::math::smooth_step(cos_theta, *cos_falloff_end, *cos_falloff_start)
                }
            }
            // A true delta-direction emitter is only ever reachable via `sample_li`/`sample_le`'s
            // closed-form construction -- a BSDF-sampled ray essentially never lands exactly on
            // the single emitted direction, so a direct hit contributes nothing.
            Light::DirectionalArea { .. } => Spectrum::BLACK,
            _ => Spectrum::BLACK,
        }
    }

    pub fn sample_li(&self, reference: &SurfaceHit, u: Point2f, scene: &crate::scene::Scene) -> Option<LightSampleLi> {
        match self {
            Light::Point { light_to_world, i } => {
                let p = light_to_world.transform(Point3f::origin());
                let wi = (p - reference.p).normalize();
                let dist2 = (p - reference.p).magnitude2();
                let point = SurfaceHit { p, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3::zero() };
                Some(LightSampleLi { li: *i / dist2, wi, pdf: 1.0, point })
            }
            Light::Spot { light_to_world, i, cos_falloff_start, cos_falloff_end } => {
                let p = light_to_world.transform(Point3f::origin());
                let wi = (p - reference.p).normalize();
                let dist2 = (p - reference.p).magnitude2();
                let axis = light_to_world.transform(Vec3f::new(0.0, 0.0, 1.0)).normalize();
                let cos_theta = (-wi).dot(axis);
                let falloff = crate::math::smooth_step(cos_theta, *cos_falloff_end, *cos_falloff_start);
                if falloff <= 0.0 {
                    return None;
                }
                let point = SurfaceHit { p, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3::zero() };
                Some(LightSampleLi { li: *i * falloff / dist2, wi, pdf: 1.0, point })
            }
            Light::Distant { direction, l, scene_radius, .. } => {
                let wi = -direction.normalize();
                let p_outside = reference.p + wi * (2.0 * scene_radius);
                let point = SurfaceHit { p: p_outside, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3::zero() };
                Some(LightSampleLi { li: *l, wi, pdf: 1.0, point })
            }
            Light::DirectionalArea { shape, l_emit, direction, .. } => {
                let dir = direction.normalize();
                let probe = Ray::new(reference.p, -dir);
                let shape_ref = &scene.shapes[shape.0];
                let (_t, si) = shape_ref.intersect(&probe)?;
                let dist2 = (si.hit.p - reference.p).magnitude2();
                let point = SurfaceHit { p: si.hit.p, p_err: si.hit.p_err, time: reference.time, n: si.hit.n };
                Some(LightSampleLi { li: *l_emit, wi: -dir, pdf: 1.0, point })
                    .filter(|_| dist2 > 1e-8)
            }
            Light::Infinite { l, scene_radius, .. } => {
                let wi = crate::sampling::uniform_sample_sphere(u);
                let pdf = 1.0 / (4.0 * crate::math::consts::PI);
                let p_outside = reference.p + wi * (2.0 * scene_radius);
                let point = SurfaceHit { p: p_outside, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3::zero() };
                Some(LightSampleLi { li: *l, wi, pdf, point })
            }
            Light::ImageInfinite { light_to_world, distribution, width, height, pixels, scene_radius, .. } => {
                let (uv, map_pdf) = distribution.sample_continuous(u);
                if map_pdf == 0.0 {
                    return None;
                }
                let theta = uv.y * crate::math::consts::PI;
                let phi = uv.x * 2.0 * crate::math::consts::PI;
                let (sin_theta, cos_theta) = theta.sin_cos();
                if sin_theta == 0.0 {
                    return None;
                }
                let dir_local = crate::math::spherical_direction(sin_theta, cos_theta, phi);
                let wi = light_to_world.transform(dir_local).normalize();
                let pdf = map_pdf / (2.0 * crate::math::consts::PI * crate::math::consts::PI * sin_theta);
                let x = ((uv.x * *width as Float) as usize).min(width - 1);
                let y = ((uv.y * *height as Float) as usize).min(height - 1);
                let li = pixels[y * width + x];
                let p_outside = reference.p + wi * (2.0 * scene_radius);
                let point = SurfaceHit { p: p_outside, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3::zero() };
                Some(LightSampleLi { li, wi, pdf, point })
            }
            Light::DiffuseArea { shape, l_emit, two_sided, .. } => {
                let shape = &scene.shapes[shape.0];
                let (hit, pdf_area) = shape.sample_from_reference(reference, u);
                let wi = (hit.p - reference.p).normalize();
                if wi.magnitude2() == 0.0 {
                    return None;
                }
                let dist2 = (hit.p - reference.p).magnitude2();
                let cos_theta = hit.n.dot(-wi).abs();
                if cos_theta < 1e-7 {
                    return None;
                }
                let pdf = pdf_area * dist2 / cos_theta;
                let emitted = if *two_sided || hit.n.dot(-wi) > 0.0 { *l_emit } else { Spectrum::BLACK };
                Some(LightSampleLi { li: emitted, wi, pdf, point: hit })
            }
            Light::SpotArea { shape, l_emit, cos_falloff_start, cos_falloff_end, .. } => {
                let shape_ref = &scene.shapes[shape.0];
                let (hit, pdf_area) = shape_ref.sample_from_reference(reference, u);
                let wi = (hit.p - reference.p).normalize();
                if wi.magnitude2() == 0.0 {
                    return None;
                }
                let dist2 = (hit.p - reference.p).magnitude2();
                let cos_theta = hit.n.dot(-wi);
                if cos_theta <= 0.0 {
                    return None;
                }
                let pdf = pdf_area * dist2 / cos_theta;
                let falloff = crate::math::smooth_step(cos_theta, *cos_falloff_end, *cos_falloff_start);
                Some(LightSampleLi { li: *l_emit * falloff, wi, pdf, point: hit })
            }
        }
    }

    pub fn pdf_li(&self, reference: &SurfaceHit, wi: Vec3f, scene: &crate::scene::Scene) -> Float {
        match self {
            Light::Point { .. } | Light::Spot { .. } | Light::Distant { .. } | Light::DirectionalArea { .. } => 0.0,
            Light::Infinite { .. } => 1.0 / (4.0 * crate::math::consts::PI),
            Light::ImageInfinite { world_to_light, distribution, .. } => {
                let wl = world_to_light.transform(wi).normalize();
                let theta = crate::math::spherical_theta(wl);
                let phi = crate::math::spherical_phi(wl);
                let sin_theta = theta.sin();
                if sin_theta == 0.0 {
                    return 0.0;
                }
                let uv = Point2f::new(phi * crate::math::consts::INV_2PI, theta * crate::math::consts::FRAC_1_PI);
                distribution.pdf(uv) / (2.0 * crate::math::consts::PI * crate::math::consts::PI * sin_theta)
            }
            Light::DiffuseArea { shape, .. } | Light::SpotArea { shape, .. } => {
                let shape = &scene.shapes[shape.0];
                shape.pdf_from_reference(reference, wi)
            }
        }
    }

    pub fn sample_le(&self, u1: Point2f, u2: Point2f, scene: &crate::scene::Scene) -> Option<LightSampleLe> {
        match self {
            Light::Point { light_to_world, i } => {
                let p = light_to_world.transform(Point3f::origin());
                let dir = crate::sampling::uniform_sample_sphere(u1);
                let pdf_w = 1.0 / (4.0 * crate::math::consts::PI);
                Some(LightSampleLe { ray: Ray::new(p, dir), le: *i, pdf_p: 1.0, pdf_w, normal: dir })
            }
            Light::Spot { light_to_world, i, cos_falloff_start, cos_falloff_end } => {
                let p = light_to_world.transform(Point3f::origin());
                let dir_local = crate::sampling::uniform_sample_cone(u1, *cos_falloff_end);
                let pdf_w = crate::sampling::uniform_cone_pdf(*cos_falloff_end);
                let dir = light_to_world.transform(dir_local).normalize();
                let falloff = crate::math::smooth_step(dir_local.z, *cos_falloff_end, *cos_falloff_start);
                Some(LightSampleLe { ray: Ray::new(p, dir), le: *i * falloff, pdf_p: 1.0, pdf_w, normal: dir })
            }
            Light::DirectionalArea { shape, l_emit, direction, .. } => {
                let shape_ref = &scene.shapes[shape.0];
                let (hit, pdf_area) = shape_ref.sample(u1);
                let dir = direction.normalize();
                Some(LightSampleLe { ray: hit.spawn_ray(dir), le: *l_emit, pdf_p: pdf_area, pdf_w: 1.0, normal: dir })
            }
            Light::DiffuseArea { shape, l_emit, two_sided, .. } => {
                let shape_ref = &scene.shapes[shape.0];
                let (hit, pdf_area) = shape_ref.sample(u1);
                let n = hit.n.0;
                let dir = if *two_sided && u2.x < 0.5 {
                    crate::sampling::cosine_sample_hemisphere(Point2f::new(u2.x * 2.0, u2.y)) * -1.0
                } else {
                    crate::sampling::cosine_sample_hemisphere(u2)
                };
                let (ss, ts) = crate::math::coordinate_system(n);
                let world_dir = (ss * dir.x + ts * dir.y + n * dir.z).normalize();
                let pdf_w = crate::sampling::cosine_hemisphere_pdf(dir.z.abs());
                Some(LightSampleLe { ray: hit.spawn_ray(world_dir), le: *l_emit, pdf_p: pdf_area, pdf_w, normal: n })
            }
            Light::SpotArea { shape, l_emit, cos_falloff_start, cos_falloff_end, .. } => {
                let shape_ref = &scene.shapes[shape.0];
                let (hit, pdf_area) = shape_ref.sample(u1);
                let n = hit.n.0;
                let dir = crate::sampling::cosine_sample_hemisphere(u2);
                let (ss, ts) = crate::math::coordinate_system(n);
                let world_dir = (ss * dir.x + ts * dir.y + n * dir.z).normalize();
                let pdf_w = crate::sampling::cosine_hemisphere_pdf(dir.z.abs());
                let falloff = crate::math::smooth_step(dir.z.abs(), *cos_falloff_end, *cos_falloff_start);
                Some(LightSampleLe { ray: hit.spawn_ray(world_dir), le: *l_emit * falloff, pdf_p: pdf_area, pdf_w, normal: n })
            }
            _ => None,
        }
    }

    pub fn pdf_le(&self, _ray: &Ray, n: Vec3f) -> (Float, Float) {
        match self {
            Light::Point { .. } => (0.0, 1.0 / (4.0 * crate::math::consts::PI)),
            Light::Spot { cos_falloff_end, .. } => (0.0, crate::sampling::uniform_cone_pdf(*cos_falloff_end)),
            Light::DiffuseArea { area, .. } => (1.0 / area, crate::sampling::cosine_hemisphere_pdf(n.z.abs()).max(0.0)),
            Light::SpotArea { area, .. } => (1.0 / area, crate::sampling::cosine_hemisphere_pdf(n.z.abs()).max(0.0)),
            // Direction is a delta -- no continuous directional density.
            Light::DirectionalArea { area, .. } => (1.0 / area, 0.0),
            _ => (0.0, 0.0),
        }
    }

    /// A scalar proxy for total emitted power, used by the `Power` light sampler to weight
    /// lights proportionally to how much they actually contribute (approximate for infinite
    /// lights, which have no well-defined total power without a scene-wide integral).
    pub fn power(&self) -> Float {
        match self {
            Light::Point { i, .. } => 4.0 * crate::math::consts::PI * i.luminance(),
            Light::Spot { i, cos_falloff_start, cos_falloff_end, .. } => {
                2.0 * crate::math::consts::PI * i.luminance() * ((1.0 - cos_falloff_start) + (cos_falloff_start - cos_falloff_end) * 0.5)
            }
            Light::Distant { l, scene_radius, .. } => crate::math::consts::PI * scene_radius * scene_radius * l.luminance(),
            Light::Infinite { l, scene_radius, .. } => 4.0 * crate::math::consts::PI * crate::math::consts::PI * scene_radius * scene_radius * l.luminance(),
            Light::ImageInfinite { pixels, scene_radius, .. } => {
                let avg = if pixels.is_empty() { 0.0 } else { pixels.iter().map(Spectrum::luminance).sum::<Float>() / pixels.len() as Float };
                4.0 * crate::math::consts::PI * crate::math::consts::PI * scene_radius * scene_radius * avg
            }
            Light::DiffuseArea { l_emit, two_sided, area, .. } => {
                let sides = if *two_sided { 2.0 } else { 1.0 };
                sides * crate::math::consts::PI * area * l_emit.luminance()
            }
            Light::SpotArea { l_emit, area, cos_falloff_end, .. } => {
                // Fraction of the hemisphere the outer cone subtends, as a coarse power proxy --
                // exact only for the light-sampler pmf this feeds, not claimed elsewhere.
                let cone_fraction = (1.0 - cos_falloff_end).clamp(0.0, 1.0);
                crate::math::consts::PI * area * l_emit.luminance() * cone_fraction
            }
            Light::DirectionalArea { l_emit, area, .. } => area * l_emit.luminance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_light_is_delta() {
        let l = Light::Point { light_to_world: Transform::IDENTITY, i: Spectrum::new(1.0) };
        assert!(l.is_delta_light());
    }

    #[test]
    fn distant_light_falloff_is_none() {
        let l = Light::Distant { direction: Vec3f::new(0.0, -1.0, 0.0), l: Spectrum::new(2.0), scene_center: Point3f::origin(), scene_radius: 10.0 };
        assert!(l.is_delta_light());
        assert!(!l.is_infinite_light());
    }
}
