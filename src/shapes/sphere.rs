//! Partial spheres (full spheres are the common case, but `z_min`/`z_max`/`phi_max` allow
//! clipped spheres too). The intersection routine follows pbrt's `EFloat`-based quadric solve,
//! which keeps the hit point's reprojection error bounded even near tangent grazes.

use crate::err_float::{gamma, EFloat};
use crate::geometry::bounds::Bounds3f;
use crate::geometry::transform::Transformable;
use crate::geometry::{Normal3, Ray, Transform};
use crate::interaction::{DiffGeom, SurfaceHit, SurfaceInteraction};
use crate::math::quadratic;
use crate::sampling::uniform_sample_sphere;
use crate::{point2f, Float, Point2f, Point3f, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace};

#[derive(Clone, Copy)]
pub struct Sphere {
    pub object_to_world: Transform,
    pub world_to_object: Transform,
    pub reverse_orientation: bool,

    pub radius: Float,
    pub z_min: Float,
    pub z_max: Float,
    pub theta_min: Float,
    pub theta_max: Float,
    pub phi_max: Float,
}

impl Sphere {
    pub fn new(object_to_world: Transform, reverse_orientation: bool, radius: Float, z_min: Float, z_max: Float, phi_max: Float) -> Self {
        let z_min_c = Float::min(z_min, z_max).clamp(-radius, radius);
        let z_max_c = Float::max(z_min, z_max).clamp(-radius, radius);
        Self {
            object_to_world,
            world_to_object: object_to_world.inverse(),
            reverse_orientation,
            radius,
            z_min: z_min_c,
            z_max: z_max_c,
            theta_min: Float::clamp(z_min_c / radius, -1.0, 1.0).acos(),
            theta_max: Float::clamp(z_max_c / radius, -1.0, 1.0).acos(),
            phi_max: phi_max.clamp(0.0, 360.0).to_radians(),
        }
    }

    pub fn full(object_to_world: Transform, radius: Float) -> Self {
        Self::new(object_to_world, false, radius, -radius, radius, 360.0)
    }

    pub fn object_bound(&self) -> Bounds3f {
        crate::bounds3f!((-self.radius, -self.radius, self.z_min), (self.radius, self.radius, self.z_max))
    }

    pub fn world_bound(&self) -> Bounds3f {
        self.object_to_world.transform(self.object_bound())
    }

    pub fn area(&self) -> Float {
        self.phi_max * self.radius * (self.z_max - self.z_min)
    }

    pub fn intersect<'i>(&self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'i>)> {
        let r = self.world_to_object.transform(*ray);
        let (ox, oy, oz) = (EFloat::new(r.origin.x), EFloat::new(r.origin.y), EFloat::new(r.origin.z));
        let (dx, dy, dz) = (EFloat::new(r.dir.x), EFloat::new(r.dir.y), EFloat::new(r.dir.z));

        let a = dx * dx + dy * dy + dz * dz;
        let b = (dx * ox + dy * oy + dz * oz) * 2.0;
        let c = ox * ox + oy * oy + oz * oz - EFloat::new(self.radius) * EFloat::new(self.radius);

        let (t0, t1) = quadratic(a, b, c)?;
        if t0.upper_bound() > r.t_max || t1.lower_bound() <= 0.0 {
            return None;
        }
        let mut t_shape_hit = t0;
        if t_shape_hit.lower_bound() <= 0.0 {
            t_shape_hit = t1;
            if t_shape_hit.upper_bound() > r.t_max {
                return None;
            }
        }

        let mut p_hit = r.at(t_shape_hit.v);
        p_hit *= self.radius / (p_hit - Point3f::origin()).magnitude();
        if p_hit.x == 0.0 && p_hit.y == 0.0 {
            p_hit.x = 1e-5 * self.radius;
        }
        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 {
            phi += 2.0 * crate::math::consts::PI;
        }

        if (self.z_min > -self.radius && p_hit.z < self.z_min)
            || (self.z_max < self.radius && p_hit.z > self.z_max)
            || phi > self.phi_max
        {
            if t_shape_hit == t1 || t1.upper_bound() > r.t_max {
                return None;
            }
            t_shape_hit = t1;
            p_hit = r.at(t_shape_hit.v);
            p_hit *= self.radius / (p_hit - Point3f::origin()).magnitude();
            if p_hit.x == 0.0 && p_hit.y == 0.0 {
                p_hit.x = 1e-5 * self.radius;
            }
            phi = p_hit.y.atan2(p_hit.x);
            if phi < 0.0 {
                phi += 2.0 * crate::math::consts::PI;
            }
            if (self.z_min > -self.radius && p_hit.z < self.z_min) || (self.z_max < self.radius && p_hit.z > self.z_max) || phi > self.phi_max {
                return None;
            }
        }

        let u = phi / self.phi_max;
        let theta = Float::clamp(p_hit.z / self.radius, -1.0, 1.0).acos();
        let v = (theta - self.theta_min) / (self.theta_max - self.theta_min);

        let z_radius = (p_hit.x * p_hit.x + p_hit.y * p_hit.y).sqrt();
        let inv_z_radius = 1.0 / z_radius.max(1e-8);
        let cos_phi = p_hit.x * inv_z_radius;
        let sin_phi = p_hit.y * inv_z_radius;
        let dpdu = Vec3f::new(-self.phi_max * p_hit.y, self.phi_max * p_hit.x, 0.0);
        let dpdv = (self.theta_max - self.theta_min)
            * Vec3f::new(p_hit.z * cos_phi, p_hit.z * sin_phi, -self.radius * theta.sin());

        let p_err = Vec3f::new(p_hit.x, p_hit.y, p_hit.z).map(Float::abs) * gamma(5);
        let n = Normal3(Vec3f::new(p_hit.x, p_hit.y, p_hit.z).normalize());
        let n = if self.reverse_orientation { -n } else { n };

        let geom = DiffGeom { dpdu, dpdv, dndu: Normal3::zero(), dndv: Normal3::zero() };
        let si = SurfaceInteraction::new(p_hit, p_err, r.time, point2f!(u, v), -r.dir, n, geom);
        Some((t_shape_hit.v, self.object_to_world.transform(si)))
    }

    pub fn intersect_test(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }

    /// Uniformly samples a point on the full sphere's surface (partial spheres fall back to
    /// the same distribution, which is an approximation, but clipped-sphere area lights are
    /// rare in practice).
    pub fn sample(&self, u: Point2f) -> (SurfaceHit, Float) {
        let p_obj = Point3f::origin() + uniform_sample_sphere(u) * self.radius;
        let n = self
            .object_to_world
            .transform_normal(&Normal3(Vec3f::new(p_obj.x, p_obj.y, p_obj.z)))
            .normalize();
        let p_err = Vec3f::new(p_obj.x, p_obj.y, p_obj.z).map(Float::abs) * gamma(5);
        let p = self.object_to_world.transform(p_obj);
        let p_err = self.object_to_world.transform(p_err);
        (SurfaceHit { p, p_err, time: 0.0, n }, 1.0 / self.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_through_center_hits_both_poles_distance() {
        let s = Sphere::full(Transform::IDENTITY, 1.0);
        let ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vec3f::new(0.0, 0.0, 1.0));
        let (t, si) = s.intersect(&ray).unwrap();
        assert!((t - 4.0).abs() < 1e-4);
        assert!((si.hit.p.z + 1.0).abs() < 1e-4);
    }

    #[test]
    fn ray_missing_sphere_returns_none() {
        let s = Sphere::full(Transform::IDENTITY, 1.0);
        let ray = Ray::new(Point3f::new(5.0, 5.0, -5.0), Vec3f::new(0.0, 0.0, 1.0));
        assert!(s.intersect(&ray).is_none());
    }
}
