//! The closed `Shape` variant set: a tagged union in place of a `Shape` trait object, with each
//! variant's intersection routine following pbrt's standard derivations (quadric intersection
//! via `EFloat` for the sphere, Moeller-Trumbore for the triangle).
//!
//! Triangles carry their own vertex/normal/uv data rather than indexing into a shared mesh
//! buffer -- mesh loading (OBJ/glTF) is out of scope, so there is no shared mesh to index into.

pub mod sphere;
pub mod triangle;

use crate::geometry::bounds::Bounds3f;
use crate::geometry::transform::Transformable;
use crate::geometry::{Normal3, Ray, Transform};
use crate::interaction::{DiffGeom, SurfaceHit, SurfaceInteraction};
use crate::shapes::sphere::Sphere;
use crate::shapes::triangle::Triangle;
use crate::{point2f, Float, Point2f, Vec3f};

#[derive(Clone)]
pub enum Shape {
    Sphere(Sphere),
    Triangle(Triangle),
    Disk(Disk),
}

/// A flat disk in the object-space `z=height` plane, `inner_radius <= r <= radius`. Grounded in
/// pbrt's quadric family, used here for ground planes and disk-shaped light caps.
#[derive(Clone, Copy)]
pub struct Disk {
    pub object_to_world: Transform,
    pub world_to_object: Transform,
    pub height: Float,
    pub radius: Float,
    pub inner_radius: Float,
    pub phi_max: Float,
}

impl Shape {
    pub fn world_bound(&self) -> Bounds3f {
        match self {
            Shape::Sphere(s) => s.world_bound(),
            Shape::Triangle(t) => t.world_bound(),
            Shape::Disk(d) => d.world_bound(),
        }
    }

    pub fn area(&self) -> Float {
        match self {
            Shape::Sphere(s) => s.area(),
            Shape::Triangle(t) => t.area(),
            Shape::Disk(d) => crate::math::consts::PI * (d.radius * d.radius - d.inner_radius * d.inner_radius),
        }
    }

    pub fn intersect<'i>(&self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'i>)> {
        match self {
            Shape::Sphere(s) => s.intersect(ray),
            Shape::Triangle(t) => t.intersect(ray),
            Shape::Disk(d) => d.intersect(ray),
        }
    }

    pub fn intersect_test(&self, ray: &Ray) -> bool {
        match self {
            Shape::Sphere(s) => s.intersect_test(ray),
            Shape::Triangle(t) => t.intersect_test(ray),
            Shape::Disk(d) => d.intersect(ray).is_some(),
        }
    }

    /// Samples a point on the shape's surface uniformly by area, returning the hit and the pdf
    /// with respect to area (`1/area` for every variant here). Used by area-light sampling.
    pub fn sample(&self, u: Point2f) -> (SurfaceHit, Float) {
        match self {
            Shape::Sphere(s) => s.sample(u),
            Shape::Triangle(t) => t.sample(u),
            Shape::Disk(d) => d.sample(u),
        }
    }

    /// Samples a point on the shape for direct lighting from `reference`. Every variant here
    /// falls back to uniform area sampling rather than pbrt's solid-angle cone sampling for
    /// spheres -- simpler, at the cost of extra variance close to small bright spheres.
    pub fn sample_from_reference(&self, _reference: &SurfaceHit, u: Point2f) -> (SurfaceHit, Float) {
        self.sample(u)
    }

    /// The solid-angle pdf of sampling direction `wi` from `reference` via
    /// `sample_from_reference`, derived by re-intersecting and converting the area pdf.
    pub fn pdf_from_reference(&self, reference: &SurfaceHit, wi: Vec3f) -> Float {
        let ray = reference.spawn_ray(wi);
        match self.intersect(&ray) {
            Some((_, si)) => {
                use cgmath::InnerSpace;
                let dist2 = (si.hit.p - reference.p).magnitude2();
                let cos_theta = si.n().dot(-wi).abs();
                if cos_theta < 1e-7 {
                    0.0
                } else {
                    let pdf = dist2 / (cos_theta * self.area());
                    if pdf.is_infinite() {
                        0.0
                    } else {
                        pdf
                    }
                }
            }
            None => 0.0,
        }
    }
}

impl Disk {
    pub fn area(&self) -> Float {
        crate::math::consts::PI * (self.radius * self.radius - self.inner_radius * self.inner_radius)
    }

    pub fn world_bound(&self) -> Bounds3f {
        let ob = crate::bounds3f!((-self.radius, -self.radius, self.height), (self.radius, self.radius, self.height));
        self.object_to_world.transform(ob)
    }

    pub fn intersect<'i>(&self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'i>)> {
        let r = self.world_to_object.transform(ray.clone());
        if r.dir.z.abs() < 1e-9 {
            return None;
        }
        let t_hit = (self.height - r.origin.z) / r.dir.z;
        if t_hit <= 1e-4 || t_hit >= r.t_max {
            return None;
        }

        let p_hit = r.at(t_hit);
        let dist2 = p_hit.x * p_hit.x + p_hit.y * p_hit.y;
        if dist2 > self.radius * self.radius || dist2 < self.inner_radius * self.inner_radius {
            return None;
        }

        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 {
            phi += 2.0 * crate::math::consts::PI;
        }
        if phi > self.phi_max {
            return None;
        }

        let u = phi / self.phi_max;
        let r_hit = dist2.sqrt();
        let v = (self.radius - r_hit) / (self.radius - self.inner_radius).max(1e-6);
        let dpdu = Vec3f::new(-self.phi_max * p_hit.y, self.phi_max * p_hit.x, 0.0);
        let dpdv = Vec3f::new(p_hit.x, p_hit.y, 0.0) * ((self.inner_radius - self.radius) / r_hit.max(1e-6));

        let n = Normal3(Vec3f::new(0.0, 0.0, 1.0));
        let geom = DiffGeom { dpdu, dpdv, dndu: Normal3::zero(), dndv: Normal3::zero() };
        let si = SurfaceInteraction::new(p_hit, Vec3f::new(0.0, 0.0, 0.0), r.time, point2f!(u, v), -r.dir, n, geom);
        Some((t_hit, self.object_to_world.transform(si)))
    }

    pub fn sample(&self, u: Point2f) -> (SurfaceHit, Float) {
        let d = crate::sampling::concentric_sample_disk(u);
        let p_obj = crate::Point3f::new(d.x * self.radius, d.y * self.radius, self.height);
        let p = self.object_to_world.transform(p_obj);
        let n = self.object_to_world.transform_normal(&Normal3(Vec3f::new(0.0, 0.0, 1.0))).normalize();
        (SurfaceHit { p, p_err: Vec3f::new(0.0, 0.0, 0.0), time: 0.0, n }, 1.0 / self.area())
    }
}
