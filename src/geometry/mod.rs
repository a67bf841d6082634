use crate::{Float, MediumRef, Point3f, Vec3f};

pub mod bounds;
pub mod transform;

pub use transform::Transform;
pub use bounds::{Bounds2, Bounds2f, Bounds2i, Bounds3, Bounds3f};

/// A surface normal. Kept as a newtype rather than a bare `Vec3f` so that shading code can't
/// accidentally transform a normal with the point/vector rule (normals need the inverse
/// transpose, see `Transform::transform_normal`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normal3(pub Vec3f);

impl Normal3 {
    pub fn new(x: Float, y: Float, z: Float) -> Self {
        Normal3(Vec3f::new(x, y, z))
    }

    pub fn zero() -> Self {
        Normal3(Vec3f::new(0.0, 0.0, 0.0))
    }

    pub fn normalize(self) -> Self {
        use cgmath::InnerSpace;
        Normal3(self.0.normalize())
    }

    pub fn dot(&self, v: Vec3f) -> Float {
        use cgmath::InnerSpace;
        self.0.dot(v)
    }
}

impl std::ops::Neg for Normal3 {
    type Output = Normal3;
    fn neg(self) -> Normal3 {
        Normal3(-self.0)
    }
}

impl std::ops::Sub for Normal3 {
    type Output = Normal3;
    fn sub(self, rhs: Normal3) -> Normal3 {
        Normal3(self.0 - rhs.0)
    }
}

impl std::ops::Mul<Float> for Normal3 {
    type Output = Normal3;
    fn mul(self, rhs: Float) -> Normal3 {
        Normal3(self.0 * rhs)
    }
}

impl std::ops::MulAssign<Float> for Normal3 {
    fn mul_assign(&mut self, rhs: Float) {
        self.0 = self.0 * rhs;
    }
}

impl From<Vec3f> for Normal3 {
    fn from(v: Vec3f) -> Self {
        Normal3(v)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3f,
    pub dir: Vec3f,
    pub t_max: Float,
    pub time: Float,
    /// The participating medium the ray currently travels through, set when the ray is
    /// spawned from a surface with a non-trivial `MediumInterface`.
    pub medium: Option<MediumRef>,
}

impl Ray {
    pub fn new(origin: Point3f, dir: Vec3f) -> Self {
        Self { origin, dir, t_max: crate::math::INFINITY, time: 0.0, medium: None }
    }

    pub fn with_medium(origin: Point3f, dir: Vec3f, medium: Option<MediumRef>) -> Self {
        Self { origin, dir, t_max: crate::math::INFINITY, time: 0.0, medium }
    }

    pub fn at(&self, t: Float) -> Point3f {
        self.origin + self.dir * t
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Differential {
    pub rx_origin: Point3f,
    pub ry_origin: Point3f,
    pub rx_dir: Vec3f,
    pub ry_dir: Vec3f,
}

#[derive(Clone, Copy, Debug)]
pub struct RayDifferential {
    pub ray: Ray,
    pub diff: Option<Differential>,
}

impl RayDifferential {
    pub fn new(ray: Ray) -> Self {
        Self { ray, diff: None }
    }

    pub fn scale_differentials(&mut self, s: Float) {
        if let Some(d) = &mut self.diff {
            d.rx_origin = self.ray.origin + (d.rx_origin - self.ray.origin) * s;
            d.ry_origin = self.ray.origin + (d.ry_origin - self.ray.origin) * s;
            d.rx_dir = self.ray.dir + (d.rx_dir - self.ray.dir) * s;
            d.ry_dir = self.ray.dir + (d.ry_dir - self.ray.dir) * s;
        }
    }
}
