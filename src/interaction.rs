use crate::geometry::Normal3;
use crate::material::TransportMode;
use crate::primitive::PrimitiveId;
use crate::reflection::bsdf::Bsdf;
use crate::{Differential, Float, Point2f, Point3f, Ray, RayDifferential, Vec2f, Vec3f};
use bumpalo::Bump;
use cgmath::{EuclideanSpace, InnerSpace, Matrix2, SquareMatrix, Vector2};

/// A bare hit point with its conservative floating-point error bound (`p_err`, following
/// pbrt's reprojection-error-bound approach) and the geometric normal at that point — enough
/// information to spawn a self-intersection-free ray without re-deriving it from a full
/// `SurfaceInteraction`. Used for the "reference point" side of light sampling.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceHit {
    pub p: Point3f,
    pub p_err: Vec3f,
    pub time: Float,
    pub n: Normal3,
}

impl SurfaceHit {
    pub fn spawn_ray(&self, dir: Vec3f) -> Ray {
        let o = offset_ray_origin(self.p, self.p_err, self.n, dir);
        Ray::new(o, dir)
    }

    /// Spawns a shadow ray from `self` towards `target`, with `t_max` just short of 1 so the
    /// ray doesn't re-intersect the target surface due to float error.
    pub fn spawn_ray_to_hit(&self, target: SurfaceHit) -> Ray {
        let dir = target.p - self.p;
        let o = offset_ray_origin(self.p, self.p_err, self.n, dir);
        Ray { origin: o, dir, t_max: 1.0 - crate::math::SHADOW_EPSILON, time: self.time, medium: None }
    }
}

/// Offsets a ray origin away from its originating surface along the geometric normal, enough
/// to outrun the surface's own floating-point reconstruction error, following pbrt's
/// `OffsetRayOrigin`.
pub fn offset_ray_origin(p: Point3f, p_err: Vec3f, n: Normal3, w: Vec3f) -> Point3f {
    let d = n.0.map(Float::abs).dot(p_err);
    let mut offset = d * n.0;
    if w.dot(n.0) < 0.0 {
        offset = -offset;
    }
    let mut po = p + offset;
    for i in 0..3 {
        if offset[i] > 0.0 {
            po[i] = crate::err_float::next_float_up(po[i]);
        } else if offset[i] < 0.0 {
            po[i] = crate::err_float::next_float_down(po[i]);
        }
    }
    po
}

/// Solves `A x = b` for a 2x2 system, returning `None` if `A` is (numerically) singular.
/// Used to convert world-space ray differentials into UV-space differentials for texture
/// antialiasing.
pub fn solve_linear_system_2x2(a: Matrix2<Float>, b: Vec2f) -> Option<Vec2f> {
    let det = a.determinant();
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = a.invert()?;
    Some(inv * b)
}

pub struct SurfaceInteraction<'i> {
    pub hit: SurfaceHit,

    /// (u, v) coordinates from the parametrization of the surface.
    pub uv: Point2f,

    pub wo: Vec3f,

    pub geom: DiffGeom,

    pub shading_n: Normal3,

    pub shading_geom: DiffGeom,

    pub tex_diffs: Option<TextureDifferentials>,

    pub primitive: Option<PrimitiveId>,

    /// Ties this interaction to the scene it was produced from, even though the primitive is
    /// now a plain index rather than a borrowed reference.
    pub _marker: std::marker::PhantomData<&'i ()>,
}

impl<'i> SurfaceInteraction<'i> {
    pub fn new(p: Point3f, p_err: Vec3f, time: Float, uv: Point2f, wo: Vec3f, n: Normal3, geom: DiffGeom) -> Self {
        Self {
            hit: SurfaceHit { p, p_err, time, n },
            uv,
            wo,
            geom,
            shading_n: n,
            shading_geom: geom,
            tex_diffs: None,
            primitive: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn n(&self) -> Normal3 {
        self.hit.n
    }

    /// Installs a shading frame distinct from the geometric one (e.g. from interpolated
    /// vertex normals), flipping it onto the geometric side per `orient_by_ns`.
    pub fn set_shading_geometry(&mut self, ns: Normal3, dpdus: Vec3f, dpdvs: Vec3f, dndus: Normal3, dndvs: Normal3, orient_by_ns: bool) {
        self.shading_n = ns;
        self.shading_geom = DiffGeom { dpdu: dpdus, dpdv: dpdvs, dndu: dndus, dndv: dndvs };
        if orient_by_ns {
            self.hit.n = crate::math::faceforward_normal(self.hit.n, ns.0);
        } else {
            self.shading_n = crate::math::faceforward_normal(ns, self.hit.n.0);
        }
    }

    pub fn spawn_ray(&self, dir: Vec3f) -> Ray {
        self.hit.spawn_ray(dir)
    }

    pub fn spawn_ray_with_differentials(&self, dir: Vec3f, diff: Option<Differential>) -> RayDifferential {
        RayDifferential { ray: self.spawn_ray(dir), diff }
    }

    /// Computes the BSDF at this hit, using `arena` for the matching-lobe storage. Texture
    /// differentials are (re)computed here since they depend on the incoming ray's
    /// differentials, which aren't known at intersection time.
    pub fn compute_scattering_functions<'a>(
        &mut self,
        ray: &RayDifferential,
        scene: &crate::scene::Scene,
        arena: &'a Bump,
        allow_multiple_lobes: bool,
        mode: TransportMode,
    ) -> Option<Bsdf<'a>> {
        self.tex_diffs = self.compute_tex_differentials(ray);
        let prim = scene.primitive(self.primitive?);
        let material = prim.material?;
        Some(scene.materials[material.0].compute_scattering_functions(self, arena, mode, allow_multiple_lobes))
    }

    fn compute_tex_differentials(&self, ray: &RayDifferential) -> Option<TextureDifferentials> {
        let n = self.hit.n;
        let diff = ray.diff?;
        let d = n.dot(self.hit.p.to_vec());

        let px = {
            let tx = -(n.dot(diff.rx_origin.to_vec()) - d) / n.dot(diff.rx_dir);
            if !tx.is_finite() {
                return None;
            }
            diff.rx_origin + tx * diff.rx_dir
        };
        let py = {
            let ty = -(n.dot(diff.ry_origin.to_vec()) - d) / n.dot(diff.ry_dir);
            if !ty.is_finite() {
                return None;
            }
            diff.ry_origin + ty * diff.ry_dir
        };

        let dpdx = px - self.hit.p;
        let dpdy = py - self.hit.p;

        let dim = if n.0.x.abs() > n.0.y.abs() && n.0.x.abs() > n.0.z.abs() {
            (1, 2)
        } else if n.0.y.abs() > n.0.z.abs() {
            (0, 2)
        } else {
            (0, 1)
        };

        let dpdu = self.geom.dpdu;
        let dpdv = self.geom.dpdv;
        let a = Matrix2::from_cols(Vector2::new(dpdu[dim.0], dpdu[dim.1]), Vector2::new(dpdv[dim.0], dpdv[dim.1]));

        let bx = Vec2f::new(dpdx[dim.0], dpdx[dim.1]);
        let by = Vec2f::new(dpdy[dim.0], dpdy[dim.1]);

        let (dudx, dvdx) = solve_linear_system_2x2(a, bx)?.into();
        let (dudy, dvdy) = solve_linear_system_2x2(a, by)?.into();
        Some(TextureDifferentials { dpdx, dpdy, dudx, dvdx, dudy, dvdy })
    }
}

#[derive(Clone, Copy)]
pub struct DiffGeom {
    pub dpdu: Vec3f,
    pub dpdv: Vec3f,
    pub dndu: Normal3,
    pub dndv: Normal3,
}

/// Partial derivatives of position and UV with respect to screen-space pixel offset, used for
/// texture-space antialiasing (out of scope here beyond carrying the data, since texture
/// evaluation is UV-in/scalar-out).
#[derive(Clone, Copy)]
pub struct TextureDifferentials {
    pub dpdx: Vec3f,
    pub dpdy: Vec3f,

    pub dudx: Float,
    pub dvdx: Float,

    pub dudy: Float,
    pub dvdy: Float,
}
