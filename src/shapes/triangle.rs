//! Triangles sharing vertex/normal/uv data through a `TriangleMesh`, the one shape where
//! sharing via `Arc` genuinely pays for itself (a mesh's triangles all point back into the same
//! buffers). The watertight ray-triangle algorithm, error-bound bookkeeping, shading-normal
//! interpolation and sampling all follow pbrt's standard derivations.

use crate::err_float::gamma;
use crate::geometry::{Normal3, Ray};
use crate::interaction::{DiffGeom, SurfaceHit, SurfaceInteraction};
use crate::math::{coordinate_system, faceforward, max_dimension, permute_point, permute_vec, AbsExt};
use crate::sampling::uniform_sample_triangle;
use crate::{Bounds3f, Float, Point2f, Point3f, Transform, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace};
use std::sync::Arc;

#[derive(Debug)]
pub struct TriangleMesh {
    pub n_triangles: u32,
    vertex_indices: Vec<u32>,
    vertices: Vec<Point3f>,
    normals: Option<Vec<Normal3>>,
    tangents: Option<Vec<Vec3f>>,
    tex_coords: Option<Vec<Point2f>>,
    reverse_orientation: bool,
}

impl TriangleMesh {
    pub fn new(
        object_to_world: Transform,
        vertex_indices: Vec<u32>,
        mut vertices: Vec<Point3f>,
        mut normals: Option<Vec<Normal3>>,
        mut tangents: Option<Vec<Vec3f>>,
        tex_coords: Option<Vec<Point2f>>,
        reverse_orientation: bool,
    ) -> Self {
        assert_eq!(vertex_indices.len() % 3, 0);
        let n_triangles = vertex_indices.len() as u32 / 3;
        let n_vertices = vertices.len();

        for v in &mut vertices {
            *v = object_to_world.transform(*v);
        }
        if let Some(ref mut normals) = normals {
            assert_eq!(normals.len(), n_vertices);
            for n in normals {
                *n = object_to_world.transform(*n);
            }
        }
        if let Some(ref mut tangents) = tangents {
            assert_eq!(tangents.len(), n_vertices);
            for t in tangents {
                *t = object_to_world.transform(*t);
            }
        }
        if let Some(ref tex_coords) = tex_coords {
            assert_eq!(tex_coords.len(), n_vertices);
        }

        Self { n_triangles, vertex_indices, vertices, normals, tangents, tex_coords, reverse_orientation }
    }

    pub fn into_triangles(self: &Arc<Self>) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.n_triangles).map(move |tri_id| Triangle::new(Arc::clone(self), tri_id))
    }
}

#[derive(Clone)]
pub struct Triangle {
    mesh: Arc<TriangleMesh>,
    tri_id: u32,
}

impl Triangle {
    pub fn new(mesh: Arc<TriangleMesh>, tri_id: u32) -> Self {
        Self { mesh, tri_id }
    }

    fn vertex_indices(&self) -> [u32; 3] {
        let idx = self.tri_id as usize;
        [self.mesh.vertex_indices[3 * idx], self.mesh.vertex_indices[3 * idx + 1], self.mesh.vertex_indices[3 * idx + 2]]
    }

    fn get_vertices(&self) -> [Point3f; 3] {
        let v = self.vertex_indices();
        [self.mesh.vertices[v[0] as usize], self.mesh.vertices[v[1] as usize], self.mesh.vertices[v[2] as usize]]
    }

    fn get_normals(&self) -> Option<[Normal3; 3]> {
        self.mesh.normals.as_ref().map(|normals| {
            let v = self.vertex_indices();
            [normals[v[0] as usize], normals[v[1] as usize], normals[v[2] as usize]]
        })
    }

    fn get_uvs(&self) -> [Point2f; 3] {
        self.mesh.tex_coords.as_ref().map_or_else(
            || [Point2f::new(0.0, 0.0), Point2f::new(1.0, 0.0), Point2f::new(1.0, 1.0)],
            |uvs| {
                let v = self.vertex_indices();
                [uvs[v[0] as usize], uvs[v[1] as usize], uvs[v[2] as usize]]
            },
        )
    }

    fn flip_normals(&self) -> bool {
        self.mesh.reverse_orientation
    }

    pub fn world_bound(&self) -> Bounds3f {
        let [p0, p1, p2] = self.get_vertices();
        Bounds3f::empty().join_point(p0).join_point(p1).join_point(p2)
    }

    pub fn area(&self) -> Float {
        let [p0, p1, p2] = self.get_vertices();
        0.5 * (p1 - p0).cross(p2 - p0).magnitude()
    }

    pub fn intersect<'i>(&self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'i>)> {
        let v = self.vertex_indices();
        let [p0, p1, p2] = self.get_vertices();

        let mut p0t = (p0 - ray.origin.to_vec()).to_vec();
        let mut p1t = (p1 - ray.origin.to_vec()).to_vec();
        let mut p2t = (p2 - ray.origin.to_vec()).to_vec();

        let kz = max_dimension(ray.dir.abs());
        let kx = (kz + 1) % 3;
        let ky = (kx + 1) % 3;
        let dir = permute_vec(ray.dir, kx, ky, kz);
        p0t = permute_point(p0t, kx, ky, kz);
        p1t = permute_point(p1t, kx, ky, kz);
        p2t = permute_point(p2t, kx, ky, kz);

        let shear_x = -dir.x / dir.z;
        let shear_y = -dir.y / dir.z;
        let shear_z = 1.0 / dir.z;
        p0t.x += shear_x * p0t.z;
        p0t.y += shear_y * p0t.z;
        p1t.x += shear_x * p1t.z;
        p1t.y += shear_y * p1t.z;
        p2t.x += shear_x * p2t.z;
        p2t.y += shear_y * p2t.z;

        let mut e0 = p1t.x * p2t.y - p1t.y * p2t.x;
        let mut e1 = p2t.x * p0t.y - p2t.y * p0t.x;
        let mut e2 = p0t.x * p1t.y - p0t.y * p1t.x;

        if e0 == 0.0 || e1 == 0.0 || e2 == 0.0 {
            e0 = (p1t.x as f64 * p2t.y as f64 - p1t.y as f64 * p2t.x as f64) as Float;
            e1 = (p2t.x as f64 * p0t.y as f64 - p2t.y as f64 * p0t.x as f64) as Float;
            e2 = (p0t.x as f64 * p1t.y as f64 - p0t.y as f64 * p1t.x as f64) as Float;
        }

        if sign_differs(e0, e1, e2) {
            return None;
        }
        let det = e0 + e1 + e2;
        if det == 0.0 {
            return None;
        }

        p0t.z *= shear_z;
        p1t.z *= shear_z;
        p2t.z *= shear_z;
        let t_scaled = e0 * p0t.z + e1 * p1t.z + e2 * p2t.z;
        if (det < 0.0 && (t_scaled >= 0.0 || t_scaled < ray.t_max * det)) || (det > 0.0 && (t_scaled <= 0.0 || t_scaled > ray.t_max * det)) {
            return None;
        }

        let inv_det = 1.0 / det;
        let b0 = e0 * inv_det;
        let b1 = e1 * inv_det;
        let b2 = e2 * inv_det;
        let t = t_scaled * inv_det;

        let max_zt = p0t.z.abs().max(p1t.z.abs()).max(p2t.z.abs());
        let delta_z = gamma(3) * max_zt;
        let max_xt = p0t.x.abs().max(p1t.x.abs()).max(p2t.x.abs());
        let max_yt = p0t.y.abs().max(p1t.y.abs()).max(p2t.y.abs());
        let delta_x = gamma(5) * (max_xt + max_zt);
        let delta_y = gamma(5) * (max_yt + max_zt);
        let delta_e = 2.0 * (gamma(2) * max_xt * max_yt + delta_y * max_xt + delta_x * max_yt);
        let max_e = e0.abs().max(e1.abs()).max(e2.abs());
        let delta_t = 3.0 * (gamma(3) * max_e * max_zt + delta_e * max_zt + delta_z * max_e) * inv_det.abs();
        if t <= delta_t {
            return None;
        }

        let uv = self.get_uvs();
        let duv02 = uv[0] - uv[2];
        let duv12 = uv[1] - uv[2];
        let dp02 = p0 - p2;
        let dp12 = p1 - p2;

        let determinant = duv02.x * duv12.y - duv02.y * duv12.x;
        let degenerate_uv = determinant.abs() < 1.0e-8;

        let (dpdu, dpdv) = if degenerate_uv {
            let ng = (p2 - p0).cross(p1 - p0);
            if ng.magnitude2() == 0.0 {
                return None;
            }
            coordinate_system(ng.normalize())
        } else {
            let inv_det = 1.0 / determinant;
            (
                (duv12.y * dp02 - duv02.y * dp12) * inv_det,
                (-duv12.x * dp02 + duv02.x * dp12) * inv_det,
            )
        };

        let x_abs_sum = (b0 * p0.x).abs() + (b1 * p1.x).abs() + (b2 * p2.x).abs();
        let y_abs_sum = (b0 * p0.y).abs() + (b1 * p1.y).abs() + (b2 * p2.y).abs();
        let z_abs_sum = (b0 * p0.z).abs() + (b1 * p1.z).abs() + (b2 * p2.z).abs();
        let p_err = Vec3f::new(x_abs_sum, y_abs_sum, z_abs_sum) * gamma(7);

        let p_hit = Point3f::from_vec(p0.to_vec() * b0 + p1.to_vec() * b1 + p2.to_vec() * b2);
        let uv_hit = Point2f::from_vec(uv[0].to_vec() * b0 + uv[1].to_vec() * b1 + uv[2].to_vec() * b2);

        let diff_geom = DiffGeom { dpdu, dpdv, dndu: Normal3::zero(), dndv: Normal3::zero() };
        let geom_normal = Normal3(dp02.cross(dp12).normalize());

        let mut isect = SurfaceInteraction::new(p_hit, p_err, ray.time, uv_hit, -ray.dir, geom_normal, diff_geom);
        if self.flip_normals() {
            isect.hit.n *= -1.0;
            isect.shading_n *= -1.0;
        }

        if self.mesh.normals.is_some() || self.mesh.tangents.is_some() {
            let ns = if let Some(normals) = &self.mesh.normals {
                Normal3((normals[v[0] as usize].0 * b0 + normals[v[1] as usize].0 * b1 + normals[v[2] as usize].0 * b2).normalize())
            } else {
                isect.hit.n
            };

            let ss = if let Some(tangents) = &self.mesh.tangents {
                (tangents[v[0] as usize] * b0 + tangents[v[1] as usize] * b1 + tangents[v[2] as usize] * b2).normalize()
            } else {
                isect.geom.dpdu.normalize()
            };

            let ts_raw = ns.0.cross(ss);
            let (ts, ss) = if ts_raw.magnitude2() > 0.0 {
                let ts = ts_raw.normalize();
                (ts, ts.cross(ns.0))
            } else {
                coordinate_system(ns.0)
            };

            let (dndu, dndv) = if let Some(normals) = &self.mesh.normals {
                let dn1 = normals[v[0] as usize] - normals[v[2] as usize];
                let dn2 = normals[v[1] as usize] - normals[v[2] as usize];
                if degenerate_uv {
                    let dn = (normals[v[2] as usize] - normals[v[0] as usize]).0.cross((normals[v[1] as usize] - normals[v[0] as usize]).0);
                    if dn.magnitude2() == 0.0 {
                        (Normal3::zero(), Normal3::zero())
                    } else {
                        let (dndu, dndv) = coordinate_system(dn);
                        (Normal3(dndu), Normal3(dndv))
                    }
                } else {
                    let inv_det = 1.0 / determinant;
                    ((dn1 * duv12.y - dn2 * duv02.y) * inv_det, (dn2 * duv02.x - dn1 * duv12.x) * inv_det)
                }
            } else {
                (Normal3::zero(), Normal3::zero())
            };

            isect.shading_geom = DiffGeom { dpdu: ss, dpdv: ts, dndu, dndv };
            isect.shading_n = ns;
            isect.hit.n = Normal3(faceforward(isect.hit.n.0, isect.shading_n.0));
        }

        Some((t, isect))
    }

    pub fn intersect_test(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }

    pub fn sample(&self, u: Point2f) -> (SurfaceHit, Float) {
        let b = uniform_sample_triangle(u);
        let [p0, p1, p2] = self.get_vertices();
        let b2 = 1.0 - b[0] - b[1];
        let sample_p = p0.to_vec() * b[0] + p1.to_vec() * b[1] + p2.to_vec() * b2;

        let n = Normal3((p1 - p0).cross(p2 - p0).normalize());
        let sample_n = if let Some([n0, n1, n2]) = self.get_normals() {
            let ns = Normal3((n0.0 * b[0] + n1.0 * b[1] + n2.0 * b2).normalize());
            Normal3(faceforward(n.0, ns.0))
        } else if self.flip_normals() {
            n * -1.0
        } else {
            n
        };

        let p_abs_sum = (p0.to_vec() * b[0]).abs() + (p1.to_vec() * b[1]).abs() + (p2.to_vec() * b2).abs();
        let p_err = p_abs_sum * gamma(6);

        (SurfaceHit { p: Point3f::origin() + sample_p, p_err, time: 0.0, n: sample_n }, 1.0 / self.area())
    }
}

#[inline]
fn sign_differs(v1: Float, v2: Float, v3: Float) -> bool {
    v1.is_sign_positive() != v2.is_sign_positive() || v2.is_sign_positive() != v3.is_sign_positive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_differs() {
        assert!(sign_differs(1.0, 2.0, -1.0));
        assert!(!sign_differs(1.0, 2.0, 1.0));
        assert!(sign_differs(-1.0, -2.0, 1.0));
        assert!(!sign_differs(-1.0, -2.0, -1.0));
    }

    #[test]
    fn ray_through_triangle_center_hits() {
        let mesh = Arc::new(TriangleMesh::new(
            Transform::IDENTITY,
            vec![0, 1, 2],
            vec![Point3f::new(-1.0, -1.0, 0.0), Point3f::new(1.0, -1.0, 0.0), Point3f::new(0.0, 1.0, 0.0)],
            None,
            None,
            None,
            false,
        ));
        let tri = Triangle::new(mesh, 0);
        let ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vec3f::new(0.0, 0.0, 1.0));
        let (t, _) = tri.intersect(&ray).unwrap();
        assert!((t - 5.0).abs() < 1e-3);
    }
}
