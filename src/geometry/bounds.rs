use crate::err_float::gamma;
use crate::geometry::Ray;
use crate::{Float, Point2i, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace, Point2, Point3, Vector2, Vector3};
use num::{Bounded, Num};
use std::fmt::Error;
use std::mem::swap;

/// Minimal trait bound shared by the two scalar types bounds are instantiated over (`f32`
/// raster/world-space bounds, `i32` pixel bounds) — narrower than `num::Float` since integer
/// bounds don't need transcendental functions.
pub trait Scalar: Num + Bounded + PartialOrd + Copy + cgmath::BaseNum {}
impl Scalar for f32 {}
impl Scalar for i32 {}

pub type Bounds2f = Bounds2<f32>;
pub type Bounds2i = Bounds2<i32>;
pub type Bounds3f = Bounds3<f32>;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds2<S: Scalar> {
    pub min: Point2<S>,
    pub max: Point2<S>,
}

impl<S: Scalar> Bounds2<S> {
    pub fn empty() -> Self {
        Self { min: Point2::max_value(), max: Point2::min_value() }
    }

    pub fn with_bounds(min: Point2<S>, max: Point2<S>) -> Self {
        Self { min, max }
    }

    pub fn diagonal(&self) -> Vector2<S> {
        self.max - self.min
    }

    pub fn area(&self) -> S {
        let d = self.diagonal();
        d.x * d.y
    }

    pub fn dimensions(&self) -> (S, S) {
        (self.max.x - self.min.x, self.max.y - self.min.y)
    }
}

impl<S: Scalar, T> From<(T, T)> for Bounds2<S>
where
    Point2<S>: From<T>,
{
    fn from(t: (T, T)) -> Self {
        Self::with_bounds(t.0.into(), t.1.into())
    }
}

impl Bounds2<i32> {
    pub fn iter_points(self) -> impl Iterator<Item = (i32, i32)> {
        let (x1, x2, y1, y2) = (self.min.x, self.max.x, self.min.y, self.max.y);
        (x1..x2).flat_map(move |x| (y1..y2).map(move |y| (x, y)))
    }

    /// Splits into `tile_size`-by-`tile_size` tiles (clamped at the bounds' edges), the unit of
    /// work handed to the parallel scheduler's `ParallelFor2D`.
    pub fn iter_tiles(self, tile_size: usize) -> impl Iterator<Item = Bounds2i> {
        let (xmin, xmax, ymin, ymax) = (self.min.x, self.max.x, self.min.y, self.max.y);
        (xmin..xmax).step_by(tile_size).flat_map(move |x| {
            (ymin..ymax).step_by(tile_size).map(move |y| {
                let min = Point2i::new(x, y);
                let max = Point2i::new(
                    (x + tile_size as i32).min(xmax),
                    (y + tile_size as i32).min(ymax),
                );
                Bounds2i::with_bounds(min, max)
            })
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
pub struct Bounds3<S: Scalar> {
    pub min: Point3<S>,
    pub max: Point3<S>,
}

impl<S: Scalar> Bounds3<S> {
    pub fn with_bounds(min: Point3<S>, max: Point3<S>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self::with_bounds(Point3::max_value(), Point3::min_value())
    }

    pub fn join(&self, other: &Self) -> Self {
        Self::with_bounds(
            Point3::new(
                min_s(self.min.x, other.min.x),
                min_s(self.min.y, other.min.y),
                min_s(self.min.z, other.min.z),
            ),
            Point3::new(
                max_s(self.max.x, other.max.x),
                max_s(self.max.y, other.max.y),
                max_s(self.max.z, other.max.z),
            ),
        )
    }

    pub fn join_point(&self, point: Point3<S>) -> Self {
        Self::with_bounds(
            Point3::new(min_s(self.min.x, point.x), min_s(self.min.y, point.y), min_s(self.min.z, point.z)),
            Point3::new(max_s(self.max.x, point.x), max_s(self.max.y, point.y), max_s(self.max.z, point.z)),
        )
    }

    pub fn diagonal(&self) -> Vector3<S> {
        self.max - self.min
    }

    pub fn maximum_extent(&self) -> u8 {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    pub fn is_point(&self) -> bool {
        self.max == self.min
    }

    pub fn iter_corners(&self) -> impl Iterator<Item = Point3<S>> + '_ {
        (0..8).map(move |i| {
            Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }
}

fn min_s<S: Scalar>(a: S, b: S) -> S {
    if a < b { a } else { b }
}
fn max_s<S: Scalar>(a: S, b: S) -> S {
    if a > b { a } else { b }
}

impl Bounds3<f32> {
    pub fn centroid(&self) -> Point3<f32> {
        self.min + self.diagonal() / 2.0
    }

    pub fn surface_area(&self) -> Float {
        let d = self.diagonal();
        if d.x < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    pub fn offset(&self, p: &Point3<f32>) -> Vec3f {
        let mut o = p - self.min;
        if self.max.x > self.min.x {
            o.x /= self.max.x - self.min.x
        };
        if self.max.y > self.min.y {
            o.y /= self.max.y - self.min.y
        };
        if self.max.z > self.min.z {
            o.z /= self.max.z - self.min.z
        };
        o
    }

    /// Bounding sphere used by infinite/distant lights to convert a direction into a point far
    /// enough outside the scene to serve as a shadow-ray endpoint.
    pub fn bounding_sphere(&self) -> (Point3<f32>, Float) {
        let center = self.centroid();
        let radius = if self.is_point() { 0.0 } else { (self.max - center).magnitude() };
        (center, radius)
    }

    pub fn intersect_test(&self, ray: &Ray) -> Option<(Float, Float)> {
        let mut t0 = 0.0f32;
        let mut t1 = ray.t_max;

        for i in 0..3 {
            let inv_ray_dir = 1.0 / ray.dir[i];
            let mut t_near = (self.min[i] - ray.origin[i]) * inv_ray_dir;
            let mut t_far = (self.max[i] - ray.origin[i]) * inv_ray_dir;

            if t_near > t_far {
                swap(&mut t_near, &mut t_far)
            }

            // expand t_far to account for fp error in the slab test itself
            t_far *= 1.0 + 2.0 * gamma(3);

            t0 = Float::max(t0, t_near);
            t1 = Float::min(t1, t_far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    /// Variant used by the BVH traversal hot loop: precomputed inverse direction and sign bits
    /// avoid redoing the divide/compare per node.
    pub fn intersect_test_fast(&self, origin: Point3<f32>, inv_dir: Vec3f, dir_is_neg: [bool; 3], t_max: Float) -> bool {
        let bounds = [self.min, self.max];
        let mut t_min = (bounds[dir_is_neg[0] as usize].x - origin.x) * inv_dir.x;
        let mut t_max_x = (bounds[1 - dir_is_neg[0] as usize].x - origin.x) * inv_dir.x;
        let ty_min = (bounds[dir_is_neg[1] as usize].y - origin.y) * inv_dir.y;
        let mut ty_max = (bounds[1 - dir_is_neg[1] as usize].y - origin.y) * inv_dir.y;

        t_max_x *= 1.0 + 2.0 * gamma(3);
        ty_max *= 1.0 + 2.0 * gamma(3);
        if t_min > ty_max || ty_min > t_max_x {
            return false;
        }
        if ty_min > t_min {
            t_min = ty_min;
        }
        if ty_max < t_max_x {
            t_max_x = ty_max;
        }

        let tz_min = (bounds[dir_is_neg[2] as usize].z - origin.z) * inv_dir.z;
        let mut tz_max = (bounds[1 - dir_is_neg[2] as usize].z - origin.z) * inv_dir.z;
        tz_max *= 1.0 + 2.0 * gamma(3);
        if t_min > tz_max || tz_min > t_max_x {
            return false;
        }
        if tz_min > t_min {
            t_min = tz_min;
        }
        if tz_max < t_max_x {
            t_max_x = tz_max;
        }

        t_min < t_max && t_max_x > 0.0
    }
}

impl<S: Scalar + std::fmt::Debug> std::fmt::Debug for Bounds3<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), Error> {
        let arrmin: [S; 3] = self.min.into();
        let arrmax: [S; 3] = self.max.into();
        write!(f, "Bounds3[{:?}, {:?}]", arrmin, arrmax)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::Ray;
    use crate::{bounds3f, point3f, vec3f, Point2i};

    #[test]
    fn test_bounds_iter() {
        let bounds = Bounds2i::with_bounds(Point2i::new(-1, -2), Point2i::new(1, 1));
        let points: Vec<_> = bounds.iter_points().collect();
        let expected = vec![(-1, -2), (-1, -1), (-1, 0), (0, -2), (0, -1), (0, 0)];
        assert_eq!(expected, points);
    }

    #[test]
    fn test_bounds_iter_tiles() {
        let big_bounds = Bounds2i::with_bounds((0, 0).into(), (100, 100).into());
        for &tile_size in &[1, 5, 7, 16] {
            let total_tile_area: i32 = big_bounds.iter_tiles(tile_size).map(|tile| tile.area()).sum();
            assert_eq!(big_bounds.area(), total_tile_area);
        }
    }

    #[test]
    fn test_bounds3f_intersect() {
        let bounds = bounds3f!((1, 1, 1), (2, 2, 2));
        let ray = Ray::new(point3f!(0, 0, 0), vec3f!(1, 1, 1));
        assert_eq!(bounds.intersect_test(&ray), Some((1.0, 2.0)));

        let bounds = bounds3f!((1, 1, 1), (2, 2, 2));
        let ray = Ray::new(point3f!(0, 0, 0), vec3f!(-1, 1, 1));
        assert_eq!(bounds.intersect_test(&ray), None);
    }
}
