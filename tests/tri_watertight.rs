//! Exercises the BVH and triangle intersection routine's watertightness: a ray from inside a
//! closed convex mesh must hit *something*, in every direction, with no cracks at shared edges.
//! Builds a cube mesh directly rather than loading one from disk (mesh loading is out of scope
//! here), which is enough surface to stress shared-edge agreement between adjacent triangles.

use cgmath::EuclideanSpace;
use fluxtracer::primitive::Primitive;
use fluxtracer::scene::SceneBuilder;
use fluxtracer::shapes::triangle::TriangleMesh;
use fluxtracer::shapes::Shape;
use fluxtracer::{Point3f, Ray, Transform, Vec3f};
use rand::distributions::{Distribution, UnitSphereSurface};
use rand::thread_rng;
use std::sync::Arc;

fn cube_mesh() -> Arc<TriangleMesh> {
    let vertices = vec![
        Point3f::new(-1.0, -1.0, -1.0),
        Point3f::new(1.0, -1.0, -1.0),
        Point3f::new(1.0, 1.0, -1.0),
        Point3f::new(-1.0, 1.0, -1.0),
        Point3f::new(-1.0, -1.0, 1.0),
        Point3f::new(1.0, -1.0, 1.0),
        Point3f::new(1.0, 1.0, 1.0),
        Point3f::new(-1.0, 1.0, 1.0),
    ];
    #[rustfmt::skip]
    let indices: Vec<u32> = vec![
        0, 2, 1, 0, 3, 2, // -z
        4, 5, 6, 4, 6, 7, // +z
        0, 1, 5, 0, 5, 4, // -y
        3, 6, 2, 3, 7, 6, // +y
        1, 2, 6, 1, 6, 5, // +x
        0, 4, 7, 0, 7, 3, // -x
    ];
    Arc::new(TriangleMesh::new(Transform::IDENTITY, indices, vertices, None, None, None, false))
}

#[test]
fn rays_from_inside_a_closed_cube_always_hit_it() {
    let mesh = cube_mesh();
    let mut b = SceneBuilder::new();
    for tri in mesh.into_triangles() {
        let shape_id = b.add_shape(Shape::Triangle(tri));
        b.add_primitive(Primitive::new(shape_id, None));
    }
    let scene = b.build();

    let mut rng = thread_rng();
    let sphere = UnitSphereSurface::new();
    for [x, y, z] in sphere.sample_iter(&mut rng).take(50_000) {
        let dir = Vec3f::new(x as f32, y as f32, z as f32);
        let ray = Ray::new(Point3f::origin(), dir);
        assert!(scene.intersect_test(&ray), "ray in direction {:?} missed the cube", dir);
        let (t, _si) = scene.intersect(&ray).expect("intersect_test said hit but intersect found none");
        assert!(t > 0.0 && t < 4.0, "unexpected hit distance {} for direction {:?}", t, dir);
    }
}
