//! `Scene::intersect`/`intersect_test` traverse the SAH BVH; this checks that traversal against a
//! brute-force linear scan over every primitive's own `Shape::intersect`, for a cluster of spheres
//! scattered densely enough that the BVH actually has to choose between overlapping subtrees
//! rather than trivially rejecting most of them.

use fluxtracer::primitive::Primitive;
use fluxtracer::scene::SceneBuilder;
use fluxtracer::shapes::sphere::Sphere;
use fluxtracer::shapes::Shape;
use fluxtracer::{Point3f, Ray, Transform, Vec3f};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_sphere_scene(rng: &mut StdRng, n: usize) -> fluxtracer::scene::Scene {
    let mut b = SceneBuilder::new();
    for _ in 0..n {
        let center = Point3f::new(rng.gen_range(-10.0, 10.0), rng.gen_range(-10.0, 10.0), rng.gen_range(-10.0, 10.0));
        let radius = rng.gen_range(0.2, 1.5);
        let object_to_world = Transform::translate(Vec3f::new(center.x, center.y, center.z));
        let sphere = Sphere::new(object_to_world, false, radius, -radius, radius, 2.0 * std::f32::consts::PI);
        let shape_id = b.add_shape(Shape::Sphere(sphere));
        b.add_primitive(Primitive::new(shape_id, None));
    }
    b.build()
}

/// Brute-force nearest-hit search, bypassing the BVH entirely.
fn linear_intersect(scene: &fluxtracer::scene::Scene, ray: &Ray) -> Option<fluxtracer::Float> {
    let mut best: Option<fluxtracer::Float> = None;
    for shape in &scene.shapes {
        if let Some((t, _si)) = shape.intersect(ray) {
            if t < ray.t_max && best.map_or(true, |b| t < b) {
                best = Some(t);
            }
        }
    }
    best
}

#[test]
fn bvh_intersection_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(7);
    let scene = random_sphere_scene(&mut rng, 400);

    for _ in 0..2_000 {
        let origin = Point3f::new(rng.gen_range(-15.0, 15.0), rng.gen_range(-15.0, 15.0), rng.gen_range(-15.0, 15.0));
        let dir = Vec3f::new(rng.gen_range(-1.0, 1.0), rng.gen_range(-1.0, 1.0), rng.gen_range(-1.0, 1.0));
        let ray = Ray::new(origin, dir);

        let expected = linear_intersect(&scene, &ray);
        let actual = scene.intersect(&ray).map(|(t, _si)| t);

        match (expected, actual) {
            (None, None) => {}
            (Some(e), Some(a)) => assert!((e - a).abs() < 1e-3, "bvh hit {} != linear-scan hit {} for ray {:?}", a, e, ray),
            (e, a) => panic!("bvh/linear-scan disagreed on hit/miss: linear={:?} bvh={:?} ray={:?}", e, a, ray),
        }
    }
}

#[test]
fn bvh_intersect_test_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(11);
    let scene = random_sphere_scene(&mut rng, 400);

    for _ in 0..2_000 {
        let origin = Point3f::new(rng.gen_range(-15.0, 15.0), rng.gen_range(-15.0, 15.0), rng.gen_range(-15.0, 15.0));
        let dir = Vec3f::new(rng.gen_range(-1.0, 1.0), rng.gen_range(-1.0, 1.0), rng.gen_range(-1.0, 1.0));
        let ray = Ray::new(origin, dir);

        let expected = linear_intersect(&scene, &ray).is_some();
        let actual = scene.intersect_test(&ray);
        assert_eq!(expected, actual, "bvh_intersect_test disagreed with linear scan for ray {:?}", ray);
    }
}
