use criterion::{criterion_group, criterion_main, Criterion};
use fluxtracer::camera::Camera;
use fluxtracer::filter::Filter;
use fluxtracer::geometry::Transform;
use fluxtracer::integrator::Integrator;
use fluxtracer::light::Light;
use fluxtracer::material::Material;
use fluxtracer::primitive::Primitive;
use fluxtracer::sampler::Sampler;
use fluxtracer::scene::{Scene, SceneBuilder};
use fluxtracer::settings::RenderSettings;
use fluxtracer::shapes::sphere::Sphere;
use fluxtracer::shapes::{Disk, Shape};
use fluxtracer::spectrum::Spectrum;
use fluxtracer::texture::SpectrumTexture;
use fluxtracer::{Bounds2f, Point2f, Point2i, Point3f, Vec3f};
use std::time::Duration;

fn small_scene() -> Scene {
    let mut b = SceneBuilder::new();

    let floor = b.add_shape(Shape::Disk(Disk {
        object_to_world: Transform::IDENTITY,
        world_to_object: Transform::IDENTITY,
        height: -1.0,
        radius: 20.0,
        inner_radius: 0.0,
        phi_max: 2.0 * std::f32::consts::PI,
    }));
    let floor_mat = b.add_material(Material::Diffuse { albedo: SpectrumTexture::Constant(Spectrum::new(0.5)) });
    b.add_primitive(Primitive::new(floor, Some(floor_mat)));

    let sphere = b.add_shape(Shape::Sphere(Sphere::full(Transform::translate(Vec3f::new(0.0, 0.0, 0.0)), 1.0)));
    let sphere_mat = b.add_material(Material::Diffuse { albedo: SpectrumTexture::Constant(Spectrum::new(0.7)) });
    b.add_primitive(Primitive::new(sphere, Some(sphere_mat)));

    b.add_light(Light::Point { light_to_world: Transform::translate(Vec3f::new(2.0, 4.0, 3.0)), i: Spectrum::new(30.0) });

    b.build()
}

fn small_camera(resolution: Point2i) -> Camera {
    let camera_to_world = Transform::camera_look_at(Point3f::new(0.0, -5.0, 2.0), Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0));
    let screen_window = Bounds2f::with_bounds(Point2f::new(-1.0, -1.0), Point2f::new(1.0, 1.0));
    Camera::perspective(camera_to_world, resolution, screen_window, (0.0, 0.0), 0.0, 1.0, 40.0)
}

fn bench_path_tracer(c: &mut Criterion) {
    let scene = small_scene();
    let resolution = Point2i::new(64, 64);
    let camera = small_camera(resolution);
    let sampler = Sampler::independent(4, 0);
    let settings = RenderSettings { resolution, spp: 4, max_bounces: 3, ..Default::default() };
    let integrator = Integrator::Path { max_bounces: 3, rr_min_bounces: 3, regularize: false, power_light_sampling: true };

    c.bench_function("path_render_64x64_spp4", |b| {
        b.iter(|| integrator.render(&scene, &camera, &sampler, resolution, Filter::default(), &settings));
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10)).sample_size(20);
    targets = bench_path_tracer
}
criterion_main!(benches);
