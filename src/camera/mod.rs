//! The closed `Camera` variant set: `Perspective` (with thin-lens depth-of-field sampling),
//! `Orthographic` and `Spherical`, plus the `sample_wi`/`pdf_we` operations bidirectional
//! integrators need to connect a light subpath back to the camera.

use crate::geometry::transform::Transformable;
use crate::geometry::Transform;
use crate::interaction::SurfaceHit;
use crate::{lerp, vec3f, Bounds2f, Differential, Float, Point2f, Point2i, Point3f, Ray, RayDifferential, Vec2f, INFINITY};
use cgmath::{EuclideanSpace, InnerSpace};

#[derive(Clone, Copy)]
pub struct CameraSample {
    pub p_film: Point2f,
    pub p_lens: Point2f,
    pub time: Float,
}

/// The result of importance-sampling a direction from a reference point back towards the
/// camera (the `Sample_Wi` operation bidirectional integrators use to connect light subpaths).
pub struct CameraWiSample {
    pub wi: Vec3f,
    pub pdf: Float,
    pub p_raster: Point2f,
    pub point: SurfaceHit,
    pub we: crate::spectrum::Spectrum,
}

use crate::Vec3f;

struct CameraProjection {
    pub camera_to_screen: Transform,
    pub raster_to_camera: Transform,
    pub raster_to_screen: Transform,
    pub screen_to_raster: Transform,
}

impl CameraProjection {
    fn new(camera_to_screen: Transform, full_resolution: Point2i, screen_window: Bounds2f) -> Self {
        let screen_to_raster = Transform::scale(full_resolution.x as Float, full_resolution.y as Float, 1.0)
            * Transform::scale(1.0 / (screen_window.max.x - screen_window.min.x), 1.0 / (screen_window.min.y - screen_window.max.y), 1.0)
            * Transform::translate(vec3f!(-screen_window.min.x, -screen_window.max.y, 0.0));

        let raster_to_screen = screen_to_raster.inverse();
        let raster_to_camera = camera_to_screen.inverse() * raster_to_screen;

        Self { camera_to_screen, raster_to_screen, screen_to_raster, raster_to_camera }
    }
}

/// The closed camera variant set.
pub enum Camera {
    Perspective {
        camera_to_world: Transform,
        proj: CameraProjection,
        shutter_interval: (Float, Float),
        lens_radius: Float,
        focal_dist: Float,
    },
    Orthographic {
        camera_to_world: Transform,
        proj: CameraProjection,
        shutter_interval: (Float, Float),
        lens_radius: Float,
        focal_dist: Float,
    },
    Spherical {
        camera_to_world: Transform,
        full_resolution: Point2i,
        shutter_interval: (Float, Float),
    },
}

impl Camera {
    pub fn perspective(camera_to_world: Transform, full_resolution: Point2i, screen_window: Bounds2f, shutter_interval: (Float, Float), lens_radius: Float, focal_dist: Float, fov: Float) -> Self {
        let persp = Transform::perspective(fov, 0.001, 1000.0);
        let proj = CameraProjection::new(persp, full_resolution, screen_window);
        Camera::Perspective { camera_to_world, proj, shutter_interval, lens_radius, focal_dist }
    }

    pub fn orthographic(camera_to_world: Transform, full_resolution: Point2i, screen_window: Bounds2f, shutter_interval: (Float, Float), lens_radius: Float, focal_dist: Float) -> Self {
        let ortho = Transform::orthographic(0.0, 1.0);
        let proj = CameraProjection::new(ortho, full_resolution, screen_window);
        Camera::Orthographic { camera_to_world, proj, shutter_interval, lens_radius, focal_dist }
    }

    pub fn spherical(camera_to_world: Transform, full_resolution: Point2i, shutter_interval: (Float, Float)) -> Self {
        Camera::Spherical { camera_to_world, full_resolution, shutter_interval }
    }

    fn sample_lens(lens_radius: Float, u_lens: Point2f) -> Point2f {
        crate::sampling::concentric_sample_disk(u_lens) * lens_radius
    }

    pub fn generate_ray(&self, sample: CameraSample) -> (Float, Ray) {
        match self {
            Camera::Perspective { camera_to_world, proj, shutter_interval, lens_radius, focal_dist } => {
                let p_film = crate::point3f!(sample.p_film.x, sample.p_film.y, 0);
                let p_camera: Point3f = p_film.transform(proj.raster_to_camera);

                let mut origin = Point3f::new(0.0, 0.0, 0.0);
                let mut dir = p_camera.to_vec().normalize();

                if *lens_radius > 0.0 {
                    let p_lens = Self::sample_lens(*lens_radius, sample.p_lens);
                    let ft = focal_dist / dir.z;
                    let p_focus = origin + dir * ft;
                    origin = Point3f::new(p_lens.x, p_lens.y, 0.0);
                    dir = (p_focus - origin).normalize();
                }

                let time = lerp(sample.time, shutter_interval.0, shutter_interval.1);
                let ray = Ray { origin, dir, time, t_max: INFINITY, medium: None };
                (1.0, ray.transform(*camera_to_world))
            }
            Camera::Orthographic { camera_to_world, proj, shutter_interval, lens_radius, focal_dist } => {
                let p_film = crate::point3f!(sample.p_film.x, sample.p_film.y, 0);
                let mut origin: Point3f = p_film.transform(proj.raster_to_camera);
                let mut dir = Vec3f::new(0.0, 0.0, 1.0);

                if *lens_radius > 0.0 {
                    let p_lens = Self::sample_lens(*lens_radius, sample.p_lens);
                    let ft = focal_dist / dir.z;
                    let p_focus = origin + dir * ft;
                    origin = Point3f::new(origin.x + p_lens.x, origin.y + p_lens.y, origin.z);
                    dir = (p_focus - origin).normalize();
                }

                let time = lerp(sample.time, shutter_interval.0, shutter_interval.1);
                let ray = Ray { origin, dir, time, t_max: INFINITY, medium: None };
                (1.0, ray.transform(*camera_to_world))
            }
            Camera::Spherical { camera_to_world, full_resolution, shutter_interval } => {
                let theta = crate::math::consts::PI * sample.p_film.y / full_resolution.y as Float;
                let phi = 2.0 * crate::math::consts::PI * sample.p_film.x / full_resolution.x as Float;
                let dir = crate::math::spherical_direction(theta.sin(), theta.cos(), phi);
                let time = lerp(sample.time, shutter_interval.0, shutter_interval.1);
                let ray = Ray { origin: Point3f::origin(), dir, time, t_max: INFINITY, medium: None };
                (1.0, ray.transform(*camera_to_world))
            }
        }
    }

    pub fn generate_ray_differential(&self, sample: CameraSample) -> (Float, RayDifferential) {
        let (mut weight, ray) = self.generate_ray(sample);

        let cs_shift_x = CameraSample { p_film: sample.p_film + Vec2f::new(1.0, 0.0), ..sample };
        let (wtx, rx) = self.generate_ray(cs_shift_x);

        let cs_shift_y = CameraSample { p_film: sample.p_film + Vec2f::new(0.0, 1.0), ..sample };
        let (wty, ry) = self.generate_ray(cs_shift_y);

        let ray_diff = RayDifferential {
            ray,
            diff: Some(Differential { rx_origin: rx.origin, rx_dir: rx.dir, ry_origin: ry.origin, ry_dir: ry.dir }),
        };

        if wtx == 0.0 || wty == 0.0 {
            weight = 0.0;
        }
        (weight, ray_diff)
    }

    /// Importance-samples a direction from `reference` towards a point on the camera's lens,
    /// for bidirectional light transport's camera-subpath connection strategy. Only implemented
    /// for the perspective camera -- the orthographic/spherical variants have no well-defined
    /// notion of "a point on the lens with non-zero solid angle from a reference" without the
    /// finite-aperture projection that drives it.
    pub fn sample_wi(&self, reference: &SurfaceHit, u: Point2f) -> Option<CameraWiSample> {
        match self {
            Camera::Perspective { camera_to_world, proj, lens_radius, .. } => {
                let p_lens_local = Self::sample_lens(lens_radius.max(1e-4), u);
                let p_lens = camera_to_world.transform(Point3f::new(p_lens_local.x, p_lens_local.y, 0.0));
                let wi = (p_lens - reference.p).normalize();
                let dist2 = (p_lens - reference.p).magnitude2();
                let cam_forward = camera_to_world.transform(Vec3f::new(0.0, 0.0, 1.0)).normalize();
                let cos_theta = wi.dot(-cam_forward).abs();
                if cos_theta <= 0.0 {
                    return None;
                }
                let pdf = dist2 / cos_theta;

                // Project the reference point back through the camera to find which pixel this
                // connection lands on: world -> camera space -> screen (perspective divide) -> raster.
                let p_ref_camera = reference.p.transform(camera_to_world.inverse());
                let p_screen = p_ref_camera.transform(proj.camera_to_screen);
                let p_raster_3 = p_screen.transform(proj.screen_to_raster);
                if !p_raster_3.x.is_finite() || !p_raster_3.y.is_finite() {
                    return None;
                }
                let p_raster = Point2f::new(p_raster_3.x, p_raster_3.y);

                let point = SurfaceHit { p: p_lens, p_err: Vec3f::new(0.0, 0.0, 0.0), time: reference.time, n: crate::geometry::Normal3(cam_forward) };
                Some(CameraWiSample { wi, pdf, p_raster, point, we: crate::spectrum::Spectrum::new(1.0) })
            }
            _ => None,
        }
    }
}
