//! Light tracing: paths start at a light and walk towards the scene, connecting every vertex to
//! the camera and splatting the result directly onto the film (`light_path`/`light_vol_path`).
//! Follows the same "sample a light, walk a path, connect" shape `Light::sample_le`/
//! `Camera::sample_wi` already expose, and reuses `scheduler::parallel_for` for the per-path
//! fan-out the way `render_unidirectional` uses `parallel_for_2d` for per-tile fan-out.

use super::{medium_for_direction, sample_medium_interaction, MediumOutcome};
use crate::allocator::TileArena;
use crate::camera::Camera;
use crate::film::Film;
use crate::filter::Filter;
use crate::interaction::SurfaceHit;
use crate::light::VisibilityTester;
use crate::light_sampler::LightSampler;
use crate::material::TransportMode;
use crate::medium::MediumId;
use crate::progress::{Progress, Rendering};
use crate::reflection::BxDFType;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::scheduler::parallel_for;
use crate::settings::RenderSettings;
use crate::spectrum::Spectrum;
use crate::{Point2i, Ray, RayDifferential};
use cgmath::InnerSpace;

pub fn render(scene: &Scene, camera: &Camera, sampler_prototype: &Sampler, resolution: Point2i, filter: Filter, settings: &RenderSettings, max_bounces: u32, volumetric: bool) -> Rendering {
    let film = Film::new(resolution, filter);
    let spp = sampler_prototype.samples_per_pixel().max(1);
    let n_pixels = (resolution.x as usize) * (resolution.y as usize);
    let n_paths = n_pixels * spp;
    let rendering = Rendering::new(film, Progress::single_phase(n_paths as u64 / 4096 + 1));
    let light_sampler = LightSampler::power(&scene.lights);

    parallel_for(n_paths, |path_idx| {
        if path_idx % 4096 == 0 {
            rendering.inc(0, 1);
        }
        let mut sampler = sampler_prototype.clone_with_seed(settings.seed ^ (path_idx as u64).wrapping_mul(0xD1B54A32D192ED03));
        let mut arena = TileArena::new();
        trace_light_path(scene, camera, &rendering, &light_sampler, &mut sampler, &arena, max_bounces, volumetric);
        arena.reset();
    });

    rendering.film.weight_splats(1.0 / n_paths as crate::Float);
    rendering
}

/// Connects a path vertex to the camera lens and splats the resulting contribution, sharing the
/// "sample `Camera::sample_wi`, test visibility, splat" shape between the phase-function and
/// BSDF vertex cases; `eval` computes the local scattering value towards the sampled camera
/// direction.
fn connect_to_camera(
    scene: &Scene,
    camera: &Camera,
    rendering: &Rendering,
    hit: &SurfaceHit,
    beta: Spectrum,
    sampler: &mut Sampler,
    medium: Option<MediumId>,
    eval: impl FnOnce(crate::Vec3f) -> Spectrum,
) {
    let Some(cs) = camera.sample_wi(hit, sampler.get_2d()) else { return };
    if cs.pdf <= 0.0 || cs.we.is_black() {
        return;
    }
    let vis = VisibilityTester { p0: *hit, p1: cs.point };
    let Some(tr) = vis.transmittance(scene, medium, sampler) else { return };
    let scattered = eval(cs.wi);
    if scattered.is_black() {
        return;
    }
    let contribution = beta * scattered * tr * cs.we / cs.pdf;
    if !contribution.is_black() {
        rendering.film.add_splat(cs.p_raster, contribution);
    }
}

fn trace_light_path(scene: &Scene, camera: &Camera, rendering: &Rendering, light_sampler: &LightSampler, sampler: &mut Sampler, arena: &TileArena, max_bounces: u32, volumetric: bool) {
    let Some(sampled) = light_sampler.sample(sampler.get_1d()) else { return };
    let light = scene.light(sampled.light);
    let Some(les) = light.sample_le(sampler.get_2d(), sampler.get_2d(), scene) else { return };
    if les.pdf_p <= 0.0 || les.pdf_w <= 0.0 || les.le.is_black() {
        return;
    }

    let mut beta = les.le * les.normal.dot(les.ray.dir).abs() / (sampled.pmf * les.pdf_p * les.pdf_w);
    let mut ray = RayDifferential::new(les.ray);
    let mut bounces: u32 = 0;
    let mut passthroughs: u32 = 0;

    loop {
        if beta.is_black() {
            break;
        }

        if volumetric {
            if let Some(medium_id) = ray.ray.medium {
                let t_hit = scene.intersect(&ray.ray).map(|(t, _)| t).unwrap_or(crate::math::INFINITY);
                let mut discard = Spectrum::BLACK;
                match sample_medium_interaction(scene, medium_id, &ray.ray, t_hit, sampler.rng(), &mut discard, &beta) {
                    MediumOutcome::Scatter(p, phase) => {
                        if bounces >= max_bounces {
                            break;
                        }
                        let wo = -ray.ray.dir;
                        let hit = SurfaceHit { p, p_err: crate::Vec3f::new(0.0, 0.0, 0.0), time: ray.ray.time, n: crate::geometry::Normal3::zero() };
                        connect_to_camera(scene, camera, rendering, &hit, beta, sampler, Some(medium_id), |wi_cam| Spectrum::new(phase.p(wo, wi_cam)));
                        let (wi, pdf) = phase.sample_p(wo, sampler.get_2d());
                        if pdf <= 0.0 {
                            break;
                        }
                        ray = RayDifferential::new(Ray::with_medium(p, wi, Some(medium_id)));
                        bounces += 1;
                        continue;
                    }
                    MediumOutcome::Absorbed => break,
                    MediumOutcome::Escaped => {}
                }
            }
        }

        let Some((_t, mut si)) = scene.intersect(&ray.ray) else { break };

        if bounces >= max_bounces {
            break;
        }

        let Some(bsdf) = si.compute_scattering_functions(&ray, scene, arena.bump(), true, TransportMode::Importance) else {
            passthroughs += 1;
            if passthroughs > 32 {
                break;
            }
            let medium = medium_for_direction(scene, si.primitive, ray.ray.dir, si.n().0);
            let diff = ray.diff;
            ray = si.spawn_ray_with_differentials(ray.ray.dir, diff);
            ray.ray.medium = medium;
            continue;
        };

        if bsdf.num_components(BxDFType::all()) > 0 {
            let shading_n = si.shading_n.0;
            let wo = si.wo;
            let medium = if volumetric { ray.ray.medium } else { None };
            connect_to_camera(scene, camera, rendering, &si.hit, beta, sampler, medium, |wi_cam| bsdf.f(wo, wi_cam, BxDFType::all()) * wi_cam.dot(shading_n).abs());
        }

        let u_comp = sampler.get_1d();
        let u = sampler.get_2d();
        let Some(scatter) = bsdf.sample_f(si.wo, u_comp, u, BxDFType::all()) else { break };
        if scatter.pdf <= 0.0 || scatter.f.is_black() {
            break;
        }

        beta *= scatter.f * scatter.wi.dot(si.shading_n.0).abs() / scatter.pdf;
        let medium = medium_for_direction(scene, si.primitive, scatter.wi, si.n().0);
        let diff = ray.diff;
        ray = si.spawn_ray_with_differentials(scatter.wi, diff);
        ray.ray.medium = medium;
        bounces += 1;

        let m = beta.max_component();
        if bounces > 3 && m < 1.0 {
            let q = (1.0 - m).max(0.05);
            if sampler.get_1d() < q {
                break;
            }
            beta /= 1.0 - q;
        }
    }
}
