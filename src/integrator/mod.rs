//! The closed `Integrator` variant set and the render driver that ties camera, sampler, scene
//! and film together. The per-pixel driver in `render_unidirectional` below -- one `bumpalo::Bump`
//! per tile, `rayon`'s `into_par_iter` over `Bounds2i::iter_tiles`, `tile_sampler.start_pixel`/
//! `start_next_sample`, `camera.generate_ray_differential`, `film.add_sample_to_tile`, `indicatif`
//! progress -- is shared by every unidirectional variant (`Path`/`VolPath`/`NaivePath`/`Ao`/
//! `Albedo`/`Debug`/`RandomWalk`), dispatching only on `incident_radiance` per variant. Bidirectional,
//! photon and ReSTIR techniques don't fit that per-pixel driver shape at all, so each owns a
//! render entry point in its own submodule.

pub mod bdpt;
pub mod light_tracer;
pub mod photon;
pub mod restir;

use crate::allocator::TileArena;
use crate::camera::Camera;
use crate::film::Film;
use crate::filter::Filter;
use crate::interaction::SurfaceHit;
use crate::light::VisibilityTester;
use crate::light_sampler::LightSampler;
use crate::material::TransportMode;
use crate::medium::{HenyeyGreenstein, MediumId};
use crate::primitive::PrimitiveId;
use crate::progress::{Progress, Rendering};
use crate::reflection::bsdf::Bsdf;
use crate::reflection::BxDFType;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::scheduler::parallel_for_2d;
use crate::settings::{IntegratorKind, RenderSettings};
use crate::spectrum::Spectrum;
use crate::{Bounds2i, Float, Point2i, Point3f, Ray, RayDifferential, Vec3f};
use cgmath::InnerSpace;
use rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

/// What `Debug` visualizes: a bare geometric quantity at the first hit, with no lighting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugChannel {
    ShadingNormal,
    Uv,
    HitDistance,
}

/// The closed integrator variant set. Each carries exactly the tunables its algorithm needs out
/// of `RenderSettings`, resolved once at construction (`from_settings`) rather than threaded
/// through every call.
pub enum Integrator {
    Path { max_bounces: u32, rr_min_bounces: u32, regularize: bool, power_light_sampling: bool },
    VolPath { max_bounces: u32, rr_min_bounces: u32, regularize: bool, power_light_sampling: bool },
    NaivePath { max_bounces: u32 },
    NaiveVolPath { max_bounces: u32 },
    RandomWalk { max_bounces: u32 },
    Ao { max_distance: Float },
    Albedo,
    Debug { channel: DebugChannel },
    LightPath { max_bounces: u32 },
    LightVolPath { max_bounces: u32 },
    Bdpt { max_bounces: u32 },
    VolBdpt { max_bounces: u32 },
    PhotonMapping { n_photons: usize, max_bounces: u32, gather_radius: Float, gather_count: usize },
    VolPhotonMapping { n_photons: usize, max_bounces: u32, gather_radius: Float, gather_count: usize },
    Sppm { n_photons_per_iter: usize, n_iterations: usize, max_bounces: u32, initial_radius: Float },
    VolSppm { n_photons_per_iter: usize, n_iterations: usize, max_bounces: u32, initial_radius: Float },
    RestirDi { candidates: usize },
    RestirPt { candidates: usize, max_bounces: u32 },
}

impl Integrator {
    /// Builds an `Integrator` from the configuration struct, resolving the "auto" defaults
    /// (`initial_radius < 0`, `gather_radius`) against the scene's own scale.
    pub fn from_settings(settings: &RenderSettings, scene_radius: Float) -> Self {
        let auto_radius = if settings.initial_radius > 0.0 { settings.initial_radius } else { (scene_radius * 0.01).max(1e-3) };
        match settings.integrator {
            IntegratorKind::Path => Integrator::Path {
                max_bounces: settings.max_bounces,
                rr_min_bounces: settings.rr_min_bounces,
                regularize: settings.regularize_bsdf,
                power_light_sampling: true,
            },
            IntegratorKind::VolPath => Integrator::VolPath {
                max_bounces: settings.max_bounces,
                rr_min_bounces: settings.rr_min_bounces,
                regularize: settings.regularize_bsdf,
                power_light_sampling: true,
            },
            IntegratorKind::NaivePath => Integrator::NaivePath { max_bounces: settings.max_bounces },
            IntegratorKind::NaiveVolPath => Integrator::NaiveVolPath { max_bounces: settings.max_bounces },
            IntegratorKind::RandomWalk => Integrator::RandomWalk { max_bounces: settings.max_bounces },
            IntegratorKind::Ao => Integrator::Ao { max_distance: scene_radius.max(1.0) },
            IntegratorKind::Albedo => Integrator::Albedo,
            IntegratorKind::Debug => Integrator::Debug { channel: DebugChannel::ShadingNormal },
            IntegratorKind::LightPath => Integrator::LightPath { max_bounces: settings.max_bounces },
            IntegratorKind::LightVolPath => Integrator::LightVolPath { max_bounces: settings.max_bounces },
            IntegratorKind::Bdpt => Integrator::Bdpt { max_bounces: settings.max_bounces },
            IntegratorKind::VolBdpt => Integrator::VolBdpt { max_bounces: settings.max_bounces },
            IntegratorKind::PhotonMapping => {
                Integrator::PhotonMapping { n_photons: settings.n_photons, max_bounces: settings.max_bounces, gather_radius: auto_radius, gather_count: 50 }
            }
            IntegratorKind::VolPhotonMapping => {
                Integrator::VolPhotonMapping { n_photons: settings.n_photons, max_bounces: settings.max_bounces, gather_radius: auto_radius, gather_count: 50 }
            }
            IntegratorKind::Sppm => Integrator::Sppm {
                n_photons_per_iter: settings.n_photons,
                n_iterations: settings.spp,
                max_bounces: settings.max_bounces,
                initial_radius: auto_radius,
            },
            IntegratorKind::VolSppm => Integrator::VolSppm {
                n_photons_per_iter: settings.n_photons,
                n_iterations: settings.spp,
                max_bounces: settings.max_bounces,
                initial_radius: auto_radius,
            },
            IntegratorKind::RestirDi => Integrator::RestirDi { candidates: 32 },
            IntegratorKind::RestirPt => Integrator::RestirPt { candidates: 32, max_bounces: settings.max_bounces },
        }
    }

    fn light_sampler(&self, scene: &Scene) -> LightSampler {
        let power = matches!(
            self,
            Integrator::Path { power_light_sampling: true, .. } | Integrator::VolPath { power_light_sampling: true, .. }
        );
        if power {
            LightSampler::power(&scene.lights)
        } else {
            LightSampler::uniform(scene.lights.len())
        }
    }

    /// Renders `scene` through `camera` at `resolution`, blocking until every tile (or, for the
    /// bidirectional/photon/ReSTIR families, every work unit) has been processed. The returned
    /// `Rendering` is already complete; it's still handed back as the C13 handle so callers that
    /// drive rendering from a worker thread of their own can poll `is_done`/`log_progress`
    /// uniformly regardless of which integrator produced it.
    pub fn render(&self, scene: &Scene, camera: &Camera, sampler_prototype: &Sampler, resolution: Point2i, filter: Filter, settings: &RenderSettings) -> Rendering {
        match self {
            Integrator::Path { .. }
            | Integrator::VolPath { .. }
            | Integrator::NaivePath { .. }
            | Integrator::NaiveVolPath { .. }
            | Integrator::RandomWalk { .. }
            | Integrator::Ao { .. }
            | Integrator::Albedo
            | Integrator::Debug { .. } => self.render_unidirectional(scene, camera, sampler_prototype, resolution, filter, settings.tile_size, settings.seed),
            Integrator::LightPath { max_bounces } | Integrator::LightVolPath { max_bounces } => {
                let volumetric = matches!(self, Integrator::LightVolPath { .. });
                light_tracer::render(scene, camera, sampler_prototype, resolution, filter, settings, *max_bounces, volumetric)
            }
            Integrator::Bdpt { max_bounces } | Integrator::VolBdpt { max_bounces } => {
                let volumetric = matches!(self, Integrator::VolBdpt { .. });
                bdpt::render(scene, camera, sampler_prototype, resolution, filter, settings, *max_bounces, volumetric)
            }
            Integrator::PhotonMapping { n_photons, max_bounces, gather_radius, gather_count }
            | Integrator::VolPhotonMapping { n_photons, max_bounces, gather_radius, gather_count } => {
                let volumetric = matches!(self, Integrator::VolPhotonMapping { .. });
                photon::render_photon_mapping(scene, camera, sampler_prototype, resolution, filter, settings, *n_photons, *max_bounces, *gather_radius, *gather_count, volumetric)
            }
            Integrator::Sppm { n_photons_per_iter, n_iterations, max_bounces, initial_radius }
            | Integrator::VolSppm { n_photons_per_iter, n_iterations, max_bounces, initial_radius } => {
                let volumetric = matches!(self, Integrator::VolSppm { .. });
                photon::render_sppm(scene, camera, sampler_prototype, resolution, filter, settings, *n_photons_per_iter, *n_iterations, *max_bounces, *initial_radius, volumetric)
            }
            Integrator::RestirDi { candidates } => restir::render_di(scene, camera, sampler_prototype, resolution, filter, settings, *candidates),
            Integrator::RestirPt { candidates, max_bounces } => restir::render_pt(scene, camera, sampler_prototype, resolution, filter, settings, *candidates, *max_bounces),
        }
    }

    /// The shared per-pixel driver for every integrator that estimates `L` independently at each
    /// film sample (everything except the light-tracing/bidirectional/photon/ReSTIR families).
    fn render_unidirectional(&self, scene: &Scene, camera: &Camera, sampler_prototype: &Sampler, resolution: Point2i, filter: Filter, tile_size: i32, seed: u64) -> Rendering {
        let film = Film::new(resolution, filter);
        let bounds = Bounds2i::with_bounds(Point2i::new(0, 0), resolution);
        let n_tiles = bounds.iter_tiles(tile_size.max(1) as usize).count() as u64;
        let rendering = Rendering::new(film, Progress::single_phase(n_tiles));
        let light_sampler = self.light_sampler(scene);
        let spp = sampler_prototype.samples_per_pixel();

        parallel_for_2d(bounds, tile_size, |tile_bounds, tile_id| {
            let mut arena = TileArena::new();
            let mut sampler = sampler_prototype.clone_with_seed(seed ^ tile_id.wrapping_mul(0x9E3779B97F4A7C15));
            let mut film_tile = rendering.film.get_film_tile(tile_bounds);

            for (x, y) in tile_bounds.iter_points() {
                let pixel = Point2i::new(x, y);
                sampler.start_pixel(pixel);
                while sampler.start_next_sample() {
                    let camera_sample = sampler.get_camera_sample(pixel);
                    let (ray_weight, mut ray) = camera.generate_ray_differential(camera_sample);
                    ray.scale_differentials(1.0 / (spp.max(1) as Float).sqrt());

                    let l = if ray_weight > 0.0 {
                        self.li(ray, scene, &mut sampler, &arena, &light_sampler) * ray_weight
                    } else {
                        Spectrum::BLACK
                    };
                    Film::add_sample_to_tile(&mut film_tile, pixel, l);
                    arena.reset();
                }
            }

            rendering.film.merge_tile(film_tile);
            rendering.inc(0, 1);
        });

        rendering
    }

    /// Estimates the radiance arriving at the camera along `ray`. Dispatches to each integrator
    /// family's walk; the bidirectional/photon/light-tracing/ReSTIR variants never reach this
    /// method (they're intercepted in `render` above).
    fn li(&self, ray: RayDifferential, scene: &Scene, sampler: &mut Sampler, arena: &TileArena, light_sampler: &LightSampler) -> Spectrum {
        match self {
            Integrator::Path { max_bounces, rr_min_bounces, regularize, .. } => {
                li_path(ray, scene, sampler, arena, light_sampler, *max_bounces, *rr_min_bounces, *regularize, false)
            }
            Integrator::VolPath { max_bounces, rr_min_bounces, regularize, .. } => {
                li_path(ray, scene, sampler, arena, light_sampler, *max_bounces, *rr_min_bounces, *regularize, true)
            }
            Integrator::NaivePath { max_bounces } => li_naive(ray, scene, sampler, arena, *max_bounces, false),
            Integrator::NaiveVolPath { max_bounces } => li_naive(ray, scene, sampler, arena, *max_bounces, true),
            Integrator::RandomWalk { max_bounces } => li_naive(ray, scene, sampler, arena, *max_bounces, false),
            Integrator::Ao { max_distance } => li_ao(&ray, scene, sampler, *max_distance),
            Integrator::Albedo => li_albedo(&ray, scene, sampler, arena),
            Integrator::Debug { channel } => li_debug(&ray, scene, *channel),
            _ => unreachable!("handled by a dedicated render entry point"),
        }
    }
}

/// The medium the ray continues into after crossing a surface, following the outward/inward
/// normal convention of `MediumInterface`: `dir` exiting through the geometric-normal side sees
/// `outside`, the other side sees `inside`.
pub(crate) fn medium_for_direction(scene: &Scene, primitive: Option<PrimitiveId>, dir: Vec3f, n: Vec3f) -> Option<MediumId> {
    let prim = scene.primitive(primitive?);
    if dir.dot(n) > 0.0 {
        prim.medium_interface.outside
    } else {
        prim.medium_interface.inside
    }
}

/// `beta * eta_scale` above 1 always survives; below that, survives with probability
/// proportional to its own value (and is rescaled to stay unbiased), the standard Russian-roulette
/// termination once a path is past `rr_min_bounces`.
pub(crate) fn russian_roulette(beta: Spectrum, eta_scale: Float, bounces: u32, rr_min_bounces: u32, sampler: &mut Sampler) -> Option<Spectrum> {
    let rr_beta = (beta * eta_scale).max_component();
    if rr_beta < 1.0 && bounces > rr_min_bounces {
        let q = (1.0 - rr_beta).max(0.05);
        if sampler.get_1d() < q {
            None
        } else {
            Some(beta / (1.0 - q))
        }
    } else {
        Some(beta)
    }
}

/// Next-event estimation against a BSDF vertex, power-heuristic MIS-weighted against BSDF
/// sampling. When `medium` is `Some`, the shadow ray's transmittance through that medium is
/// ratio-tracked via `VisibilityTester::transmittance` rather than just tested for geometric
/// occlusion; this assumes the shadow ray stays in a single medium along its whole length (no
/// chained medium-interface crossings between `hit` and the light, the same single-current-medium
/// scope `Ray::medium` already carries for camera/scatter rays).
pub(crate) fn sample_ld_surface(scene: &Scene, hit: &SurfaceHit, wo: Vec3f, shading_n: Vec3f, bsdf: &Bsdf, sampler: &mut Sampler, light_sampler: &LightSampler, medium: Option<MediumId>) -> Spectrum {
    let Some(sampled) = light_sampler.sample(sampler.get_1d()) else { return Spectrum::BLACK };
    let light = scene.light(sampled.light);
    let Some(ls) = light.sample_li(hit, sampler.get_2d(), scene) else { return Spectrum::BLACK };
    if ls.pdf <= 0.0 || ls.li.is_black() {
        return Spectrum::BLACK;
    }
    let f = bsdf.f(wo, ls.wi, BxDFType::all()) * ls.wi.dot(shading_n).abs();
    if f.is_black() {
        return Spectrum::BLACK;
    }
    let vis = VisibilityTester { p0: *hit, p1: ls.point };
    let Some(tr) = vis.transmittance(scene, medium, sampler) else { return Spectrum::BLACK };
    let light_pdf = sampled.pmf * ls.pdf;
    if light.is_delta_light() {
        f * ls.li * tr / light_pdf
    } else {
        let scattering_pdf = bsdf.pdf(wo, ls.wi, BxDFType::all());
        let weight = crate::math::power_heuristic(1.0, light_pdf, 1.0, scattering_pdf);
        f * ls.li * tr * weight / light_pdf
    }
}

/// Next-event estimation against a phase-function vertex inside a medium; the Henyey-Greenstein
/// lobe is its own pdf, so the "scattering pdf" side of the MIS weight is just `p`. `medium` is
/// the medium the shadow ray starts in (almost always `Some`, since this is only called from
/// inside a medium scatter event), ratio-tracked the same way as `sample_ld_surface`.
pub(crate) fn sample_ld_medium(scene: &Scene, hit: &SurfaceHit, wo: Vec3f, phase: &HenyeyGreenstein, sampler: &mut Sampler, light_sampler: &LightSampler, medium: Option<MediumId>) -> Spectrum {
    let Some(sampled) = light_sampler.sample(sampler.get_1d()) else { return Spectrum::BLACK };
    let light = scene.light(sampled.light);
    let Some(ls) = light.sample_li(hit, sampler.get_2d(), scene) else { return Spectrum::BLACK };
    if ls.pdf <= 0.0 || ls.li.is_black() {
        return Spectrum::BLACK;
    }
    let p = phase.p(wo, ls.wi);
    if p <= 0.0 {
        return Spectrum::BLACK;
    }
    let vis = VisibilityTester { p0: *hit, p1: ls.point };
    let Some(tr) = vis.transmittance(scene, medium, sampler) else { return Spectrum::BLACK };
    let light_pdf = sampled.pmf * ls.pdf;
    if light.is_delta_light() {
        ls.li * p * tr / light_pdf
    } else {
        let weight = crate::math::power_heuristic(1.0, light_pdf, 1.0, p);
        ls.li * p * tr * weight / light_pdf
    }
}

/// The outcome of marching a ray through one medium's majorant segments via delta tracking.
pub(crate) enum MediumOutcome {
    /// A real scattering event at `p`, with the local phase function.
    Scatter(Point3f, HenyeyGreenstein),
    /// A real absorption event; the path terminates here (any emission already folded into `l`).
    Absorbed,
    /// No real interaction before `t_max`; the ray reaches the surface hit (or escapes to
    /// infinity) unattenuated in expectation.
    Escaped,
}

/// Delta-tracking (Woodcock) free-flight sampling through `medium_id`'s majorant segments up to
/// `t_max`, using the majorant's luminance as a single scalar channel rather than full per-channel
/// ratio-tracking MIS rails -- `Spectrum` here is an RGB tristimulus value rather than a
/// hero-wavelength spectral sample, so there's no extra spectral dimension for those rails to
/// resolve; ordinary luminance-weighted delta tracking is unbiased and matches the coefficients
/// this crate already models. Emission (`MediumSample::le`) is folded in at each candidate
/// collision, weighted by the local absorption probability, the standard "emission via absorption"
/// coupling.
pub(crate) fn sample_medium_interaction(scene: &Scene, medium_id: MediumId, ray: &Ray, t_max: Float, rng: &mut Xoshiro256Plus, l: &mut Spectrum, beta: &Spectrum) -> MediumOutcome {
    let medium = &scene.media[medium_id.0];
    let segments = medium.majorant_segments(ray, t_max);
    for seg in segments {
        let sigma_maj = seg.sigma_maj.luminance().max(1e-8);
        let mut t = seg.t_min;
        loop {
            let dt = -(1.0 - rng.gen::<Float>()).ln() / sigma_maj;
            t += dt;
            if t >= seg.t_max {
                break;
            }
            let p = ray.at(t);
            let sample = medium.sample_point(p);
            let pa = (sample.sigma_a.luminance() / sigma_maj).clamp(0.0, 1.0);
            if !sample.le.is_black() {
                *l += *beta * sample.le * pa;
            }
            let ps = (sample.sigma_s.luminance() / sigma_maj).clamp(0.0, 1.0 - pa);
            let xi: Float = rng.gen();
            if xi < pa {
                return MediumOutcome::Absorbed;
            } else if xi < pa + ps {
                return MediumOutcome::Scatter(p, sample.phase);
            }
        }
    }
    MediumOutcome::Escaped
}

/// The MIS-weighted surface-only path tracer (`path`). `volumetric` interleaves a delta-tracking
/// medium march between each surface bounce (`vol_path`) using the ray's `medium` field rather
/// than tracking a separate medium stack, since every primitive's `MediumInterface` only ever
/// differs at a transition boundary.
pub(crate) fn li_path(
    mut ray: RayDifferential,
    scene: &Scene,
    sampler: &mut Sampler,
    arena: &TileArena,
    light_sampler: &LightSampler,
    max_bounces: u32,
    rr_min_bounces: u32,
    regularize: bool,
    volumetric: bool,
) -> Spectrum {
    let mut l = Spectrum::BLACK;
    let mut beta = Spectrum::new(1.0);
    let mut specular_bounce = true;
    let mut any_non_specular_bounce = false;
    let mut prev_bsdf_pdf: Float = 1.0;
    let mut prev_hit: Option<SurfaceHit> = None;
    let mut eta_scale: Float = 1.0;
    let mut bounces: u32 = 0;
    let mut passthroughs: u32 = 0;

    loop {
        if volumetric {
            if let Some(medium_id) = ray.ray.medium {
                let t_hit = scene.intersect(&ray.ray).map(|(t, _)| t).unwrap_or(crate::math::INFINITY);
                match sample_medium_interaction(scene, medium_id, &ray.ray, t_hit, sampler.rng(), &mut l, &beta) {
                    MediumOutcome::Scatter(p, phase) => {
                        if bounces >= max_bounces {
                            break;
                        }
                        let wo = -ray.ray.dir;
                        let hit = SurfaceHit { p, p_err: Vec3f::new(0.0, 0.0, 0.0), time: ray.ray.time, n: crate::geometry::Normal3::zero() };
                        l += beta * sample_ld_medium(scene, &hit, wo, &phase, sampler, light_sampler, Some(medium_id));
                        let (wi, pdf) = phase.sample_p(wo, sampler.get_2d());
                        prev_hit = Some(hit);
                        prev_bsdf_pdf = pdf;
                        specular_bounce = false;
                        any_non_specular_bounce = true;
                        ray = RayDifferential::new(Ray::with_medium(p, wi, Some(medium_id)));
                        bounces += 1;
                        match russian_roulette(beta, eta_scale, bounces, rr_min_bounces, sampler) {
                            Some(new_beta) => beta = new_beta,
                            None => break,
                        }
                        continue;
                    }
                    MediumOutcome::Absorbed => break,
                    MediumOutcome::Escaped => {}
                }
            }
        }

        let isect = scene.intersect(&ray.ray);

        if isect.is_none() {
            for &light_id in &scene.infinite_lights {
                let light = scene.light(light_id);
                if specular_bounce || bounces == 0 {
                    l += beta * light.le(&ray);
                } else if let Some(hit) = &prev_hit {
                    let light_pdf = light_sampler.evaluate_pmf(light_id) * light.pdf_li(hit, ray.ray.dir, scene);
                    let weight = crate::math::power_heuristic(1.0, prev_bsdf_pdf, 1.0, light_pdf);
                    l += beta * weight * light.le(&ray);
                }
            }
            break;
        }

        let (_t, mut si) = isect.unwrap();

        if let Some(prim_id) = si.primitive {
            let prim = scene.primitive(prim_id);
            if let Some(light_id) = prim.area_light {
                let light = scene.light(light_id);
                let le = light.emitted_radiance(si.n().0, si.wo);
                if !le.is_black() {
                    if specular_bounce || bounces == 0 {
                        l += beta * le;
                    } else if let Some(hit) = &prev_hit {
                        let light_pdf = light_sampler.evaluate_pmf(light_id) * light.pdf_li(hit, ray.ray.dir, scene);
                        let weight = crate::math::power_heuristic(1.0, prev_bsdf_pdf, 1.0, light_pdf);
                        l += beta * weight * le;
                    }
                }
            }
        }

        if bounces >= max_bounces {
            break;
        }

        let bsdf = si.compute_scattering_functions(&ray, scene, arena.bump(), true, TransportMode::Radiance);
        let mut bsdf = match bsdf {
            Some(b) => b,
            None => {
                // No material: a pass-through primitive (an alpha-cutout stand-in, or an
                // area-light-only shell). Advance past it without spending a bounce.
                passthroughs += 1;
                if passthroughs > 32 {
                    break;
                }
                let medium = medium_for_direction(scene, si.primitive, ray.ray.dir, si.n().0);
                let diff = ray.diff;
                ray = si.spawn_ray_with_differentials(ray.ray.dir, diff);
                ray.ray.medium = medium;
                continue;
            }
        };

        if regularize && any_non_specular_bounce {
            bsdf.regularize();
        }

        if bsdf.num_components(BxDFType::all() & !BxDFType::SPECULAR) > 0 {
            let medium = if volumetric { ray.ray.medium } else { None };
            l += beta * sample_ld_surface(scene, &si.hit, si.wo, si.shading_n.0, &bsdf, sampler, light_sampler, medium);
        }

        let u_comp = sampler.get_1d();
        let u = sampler.get_2d();
        let scatter = bsdf.sample_f(si.wo, u_comp, u, BxDFType::all());
        let scatter = match scatter {
            Some(s) if s.pdf > 0.0 && !s.f.is_black() => s,
            _ => break,
        };

        beta *= scatter.f * scatter.wi.dot(si.shading_n.0).abs() / scatter.pdf;
        specular_bounce = scatter.sampled_type.contains(BxDFType::SPECULAR);
        if !specular_bounce {
            any_non_specular_bounce = true;
        }
        prev_bsdf_pdf = scatter.pdf;
        if scatter.sampled_type.contains(BxDFType::TRANSMISSION) {
            eta_scale *= bsdf.eta * bsdf.eta;
        }
        prev_hit = Some(si.hit);

        let medium = medium_for_direction(scene, si.primitive, scatter.wi, si.n().0);
        let diff = ray.diff;
        ray = si.spawn_ray_with_differentials(scatter.wi, diff);
        ray.ray.medium = medium;
        bounces += 1;

        match russian_roulette(beta, eta_scale, bounces, rr_min_bounces, sampler) {
            Some(new_beta) => beta = new_beta,
            None => break,
        }
    }

    l
}

/// A BSDF-sampling-only walk with no next-event estimation and no MIS weighting: every emitter
/// contributes at full weight whenever the path happens to hit it by chance. High variance, but
/// useful as a ground-truth reference for `Path`/`VolPath` (`naive_path`/`naive_vol_path`, and
/// `random_walk`, which shares the same surface-only walk).
fn li_naive(mut ray: RayDifferential, scene: &Scene, sampler: &mut Sampler, arena: &TileArena, max_bounces: u32, volumetric: bool) -> Spectrum {
    let mut l = Spectrum::BLACK;
    let mut beta = Spectrum::new(1.0);
    let mut bounces: u32 = 0;
    let mut passthroughs: u32 = 0;

    loop {
        if volumetric {
            if let Some(medium_id) = ray.ray.medium {
                let t_hit = scene.intersect(&ray.ray).map(|(t, _)| t).unwrap_or(crate::math::INFINITY);
                match sample_medium_interaction(scene, medium_id, &ray.ray, t_hit, sampler.rng(), &mut l, &beta) {
                    MediumOutcome::Scatter(p, phase) => {
                        if bounces >= max_bounces {
                            break;
                        }
                        let (wi, _pdf) = phase.sample_p(-ray.ray.dir, sampler.get_2d());
                        ray = RayDifferential::new(Ray::with_medium(p, wi, Some(medium_id)));
                        bounces += 1;
                        continue;
                    }
                    MediumOutcome::Absorbed => break,
                    MediumOutcome::Escaped => {}
                }
            }
        }

        let isect = scene.intersect(&ray.ray);
        let Some((_t, mut si)) = isect else {
            for &light_id in &scene.infinite_lights {
                l += beta * scene.light(light_id).le(&ray);
            }
            break;
        };

        if let Some(prim_id) = si.primitive {
            if let Some(light_id) = scene.primitive(prim_id).area_light {
                l += beta * scene.light(light_id).emitted_radiance(si.n().0, si.wo);
            }
        }

        if bounces >= max_bounces {
            break;
        }

        let bsdf = si.compute_scattering_functions(&ray, scene, arena.bump(), true, TransportMode::Radiance);
        let bsdf = match bsdf {
            Some(b) => b,
            None => {
                passthroughs += 1;
                if passthroughs > 32 {
                    break;
                }
                let medium = medium_for_direction(scene, si.primitive, ray.ray.dir, si.n().0);
                let diff = ray.diff;
                ray = si.spawn_ray_with_differentials(ray.ray.dir, diff);
                ray.ray.medium = medium;
                continue;
            }
        };

        let u_comp = sampler.get_1d();
        let u = sampler.get_2d();
        let scatter = match bsdf.sample_f(si.wo, u_comp, u, BxDFType::all()) {
            Some(s) if s.pdf > 0.0 && !s.f.is_black() => s,
            _ => break,
        };

        beta *= scatter.f * scatter.wi.dot(si.shading_n.0).abs() / scatter.pdf;
        let medium = medium_for_direction(scene, si.primitive, scatter.wi, si.n().0);
        let diff = ray.diff;
        ray = si.spawn_ray_with_differentials(scatter.wi, diff);
        ray.ray.medium = medium;
        bounces += 1;

        let m = beta.max_component();
        if m < 0.05 {
            if sampler.get_1d() > m {
                break;
            }
            beta /= m.max(1e-6);
        }
    }

    l
}

/// Ambient occlusion (`ao`): one cosine-weighted hemisphere sample per shading point, returning
/// white if nothing is hit within `max_distance` and black otherwise.
fn li_ao(ray: &RayDifferential, scene: &Scene, sampler: &mut Sampler, max_distance: Float) -> Spectrum {
    let Some((_t, si)) = scene.intersect(&ray.ray) else {
        return Spectrum::BLACK;
    };
    let n = crate::math::faceforward(si.n().0, -ray.ray.dir);
    let (ss, ts) = crate::math::coordinate_system(n);
    let local = crate::sampling::cosine_sample_hemisphere(sampler.get_2d());
    let wi = (ss * local.x + ts * local.y + n * local.z).normalize();
    let mut shadow = si.hit.spawn_ray(wi);
    shadow.t_max = max_distance;
    if scene.intersect_test(&shadow) {
        Spectrum::BLACK
    } else {
        Spectrum::new(1.0)
    }
}

/// A crude Monte-Carlo estimate of the first-hit BSDF's directional-hemispherical reflectance,
/// averaging a handful of BSDF samples rather than a closed-form integral (`albedo`, meant as a
/// cheap per-pixel material-color preview rather than a ground-truth AOV).
fn li_albedo(ray: &RayDifferential, scene: &Scene, sampler: &mut Sampler, arena: &TileArena) -> Spectrum {
    let Some((_t, mut si)) = scene.intersect(&ray.ray) else {
        return Spectrum::BLACK;
    };
    let Some(bsdf) = si.compute_scattering_functions(ray, scene, arena.bump(), true, TransportMode::Radiance) else {
        return Spectrum::BLACK;
    };
    const N: usize = 8;
    let mut sum = Spectrum::BLACK;
    let mut count = 0u32;
    for _ in 0..N {
        let u_comp = sampler.get_1d();
        let u = sampler.get_2d();
        if let Some(s) = bsdf.sample_f(si.wo, u_comp, u, BxDFType::all()) {
            if s.pdf > 0.0 {
                sum += s.f * s.wi.dot(si.shading_n.0).abs() / s.pdf;
                count += 1;
            }
        }
    }
    if count == 0 {
        Spectrum::BLACK
    } else {
        sum / count as Float
    }
}

/// Visualizes a bare geometric quantity at the first hit with no lighting at all (`debug`).
fn li_debug(ray: &RayDifferential, scene: &Scene, channel: DebugChannel) -> Spectrum {
    match scene.intersect(&ray.ray) {
        None => Spectrum::BLACK,
        Some((t, si)) => match channel {
            DebugChannel::ShadingNormal => {
                let n = si.shading_n.0;
                Spectrum::rgb(n.x * 0.5 + 0.5, n.y * 0.5 + 0.5, n.z * 0.5 + 0.5)
            }
            DebugChannel::Uv => Spectrum::rgb(si.uv.x, si.uv.y, 0.0),
            DebugChannel::HitDistance => Spectrum::new(t),
        },
    }
}
