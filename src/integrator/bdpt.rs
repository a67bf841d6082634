//! Bidirectional path tracing: a camera subpath and a light subpath are each built by ordinary
//! BSDF-sampling random walks, then every camera-vertex/light-vertex pair is connected and
//! weighted by the full Veach path-space MIS sum -- every other (s,t) split that could have
//! produced a path of the same length is folded into the weight, not just the two pdfs at the
//! connecting edge. `volumetric` threads the same delta-tracking medium march `li_path` uses
//! through both subpath walks.

use super::{medium_for_direction, sample_ld_surface, sample_medium_interaction, MediumOutcome};
use crate::medium::MediumId;
use crate::allocator::TileArena;
use crate::camera::Camera;
use crate::film::Film;
use crate::filter::Filter;
use crate::interaction::SurfaceHit;
use crate::light::{LightId, VisibilityTester};
use crate::light_sampler::LightSampler;
use crate::material::TransportMode;
use crate::progress::{Progress, Rendering};
use crate::reflection::bsdf::Bsdf;
use crate::reflection::BxDFType;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::scheduler::parallel_for_2d;
use crate::settings::RenderSettings;
use crate::spectrum::Spectrum;
use crate::{Bounds2i, Float, Point2i, Point3f, Ray, RayDifferential, Vec3f};
use cgmath::InnerSpace;
use std::cell::Cell;

const MAX_VERTICES: usize = 12;

/// One surface vertex of either subpath. Holds a `Bsdf<'a>` borrowed from the per-path arena
/// rather than re-deriving it at connection time, which keeps connections a cheap lookup instead
/// of a second ray-scene intersection.
struct Vertex<'a> {
    hit: SurfaceHit,
    wo: Vec3f,
    ns: Vec3f,
    beta: Spectrum,
    bsdf: Option<Bsdf<'a>>,
    delta: bool,
    /// The medium the vertex's incoming ray was travelling through, for shadow-ray transmittance
    /// on connections touching this vertex (`None` for a vertex reached through vacuum).
    medium: Option<MediumId>,
    /// Area-measure pdf of sampling this vertex, given the previous vertex on its subpath.
    pdf_fwd: Float,
    /// Area-measure pdf of sampling the *previous* vertex on this subpath, as seen walking the
    /// subpath backward from this one. Filled in as the forward walk proceeds (using the next
    /// vertex's BSDF evaluated in reverse), then temporarily overwritten at the two endpoints of
    /// a connection by `mis_weight`, which resets it before returning.
    pdf_rev: Cell<Float>,
}

/// Converts a solid-angle pdf at `from` into an area-measure pdf at `to`, following pbrt's
/// `Vertex::ConvertDensity`.
fn pdf_to_area(pdf_w: Float, from: Point3f, to: Point3f, to_n: Vec3f) -> Float {
    let d = to - from;
    let dist2 = d.dot(d);
    if dist2 < 1e-12 {
        return 0.0;
    }
    let w = d / dist2.sqrt();
    pdf_w * w.dot(to_n).abs() / dist2
}

fn remap0(f: Float) -> Float {
    if f != 0.0 {
        f
    } else {
        1.0
    }
}

/// The Veach path-space MIS weight for connecting `camera_vertices[ci]` to `light_vertices[li]`.
/// Temporarily overwrites the pdf_rev of the connection's two endpoints (and their immediate
/// subpath neighbors, whose reverse density also changes once this particular connection is the
/// one that "happened") with the densities this connection implies, sums the relative-density
/// ratio walking outward along both subpaths, then resets every overwritten pdf_rev before
/// returning -- so the next connection attempt sees each vertex's original random-walk density
/// again. `light_is_delta` feeds the light-subpath sum's treatment of its own origin vertex, for
/// which there is no stored `Vertex` (point/spot/infinite lights have no alternate area-sampling
/// strategy to weigh against).
fn mis_weight(camera_vertices: &[Vertex], light_vertices: &[Vertex], ci: usize, li: usize, pdf_c_solid: Float, pdf_l_solid: Float, wi_c: Vec3f, wi_l: Vec3f, light_is_delta: bool) -> Float {
    let cv = &camera_vertices[ci];
    let lv = &light_vertices[li];

    let pdf_l_rev_at_cv = pdf_to_area(pdf_l_solid, lv.hit.p, cv.hit.p, cv.ns);
    let pdf_c_rev_at_lv = pdf_to_area(pdf_c_solid, cv.hit.p, lv.hit.p, lv.ns);

    let saved_cv_rev = cv.pdf_rev.replace(pdf_l_rev_at_cv);
    let saved_lv_rev = lv.pdf_rev.replace(pdf_c_rev_at_lv);

    let saved_cv_prev_rev = if ci > 0 {
        let pdf_solid = cv.bsdf.as_ref().map(|b| b.pdf(wi_c, cv.wo, BxDFType::all())).unwrap_or(0.0);
        let new_rev = pdf_to_area(pdf_solid, cv.hit.p, camera_vertices[ci - 1].hit.p, camera_vertices[ci - 1].ns);
        Some(camera_vertices[ci - 1].pdf_rev.replace(new_rev))
    } else {
        None
    };
    let saved_lv_prev_rev = if li > 0 {
        let pdf_solid = lv.bsdf.as_ref().map(|b| b.pdf(wi_l, lv.wo, BxDFType::all())).unwrap_or(0.0);
        let new_rev = pdf_to_area(pdf_solid, lv.hit.p, light_vertices[li - 1].hit.p, light_vertices[li - 1].ns);
        Some(light_vertices[li - 1].pdf_rev.replace(new_rev))
    } else {
        None
    };

    let mut sum_ri = 0.0;
    let mut ri = 1.0;
    let mut i = ci;
    loop {
        ri *= remap0(camera_vertices[i].pdf_rev.get()) / remap0(camera_vertices[i].pdf_fwd);
        let delta_prev = if i > 0 { camera_vertices[i - 1].delta } else { false };
        if !camera_vertices[i].delta && !delta_prev {
            sum_ri += ri * ri;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    ri = 1.0;
    let mut j = li;
    loop {
        ri *= remap0(light_vertices[j].pdf_rev.get()) / remap0(light_vertices[j].pdf_fwd);
        let delta_prev = if j > 0 { light_vertices[j - 1].delta } else { light_is_delta };
        if !light_vertices[j].delta && !delta_prev {
            sum_ri += ri * ri;
        }
        if j == 0 {
            break;
        }
        j -= 1;
    }

    cv.pdf_rev.set(saved_cv_rev);
    lv.pdf_rev.set(saved_lv_rev);
    if let Some(v) = saved_cv_prev_rev {
        camera_vertices[ci - 1].pdf_rev.set(v);
    }
    if let Some(v) = saved_lv_prev_rev {
        light_vertices[li - 1].pdf_rev.set(v);
    }

    1.0 / (1.0 + sum_ri)
}

pub fn render(scene: &Scene, camera: &Camera, sampler_prototype: &Sampler, resolution: Point2i, filter: Filter, settings: &RenderSettings, max_bounces: u32, volumetric: bool) -> Rendering {
    let film = Film::new(resolution, filter);
    let bounds = Bounds2i::with_bounds(Point2i::new(0, 0), resolution);
    let n_tiles = bounds.iter_tiles(settings.tile_size.max(1) as usize).count() as u64;
    let rendering = Rendering::new(film, Progress::single_phase(n_tiles));
    let light_sampler = LightSampler::power(&scene.lights);
    let spp = sampler_prototype.samples_per_pixel();

    parallel_for_2d(bounds, settings.tile_size, |tile_bounds, tile_id| {
        let mut arena = TileArena::new();
        let mut sampler = sampler_prototype.clone_with_seed(settings.seed ^ tile_id.wrapping_mul(0x9E3779B97F4A7C15));
        let mut film_tile = rendering.film.get_film_tile(tile_bounds);

        for (x, y) in tile_bounds.iter_points() {
            let pixel = Point2i::new(x, y);
            sampler.start_pixel(pixel);
            while sampler.start_next_sample() {
                let camera_sample = sampler.get_camera_sample(pixel);
                let (ray_weight, mut ray) = camera.generate_ray_differential(camera_sample);
                ray.scale_differentials(1.0 / (spp.max(1) as crate::Float).sqrt());
                let l = if ray_weight > 0.0 {
                    connect_bdpt(&ray, camera, &rendering.film, scene, &mut sampler, &arena, &light_sampler, max_bounces, volumetric) * ray_weight
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

    // The t=1 strategy below splats light-subpath vertices to whichever pixel they happen to
    // land on rather than the one driving the current sample, so it shares the light tracer's
    // normalize-by-total-samples convention rather than the per-pixel mean the tile merge uses.
    let n_samples = (resolution.x as u64 * resolution.y as u64 * spp.max(1) as u64).max(1);
    rendering.film.weight_splats(1.0 / n_samples as crate::Float);

    rendering
}

fn medium_march(scene: &Scene, ray: &mut RayDifferential, beta: &mut Spectrum, l: &mut Spectrum, max_bounces: u32, bounces: &mut u32, sampler: &mut Sampler) -> bool {
    let Some(medium_id) = ray.ray.medium else { return true };
    let t_hit = scene.intersect(&ray.ray).map(|(t, _)| t).unwrap_or(crate::math::INFINITY);
    match sample_medium_interaction(scene, medium_id, &ray.ray, t_hit, sampler.rng(), l, beta) {
        MediumOutcome::Scatter(p, phase) => {
            if *bounces >= max_bounces {
                return false;
            }
            let wo = -ray.ray.dir;
            let (wi, pdf) = phase.sample_p(wo, sampler.get_2d());
            if pdf <= 0.0 {
                return false;
            }
            *ray = RayDifferential::new(Ray::with_medium(p, wi, Some(medium_id)));
            *bounces += 1;
            medium_march(scene, ray, beta, l, max_bounces, bounces, sampler)
        }
        MediumOutcome::Absorbed => false,
        MediumOutcome::Escaped => true,
    }
}

/// Walks a BSDF-sampling random walk, recording each real surface vertex along with the
/// area-measure pdfs the Veach MIS weight needs. `transport` picks `Radiance` for the camera
/// subpath and `Importance` for the light subpath, following pbrt's convention for which side of
/// a non-symmetric BSDF each subpath sees. `light_sampler` is `Some` only for the camera subpath,
/// where escaping to an infinite light or landing on an area light is itself a valid (MIS-weighted
/// against the alternative of next-event estimation having found the same light) path and is
/// folded into the returned radiance; the light subpath has no such direct contribution of its
/// own. `origin_p`/`initial_pdf_w` seed the first vertex's forward density: the camera ray
/// origin with an (approximated, pinhole) direction pdf of 1, or the sampled light-emission ray's
/// origin and direction pdf.
fn random_walk<'a>(
    scene: &Scene,
    mut ray: RayDifferential,
    mut beta: Spectrum,
    sampler: &mut Sampler,
    arena: &'a TileArena,
    max_bounces: u32,
    transport: TransportMode,
    volumetric: bool,
    light_sampler: Option<&LightSampler>,
    origin_p: Point3f,
    initial_pdf_w: Float,
) -> (Vec<Vertex<'a>>, Spectrum) {
    let mut vertices: Vec<Vertex<'a>> = Vec::with_capacity(MAX_VERTICES);
    let mut l = Spectrum::BLACK;
    let mut bounces = 0u32;
    let mut passthroughs = 0u32;
    let mut specular_bounce = true;
    let mut prev_hit: Option<SurfaceHit> = None;
    let mut prev_pdf: crate::Float = 1.0;
    let mut last_point = origin_p;
    let mut last_scatter_pdf = initial_pdf_w;

    while bounces < max_bounces && vertices.len() < MAX_VERTICES {
        if volumetric {
            let mut discard = Spectrum::BLACK;
            if !medium_march(scene, &mut ray, &mut beta, &mut discard, max_bounces, &mut bounces, sampler) {
                break;
            }
        }

        let Some((_t, mut si)) = scene.intersect(&ray.ray) else {
            if let Some(light_sampler) = light_sampler {
                for &light_id in &scene.infinite_lights {
                    let light = scene.light(light_id);
                    if specular_bounce || bounces == 0 {
                        l += beta * light.le(&ray);
                    } else if let Some(hit) = &prev_hit {
                        let light_pdf = light_sampler.evaluate_pmf(light_id) * light.pdf_li(hit, ray.ray.dir, scene);
                        let weight = crate::math::power_heuristic(1.0, prev_pdf, 1.0, light_pdf);
                        l += beta * weight * light.le(&ray);
                    }
                }
            }
            break;
        };

        if let Some(light_sampler) = light_sampler {
            if let Some(light_id) = si.primitive.and_then(|p| scene.primitive(p).area_light) {
                let light = scene.light(light_id);
                let le = light.emitted_radiance(si.n().0, si.wo);
                if !le.is_black() {
                    if specular_bounce || bounces == 0 {
                        l += beta * le;
                    } else if let Some(hit) = &prev_hit {
                        let light_pdf = light_sampler.evaluate_pmf(light_id) * light.pdf_li(hit, ray.ray.dir, scene);
                        let weight = crate::math::power_heuristic(1.0, prev_pdf, 1.0, light_pdf);
                        l += beta * weight * le;
                    }
                }
            }
        }

        let Some(bsdf) = si.compute_scattering_functions(&ray, scene, arena.bump(), true, transport) else {
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

        let u_comp = sampler.get_1d();
        let u = sampler.get_2d();
        let scatter = bsdf.sample_f(si.wo, u_comp, u, BxDFType::all());

        let delta = scatter.as_ref().map(|s| s.sampled_type.contains(BxDFType::SPECULAR)).unwrap_or(false);
        let pdf_fwd = pdf_to_area(last_scatter_pdf, last_point, si.hit.p, si.shading_n.0);
        vertices.push(Vertex {
            hit: si.hit,
            wo: si.wo,
            ns: si.shading_n.0,
            beta,
            bsdf: Some(bsdf),
            delta,
            medium: ray.ray.medium,
            pdf_fwd,
            pdf_rev: Cell::new(0.0),
        });

        let Some(scatter) = scatter else { break };
        if scatter.pdf <= 0.0 || scatter.f.is_black() {
            break;
        }

        // The reverse density of the vertex we just left, as seen walking this subpath
        // backward from the vertex we just created.
        if vertices.len() >= 2 {
            let new_vertex = &vertices[vertices.len() - 1];
            let reverse_pdf = new_vertex.bsdf.as_ref().map(|b| b.pdf(scatter.wi, new_vertex.wo, BxDFType::all())).unwrap_or(0.0);
            let prev = &vertices[vertices.len() - 2];
            let area_rev = pdf_to_area(reverse_pdf, new_vertex.hit.p, prev.hit.p, prev.ns);
            prev.pdf_rev.set(area_rev);
        }

        beta = beta * scatter.f * scatter.wi.dot(si.shading_n.0).abs() / scatter.pdf;
        if beta.is_black() {
            break;
        }

        specular_bounce = delta;
        prev_pdf = scatter.pdf;
        prev_hit = Some(si.hit);
        last_point = si.hit.p;
        last_scatter_pdf = scatter.pdf;

        let medium = medium_for_direction(scene, si.primitive, scatter.wi, si.n().0);
        let diff = ray.diff;
        ray = si.spawn_ray_with_differentials(scatter.wi, diff);
        ray.ray.medium = medium;
        bounces += 1;
    }

    (vertices, l)
}

/// Renders one camera ray's bidirectional estimate: the camera subpath's direct hits on
/// emitters, its own next-event-estimation contribution, every general vertex-vertex connection
/// between the camera subpath and a freshly sampled light subpath (the `s,t >= 2` strategies,
/// weighted by the full path-space MIS sum computed by `mis_weight`), and the `t=1` strategy
/// connecting each light-subpath vertex straight to a freshly sampled camera lens point. That
/// last strategy lands on whichever pixel the connection projects to, not necessarily this one,
/// so it splats directly into the shared film rather than returning through this function's
/// per-pixel radiance.
fn connect_bdpt(camera_ray: &RayDifferential, camera: &Camera, film: &Film, scene: &Scene, sampler: &mut Sampler, arena: &TileArena, light_sampler: &LightSampler, max_bounces: u32, volumetric: bool) -> Spectrum {
    let (camera_vertices, mut l) = random_walk(scene, *camera_ray, Spectrum::new(1.0), sampler, arena, max_bounces, TransportMode::Radiance, volumetric, Some(light_sampler), camera_ray.ray.origin, 1.0);

    // t-side next-event estimation at every camera vertex.
    for v in &camera_vertices {
        if let Some(bsdf) = &v.bsdf {
            if bsdf.num_components(BxDFType::all() & !BxDFType::SPECULAR) > 0 {
                l += v.beta * sample_ld_surface(scene, &v.hit, v.wo, v.ns, bsdf, sampler, light_sampler, v.medium);
            }
        }
    }

    if camera_vertices.is_empty() {
        return l;
    }

    let Some(sampled) = light_sampler.sample(sampler.get_1d()) else { return l };
    let light = scene.light(sampled.light);
    let light_is_delta = light.is_delta_light();
    let Some(les) = light.sample_le(sampler.get_2d(), sampler.get_2d(), scene) else { return l };
    if les.pdf_p <= 0.0 || les.pdf_w <= 0.0 || les.le.is_black() {
        return l;
    }
    let light_beta = les.le * les.normal.dot(les.ray.dir).abs() / (sampled.pmf * les.pdf_p * les.pdf_w);
    let (light_vertices, _) = random_walk(scene, RayDifferential::new(les.ray), light_beta, sampler, arena, max_bounces, TransportMode::Importance, volumetric, None, les.ray.origin, les.pdf_w);

    // t=1: connect every non-specular light-subpath vertex straight to a freshly sampled point
    // on the camera lens and splat the result to wherever it lands on the film.
    for lv in &light_vertices {
        let Some(lbsdf) = &lv.bsdf else { continue };
        if lv.delta {
            continue;
        }
        let Some(cs) = camera.sample_wi(&lv.hit, sampler.get_2d()) else { continue };
        if cs.pdf <= 0.0 || cs.we.is_black() {
            continue;
        }
        let f_l = lbsdf.f(lv.wo, cs.wi, BxDFType::all()) * cs.wi.dot(lv.ns).abs();
        if f_l.is_black() {
            continue;
        }
        let vis = VisibilityTester { p0: lv.hit, p1: cs.point };
        let medium = if volumetric { lv.medium } else { None };
        let Some(tr) = vis.transmittance(scene, medium, sampler) else { continue };
        let contribution = lv.beta * f_l * tr * cs.we / cs.pdf;
        if !contribution.is_black() {
            film.add_splat(cs.p_raster, contribution);
        }
    }

    // General connections: every camera-subpath vertex paired with every light-subpath vertex,
    // weighted by the full Veach path-space MIS sum rather than just the connecting edge's pdfs.
    for (ci, cv) in camera_vertices.iter().enumerate() {
        let Some(cbsdf) = &cv.bsdf else { continue };
        if cv.delta {
            continue;
        }
        for (li, lv) in light_vertices.iter().enumerate() {
            let Some(lbsdf) = &lv.bsdf else { continue };
            if lv.delta {
                continue;
            }
            let d = lv.hit.p - cv.hit.p;
            let dist2 = d.dot(d);
            if dist2 < 1e-8 {
                continue;
            }
            let dist = dist2.sqrt();
            let wi_c = d / dist;
            let f_c = cbsdf.f(cv.wo, wi_c, BxDFType::all()) * wi_c.dot(cv.ns).abs();
            if f_c.is_black() {
                continue;
            }
            let wi_l = -wi_c;
            let f_l = lbsdf.f(lv.wo, wi_l, BxDFType::all()) * wi_l.dot(lv.ns).abs();
            if f_l.is_black() {
                continue;
            }
            let vis = VisibilityTester { p0: cv.hit, p1: lv.hit };
            let medium = if volumetric { cv.medium.or(lv.medium) } else { None };
            let Some(tr) = vis.transmittance(scene, medium, sampler) else { continue };
            let g = 1.0 / dist2;
            let pdf_c = cbsdf.pdf(cv.wo, wi_c, BxDFType::all());
            let pdf_l = lbsdf.pdf(lv.wo, wi_l, BxDFType::all());
            let weight = mis_weight(&camera_vertices, &light_vertices, ci, li, pdf_c, pdf_l, wi_c, wi_l, light_is_delta);
            l += cv.beta * f_c * g * tr * f_l * lv.beta * weight;
        }
    }

    l
}
