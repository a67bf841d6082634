//! Participating media: a spatially constant volume and a grid-backed heterogeneous volume
//! addressed through an externally supplied density buffer (parsing a grid file format is out of
//! scope; this models only what the renderer core does with a density buffer once it exists in
//! memory). Free-flight and transmittance sampling go through null-scattering / ratio tracking
//! against a majorant that bounds the medium's extinction from above, so a single code path
//! handles both the homogeneous and heterogeneous cases.

use crate::spectrum::Spectrum;
use crate::{Float, Point3f, Ray, Vec3f};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediumId(pub usize);

/// The local scattering coefficients and emission at a point inside a medium.
#[derive(Clone, Copy, Debug)]
pub struct MediumSample {
    pub sigma_a: Spectrum,
    pub sigma_s: Spectrum,
    pub le: Spectrum,
    pub phase: HenyeyGreenstein,
}

/// A single Henyey-Greenstein lobe; `g` is the mean cosine (forward-scattering for `g > 0`).
#[derive(Clone, Copy, Debug)]
pub struct HenyeyGreenstein {
    pub g: Float,
}

impl HenyeyGreenstein {
    fn phase_hg(cos_theta: Float, g: Float) -> Float {
        let denom = 1.0 + g * g + 2.0 * g * cos_theta;
        crate::math::consts::INV_4PI * (1.0 - g * g) / (denom * denom.abs().max(1e-12).sqrt())
    }

    pub fn p(&self, wo: Vec3f, wi: Vec3f) -> Float {
        use cgmath::InnerSpace;
        Self::phase_hg(-wo.dot(wi), self.g)
    }

    /// Importance-samples an incident direction given outgoing direction `wo`, returning the
    /// sampled direction and the value of `p` (which equals the pdf, since HG self-imports).
    pub fn sample_p(&self, wo: Vec3f, u: crate::Point2f) -> (Vec3f, Float) {
        use cgmath::InnerSpace;
        let g = self.g;
        let cos_theta = if g.abs() < 1e-3 {
            1.0 - 2.0 * u.x
        } else {
            let sqr = (1.0 - g * g) / (1.0 + g - 2.0 * g * u.x);
            -(1.0 + g * g - sqr * sqr) / (2.0 * g)
        };
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * crate::math::consts::PI * u.y;
        let (v1, v2) = crate::math::coordinate_system(wo);
        let wi = v1 * (sin_theta * phi.cos()) + v2 * (sin_theta * phi.sin()) + wo * cos_theta;
        let pdf = Self::phase_hg(cos_theta, g);
        (wi.normalize(), pdf)
    }
}

/// A constant-bound segment of a ray's traversal through a medium, used by the null-scattering
/// transmittance sampler: `sigma_maj` bounds `sigma_a + sigma_s` from above over `[t_min, t_max]`.
#[derive(Clone, Copy, Debug)]
pub struct MajorantSegment {
    pub t_min: Float,
    pub t_max: Float,
    pub sigma_maj: Spectrum,
}

/// A coarse grid of per-block maximum densities over a `Medium::Grid`'s voxel buffer, used to
/// bound the majorant tightly along a small run of voxels instead of over the whole volume.
/// Each super-voxel covers up to `BLOCK` voxels per axis.
#[derive(Clone)]
struct MajorantGrid {
    nx: usize,
    ny: usize,
    nz: usize,
    max_density: Vec<Float>,
}

const SUPERVOXEL_BLOCK: usize = 8;

impl MajorantGrid {
    fn build(nx: usize, ny: usize, nz: usize, density: &[Float]) -> Self {
        let sx = ((nx + SUPERVOXEL_BLOCK - 1) / SUPERVOXEL_BLOCK).max(1);
        let sy = ((ny + SUPERVOXEL_BLOCK - 1) / SUPERVOXEL_BLOCK).max(1);
        let sz = ((nz + SUPERVOXEL_BLOCK - 1) / SUPERVOXEL_BLOCK).max(1);
        let mut max_density = vec![0.0; sx * sy * sz];
        for iz in 0..nz {
            let bz = iz / SUPERVOXEL_BLOCK;
            for iy in 0..ny {
                let by = iy / SUPERVOXEL_BLOCK;
                for ix in 0..nx {
                    let bx = ix / SUPERVOXEL_BLOCK;
                    let d = density[(iz * ny + iy) * nx + ix];
                    let slot = &mut max_density[(bz * sy + by) * sx + bx];
                    if d > *slot {
                        *slot = d;
                    }
                }
            }
        }
        MajorantGrid { nx: sx, ny: sy, nz: sz, max_density }
    }

    fn max_density_at(&self, bx: usize, by: usize, bz: usize) -> Float {
        self.max_density[(bz * self.ny + by) * self.nx + bx]
    }
}

/// The closed medium variant set: a spatially constant volume, and a grid-backed heterogeneous
/// volume addressed through an externally supplied density buffer.
#[derive(Clone)]
pub enum Medium {
    Homogeneous { sigma_a: Spectrum, sigma_s: Spectrum, le: Spectrum, g: Float },
    Grid {
        sigma_a: Spectrum,
        sigma_s: Spectrum,
        g: Float,
        /// World-to-medium transform mapping world space into the unit-cube grid index space.
        world_to_medium: crate::geometry::Transform,
        nx: usize,
        ny: usize,
        nz: usize,
        density: Vec<Float>,
        max_density: Float,
        majorant_grid: MajorantGrid,
    },
}

impl Medium {
    /// Builds a grid medium, precomputing the per-super-voxel majorant grid that
    /// `majorant_segments` DDA-traverses.
    pub fn grid(sigma_a: Spectrum, sigma_s: Spectrum, g: Float, world_to_medium: crate::geometry::Transform, nx: usize, ny: usize, nz: usize, density: Vec<Float>) -> Self {
        let max_density = density.iter().copied().fold(0.0, Float::max);
        let majorant_grid = MajorantGrid::build(nx, ny, nz, &density);
        Medium::Grid { sigma_a, sigma_s, g, world_to_medium, nx, ny, nz, density, max_density, majorant_grid }
    }

    fn density_at(&self, p_grid: Point3f) -> Float {
        match self {
            Medium::Grid { nx, ny, nz, density, .. } => {
                if p_grid.x < 0.0 || p_grid.x >= 1.0 || p_grid.y < 0.0 || p_grid.y >= 1.0 || p_grid.z < 0.0 || p_grid.z >= 1.0 {
                    return 0.0;
                }
                let ix = ((p_grid.x * *nx as Float) as usize).min(nx - 1);
                let iy = ((p_grid.y * *ny as Float) as usize).min(ny - 1);
                let iz = ((p_grid.z * *nz as Float) as usize).min(nz - 1);
                density[(iz * ny + iy) * nx + ix]
            }
            Medium::Homogeneous { .. } => 1.0,
        }
    }

    pub fn sample_point(&self, p: Point3f) -> MediumSample {
        match self {
            Medium::Homogeneous { sigma_a, sigma_s, le, g } => {
                MediumSample { sigma_a: *sigma_a, sigma_s: *sigma_s, le: *le, phase: HenyeyGreenstein { g: *g } }
            }
            Medium::Grid { sigma_a, sigma_s, g, world_to_medium, .. } => {
                let p_grid = world_to_medium.transform(p);
                let d = self.density_at(p_grid);
                MediumSample { sigma_a: *sigma_a * d, sigma_s: *sigma_s * d, le: Spectrum::BLACK, phase: HenyeyGreenstein { g: *g } }
            }
        }
    }

    /// The majorant segments a ray passes through up to `t_max`. Homogeneous media are a single
    /// segment; the grid medium DDA-steps through its super-voxel majorant grid, emitting one
    /// segment per super-voxel the ray crosses so a null-scattering walk only has to contend with
    /// that block's local maximum density rather than the grid's global maximum.
    pub fn majorant_segments(&self, ray: &Ray, t_max: Float) -> Vec<MajorantSegment> {
        match self {
            Medium::Homogeneous { sigma_a, sigma_s, .. } => {
                vec![MajorantSegment { t_min: 0.0, t_max, sigma_maj: *sigma_a + *sigma_s }]
            }
            Medium::Grid { sigma_a, sigma_s, world_to_medium, majorant_grid, .. } => {
                dda_majorant_segments(ray, t_max, world_to_medium, majorant_grid, (*sigma_a + *sigma_s))
                    .unwrap_or_default()
            }
        }
    }
}

/// Amanatides & Woo grid traversal of the super-voxel majorant grid: finds the ray's entry/exit
/// parameters against the `[0,1]^3` medium box, then walks one super-voxel at a time, emitting a
/// segment bounded by each cell's majorant until the ray exits the box or reaches `t_max`.
fn dda_majorant_segments(ray: &Ray, t_max: Float, world_to_medium: &crate::geometry::Transform, grid: &MajorantGrid, sigma_t_max: Spectrum) -> Option<Vec<MajorantSegment>> {
    let o_grid = world_to_medium.transform(ray.origin);
    let d_grid = world_to_medium.transform(ray.dir);

    // Slab test against the unit cube, in units of the original ray's t.
    let mut t0 = 0.0_f32;
    let mut t1 = t_max;
    for (o, d) in [(o_grid.x, d_grid.x), (o_grid.y, d_grid.y), (o_grid.z, d_grid.z)] {
        if d.abs() < 1e-12 {
            if o < 0.0 || o > 1.0 {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut near = (0.0 - o) * inv_d;
        let mut far = (1.0 - o) * inv_d;
        if near > far {
            std::mem::swap(&mut near, &mut far);
        }
        t0 = t0.max(near);
        t1 = t1.min(far);
        if t0 > t1 {
            return None;
        }
    }
    if t0 >= t1 {
        return None;
    }

    let dims = [grid.nx as Float, grid.ny as Float, grid.nz as Float];
    let p0 = [o_grid.x + t0 * d_grid.x, o_grid.y + t0 * d_grid.y, o_grid.z + t0 * d_grid.z];
    let d_idx = [d_grid.x * dims[0], d_grid.y * dims[1], d_grid.z * dims[2]];

    let mut voxel = [0i64; 3];
    let mut t_next = [crate::math::INFINITY; 3];
    let mut t_delta = [crate::math::INFINITY; 3];
    let mut step = [1i64; 3];
    for axis in 0..3 {
        let pos = (p0[axis] * dims[axis]).clamp(0.0, dims[axis] - 1e-4);
        voxel[axis] = pos.floor() as i64;
        if d_idx[axis].abs() < 1e-12 {
            continue;
        }
        step[axis] = if d_idx[axis] > 0.0 { 1 } else { -1 };
        let next_boundary = if d_idx[axis] > 0.0 { (voxel[axis] + 1) as Float } else { voxel[axis] as Float };
        t_next[axis] = t0 + (next_boundary - pos) / d_idx[axis];
        t_delta[axis] = (1.0 / d_idx[axis]).abs();
    }

    let bounds = [grid.nx as i64, grid.ny as i64, grid.nz as i64];
    let mut segments = Vec::new();
    let mut t_cur = t0;
    loop {
        if voxel[0] < 0 || voxel[0] >= bounds[0] || voxel[1] < 0 || voxel[1] >= bounds[1] || voxel[2] < 0 || voxel[2] >= bounds[2] {
            break;
        }
        let axis = if t_next[0] < t_next[1] {
            if t_next[0] < t_next[2] { 0 } else { 2 }
        } else if t_next[1] < t_next[2] {
            1
        } else {
            2
        };
        let t_exit = t_next[axis].min(t1);
        let density = grid.max_density_at(voxel[0] as usize, voxel[1] as usize, voxel[2] as usize);
        if density > 0.0 && t_exit > t_cur {
            segments.push(MajorantSegment { t_min: t_cur, t_max: t_exit, sigma_maj: sigma_t_max * density });
        }
        if t_next[axis] >= t1 {
            break;
        }
        t_cur = t_next[axis];
        voxel[axis] += step[axis];
        t_next[axis] += t_delta[axis];
    }

    Some(segments)
}

/// The outcome a null-scattering callback reports for the candidate interaction it was handed.
pub enum NullScatterEvent {
    /// Continue through the medium (a null-scattering event): the caller supplies a fresh `u`.
    Continue(Float),
    /// Stop iterating (an absorption or real-scattering event was selected).
    Stop,
}

/// Walks the majorant segments of `ray` up to `t_max`, invoking `callback` at each candidate
/// interaction point with the local `MediumSample`, the segment's majorant, and the accumulated
/// majorant transmittance `t_maj` since the last callback invocation. Returns the product of all
/// `t_maj` factors actually accumulated -- the closed-form analogue of "ratio tracking" integrated
/// over wavelength since `Spectrum` here is already a 3-channel quantity.
pub fn sample_null_scattering_transmittance(
    medium: &Medium,
    ray: &Ray,
    t_max: Float,
    mut u: Float,
    rng: &mut impl rand::Rng,
    mut callback: impl FnMut(Point3f, &MediumSample, Spectrum, Spectrum) -> NullScatterEvent,
) -> Spectrum {
    let segments = medium.majorant_segments(ray, t_max);
    let mut t_maj_accum = Spectrum::new(1.0);
    let mut first_segment = true;
    for seg in segments {
        if seg.sigma_maj.max_component() <= 0.0 {
            continue;
        }
        // Exponential free flight is memoryless, so entering a new majorant segment (the DDA
        // grid medium's super-voxel boundaries) can redraw `u` rather than carrying the previous
        // segment's partially-consumed one forward.
        if !first_segment {
            u = rng.gen();
        }
        first_segment = false;
        let mut t = seg.t_min;
        loop {
            let channel = 0usize;
            let sigma_maj_ch = seg.sigma_maj[channel].max(1e-8);
            let dt = -(1.0 - u).ln() / sigma_maj_ch;
            t += dt;
            if t >= seg.t_max {
                let remaining = seg.t_max - (t - dt);
                let t_maj = (-seg.sigma_maj * remaining).exp();
                t_maj_accum *= t_maj;
                break;
            }
            let t_maj = (-seg.sigma_maj * dt).exp();
            t_maj_accum *= t_maj;
            let p = ray.at(t);
            let sample = medium.sample_point(p);
            match callback(p, &sample, seg.sigma_maj, t_maj_accum) {
                NullScatterEvent::Continue(fresh_u) => {
                    u = fresh_u;
                    t_maj_accum = Spectrum::new(1.0);
                }
                NullScatterEvent::Stop => return t_maj_accum,
            }
        }
    }
    t_maj_accum
}

/// Unbiased ratio-tracked transmittance through `medium` along `ray` up to `t_max`, for
/// volumetric shadow rays (the `Vol*` integrators' NEE/connection weighting). At each null
/// collision the running transmittance is weighted by the null-collision probability
/// `sigma_n / sigma_maj` (scalar, via luminance, matching the single-channel free-flight
/// convention `sample_medium_interaction` already uses) -- real scattering/absorption events
/// are never selected here since a shadow ray only cares about the probability of passing
/// through untouched.
pub fn transmittance(medium: &Medium, ray: &Ray, t_max: Float, sampler: &mut crate::sampler::Sampler) -> Spectrum {
    let mut tr = Spectrum::new(1.0);
    let u0 = sampler.get_1d();
    // `sample_null_scattering_transmittance` needs its own rng for redrawing `u` at super-voxel
    // segment boundaries, but the callback below also needs `sampler` for each null collision's
    // `fresh_u` -- a throwaway generator, seeded from the sampler itself, avoids borrowing
    // `sampler` mutably twice at once.
    let seed_bits = (sampler.get_1d().to_bits() as u64) | ((sampler.get_1d().to_bits() as u64) << 32);
    let mut segment_rng = Xoshiro256Plus::seed_from_u64(seed_bits);
    let tail = sample_null_scattering_transmittance(medium, ray, t_max, u0, &mut segment_rng, |_p, sample, sigma_maj, t_maj| {
        let sigma_t = sample.sigma_a + sample.sigma_s;
        let sigma_n = (sigma_maj - sigma_t).clamp_positive();
        let w = (sigma_n.luminance() / sigma_maj.luminance().max(1e-8)).clamp(0.0, 1.0);
        tr *= t_maj * w;
        NullScatterEvent::Continue(sampler.get_1d())
    });
    tr * tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hg_isotropic_is_constant() {
        let hg = HenyeyGreenstein { g: 0.0 };
        let a = hg.p(Vec3f::new(0.0, 0.0, 1.0), Vec3f::new(1.0, 0.0, 0.0));
        let b = hg.p(Vec3f::new(0.0, 0.0, 1.0), Vec3f::new(0.0, 1.0, 0.0));
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        assert_abs_diff_eq!(a, crate::math::consts::INV_4PI, epsilon = 1e-6);
    }

    #[test]
    fn homogeneous_majorant_is_single_segment() {
        let m = Medium::Homogeneous { sigma_a: Spectrum::new(0.1), sigma_s: Spectrum::new(0.2), le: Spectrum::BLACK, g: 0.0 };
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0));
        let segs = m.majorant_segments(&ray, 5.0);
        assert_eq!(segs.len(), 1);
        assert_abs_diff_eq!(segs[0].sigma_maj.r(), 0.3, epsilon = 1e-6);
    }

    /// A 16^3 grid split into two 8-wide super-voxel blocks along x, with the second block ten
    /// times denser than the first. A ray crossing both blocks should DDA-step through exactly
    /// two majorant segments, one per block, each bounded by that block's own maximum density
    /// rather than the grid's global maximum.
    #[test]
    fn grid_majorant_dda_steps_one_segment_per_supervoxel() {
        let n = 16;
        let mut density = vec![1.0; n * n * n];
        for iz in 0..n {
            for iy in 0..n {
                for ix in 8..n {
                    density[(iz * n + iy) * n + ix] = 10.0;
                }
            }
        }
        let m = Medium::grid(Spectrum::new(0.1), Spectrum::new(0.1), 0.0, crate::geometry::Transform::IDENTITY, n, n, n, density);
        let ray = Ray::new(Point3f::new(0.01, 0.01, 0.01), Vec3f::new(1.0, 0.0, 0.0));
        let segs = m.majorant_segments(&ray, 1.0);
        assert_eq!(segs.len(), 2);
        assert_abs_diff_eq!(segs[0].sigma_maj.r(), 0.2, epsilon = 1e-4);
        assert_abs_diff_eq!(segs[1].sigma_maj.r(), 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(segs[0].t_min, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(segs[1].t_max, 0.99, epsilon = 1e-3);
        assert_abs_diff_eq!(segs[0].t_max, segs[1].t_min, epsilon = 1e-6);
    }

    #[test]
    fn grid_majorant_empty_for_ray_missing_the_box() {
        let n = 4;
        let density = vec![1.0; n * n * n];
        let m = Medium::grid(Spectrum::new(0.1), Spectrum::new(0.1), 0.0, crate::geometry::Transform::IDENTITY, n, n, n, density);
        let ray = Ray::new(Point3f::new(-1.0, 0.5, 0.5), Vec3f::new(0.0, 1.0, 0.0));
        let segs = m.majorant_segments(&ray, 5.0);
        assert!(segs.is_empty());
    }
}
