//! The sensor plane: `AddSample` is a plain running mean per discrete pixel (no reconstruction
//! filter), while `AddSplat` -- used by light-tracing and bidirectional techniques that land
//! contributions at continuous film positions -- filters its footprint through the reconstruction
//! filter instead. The per-tile accumulate-then-merge shape is how the scheduler avoids
//! contention on `AddSample`; only the splat buffer needs true atomics, since light-tracer
//! threads scatter across the whole image rather than staying within one tile.

use crate::filter::Filter;
use crate::spectrum::Spectrum;
use crate::{Bounds2i, Float, Point2f, Point2i};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, Default)]
struct FilmPixel {
    sum: Spectrum,
    count: u32,
    /// Running sum of squared luminance, so an external reporting layer can derive a per-pixel
    /// variance estimate (`moment/count - mean^2`) without rerunning the integrator.
    moment: Float,
}

pub struct Film {
    pub resolution: Point2i,
    pub filter: Filter,
    pixels: Mutex<Vec<FilmPixel>>,
    splat: Vec<[AtomicU32; 3]>,
}

/// A thread-local accumulation buffer for one tile of the image; `AddSample` within a tile
/// writes here with no synchronisation, and `Film::merge_tile` folds it into the shared buffer
/// once the tile finishes.
pub struct FilmTile {
    pixel_bounds: Bounds2i,
    pixels: Vec<FilmPixel>,
}

impl Film {
    pub fn new(resolution: Point2i, filter: Filter) -> Self {
        let n = (resolution.x * resolution.y).max(0) as usize;
        let splat = (0..n).map(|_| [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]).collect();
        Self { resolution, filter, pixels: Mutex::new(vec![FilmPixel::default(); n]), splat }
    }

    fn pixel_index(&self, p: Point2i) -> usize {
        (p.y * self.resolution.x + p.x) as usize
    }

    pub fn sample_bounds(&self) -> Bounds2i {
        Bounds2i::with_bounds(Point2i::new(0, 0), self.resolution)
    }

    pub fn get_film_tile(&self, bounds: Bounds2i) -> FilmTile {
        let n = bounds.area().max(0) as usize;
        FilmTile { pixel_bounds: bounds, pixels: vec![FilmPixel::default(); n] }
    }

    fn tile_index(tile: &FilmTile, p: Point2i) -> usize {
        let width = tile.pixel_bounds.max.x - tile.pixel_bounds.min.x;
        ((p.y - tile.pixel_bounds.min.y) * width + (p.x - tile.pixel_bounds.min.x)) as usize
    }

    /// Accumulates `l` into the running mean for `pixel`, within a tile the calling thread
    /// owns exclusively -- no locking needed.
    pub fn add_sample_to_tile(tile: &mut FilmTile, pixel: Point2i, l: Spectrum) {
        if l.has_nans() || !l.is_finite() {
            tracing::warn!("rejecting non-finite radiance sample at {:?}", pixel);
            return;
        }
        let idx = Self::tile_index(tile, pixel);
        let p = &mut tile.pixels[idx];
        p.sum += l;
        p.count += 1;
        p.moment += l.luminance() * l.luminance();
    }

    pub fn merge_tile(&self, tile: FilmTile) {
        let mut pixels = self.pixels.lock();
        for y in tile.pixel_bounds.min.y..tile.pixel_bounds.max.y {
            for x in tile.pixel_bounds.min.x..tile.pixel_bounds.max.x {
                let p = Point2i::new(x, y);
                let src = tile.pixels[Self::tile_index(&tile, p)];
                let dst = &mut pixels[self.pixel_index(p)];
                dst.sum += src.sum;
                dst.count += src.count;
                dst.moment += src.moment;
            }
        }
    }

    /// Splats `l` into every pixel in the filter's footprint around the continuous film
    /// position `p_film`, weighted by the filter's response at that offset. Called directly
    /// against the shared buffer (not through a tile) since splatting threads don't own
    /// disjoint pixel ranges.
    pub fn add_splat(&self, p_film: Point2f, l: Spectrum) {
        if l.has_nans() || !l.is_finite() {
            tracing::warn!("rejecting non-finite splat at {:?}", (p_film.x, p_film.y));
            return;
        }
        let (radius, _) = self.filter.extent();
        let p0 = Point2i::new((p_film.x - radius.x).ceil() as i32, (p_film.y - radius.y).ceil() as i32);
        let p1 = Point2i::new((p_film.x + radius.x).floor() as i32, (p_film.y + radius.y).floor() as i32);
        let p0 = Point2i::new(p0.x.max(0), p0.y.max(0));
        let p1 = Point2i::new(p1.x.min(self.resolution.x - 1), p1.y.min(self.resolution.y - 1));

        for y in p0.y..=p1.y {
            for x in p0.x..=p1.x {
                let offset = Point2f::new(x as Float - p_film.x, y as Float - p_film.y);
                let w = self.filter.evaluate(offset);
                if w == 0.0 {
                    continue;
                }
                let idx = self.pixel_index(Point2i::new(x, y));
                for c in 0..3 {
                    atomic_add_f32(&self.splat[idx][c], w * l[c]);
                }
            }
        }
    }

    /// Scales the splat buffer by `w` (typically `1/spp`), in place, once rendering finishes.
    pub fn weight_splats(&self, w: Float) {
        for channels in &self.splat {
            for c in channels {
                let mut cur = c.load(Ordering::Relaxed);
                loop {
                    let new = f32::to_bits(f32::from_bits(cur) * w);
                    match c.compare_exchange_weak(cur, new, Ordering::Relaxed, Ordering::Relaxed) {
                        Ok(_) => break,
                        Err(actual) => cur = actual,
                    }
                }
            }
        }
    }

    /// `sum/count + splat` per pixel, the final reconstructed image.
    pub fn get_rendered_image(&self) -> Vec<Spectrum> {
        let pixels = self.pixels.lock();
        pixels
            .iter()
            .zip(self.splat.iter())
            .map(|(p, s)| {
                let mean = if p.count > 0 { p.sum / p.count as Float } else { Spectrum::BLACK };
                let splat = Spectrum::rgb(
                    f32::from_bits(s[0].load(Ordering::Relaxed)),
                    f32::from_bits(s[1].load(Ordering::Relaxed)),
                    f32::from_bits(s[2].load(Ordering::Relaxed)),
                );
                mean + splat
            })
            .collect()
    }

    /// Per-pixel variance of the accumulated luminance (`0` for pixels with `<2` samples).
    pub fn variance_image(&self) -> Vec<Float> {
        let pixels = self.pixels.lock();
        pixels
            .iter()
            .map(|p| {
                if p.count < 2 {
                    0.0
                } else {
                    let n = p.count as Float;
                    let mean_lum = p.sum.luminance() / n;
                    ((p.moment / n) - mean_lum * mean_lum).max(0.0)
                }
            })
            .collect()
    }

    pub fn to_image(&self) -> image::RgbImage {
        let pixels = self.get_rendered_image();
        let (w, h) = (self.resolution.x as u32, self.resolution.y as u32);
        image::RgbImage::from_fn(w, h, |x, y| {
            let s = pixels[(y * w + x) as usize];
            image::Rgb(s.to_srgb_bytes())
        })
    }
}

fn atomic_add_f32(a: &AtomicU32, v: Float) {
    let mut cur = a.load(Ordering::Relaxed);
    loop {
        let new = f32::to_bits(f32::from_bits(cur) + v);
        match a.compare_exchange_weak(cur, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => cur = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use approx::assert_abs_diff_eq;

    #[test]
    fn running_mean_of_two_samples() {
        let film = Film::new(Point2i::new(4, 4), Filter::Box { radius: crate::Vec2f::new(0.5, 0.5) });
        let mut tile = film.get_film_tile(film.sample_bounds());
        Film::add_sample_to_tile(&mut tile, Point2i::new(1, 1), Spectrum::new(1.0));
        Film::add_sample_to_tile(&mut tile, Point2i::new(1, 1), Spectrum::new(3.0));
        film.merge_tile(tile);

        let img = film.get_rendered_image();
        let idx = film.pixel_index(Point2i::new(1, 1));
        assert_abs_diff_eq!(img[idx].r(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn splats_are_scaled_by_weight_splats() {
        let film = Film::new(Point2i::new(4, 4), Filter::Box { radius: crate::Vec2f::new(0.5, 0.5) });
        film.add_splat(Point2f::new(2.0, 2.0), Spectrum::new(2.0));
        film.weight_splats(0.5);
        let img = film.get_rendered_image();
        let idx = film.pixel_index(Point2i::new(2, 2));
        assert_abs_diff_eq!(img[idx].r(), 1.0, epsilon = 1e-6);
    }
}
