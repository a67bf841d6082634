//! Procedural UV textures: given a surface UV, return a scalar or a spectrum. No image textures,
//! no mip-mapping, no 2D mapping pipeline -- those are out of scope here. Closed enums in place
//! of a generic `Texture<T>` trait, so dispatch monomorphizes.

use crate::interaction::SurfaceInteraction;
use crate::spectrum::Spectrum;
use crate::{Float, Point2f};

#[derive(Clone, Copy, Debug)]
pub enum FloatTexture {
    Constant(Float),
    Checkerboard { a: Float, b: Float, u_scale: Float, v_scale: Float },
}

impl FloatTexture {
    pub fn evaluate(&self, si: &SurfaceInteraction) -> Float {
        match self {
            FloatTexture::Constant(v) => *v,
            FloatTexture::Checkerboard { a, b, u_scale, v_scale } => {
                if checker_parity(si.uv, *u_scale, *v_scale) {
                    *a
                } else {
                    *b
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum SpectrumTexture {
    Constant(Spectrum),
    Checkerboard { a: Spectrum, b: Spectrum, u_scale: Float, v_scale: Float },
}

impl SpectrumTexture {
    pub fn evaluate(&self, si: &SurfaceInteraction) -> Spectrum {
        match self {
            SpectrumTexture::Constant(s) => *s,
            SpectrumTexture::Checkerboard { a, b, u_scale, v_scale } => {
                if checker_parity(si.uv, *u_scale, *v_scale) {
                    *a
                } else {
                    *b
                }
            }
        }
    }
}

fn checker_parity(uv: Point2f, u_scale: Float, v_scale: Float) -> bool {
    ((uv.x * u_scale).floor() as i64 + (uv.y * v_scale).floor() as i64) % 2 == 0
}
