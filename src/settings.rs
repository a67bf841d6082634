//! Render configuration: the CLI surface's tunables (`-s spp`, `-b max_bounces`, `-r resolution
//! scale`) and the integrator-selection token, as a plain struct a caller fills in directly
//! rather than a parser -- the CLI front end that would turn `argv` into this is explicitly out
//! of scope.

use crate::{Float, Point2i};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorKind {
    Path,
    VolPath,
    NaivePath,
    NaiveVolPath,
    LightPath,
    LightVolPath,
    Bdpt,
    VolBdpt,
    RandomWalk,
    Ao,
    Albedo,
    Debug,
    PhotonMapping,
    VolPhotonMapping,
    Sppm,
    VolSppm,
    RestirDi,
    RestirPt,
}

impl IntegratorKind {
    /// Parses the CLI's integrator-selection token (`path | vol_path | light_path | ...`).
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "path" => IntegratorKind::Path,
            "vol_path" => IntegratorKind::VolPath,
            "naive_path" => IntegratorKind::NaivePath,
            "naive_vol_path" => IntegratorKind::NaiveVolPath,
            "light_path" => IntegratorKind::LightPath,
            "light_vol_path" => IntegratorKind::LightVolPath,
            "bdpt" => IntegratorKind::Bdpt,
            "vol_bdpt" => IntegratorKind::VolBdpt,
            "random_walk" => IntegratorKind::RandomWalk,
            "ao" => IntegratorKind::Ao,
            "albedo" => IntegratorKind::Albedo,
            "debug" => IntegratorKind::Debug,
            "pm" => IntegratorKind::PhotonMapping,
            "vol_pm" => IntegratorKind::VolPhotonMapping,
            "sppm" => IntegratorKind::Sppm,
            "vol_sppm" => IntegratorKind::VolSppm,
            "restir_di" => IntegratorKind::RestirDi,
            "restir_pt" => IntegratorKind::RestirPt,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub resolution: Point2i,
    pub spp: usize,
    pub max_bounces: u32,
    pub rr_min_bounces: u32,
    pub regularize_bsdf: bool,
    pub seed: u64,
    pub integrator: IntegratorKind,
    pub tile_size: i32,
    /// Photon count for the photon-mapping/SPPM families; unused by unidirectional/bidirectional
    /// integrators.
    pub n_photons: usize,
    /// `<0` requests the "auto" initial SPPM radius (a fraction of the scene's bounding sphere).
    pub initial_radius: Float,
}

impl RenderSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.resolution.x <= 0 || self.resolution.y <= 0 {
            return Err(crate::error::RenderError::InvalidSettings("resolution must be positive".into()));
        }
        if self.spp == 0 {
            return Err(crate::error::RenderError::InvalidSettings("spp must be >= 1".into()));
        }
        Ok(())
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Point2i::new(1280, 720),
            spp: 16,
            max_bounces: 5,
            rr_min_bounces: 3,
            regularize_bsdf: false,
            seed: 0,
            integrator: IntegratorKind::Path,
            tile_size: 16,
            n_photons: 100_000,
            initial_radius: -1.0,
        }
    }
}
