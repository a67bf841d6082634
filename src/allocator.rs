//! The per-tile scratch arena. A `bumpalo::Bump` is threaded through the radiance routines and
//! reset once per pixel sample; since `BxDF`/`Material` are plain enum values rather than trait
//! objects there is nothing left that actually needs arena allocation for *them*, but the arena
//! is kept as the scratch space `SurfaceInteraction::compute_scattering_functions` and the
//! BDPT/photon vertex lists use for their per-sample temporaries, so each render worker still
//! owns exactly one thread-local monotonic arena rather than allocating per hit.

use bumpalo::Bump;

/// One per render worker. Call `reset()` between pixel samples to reclaim the arena's memory
/// without freeing its backing allocation.
pub struct TileArena {
    bump: Bump,
}

impl TileArena {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    pub fn bump(&self) -> &Bump {
        &self.bump
    }

    pub fn reset(&mut self) {
        self.bump.reset();
    }
}

impl Default for TileArena {
    fn default() -> Self {
        Self::new()
    }
}
