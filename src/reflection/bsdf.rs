//! `Bsdf`: the shading-frame wrapper combining a hit's matching `BxDF` lobes into a single
//! scattering function. `BxDF` is a closed enum of owned values with nothing to borrow, so the
//! lobe list is a small inline `ArrayVec` of values rather than `&dyn BxDF` references -- the
//! arena lifetime `'a` is kept only because other call sites (area light sampling, photon
//! storage) still thread it through.

use crate::interaction::SurfaceInteraction;
use crate::reflection::{BxDF, BxDFType, ScatterSample};
use crate::spectrum::Spectrum;
use crate::{Normal3, Point2f, Vec3f};
use arrayvec::ArrayVec;
use cgmath::InnerSpace;

const MAX_BXDFS: usize = 8;

pub struct Bsdf<'a> {
    pub eta: crate::Float,
    ns: Normal3,
    ng: Normal3,
    ss: Vec3f,
    ts: Vec3f,
    bxdfs: ArrayVec<[BxDF; MAX_BXDFS]>,
    _arena: std::marker::PhantomData<&'a ()>,
}

impl<'a> Bsdf<'a> {
    pub fn new(si: &SurfaceInteraction, eta: crate::Float) -> Self {
        let ns = si.shading_n;
        let ng = si.n();
        let ss = si.shading_geom.dpdu.normalize();
        let ts = ns.0.cross(ss);
        Self { eta, ns, ng, ss, ts, bxdfs: ArrayVec::new(), _arena: std::marker::PhantomData }
    }

    pub fn add(&mut self, bxdf: BxDF) {
        self.bxdfs.push(bxdf);
    }

    /// Widens every lobe's distribution in place, see `BxDF::regularize`.
    pub fn regularize(&mut self) {
        for bxdf in &mut self.bxdfs {
            bxdf.regularize();
        }
    }

    pub fn num_components(&self, flags: BxDFType) -> usize {
        self.bxdfs.iter().filter(|b| b.matches_flags(flags)).count()
    }

    pub fn world_to_local(&self, v: Vec3f) -> Vec3f {
        Vec3f::new(v.dot(self.ss), v.dot(self.ts), v.dot(self.ns.0))
    }

    pub fn local_to_world(&self, v: Vec3f) -> Vec3f {
        Vec3f::new(
            self.ss.x * v.x + self.ts.x * v.y + self.ns.0.x * v.z,
            self.ss.y * v.x + self.ts.y * v.y + self.ns.0.y * v.z,
            self.ss.z * v.x + self.ts.z * v.y + self.ns.0.z * v.z,
        )
    }

    pub fn f(&self, wo_w: Vec3f, wi_w: Vec3f, flags: BxDFType) -> Spectrum {
        let wo = self.world_to_local(wo_w);
        let wi = self.world_to_local(wi_w);
        if wo.z == 0.0 {
            return Spectrum::BLACK;
        }
        let reflect = wi_w.dot(self.ng.0) * wo_w.dot(self.ng.0) > 0.0;

        self.bxdfs
            .iter()
            .filter(|b| b.matches_flags(flags))
            .filter(|b| (reflect && b.get_type().contains(BxDFType::REFLECTION)) || (!reflect && b.get_type().contains(BxDFType::TRANSMISSION)))
            .map(|b| b.f(wo, wi))
            .fold(Spectrum::BLACK, |a, b| a + b)
    }

    pub fn pdf(&self, wo_w: Vec3f, wi_w: Vec3f, flags: BxDFType) -> crate::Float {
        if self.bxdfs.is_empty() {
            return 0.0;
        }
        let wo = self.world_to_local(wo_w);
        let wi = self.world_to_local(wi_w);
        if wo.z == 0.0 {
            return 0.0;
        }

        let matching: Vec<_> = self.bxdfs.iter().filter(|b| b.matches_flags(flags)).collect();
        if matching.is_empty() {
            return 0.0;
        }
        matching.iter().map(|b| b.pdf(wo, wi)).sum::<crate::Float>() / matching.len() as crate::Float
    }

    /// Samples one of the matching lobes uniformly, then evaluates the combined `f`/`pdf` over
    /// every matching lobe (matching pbrt's `BSDF::Sample_f` multi-lobe combination).
    pub fn sample_f(&self, wo_w: Vec3f, u_component: crate::Float, u: Point2f, flags: BxDFType) -> Option<ScatterSample> {
        let matching: Vec<(usize, &BxDF)> = self.bxdfs.iter().enumerate().filter(|(_, b)| b.matches_flags(flags)).collect();
        if matching.is_empty() {
            return None;
        }

        let comp = ((u_component * matching.len() as crate::Float) as usize).min(matching.len() - 1);
        let (_, bxdf) = matching[comp];

        let wo = self.world_to_local(wo_w);
        if wo.z == 0.0 {
            return None;
        }

        let sample = bxdf.sample_f(wo, u)?;
        if sample.pdf == 0.0 {
            return None;
        }
        let wi_w = self.local_to_world(sample.wi);

        let specular = bxdf.get_type().contains(BxDFType::SPECULAR);
        let (mut f, mut pdf) = (sample.f, sample.pdf);

        if !specular && matching.len() > 1 {
            let wi = sample.wi;
            pdf = matching.iter().map(|(_, b)| b.pdf(wo, wi)).sum::<crate::Float>() / matching.len() as crate::Float;
            f = self.f(wo_w, wi_w, flags);
        }

        Some(ScatterSample { f, wi: wi_w, pdf, sampled_type: sample.sampled_type })
    }
}
