//! The `Rendering` handle: a progress tracker a caller can poll or block on from another thread
//! while the render runs on its own, covering both a single-phase render (path/BDPT/ReSTIR) and
//! a multi-phase one (photon mapping/SPPM's separate emission and gather passes).

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One render phase's progress counters, shared between the rendering threads and whatever
/// polls `Rendering`.
struct PhaseProgress {
    total: u64,
    done: AtomicU64,
    finished: AtomicBool,
}

impl PhaseProgress {
    fn new(total: u64) -> Self {
        Self { total, done: AtomicU64::new(0), finished: AtomicBool::new(total == 0) }
    }

    fn inc(&self, n: u64) {
        let prev = self.done.fetch_add(n, Ordering::Relaxed);
        if prev + n >= self.total {
            self.finished.store(true, Ordering::Relaxed);
        }
    }
}

pub enum Progress {
    SinglePhase(Arc<PhaseProgress>),
    MultiPhase(Vec<Arc<PhaseProgress>>),
}

impl Progress {
    pub fn single_phase(total_tiles: u64) -> Self {
        Progress::SinglePhase(Arc::new(PhaseProgress::new(total_tiles)))
    }

    pub fn multi_phase(per_phase_work: &[u64]) -> Self {
        Progress::MultiPhase(per_phase_work.iter().map(|&w| Arc::new(PhaseProgress::new(w))).collect())
    }

    /// Marks `n` units of work done in `phase` (`0` for single-phase renders).
    pub fn inc(&self, phase: usize, n: u64) {
        match self {
            Progress::SinglePhase(p) => p.inc(n),
            Progress::MultiPhase(phases) => phases[phase].inc(n),
        }
    }

    pub fn is_done(&self) -> bool {
        match self {
            Progress::SinglePhase(p) => p.finished.load(Ordering::Relaxed),
            Progress::MultiPhase(phases) => phases.iter().all(|p| p.finished.load(Ordering::Relaxed)),
        }
    }

    fn total_and_done(&self) -> (u64, u64) {
        match self {
            Progress::SinglePhase(p) => (p.total, p.done.load(Ordering::Relaxed).min(p.total)),
            Progress::MultiPhase(phases) => phases.iter().fold((0, 0), |(t, d), p| (t + p.total, d + p.done.load(Ordering::Relaxed).min(p.total))),
        }
    }
}

/// Owns the film plus the progress state for one render invocation. Reading the film is only
/// meaningful once `is_done()`, but nothing prevents an in-progress peek for a live preview.
pub struct Rendering {
    pub film: crate::film::Film,
    progress: Progress,
}

impl Rendering {
    pub fn new(film: crate::film::Film, progress: Progress) -> Self {
        Self { film, progress }
    }

    pub fn is_done(&self) -> bool {
        self.progress.is_done()
    }

    pub fn inc(&self, phase: usize, n: u64) {
        self.progress.inc(phase, n)
    }

    /// Renders a `▇▇▇▇░░░░` bar to stdout.
    pub fn log_progress(&self) {
        let (total, done) = self.progress.total_and_done();
        let bar = ProgressBar::new(total);
        bar.set_style(ProgressStyle::default_bar().template("{bar:40} {pos}/{len}"));
        bar.set_position(done);
        bar.finish();
    }

    pub fn wait(&self) {
        while !self.is_done() {
            std::thread::yield_now();
        }
    }

    pub fn wait_and_log_progress(&self) {
        while !self.is_done() {
            self.log_progress();
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        self.log_progress();
    }

    pub fn get_film(&self) -> &crate::film::Film {
        &self.film
    }
}
