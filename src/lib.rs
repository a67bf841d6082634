//! `fluxtracer`: a physically-based spectral path tracer core -- geometry and acceleration
//! structures, BSDFs and participating media, lights and light sampling, a film/camera/filter
//! pipeline, and the integrator family that ties them together. Scene-file parsing, mesh
//! loading, and image codecs are deliberately left to callers; this crate renders scenes that
//! are already built in memory via `scene::SceneBuilder`.

pub mod allocator;
pub mod bvh;
pub mod camera;
pub mod err_float;
pub mod error;
pub mod film;
pub mod filter;
pub mod fresnel;
pub mod geometry;
pub mod integrator;
pub mod interaction;
pub mod light;
pub mod light_sampler;
#[macro_use]
pub mod macros;
pub mod material;
pub mod math;
pub mod medium;
pub mod primitive;
pub mod progress;
pub mod reflection;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod scheduler;
pub mod settings;
pub mod shapes;
pub mod spectrum;
pub mod texture;

pub type Float = f32;
pub type Vec2f = cgmath::Vector2<Float>;
pub type Vec2i = cgmath::Vector2<i32>;
pub type Vec3f = cgmath::Vector3<Float>;
pub type Point2f = cgmath::Point2<Float>;
pub type Point2i = cgmath::Point2<i32>;
pub type Point3f = cgmath::Point3<Float>;

pub use err_float::EFloat;
pub use geometry::bounds::{Bounds2f, Bounds2i, Bounds3f};
pub use geometry::{Differential, Normal3, Ray, RayDifferential, Transform};
pub use geometry::transform::Transformable;
pub use interaction::SurfaceInteraction;
pub use math::{abs_dot, lerp, INFINITY};
pub use medium::MediumId as MediumRef;
