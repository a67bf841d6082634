//! The top-level scene container. Every shape/material/medium/light is a plain value behind an
//! index, so `Scene` is just the set of `Vec`s those indices point into, plus the `Bvh` built
//! over them.

use crate::bvh::Bvh;
use crate::geometry::bounds::Bounds3f;
use crate::geometry::Ray;
use crate::interaction::SurfaceInteraction;
use crate::light::{Light, LightId};
use crate::material::{Material, MaterialId};
use crate::medium::{Medium, MediumId};
use crate::primitive::{Primitive, PrimitiveId};
use crate::shapes::Shape;
use crate::Float;

pub struct Scene {
    pub shapes: Vec<Shape>,
    pub materials: Vec<Material>,
    pub media: Vec<Medium>,
    pub lights: Vec<Light>,
    pub primitives: Vec<Primitive>,
    pub infinite_lights: Vec<LightId>,
    bvh: Bvh,
    world_bound: Bounds3f,
}

/// Accumulates shapes/materials/media/lights and their index assignments before the BVH is
/// built; `Scene::new` consumes one of these. There is no scene-file parser to drive it (that's
/// out of scope) -- callers populate it directly.
#[derive(Default)]
pub struct SceneBuilder {
    shapes: Vec<Shape>,
    materials: Vec<Material>,
    media: Vec<Medium>,
    lights: Vec<Light>,
    primitives: Vec<Primitive>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shape(&mut self, shape: Shape) -> crate::primitive::ShapeId {
        let id = crate::primitive::ShapeId(self.shapes.len());
        self.shapes.push(shape);
        id
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        id
    }

    pub fn add_medium(&mut self, medium: Medium) -> MediumId {
        let id = MediumId(self.media.len());
        self.media.push(medium);
        id
    }

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.lights.len());
        self.lights.push(light);
        id
    }

    pub fn add_primitive(&mut self, primitive: Primitive) -> PrimitiveId {
        let id = PrimitiveId(self.primitives.len());
        self.primitives.push(primitive);
        id
    }

    pub fn build(self) -> Scene {
        Scene::new(self.shapes, self.materials, self.media, self.lights, self.primitives)
    }
}

impl Scene {
    pub fn new(shapes: Vec<Shape>, materials: Vec<Material>, media: Vec<Medium>, mut lights: Vec<Light>, primitives: Vec<Primitive>) -> Self {
        let world_bound = primitives
            .iter()
            .map(|p| shapes[p.shape.0].world_bound())
            .fold(Bounds3f::empty(), |b, sb| b.join(&sb));
        let (center, radius) = world_bound.bounding_sphere();
        for light in &mut lights {
            light.preprocess(center, radius);
        }
        let infinite_lights = lights
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_infinite_light())
            .map(|(i, _)| LightId(i))
            .collect();

        let bvh = Bvh::build(&primitives, |p| shapes[p.shape.0].world_bound());

        Self { shapes, materials, media, lights, primitives, infinite_lights, bvh, world_bound }
    }

    pub fn world_bound(&self) -> Bounds3f {
        self.world_bound
    }

    pub fn primitive(&self, id: PrimitiveId) -> &Primitive {
        &self.primitives[id.0]
    }

    pub fn light(&self, id: LightId) -> &Light {
        &self.lights[id.0]
    }

    pub fn intersect(&self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'static>)> {
        self.bvh.intersect(self, ray)
    }

    pub fn intersect_test(&self, ray: &Ray) -> bool {
        self.bvh.intersect_test(self, ray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::sphere::Sphere;
    use crate::spectrum::Spectrum;
    use crate::texture::SpectrumTexture;
    use crate::{Point3f, Vec3f};

    #[test]
    fn empty_scene_has_no_intersections() {
        let scene = Scene::new(vec![], vec![], vec![], vec![], vec![]);
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0));
        assert!(scene.intersect(&ray).is_none());
        assert!(!scene.intersect_test(&ray));
    }

    #[test]
    fn single_sphere_is_hit() {
        let mut b = SceneBuilder::new();
        let shape_id = b.add_shape(Shape::Sphere(Sphere::full(crate::geometry::Transform::translate(Vec3f::new(0.0, 0.0, 5.0)), 1.0)));
        let mat = b.add_material(Material::Diffuse { albedo: SpectrumTexture::Constant(Spectrum::new(0.5)) });
        b.add_primitive(Primitive::new(shape_id, Some(mat)));
        let scene = b.build();

        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0));
        assert!(scene.intersect_test(&ray));
        let (t, _si) = scene.intersect(&ray).expect("expected a hit");
        assert!((t - 4.0).abs() < 1e-3);
    }
}
