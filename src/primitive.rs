//! Scene primitives: the pairing of a `Shape` with the material/medium/area-light it carries.
//! Every reference here is a plain index into vectors owned by `Scene`, so a primitive is just a
//! small `Copy` struct of indices rather than a trait object, and the BVH stores `PrimitiveId`s
//! instead of borrowed references.

use crate::geometry::bounds::Bounds3f;
use crate::light::LightId;
use crate::material::MaterialId;
use crate::medium::MediumId;
use crate::shapes::Shape;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeId(pub usize);

/// The participating media on either side of a primitive's surface, `None` meaning vacuum.
/// A primitive whose `inside == outside` is non-scattering (the common opaque-surface case);
/// they differ only at the boundary of a volume (a glass ball of fog, a smoke box wall).
#[derive(Clone, Copy, Debug, Default)]
pub struct MediumInterface {
    pub inside: Option<MediumId>,
    pub outside: Option<MediumId>,
}

impl MediumInterface {
    pub fn vacuum() -> Self {
        Self { inside: None, outside: None }
    }

    pub fn is_transition(&self) -> bool {
        self.inside != self.outside
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Primitive {
    pub shape: ShapeId,
    pub material: Option<MaterialId>,
    pub medium_interface: MediumInterface,
    /// Set when this primitive is one face of an area light, so intersections against it can
    /// report emitted radiance back towards the camera/a connecting path vertex.
    pub area_light: Option<LightId>,
}

impl Primitive {
    pub fn new(shape: ShapeId, material: Option<MaterialId>) -> Self {
        Self { shape, material, medium_interface: MediumInterface::vacuum(), area_light: None }
    }

    pub fn with_medium(mut self, medium_interface: MediumInterface) -> Self {
        self.medium_interface = medium_interface;
        self
    }

    pub fn with_area_light(mut self, light: LightId) -> Self {
        self.area_light = Some(light);
        self
    }
}

/// Used by the BVH build: the centroid/bounds of a primitive before it is permuted into
/// depth-first traversal order.
#[derive(Clone, Copy)]
pub(crate) struct PrimitiveInfo {
    pub primitive_index: usize,
    pub bounds: Bounds3f,
    pub centroid: crate::Point3f,
}

impl PrimitiveInfo {
    pub fn new(primitive_index: usize, bounds: Bounds3f) -> Self {
        let centroid = bounds.centroid();
        Self { primitive_index, bounds, centroid }
    }
}
