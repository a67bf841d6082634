//! A surface-area-heuristic BVH over `PrimitiveId`s. Follows pbrt's flattened-array design:
//! build a binary tree with 12 equal-width SAH buckets per split candidate, then linearize it
//! depth-first into a single `Vec<LinearNode>` so traversal needs no pointer chasing, only an
//! explicit array-based stack.

use crate::geometry::bounds::Bounds3f;
use crate::geometry::Ray;
use crate::primitive::{Primitive, PrimitiveId, PrimitiveInfo};
use crate::scene::Scene;
use crate::Float;
use arrayvec::ArrayVec;

const N_BUCKETS: usize = 12;
const TRAVERSAL_COST: Float = 0.5;
const MAX_STACK_DEPTH: usize = 64;

#[derive(Clone, Copy)]
enum LinearNode {
    Leaf { bounds: Bounds3f, first: u32, count: u32 },
    Interior { bounds: Bounds3f, second_child: u32, axis: u8 },
}

pub struct Bvh {
    nodes: Vec<LinearNode>,
    /// Primitive indices in depth-first traversal order; a leaf's `first..first+count` range
    /// slices into this.
    ordered_primitives: Vec<usize>,
}

struct BuildNode {
    bounds: Bounds3f,
    children: Option<(Box<BuildNode>, Box<BuildNode>)>,
    split_axis: u8,
    first_prim_offset: usize,
    n_primitives: usize,
}

impl BuildNode {
    fn leaf(first_prim_offset: usize, n_primitives: usize, bounds: Bounds3f) -> Self {
        Self { bounds, children: None, split_axis: 0, first_prim_offset, n_primitives }
    }

    fn interior(axis: u8, c0: BuildNode, c1: BuildNode) -> Self {
        let bounds = c0.bounds.join(&c1.bounds);
        Self { bounds, children: Some((Box::new(c0), Box::new(c1))), split_axis: axis, first_prim_offset: 0, n_primitives: 0 }
    }
}

impl Bvh {
    pub fn build(primitives: &[Primitive], shape_bounds: impl Fn(&Primitive) -> Bounds3f) -> Self {
        if primitives.is_empty() {
            return Self { nodes: Vec::new(), ordered_primitives: Vec::new() };
        }

        let mut infos: Vec<PrimitiveInfo> = primitives.iter().enumerate().map(|(i, p)| PrimitiveInfo::new(i, shape_bounds(p))).collect();
        let mut ordered_primitives = Vec::with_capacity(primitives.len());
        let infos_len = infos.len();
        let root = Self::build_recursive(&mut infos, 0, infos_len, &mut ordered_primitives);

        let mut nodes = Vec::new();
        Self::flatten(&root, &mut nodes);
        Self { nodes, ordered_primitives }
    }

    fn build_recursive(infos: &mut [PrimitiveInfo], start: usize, end: usize, ordered: &mut Vec<usize>) -> BuildNode {
        let bounds = infos[start..end].iter().fold(Bounds3f::empty(), |b, i| b.join(&i.bounds));
        let n_primitives = end - start;

        if n_primitives == 1 {
            let offset = ordered.len();
            ordered.push(infos[start].primitive_index);
            return BuildNode::leaf(offset, 1, bounds);
        }

        let centroid_bounds = infos[start..end].iter().fold(Bounds3f::empty(), |b, i| b.join_point(i.centroid));
        let axis = centroid_bounds.maximum_extent() as usize;
        if centroid_bounds.diagonal()[axis] < 1e-12 {
            let offset = ordered.len();
            ordered.extend(infos[start..end].iter().map(|i| i.primitive_index));
            return BuildNode::leaf(offset, n_primitives, bounds);
        }

        let mid = Self::sah_partition(infos, start, end, axis, &centroid_bounds, bounds);
        match mid {
            None => {
                let offset = ordered.len();
                ordered.extend(infos[start..end].iter().map(|i| i.primitive_index));
                BuildNode::leaf(offset, n_primitives, bounds)
            }
            Some(mid) => {
                let left = Self::build_recursive(infos, start, mid, ordered);
                let right = Self::build_recursive(infos, mid, end, ordered);
                BuildNode::interior(axis as u8, left, right)
            }
        }
    }

    /// Partitions `infos[start..end]` by the least-cost split among `N_BUCKETS` equal-width
    /// centroid buckets along `axis`, returning the partition point or `None` when a leaf is
    /// cheaper than any split (pbrt's standard SAH build).
    fn sah_partition(infos: &mut [PrimitiveInfo], start: usize, end: usize, axis: usize, centroid_bounds: &Bounds3f, node_bounds: Bounds3f) -> Option<usize> {
        let n_primitives = end - start;
        if n_primitives <= 2 {
            infos[start..end].sort_by(|a, b| a.centroid[axis].partial_cmp(&b.centroid[axis]).unwrap());
            return Some(start + n_primitives / 2);
        }

        #[derive(Clone, Copy)]
        struct Bucket {
            count: usize,
            bounds: Bounds3f,
        }
        let mut buckets = [Bucket { count: 0, bounds: Bounds3f::empty() }; N_BUCKETS];

        let bucket_for = |centroid: Float| -> usize {
            let offset = (centroid - centroid_bounds.min[axis]) / centroid_bounds.diagonal()[axis].max(1e-12);
            ((offset * N_BUCKETS as Float) as usize).min(N_BUCKETS - 1)
        };

        for info in infos[start..end].iter() {
            let b = bucket_for(info.centroid[axis]);
            buckets[b].count += 1;
            buckets[b].bounds = buckets[b].bounds.join(&info.bounds);
        }

        let mut costs = [0.0; N_BUCKETS - 1];
        for (i, cost) in costs.iter_mut().enumerate() {
            let (mut b0, mut c0) = (Bounds3f::empty(), 0);
            for bucket in &buckets[0..=i] {
                b0 = b0.join(&bucket.bounds);
                c0 += bucket.count;
            }
            let (mut b1, mut c1) = (Bounds3f::empty(), 0);
            for bucket in &buckets[i + 1..N_BUCKETS] {
                b1 = b1.join(&bucket.bounds);
                c1 += bucket.count;
            }
            let sa = node_bounds.surface_area().max(1e-12);
            *cost = TRAVERSAL_COST + (c0 as Float * b0.surface_area() + c1 as Float * b1.surface_area()) / sa;
        }

        let (split_bucket, &min_cost) = costs.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap();
        let leaf_cost = n_primitives as Float;

        if n_primitives > 255 || min_cost < leaf_cost {
            let mid = itertools_partition(&mut infos[start..end], |info| bucket_for(info.centroid[axis]) <= split_bucket);
            Some(start + mid)
        } else {
            None
        }
    }

    fn flatten(node: &BuildNode, nodes: &mut Vec<LinearNode>) -> u32 {
        let my_index = nodes.len() as u32;
        match &node.children {
            None => {
                nodes.push(LinearNode::Leaf { bounds: node.bounds, first: node.first_prim_offset as u32, count: node.n_primitives as u32 });
            }
            Some((left, right)) => {
                nodes.push(LinearNode::Leaf { bounds: node.bounds, first: 0, count: 0 }); // placeholder
                Self::flatten(left, nodes);
                let second_child = Self::flatten(right, nodes);
                nodes[my_index as usize] = LinearNode::Interior { bounds: node.bounds, second_child, axis: node.split_axis };
            }
        }
        my_index
    }

    pub fn world_bound(&self) -> Bounds3f {
        self.nodes.first().map(node_bounds).unwrap_or_else(Bounds3f::empty)
    }

    pub fn intersect(&self, scene: &Scene, ray: &Ray) -> Option<(Float, crate::interaction::SurfaceInteraction<'static>)> {
        if self.nodes.is_empty() {
            return None;
        }

        let inv_dir = crate::Vec3f::new(1.0 / ray.dir.x, 1.0 / ray.dir.y, 1.0 / ray.dir.z);
        let dir_is_neg = [inv_dir.x < 0.0, inv_dir.y < 0.0, inv_dir.z < 0.0];

        let mut stack: ArrayVec<[u32; MAX_STACK_DEPTH]> = ArrayVec::new();
        let mut current = 0u32;
        let mut best: Option<(Float, crate::interaction::SurfaceInteraction<'static>)> = None;
        let mut t_max = ray.t_max;
        let mut ray = *ray;

        loop {
            match self.nodes[current as usize] {
                LinearNode::Leaf { bounds, first, count } => {
                    if bounds.intersect_test_fast(ray.origin, inv_dir, dir_is_neg, t_max) {
                        for i in first..first + count {
                            let prim_idx = self.ordered_primitives[i as usize];
                            let prim = &scene.primitives[prim_idx];
                            let shape = &scene.shapes[prim.shape.0];
                            if let Some((t, mut si)) = shape.intersect(&ray) {
                                if t < t_max {
                                    t_max = t;
                                    ray.t_max = t;
                                    si.primitive = Some(PrimitiveId(prim_idx));
                                    best = Some((t, si));
                                }
                            }
                        }
                    }
                    match stack.pop() {
                        Some(n) => current = n,
                        None => break,
                    }
                }
                LinearNode::Interior { bounds, second_child, axis } => {
                    if bounds.intersect_test_fast(ray.origin, inv_dir, dir_is_neg, t_max) {
                        if dir_is_neg[axis as usize] {
                            stack.push(current + 1);
                            current = second_child;
                        } else {
                            stack.push(second_child);
                            current += 1;
                        }
                        continue;
                    }
                    match stack.pop() {
                        Some(n) => current = n,
                        None => break,
                    }
                }
            }
        }

        best
    }

    pub fn intersect_test(&self, scene: &Scene, ray: &Ray) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = crate::Vec3f::new(1.0 / ray.dir.x, 1.0 / ray.dir.y, 1.0 / ray.dir.z);
        let dir_is_neg = [inv_dir.x < 0.0, inv_dir.y < 0.0, inv_dir.z < 0.0];

        let mut stack: ArrayVec<[u32; MAX_STACK_DEPTH]> = ArrayVec::new();
        let mut current = 0u32;

        loop {
            match self.nodes[current as usize] {
                LinearNode::Leaf { bounds, first, count } => {
                    if bounds.intersect_test_fast(ray.origin, inv_dir, dir_is_neg, ray.t_max) {
                        for i in first..first + count {
                            let prim_idx = self.ordered_primitives[i as usize];
                            let shape = &scene.shapes[scene.primitives[prim_idx].shape.0];
                            if shape.intersect_test(ray) {
                                return true;
                            }
                        }
                    }
                    match stack.pop() {
                        Some(n) => current = n,
                        None => return false,
                    }
                }
                LinearNode::Interior { bounds, second_child, axis } => {
                    if bounds.intersect_test_fast(ray.origin, inv_dir, dir_is_neg, ray.t_max) {
                        if dir_is_neg[axis as usize] {
                            stack.push(current + 1);
                            current = second_child;
                        } else {
                            stack.push(second_child);
                            current += 1;
                        }
                        continue;
                    }
                    match stack.pop() {
                        Some(n) => current = n,
                        None => return false,
                    }
                }
            }
        }
    }
}

fn node_bounds(n: &LinearNode) -> Bounds3f {
    match n {
        LinearNode::Leaf { bounds, .. } => *bounds,
        LinearNode::Interior { bounds, .. } => *bounds,
    }
}

/// Stable-free Hoare partition (std's `slice::partition_point` needs a sorted slice, which we
/// don't have) -- moves elements matching `pred` to the front and returns the split point.
fn itertools_partition<T>(slice: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut i = 0;
    for j in 0..slice.len() {
        if pred(&slice[j]) {
            slice.swap(i, j);
            i += 1;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bvh_has_no_intersections() {
        let bvh = Bvh { nodes: Vec::new(), ordered_primitives: Vec::new() };
        assert_eq!(bvh.world_bound(), Bounds3f::empty());
    }
}
