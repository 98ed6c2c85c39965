//! Surface-area-heuristic construction.

use std::cmp::Ordering;
use std::time::Instant;

use brisk_math::{clip_triangle, Aabb, T_EPSILON};
use rayon::prelude::*;

use super::{KdTree, KdTreeConfig, Node};
use crate::{ClippableView, PrimitiveSet};

/// Nodes with at least this many primitives clip and sort in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    End,
    Planar,
    Begin,
}

/// A primitive boundary on one axis. `prim` indexes the node's surviving
/// primitive list.
#[derive(Debug, Clone, Copy)]
struct Event {
    pos: f32,
    kind: EventKind,
    prim: u32,
}

impl Event {
    fn order(a: &Event, b: &Event) -> Ordering {
        a.pos.total_cmp(&b.pos).then(a.kind.cmp(&b.kind))
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    axis: usize,
    pos: f32,
    planar_left: bool,
    cost: f32,
    l_prob: f32,
    r_prob: f32,
}

struct Builder<'a> {
    set: &'a dyn PrimitiveSet,
    clippable: Option<&'a dyn ClippableView>,
    config: KdTreeConfig,
    nodes: Vec<Node>,
    items: Vec<u32>,
    max_depth: usize,
    dropped: usize,
}

impl KdTree {
    /// Build a tree over every primitive of `set`.
    pub fn build(set: &dyn PrimitiveSet, config: &KdTreeConfig) -> KdTree {
        let ids = (0..set.len() as u32).collect();
        Self::build_from(set, ids, set.bounds(), config)
    }

    /// Build a tree over the primitives `ids`, all inside `bounds`.
    pub fn build_from(
        set: &dyn PrimitiveSet,
        ids: Vec<u32>,
        bounds: Aabb,
        config: &KdTreeConfig,
    ) -> KdTree {
        let start = Instant::now();
        let mut builder = Builder {
            set,
            clippable: set.as_clippable(),
            config: *config,
            nodes: vec![Node::EMPTY_LEAF],
            items: Vec::with_capacity(ids.len() * 2),
            max_depth: 0,
            dropped: 0,
        };

        let sah_cost = if ids.is_empty() || bounds.is_empty() {
            0.0
        } else {
            builder.build_node(0, ids, &bounds, 0)
        };

        if builder.dropped > 0 {
            log::warn!(
                "KD-tree build dropped {} degenerate primitive references",
                builder.dropped
            );
        }

        let mut tree = KdTree {
            nodes: builder.nodes,
            items: builder.items,
            bounds,
            primitive_count: set.len(),
            max_depth: builder.max_depth,
            sah_cost,
            max_transparent_hits: config.max_transparent_hits,
            translucent: set.has_transparency(),
        };
        if config.compute_traversal_order {
            tree.compute_traversal_order(set, config);
        }

        log::info!(
            "Built KD-tree in {:.3}s: {}",
            start.elapsed().as_secs_f64(),
            tree.stats()
        );
        tree
    }
}

impl Builder<'_> {
    /// Build the subtree rooted at `node` and return its SAH cost.
    fn build_node(&mut self, node: usize, mut prims: Vec<u32>, bounds: &Aabb, depth: usize) -> f64 {
        self.max_depth = self.max_depth.max(depth);
        let leaf_cost = |n: usize, config: &KdTreeConfig| n as f32 * config.intersection_cost;

        let area = bounds.surface_area();
        let mut events: [Vec<Event>; 3] = Default::default();
        if area > T_EPSILON * T_EPSILON && depth + 1 < self.config.max_height {
            let boxes = self.clipped_boxes(&prims, bounds);
            let before = prims.len();
            let survivors: Vec<(u32, Aabb)> = prims
                .iter()
                .zip(boxes)
                .filter_map(|(&id, b)| b.map(|b| (id, b)))
                .collect();
            if survivors.len() != before {
                log::debug!(
                    "node {node}: dropped {} primitives with degenerate clipped bounds",
                    before - survivors.len()
                );
                self.dropped += before - survivors.len();
            }
            prims = survivors.iter().map(|(id, _)| *id).collect();
            let boxes: Vec<Aabb> = survivors.into_iter().map(|(_, b)| b).collect();
            events = Self::axis_events(&boxes);
        }

        let Some(split) = self.find_split(prims.len(), &events, bounds, area) else {
            self.make_leaf(node, &prims);
            return leaf_cost(prims.len(), &self.config) as f64;
        };

        let (left, right) = Self::partition(&prims, &events[split.axis], &split);
        let l_bounds = bounds.lower_half(split.axis, split.pos);
        let r_bounds = bounds.upper_half(split.axis, split.pos);

        // One child may keep every primitive when its box shrinks, which cuts
        // off empty space. Keeping everything without shrinking is a leaf.
        let n = prims.len();
        if (left.len() == n && l_bounds.surface_area() >= area)
            || (right.len() == n && r_bounds.surface_area() >= area)
        {
            self.make_leaf(node, &prims);
            return leaf_cost(n, &self.config) as f64;
        }
        drop(prims);

        let first_child = self.make_inner(node, split.axis, split.pos);
        let l_cost = self.build_node(first_child, left, &l_bounds, depth + 1);
        let r_cost = self.build_node(first_child + 1, right, &r_bounds, depth + 1);
        self.config.traversal_cost as f64 + split.l_prob as f64 * l_cost + split.r_prob as f64 * r_cost
    }

    /// Bounds of each primitive restricted to `bounds`, `None` when the
    /// restriction has no area or is not finite.
    fn clipped_boxes(&self, prims: &[u32], bounds: &Aabb) -> Vec<Option<Aabb>> {
        let clip = |&id: &u32| -> Option<Aabb> {
            let id = id as usize;
            let b = match self.clippable {
                Some(mesh) => {
                    let [a, b, c] = mesh.triangle(id);
                    clip_triangle(a, b, c, bounds)?
                }
                None => self.set.primitive_bounds(id).intersection(bounds),
            };
            let usable = !b.is_empty()
                && b.min.is_finite()
                && b.max.is_finite()
                && b.surface_area() > 0.0;
            usable.then_some(b)
        };
        if prims.len() >= PARALLEL_THRESHOLD {
            prims.par_iter().map(clip).collect()
        } else {
            prims.iter().map(clip).collect()
        }
    }

    /// Sorted begin/end/planar events for each axis.
    fn axis_events(boxes: &[Aabb]) -> [Vec<Event>; 3] {
        let axis_events = |axis: usize| {
            let mut events = Vec::with_capacity(boxes.len() * 2);
            for (i, b) in boxes.iter().enumerate() {
                let prim = i as u32;
                if b.min[axis] == b.max[axis] {
                    events.push(Event { pos: b.min[axis], kind: EventKind::Planar, prim });
                } else {
                    events.push(Event { pos: b.min[axis], kind: EventKind::Begin, prim });
                    events.push(Event { pos: b.max[axis], kind: EventKind::End, prim });
                }
            }
            events.sort_unstable_by(Event::order);
            events
        };

        if boxes.len() >= PARALLEL_THRESHOLD {
            let (x, (y, z)) = rayon::join(
                || axis_events(0),
                || rayon::join(|| axis_events(1), || axis_events(2)),
            );
            [x, y, z]
        } else {
            [axis_events(0), axis_events(1), axis_events(2)]
        }
    }

    /// Cheapest split over all axes and both planar policies, if any beats
    /// the leaf cost. Ties keep the earlier candidate.
    fn find_split(&self, n: usize, events: &[Vec<Event>; 3], bounds: &Aabb, area: f32) -> Option<Split> {
        let trav = self.config.traversal_cost;
        let isec = self.config.intersection_cost;
        let mut best_cost = n as f32 * isec;
        let mut best = None;

        for (axis, events) in events.iter().enumerate() {
            let mut n_left = 0usize;
            let mut n_right = n;
            let mut seq = 0;
            while seq < events.len() {
                let pos = events[seq].pos;
                let mut idx = seq;
                let mut count = |kind: EventKind| {
                    let from = idx;
                    while idx < events.len() && events[idx].pos == pos && events[idx].kind == kind {
                        idx += 1;
                    }
                    idx - from
                };
                let ending = count(EventKind::End);
                let planar = count(EventKind::Planar);
                let starting = count(EventKind::Begin);

                let l_prob = bounds.lower_half(axis, pos).surface_area() / area;
                let r_prob = bounds.upper_half(axis, pos).surface_area() / area;

                n_right -= ending + planar;

                let to_left = trav + isec * (l_prob * (n_left + planar) as f32 + r_prob * n_right as f32);
                if to_left < best_cost {
                    best_cost = to_left;
                    best = Some(Split { axis, pos, planar_left: true, cost: to_left, l_prob, r_prob });
                }
                let to_right = trav + isec * (l_prob * n_left as f32 + r_prob * (n_right + planar) as f32);
                if to_right < best_cost {
                    best_cost = to_right;
                    best = Some(Split { axis, pos, planar_left: false, cost: to_right, l_prob, r_prob });
                }

                n_left += planar + starting;
                seq = idx;
            }
        }

        if let Some(split) = &best {
            log::trace!(
                "split axis {} at {} cost {} (leaf {})",
                split.axis,
                split.pos,
                split.cost,
                n as f32 * isec
            );
        }
        best
    }

    /// Classify every primitive against the winning split.
    fn partition(prims: &[u32], events: &[Event], split: &Split) -> (Vec<u32>, Vec<u32>) {
        let mut is_left = vec![true; prims.len()];
        let mut is_right = vec![true; prims.len()];
        for event in events {
            let i = event.prim as usize;
            match event.kind {
                EventKind::Planar => {
                    if event.pos < split.pos || (event.pos == split.pos && split.planar_left) {
                        is_right[i] = false;
                    } else {
                        is_left[i] = false;
                    }
                }
                EventKind::Begin => {
                    if event.pos >= split.pos {
                        is_left[i] = false;
                    }
                }
                EventKind::End => {
                    if event.pos <= split.pos {
                        is_right[i] = false;
                    }
                }
            }
        }

        let mut left = Vec::new();
        let mut right = Vec::new();
        for (i, &id) in prims.iter().enumerate() {
            if is_left[i] {
                left.push(id);
            }
            if is_right[i] {
                right.push(id);
            }
        }
        (left, right)
    }

    fn make_leaf(&mut self, node: usize, prims: &[u32]) {
        self.nodes[node] = Node::Leaf {
            start: self.items.len() as u32,
            count: prims.len() as u32,
        };
        self.items.extend_from_slice(prims);
    }

    /// Turn `node` into an internal node with two fresh children and return
    /// the first child's index.
    fn make_inner(&mut self, node: usize, axis: usize, pos: f32) -> usize {
        let first_child = self.nodes.len();
        self.nodes.push(Node::EMPTY_LEAF);
        self.nodes.push(Node::EMPTY_LEAF);
        self.nodes[node] = Node::Internal {
            axis: axis as u8,
            pos,
            first_child: first_child as u32,
            left_cheaper: true,
        };
        first_child
    }
}
