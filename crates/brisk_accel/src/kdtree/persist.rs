//! Binary tree files.
//!
//! Layout (all little-endian):
//!
//! ```text
//! field            type / size
//! ---------------  -----------------------------
//! magic            [u8; 4] = "BKDT"
//! version          u32 = 1
//! primitive_count  u32
//! bounds           6 x f32 (min xyz, max xyz)
//! item_count       u32
//! items            item_count x u32
//! node_count       u32
//! nodes            node_count x 12 bytes
//! ```
//!
//! Each node record starts with a `u32` tag: 0 for a leaf followed by
//! `(u32 start, u32 count)`, or `1 + axis` for an internal node followed by
//! `(f32 pos, u32 first_child)`. Bit 8 of an internal tag marks
//! `left_cheaper`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use brisk_math::{Aabb, Vec3};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::{KdTree, KdTreeConfig, Node};
use crate::{PersistError, PersistResult, PrimitiveSet};

const MAGIC: &[u8; 4] = b"BKDT";
const VERSION: u32 = 1;

const LEAF_TAG: u32 = 0;
const LEFT_CHEAPER_BIT: u32 = 1 << 8;

/// Largest up-front allocation made from an untrusted count.
const MAX_PREALLOC: usize = 1 << 20;

impl KdTree {
    /// Serialize the tree.
    pub fn write_to<W: Write>(&self, w: &mut W) -> PersistResult<()> {
        w.write_all(MAGIC)?;
        w.write_u32::<LE>(VERSION)?;
        w.write_u32::<LE>(self.primitive_count as u32)?;
        for v in [self.bounds.min, self.bounds.max] {
            w.write_f32::<LE>(v.x)?;
            w.write_f32::<LE>(v.y)?;
            w.write_f32::<LE>(v.z)?;
        }

        w.write_u32::<LE>(self.items.len() as u32)?;
        for &item in &self.items {
            w.write_u32::<LE>(item)?;
        }

        w.write_u32::<LE>(self.nodes.len() as u32)?;
        for node in &self.nodes {
            match *node {
                Node::Leaf { start, count } => {
                    w.write_u32::<LE>(LEAF_TAG)?;
                    w.write_u32::<LE>(start)?;
                    w.write_u32::<LE>(count)?;
                }
                Node::Internal {
                    axis,
                    pos,
                    first_child,
                    left_cheaper,
                } => {
                    let mut tag = 1 + axis as u32;
                    if left_cheaper {
                        tag |= LEFT_CHEAPER_BIT;
                    }
                    w.write_u32::<LE>(tag)?;
                    w.write_f32::<LE>(pos)?;
                    w.write_u32::<LE>(first_child)?;
                }
            }
        }
        Ok(())
    }

    /// Write the tree to `path`, replacing any existing file only once the
    /// new one is complete.
    pub fn save(&self, path: impl AsRef<Path>) -> PersistResult<()> {
        let path = path.as_ref();
        let partial = path.with_extension("partial");
        {
            let mut w = BufWriter::new(File::create(&partial)?);
            self.write_to(&mut w)?;
            w.flush()?;
        }
        fs::rename(&partial, path)?;
        log::info!("Saved KD-tree to {}", path.display());
        Ok(())
    }

    /// Deserialize a tree built for `set` and check that its structure is
    /// sound before handing it out.
    ///
    /// The stored primitive count and bounds must match `set`, so only trees
    /// built with [`KdTree::build`] over the whole set reload.
    pub fn read_from<R: Read>(
        r: &mut R,
        set: &dyn PrimitiveSet,
        config: &KdTreeConfig,
    ) -> PersistResult<KdTree> {
        let read_u32 = |r: &mut R| r.read_u32::<LE>().map_err(PersistError::from_read);
        let read_f32 = |r: &mut R| r.read_f32::<LE>().map_err(PersistError::from_read);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(PersistError::from_read)?;
        if &magic != MAGIC {
            return Err(PersistError::BadMagic);
        }
        let version = read_u32(r)?;
        if version != VERSION {
            return Err(PersistError::UnsupportedVersion(version));
        }

        let primitive_count = read_u32(r)? as usize;
        if primitive_count != set.len() {
            return Err(PersistError::PrimitiveCountMismatch {
                stored: primitive_count,
                actual: set.len(),
            });
        }

        let mut corners = [0.0f32; 6];
        for c in &mut corners {
            *c = read_f32(r)?;
        }
        let bounds = Aabb::new(
            Vec3::new(corners[0], corners[1], corners[2]),
            Vec3::new(corners[3], corners[4], corners[5]),
        );
        // Same primitive count but moved geometry: a cache for another scene.
        let actual = set.bounds();
        if bounds != actual {
            return Err(PersistError::BoundsMismatch { stored: bounds, actual });
        }

        let item_count = read_u32(r)? as usize;
        let mut items = Vec::with_capacity(item_count.min(MAX_PREALLOC));
        for _ in 0..item_count {
            let item = read_u32(r)?;
            if item as usize >= primitive_count {
                return Err(PersistError::Corrupt(format!(
                    "item {item} out of range for {primitive_count} primitives"
                )));
            }
            items.push(item);
        }

        let node_count = read_u32(r)? as usize;
        if node_count == 0 {
            return Err(PersistError::EmptyTree);
        }
        let mut nodes = Vec::with_capacity(node_count.min(MAX_PREALLOC));
        for index in 0..node_count {
            let tag = read_u32(r)?;
            let node = if tag == LEAF_TAG {
                let start = read_u32(r)?;
                let count = read_u32(r)?;
                if start as u64 + count as u64 > item_count as u64 {
                    return Err(PersistError::Corrupt(format!(
                        "leaf {index} spans items {start}+{count} of {item_count}"
                    )));
                }
                Node::Leaf { start, count }
            } else {
                let axis = (tag & !LEFT_CHEAPER_BIT).wrapping_sub(1);
                if axis > 2 {
                    return Err(PersistError::Corrupt(format!("node {index} has tag {tag:#x}")));
                }
                let pos = read_f32(r)?;
                let first_child = read_u32(r)?;
                if !pos.is_finite() {
                    return Err(PersistError::Corrupt(format!("node {index} splits at {pos}")));
                }
                // Children always follow their parent, which rules out cycles.
                let child = first_child as usize;
                if child <= index || child + 1 >= node_count {
                    return Err(PersistError::Corrupt(format!(
                        "node {index} points at children {first_child} of {node_count}"
                    )));
                }
                Node::Internal {
                    axis: axis as u8,
                    pos,
                    first_child,
                    left_cheaper: tag & LEFT_CHEAPER_BIT != 0,
                }
            };
            nodes.push(node);
        }

        let max_depth = KdTree::measure_depth(&nodes);
        Ok(KdTree {
            nodes,
            items,
            bounds,
            primitive_count,
            max_depth,
            sah_cost: 0.0,
            max_transparent_hits: config.max_transparent_hits,
            translucent: set.has_transparency(),
        })
    }

    /// Read a tree file written by [`KdTree::save`].
    pub fn load(path: impl AsRef<Path>, set: &dyn PrimitiveSet, config: &KdTreeConfig) -> PersistResult<KdTree> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        let tree = Self::read_from(&mut r, set, config)?;
        log::info!("Loaded KD-tree from {}: {}", path.display(), tree.stats());
        Ok(tree)
    }

    /// Load the tree cached at `path`, or build one and cache it when the
    /// file is missing or does not match `set`.
    pub fn load_or_build(path: impl AsRef<Path>, set: &dyn PrimitiveSet, config: &KdTreeConfig) -> KdTree {
        let path = path.as_ref();
        match Self::load(path, set, config) {
            Ok(tree) => tree,
            Err(err) => {
                log::warn!("Rebuilding KD-tree, could not load {}: {}", path.display(), err);
                let tree = Self::build(set, config);
                if let Err(err) = tree.save(path) {
                    log::warn!("Could not save KD-tree to {}: {}", path.display(), err);
                }
                tree
            }
        }
    }
}
