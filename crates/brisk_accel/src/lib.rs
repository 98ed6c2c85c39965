//! Ray/scene acceleration for brisk.
//!
//! Geometry lives in a [`PrimitiveSet`]; a [`KdTree`] indexes it by id and
//! answers closest-hit and any-hit queries for [`RayPacket`]s.

mod error;
mod group;
pub mod kdtree;
mod material;
mod mesh;
pub mod packet;
mod primitive;
mod sphere;
mod triangle;

pub use error::{PersistError, PersistResult};
pub use group::PrimitiveGroup;
pub use kdtree::{KdTree, KdTreeConfig, Node, SharedKdTree, TreeStats};
pub use material::{Color, Material};
pub use mesh::TriangleMesh;
pub use packet::{Hit, PacketFlags, RayPacket};
pub use primitive::{ClippableView, Hittable, PrimitiveSet};
pub use sphere::Sphere;
pub use triangle::{intersect_triangle, Triangle};
