//! Image tiles awaiting refinement.

/// A rectangle of the image at some magnification.
///
/// `xmag`/`ymag` is the size of one rendered sample in pixels: above 1 the
/// tile was shaded in blocks, below 1 it was supersampled. A tile whose
/// end equals its start marks a single supersampled pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub xstart: u32,
    pub ystart: u32,
    pub xend: u32,
    pub yend: u32,
    pub xmag: f32,
    pub ymag: f32,
    pub priority: f32,
}

impl Tile {
    pub fn new(xstart: u32, ystart: u32, xend: u32, yend: u32, xmag: f32, ymag: f32) -> Self {
        Self {
            xstart,
            ystart,
            xend,
            yend,
            xmag,
            ymag,
            priority: 0.0,
        }
    }

    /// Magnification product used to weight priorities.
    pub fn area(&self) -> f32 {
        self.xmag * self.ymag
    }

    /// Integer center of the tile's pixel range.
    pub fn center(&self) -> (i64, i64) {
        (
            (self.xend as i64 - self.xstart as i64) / 2 + self.xstart as i64,
            (self.yend as i64 - self.ystart as i64) / 2 + self.ystart as i64,
        )
    }
}

/// Per-worker tile scratch space.
///
/// Refinement produces children into a buffer that is reused for every
/// popped tile, so steady-state rendering allocates nothing. The pool also
/// counts the tiles the worker issued since the last coarse pass.
#[derive(Debug, Default)]
pub struct TilePool {
    children: Vec<Tile>,
    issued: usize,
}

impl TilePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything issued. Called at the start of a coarse pass.
    pub fn clear(&mut self) {
        self.children.clear();
        self.issued = 0;
    }

    /// Record a tile handed to the queue.
    pub fn issue(&mut self, tile: Tile) -> Tile {
        self.issued += 1;
        tile
    }

    /// Start collecting the children of a new tile.
    pub fn begin_children(&mut self) {
        self.children.clear();
    }

    pub fn push_child(&mut self, tile: Tile) {
        self.issued += 1;
        self.children.push(tile);
    }

    /// Children collected since [`TilePool::begin_children`].
    pub fn children(&self) -> &[Tile] {
        &self.children
    }

    /// Tiles issued since the last [`TilePool::clear`].
    pub fn issued(&self) -> usize {
        self.issued
    }
}
