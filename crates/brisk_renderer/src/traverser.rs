//! Deadline-driven adaptive image refinement.
//!
//! A frame starts with a coarse pass that shades the whole image in blocks
//! and queues every coarse tile by priority. Until the frame deadline,
//! workers then pop the most interesting tile, split it by the refinement
//! ratio and shade the pieces at the finer magnification. Once tiles get
//! smaller than a pixel the pieces are supersampled instead, climbing the
//! jitter sampler ladder up to `max_spp`. Refinement carries over between
//! frames until the scene changes, so a still image keeps converging.

use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{
    ApproximatePriorityQueue, Color, ConfigError, CyclicLoadBalancer, DeadlineConfig, Fragment,
    FragmentRenderer, ImageBuffer, LoadBalancer, PixelSampler, PriorityScheme, RenderError,
    SamplerSet, Tile, WorkerContext, MAX_WORKERS,
};

/// Where the traverser is in refining the current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CoarsePass,
    Refining,
    Converged,
}

/// Rectangle of interest, `[xstart, xend) x [ystart, yend)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRegion {
    pub xstart: u32,
    pub ystart: u32,
    pub xend: u32,
    pub yend: u32,
    pub xcenter: u32,
    pub ycenter: u32,
}

impl RenderRegion {
    pub fn new(xstart: u32, ystart: u32, xend: u32, yend: u32) -> Self {
        Self {
            xstart,
            ystart,
            xend,
            yend,
            xcenter: (xend - xstart) / 2 + xstart,
            ycenter: (yend - ystart) / 2 + ystart,
        }
    }

    /// True when the tile lies completely inside the region.
    pub fn contains_tile(&self, tile: &Tile) -> bool {
        tile.xstart >= self.xstart
            && tile.ystart >= self.ystart
            && tile.xend <= self.xend
            && tile.yend <= self.yend
    }
}

/// Work done by one or more workers during a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Coarse tiles shaded and queued.
    pub coarse_tiles: usize,
    /// Tiles popped and refined.
    pub refined_tiles: usize,
    /// Tiles popped but dropped for exceeding `max_spp`.
    pub skipped_tiles: usize,
    /// Child tiles queued by refinement.
    pub child_tiles: usize,
}

impl AddAssign for FrameStats {
    fn add_assign(&mut self, rhs: Self) {
        self.coarse_tiles += rhs.coarse_tiles;
        self.refined_tiles += rhs.refined_tiles;
        self.skipped_tiles += rhs.skipped_tiles;
        self.child_tiles += rhs.child_tiles;
    }
}

/// Outcome of refining one tile.
enum Refined {
    Children(usize),
    Skipped,
}

/// Image traverser that refines tiles by priority until a per-frame
/// deadline.
///
/// Frame setup ([`DeadlineImageTraverser::begin_frame`]) takes `&mut self`
/// and runs on one thread; [`DeadlineImageTraverser::render_image`] takes
/// `&self` and runs on every worker at once.
pub struct DeadlineImageTraverser {
    config: DeadlineConfig,
    samplers: SamplerSet,
    queue: ApproximatePriorityQueue<Tile>,
    load_balancer: Box<dyn LoadBalancer>,

    width: u32,
    height: u32,
    num_workers: usize,
    render_region: RenderRegion,
    use_render_region: bool,

    reset_every_frame: bool,
    finished_coarse: AtomicBool,
    converged: bool,
    convergence_time: Option<Duration>,

    epoch: Instant,
    refine_start: Instant,
    frame_end: Instant,
}

impl DeadlineImageTraverser {
    /// Traverser with a [`CyclicLoadBalancer`].
    pub fn new(config: DeadlineConfig) -> Self {
        Self::with_load_balancer(config, Box::new(CyclicLoadBalancer::new()))
    }

    /// Parse `args` as [`DeadlineConfig::from_args`] does and build a
    /// traverser from them.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        Ok(Self::new(DeadlineConfig::from_args(args)?))
    }

    pub fn with_load_balancer(config: DeadlineConfig, load_balancer: Box<dyn LoadBalancer>) -> Self {
        let now = Instant::now();
        Self {
            queue: ApproximatePriorityQueue::new(config.num_sub_queues),
            config,
            samplers: SamplerSet::new(),
            load_balancer,
            width: 0,
            height: 0,
            num_workers: 0,
            render_region: RenderRegion::new(0, 0, 0, 0),
            use_render_region: false,
            reset_every_frame: false,
            finished_coarse: AtomicBool::new(false),
            converged: false,
            convergence_time: None,
            epoch: now,
            refine_start: now,
            frame_end: now,
        }
    }

    pub fn config(&self) -> &DeadlineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        if self.converged {
            Phase::Converged
        } else if self.finished_coarse() {
            Phase::Refining
        } else {
            Phase::CoarsePass
        }
    }

    pub fn finished_coarse(&self) -> bool {
        self.finished_coarse.load(Ordering::Acquire)
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Time from the start of the coarse pass to convergence, once reached.
    pub fn convergence_time(&self) -> Option<Duration> {
        self.convergence_time
    }

    /// Tiles waiting for refinement.
    pub fn queued_tiles(&self) -> usize {
        self.queue.len()
    }

    pub fn render_region(&self) -> RenderRegion {
        self.render_region
    }

    /// Tell the traverser whether the scene or camera is changing. While it
    /// is, every frame starts over with a coarse pass.
    pub fn change_idle_mode(&mut self, changed: bool) {
        self.reset_every_frame = changed;
    }

    /// Start over with a coarse pass at the next frame.
    pub fn restart(&mut self) {
        self.finished_coarse.store(false, Ordering::Release);
        self.converged = false;
    }

    /// Prepare for an image of `width x height` rendered by `num_workers`
    /// workers. Resets the render region to the full image.
    pub fn setup_display(&mut self, width: u32, height: u32, num_workers: usize) -> Result<(), ConfigError> {
        if num_workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: num_workers,
                max: MAX_WORKERS,
            });
        }
        self.width = width;
        self.height = height;
        self.num_workers = num_workers;
        self.render_region = RenderRegion::new(0, 0, width, height);
        self.restart();
        self.refine_start = Instant::now();

        let (xtiles, ytiles) = self.config.coarse_tiles(width, height);
        let assignments = xtiles as usize * ytiles as usize;
        self.load_balancer.setup_display(assignments, num_workers);
        debug!(
            "Deadline traverser: {}x{} image, {} coarse tiles, {} workers",
            width, height, assignments, num_workers
        );
        Ok(())
    }

    /// Restrict refinement to `[xstart, xend) x [ystart, yend)`. Takes
    /// effect for priorities computed from now on, when enabled with
    /// [`DeadlineImageTraverser::use_render_region`].
    pub fn set_render_region(&mut self, xstart: u32, ystart: u32, xend: u32, yend: u32) -> Result<(), ConfigError> {
        if xstart >= xend || ystart >= yend || xend > self.width || yend > self.height {
            return Err(ConfigError::InvalidRenderRegion {
                xstart,
                ystart,
                xend,
                yend,
                width: self.width,
                height: self.height,
            });
        }
        self.render_region = RenderRegion::new(xstart, ystart, xend, yend);
        Ok(())
    }

    pub fn use_render_region(&mut self, enabled: bool) {
        self.use_render_region = enabled;
    }

    /// Single-threaded frame setup: restart the coarse pass if needed, set
    /// the deadline and detect convergence.
    pub fn begin_frame(&mut self, workers: &mut [WorkerContext]) {
        if self.reset_every_frame {
            self.restart();
        }
        if !self.finished_coarse() {
            for ctx in workers.iter_mut() {
                self.load_balancer.setup_frame(ctx.proc());
                ctx.pool.clear();
            }
            self.queue.clear();
            self.converged = false;
            self.convergence_time = None;
            self.refine_start = Instant::now();
        }

        let now = Instant::now();
        self.frame_end = now + Duration::from_secs_f64(self.config.frame_time());

        if self.finished_coarse() && self.queue.is_empty() && !self.converged {
            self.converged = true;
            let total = now.duration_since(self.refine_start);
            self.convergence_time = Some(total);
            if self.config.benchmark {
                info!("total_time={:.6}", total.as_secs_f64());
            } else {
                info!(
                    "Took {:.3} seconds to refine to {} spp",
                    total.as_secs_f64(),
                    self.config.max_spp
                );
            }
        }
    }

    /// Run one frame on `workers.len()` scoped threads.
    pub fn render_frame(
        &mut self,
        workers: &mut [WorkerContext],
        renderer: &dyn FragmentRenderer,
        image: &ImageBuffer,
    ) -> Result<FrameStats, RenderError> {
        if let Some(ctx) = workers.iter().find(|ctx| ctx.proc() >= self.num_workers) {
            return Err(RenderError::WorkerIndexOutOfRange {
                index: ctx.proc(),
                max: self.num_workers,
            });
        }

        self.begin_frame(workers);
        if self.converged || workers.is_empty() {
            return Ok(FrameStats::default());
        }

        let barrier = (!self.finished_coarse()).then(|| Barrier::new(workers.len()));
        let barrier = barrier.as_ref();
        let this = &*self;

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = workers
                .iter_mut()
                .map(|ctx| s.spawn(move || this.render_image(ctx, renderer, image, barrier)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut stats = FrameStats::default();
        for result in results {
            stats += result?;
        }
        debug!(
            "Frame: {} coarse, {} refined, {} skipped, {} queued",
            stats.coarse_tiles,
            stats.refined_tiles,
            stats.skipped_tiles,
            self.queue.len()
        );
        Ok(stats)
    }

    /// One worker's share of a frame: the coarse pass, a wait on `barrier`
    /// when given, then refinement until the deadline.
    pub fn render_image(
        &self,
        ctx: &mut WorkerContext,
        renderer: &dyn FragmentRenderer,
        image: &ImageBuffer,
        barrier: Option<&Barrier>,
    ) -> Result<FrameStats, RenderError> {
        if self.converged {
            return Ok(FrameStats::default());
        }
        let coarse_tiles = self.render_coarse(ctx, renderer, image);
        if let Some(barrier) = barrier {
            barrier.wait();
        }
        let mut stats = self.refine(ctx, renderer, image)?;
        stats.coarse_tiles = coarse_tiles;
        Ok(stats)
    }

    /// Shade and queue every coarse tile the load balancer gives this
    /// worker. Returns the number of tiles.
    pub fn render_coarse(&self, ctx: &mut WorkerContext, renderer: &dyn FragmentRenderer, image: &ImageBuffer) -> usize {
        let (_, ytiles) = self.config.coarse_tiles(self.width, self.height);
        let (tile_width, tile_height) = self.config.coarse_tile_size();
        let (xmag, ymag) = self.config.coarse_pixel_size;
        let proc = ctx.proc();

        let mut count = 0;
        while let Some(assignments) = self.load_balancer.next_assignment(proc) {
            for assignment in assignments {
                let xtile = assignment as u32 / ytiles;
                let ytile = assignment as u32 % ytiles;
                let xstart = xtile * tile_width;
                let ystart = ytile * tile_height;
                let xend = (xstart + tile_width).min(self.width);
                let yend = (ystart + tile_height).min(self.height);

                let mut frag = Fragment::covering(xstart, ystart, xend, yend, xmag, ymag);
                self.samplers.single().render_fragment(renderer, &mut frag, &mut ctx.rng);

                let mut tile = Tile::new(xstart, ystart, xend, yend, xmag as f32, ymag as f32);
                self.compute_priority(&mut tile, &frag);
                let tile = ctx.pool.issue(tile);
                self.queue.push(tile, tile.priority, proc);
                image.set_fragment(&frag);
                count += 1;
            }
        }
        self.finished_coarse.store(true, Ordering::Release);
        count
    }

    /// Refine tiles from the queue until the frame deadline. An empty queue
    /// is polled again rather than waited on.
    pub fn refine(
        &self,
        ctx: &mut WorkerContext,
        renderer: &dyn FragmentRenderer,
        image: &ImageBuffer,
    ) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats::default();
        while Instant::now() < self.frame_end {
            let Some(tile) = self.queue.pop(ctx.proc()) else {
                std::hint::spin_loop();
                continue;
            };
            match self.refine_tile(ctx, renderer, image, &tile)? {
                Refined::Children(n) => {
                    stats.refined_tiles += 1;
                    stats.child_tiles += n;
                }
                Refined::Skipped => stats.skipped_tiles += 1,
            }
        }
        Ok(stats)
    }

    fn refine_tile(
        &self,
        ctx: &mut WorkerContext,
        renderer: &dyn FragmentRenderer,
        image: &ImageBuffer,
        tile: &Tile,
    ) -> Result<Refined, RenderError> {
        let (xratio, yratio) = self.config.refinement_ratio;
        let (xpacket, ypacket) = self.config.packet_size;
        let new_xmag = tile.xmag / xratio as f32;
        let new_ymag = tile.ymag / yratio as f32;

        ctx.pool.begin_children();

        if new_xmag < 1.0 || new_ymag < 1.0 {
            let x_samples = (1.0 / new_xmag) as u32;
            let y_samples = (1.0 / new_ymag) as u32;
            let spp = x_samples * y_samples;
            if spp > self.config.max_spp {
                return Ok(Refined::Skipped);
            }
            let sampler = self.samplers.jitter(spp)?;

            let xs = (xpacket as f32 * new_xmag) as u32;
            let ys = (ypacket as f32 * new_ymag) as u32;
            if xs < 1 || ys < 1 {
                // More samples than one packet holds: one pixel per fragment.
                if xs != ys {
                    return Err(RenderError::NonSquareSupersample { columns: xs, rows: ys });
                }
                let mut frag = Fragment::new(1, 1);
                frag.push(tile.xstart, tile.ystart);
                sampler.render_fragment(renderer, &mut frag, &mut ctx.rng);

                let mut child = Tile::new(tile.xstart, tile.ystart, tile.xstart, tile.ystart, new_xmag, new_ymag);
                self.compute_priority(&mut child, &frag);
                ctx.pool.push_child(child);
                image.set_fragment(&frag);
            } else {
                for y in (tile.ystart..tile.yend).step_by(ys as usize) {
                    for x in (tile.xstart..tile.xend).step_by(xs as usize) {
                        let xend = (x + xs).min(tile.xend);
                        let yend = (y + ys).min(tile.yend);
                        let mut frag = Fragment::covering(x, y, xend, yend, 1, 1);
                        sampler.render_fragment(renderer, &mut frag, &mut ctx.rng);
                        if self.config.show_time {
                            frag.fill(Color::splat(self.epoch.elapsed().as_secs_f32() / 60.0));
                        }

                        let mut child = Tile::new(x, y, xend, yend, new_xmag, new_ymag);
                        self.compute_priority(&mut child, &frag);
                        ctx.pool.push_child(child);
                        image.set_fragment(&frag);
                    }
                }
            }
        } else {
            let xmag = new_xmag as u32;
            let ymag = new_ymag as u32;
            let xs = xpacket * xmag;
            let ys = ypacket * ymag;
            for y in (tile.ystart..tile.yend).step_by(ys as usize) {
                for x in (tile.xstart..tile.xend).step_by(xs as usize) {
                    let xend = (x + xs).min(tile.xend);
                    let yend = (y + ys).min(tile.yend);
                    let mut frag = Fragment::covering(x, y, xend, yend, xmag, ymag);
                    self.samplers.single().render_fragment(renderer, &mut frag, &mut ctx.rng);

                    let mut child = Tile::new(x, y, xend, yend, new_xmag, new_ymag);
                    self.compute_priority(&mut child, &frag);
                    ctx.pool.push_child(child);
                    image.set_fragment(&frag);
                }
            }
        }

        let children = ctx.pool.children();
        for child in children {
            self.queue.push(*child, child.priority, ctx.proc());
        }
        Ok(Refined::Children(children.len()))
    }

    /// Priority of a freshly shaded tile under the configured scheme. Tiles
    /// outside an enabled render region get zero.
    pub fn compute_priority(&self, tile: &mut Tile, frag: &Fragment) {
        if self.use_render_region && !self.render_region.contains_tile(tile) {
            tile.priority = 0.0;
            return;
        }
        tile.priority = match self.config.priority {
            PriorityScheme::LuminanceVariance => luminance_priority(tile, frag),
            PriorityScheme::Contrast => contrast_priority(tile, frag),
            PriorityScheme::Fifo => tile.area(),
            PriorityScheme::FifoToLuminance => {
                let cutoff = self.config.fifo_cutoff;
                if tile.xmag < cutoff || tile.ymag < cutoff {
                    luminance_priority(tile, frag)
                } else {
                    tile.area()
                }
            }
            PriorityScheme::Center => self.center_priority(tile),
        };
    }

    fn center_priority(&self, tile: &Tile) -> f32 {
        let (tx, ty) = tile.center();
        let dx = (tx - self.render_region.xcenter as i64) as f32;
        let dy = (ty - self.render_region.ycenter as i64) as f32;
        let dist = (dx * dx + dy * dy).sqrt().max(1.0);
        tile.area() / dist
    }
}

fn luminance_priority(tile: &Tile, frag: &Fragment) -> f32 {
    frag.luminance_variance() * tile.area()
}

fn contrast_priority(tile: &Tile, frag: &Fragment) -> f32 {
    if frag.is_empty() {
        return 0.0;
    }
    let (min, max) = frag.luminance_range();
    if max + min <= 0.0 {
        return 0.0;
    }
    (max - min) / (max + min) * tile.area()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brisk_accel::RayPacket;
    use brisk_math::{Ray, Vec3};

    /// Black left of `edge`, white right of it.
    struct Edge {
        edge: f32,
    }

    impl FragmentRenderer for Edge {
        fn primary_ray(&self, x: f32, y: f32) -> Ray {
            Ray::new(Vec3::new(x, y, 0.0), Vec3::Z)
        }

        fn shade(&self, rays: &mut RayPacket, colors: &mut [Color]) {
            for i in rays.range() {
                colors[i] = if rays.origin(i).x > self.edge { Color::ONE } else { Color::ZERO };
            }
        }
    }

    fn traverser(args: &[&str], size: u32, workers: usize) -> (DeadlineImageTraverser, Vec<WorkerContext>) {
        let mut traverser = DeadlineImageTraverser::from_args(args).unwrap();
        traverser.setup_display(size, size, workers).unwrap();
        (traverser, WorkerContext::spawn_all(workers, 1).unwrap())
    }

    #[test]
    fn test_coarse_pass_queues_every_tile() {
        let (mut traverser, mut workers) = traverser(&["-packetsize", "4x4", "-magnification", "2x2"], 64, 1);
        let image = ImageBuffer::new(64, 64);
        assert_eq!(traverser.phase(), Phase::CoarsePass);

        traverser.begin_frame(&mut workers);
        let count = traverser.render_coarse(&mut workers[0], &Edge { edge: 20.0 }, &image);
        assert_eq!(count, 64);
        assert!(traverser.finished_coarse());
        assert_eq!(traverser.phase(), Phase::Refining);
        assert_eq!(traverser.queued_tiles(), 64);
        assert_eq!(workers[0].pool.issued(), 64);
    }

    #[test]
    fn test_edge_tiles_outrank_flat_tiles() {
        let (traverser, _) = traverser(&[], 64, 1);
        let mut flat = Fragment::covering(0, 0, 4, 4, 1, 1);
        flat.fill(Color::splat(0.5));
        let mut edge = flat.clone();
        for i in 0..edge.len() {
            if edge.pixel(i).0 >= 2 {
                edge.set_color(i, Color::ONE);
            }
        }

        let mut flat_tile = Tile::new(0, 0, 4, 4, 2.0, 2.0);
        let mut edge_tile = flat_tile;
        traverser.compute_priority(&mut flat_tile, &flat);
        traverser.compute_priority(&mut edge_tile, &edge);
        assert_eq!(flat_tile.priority, 0.0);
        assert!(edge_tile.priority > flat_tile.priority);
    }

    #[test]
    fn test_priority_schemes() {
        let mut frag = Fragment::covering(0, 0, 2, 1, 1, 1);
        frag.set_color(0, Color::splat(0.25));
        frag.set_color(1, Color::splat(0.75));
        let tile = Tile::new(0, 0, 16, 16, 4.0, 4.0);

        let priority = |args: &[&str]| {
            let (traverser, _) = traverser(args, 64, 1);
            let mut tile = tile;
            traverser.compute_priority(&mut tile, &frag);
            tile.priority
        };

        assert_eq!(priority(&["-priority", "FIFO"]), 16.0);
        assert!((priority(&["-priority", "contrast"]) - 0.5 * 16.0).abs() < 1e-5);
        assert!((priority(&["-priority", "luminancevariance"]) - 0.0625 * 16.0).abs() < 1e-4);
        // Above the cutoff the hybrid behaves like FIFO.
        assert_eq!(priority(&["-priority", "FIFOluminance"]), 16.0);
        // Tile center (8, 8), image center (32, 32).
        let expected = 16.0 / (24.0f32 * 24.0 * 2.0).sqrt();
        assert!((priority(&["-priority", "center"]) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_render_region_zeroes_outside() {
        let (mut traverser, _) = traverser(&["-priority", "FIFO"], 64, 1);
        traverser.set_render_region(0, 0, 32, 32).unwrap();
        traverser.use_render_region(true);

        let frag = Fragment::covering(0, 0, 1, 1, 1, 1);
        let mut inside = Tile::new(0, 0, 32, 32, 2.0, 2.0);
        let mut straddling = Tile::new(16, 16, 48, 48, 2.0, 2.0);
        traverser.compute_priority(&mut inside, &frag);
        traverser.compute_priority(&mut straddling, &frag);
        assert_eq!(inside.priority, 4.0);
        assert_eq!(straddling.priority, 0.0);

        assert!(matches!(
            traverser.set_render_region(0, 0, 65, 10),
            Err(ConfigError::InvalidRenderRegion { .. })
        ));
    }

    #[test]
    fn test_too_many_workers() {
        let mut traverser = DeadlineImageTraverser::new(DeadlineConfig::default());
        assert_eq!(
            traverser.setup_display(64, 64, MAX_WORKERS + 1),
            Err(ConfigError::TooManyWorkers { requested: 33, max: 32 })
        );
    }

    #[test]
    fn test_refinement_splits_by_ratio() {
        let (mut traverser, mut workers) =
            traverser(&["-packetsize", "4x4", "-magnification", "4x4", "-priority", "FIFO"], 16, 1);
        let image = ImageBuffer::new(16, 16);
        let renderer = Edge { edge: 8.0 };
        traverser.begin_frame(&mut workers);
        assert_eq!(traverser.render_coarse(&mut workers[0], &renderer, &image), 1);

        let tile = traverser.queue.pop(0).unwrap();
        assert_eq!((tile.xend, tile.yend, tile.xmag), (16, 16, 4.0));
        let refined = traverser.refine_tile(&mut workers[0], &renderer, &image, &tile).unwrap();
        // Magnification 2 with 4x4 packets gives 8x8 pixel children.
        assert!(matches!(refined, Refined::Children(4)));
        assert!(workers[0].pool.children().iter().all(|c| c.xmag == 2.0 && c.xend - c.xstart == 8));
        assert_eq!(traverser.queued_tiles(), 4);
    }

    #[test]
    fn test_supersampling_beyond_max_spp_is_skipped() {
        let (traverser, mut workers) = traverser(&["-max_spp", "4"], 8, 1);
        let image = ImageBuffer::new(8, 8);
        let renderer = Edge { edge: 4.0 };

        // 1 -> 1/2 needs 4 spp.
        let tile = Tile::new(0, 0, 8, 8, 1.0, 1.0);
        let refined = traverser.refine_tile(&mut workers[0], &renderer, &image, &tile).unwrap();
        assert!(matches!(refined, Refined::Children(n) if n > 0));

        // 1/2 -> 1/4 needs 16 spp.
        let tile = Tile::new(0, 0, 4, 4, 0.5, 0.5);
        let refined = traverser.refine_tile(&mut workers[0], &renderer, &image, &tile).unwrap();
        assert!(matches!(refined, Refined::Skipped));
    }

    #[test]
    fn test_single_pixel_supersampling() {
        // 8x8 packets at magnification 1/16 hold half a pixel.
        let (traverser, mut workers) = traverser(&["-max_spp", "1024"], 8, 1);
        let image = ImageBuffer::new(8, 8);
        let tile = Tile::new(3, 3, 4, 4, 0.125, 0.125);
        let refined = traverser.refine_tile(&mut workers[0], &Edge { edge: 3.5 }, &image, &tile).unwrap();
        assert!(matches!(refined, Refined::Children(1)));
        let child = workers[0].pool.children()[0];
        assert_eq!((child.xstart, child.xend), (3, 3));
        assert!((image.get(3, 3).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_non_square_refinement_fails() {
        let config = DeadlineConfig::from_args(&["-packetsize", "8x2", "-max_spp", "16384"]).unwrap();
        let mut traverser = DeadlineImageTraverser::new(config);
        traverser.setup_display(8, 8, 1).unwrap();
        let mut workers = WorkerContext::spawn_all(1, 0).unwrap();
        let image = ImageBuffer::new(8, 8);

        // 2 * 1/4 rounds to 0 rows but 8 * 1/4 gives 2 columns.
        let tile = Tile::new(0, 0, 8, 8, 0.5, 0.5);
        assert_eq!(
            traverser
                .refine_tile(&mut workers[0], &Edge { edge: 0.0 }, &image, &tile)
                .err(),
            Some(RenderError::NonSquareSupersample { columns: 2, rows: 0 })
        );
    }
}
