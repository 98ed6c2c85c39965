//! Headless benchmark: renders a procedural scene with the deadline
//! traverser for a fixed number of frames.
//!
//! ```text
//! brisk_bench [--frames N] [--size WxH] [--workers N] [--cache PATH] [traverser args...]
//! ```
//!
//! Anything not recognised here is handed to the traverser, e.g.
//! `-framerate 30 -priority contrast -max_spp 256`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use brisk_accel::{KdTree, KdTreeConfig, Material, SharedKdTree, TriangleMesh};
use brisk_math::Vec3;
use brisk_renderer::{
    Camera, Color, DeadlineImageTraverser, FrameStats, ImageBuffer, Phase, PointLight, SceneRenderer, WorkerContext,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Options {
    frames: usize,
    width: u32,
    height: u32,
    workers: usize,
    cache: PathBuf,
    traverser_args: Vec<String>,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Options {
            frames: 60,
            width: 512,
            height: 512,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()).min(brisk_renderer::MAX_WORKERS),
            cache: std::env::temp_dir().join("brisk_bench.kdtree"),
            traverser_args: Vec::new(),
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => options.frames = next_value(&mut args, &arg)?.parse()?,
                "--workers" => options.workers = next_value(&mut args, &arg)?.parse()?,
                "--cache" => options.cache = next_value(&mut args, &arg)?.into(),
                "--size" => {
                    let value = next_value(&mut args, &arg)?;
                    let (w, h) = value
                        .split_once('x')
                        .with_context(|| format!("--size expects WxH, got '{value}'"))?;
                    options.width = w.parse()?;
                    options.height = h.parse()?;
                }
                _ => options.traverser_args.push(arg),
            }
        }
        if options.workers == 0 {
            bail!("--workers must be at least 1");
        }
        Ok(options)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().with_context(|| format!("{flag} expects a value"))
}

/// A floor covered in a grid of boxes of random height, plus a tinted
/// glass pane that casts a colored shadow.
fn build_scene(seed: u64) -> TriangleMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mesh = TriangleMesh::new();

    let floor = mesh.add_material(Material::opaque(Color::splat(0.8)));
    mesh.add_quad(Vec3::new(-20.0, 0.0, 20.0), Vec3::X * 40.0, -Vec3::Z * 40.0, floor);

    let palette: Vec<u32> = (0..6)
        .map(|_| mesh.add_material(Material::opaque(Color::new(rng.gen(), rng.gen(), rng.gen()))))
        .collect();
    for i in -6..=6 {
        for j in -6..=6 {
            if rng.gen::<f32>() < 0.4 {
                continue;
            }
            let center = Vec3::new(i as f32 * 1.5, 0.0, j as f32 * 1.5);
            let half = rng.gen_range(0.2..0.6);
            let height = rng.gen_range(0.3..3.0);
            let material = palette[rng.gen_range(0..palette.len())];
            mesh.add_box(
                center - Vec3::new(half, 0.0, half),
                center + Vec3::new(half, height, half),
                material,
            );
        }
    }

    let glass = mesh.add_material(Material::translucent(
        Color::new(0.1, 0.2, 0.3),
        Color::new(0.2, 0.6, 0.9),
    ));
    mesh.add_quad(Vec3::new(-4.0, 4.0, 4.0), Vec3::X * 8.0, -Vec3::Z * 8.0, glass);
    mesh
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let options = Options::parse(std::env::args().skip(1))?;
    let mesh = build_scene(7);
    log::info!("Scene: {} triangles", mesh.triangle_count());

    let config = KdTreeConfig::default();
    let start = Instant::now();
    let tree = KdTree::load_or_build(&options.cache, &mesh, &config);
    log::info!("KD-tree ready in {:.3}s\n{}", start.elapsed().as_secs_f64(), tree.stats());

    let camera = Camera::new()
        .with_resolution(options.width, options.height)
        .with_position(Vec3::new(0.0, 9.0, 16.0), Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
        .with_fov(45.0);
    let light = PointLight {
        position: Vec3::new(6.0, 14.0, 8.0),
        color: Color::splat(0.9),
    };
    let renderer = SceneRenderer::new(camera, Arc::new(mesh), SharedKdTree::new(tree), light);

    let mut traverser = DeadlineImageTraverser::from_args(&options.traverser_args)?;
    traverser.setup_display(options.width, options.height, options.workers)?;
    let mut workers = WorkerContext::spawn_all(options.workers, 0x5eed)?;
    let image = ImageBuffer::new(options.width, options.height);

    let mut total = FrameStats::default();
    let start = Instant::now();
    for frame in 0..options.frames {
        let stats = traverser.render_frame(&mut workers, &renderer, &image)?;
        log::debug!("Frame {frame}: {stats:?}");
        total += stats;
        if traverser.phase() == Phase::Converged {
            log::info!("Converged after {} frames", frame + 1);
            break;
        }
    }

    log::info!(
        "Rendered for {:.3}s: {} coarse tiles, {} refined, {} skipped, {} still queued",
        start.elapsed().as_secs_f64(),
        total.coarse_tiles,
        total.refined_tiles,
        total.skipped_tiles,
        traverser.queued_tiles()
    );
    if let Some(time) = traverser.convergence_time() {
        log::info!("Convergence time: {:.3}s", time.as_secs_f64());
    }

    let rgba = image.to_rgba();
    let lit = rgba.chunks_exact(4).filter(|px| px[..3].iter().any(|&c| c > 0)).count();
    log::info!("{} of {} pixels non-black", lit, rgba.len() / 4);
    Ok(())
}
