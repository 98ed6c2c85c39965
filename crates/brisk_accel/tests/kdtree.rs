use std::sync::atomic::{AtomicUsize, Ordering};

use brisk_accel::{
    ClippableView, KdTree, KdTreeConfig, Material, Node, PacketFlags, PrimitiveGroup, PrimitiveSet, RayPacket,
    Sphere, TriangleMesh,
};
use brisk_math::{Aabb, Interval, Ray, Vec3, T_EPSILON};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_point(rng: &mut StdRng, lo: f32, hi: f32) -> Vec3 {
    Vec3::new(rng.gen_range(lo..hi), rng.gen_range(lo..hi), rng.gen_range(lo..hi))
}

fn random_direction(rng: &mut StdRng) -> Vec3 {
    loop {
        let d = random_point(rng, -1.0, 1.0);
        if d.length_squared() > 0.01 {
            return d.normalize();
        }
    }
}

fn random_soup(seed: u64, count: usize) -> TriangleMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mesh = TriangleMesh::new();
    let m = mesh.add_material(Material::default());
    for _ in 0..count {
        let a = random_point(&mut rng, 0.0, 10.0);
        let b = a + random_point(&mut rng, -1.0, 1.0);
        let c = a + random_point(&mut rng, -1.0, 1.0);
        mesh.add_triangle(a, b, c, m);
    }
    mesh
}

/// Closest hit distance by testing every primitive.
fn brute_force(set: &dyn PrimitiveSet, ray: Ray) -> Option<f32> {
    let mut packet = RayPacket::from_rays(&[ray], f32::MAX, PacketFlags::default());
    for id in 0..set.len() {
        set.intersect(id, &mut packet);
    }
    packet.hit(0).map(|h| h.t)
}

fn temp_path(name: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("brisk-{name}-{}-{nanos}.bkdt", std::process::id()))
}

/// Delegating set that counts intersection calls.
struct Counting<'a> {
    inner: &'a TriangleMesh,
    calls: AtomicUsize,
}

impl PrimitiveSet for Counting<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn primitive_bounds(&self, id: usize) -> Aabb {
        self.inner.primitive_bounds(id)
    }

    fn intersect(&self, id: usize, rays: &mut RayPacket) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.intersect(id, rays);
    }

    fn normal(&self, id: usize, point: Vec3) -> Vec3 {
        self.inner.normal(id, point)
    }

    fn material(&self, id: usize) -> Material {
        self.inner.material(id)
    }

    fn as_clippable(&self) -> Option<&dyn ClippableView> {
        self.inner.as_clippable()
    }
}

#[test]
fn closest_hit_matches_brute_force() {
    init();
    let mesh = random_soup(7, 400);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());
    let mut rng = StdRng::seed_from_u64(11);

    let mut hits = 0;
    for _ in 0..1000 {
        // Aim through the soup so most rays have something to find.
        let origin = random_point(&mut rng, -5.0, 15.0);
        let target = random_point(&mut rng, 0.0, 10.0);
        let ray = Ray::new(origin, (target - origin).normalize_or_zero());
        let expected = brute_force(&mesh, ray);
        let actual = tree.closest_hit(&mesh, ray, f32::MAX).map(|h| h.t);
        match (expected, actual) {
            (Some(e), Some(a)) => {
                assert!((e - a).abs() < 1e-4, "expected {e}, got {a}");
                hits += 1;
            }
            (None, None) => {}
            other => panic!("hit mismatch for {ray:?}: {other:?}"),
        }
    }
    assert!(hits > 100, "only {hits} rays hit the soup");
}

#[test]
fn two_boxes_match_brute_force_ids() {
    init();
    let mut mesh = TriangleMesh::new();
    let m = mesh.add_material(Material::default());
    mesh.add_box(Vec3::new(-3.0, -1.0, -1.0), Vec3::new(-1.0, 1.0, 1.0), m);
    mesh.add_box(Vec3::new(1.0, -0.5, -0.5), Vec3::new(2.0, 0.5, 0.5), m);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());
    let mut rng = StdRng::seed_from_u64(17);

    for _ in 0..500 {
        let ray = Ray::new(random_point(&mut rng, -6.0, 6.0), random_direction(&mut rng));
        let mut packet = RayPacket::from_rays(&[ray], f32::MAX, PacketFlags::default());
        for id in 0..mesh.len() {
            mesh.intersect(id, &mut packet);
        }
        let expected = packet.hit(0);
        let actual = tree.closest_hit(&mesh, ray, f32::MAX);
        match (expected, actual) {
            (Some(e), Some(a)) => {
                assert_eq!(e.primitive, a.primitive, "{ray:?}");
                assert_eq!(e.t, a.t);
            }
            (None, None) => {}
            other => panic!("hit mismatch for {ray:?}: {other:?}"),
        }
    }
}

/// Axis-aligned rays whose origins lie on the box faces, so they run inside
/// the planes the builder splits on.
fn face_rays() -> Vec<Ray> {
    let mut rays = Vec::new();
    for x in [0.0, 0.5, 1.0, 3.0, 3.5, 4.0] {
        for y in [0.0, 0.5, 1.0] {
            rays.push(Ray::new(Vec3::new(x, y, 5.0), -Vec3::Z));
        }
    }
    for y in [0.0, 1.0] {
        for z in [0.0, 0.5, 1.0] {
            rays.push(Ray::new(Vec3::new(-5.0, y, z), Vec3::X));
            rays.push(Ray::new(Vec3::new(10.0, y, z), -Vec3::X));
        }
    }
    rays
}

#[test]
fn rays_inside_split_planes_match_brute_force() {
    init();
    let mut mesh = TriangleMesh::new();
    let m = mesh.add_material(Material::default());
    mesh.add_box(Vec3::ZERO, Vec3::ONE, m);
    mesh.add_box(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0), m);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());
    let rays = face_rays();

    // The first 18 rays share one sign pattern and take the packet path.
    let mut closest = RayPacket::from_rays(&rays, f32::MAX, PacketFlags::default());
    tree.intersect(&mesh, &mut closest);
    let mut shadow = RayPacket::from_rays(&rays, 100.0, PacketFlags::shadow());
    tree.intersect(&mesh, &mut shadow);

    for (i, ray) in rays.iter().enumerate() {
        let expected = brute_force(&mesh, *ray);
        let single = tree.closest_hit(&mesh, *ray, f32::MAX).map(|h| h.t);
        let packed = closest.hit(i).map(|h| h.t);
        assert_eq!(single, expected, "single ray {i}: {ray:?}");
        assert_eq!(packed, expected, "packet ray {i}: {ray:?}");
        assert_eq!(shadow.was_hit(i), expected.is_some(), "shadow ray {i}: {ray:?}");
    }
    // The ray down the +x face plane of the first box lands on its top edge.
    assert_eq!(brute_force(&mesh, rays[7]), Some(4.0));
}

/// Walk the tree keeping each node's bounds; check split positions, leaf
/// contents and coverage.
fn check_split_validity(tree: &KdTree, mesh: &TriangleMesh) {
    let mut seen = vec![false; mesh.len()];
    let mut stack = vec![(0usize, tree.bounds())];
    while let Some((node, bounds)) = stack.pop() {
        match tree.nodes()[node] {
            Node::Internal { axis, pos, first_child, .. } => {
                let axis = axis as usize;
                assert!(
                    bounds.min[axis] <= pos && pos <= bounds.max[axis],
                    "node {node} splits axis {axis} at {pos} outside {bounds:?}"
                );
                let child = first_child as usize;
                assert!(child > node);
                stack.push((child, bounds.lower_half(axis, pos)));
                stack.push((child + 1, bounds.upper_half(axis, pos)));
            }
            Node::Leaf { .. } => {
                for &id in tree.leaf_items(node) {
                    let prim = mesh.primitive_bounds(id as usize);
                    assert!(
                        prim.overlaps(&bounds),
                        "leaf {node} holds {id} at {prim:?} outside {bounds:?}"
                    );
                    seen[id as usize] = true;
                }
            }
        }
    }
    let lost = seen.iter().filter(|&&s| !s).count();
    assert_eq!(lost, 0, "{lost} primitives are in no leaf");
}

#[test]
fn split_validity_on_large_soup() {
    init();
    // The larger soup crosses the parallel build threshold.
    for (seed, count) in [(1, 2000), (2, 2500), (3, 5000)] {
        let mesh = random_soup(seed, count);
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        assert!(tree.nodes().len() > 1);
        check_split_validity(&tree, &mesh);
    }
}

#[test]
fn non_clippable_set_matches_brute_force() {
    init();
    let mut rng = StdRng::seed_from_u64(3);
    let mut group = PrimitiveGroup::new();
    for _ in 0..150 {
        let center = random_point(&mut rng, 0.0, 10.0);
        group.add(Sphere::new(center, rng.gen_range(0.1..0.6)), Material::default());
    }
    let tree = KdTree::build(&group, &KdTreeConfig::default());

    for _ in 0..500 {
        let ray = Ray::new(random_point(&mut rng, -5.0, 15.0), random_direction(&mut rng));
        let expected = brute_force(&group, ray);
        let actual = tree.closest_hit(&group, ray, f32::MAX).map(|h| h.t);
        match (expected, actual) {
            (Some(e), Some(a)) => assert!((e - a).abs() < 1e-4),
            (None, None) => {}
            other => panic!("hit mismatch for {ray:?}: {other:?}"),
        }
    }
}

#[test]
fn packet_traversal_matches_single_rays() {
    init();
    let mesh = random_soup(21, 300);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());
    let mut rng = StdRng::seed_from_u64(5);

    // A coherent camera-style packet and an incoherent one.
    let eye = Vec3::new(-4.0, 5.0, 5.0);
    let coherent: Vec<Ray> = (0..64)
        .map(|k| {
            let (x, y) = ((k % 8) as f32, (k / 8) as f32);
            Ray::new(eye, Vec3::new(1.0, (y - 3.5) * 0.1, (x - 3.5) * 0.1))
        })
        .collect();
    let incoherent: Vec<Ray> = (0..64)
        .map(|_| Ray::new(random_point(&mut rng, 2.0, 8.0), random_direction(&mut rng)))
        .collect();

    for rays in [coherent, incoherent] {
        let mut packet = RayPacket::from_rays(&rays, f32::MAX, PacketFlags::default());
        tree.intersect(&mesh, &mut packet);
        for (i, ray) in rays.iter().enumerate() {
            let single = tree.closest_hit(&mesh, *ray, f32::MAX).map(|h| h.t);
            let packed = packet.hit(i).map(|h| h.t);
            match (single, packed) {
                (Some(s), Some(p)) => assert!((s - p).abs() < 1e-5, "ray {i}: {s} vs {p}"),
                (None, None) => {}
                other => panic!("ray {i}: {other:?}"),
            }
        }
    }
}

#[test]
fn any_hit_stops_at_first_opaque_occluder() {
    init();
    let mut mesh = TriangleMesh::new();
    let wall = mesh.add_material(Material::default());
    for i in 1..=20 {
        mesh.add_quad(Vec3::new(i as f32, -1.0, -1.0), Vec3::Y * 2.0, Vec3::Z * 2.0, wall);
    }
    let counting = Counting {
        inner: &mesh,
        calls: AtomicUsize::new(0),
    };
    let tree = KdTree::build(&counting, &KdTreeConfig::default());

    let ray = Ray::new(Vec3::new(0.0, 0.3, -0.2), Vec3::X);
    counting.calls.store(0, Ordering::Relaxed);
    let mut packet = RayPacket::from_rays(&[ray], 100.0, PacketFlags::shadow());
    tree.intersect(&counting, &mut packet);
    assert!(packet.was_hit(0));
    let any_calls = counting.calls.load(Ordering::Relaxed);
    assert!(any_calls < mesh.len() / 2, "any-hit tested {any_calls} primitives");

    // A closest-hit query reaches the same first wall.
    let hit = tree.closest_hit(&mesh, ray, 100.0).unwrap();
    assert!((hit.t - 1.0).abs() < 1e-5);
}

#[test]
fn translucent_surfaces_attenuate_once_each() {
    init();
    let mut mesh = TriangleMesh::new();
    let glass = mesh.add_material(Material::translucent(Vec3::ONE, Vec3::splat(0.5)));
    let wall = mesh.add_material(Material::default());
    for i in 1..=3 {
        mesh.add_quad(Vec3::new(i as f32 * 2.0, -8.0, -8.0), Vec3::Y * 16.0, Vec3::Z * 16.0, glass);
    }
    // Clutter that makes the builder cut the glass panes into many leaves.
    for k in 0..16 {
        let y = -7.5 + k as f32;
        mesh.add_box(Vec3::new(0.0, y, 7.0), Vec3::new(0.2, y + 0.2, 7.2), wall);
        mesh.add_box(Vec3::new(7.0, y, -7.2), Vec3::new(7.2, y + 0.2, -7.0), wall);
    }
    mesh.add_quad(Vec3::new(9.0, -1.0, -1.0), Vec3::Y * 2.0, Vec3::Z * 2.0, wall);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());

    let ray = Ray::new(Vec3::new(0.5, -3.0, -2.0), Vec3::new(1.0, 0.4, 0.3).normalize());
    let light_distance = 6.5 / ray.direction().x;
    let through = tree.transmittance(&mesh, ray, light_distance);
    assert!((through - Vec3::splat(0.125)).length() < 1e-6, "{through:?}");

    let blocked = Ray::new(Vec3::new(0.5, 0.3, -0.2), Vec3::X);
    assert_eq!(tree.transmittance(&mesh, blocked, 20.0), Vec3::ZERO);
}

#[test]
fn transparent_hit_cap_ends_walk() {
    init();
    let mut mesh = TriangleMesh::new();
    let glass = mesh.add_material(Material::translucent(Vec3::ONE, Vec3::splat(0.9)));
    for i in 1..=10 {
        mesh.add_quad(Vec3::new(i as f32, -1.0, -1.0), Vec3::Y * 2.0, Vec3::Z * 2.0, glass);
    }
    let config = KdTreeConfig::default().with_max_transparent_hits(3);
    let tree = KdTree::build(&mesh, &config);
    let ray = Ray::new(Vec3::new(0.0, 0.3, -0.2), Vec3::X);
    let through = tree.transmittance(&mesh, ray, 100.0);
    assert!((through.x - 0.9f32.powi(3)).abs() < 1e-5, "{through:?}");
}

#[test]
fn saved_tree_answers_like_built_tree() {
    init();
    let mesh = random_soup(99, 200);
    let config = KdTreeConfig::default();
    let tree = KdTree::build(&mesh, &config);
    let path = temp_path("roundtrip");
    tree.save(&path).unwrap();
    let loaded = KdTree::load(&path, &mesh, &config).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.nodes(), tree.nodes());
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..300 {
        let ray = Ray::new(random_point(&mut rng, -5.0, 15.0), random_direction(&mut rng));
        assert_eq!(
            tree.closest_hit(&mesh, ray, f32::MAX),
            loaded.closest_hit(&mesh, ray, f32::MAX)
        );
    }
}

#[test]
fn load_or_build_recovers_from_bad_cache() {
    init();
    let mesh = random_soup(4, 50);
    let config = KdTreeConfig::default();
    let path = temp_path("cache");
    std::fs::write(&path, b"not a tree").unwrap();

    let rebuilt = KdTree::load_or_build(&path, &mesh, &config);
    assert_eq!(rebuilt.primitive_count(), mesh.len());

    // The rebuild replaced the bad file.
    let reloaded = KdTree::load(&path, &mesh, &config).unwrap();
    assert_eq!(reloaded.nodes(), rebuilt.nodes());
    std::fs::remove_file(&path).ok();
}

#[test]
fn load_or_build_rejects_cache_of_other_scene() {
    init();
    let config = KdTreeConfig::default();
    let first = random_soup(30, 120);
    let second = random_soup(31, 120);
    assert_eq!(first.len(), second.len());

    let path = temp_path("stale");
    KdTree::build(&first, &config).save(&path).unwrap();
    let tree = KdTree::load_or_build(&path, &second, &config);
    std::fs::remove_file(&path).ok();

    assert_eq!(tree.bounds(), second.bounds());
    assert_eq!(tree.nodes(), KdTree::build(&second, &config).nodes());
}

#[test]
fn max_distance_bounds_hits() {
    let mesh = random_soup(8, 100);
    let tree = KdTree::build(&mesh, &KdTreeConfig::default());
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..200 {
        let ray = Ray::new(random_point(&mut rng, 0.0, 10.0), random_direction(&mut rng));
        if let Some(hit) = tree.closest_hit(&mesh, ray, 3.0) {
            assert!(Interval::new(T_EPSILON, 3.0).surrounds(hit.t));
        }
    }
}
