use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use world_bsp::{bsp::Triangle, frustum::Frustum, math::Vec3f, World, WorldConfig};

fn random_soup(rng: &mut impl Rng, count: usize) -> Vec<Triangle> {
    let mut point = || Vec3f::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));

    (0..count)
        .map(|_| Triangle::from_positions(point(), point(), point()))
        .collect()
}

fn bsp_benchmark_fn(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let triangles = random_soup(&mut rng, 24);

    let mut group = c.benchmark_group("WorldOperations");
    group.sample_size(10);

    group.bench_function("build_24_triangles", |b| {
        b.iter(|| World::from_triangles(black_box(&triangles), WorldConfig::default()))
    });

    let Ok(mut world) = World::from_triangles(&triangles, WorldConfig::default()) else {
        group.finish();
        return;
    };

    let eye = Vec3f::new(0.0, 0.0, 0.0);
    let directions = [
        Vec3f::new(1.0, 0.0, 0.0),
        Vec3f::new(-1.0, 0.0, 0.0),
        Vec3f::new(0.0, 1.0, 0.0),
        Vec3f::new(0.0, -1.0, 0.0),
    ];
    let frustums = directions
        .map(|direction| Frustum::perspective(eye, direction, Vec3f::new(0.0, 0.0, 1.0), 1.2, 1.0, 0.1, 200.0));

    group.bench_function("visibility_and_render", |b| {
        let mut frustum_iter = frustums.iter().cycle();
        let mut draws = Vec::new();

        b.iter(|| {
            let Some(frustum) = frustum_iter.next() else {
                return;
            };

            draws.clear();
            world.render_frame(black_box(eye), frustum, &mut draws);
        })
    });
    group.finish();
}

criterion_group!(benches, bsp_benchmark_fn);
criterion_main!(benches);
