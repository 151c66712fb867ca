use criterion::{criterion_group, criterion_main, Criterion, black_box};

use voxtree::core::VolumeConfig;
use voxtree::math::Region;
use voxtree::octree::Octree;
use voxtree::streaming::{compress_chunk, decompress_chunk, ChunkStore, PagedGrid, VOXELS_PER_CHUNK};
use voxtree::voxel::{Color, MaterialSet, OctreeBounds, Voxel};
use voxtree::Volume;

use glam::{IVec3, Vec3};

/// Rolling hills of coloured voxels
fn fill_hills(volume: &mut Volume<Color>) {
    let region = *volume.enclosing_region();
    for p in region.iter() {
        let ground = 8.0 + 4.0 * ((p.x as f32 * 0.2).sin() + (p.z as f32 * 0.15).cos());
        if (p.y as f32) < ground {
            volume.set_voxel(p, Color::rgb(80, 160, 60), false).unwrap();
        }
    }
    volume.mark_as_modified(&region);
}

fn bench_octree_build_512(c: &mut Criterion) {
    let region = Region::from_coords(0, 0, 0, 511, 127, 511);

    c.bench_function("octree_build_512", |b| {
        b.iter(|| Octree::<Color>::new(black_box(&region), OctreeBounds::BoundVoxels, 32).unwrap());
    });
}

fn bench_chunk_compress(c: &mut Criterion) {
    let mut voxels = vec![Color::default(); VOXELS_PER_CHUNK];
    for (i, v) in voxels.iter_mut().enumerate().filter(|(i, _)| i % 3 == 0) {
        *v = Color::rgb((i % 256) as u8, 100, 50);
    }
    let bytes: &[u8] = bytemuck::cast_slice(&voxels);

    c.bench_function("chunk_compress", |b| {
        b.iter(|| compress_chunk(black_box(bytes)));
    });

    let blob = compress_chunk(bytes);
    c.bench_function("chunk_decompress", |b| {
        b.iter(|| decompress_chunk(black_box(&blob), Color::chunk_byte_size()).unwrap());
    });
}

fn bench_paged_grid_writes(c: &mut Criterion) {
    c.bench_function("paged_grid_write_64k", |b| {
        b.iter(|| {
            let mut grid = PagedGrid::<Color, _>::new(ChunkStore::in_memory(), 16 * 1024 * 1024);
            for p in Region::from_coords(0, 0, 0, 63, 15, 63).iter() {
                grid.set_voxel(p, Color::rgb(255, 255, 255)).unwrap();
            }
            grid.flush_all().unwrap();
            black_box(grid.pager().override_chunk_count());
        });
    });
}

fn bench_paged_grid_eviction(c: &mut Criterion) {
    // Budget for two chunks, walk across eight
    let budget = 2 * Color::chunk_byte_size();

    c.bench_function("paged_grid_eviction", |b| {
        b.iter(|| {
            let mut grid = PagedGrid::<Color, _>::new(ChunkStore::in_memory(), budget);
            for x in 0..8 {
                grid.set_voxel(IVec3::new(x * 32, 0, 0), Color::rgb(1, 2, 3)).unwrap();
            }
            black_box(grid.resident_chunk_count());
        });
    });
}

fn bench_volume_update_colored(c: &mut Criterion) {
    let region = Region::from_coords(0, 0, 0, 127, 31, 127);

    c.bench_function("volume_update_colored_128", |b| {
        b.iter(|| {
            let mut volume = Volume::<Color>::new(region, "", VolumeConfig::default()).unwrap();
            fill_hills(&mut volume);
            while !volume.update(black_box(Vec3::new(64.0, 48.0, 64.0)), 1.0).unwrap() {}
        });
    });
}

fn bench_volume_update_batched(c: &mut Criterion) {
    let region = Region::from_coords(0, 0, 0, 127, 31, 127);
    let config = VolumeConfig { background_tasks_per_update: 8, ..Default::default() };

    c.bench_function("volume_update_colored_128_batch8", |b| {
        b.iter(|| {
            let mut volume = Volume::<Color>::new(region, "", config.clone()).unwrap();
            fill_hills(&mut volume);
            while !volume.update(black_box(Vec3::new(64.0, 48.0, 64.0)), 1.0).unwrap() {}
        });
    });
}

fn bench_volume_update_terrain(c: &mut Criterion) {
    let region = Region::from_coords(0, 0, 0, 63, 31, 63);
    let mut rock = MaterialSet::default();
    rock.set_material(1, 255);

    c.bench_function("volume_update_terrain_64", |b| {
        b.iter(|| {
            let mut volume = Volume::<MaterialSet>::new(region, "", VolumeConfig::default()).unwrap();
            for p in Region::from_coords(0, 0, 0, 63, 10, 63).iter() {
                volume.set_voxel(p, rock, true).unwrap();
            }
            while !volume.update(black_box(Vec3::new(32.0, 40.0, 32.0)), 1.0).unwrap() {}
        });
    });
}

criterion_group!(
    benches,
    bench_octree_build_512,
    bench_chunk_compress,
    bench_paged_grid_writes,
    bench_paged_grid_eviction,
    bench_volume_update_colored,
    bench_volume_update_batched,
    bench_volume_update_terrain,
);
criterion_main!(benches);
