use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use zenecs::prelude::*;

#[derive(Clone, Default, Debug, serde::Serialize, serde::Deserialize)]
struct Position(f32, f32, f32);
impl Component for Position {}

#[derive(Clone, Default, Debug, serde::Serialize, serde::Deserialize)]
struct Velocity(f32, f32, f32);
impl Component for Velocity {}

const N: u32 = 10_000;

fn populated_world() -> (World, Vec<Entity>) {
    let mut rng = rand::thread_rng();
    let mut world = World::new(WorldConfig::default());
    world.register_component::<Position>();
    world.register_component::<Velocity>();

    let mut entities = Vec::with_capacity(N as usize);
    let mut cb = world.begin_write();
    for i in 0..N {
        let e = cb.create_entity();
        cb.add_component(e, Position(rng.gen(), rng.gen(), rng.gen()));
        if i % 2 == 0 {
            cb.add_component(e, Velocity(1.0, 0.0, 0.0));
        }
        entities.push(e);
    }
    cb.end_write().unwrap();
    (world, entities)
}

fn create_destroy(c: &mut Criterion) {
    c.bench_function("create_then_destroy_entity", |b| {
        let mut world = World::new(WorldConfig::default());
        b.iter(|| {
            let mut cb = world.begin_write();
            let e = cb.create_entity();
            cb.destroy_entity(e);
            cb.end_write().unwrap();
            black_box(e);
        });
    });
}

fn query_two_component_arity(c: &mut Criterion) {
    let (mut world, _entities) = populated_world();
    c.bench_function("query_position_velocity", |b| {
        b.iter(|| {
            let count = world.query::<(Position, Velocity)>(None).count();
            black_box(count);
        });
    });
}

fn filtered_query(c: &mut Criterion) {
    let (mut world, _entities) = populated_world();
    let filter = Filter::new().with_all::<Position>().without_all::<Velocity>();
    c.bench_function("query_position_without_velocity", |b| {
        b.iter(|| {
            let count = world.query::<(Position,)>(Some(filter.clone())).count();
            black_box(count);
        });
    });
}

fn snapshot_round_trip(c: &mut Criterion) {
    let (mut world, _entities) = populated_world();
    world.register_formatter::<Position>();
    world.register_formatter::<Velocity>();

    c.bench_function("snapshot_save_full", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            world.save_full(&mut buf).unwrap();
            black_box(buf);
        });
    });
}

criterion_group!(benches, create_destroy, query_two_component_arity, filtered_query, snapshot_round_trip);
criterion_main!(benches);
