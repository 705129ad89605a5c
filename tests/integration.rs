use zenecs::prelude::*;
use zenecs::{Bucket, FixedRun, SystemKind};

#[derive(Clone, Default, Debug, PartialEq)]
struct Tag;
impl Component for Tag {}

#[derive(Clone, Default, Debug, PartialEq)]
struct A;
impl Component for A {}

#[derive(Clone, Default, Debug, PartialEq)]
struct B;
impl Component for B {}

#[derive(Clone, Default, Debug, PartialEq)]
struct C;
impl Component for C {}

#[derive(Clone, Default, Debug, PartialEq)]
struct Secret;
impl Component for Secret {}

#[derive(Clone, Default, Debug, PartialEq)]
struct Position(f32, f32);
impl Component for Position {}

#[test]
fn create_destroy_recycles_id_and_bumps_generation() {
    let mut world = World::new(WorldConfig::default());

    let e1 = {
        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.end_write().unwrap();
        e
    };
    assert_eq!(e1.generation(), 0);

    {
        let mut cb = world.begin_write();
        cb.destroy_entity(e1);
        cb.end_write().unwrap();
    }
    assert!(!world.is_alive(e1));

    let e2 = {
        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.end_write().unwrap();
        e
    };
    assert_eq!(e2.id(), e1.id());
    assert_eq!(e2.generation(), 1);
    assert!(!world.is_alive(e1));
    assert!(world.is_alive(e2));
}

/// Entities E1{A,B}, E2{A,C}, E3{B,C}, every entity also carrying a shared `Tag` so a single
/// required query type can drive iteration while the filter narrows the candidate set.
#[test]
fn filter_semantics_match_worked_example() {
    let mut world = World::new(WorldConfig::default());
    world.register_component::<Tag>();
    world.register_component::<A>();
    world.register_component::<B>();
    world.register_component::<C>();

    let (e1, e2, e3) = {
        let mut cb = world.begin_write();
        let e1 = cb.create_entity();
        cb.add_component(e1, Tag);
        cb.add_component(e1, A);
        cb.add_component(e1, B);

        let e2 = cb.create_entity();
        cb.add_component(e2, Tag);
        cb.add_component(e2, A);
        cb.add_component(e2, C);

        let e3 = cb.create_entity();
        cb.add_component(e3, Tag);
        cb.add_component(e3, B);
        cb.add_component(e3, C);

        cb.end_write().unwrap();
        (e1, e2, e3)
    };

    // with_all=[A], without_all=[C] -> only E1
    let f = Filter::new().with_all::<A>().without_all::<C>();
    let found: Vec<Entity> = world.query::<(Tag,)>(Some(f)).map(|(e, _)| e).collect();
    assert_eq!(found, vec![e1]);

    // with_any=[[B, C]] -> all three
    let bucket = Bucket::new().term::<B>().term::<C>();
    let f = Filter::new().with_any(bucket.clone());
    let mut found: Vec<Entity> = world.query::<(Tag,)>(Some(f)).map(|(e, _)| e).collect();
    found.sort_by_key(|e| e.id());
    let mut expected = vec![e1, e2, e3];
    expected.sort_by_key(|e| e.id());
    assert_eq!(found, expected);

    // with_all=[A], with_any=[[B, C]] -> E1, E2
    let f = Filter::new().with_all::<A>().with_any(bucket);
    let mut found: Vec<Entity> = world.query::<(Tag,)>(Some(f)).map(|(e, _)| e).collect();
    found.sort_by_key(|e| e.id());
    let mut expected = vec![e1, e2];
    expected.sort_by_key(|e| e.id());
    assert_eq!(found, expected);
}

#[test]
fn write_denial_under_log_policy_drops_the_operation_without_throwing() {
    // `WorldConfig` carries no failure policy (that's a kernel-wide option); `World::new` takes
    // the default `KernelOptions`, whose default failure policy is already `Log`.
    let mut world = World::new(WorldConfig::default());
    world.register_component::<Secret>();
    world.register_write_permission(|_entity, type_id| type_id != std::any::TypeId::of::<Secret>());

    let entity = {
        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.add_component(e, Secret);
        cb.end_write().unwrap();
        e
    };

    assert!(!world.has::<Secret>(entity));
}

struct Gravity;
impl FixedRun for Gravity {
    fn run(&mut self, world: &mut World, fixed_dt: f32) {
        let falling: Vec<(Entity, Position)> = world.query::<(Position,)>(None).map(|(e, (p,))| (e, p)).collect();
        let mut cb = world.begin_write();
        for (e, pos) in falling {
            cb.replace_component(e, Position(pos.0, pos.1 - fixed_dt));
        }
        cb.end_write().unwrap();
    }
}

#[test]
fn kernel_drives_fixed_step_systems_across_frames() {
    let mut kernel = Kernel::new(KernelOptions::default());
    let id = kernel.create_world(None, Some("sim".to_string()), vec![], true).unwrap();

    let entity = {
        let world = kernel.current_mut().unwrap();
        world.register_component::<Position>();
        world.add_system("gravity", SystemKind::FixedRun(Box::new(Gravity)), vec![]);

        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.add_component(e, Position(0.0, 10.0));
        cb.end_write().unwrap();
        e
    };

    for _ in 0..5 {
        kernel.pump_and_late_frame(1.0 / 60.0, 1.0 / 60.0, 4);
    }

    let world = kernel.find_world_by_id(id).unwrap();
    assert!(world.tick() > 0);
    assert!(world.read::<Position>(entity).unwrap().1 < 0.0);
}
