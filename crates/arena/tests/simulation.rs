//! End-to-end scenarios through the public simulation and room APIs.

use std::f32::consts::PI;

use arena::command::{Command, CommandKind, PlayerInput};
use arena::config::{BoundaryPolicy, Config};
use arena::entity::{Cosmetic, Food, FoodArchetype};
use arena::sync::{Outbound, build_snapshot};
use arena::{GameResult, Registry, Room, RoomHandle, SessionEnding, Simulation, TickReport};
use glam::Vec2;
use protocol::packets::WorldSnapshot;
use protocol::{DeathCause, RejectReason};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

fn small_config() -> Config {
    let mut config = Config::default();
    config.arena.map_size = 1000.0;
    config.food.target_count = 0;
    config
}

fn simulation(config: &Config, seed: u64) -> Simulation {
    Simulation::with_seed(Registry::from_config(config).unwrap(), seed)
}

fn room(config: Config) -> (Room, RoomHandle, mpsc::UnboundedReceiver<GameResult>) {
    let registry = Registry::from_config(&config).unwrap();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let (mut room, handle) = Room::new(0, registry, Box::new(results_tx));
    room.start().unwrap();
    (room, handle, results_rx)
}

fn join(handle: &RoomHandle, player: u32) -> mpsc::Receiver<Outbound> {
    let (tx, rx) = mpsc::channel(64);
    handle.send(Command::new(
        player,
        CommandKind::Join {
            name: format!("snake{player}"),
            cosmetic: Cosmetic::default(),
            outbound: tx,
        },
    ));
    rx
}

#[test]
fn eating_scores_grows_and_removes_food() {
    let mut config = small_config();
    config.food.archetypes = vec![FoodArchetype::new(7, "big", 100, 1, 2.0, 1.0)];
    let mut sim = simulation(&config, 1);
    sim.begin_tick();
    sim.spawn_player_at(1, "eater", Cosmetic::default(), Vec2::new(500.0, 500.0), 0.0);
    let archetype = config.food.archetypes[0].clone();
    let store = sim.store_mut();
    let food = store.allocate_food_id();
    store.upsert_food(Food::from_archetype(food, Vec2::new(505.0, 500.0), &archetype));

    let report = sim.advance();
    assert_eq!(report.eaten, 1);
    let player = sim.store().player(1).unwrap();
    assert_eq!(player.score, 100);
    assert_eq!(player.segments.len(), 7);

    let snapshot = build_snapshot(sim.store(), sim.tick());
    assert!(snapshot.food.iter().all(|f| f.id != food));
    assert_eq!(snapshot.players[0].score, 100);
}

#[test]
fn full_room_rejects_join() {
    let mut config = small_config();
    config.arena.max_players = 1;
    let (mut room, handle, _results) = room(config);
    let mut first = join(&handle, 1);
    let mut second = join(&handle, 2);
    room.tick();

    assert!(matches!(first.try_recv(), Ok(Outbound::Joined { player: 1, .. })));
    assert!(matches!(
        second.try_recv(),
        Ok(Outbound::JoinRejected(RejectReason::Capacity))
    ));
    assert_eq!(room.simulation().store().player_count(), 1);
}

#[test]
fn same_seed_same_world() {
    fn replay(seed: u64) -> (Vec<TickReport>, WorldSnapshot) {
        let mut config = Config::default();
        config.arena.map_size = 1500.0;
        config.food.target_count = 300;
        let mut sim = simulation(&config, seed);
        let mut inputs = StdRng::seed_from_u64(seed ^ 0x5eed);
        sim.begin_tick();
        sim.fill_food();
        for id in 1..=6 {
            sim.spawn_player(id, "bot", Cosmetic::default());
        }

        let mut reports = Vec::new();
        for tick in 0..300u32 {
            for id in 1..=6 {
                let input = PlayerInput {
                    seq: tick,
                    heading: inputs.random::<f32>() * 2.0 * PI - PI,
                    boost: inputs.random::<f32>() < 0.2,
                };
                sim.apply_input(id, &input);
            }
            reports.push(sim.advance());
            sim.begin_tick();
            sim.purge_dead();
        }
        (reports, build_snapshot(sim.store(), sim.tick()))
    }

    let (a_reports, a) = replay(42);
    let (b_reports, b) = replay(42);
    assert_eq!(a_reports, b_reports);
    assert_eq!(a, b);
    assert!(!a.food.is_empty());
}

#[test]
fn head_on_kills_both_players() {
    let config = small_config();
    let mut sim = simulation(&config, 3);
    sim.begin_tick();
    sim.spawn_player_at(1, "east", Cosmetic::default(), Vec2::new(500.0, 500.0), 0.0);
    sim.spawn_player_at(2, "west", Cosmetic::default(), Vec2::new(510.0, 500.0), PI);

    let report = sim.advance();
    let causes: Vec<_> = report.deaths.iter().map(|d| (d.player, d.cause)).collect();
    assert_eq!(
        causes,
        vec![
            (1, DeathCause::HeadOn { other: 2 }),
            (2, DeathCause::HeadOn { other: 1 }),
        ]
    );
}

#[test]
fn everything_stays_in_bounds() {
    for policy in [BoundaryPolicy::Wall, BoundaryPolicy::Clamp] {
        let mut config = small_config();
        config.arena.map_size = 400.0;
        config.arena.boundary_policy = policy;
        config.food.target_count = 50;
        let mut sim = simulation(&config, 9);
        let bounds = sim.registry().bounds;
        let mut rng = StdRng::seed_from_u64(9);

        sim.begin_tick();
        for id in 1..=4 {
            sim.spawn_player(id, "wanderer", Cosmetic::default());
        }
        for tick in 0..400u32 {
            for id in 1..=4 {
                let input = PlayerInput {
                    seq: tick,
                    heading: rng.random::<f32>() * 2.0 * PI - PI,
                    boost: true,
                };
                sim.apply_input(id, &input);
            }
            sim.advance();
            for player in sim.store().players() {
                assert!(player.is_within(&bounds), "{:?}: player {} escaped", policy, player.id);
            }
            for food in sim.store().foods() {
                assert!(bounds.contains(food.position));
            }
            sim.begin_tick();
            sim.purge_dead();
        }
    }
}

#[test]
fn archetype_frequencies_follow_weights() {
    let mut config = Config::default();
    config.food.target_count = 5000;
    config.food.cluster_limit = 0;
    config.food.archetypes = vec![
        FoodArchetype::new(0, "common", 1, 1, 1.0, 0.6),
        FoodArchetype::new(1, "uncommon", 2, 1, 1.0, 0.3),
        FoodArchetype::new(2, "rare", 5, 2, 1.0, 0.1),
    ];
    let mut sim = simulation(&config, 17);
    sim.begin_tick();
    assert_eq!(sim.fill_food(), 5000);

    let mut counts = [0usize; 3];
    for food in sim.store().foods() {
        counts[usize::from(food.kind)] += 1;
    }
    for (count, expected) in counts.iter().zip([0.6, 0.3, 0.1]) {
        let share = *count as f64 / 5000.0;
        assert!((share - expected).abs() < 0.03, "share {share} vs {expected}");
    }
}

#[test]
fn removing_twice_is_harmless() {
    let config = small_config();
    let mut sim = simulation(&config, 5);
    sim.begin_tick();
    sim.spawn_player_at(1, "gone", Cosmetic::default(), Vec2::new(300.0, 300.0), 0.0);
    sim.begin_tick();
    assert!(sim.remove_player(1).is_some());
    assert!(sim.remove_player(1).is_none());
    assert_eq!(sim.store().removed_since(0).count(), 1);
    assert_eq!(sim.store().player_count(), 0);
}

#[test]
fn corrupted_player_dies_with_fault() {
    let (mut room, handle, mut results) = room(small_config());
    let mut rx = join(&handle, 1);
    room.tick();

    room.simulation_mut()
        .store_mut()
        .player_mut(1)
        .unwrap()
        .position = Vec2::new(f32::NAN, 10.0);
    room.tick();

    let result = results.try_recv().unwrap();
    assert_eq!(result.ending, SessionEnding::Died(DeathCause::Fault));
    assert!(room.simulation().store().player(1).is_none());

    let mut died = false;
    while let Ok(msg) = rx.try_recv() {
        died |= matches!(msg, Outbound::PlayerDied { player: 1, cause: DeathCause::Fault, .. });
    }
    assert!(died);
}

#[test]
fn non_finite_input_is_rejected() {
    let (mut room, handle, _results) = room(small_config());
    let _rx = join(&handle, 1);
    room.tick();
    let before = room.simulation().store().player(1).unwrap().target_heading;

    let input = PlayerInput {
        seq: 1,
        heading: f32::INFINITY,
        boost: false,
    };
    handle.send(Command::new(1, CommandKind::Input(input)));
    room.tick();

    assert_eq!(room.synchronizer().link(1).unwrap().strikes, 1);
    let player = room.simulation().store().player(1).unwrap();
    assert_eq!(player.target_heading, before);
    assert!(player.heading.is_finite());
}
