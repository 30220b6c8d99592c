//! End-to-end scenarios against the public API: seeded full runs,
//! barrier geometry, and reporter wiring.

use allopatry_core::{
    Agent, BarrierOrientation, BatchReport, Coord, Genome, NullReporter, Reporter, Tick, World,
    WorldConfig, ACTION_GENES, TRAIT_GENES,
};
use std::sync::{Arc, Mutex};

fn small_world_config(seed: u64) -> WorldConfig {
    WorldConfig {
        width: 12,
        height: 12,
        rng_seed: Some(seed),
        population_density: 0.4,
        food_density: 0.6,
        history_capacity: 512,
        ..WorldConfig::default()
    }
}

#[test]
fn full_experiment_pipeline_is_deterministic() {
    let drive = |seed: u64| {
        let mut world = World::new(small_world_config(seed)).expect("world");
        world.run(40);
        world.place_barrier().expect("barrier");
        world.run(40);
        let report = world.check_speciation().expect("speciation");
        let history: Vec<_> = world.history().cloned().collect();
        (report, history, world.population())
    };

    let (report_a, history_a, pop_a) = drive(41);
    let (report_b, history_b, pop_b) = drive(41);
    assert_eq!(report_a, report_b);
    assert_eq!(history_a, history_b);
    assert_eq!(pop_a, pop_b);
}

#[test]
fn barrier_splits_both_halves_of_a_populated_world() {
    let mut world = World::new(small_world_config(7)).expect("world");
    world.run(10);
    let barrier = world.place_barrier().expect("barrier");
    assert_eq!(barrier.orientation, BarrierOrientation::Vertical);
    assert_eq!(barrier.index, 6);

    for y in 0..world.grid().height() {
        let cell = world.grid().cell(Coord::new(6, y)).expect("cell");
        assert!(cell.blocked);
    }

    // Nothing ever moves onto the blocked column after placement.
    let occupied_before: Vec<_> = world
        .grid()
        .occupants()
        .into_iter()
        .filter(|(pos, _)| pos.x == 6)
        .collect();
    world.run(50);
    let occupied_after: Vec<_> = world
        .grid()
        .occupants()
        .into_iter()
        .filter(|(pos, _)| pos.x == 6)
        .collect();
    for (pos, id) in &occupied_after {
        assert!(
            occupied_before.iter().any(|(p, i)| p == pos && i == id),
            "agent {id:?} appeared on the barrier at {pos} after placement"
        );
    }
}

#[test]
fn explicit_barrier_position_overrides_midline() {
    let config = WorldConfig {
        barrier_position: Some(0),
        ..small_world_config(11)
    };
    let mut world = World::new(config).expect("world");
    let barrier = world.place_barrier().expect("barrier");
    assert_eq!(barrier.index, 0, "index zero is a real position, not a default");
    assert!(world.grid().cell(Coord::new(0, 5)).expect("cell").blocked);
    assert!(!world.grid().cell(Coord::new(6, 5)).expect("cell").blocked);
}

#[derive(Default)]
struct SpyReporter {
    batches: Arc<Mutex<Vec<BatchReport>>>,
    extinctions: Arc<Mutex<Vec<BatchReport>>>,
}

impl Reporter for SpyReporter {
    fn on_batch(&mut self, report: &BatchReport) {
        self.batches
            .lock()
            .expect("batch lock")
            .push(report.clone());
    }

    fn on_extinction(&mut self, report: &BatchReport) {
        self.extinctions
            .lock()
            .expect("extinction lock")
            .push(report.clone());
    }
}

#[test]
fn reporter_sees_batches_and_extinction() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let extinctions = Arc::new(Mutex::new(Vec::new()));
    let spy = SpyReporter {
        batches: Arc::clone(&batches),
        extinctions: Arc::clone(&extinctions),
    };

    // Tiny starting energy and no food: the population starves fast.
    let config = WorldConfig {
        initial_energy: 4.0,
        food_density: 0.0,
        food_spawn_probability: 0.0,
        ..small_world_config(23)
    };
    let mut world = World::with_reporter(config, Box::new(spy)).expect("world");
    world.run(10);
    world.run(10);

    let batches = batches.lock().expect("batches");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].steps, 10);
    assert_eq!(batches[1].tick, Tick(20));

    let extinctions = extinctions.lock().expect("extinctions");
    assert!(!extinctions.is_empty(), "starvation must reach the hook");
    assert_eq!(extinctions.last().expect("last").population, 0);
}

#[test]
fn seeded_partitions_speciate_under_zero_tolerance() {
    // Hand-build two already-divergent populations on a 6x6 grid and
    // confirm the tester recognises full reproductive isolation.
    let config = WorldConfig {
        width: 6,
        height: 6,
        rng_seed: Some(5),
        population_density: 0.0,
        food_density: 0.0,
        food_spawn_probability: 0.0,
        ..WorldConfig::default()
    };
    let mut world = World::new(config).expect("world");

    let founder = |traits: [f32; TRAIT_GENES]| Agent {
        genome: Genome {
            action: [0.0; ACTION_GENES],
            tolerance: [0.05; TRAIT_GENES],
            traits,
        },
        energy: 100.0,
        age: 0,
    };
    for y in 0..6 {
        world
            .spawn_agent(Coord::new(0, y), founder([0.1; TRAIT_GENES]))
            .expect("left founder");
        world
            .spawn_agent(Coord::new(5, y), founder([0.9; TRAIT_GENES]))
            .expect("right founder");
    }
    world.place_barrier().expect("barrier");

    let report = world.check_speciation().expect("report");
    assert_eq!(report.left_sampled, 6);
    assert_eq!(report.right_sampled, 6);
    assert_eq!(report.compatible_pairs, 0);
    assert!(report.speciated);
}

#[test]
fn null_reporter_world_runs_to_completion() {
    let mut world =
        World::with_reporter(small_world_config(99), Box::new(NullReporter)).expect("world");
    let report = world.run(25);
    assert_eq!(report.steps, 25);
    assert_eq!(report.tick, Tick(25));
    assert_eq!(report.population, world.population());
}
