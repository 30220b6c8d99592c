//! Engine for simulating allopatric speciation on a bounded 2-D grid.
//!
//! Agents carry three chromosomes (action priorities, per-trait mating
//! tolerances, and phenotype traits), forage for food, reproduce by
//! single-point crossover with Gaussian mutation noise, and age until
//! their energy runs out. Once a barrier splits the grid, the
//! speciation tester samples both sub-populations and estimates the
//! fraction of cross-barrier pairs that could still interbreed.

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

new_key_type! {
    /// Stable generational handle for agents. Two agents with identical
    /// chromosomes are still distinct entities; occupancy checks compare
    /// handles, never genome values.
    pub struct AgentId;
}

/// Number of genes in the action-priority chromosome.
pub const ACTION_GENES: usize = 3;
/// Number of genes in the trait and tolerance chromosomes.
pub const TRAIT_GENES: usize = 5;

/// Cardinal neighbor offsets in fixed scan order. The order is load
/// bearing: mate scans and food ties resolve to the first direction
/// examined.
const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// Errors raised when constructing or operating on a world.
#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A barrier index outside the grid is a caller error.
    #[error("{orientation} barrier at {index} outside {width}x{height} grid")]
    BarrierOutOfBounds {
        orientation: BarrierOrientation,
        index: u32,
        width: u32,
        height: u32,
    },
    /// The speciation test is only defined once a barrier divides the grid.
    #[error("speciation test requires a placed barrier")]
    BarrierMissing,
}

/// High level simulation clock (ticks processed since construction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    /// Construct a new coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis along which a barrier splits the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierOrientation {
    /// A fixed x-index splits the grid into left/right halves.
    Vertical,
    /// A fixed y-index splits the grid into top/bottom halves.
    Horizontal,
}

impl fmt::Display for BarrierOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertical => f.write_str("vertical"),
            Self::Horizontal => f.write_str("horizontal"),
        }
    }
}

/// A placed barrier: one blocked row or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barrier {
    pub orientation: BarrierOrientation,
    pub index: u32,
}

/// The three chromosomes defining an agent.
///
/// All genes start uniform in `[0, 1)` but drift without bounds under
/// mutation; the compatibility test only ever looks at differences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    /// Priority weights for move, reproduce, and idle, in that order.
    pub action: [f32; ACTION_GENES],
    /// Per-trait mating tolerance ("how different may a mate be").
    pub tolerance: [f32; TRAIT_GENES],
    /// Phenotype traits compared against a candidate mate's.
    pub traits: [f32; TRAIT_GENES],
}

impl Genome {
    /// Draw a genome with every gene uniform in `[0, 1)`.
    pub fn random(rng: &mut SmallRng) -> Self {
        let mut genome = Self {
            action: [0.0; ACTION_GENES],
            tolerance: [0.0; TRAIT_GENES],
            traits: [0.0; TRAIT_GENES],
        };
        for gene in &mut genome.action {
            *gene = rng.random::<f32>();
        }
        for gene in &mut genome.tolerance {
            *gene = rng.random::<f32>();
        }
        for gene in &mut genome.traits {
            *gene = rng.random::<f32>();
        }
        genome
    }

    /// Single-point crossover per chromosome followed by independent
    /// Gaussian noise on every gene. The cut index is uniform in
    /// `1..len`, so both parents always contribute at least one gene.
    pub fn crossover(&self, mate: &Self, noise: &Normal<f32>, rng: &mut SmallRng) -> Self {
        Self {
            action: crossover_genes(&self.action, &mate.action, noise, rng),
            tolerance: crossover_genes(&self.tolerance, &mate.tolerance, noise, rng),
            traits: crossover_genes(&self.traits, &mate.traits, noise, rng),
        }
    }
}

fn crossover_genes<const N: usize>(
    parent: &[f32; N],
    mate: &[f32; N],
    noise: &Normal<f32>,
    rng: &mut SmallRng,
) -> [f32; N] {
    let cut = rng.random_range(1..N);
    let mut child = [0.0; N];
    for (index, gene) in child.iter_mut().enumerate() {
        let inherited = if index < cut {
            parent[index]
        } else {
            mate[index]
        };
        *gene = inherited + noise.sample(rng);
    }
    child
}

/// Symmetric mating test: every absolute trait difference must fall
/// within both partners' tolerance for that trait.
#[must_use]
pub fn compatible(a: &Genome, b: &Genome) -> bool {
    (0..TRAIT_GENES).all(|index| {
        let diff = (a.traits[index] - b.traits[index]).abs();
        diff <= a.tolerance[index] && diff <= b.tolerance[index]
    })
}

/// A living agent: genome plus mutable phenotype state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub genome: Genome,
    /// Can go negative mid-tick; death is applied at tick end.
    pub energy: f32,
    pub age: u32,
}

/// One grid cell. At most one occupant; a blocked cell may still hold
/// food but never gains or loses an occupant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    pub occupant: Option<AgentId>,
    pub food: Option<u32>,
    pub blocked: bool,
}

/// Dense bounded grid, flat-indexed row major (`y * width + x`).
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Construct a grid of empty, unblocked, foodless cells.
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        Ok(Self {
            width,
            height,
            cells: vec![Cell::default(); (width as usize) * (height as usize)],
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    fn offset(&self, pos: Coord) -> usize {
        (pos.y as usize) * (self.width as usize) + (pos.x as usize)
    }

    /// Borrow a cell, `None` when out of bounds.
    #[must_use]
    pub fn cell(&self, pos: Coord) -> Option<&Cell> {
        (pos.x < self.width && pos.y < self.height).then(|| self.at(pos))
    }

    /// Mutably borrow a cell, `None` when out of bounds.
    pub fn cell_mut(&mut self, pos: Coord) -> Option<&mut Cell> {
        (pos.x < self.width && pos.y < self.height).then(|| self.offset(pos)).map(|idx| &mut self.cells[idx])
    }

    // Callers must pass an in-bounds coordinate.
    fn at(&self, pos: Coord) -> &Cell {
        &self.cells[self.offset(pos)]
    }

    fn at_mut(&mut self, pos: Coord) -> &mut Cell {
        let idx = self.offset(pos);
        &mut self.cells[idx]
    }

    /// Apply a signed offset with bounds checking; no wraparound.
    #[must_use]
    pub fn step_from(&self, pos: Coord, (dx, dy): (i32, i32)) -> Option<Coord> {
        let x = pos.x.checked_add_signed(dx)?;
        let y = pos.y.checked_add_signed(dy)?;
        (x < self.width && y < self.height).then_some(Coord::new(x, y))
    }

    /// In-bounds cardinal neighbors in fixed scan order.
    pub fn neighbors4(&self, pos: Coord) -> impl Iterator<Item = Coord> + '_ {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(move |&offset| self.step_from(pos, offset))
    }

    /// Mark every cell along the chosen row or column as blocked.
    /// Occupants already standing on the line stay where they are;
    /// they just become unreachable as movement or spawn targets.
    pub fn place_barrier(
        &mut self,
        orientation: BarrierOrientation,
        index: u32,
    ) -> Result<(), WorldError> {
        let extent = match orientation {
            BarrierOrientation::Vertical => self.width,
            BarrierOrientation::Horizontal => self.height,
        };
        if index >= extent {
            return Err(WorldError::BarrierOutOfBounds {
                orientation,
                index,
                width: self.width,
                height: self.height,
            });
        }
        match orientation {
            BarrierOrientation::Vertical => {
                for y in 0..self.height {
                    self.at_mut(Coord::new(index, y)).blocked = true;
                }
            }
            BarrierOrientation::Horizontal => {
                for x in 0..self.width {
                    self.at_mut(Coord::new(x, index)).blocked = true;
                }
            }
        }
        Ok(())
    }

    /// Snapshot of all `(position, occupant)` pairs in row-major order.
    #[must_use]
    pub fn occupants(&self) -> Vec<(Coord, AgentId)> {
        let mut pairs = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let pos = Coord::new(x, y);
                if let Some(id) = self.at(pos).occupant {
                    pairs.push((pos, id));
                }
            }
        }
        pairs
    }
}

/// The three actions an agent can resolve in a tick, in declaration
/// order. Declaration order doubles as the tie-break when two action
/// genes carry equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move,
    Reproduce,
    Idle,
}

/// Rank actions by descending priority gene; the sort is stable, so
/// equal priorities keep declaration order.
#[must_use]
pub fn ranked_actions(priorities: &[f32; ACTION_GENES]) -> [Action; ACTION_GENES] {
    let mut ranked = [
        (Action::Move, OrderedFloat(priorities[0])),
        (Action::Reproduce, OrderedFloat(priorities[1])),
        (Action::Idle, OrderedFloat(priorities[2])),
    ];
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.map(|(action, _)| action)
}

/// Static configuration for a speciation world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Probability that a cell starts with an agent.
    pub population_density: f64,
    /// Probability that a cell starts with food.
    pub food_density: f64,
    /// Energy assigned to seeded agents.
    pub initial_energy: f32,
    /// Energy paid for a successful move.
    pub move_cost: f32,
    /// Energy paid when idling or when a move fails in place.
    pub stay_cost: f32,
    /// Both partners must strictly exceed this energy to reproduce.
    pub reproduction_threshold: f32,
    /// Energy deducted from each parent on reproduction.
    pub reproduction_cost: f32,
    /// Energy assigned to a newborn child.
    pub child_energy: f32,
    /// Standard deviation of the Gaussian mutation noise.
    pub mutation_sigma: f32,
    /// Inclusive lower bound of freshly grown food values.
    pub food_value_min: u32,
    /// Exclusive upper bound of freshly grown food values.
    pub food_value_max: u32,
    /// Per-tick probability that a foodless cell grows food.
    pub food_spawn_probability: f64,
    /// Axis of the (single, optional) barrier.
    pub barrier_orientation: BarrierOrientation,
    /// Explicit barrier index; `None` selects the midline. `Some(0)`
    /// really means index zero, not "use the default".
    pub barrier_position: Option<u32>,
    /// Maximum occupants sampled per side during the speciation test.
    pub sample_size: usize,
    /// Interbreed fraction at or below which the populations count as
    /// reproductively isolated.
    pub isolation_threshold: f64,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            rng_seed: None,
            population_density: 0.5,
            food_density: 0.75,
            initial_energy: 100.0,
            move_cost: 10.0,
            stay_cost: 5.0,
            reproduction_threshold: 100.0,
            reproduction_cost: 80.0,
            child_energy: 50.0,
            mutation_sigma: 0.1,
            food_value_min: 30,
            food_value_max: 50,
            food_spawn_probability: 0.1,
            barrier_orientation: BarrierOrientation::Vertical,
            barrier_position: None,
            sample_size: 50,
            isolation_threshold: 0.05,
            history_capacity: 256,
        }
    }
}

impl WorldConfig {
    /// Validates the configuration. Construction fails fast on the
    /// first offending value.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.width == 0 || self.height == 0 {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.population_density)
            || !(0.0..=1.0).contains(&self.food_density)
            || !(0.0..=1.0).contains(&self.food_spawn_probability)
        {
            return Err(WorldError::InvalidConfig(
                "densities and probabilities must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.isolation_threshold) {
            return Err(WorldError::InvalidConfig(
                "isolation_threshold must be within [0, 1]",
            ));
        }
        if self.move_cost < 0.0
            || self.stay_cost < 0.0
            || self.reproduction_cost < 0.0
            || self.child_energy < 0.0
            || self.initial_energy <= 0.0
        {
            return Err(WorldError::InvalidConfig(
                "energy costs must be non-negative and initial_energy positive",
            ));
        }
        if !self.mutation_sigma.is_finite() || self.mutation_sigma < 0.0 {
            return Err(WorldError::InvalidConfig(
                "mutation_sigma must be finite and non-negative",
            ));
        }
        if self.food_value_min >= self.food_value_max {
            return Err(WorldError::InvalidConfig(
                "food_value_min must be below food_value_max",
            ));
        }
        if self.sample_size == 0 {
            return Err(WorldError::InvalidConfig("sample_size must be non-zero"));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        if let Some(index) = self.barrier_position {
            let extent = match self.barrier_orientation {
                BarrierOrientation::Vertical => self.width,
                BarrierOrientation::Horizontal => self.height,
            };
            if index >= extent {
                return Err(WorldError::InvalidConfig(
                    "barrier_position outside grid bounds",
                ));
            }
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Per-tick statistics retained in the world's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    pub total_energy: f32,
}

/// Aggregate payload handed to reporter hooks after a tick batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub tick: Tick,
    /// Ticks executed in this batch.
    pub steps: u64,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    pub total_energy: f32,
}

/// Telemetry sink invoked at batch boundaries. Absence of a reporter
/// (the [`NullReporter`]) means the simulation runs headless.
pub trait Reporter: Send {
    /// Fired after every externally requested tick batch.
    fn on_batch(&mut self, report: &BatchReport);
    /// Fired when a batch ends with zero occupants.
    fn on_extinction(&mut self, report: &BatchReport);
}

/// No-op reporter.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_batch(&mut self, _report: &BatchReport) {}
    fn on_extinction(&mut self, _report: &BatchReport) {}
}

/// Outcome of one speciation test across the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeciationReport {
    /// True when the interbreed fraction is at or below the isolation
    /// threshold. An empty side reports false: extinction precludes
    /// the test.
    pub speciated: bool,
    /// Fraction of sampled cross-barrier pairs that passed the
    /// compatibility test.
    pub interbreed_fraction: f64,
    pub left_sampled: usize,
    pub right_sampled: usize,
    pub compatible_pairs: usize,
}

impl SpeciationReport {
    const fn empty_side() -> Self {
        Self {
            speciated: false,
            interbreed_fraction: 0.0,
            left_sampled: 0,
            right_sampled: 0,
            compatible_pairs: 0,
        }
    }
}

/// Aggregate simulation state: grid, agent arena, RNG, and history.
pub struct World {
    config: WorldConfig,
    grid: Grid,
    agents: SlotMap<AgentId, Agent>,
    rng: SmallRng,
    mutation_noise: Normal<f32>,
    tick: Tick,
    barrier: Option<Barrier>,
    tick_births: usize,
    tick_deaths: usize,
    history: VecDeque<TickSummary>,
    reporter: Box<dyn Reporter>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("population", &self.agents.len())
            .field("barrier", &self.barrier)
            .finish()
    }
}

impl World {
    /// Instantiate a world from configuration, running headless.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        Self::with_reporter(config, Box::new(NullReporter))
    }

    /// Instantiate a world with a telemetry sink.
    pub fn with_reporter(
        config: WorldConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let mutation_noise = Normal::new(0.0, config.mutation_sigma)
            .map_err(|_| WorldError::InvalidConfig("mutation_sigma is not a valid deviation"))?;
        let grid = Grid::new(config.width, config.height)?;
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        let mut world = Self {
            config,
            grid,
            agents: SlotMap::with_key(),
            rng,
            mutation_noise,
            tick: Tick::zero(),
            barrier: None,
            tick_births: 0,
            tick_deaths: 0,
            history: VecDeque::with_capacity(history_capacity),
            reporter,
        };
        world.populate();
        Ok(world)
    }

    /// Seed agents and food cell by cell according to the configured
    /// densities. One occupant draw and one food draw per cell, in
    /// row-major order, so seeded layouts are reproducible.
    fn populate(&mut self) {
        let pop_density = self.config.population_density;
        let food_density = self.config.food_density;
        let initial_energy = self.config.initial_energy;
        let food_range = self.config.food_value_min..self.config.food_value_max;
        for index in 0..self.grid.cells.len() {
            if self.rng.random::<f64>() < pop_density {
                let agent = Agent {
                    genome: Genome::random(&mut self.rng),
                    energy: initial_energy,
                    age: 0,
                };
                let id = self.agents.insert(agent);
                self.grid.cells[index].occupant = Some(id);
            }
            if self.rng.random::<f64>() < food_density {
                self.grid.cells[index].food = Some(self.rng.random_range(food_range.clone()));
            }
        }
    }

    /// Immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only access to the grid (the visualizer surface).
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Mutable grid access for scenario setup.
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// The placed barrier, if any.
    #[must_use]
    pub const fn barrier(&self) -> Option<Barrier> {
        self.barrier
    }

    /// Number of live agents.
    #[must_use]
    pub fn population(&self) -> usize {
        self.agents.len()
    }

    /// True once every agent has died.
    #[must_use]
    pub fn is_extinct(&self) -> bool {
        self.agents.is_empty()
    }

    /// Borrow an agent by handle.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Mutably borrow an agent by handle.
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Replace the telemetry sink.
    pub fn set_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporter = reporter;
    }

    /// Place an agent on a free, unblocked, in-bounds cell. Returns
    /// `None` when the cell cannot take an occupant.
    pub fn spawn_agent(&mut self, pos: Coord, agent: Agent) -> Option<AgentId> {
        let cell = self.grid.cell(pos)?;
        if cell.blocked || cell.occupant.is_some() {
            return None;
        }
        let id = self.agents.insert(agent);
        self.grid.at_mut(pos).occupant = Some(id);
        Some(id)
    }

    /// Place the configured barrier. Idempotent: a barrier is placed at
    /// most once per run, and repeat calls return the existing one.
    pub fn place_barrier(&mut self) -> Result<Barrier, WorldError> {
        if let Some(existing) = self.barrier {
            return Ok(existing);
        }
        let orientation = self.config.barrier_orientation;
        let index = match self.config.barrier_position {
            Some(index) => index,
            None => match orientation {
                BarrierOrientation::Vertical => self.grid.width() / 2,
                BarrierOrientation::Horizontal => self.grid.height() / 2,
            },
        };
        self.grid.place_barrier(orientation, index)?;
        let barrier = Barrier { orientation, index };
        self.barrier = Some(barrier);
        Ok(barrier)
    }

    /// Execute a batch of ticks, then fire reporter hooks.
    pub fn run(&mut self, steps: u64) -> BatchReport {
        let mut births = 0;
        let mut deaths = 0;
        for _ in 0..steps {
            let summary = self.step();
            births += summary.births;
            deaths += summary.deaths;
        }
        let report = BatchReport {
            tick: self.tick,
            steps,
            population: self.agents.len(),
            births,
            deaths,
            total_energy: self.total_energy(),
        };
        self.reporter.on_batch(&report);
        if report.population == 0 {
            self.reporter.on_extinction(&report);
        }
        report
    }

    /// Execute one tick: snapshot occupants, let each surviving agent
    /// age and act, apply death, then grow food.
    pub fn step(&mut self) -> TickSummary {
        self.tick_births = 0;
        self.tick_deaths = 0;

        let snapshot = self.grid.occupants();
        for (pos, id) in snapshot {
            // Skip agents that moved or died earlier this same tick.
            if self.grid.at(pos).occupant != Some(id) {
                continue;
            }
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            agent.age += 1;
            agent.energy -= (agent.age as f32).sqrt();

            let new_pos = self.resolve_action(id, pos);

            let energy = self.agents.get(id).map_or(0.0, |agent| agent.energy);
            if energy <= 0.0 && self.grid.at(new_pos).occupant == Some(id) {
                self.grid.at_mut(new_pos).occupant = None;
                self.agents.remove(id);
                self.tick_deaths += 1;
            }
        }

        self.grow_food();
        self.tick = self.tick.next();

        let summary = TickSummary {
            tick: self.tick,
            population: self.agents.len(),
            births: self.tick_births,
            deaths: self.tick_deaths,
            total_energy: self.total_energy(),
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        summary
    }

    /// Every foodless cell independently grows a fresh food value with
    /// the configured probability. Blocked cells grow food too; they
    /// just cannot be foraged.
    fn grow_food(&mut self) {
        let probability = self.config.food_spawn_probability;
        let food_range = self.config.food_value_min..self.config.food_value_max;
        let rng = &mut self.rng;
        for cell in &mut self.grid.cells {
            if cell.food.is_none() && rng.random::<f64>() < probability {
                cell.food = Some(rng.random_range(food_range.clone()));
            }
        }
    }

    fn total_energy(&self) -> f32 {
        self.agents.values().map(|agent| agent.energy).sum()
    }

    /// Try actions in descending priority; the first that resolves
    /// decides the tick. Move and idle always resolve, so the loop
    /// terminates before falling out.
    fn resolve_action(&mut self, id: AgentId, pos: Coord) -> Coord {
        let ranking = match self.agents.get(id) {
            Some(agent) => ranked_actions(&agent.genome.action),
            None => return pos,
        };
        for action in ranking {
            match action {
                Action::Move => return self.resolve_move(id, pos),
                Action::Reproduce => {
                    if let Some(resolved) = self.try_reproduce(id, pos) {
                        return resolved;
                    }
                }
                Action::Idle => {
                    if let Some(agent) = self.agents.get_mut(id) {
                        agent.energy -= self.config.stay_cost;
                    }
                    return pos;
                }
            }
        }
        pos
    }

    /// Move toward the richest free neighbor, or one random direction
    /// when no neighbor holds food. A move either succeeds (cost 10,
    /// food eaten at the destination) or fails in place (cost 5);
    /// either way it is the tick's resolved action.
    fn resolve_move(&mut self, id: AgentId, pos: Coord) -> Coord {
        let mut best: Option<(u32, Coord)> = None;
        for offset in NEIGHBOR_OFFSETS {
            let Some(next) = self.grid.step_from(pos, offset) else {
                continue;
            };
            let cell = self.grid.at(next);
            if cell.blocked || cell.occupant.is_some() {
                continue;
            }
            if let Some(food) = cell.food {
                if best.is_none_or(|(value, _)| food > value) {
                    best = Some((food, next));
                }
            }
        }

        let mut target = best.map(|(_, next)| next);
        if target.is_none() {
            // One random direction; only taken if it lands on a free cell.
            let offset = NEIGHBOR_OFFSETS[self.rng.random_range(0..NEIGHBOR_OFFSETS.len())];
            if let Some(next) = self.grid.step_from(pos, offset) {
                let cell = self.grid.at(next);
                if !cell.blocked && cell.occupant.is_none() {
                    target = Some(next);
                }
            }
        }

        match target {
            Some(dest) => {
                self.grid.at_mut(pos).occupant = None;
                let food = self.grid.at_mut(dest).food.take();
                self.grid.at_mut(dest).occupant = Some(id);
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.energy -= self.config.move_cost;
                    if let Some(value) = food {
                        agent.energy += value as f32;
                    }
                }
                dest
            }
            None => {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.energy -= self.config.stay_cost;
                }
                pos
            }
        }
    }

    /// Scan neighbors for a compatible mate, then for a free placement
    /// cell (neighbors first, own cell last). Returns `None` when the
    /// action falls through at no cost.
    fn try_reproduce(&mut self, id: AgentId, pos: Coord) -> Option<Coord> {
        let threshold = self.config.reproduction_threshold;
        let actor = self.agents.get(id)?;
        if actor.energy <= threshold {
            return None;
        }
        let actor_genome = actor.genome;

        for offset in NEIGHBOR_OFFSETS {
            let Some(mate_pos) = self.grid.step_from(pos, offset) else {
                continue;
            };
            let Some(mate_id) = self.grid.at(mate_pos).occupant else {
                continue;
            };
            let Some(mate) = self.agents.get(mate_id) else {
                continue;
            };
            if mate.energy <= threshold || !compatible(&actor_genome, &mate.genome) {
                continue;
            }
            let mate_genome = mate.genome;

            let grid = &self.grid;
            let placement = NEIGHBOR_OFFSETS
                .iter()
                .copied()
                .chain([(0, 0)])
                .find_map(|offset| {
                    let child_pos = grid.step_from(pos, offset)?;
                    let cell = grid.at(child_pos);
                    (cell.occupant.is_none() && !cell.blocked).then_some(child_pos)
                });

            if let Some(child_pos) = placement {
                let genome =
                    actor_genome.crossover(&mate_genome, &self.mutation_noise, &mut self.rng);
                let child = Agent {
                    genome,
                    energy: self.config.child_energy,
                    age: 0,
                };
                let child_id = self.agents.insert(child);
                self.grid.at_mut(child_pos).occupant = Some(child_id);
                if let Some(actor) = self.agents.get_mut(id) {
                    actor.energy -= self.config.reproduction_cost;
                }
                if let Some(mate) = self.agents.get_mut(mate_id) {
                    mate.energy -= self.config.reproduction_cost;
                }
                self.tick_births += 1;
                return Some(pos);
            }
            // Compatible mate but nowhere to place a child: keep scanning.
        }
        None
    }

    /// Partition occupants by the barrier, sample up to `sample_size`
    /// per side without replacement, and test every cross-barrier pair
    /// with the reproduction compatibility predicate.
    pub fn check_speciation(&mut self) -> Result<SpeciationReport, WorldError> {
        let barrier = self.barrier.ok_or(WorldError::BarrierMissing)?;

        let mut left = Vec::new();
        let mut right = Vec::new();
        for (pos, id) in self.grid.occupants() {
            let along = match barrier.orientation {
                BarrierOrientation::Vertical => pos.x,
                BarrierOrientation::Horizontal => pos.y,
            };
            if along < barrier.index {
                left.push(id);
            } else {
                right.push(id);
            }
        }

        if left.is_empty() || right.is_empty() {
            return Ok(SpeciationReport::empty_side());
        }

        let left_sample = self.sample_genomes(&left);
        let right_sample = self.sample_genomes(&right);

        let mut compatible_pairs = 0;
        for a in &left_sample {
            for b in &right_sample {
                if compatible(a, b) {
                    compatible_pairs += 1;
                }
            }
        }

        let pair_count = left_sample.len() * right_sample.len();
        let interbreed_fraction = compatible_pairs as f64 / pair_count as f64;
        Ok(SpeciationReport {
            speciated: interbreed_fraction <= self.config.isolation_threshold,
            interbreed_fraction,
            left_sampled: left_sample.len(),
            right_sampled: right_sample.len(),
            compatible_pairs,
        })
    }

    /// Sample up to `sample_size` genomes without replacement; a side
    /// smaller than the sample size contributes all of its occupants.
    fn sample_genomes(&mut self, side: &[AgentId]) -> Vec<Genome> {
        let amount = self.config.sample_size.min(side.len());
        rand::seq::index::sample(&mut self.rng, side.len(), amount)
            .into_iter()
            .filter_map(|index| self.agents.get(side[index]).map(|agent| agent.genome))
            .collect()
    }
}
