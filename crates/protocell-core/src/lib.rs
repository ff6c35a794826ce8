//! Core simulation engine for Protocell: a fixed grid of programmable
//! cells, each advanced once per pass by interpreting its genome as a
//! tiny instruction sequence.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Monotonic pass counter. Resets to zero whenever the world is reseeded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    /// The initial tick.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The tick following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Errors raised while constructing or reshaping a world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A genome of the wrong length was handed to the world.
    #[error("genome length {found} does not match configured length {expected}")]
    GenomeLength { expected: usize, found: usize },
}

/// Instruction set executed by the genome interpreter.
///
/// Byte values not listed here are inert: they dispatch to nothing and the
/// program counter moves on by one. The gaps in the numbering are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    MoveForward = 1,
    Photo = 5,
    Chemo = 6,
    Death = 7,
    Mitose = 9,
    GiveEnergy = 10,
    TakeEnergy = 11,
    Olding = 12,
    Regen = 13,
    Counter = 14,
    DetectFriend = 15,
    DetectEnergy = 17,
}

impl Opcode {
    /// Decode a genome byte, returning `None` for inert values.
    #[must_use]
    pub const fn decode(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::MoveForward),
            5 => Some(Self::Photo),
            6 => Some(Self::Chemo),
            7 => Some(Self::Death),
            9 => Some(Self::Mitose),
            10 => Some(Self::GiveEnergy),
            11 => Some(Self::TakeEnergy),
            12 => Some(Self::Olding),
            13 => Some(Self::Regen),
            14 => Some(Self::Counter),
            15 => Some(Self::DetectFriend),
            17 => Some(Self::DetectEnergy),
            _ => None,
        }
    }

    /// The raw genome byte for this opcode.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Whether the opcode rewrites the program counter directly.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(self, Self::Counter | Self::DetectFriend | Self::DetectEnergy)
    }
}

/// Tag recording how a cell last acquired or moved energy, kept for
/// visualization only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeedTag {
    #[default]
    Idle,
    Photo,
    Chemo,
    /// Energy shared with, or drained from, a cell of the same lineage.
    Share,
    /// Energy drained from an unrelated living cell.
    Raid,
    /// Energy drained from a corpse.
    Scavenge,
}

impl FeedTag {
    /// Stable palette slot for renderers.
    #[must_use]
    pub const fn palette_index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Photo => 1,
            Self::Chemo => 2,
            Self::Share => 3,
            Self::Raid => 4,
            Self::Scavenge => 5,
        }
    }
}

/// Fixed-length instruction sequence plus its cached identity digest.
///
/// The digest is the wrapping sum of all genome bytes; two cells with equal
/// digests treat each other as kin. It is recomputed on every assignment
/// and mutation, and zeroed when the owning cell is killed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genome {
    bytes: Box<[u8]>,
    digest: u8,
}

impl Genome {
    /// A dead genome: all zeroes with the death sentinel in slot 0.
    #[must_use]
    pub fn vacant(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        bytes[0] = Opcode::Death.byte();
        Self {
            bytes: bytes.into_boxed_slice(),
            digest: 0,
        }
    }

    /// Build a genome from raw bytes, computing the digest.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut genome = Self {
            bytes: bytes.to_vec().into_boxed_slice(),
            digest: 0,
        };
        genome.rehash();
        genome
    }

    /// Number of instruction slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the genome holds no slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw byte at `slot`.
    #[must_use]
    pub fn byte(&self, slot: usize) -> u8 {
        self.bytes[slot]
    }

    /// Cached identity digest.
    #[must_use]
    pub const fn digest(&self) -> u8 {
        self.digest
    }

    /// Overwrite the whole sequence and recompute the digest.
    fn assign(&mut self, bytes: &[u8]) {
        self.bytes.copy_from_slice(bytes);
        self.rehash();
    }

    /// Overwrite one slot without touching the digest.
    fn write(&mut self, slot: usize, value: u8) {
        self.bytes[slot] = value;
    }

    fn rehash(&mut self) {
        self.digest = self
            .bytes
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    }
}

/// One grid slot: an organism, a corpse, or vacuum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    genome: Genome,
    energy: f32,
    age: u32,
    counter: u32,
    feed: FeedTag,
}

impl Cell {
    fn vacant(genome_len: usize) -> Self {
        Self {
            genome: Genome::vacant(genome_len),
            energy: 0.0,
            age: 0,
            counter: 0,
            feed: FeedTag::Idle,
        }
    }

    /// Dead cells carry the death sentinel in genome slot 0.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.genome.bytes[0] == Opcode::Death.byte()
    }

    /// Empty slots are dead with no energy left; only they may be moved
    /// into or claimed by reproduction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_dead() && self.energy <= 0.0
    }

    /// Kin test: equal identity digests.
    #[must_use]
    pub fn is_friend(&self, other: &Self) -> bool {
        self.genome.digest == other.genome.digest
    }

    /// Write the death sentinel and forget the lineage digest.
    fn kill(&mut self) {
        self.genome.write(0, Opcode::Death.byte());
        self.genome.digest = 0;
    }

    /// Stored energy. May be transiently negative mid-step.
    #[must_use]
    pub const fn energy(&self) -> f32 {
        self.energy
    }

    /// Steps survived since birth or last mutation reset.
    #[must_use]
    pub const fn age(&self) -> u32 {
        self.age
    }

    /// Raw program counter; reads into the genome wrap modulo its length.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Cached identity digest of the genome.
    #[must_use]
    pub const fn digest(&self) -> u8 {
        self.genome.digest
    }

    /// Last-action tag for visualization.
    #[must_use]
    pub const fn feed(&self) -> FeedTag {
        self.feed
    }

    /// The cell's instruction sequence.
    #[must_use]
    pub const fn genome(&self) -> &Genome {
        &self.genome
    }
}

/// The four cardinal neighbor offsets, selected by `operand % 4`.
const DIRECTIONS: [(i32, i32); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

/// Flat, fixed-capacity array of cells addressed by `(row, col)`.
///
/// Coordinates clamp at the edges rather than wrapping: a move off the
/// boundary lands on the boundary row or column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGrid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl CellGrid {
    fn new(width: u32, height: u32, genome_len: usize) -> Self {
        let capacity = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![Cell::vacant(genome_len); capacity],
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of columns.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// All slots in flat scan order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    fn clamp_position(&self, row: i32, col: i32) -> (u32, u32) {
        (
            row.clamp(0, self.width as i32 - 1) as u32,
            col.clamp(0, self.height as i32 - 1) as u32,
        )
    }

    /// Flat index for a possibly out-of-range position, clamped into the
    /// grid. Always in `[0, capacity)`.
    #[must_use]
    pub fn index_of(&self, row: i32, col: i32) -> usize {
        let (row, col) = self.clamp_position(row, col);
        (row as usize) * (self.height as usize) + (col as usize)
    }

    /// Neighbor position in the cardinal direction picked by `selector`.
    #[must_use]
    pub fn neighbor_of(&self, row: u32, col: u32, selector: u8) -> (u32, u32) {
        let (dr, dc) = DIRECTIONS[(selector % 4) as usize];
        self.clamp_position(row as i32 + dr, col as i32 + dc)
    }

    /// Borrow the cell at a clamped position.
    #[must_use]
    pub fn get(&self, row: u32, col: u32) -> &Cell {
        &self.cells[self.index_of(row as i32, col as i32)]
    }

    /// Count of living cells.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_dead()).count()
    }
}

/// Static configuration for a Protocell world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocellConfig {
    /// Number of grid rows.
    pub grid_width: u32,
    /// Number of grid columns.
    pub grid_height: u32,
    /// Instruction slots per genome; constant for the world's lifetime.
    pub genome_len: usize,
    /// Additive floor of the light field.
    pub sun_min: f32,
    /// Scale of the light field's oscillating component.
    pub sun_max: f32,
    /// Additive floor of the chemical field.
    pub chemo_min: f32,
    /// Scale of the chemical field's depth gradient.
    pub chemo_max: f32,
    /// Full-grid passes executed per `step()` call.
    pub acceleration: u32,
    /// Reproduction-time mutation odds: one roll in `10 * ratio + 1`.
    pub mutation_ratio: u32,
    /// Age roll above which a spontaneous mutation fires.
    pub mutation_age_threshold: u32,
    /// Minimum age before a cell may divide.
    pub mitose_age_threshold: u32,
    /// Energy spent by one movement instruction.
    pub move_cost: f32,
    /// Energy drained from every living cell at the end of each visit.
    pub upkeep_cost: f32,
    /// Multiplicative corpse decay per pass, in `[0, 1)`.
    pub corpse_decay_factor: f32,
    /// Constant corpse decay per pass.
    pub corpse_decay_cost: f32,
    /// Cells placed by a repopulation.
    pub seed_count: usize,
    /// Seeded cells start with energy uniform in `[0, seed_energy_max)`.
    pub seed_energy_max: f32,
    /// Reseed when a single pass updates fewer cells than this; 0 disables.
    pub pass_reseed_threshold: usize,
    /// Reseed when the last pass of a step updates fewer cells than this;
    /// 0 disables.
    pub advance_reseed_threshold: usize,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for ProtocellConfig {
    fn default() -> Self {
        Self {
            grid_width: 256,
            grid_height: 256,
            genome_len: 64,
            sun_min: 0.0,
            sun_max: 2.0,
            chemo_min: 0.0,
            chemo_max: 2.0,
            acceleration: 4,
            mutation_ratio: 100,
            mutation_age_threshold: 1_000,
            mitose_age_threshold: 10,
            move_cost: 0.5,
            upkeep_cost: 0.5,
            corpse_decay_factor: 0.99,
            corpse_decay_cost: 0.01,
            seed_count: 10_000,
            seed_energy_max: 100.0,
            pass_reseed_threshold: 20,
            advance_reseed_threshold: 300,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl ProtocellConfig {
    /// Grid capacity implied by the configured dimensions.
    #[must_use]
    pub fn capacity(&self) -> usize {
        (self.grid_width as usize) * (self.grid_height as usize)
    }

    fn validate(&self) -> Result<(), WorldError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if self.genome_len == 0 {
            return Err(WorldError::InvalidConfig("genome_len must be non-zero"));
        }
        if self.seed_count > self.capacity() {
            return Err(WorldError::InvalidConfig(
                "seed_count cannot exceed grid capacity",
            ));
        }
        if self.acceleration == 0 {
            return Err(WorldError::InvalidConfig("acceleration must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be positive",
            ));
        }
        if self.sun_min < 0.0 || self.sun_max < 0.0 || self.chemo_min < 0.0 || self.chemo_max < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "field parameters must be non-negative",
            ));
        }
        if self.move_cost < 0.0 || self.upkeep_cost < 0.0 || self.corpse_decay_cost < 0.0 {
            return Err(WorldError::InvalidConfig(
                "energy costs must be non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.corpse_decay_factor) {
            return Err(WorldError::InvalidConfig(
                "corpse_decay_factor must be in [0, 1)",
            ));
        }
        if self.seed_energy_max <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "seed_energy_max must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
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

/// Events emitted by one `step()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick counter after the step.
    pub tick: Tick,
    /// Living cells visited by the step's final pass.
    pub updated: usize,
    /// Whether the population guard discarded and reseeded the grid.
    pub reseeded: bool,
}

/// Per-step summary retained in the world's history ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub live_cells: usize,
    pub total_energy: f32,
    pub average_energy: f32,
    pub reseeded: bool,
}

/// The simulation world: grid, RNG stream, counters, and history.
///
/// The world owns the grid exclusively; renderers and other observers get
/// shared access only between steps, when the grid is quiescent.
pub struct CellWorld {
    config: ProtocellConfig,
    grid: CellGrid,
    rng: SmallRng,
    tick: Tick,
    last_updated: usize,
    tick_updated: usize,
    tick_duration: Duration,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for CellWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("live_cells", &self.grid.live_count())
            .finish()
    }
}

impl CellWorld {
    /// Build and seed a world from the supplied configuration.
    ///
    /// Worlds start populated: the initial population is placed by the same
    /// repopulation path the population guard uses.
    pub fn new(config: ProtocellConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let grid = CellGrid::new(config.grid_width, config.grid_height, config.genome_len);
        let history_capacity = config.history_capacity;
        let mut world = Self {
            config,
            grid,
            rng,
            tick: Tick::zero(),
            last_updated: 0,
            tick_updated: 0,
            tick_duration: Duration::ZERO,
            history: VecDeque::with_capacity(history_capacity),
        };
        world.repopulate();
        Ok(world)
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ProtocellConfig {
        &self.config
    }

    /// Read-only access to the grid.
    #[must_use]
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Borrow the cell at a clamped position.
    #[must_use]
    pub fn cell_at(&self, row: u32, col: u32) -> &Cell {
        self.grid.get(row, col)
    }

    /// Current pass counter.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Normalized time driving the light field.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.tick.0 as f32 / 1_000.0
    }

    /// Living cells visited by the most recent pass.
    #[must_use]
    pub const fn last_updated(&self) -> usize {
        self.last_updated
    }

    /// Living cells visited across all passes of the most recent step.
    #[must_use]
    pub const fn tick_updated(&self) -> usize {
        self.tick_updated
    }

    /// Wall-clock duration of the most recent step.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Iterate over retained step summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Ambient light available at `row` for the current tick.
    #[must_use]
    pub fn light_at(&self, row: u32) -> f32 {
        let t = self.time();
        let phase = ((t.cos() + (t * 4.0).sin() + 2.0) / 4.0).abs();
        let depth = row as f32 / self.config.grid_height as f32;
        phase * self.config.sun_max * (1.0 - depth) + self.config.sun_min
    }

    /// Chemical energy available at `row`; grows with depth.
    #[must_use]
    pub fn chemo_at(&self, row: u32) -> f32 {
        let depth = row as f32 / self.config.grid_height as f32;
        depth * self.config.chemo_max + self.config.chemo_min
    }

    /// Replace the RNG stream with a freshly seeded one.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Reset every slot to vacuum without reseeding a population.
    pub fn clear(&mut self) {
        for cell in &mut self.grid.cells {
            *cell = Cell::vacant(self.config.genome_len);
        }
    }

    /// Overwrite the slot at `(row, col)` with a fresh living cell.
    ///
    /// The genome must match the configured length. The cell starts at
    /// program counter 0 with an idle feed tag.
    pub fn spawn_cell(
        &mut self,
        row: u32,
        col: u32,
        genome: &[u8],
        energy: f32,
        age: u32,
    ) -> Result<(), WorldError> {
        if genome.len() != self.config.genome_len {
            return Err(WorldError::GenomeLength {
                expected: self.config.genome_len,
                found: genome.len(),
            });
        }
        let index = self.grid.index_of(row as i32, col as i32);
        let cell = &mut self.grid.cells[index];
        cell.genome.assign(genome);
        cell.energy = energy;
        cell.age = age;
        cell.counter = 0;
        cell.feed = FeedTag::Idle;
        Ok(())
    }

    /// Discard the grid and reseed it with a fresh random population.
    ///
    /// Every slot is reset to vacuum, the tick counter returns to zero, and
    /// exactly `seed_count` cells are placed on distinct random slots, each
    /// with a random genome whose slot 0 is forced to `Photo` and energy
    /// uniform in `[0, seed_energy_max)`.
    pub fn repopulate(&mut self) {
        self.tick = Tick::zero();
        self.clear();

        let capacity = self.grid.capacity();
        let genome_len = self.config.genome_len;
        let mut bytes = vec![0u8; genome_len];
        for _ in 0..self.config.seed_count {
            let energy = self.rng.random::<f32>() * self.config.seed_energy_max;
            for byte in &mut bytes {
                *byte = self.rng.random::<u8>();
            }
            bytes[0] = Opcode::Photo.byte();

            let mut slot = self.rng.random_range(0..capacity);
            while !self.grid.cells[slot].is_empty() {
                slot = self.rng.random_range(0..capacity);
            }
            let cell = &mut self.grid.cells[slot];
            cell.genome.assign(&bytes);
            cell.energy = energy;
            cell.age = 0;
            cell.counter = 0;
            cell.feed = FeedTag::Idle;
        }
    }

    /// Run `ticks` full steps.
    pub fn advance(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Execute one step: `acceleration` full-grid passes plus the
    /// population guard, returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let started = Instant::now();
        self.tick_updated = 0;
        let mut reseeded = false;

        for _ in 0..self.config.acceleration {
            self.tick = self.tick.next();
            let updated = self.run_pass();
            self.last_updated = updated;
            self.tick_updated += updated;
            if updated < self.config.pass_reseed_threshold {
                self.repopulate();
                reseeded = true;
            }
        }

        if self.last_updated < self.config.advance_reseed_threshold {
            self.repopulate();
            reseeded = true;
        }

        self.tick_duration = started.elapsed();
        self.record_summary(reseeded);
        TickEvents {
            tick: self.tick,
            updated: self.last_updated,
            reseeded,
        }
    }

    /// One row-major scan over every slot. Returns the count of living
    /// cells visited.
    fn run_pass(&mut self) -> usize {
        let mut updated = 0;
        for row in 0..self.config.grid_width {
            let light = self.light_at(row);
            let chemo = self.chemo_at(row);
            for col in 0..self.config.grid_height {
                let index = self.grid.index_of(row as i32, col as i32);
                let final_index = if self.grid.cells[index].is_dead() {
                    let cell = &mut self.grid.cells[index];
                    cell.energy =
                        cell.energy * self.config.corpse_decay_factor - self.config.corpse_decay_cost;
                    index
                } else {
                    updated += 1;
                    self.execute(index, row, col, light, chemo)
                };

                let cell = &mut self.grid.cells[final_index];
                if cell.energy < 1.0 {
                    cell.kill();
                    cell.energy = 0.0;
                }
            }
        }
        updated
    }

    /// Interpret one visit for the living cell at `index`: dispatch, then
    /// the uniform post-step (mutation roll, aging, upkeep).
    ///
    /// A taken jump re-dispatches at most once; a jump landing on another
    /// jump opcode is not executed. Returns the cell's final index, which
    /// differs from `index` only after movement.
    fn execute(&mut self, mut index: usize, row: u32, col: u32, light: f32, chemo: f32) -> usize {
        let genome_len = self.config.genome_len;
        let start_counter = self.grid.cells[index].counter;
        let mut jumped = false;

        loop {
            let (op, i_param1, i_param2) = {
                let cell = &self.grid.cells[index];
                let pc = cell.counter as usize;
                (
                    Opcode::decode(cell.genome.byte(pc % genome_len)),
                    cell.genome.byte((pc + 1) % genome_len),
                    cell.genome.byte((pc + 2) % genome_len),
                )
            };
            if jumped && op.is_some_and(Opcode::is_jump) {
                break;
            }
            let param1 = f32::from(i_param1) / f32::from(u8::MAX);
            let mut took_jump = false;

            match op {
                Some(Opcode::MoveForward) => {
                    {
                        let cell = &mut self.grid.cells[index];
                        cell.energy -= self.config.move_cost;
                        cell.counter = cell.counter.wrapping_add(2);
                    }
                    let (nrow, ncol) = self.grid.neighbor_of(row, col, i_param1);
                    let new_index = self.grid.index_of(nrow as i32, ncol as i32);
                    self.grid.cells.swap(index, new_index);
                    index = new_index;
                }
                Some(Opcode::Photo) => {
                    let cell = &mut self.grid.cells[index];
                    cell.energy += light;
                    cell.counter = cell.counter.wrapping_add(1);
                    cell.feed = FeedTag::Photo;
                }
                Some(Opcode::Chemo) => {
                    let cell = &mut self.grid.cells[index];
                    cell.energy += chemo;
                    cell.counter = cell.counter.wrapping_add(1);
                    cell.feed = FeedTag::Chemo;
                }
                Some(Opcode::Olding) => {
                    let cell = &mut self.grid.cells[index];
                    cell.age = cell.age.saturating_add((10.0 * param1) as u32);
                    cell.counter = cell.counter.wrapping_add(2);
                }
                Some(Opcode::Mitose) => {
                    if self.grid.cells[index].age > self.config.mitose_age_threshold {
                        let (nrow, ncol) = self.grid.neighbor_of(row, col, i_param1);
                        let target = self.grid.index_of(nrow as i32, ncol as i32);
                        if self.grid.cells[target].is_empty()
                            && self.grid.cells[index].energy > 1.0
                        {
                            let parent_energy = self.grid.cells[index].energy;
                            let parent_age = self.grid.cells[index].age;
                            let genome = self.grid.cells[index].genome.clone();
                            {
                                let child = &mut self.grid.cells[target];
                                child.genome = genome;
                                child.energy = parent_energy * 0.5;
                                child.age = parent_age / 2;
                                child.counter = 0;
                                child.feed = FeedTag::Idle;
                            }
                            if self.roll_reproduction_mutation() {
                                self.mutate_cell(target);
                            }
                            if self.roll_reproduction_mutation() {
                                self.mutate_cell(index);
                            }
                            let parent = &mut self.grid.cells[index];
                            parent.energy = parent_energy * 0.5;
                            parent.age = parent_age / 2;
                        }
                    }
                    let cell = &mut self.grid.cells[index];
                    cell.counter = cell.counter.wrapping_add(3);
                }
                Some(Opcode::GiveEnergy) => {
                    let (nrow, ncol) = self.grid.neighbor_of(row, col, i_param1);
                    let target = self.grid.index_of(nrow as i32, ncol as i32);
                    if target != index && !self.grid.cells[target].is_empty() {
                        let half = self.grid.cells[index].energy * 0.5;
                        self.grid.cells[target].energy += half;
                        let cell = &mut self.grid.cells[index];
                        cell.energy -= half;
                        cell.feed = FeedTag::Share;
                    }
                    let cell = &mut self.grid.cells[index];
                    cell.counter = cell.counter.wrapping_add(3);
                }
                Some(Opcode::TakeEnergy) => {
                    let (nrow, ncol) = self.grid.neighbor_of(row, col, i_param1);
                    let target = self.grid.index_of(nrow as i32, ncol as i32);
                    if target != index && !self.grid.cells[target].is_empty() {
                        let half = self.grid.cells[target].energy * 0.5;
                        let (gain, tag) = if !self.grid.cells[target].is_dead() {
                            if self.grid.cells[index].is_friend(&self.grid.cells[target]) {
                                (half * 0.75, FeedTag::Share)
                            } else {
                                (half, FeedTag::Raid)
                            }
                        } else {
                            (half, FeedTag::Scavenge)
                        };
                        self.grid.cells[target].energy -= half;
                        let cell = &mut self.grid.cells[index];
                        cell.energy += gain;
                        cell.feed = tag;
                    }
                    let cell = &mut self.grid.cells[index];
                    cell.counter = cell.counter.wrapping_add(3);
                }
                Some(Opcode::Regen) => {
                    let cell = &mut self.grid.cells[index];
                    cell.age = (cell.age as f32 * param1) as u32;
                    cell.energy *= param1;
                    cell.counter = cell.counter.wrapping_add(2);
                }
                Some(Opcode::DetectFriend) => {
                    let (nrow, ncol) = self.grid.neighbor_of(row, col, i_param1);
                    let target = self.grid.index_of(nrow as i32, ncol as i32);
                    let cell = &self.grid.cells[index];
                    let found = target != index
                        && !self.grid.cells[target].is_empty()
                        && self.grid.cells[target].is_friend(cell);
                    let cell = &mut self.grid.cells[index];
                    if found {
                        cell.counter = u32::from(i_param2);
                        took_jump = true;
                    } else {
                        cell.counter = cell.counter.wrapping_add(3);
                    }
                }
                Some(Opcode::Counter) => {
                    self.grid.cells[index].counter = u32::from(i_param1);
                    took_jump = true;
                }
                Some(Opcode::Death) => {
                    // Executing Death also runs the energy check below, as
                    // one instruction.
                    let cell = &mut self.grid.cells[index];
                    cell.genome.write(0, Opcode::Death.byte());
                    if cell.energy >= param1 * 100.0 {
                        cell.counter = u32::from(i_param2);
                        took_jump = true;
                    } else {
                        cell.counter = cell.counter.wrapping_add(3);
                    }
                }
                Some(Opcode::DetectEnergy) => {
                    let cell = &mut self.grid.cells[index];
                    if cell.energy >= param1 * 100.0 {
                        cell.counter = u32::from(i_param2);
                        took_jump = true;
                    } else {
                        cell.counter = cell.counter.wrapping_add(3);
                    }
                }
                None => {}
            }

            if took_jump && !jumped {
                jumped = true;
                continue;
            }
            break;
        }

        // Forward progress: a dispatch that left the counter in place would
        // otherwise pin the cell on one instruction forever.
        {
            let cell = &mut self.grid.cells[index];
            if cell.counter == start_counter {
                cell.counter = cell.counter.wrapping_add(1);
            }
        }

        let age = self.grid.cells[index].age;
        if self.rng.random_range(0..=age) > self.config.mutation_age_threshold {
            self.mutate_cell(index);
            self.grid.cells[index].age = 0;
        }

        let cell = &mut self.grid.cells[index];
        cell.age = cell.age.saturating_add(1);
        cell.energy -= self.config.upkeep_cost;
        index
    }

    /// Overwrite one uniformly chosen genome slot with a uniform byte and
    /// recompute the identity digest.
    fn mutate_cell(&mut self, index: usize) {
        let slot = self.rng.random_range(0..self.config.genome_len);
        let value = self.rng.random::<u8>();
        let genome = &mut self.grid.cells[index].genome;
        genome.write(slot, value);
        genome.rehash();
    }

    fn roll_reproduction_mutation(&mut self) -> bool {
        let span = 10 * u64::from(self.config.mutation_ratio);
        self.rng.random_range(0..=span) == 1
    }

    fn record_summary(&mut self, reseeded: bool) {
        let mut live_cells = 0usize;
        let mut total_energy = 0.0f32;
        for cell in &self.grid.cells {
            if !cell.is_dead() {
                live_cells += 1;
                total_energy += cell.energy;
            }
        }
        let average_energy = if live_cells > 0 {
            total_energy / live_cells as f32
        } else {
            0.0
        };
        let summary = TickSummary {
            tick: self.tick,
            live_cells,
            total_energy,
            average_energy,
            reseeded,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }
}
