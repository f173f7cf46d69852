//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the engine
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Crowd simulations replayed from the same orders must land on the same
//! state bit for bit. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`horde_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The engine only iterates ordered maps and handle-ordered lists.
//!
//! - **Parallel passes**: Read phases run on the `rayon` pool. Their
//!   results are collected back in handle order before anything is written.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual module behaviour (grid, combat, ledger, ...)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full engine scenarios are reproducible
//! 4. **Parallel tests**: Running N engines on separate threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use horde_core::simulation::{fixed_tick_delta, SimulationEngine};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic engine).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the engine was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Engine is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel engine runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each engine.
    pub hashes: Vec<u64>,
    /// Number of ticks each engine ran.
    pub ticks: u64,
    /// Number of engines run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all engines produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all engines matched.
    ///
    /// # Panics
    ///
    /// Panics if engines produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel engines diverged!\n\
                 Engines: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use horde_test_utils::determinism::verify_determinism;
/// use horde_test_utils::fixtures::battle_scenario;
/// use horde_core::simulation::fixed_tick_delta;
///
/// let result = verify_determinism(
///     3,  // Run 3 times
///     40, // 40 ticks each
///     || battle_scenario(8),
///     |engine| { engine.tick(fixed_tick_delta()); },
///     |engine| engine.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`SimulationEngine`].
///
/// Runs the engine twice with identical setup at the fixed tick rate and
/// verifies the final state hashes match exactly.
pub fn verify_engine_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> SimulationEngine,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |engine| {
            engine.tick(fixed_tick_delta());
        },
        |engine| engine.state_hash(),
    );
    result.is_deterministic
}

/// Run N engines on separate threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_simulations<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> SimulationEngine + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut engine = setup_fn();
                    for _ in 0..num_ticks {
                        engine.tick(fixed_tick_delta());
                    }
                    engine.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two engine runs tick-by-tick, finding first divergence.
///
/// `step` drives one tick (behaviour decisions plus [`SimulationEngine::tick`]).
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F, Step>(setup_fn: F, step: Step, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> SimulationEngine,
    Step: Fn(&mut SimulationEngine),
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step(&mut first);
        step(&mut second);

        if first.state_hash() != second.state_hash() {
            tracing::warn!(tick, "Engine runs diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that serialization round-trip preserves engine state exactly.
///
/// Also checks that the restored engine keeps evolving identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> SimulationEngine,
{
    let mut engine = setup_fn();

    for _ in 0..num_ticks {
        engine.tick(fixed_tick_delta());
    }

    let Ok(bytes) = engine.serialize() else {
        return false;
    };
    let Ok(mut restored) = SimulationEngine::deserialize(&bytes) else {
        return false;
    };

    if engine.state_hash() != restored.state_hash() {
        return false;
    }

    for _ in 0..10 {
        engine.tick(fixed_tick_delta());
        restored.tick(fixed_tick_delta());
    }
    engine.state_hash() == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the engine.
pub mod strategies {
    use horde_core::components::{ArmorType, DamageType};
    use horde_core::economy::ResourceType;
    use horde_core::math::{Fixed, Vec3Fixed};
    use proptest::prelude::*;

    /// Generate a fixed-point coordinate in a reasonable range for positions.
    ///
    /// Range: -10000 to 10000 (typical map size)
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-10000i32..10000i32).prop_map(Fixed::from_num)
    }

    /// Generate a ground-plane position.
    pub fn arb_ground_position() -> impl Strategy<Value = Vec3Fixed> {
        (arb_fixed_position(), arb_fixed_position())
            .prop_map(|(x, y)| Vec3Fixed::new(x, y, Fixed::ZERO))
    }

    /// Generate a position with some height.
    pub fn arb_position() -> impl Strategy<Value = Vec3Fixed> {
        (arb_fixed_position(), arb_fixed_position(), 0i32..500)
            .prop_map(|(x, y, z)| Vec3Fixed::new(x, y, Fixed::from_num(z)))
    }

    /// Generate a team number, including neutral.
    pub fn arb_team() -> impl Strategy<Value = i32> {
        -1i32..4
    }

    /// Generate an armor type.
    pub fn arb_armor() -> impl Strategy<Value = ArmorType> {
        prop_oneof![
            Just(ArmorType::Heavy),
            Just(ArmorType::Light),
            Just(ArmorType::Medium),
            Just(ArmorType::None),
        ]
    }

    /// Generate a damage type.
    pub fn arb_damage_type() -> impl Strategy<Value = DamageType> {
        prop_oneof![
            Just(DamageType::Normal),
            Just(DamageType::Piercing),
            Just(DamageType::Slashing),
            Just(DamageType::Blunt),
        ]
    }

    /// Generate max hit points.
    pub fn arb_health() -> impl Strategy<Value = i32> {
        1i32..500
    }

    /// Generate a damage amount.
    pub fn arb_damage() -> impl Strategy<Value = Fixed> {
        (0i32..200).prop_map(Fixed::from_num)
    }

    /// Generate a search radius.
    pub fn arb_radius() -> impl Strategy<Value = Fixed> {
        (1i32..3000).prop_map(Fixed::from_num)
    }

    /// Generate a primary resource type.
    pub fn arb_primary_resource() -> impl Strategy<Value = ResourceType> {
        prop_oneof![
            Just(ResourceType::Gold),
            Just(ResourceType::Wood),
            Just(ResourceType::Stone),
            Just(ResourceType::Food),
        ]
    }

    /// Parameters for spawning a test entity.
    #[derive(Debug, Clone)]
    pub struct TestEntityParams {
        /// Position.
        pub position: Vec3Fixed,
        /// Team number.
        pub team: i32,
        /// Max hit points.
        pub health: i32,
        /// Armor.
        pub armor: ArmorType,
    }

    /// Generate parameters for a test entity.
    pub fn arb_entity_params() -> impl Strategy<Value = TestEntityParams> {
        (arb_ground_position(), arb_team(), arb_health(), arb_armor()).prop_map(
            |(position, team, health, armor)| TestEntityParams {
                position,
                team,
                health,
                armor,
            },
        )
    }

    /// Generate a list of entity spawn parameters.
    pub fn arb_entity_list(max_entities: usize) -> impl Strategy<Value = Vec<TestEntityParams>> {
        proptest::collection::vec(arb_entity_params(), 1..max_entities)
    }
}
