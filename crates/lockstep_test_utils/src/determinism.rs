//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep peers only exchange commands, so every peer must reach the same
//! state from the same commands. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`lockstep_core::math::Fixed`]
//!   throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Agents are always visited in ascending global ID order and pools are
//!   kept in ordered maps.
//!
//! - **System randomness**: All "random" behavior draws from the seeded
//!   RNG owned by the agent registry.
//!
//! - **Save/load drift**: A restored session must keep ticking exactly like
//!   the original, including RNG state and ID free-lists.

use std::thread;

use lockstep_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<i64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<i64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
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

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use lockstep_test_utils::determinism::verify_determinism;
/// use lockstep_test_utils::fixtures::skirmish;
///
/// let result = verify_determinism(
///     3,
///     64,
///     || skirmish(5),
///     |sim| {
///         sim.tick();
///     },
///     |sim| sim.state_hash(),
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
    HashFn: Fn(&S) -> i64,
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

/// Run the simulation twice from the same setup and compare the detailed
/// state hash after `num_ticks`.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::detailed_state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under different scheduling
/// or memory layout.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<i64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    sim.run(num_ticks);
                    sim.detailed_state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(frame)` with the first
/// frame whose post-tick hashes differ (0 for differing setups).
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.detailed_state_hash() != sim2.detailed_state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.detailed_state_hash() != sim2.detailed_state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a bincode round-trip preserves the state exactly.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    sim.run(num_ticks);

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(restored) = Simulation::deserialize(&bytes, sim.data().clone(), sim.config().clone())
    else {
        return false;
    };

    restored.frame() == sim.frame() && restored.detailed_state_hash() == sim.detailed_state_hash()
}

/// Save after `split` ticks, restore into a fresh simulation, then run both
/// for `after` more ticks.
///
/// Returns the first frame at which the restored copy diverges, or `None`
/// if the two stay in lockstep. A snapshot that fails to restore counts as
/// divergence at the split frame.
pub fn find_restore_divergence<F>(setup_fn: F, split: u64, after: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut original = setup_fn();
    original.run(split);

    let Ok(mut restored) = Simulation::load(
        &original.save(),
        original.data().clone(),
        original.config().clone(),
    ) else {
        return Some(original.frame());
    };

    for _ in 0..after {
        original.tick();
        restored.tick();
        if original.detailed_state_hash() != restored.detailed_state_hash() {
            return Some(original.frame());
        }
    }
    None
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of simulation determinism.
pub mod strategies {
    use lockstep_core::command::CommandData;
    use lockstep_core::data::AbilityKind;
    use lockstep_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    /// Generate a fixed-point number in a reasonable range for positions.
    ///
    /// Range: -1000 to 1000
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-1000i32..1000i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D vector for positions.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a unit-ish facing direction.
    pub fn arb_direction() -> impl Strategy<Value = Vec2Fixed> {
        (-8i32..=8, -8i32..=8)
            .prop_filter("zero direction", |&(x, y)| x != 0 || y != 0)
            .prop_map(|(x, y)| Vec2Fixed::from_int(x, y).normalize())
    }

    /// Generate a seed for the shared RNG.
    pub fn arb_seed() -> impl Strategy<Value = u32> {
        any::<u32>()
    }

    /// An order for one agent: an ability kind and its payload.
    ///
    /// Targets name global IDs below `max_target`, which may or may not be
    /// live; dispatch ignores dead targets.
    pub fn arb_order(max_target: u16) -> impl Strategy<Value = (AbilityKind, CommandData)> {
        let max_target = max_target.max(1);
        prop_oneof![
            arb_vec2_position().prop_map(|p| (AbilityKind::Move, CommandData::Position(p))),
            arb_direction().prop_map(|d| (AbilityKind::Turn, CommandData::Position(d))),
            (0..max_target).prop_map(|t| (AbilityKind::Attack, CommandData::Target(t))),
            (0..max_target).prop_map(|t| (AbilityKind::Construct, CommandData::Target(t))),
            Just((AbilityKind::Move, CommandData::Stop)),
        ]
    }

    /// Generate a sequence of orders.
    pub fn arb_order_sequence(
        max_len: usize,
        max_target: u16,
    ) -> impl Strategy<Value = Vec<(AbilityKind, CommandData)>> {
        proptest::collection::vec(arb_order(max_target), 0..max_len)
    }

    /// Spawn parameters: code index into `codes`, position and facing.
    pub fn arb_spawn(codes: usize) -> impl Strategy<Value = (usize, Vec2Fixed, Vec2Fixed)> {
        (0..codes.max(1), arb_vec2_position(), arb_direction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{order, pos, skirmish, spawn, two_player_simulation};
    use lockstep_core::command::CommandData;
    use lockstep_core::data::AbilityKind;
    use lockstep_core::simulation::SimulationConfig;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0i64, |n| *n += 1, |n| *n);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes(), vec![10]);
    }

    #[test]
    fn test_detects_non_determinism() {
        let counter = std::cell::Cell::new(0i64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        assert!(verify_simulation_determinism(
            || two_player_simulation(SimulationConfig::default()).0,
            100
        ));
    }

    #[test]
    fn test_skirmish_determinism() {
        assert!(verify_simulation_determinism(|| skirmish(11), 320));
    }

    #[test]
    fn test_find_divergence_on_deterministic_sim() {
        assert_eq!(find_first_divergence(|| skirmish(3), 200), None);
    }

    #[test]
    fn test_find_divergence_on_differing_setups() {
        let flip = std::cell::Cell::new(false);
        let divergence = find_first_divergence(
            || {
                flip.set(!flip.get());
                let mut sim = skirmish(3);
                if flip.get() {
                    let scout = sim
                        .registry()
                        .active_agents()
                        .find(|agent| agent.code() == "scout")
                        .map(lockstep_core::agent::Agent::handle)
                        .unwrap();
                    order(&mut sim, scout, AbilityKind::Move, CommandData::Position(pos(0, 90)));
                }
                sim
            },
            50,
        );
        assert_eq!(divergence, Some(1));
    }

    #[test]
    fn test_serialization_preserves_skirmish() {
        assert!(verify_serialization_determinism(|| skirmish(9), 0));
        assert!(verify_serialization_determinism(|| skirmish(9), 97));
    }

    #[test]
    fn test_restore_stays_in_lockstep() {
        assert_eq!(find_restore_divergence(|| skirmish(21), 45, 300), None);
    }

    #[test]
    fn test_parallel_skirmish_simulations() {
        let result = run_parallel_simulations(|| skirmish(13), 4, 200);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_seed_changes_outcome() {
        let a = skirmish(1);
        let b = skirmish(2);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Random orders on a fixed cast of agents replay identically.
        #[test]
        fn prop_order_sequences_are_replayable(
            orders in strategies::arb_order_sequence(12, 6),
            seed in strategies::arb_seed(),
        ) {
            let setup = || {
                let (mut sim, red, blue) =
                    two_player_simulation(SimulationConfig::default().with_seed(seed));
                let agents = [
                    spawn(&mut sim, red, "worker", 0, 0),
                    spawn(&mut sim, red, "soldier", 2, 2),
                    spawn(&mut sim, blue, "scout", 6, 0),
                    spawn(&mut sim, blue, "depot", 4, -4),
                    spawn(&mut sim, blue, "soldier", 8, 3),
                ];
                for (i, (kind, payload)) in orders.iter().enumerate() {
                    let agent = agents[i % 3];
                    order(&mut sim, agent, *kind, payload.clone());
                }
                sim
            };
            prop_assert_eq!(find_first_divergence(setup, 120), None);
        }

        /// Save/load at any frame keeps lockstep.
        #[test]
        fn prop_restore_at_any_frame(split in 0u64..160, seed in strategies::arb_seed()) {
            prop_assert_eq!(find_restore_divergence(|| skirmish(seed), split, 80), None);
        }
    }
}
