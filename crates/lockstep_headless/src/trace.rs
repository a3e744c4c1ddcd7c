//! Per-tick hash traces.
//!
//! A trace is the state hash after every tick of a run. Two peers (or a
//! recording and its re-simulation) that disagree on the final hash can
//! compare traces to find the first frame where they split.

use std::path::Path;

use serde::{Deserialize, Serialize};

use lockstep_core::simulation::{Simulation, TickEvents};

use crate::error::{HeadlessError, Result};

/// State after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Frame the simulation is at after the tick.
    pub frame: u64,
    /// Body state hash.
    pub state_hash: i64,
    /// Hash including ability variables.
    pub detailed_hash: i64,
    /// Active agents.
    pub agents: usize,
    /// Agents spawned at this tick's drain.
    pub spawned: usize,
    /// Agents destroyed at this tick's drain.
    pub destroyed: usize,
}

impl TickRecord {
    /// Capture the state right after a tick returned `events`.
    #[must_use]
    pub fn capture(sim: &Simulation, events: &TickEvents) -> Self {
        Self {
            frame: sim.frame(),
            state_hash: sim.state_hash(),
            detailed_hash: sim.detailed_state_hash(),
            agents: sim.registry().agent_count(),
            spawned: events.spawned.len(),
            destroyed: events.destroyed.len(),
        }
    }
}

/// Hashes of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTrace {
    /// Scenario the run belongs to.
    pub scenario_id: String,
    /// One record per tick, in order.
    pub ticks: Vec<TickRecord>,
}

impl HashTrace {
    /// Empty trace.
    #[must_use]
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            ticks: Vec::new(),
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: TickRecord) {
        self.ticks.push(record);
    }

    /// Hash after the last tick, if any tick ran.
    #[must_use]
    pub fn final_hash(&self) -> Option<i64> {
        self.ticks.last().map(|record| record.state_hash)
    }

    /// First frame present in both traces whose detailed hashes differ.
    #[must_use]
    pub fn first_divergence(&self, other: &Self) -> Option<u64> {
        let mut theirs = other.ticks.iter().peekable();
        for mine in &self.ticks {
            while theirs.next_if(|record| record.frame < mine.frame).is_some() {}
            match theirs.peek() {
                Some(record) if record.frame == mine.frame => {
                    if record.detailed_hash != mine.detailed_hash {
                        return Some(mine.frame);
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
        None
    }

    /// Write as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a trace written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HeadlessError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
