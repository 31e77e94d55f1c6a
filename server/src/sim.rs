//! Simulation tick runner.
//!
//! Mirrors the engine's in-game loop semantics without any rendering:
//! systems run in registration order, each honoring its own
//! execute-every-N-frames cadence and running flag. Dedicated servers reuse
//! this to advance the world exactly like the windowed game would.

use shared::world::MemoryWorld;

/// One simulation system.
pub trait System<W>: Send {
    fn name(&self) -> &'static str;

    /// Runs the system against the world for one frame.
    fn execute(&mut self, world: &mut W);

    /// Execute only every N frames. 1 means every frame.
    fn every_n_frames(&self) -> u32 {
        1
    }

    /// Paused systems keep accumulating frames but never execute.
    fn running(&self) -> bool {
        true
    }
}

struct Registered<W> {
    system: Box<dyn System<W>>,
    frames_waited: u32,
}

/// Executes registered systems with the engine's frame semantics.
pub struct TickRunner<W> {
    systems: Vec<Registered<W>>,
}

impl<W> TickRunner<W> {
    pub fn new() -> Self {
        TickRunner {
            systems: Vec::new(),
        }
    }

    /// Appends a system; execution order is registration order.
    pub fn register(&mut self, system: Box<dyn System<W>>) {
        self.systems.push(Registered {
            system,
            frames_waited: 0,
        });
    }

    /// Runs one logical frame.
    pub fn run_one_frame(&mut self, world: &mut W) {
        for slot in &mut self.systems {
            slot.frames_waited += 1;
            if slot.system.running() && slot.frames_waited >= slot.system.every_n_frames() {
                slot.system.execute(world);
                slot.frames_waited = 0;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl<W> Default for TickRunner<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves [`MemoryWorld`] entities: applied forces first, then path targets.
#[derive(Debug, Default)]
pub struct MovementSystem;

impl MovementSystem {
    pub fn new() -> Self {
        MovementSystem
    }
}

impl System<MemoryWorld> for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn execute(&mut self, world: &mut MemoryWorld) {
        world.step_movement();
    }
}

/// Stock runner for the in-memory world used by the dev server.
pub fn memory_world_runner() -> TickRunner<MemoryWorld> {
    let mut runner = TickRunner::new();
    runner.register(Box::new(MovementSystem::new()));
    runner
}
