//! Named, cancelable background motion tasks
//!
//! Long-running shuttle motions (forced travel to a position) run as named
//! tasks stepped once per simulation tick. Starting a task under a name that
//! is already running cancels the previous task; callers rely on this
//! instead of polling for completion.

use crate::world::{Shuttle, Vec2};

/// A cooperative task advancing the shuttle each tick.
/// Returns true once finished, after which it is dropped.
pub trait ShuttleTask: Send {
    fn step(&mut self, shuttle: &mut Shuttle, dt: f32) -> bool;
}

/// Moves the shuttle in a straight line toward a target at a fixed speed,
/// ignoring ballast and steering
pub struct ForceShuttleToPos {
    target: Vec2,
    speed: f32,
}

impl ForceShuttleToPos {
    pub fn new(target: Vec2, speed: f32) -> Self {
        Self { target, speed }
    }
}

impl ShuttleTask for ForceShuttleToPos {
    fn step(&mut self, shuttle: &mut Shuttle, dt: f32) -> bool {
        let distance = shuttle.position.distance(self.target);
        let travel = self.speed * dt;
        if distance <= travel {
            shuttle.set_position(self.target);
            return true;
        }

        let dx = (self.target.x - shuttle.position.x) / distance;
        let dy = (self.target.y - shuttle.position.y) / distance;
        shuttle.velocity = Vec2::new(dx * self.speed, dy * self.speed);
        shuttle.position.x += dx * travel;
        shuttle.position.y += dy * travel;
        false
    }
}

struct NamedTask {
    name: String,
    task: Box<dyn ShuttleTask>,
}

/// Owns and steps all currently running named tasks
#[derive(Default)]
pub struct TaskManager {
    tasks: Vec<NamedTask>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a task, canceling any running task of the same name
    pub fn start(&mut self, task: Box<dyn ShuttleTask>, name: &str) {
        self.stop_named(name);
        self.tasks.push(NamedTask {
            name: name.to_string(),
            task,
        });
    }

    pub fn stop_named(&mut self, name: &str) {
        self.tasks.retain(|t| t.name != name);
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    /// Steps every task once; finished tasks are removed
    pub fn update(&mut self, shuttle: &mut Shuttle, dt: f32) {
        self.tasks.retain_mut(|t| !t.task.step(shuttle, dt));
    }
}
