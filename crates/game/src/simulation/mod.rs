mod command;
mod step;
mod tick;

pub use command::{Buttons, CommandBuffer, InputCommand, InputSlot};
pub use step::{AIM_EPSILON, EntityState, MOVE_SPEED, step};
pub use tick::{FixedTimestep, SimulationLoop, TickOutput};
