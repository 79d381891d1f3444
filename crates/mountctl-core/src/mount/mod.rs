//! Mount motion control
//!
//! [`MotionStateMachine`] owns the mount's position and [`MountState`] and is
//! the only thing that mutates them. Callers issue intents (slew, park,
//! home, jog, abort) and drive progress with one `tick` per cycle.

mod error;
mod events;
mod machine;
mod state;

pub use error::MountError;
pub use events::MountEvent;
pub use machine::{MotionStateMachine, SlewGoal};
pub use state::{meridian_distance, AxisSide, MountState};
