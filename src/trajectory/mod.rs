//! Trajectory model for recorded agent execution.
//!
//! A trajectory is the complete, time-ordered sequence of steps produced for
//! one agent run. Each step is one of:
//! - **thinking**: extended reasoning from the thinking channel
//! - **assistant**: visible intermediate text
//! - **action**: a tool invocation with its name and arguments
//! - **tool_result**: the outcome of a tool invocation or a run failure
//! - **response**: the agent's final answer
//!
//! Steps are emitted by the [`crate::converter::EventConverter`] in arrival
//! order, which is not chronological. Collect every step of a run and sort
//! once at the end:
//!
//! ```rust
//! use agent_eval::trajectory::{StepType, Trajectory, TrajectoryStep};
//!
//! let steps = vec![
//!     TrajectoryStep::new(StepType::Response, 20, "done"),
//!     TrajectoryStep::new(StepType::Thinking, 10, "plan"),
//! ];
//! let trajectory = Trajectory::from_steps(steps);
//! assert_eq!(trajectory.steps()[0].step_type, StepType::Thinking);
//! ```

pub mod types;

pub use types::{new_step_id, sort_steps, StepStatus, StepType, Trajectory, TrajectoryStep};
