// src/supervisor/mod.rs

//! Process supervision through supervisord.
//!
//! - [`config`]: renders `<base_dir>/run/supervisord.conf` with one program
//!   for the broker, the sensors, the optional beat, and one worker per queue.
//! - [`ctl`]: the `start`/`stop`/`restart`/`status` verbs as supervisord /
//!   supervisorctl invocations.

pub mod config;
pub mod ctl;

pub use config::{command_lines, QueueProgram, SupervisorConfig};
pub use ctl::{Invocation, SupervisorVerb, run_invocation, run_verb};
