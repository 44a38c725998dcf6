//! # stepline Planner
//!
//! Turns scripts of moves, waits, delays and triggers into sampled,
//! acceleration-bounded motion:
//!
//! 1. [`ScriptBuilder`] assembles an immutable [`Script`]
//! 2. [`Planner`] builds the [`Segment`] chain and its [`Atdc`] profiles
//! 3. [`Slicer`] resamples the profiles into fixed-period [`Section`]s

pub mod action;
pub mod atdc;
pub mod planner;
pub mod script;
pub mod section;
pub mod segment;
pub mod slicer;

pub use action::{Action, TriggerCallback, TriggerEvent};
pub use atdc::Atdc;
pub use planner::{Plan, PlanItem, Planner};
pub use script::{Script, ScriptBuilder, Waypoint};
pub use section::Section;
pub use segment::{Segment, MIN_SEGMENT_LENGTH};
pub use slicer::{Slicer, DEFAULT_MAX_DURATION, DEFAULT_PERIOD};
