//! Armreach - local command-line front end for the reachability engine
//!
//! Re-exports `armreach-core` and adds the structured JSON events the
//! `armreach` binary prints for solve sessions and single-point kinematics.
//!
//! # Usage
//!
//! ```text
//! armreach solve job.yaml          # local session, JSON result + quality
//! armreach fk 0 -60 100 0 -40 0    # forward kinematics (degrees)
//! armreach ik 1.8 0.0 0.1          # tool-tip IK in the robot base frame
//! ```

pub mod json_output;

pub use armreach_core::*;
pub use json_output::{ErrorEvent, ForwardEvent, InverseEvent, PoseOutput, SolveResultEvent};
