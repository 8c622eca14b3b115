//! Schema definitions for overseer
//!
//! This crate contains the data structures shared between the supervisor
//! core and its front-ends. All types here implement JSON Schema
//! generation for external consumption.

pub mod events;
pub mod process;


pub use events::*;
pub use process::*;
