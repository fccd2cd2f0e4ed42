//! `embernode`: an `abscissa_core`-based daemon binary that wires
//! `ember-network`'s peer group to `ember-consensus`'s full-pruned block
//! chain engine.

#![forbid(unsafe_code)]

pub mod application;
pub mod commands;
pub mod config;
pub mod prelude;
