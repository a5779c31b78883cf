//! # meos-live
//!
//! Live orienteering results relay: reconciles the MOP feed from a
//! MeOS information server (or a built-in simulation) into a single
//! consistent in-memory model and pushes change notifications to
//! connected SSE viewers.
//!
//! - [`meos`]: reconciliation engine for the live upstream
//! - [`simulation`]: scripted competition generator, same contract
//! - [`state`]: concurrency-safe store with change detection
//! - [`sse`]: broadcast hub fanning out change events

pub mod adapter;
pub mod config;
pub mod error;
pub mod meos;
pub mod models;
pub mod server;
pub mod simulation;
pub mod sse;
pub mod state;

pub use error::{Error, Result};
