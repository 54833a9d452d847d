//! Windsite - actor-based siting workflow backend with REST API
//!
//! This crate provides the orchestration server for wind-farm siting
//! workflows: query classification, tool worker dispatch, and a polled
//! progress ledger.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod geometry;
pub mod intent;
pub mod placement;
pub mod polling;
pub mod workers;
