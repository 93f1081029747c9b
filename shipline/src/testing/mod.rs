//! Testing utilities for shipline pipelines.
//!
//! This module provides:
//! - Scripted in-memory executor capabilities with a shared call log
//! - A static secrets provider
//! - Reference pipeline definitions

mod fixtures;
mod mocks;

pub use fixtures::{delivery_pipeline, gated_promotion_pipeline, scripted_registry};
pub use mocks::{CallLog, CallRecord, ScriptedCapabilities, StaticSecrets};
