//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the collection sync core:
//! - Typed configuration and the option table
//! - Logging and tracing bootstrap
//! - Event bus
//!
//! ## Overview
//!
//! Every other core crate takes its settings from [`config`] and reports
//! progress through [`events`]. Nothing here is global: hosts build a
//! [`CoreConfig`](config::CoreConfig) and an [`EventBus`](events::EventBus)
//! once and pass them down.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
