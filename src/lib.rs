//! # Switchboard Core - Integration Dispatch Gateway
//!
//! Rust implementation of the switchboard engine providing:
//! - Canonical alias resolution for rebranded integrations
//! - A typed plugin catalog resolved per invocation (no reflection)
//! - Event fan-out with per-integration isolation and deadlines
//! - Single-target operations with a structured error body
//! - Token-aware status classification
//! - Object history with idempotent (object, team, integration) upserts
//!
//! ## Architecture
//!
//! Events and requests enter through the `Gateway`, which owns the plugin
//! seam and everything above it:
//! ```text
//!                     ┌─────────────────────────────────┐
//!  events/requests →  │             Gateway             │
//!                     │  ┌─────────┐ ┌─────────┐        │
//!                     │  │ Plugin  │ │Dispatch │        │
//!                     │  │ Catalog │ │ Engine  │        │
//!                     │  └─────────┘ └─────────┘        │
//!                     │  ┌─────────┐ ┌─────────┐        │
//!                     │  │Registry │ │ Object  │        │
//!                     │  │  Rows   │ │ History │        │
//!                     │  └─────────┘ └─────────┘        │
//!                     └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod capability;
pub mod dispatch;
pub mod event;
pub mod gateway;
pub mod integration;
pub mod locator;
pub mod registry;
pub mod status;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use types::{Config, Error, Result};
