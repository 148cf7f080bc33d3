//! Converge Engine - async operation execution
//!
//! Provides:
//! - The `Controller` contract and the generic create-or-update and delete
//!   controllers
//! - `ControllerRegistry`, the explicit routing table built at startup
//! - The async operation `Worker`
//! - Worker configuration loading

pub mod config;
pub mod controller;
pub mod errors;
pub mod registry;
pub mod worker;

pub use config::WorkerConfig;
pub use controller::{
    BaseController, Controller, ControllerOptions, ControllerResult, CreateOrUpdateResource,
    DeleteResource, Request,
};
pub use registry::ControllerRegistry;
pub use worker::{Worker, WorkerOptions};
