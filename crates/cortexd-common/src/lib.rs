//! Shared types for the cortexd daemon: the alert and health-snapshot data
//! model, collector result types, id generation, and the [`Service`]
//! lifecycle trait implemented by every long-running component.

pub mod id;
pub mod service;
pub mod types;

pub use service::Service;
pub use types::{
    Alert, AlertType, CveResult, CveSeverity, HealthSnapshot, PackageUpdate, Severity,
};
