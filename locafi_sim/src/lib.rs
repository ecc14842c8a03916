//! LocaFi Deterministic Simulation Harness
//!
//! This crate runs tracking sessions against a simulated radio environment
//! where every source of non-determinism is controlled:
//! - **Time**: a virtual clock that advances per scan cycle
//! - **Signal**: path-loss RSSI with seeded Gaussian shadowing
//! - **Faults**: hidden access points, biased signals, radio timeouts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                          │
//! │  ┌──────────────┐   ScanBatch   ┌──────────────────────┐     │
//! │  │  SimScanner  │──────────────►│   TrackingSession    │     │
//! │  │ (+ faults)   │               │   <SimContext>       │     │
//! │  └──────▲───────┘               └──────────▲───────────┘     │
//! │         │ scans                             │ reference fixes │
//! │  ┌──────┴───────────────────────────────────┴──────────┐     │
//! │  │                      Oracle                          │     │
//! │  │  (ground-truth device, access points, noise)        │     │
//! │  └──────────────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use locafi_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).with_duration(30.0).run(ScenarioId::Walk)?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
mod runner;
mod scanner;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{LatLon, SimEvent, SimExport, SimFrame};
pub use oracle::{Oracle, SimAccessPoint, DETECTION_FLOOR_DBM};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scanner::{SimScanController, SimScanner};
pub use scenarios::ScenarioId;
