//! LocaFi Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam between the estimation engine and
//! the outside world, allowing the same session code to run in **Production**
//! (tokio) and **Simulation** (virtual clock) environments.
//!
//! # What lives behind the seam
//!
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Scan acquisition (`ScanSource::next_scan()`)
//! - Known access point positions (`AccessPointDirectory::position()`)
//!
//! Everything that crosses the seam is plain data: scan batches, raw
//! coordinates and reference fixes. Validation of that data happens on the
//! engine side, so nothing here can smuggle an invalid coordinate into the
//! geometry.
//!
//! # Example
//!
//! ```ignore
//! use locafi_env::{LocaFiContext, ScanSource};
//!
//! async fn scan_loop<Ctx: LocaFiContext, Src: ScanSource>(ctx: &Ctx, src: &Src) {
//!     while let Ok(Some(batch)) = src.next_scan().await {
//!         handle(batch);
//!         ctx.sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```

mod context;
mod scanner;
mod types;
mod error;
mod tokio_impl;

pub use context::LocaFiContext;
pub use scanner::{AccessPointDirectory, ScanSource, ScanController};
pub use types::{AccessPointId, RawPosition, RawReading, ReferenceFix, ScanBatch, SessionId};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
