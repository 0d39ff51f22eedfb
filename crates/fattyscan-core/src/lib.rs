/// FattyScan Core — scanning, progress estimation, and tree projection.
///
/// This crate contains all scan logic with zero UI dependencies. Frontends
/// drive it through a [`ScanSession`] and render the [`ProjectedNode`]
/// views it hands back.
///
/// # Modules
///
/// - [`model`] — Compressed arena tree, projected view nodes, size helpers.
/// - [`scanner`] — Recursive walker and dual-mode progress estimator.
/// - [`query`] — Bounded, filtered projection of the compressed tree.
/// - [`session`] — Scan lifecycle, background thread, and event delivery.
/// - [`platform`] — Volume enumeration and per-entry hazard checks.
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod query;
pub mod scanner;
pub mod session;

pub use config::ScanConfig;
pub use error::ScanError;
pub use model::{ProjectedNode, OTHERS_NAME};
pub use scanner::ProgressSnapshot;
pub use session::{ListenerId, ScanEvent, ScanListener, ScanSession, ScanState};
