//! Worker versions and their lifecycle
//!
//! A worker version is installed (core partition filled from the manifest),
//! then activated (stale partitions removed, pages claimed and notified).
//! `Registration` tracks the active version and one waiting version and
//! handles control messages posted by pages.

mod clients;
mod lifecycle;
mod messages;
mod registration;

pub use clients::{Client, ClientHub};
pub use lifecycle::{
    ActivationReport, InstallReport, ManifestFailureReason, ManifestFetchFailure, ServiceWorker,
    WorkerError, WorkerState,
};
pub use messages::{ControlMessage, MessageError, WorkerMessage};
pub use registration::{MessageOutcome, RegisterReport, Registration};
