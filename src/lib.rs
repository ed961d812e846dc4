//! # apartment-finder
//!
//! Works out which COM apartment threading model governs calls into a class,
//! combining its registration, the capabilities of a live instance, and the
//! proxy/stub that marshals its interfaces out of process.
//!
//! ## Architecture
//!
//! - **guid**: CLSID/IID values and the well-known identifiers
//! - **model**: threading models, provenance, and two-regime profiles
//! - **backend**: contracts for the registry and the component runtime
//! - **apartment**: scoped apartment entry for the probing thread
//! - **registry**: `ThreadingModel` classification from class registration
//! - **probe**: `IAgileObject` and free-threaded marshaler detection
//! - **reconcile**: registry seed plus probe refinement
//! - **proxy**: proxy/stub class resolution for an interface
//! - **resolve**: in-process / local-server orchestration
//! - **report**: text and JSON rendering
//! - **fixture**: JSON-described registry and runtime for offline runs
//! - **sys**: the live Windows registry and COM runtime

pub mod apartment;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixture;
pub mod guid;
pub mod model;
pub mod probe;
pub mod proxy;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod resolve;
#[cfg(windows)]
pub mod sys;
pub mod telemetry;
