#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Per-device broadcast and persistence pipelines, lazily created and
//! never torn down for the life of the process.

pub mod broadcast;
pub mod framing;
pub mod manager;
pub mod persistence;
pub mod sink;

pub use broadcast::BroadcastTuning;
pub use manager::DevicePipelines;
pub use persistence::PersistenceTuning;
pub use sink::ConnectionSink;

/// All the errors of this crate. Record-level failures inside a worker
/// are counted, not propagated (see the specification's error handling
/// design); this enum is reserved for failures in setting up a pipeline
/// itself.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {}
