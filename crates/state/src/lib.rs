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

//! Process-scope shared state: counters, the client registry, the
//! device-to-client routing table, and the save flag. Everything here is
//! cheap to read, guarded the minimum amount necessary, and meant to be
//! wrapped in an `Arc` once at startup and cloned into every worker.

pub mod counters;
pub mod registry;
pub mod routing;
pub mod save_flag;

pub use counters::{Counters, Snapshot};
pub use registry::{ClientRegistry, ConnectionId};
pub use routing::RoutingTable;
pub use save_flag::SaveFlag;
