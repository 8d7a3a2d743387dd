//! Shared application state handed to every connection handler, mirroring
//! the teacher's `AppState` convention of one small `Clone` struct built
//! once at startup and threaded through the router.

use std::sync::Arc;

use broker::BrokerAdapter;
use state::{ClientRegistry, Counters, SaveFlag};
use store::Store;

use crate::handle::WsHandle;

/// State shared by every connection handler.
#[derive(Clone)]
pub struct AppState {
    /// The client registry connections are added to and removed from.
    pub registry: Arc<ClientRegistry<WsHandle>>,
    /// The process-wide save flag, mutated by `"save"` control messages.
    pub save_flag: Arc<SaveFlag>,
    /// Process-wide counters.
    pub counters: Arc<Counters>,
    /// The relational store, used for client-session bookkeeping.
    pub store: Arc<dyn Store>,
    /// The broker adapter, used to echo slider control messages.
    pub broker: BrokerAdapter,
}
