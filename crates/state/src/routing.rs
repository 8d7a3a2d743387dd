//! The device-to-client routing table: which client identity should
//! receive broadcasts for a given device.

use std::collections::HashMap;
use std::sync::Mutex;

/// Client identity used when a device has no explicit route.
pub const DEFAULT_CLIENT_ID: &str = "1";

/// Static-ish mapping of device identifier to the client identity that
/// should receive its broadcasts. Mutable to allow a device to be routed
/// explicitly (e.g. from the endpoint handler), but reads vastly outnumber
/// writes in steady state.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Mutex<HashMap<String, String>>,
}

impl RoutingTable {
    /// Creates an empty routing table; every device defaults to
    /// [`DEFAULT_CLIENT_ID`] until routed explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `device_id` with `client_id`.
    pub fn set_route(&self, device_id: &str, client_id: &str) {
        let mut routes = self.routes.lock().expect("routing table lock poisoned");
        let _ = routes.insert(device_id.to_string(), client_id.to_string());
    }

    /// Resolves the client identity that should receive `device_id`'s
    /// broadcasts, falling back to [`DEFAULT_CLIENT_ID`] when unrouted.
    pub fn client_for(&self, device_id: &str) -> String {
        self.routes
            .lock()
            .expect("routing table lock poisoned")
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string())
    }
}
