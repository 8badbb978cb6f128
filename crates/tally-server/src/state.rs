//! Shared handler state.

use tally_core::Service;

use crate::auth::AuthService;

/// Handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub service: Service,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(service: Service, auth: AuthService) -> Self {
        Self { service, auth }
    }
}
