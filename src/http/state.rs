use std::sync::Arc;

use crate::app_context::ServerContext;

/// Cloneable handle to the server's shared dependencies; axum clones this
/// per request, so everything inside is already `Arc`-backed or cheap.
#[derive(Clone)]
pub struct AppState(pub Arc<ServerContext>);

impl AppState {
    pub fn new(context: ServerContext) -> Self {
        Self(Arc::new(context))
    }
}

impl std::ops::Deref for AppState {
    type Target = ServerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
