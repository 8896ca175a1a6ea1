//! Shared state for the dispatch fallback. Built once; read-only while serving.

use crate::filter::FilterChain;
use crate::route::Routes;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<Routes>,
    pub filters: Arc<FilterChain>,
}
