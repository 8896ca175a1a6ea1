use crate::error::WebError;
use crate::filter::{Exchange, Filter, Next};
use async_trait::async_trait;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const REQUEST_ID_KEY: &str = "request_id";

/// Stores the inbound `x-request-id` (or a fresh UUID v4) in the context.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdFilter;

#[async_trait]
impl Filter for RequestIdFilter {
    fn name(&self) -> &'static str {
        "request-id"
    }

    async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
        let id = exchange
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.context(exchange)?.put(REQUEST_ID_KEY, id);
        next.run(exchange).await
    }
}
