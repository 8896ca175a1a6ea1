//! Filter chain wrapping route handlers.
//!
//! A filter either ends the exchange by writing a reply or hands control to the
//! rest of the chain through [`Next::run`]. Work after `run` returns sees the
//! handler's reply through [`Exchange::reply_mut`]. `Next` refuses to relay once the
//! exchange has ended, so a filter that both replies and continues cannot
//! dispatch twice onto a finished exchange.

mod exchange;
mod request_id;

pub use exchange::{ContextStore, Cookie, Exchange, Session};
pub use request_id::{RequestIdFilter, REQUEST_ID_HEADER, REQUEST_ID_KEY};

use crate::error::WebError;
use crate::route::resolver::RouteHandler;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Filter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError>;

    /// The exchange context; failing here means the filter ran outside a chain.
    fn context<'e>(&self, exchange: &'e mut Exchange) -> Result<&'e mut crate::filter::ContextStore, WebError> {
        exchange
            .context_mut()
            .ok_or_else(|| WebError::filter_context_missing(self.name()))
    }
}

/// Continue capability handed to each filter. Consumed on use.
pub struct Next<'a> {
    filters: &'a [Arc<dyn Filter>],
    handler: &'a dyn RouteHandler,
}

impl<'a> Next<'a> {
    pub fn new(filters: &'a [Arc<dyn Filter>], handler: &'a dyn RouteHandler) -> Self {
        Next { filters, handler }
    }

    /// Relays to the next filter, or to the handler after the last one.
    /// A no-op when the exchange has already ended.
    pub async fn run(self, exchange: &mut Exchange) -> Result<(), WebError> {
        if exchange.ended() {
            tracing::debug!(path = %exchange.path(), "exchange already ended, not relaying");
            return Ok(());
        }
        match self.filters.split_first() {
            Some((filter, rest)) => {
                tracing::trace!(filter = filter.name(), "filter");
                filter
                    .do_filter(exchange, Next::new(rest, self.handler))
                    .await
            }
            None => self.handler.handle(exchange).await,
        }
    }
}

/// Ordered filters, shared by every route.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain::default()
    }

    pub fn with<F: Filter>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Initialises the context, runs the filters and the handler, and checks that
    /// something ended the exchange.
    pub async fn execute(
        &self,
        exchange: &mut Exchange,
        handler: &dyn RouteHandler,
    ) -> Result<(), WebError> {
        exchange.init_context();
        Next::new(&self.filters, handler).run(exchange).await?;
        if !exchange.ended() {
            return Err(WebError::filter_chain_incomplete(exchange.path()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::response::Reply;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RouteHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, exchange: &mut Exchange) -> Result<(), WebError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let seen = exchange.context().and_then(|c| c.get("seen")).cloned();
            exchange.end(Reply::json(json!({ "seen": seen })));
            Ok(())
        }
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Filter for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
            let ctx = self.context(exchange)?;
            let mut seen = ctx.get("seen").and_then(Value::as_str).unwrap_or("").to_string();
            seen.push_str(self.0);
            ctx.put("seen", seen);
            next.run(exchange).await
        }
    }

    struct Deny;

    #[async_trait]
    impl Filter for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        async fn do_filter(&self, exchange: &mut Exchange, _next: Next<'_>) -> Result<(), WebError> {
            exchange.end(Reply::status(StatusCode::FORBIDDEN));
            Ok(())
        }
    }

    /// Writes a reply and then still calls next.
    struct ReplyThenContinue;

    #[async_trait]
    impl Filter for ReplyThenContinue {
        fn name(&self) -> &'static str {
            "reply-then-continue"
        }

        async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
            exchange.end(Reply::status(StatusCode::ACCEPTED));
            next.run(exchange).await
        }
    }

    /// Stamps every reply produced further down the chain.
    struct Stamp;

    #[async_trait]
    impl Filter for Stamp {
        fn name(&self) -> &'static str {
            "stamp"
        }

        async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
            next.run(exchange).await?;
            if let Some(reply) = exchange.reply_mut() {
                reply
                    .headers
                    .insert("x-stamped", HeaderValue::from_static("yes"));
            }
            Ok(())
        }
    }

    struct Silent;

    #[async_trait]
    impl Filter for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn do_filter(&self, _exchange: &mut Exchange, _next: Next<'_>) -> Result<(), WebError> {
            Ok(())
        }
    }

    fn exchange() -> Exchange {
        Exchange::new(Method::GET, "/f".parse().unwrap(), HeaderMap::new(), Value::Null)
    }

    #[tokio::test]
    async fn filters_run_in_order_before_handler() {
        let chain = FilterChain::new().with(Tag("a")).with(Tag("b"));
        let handler = Counting::default();
        let mut ex = exchange();
        chain.execute(&mut ex, &handler).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ex.reply().unwrap().body, Some(json!({ "seen": "ab" })));
        assert_eq!(chain.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn filter_amends_reply_after_handler_runs() {
        let chain = FilterChain::new().with(Stamp).with(Tag("a"));
        let handler = Counting::default();
        let mut ex = exchange();
        chain.execute(&mut ex, &handler).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let reply = ex.reply().unwrap();
        assert_eq!(reply.headers.get("x-stamped").unwrap(), "yes");
        assert_eq!(reply.body, Some(json!({ "seen": "a" })));
    }

    #[tokio::test]
    async fn terminating_filter_skips_handler() {
        let chain = FilterChain::new().with(Deny).with(Tag("a"));
        let handler = Counting::default();
        let mut ex = exchange();
        chain.execute(&mut ex, &handler).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.reply().unwrap().status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn continue_after_end_is_a_no_op() {
        let chain = FilterChain::new().with(ReplyThenContinue);
        let handler = Counting::default();
        let mut ex = exchange();
        chain.execute(&mut ex, &handler).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.reply().unwrap().status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn chain_without_terminal_action_is_a_defect() {
        let chain = FilterChain::new().with(Silent);
        let handler = Counting::default();
        let mut ex = exchange();
        let err = chain.execute(&mut ex, &handler).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterChainIncomplete);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn filter_outside_chain_fails_fast() {
        let handler = Counting::default();
        let mut ex = exchange();
        let err = Next::new(&[Arc::new(Tag("a")) as Arc<dyn Filter>], &handler)
            .run(&mut ex)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterContextMissing);
        assert!(err.message().contains("a"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }
}
