//! Compiles descriptors into live routes: verify, bind structure, bind negotiation,
//! resolve and attach the handler.

use crate::error::WebError;
use crate::relay::RelayBus;
use crate::route::constraint::ConstraintBinder;
use crate::route::descriptor::{HandlerKind, RouteDescriptor};
use crate::route::negotiation::{MediaSet, NegotiationBinder};
use crate::route::pattern::PathPattern;
use crate::route::resolver::HandlerResolver;
use crate::route::table::{RouteSink, RouteTable, Routes};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct CompileReport {
    pub mounted: usize,
    /// Descriptors without an action.
    pub skipped: usize,
    pub rejected: Vec<WebError>,
}

pub struct RouteCompiler {
    resolver: HandlerResolver,
}

impl RouteCompiler {
    pub fn new(bus: Arc<RelayBus>) -> Self {
        RouteCompiler {
            resolver: HandlerResolver::new(bus),
        }
    }

    /// Mounts every valid descriptor onto `sink`. Failures are per descriptor and
    /// never stop the rest of the set.
    pub fn compile<S>(&self, descriptors: &[RouteDescriptor], sink: &mut S) -> CompileReport
    where
        S: RouteSink + ?Sized,
    {
        let mut report = CompileReport::default();
        for descriptor in descriptors {
            if descriptor.action.is_none() {
                tracing::warn!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    "route has no action, skipping"
                );
                report.skipped += 1;
                continue;
            }
            match self.mount(descriptor, sink) {
                Ok(()) => report.mounted += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "route rejected");
                    report.rejected.push(e);
                }
            }
        }
        tracing::debug!(
            mounted = report.mounted,
            skipped = report.skipped,
            rejected = report.rejected.len(),
            "routes compiled"
        );
        report
    }

    /// Compiles into a fresh [`RouteTable`] and freezes it.
    pub fn build(&self, descriptors: &[RouteDescriptor]) -> (Routes, CompileReport) {
        let mut table = RouteTable::new();
        let report = self.compile(descriptors, &mut table);
        (table.freeze(), report)
    }

    fn mount<S>(&self, descriptor: &RouteDescriptor, sink: &mut S) -> Result<(), WebError>
    where
        S: RouteSink + ?Sized,
    {
        verify(descriptor)?;
        let slot = sink.route();
        ConstraintBinder::bind(slot, descriptor)?;
        NegotiationBinder::bind(slot, descriptor)?;
        slot.attach(self.resolver.resolve(descriptor)?);
        Ok(())
    }
}

/// Checks that binding cannot fail once a slot is taken.
fn verify(descriptor: &RouteDescriptor) -> Result<(), WebError> {
    let reject = |reason: &str| {
        WebError::invalid_descriptor(
            "compiler",
            descriptor.method.as_str(),
            &descriptor.path,
            reason,
        )
    };
    PathPattern::parse(&descriptor.path).map_err(|r| reject(&r))?;
    MediaSet::parse(&descriptor.consumes, &descriptor.produces).map_err(|r| reject(&r))?;
    if let HandlerKind::Relay { address } = &descriptor.kind {
        if address.trim().is_empty() {
            return Err(reject("relay address is empty"));
        }
    }
    Ok(())
}
