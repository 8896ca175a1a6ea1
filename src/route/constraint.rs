//! Structural binding: verb, path pattern and ordering.

use crate::error::WebError;
use crate::route::descriptor::RouteDescriptor;
use crate::route::pattern::PathPattern;
use crate::route::table::{LiveRoute, RouteSlot};
use std::cmp::Ordering;

pub struct ConstraintBinder;

impl ConstraintBinder {
    pub fn bind(slot: &mut RouteSlot, descriptor: &RouteDescriptor) -> Result<(), WebError> {
        let pattern = PathPattern::parse(&descriptor.path).map_err(|reason| {
            WebError::invalid_descriptor(
                "constraint",
                descriptor.method.as_str(),
                &descriptor.path,
                &reason,
            )
        })?;
        slot.method = Some(descriptor.method.clone());
        slot.pattern = Some(pattern);
        slot.order = descriptor.order;
        Ok(())
    }

    /// Match precedence between two live routes: explicit order ascending, then the
    /// longer literal prefix, then declaration order. Total and deterministic.
    pub fn precedence(a: &LiveRoute, b: &LiveRoute) -> Ordering {
        a.order
            .cmp(&b.order)
            .then_with(|| b.pattern.literal_prefix().cmp(&a.pattern.literal_prefix()))
            .then_with(|| a.declared.cmp(&b.declared))
    }
}
