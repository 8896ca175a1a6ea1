//! Declarative routes: descriptors compiled into live, negotiated routes.

pub mod compiler;
pub mod constraint;
pub mod descriptor;
pub mod negotiation;
pub mod pattern;
pub mod resolver;
pub mod table;

pub use compiler::{CompileReport, RouteCompiler};
pub use constraint::ConstraintBinder;
pub use descriptor::{Action, BoxFuture, Envelope, HandlerKind, RouteDescriptor};
pub use negotiation::{MediaSet, NegotiationBinder};
pub use pattern::PathPattern;
pub use resolver::{HandlerResolver, RouteHandler};
pub use table::{LiveRoute, RouteSink, RouteSlot, RouteTable, Routes};
