//! Core plumbing for LineUp.
//!
//! This crate provides the building blocks the ranking engine is made of:
//!
//! - **Event Dispatch**: typed, multi-kind events with forwarding and RAII
//!   subscription handles ([`EventDispatcher`], [`Subscription`])
//! - **Debouncing**: host-pumped, per-key coalescing of repeated triggers
//!   ([`Debouncer`])
//! - **Properties**: value cells with change detection ([`Property`])
//! - **Logging**: `tracing` targets and tree formatting for diagnostics
//!
//! # Example
//!
//! ```
//! use lineup_core::{EventDispatcher, EventKind, Property};
//!
//! struct Column {
//!     width: Property<f64>,
//!     events: EventDispatcher<(f64, f64)>,
//! }
//!
//! impl Column {
//!     fn set_width(&self, width: f64) {
//!         if let Some(old) = self.width.replace(width) {
//!             self.events.emit(&[EventKind::WidthChanged, EventKind::Dirty], (old, width));
//!         }
//!     }
//! }
//!
//! let column = Column { width: Property::new(100.0), events: EventDispatcher::new() };
//! let _sub = column.events.subscribe(&[EventKind::WidthChanged], |ctx| {
//!     assert_eq!(*ctx.payload, (100.0, 120.0));
//! });
//! column.set_width(120.0);
//! ```

mod debounce;
mod error;
pub mod event;
pub mod logging;
pub mod property;

pub use debounce::Debouncer;
pub use error::{CoreError, Result};
pub use event::{DispatcherId, EventContext, EventDispatcher, EventKind, Subscription, SubscriptionId};
pub use logging::{DebugNode, TreeDebug, TreeFormatOptions, TreeStyle};
pub use property::Property;
