//! Typed event dispatch with forwarding and RAII subscriptions.
//!
//! Every entity of the ranking engine (columns, rankings, the provider) owns
//! an [`EventDispatcher`]. A single logical change is announced under several
//! [`EventKind`]s at once, e.g. a width edit emits
//! `[WidthChanged, DirtyHeader, DirtyValues, Dirty]`. All listeners of one
//! emit share the same payload and see the kind that *started* the emit as
//! [`EventContext::primary`].
//!
//! [`EventDispatcher::forward`] re-emits events raised on a child dispatcher
//! as if they were raised locally, keeping the original emitter as
//! [`EventContext::origin`]. This is how a leaf column's dirty notification
//! bubbles up through composites and rankings to the provider.
//!
//! # Re-entrancy
//!
//! Listeners are snapshotted before they are invoked, so a listener may
//! subscribe, drop subscriptions or emit further events without deadlocking.
//!
//! # Example
//!
//! ```
//! use lineup_core::{EventDispatcher, EventKind};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let column = EventDispatcher::<f64>::new();
//! let ranking = EventDispatcher::<f64>::new();
//! let _forward = ranking.forward(&column, &[EventKind::DirtyValues]);
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let seen_clone = seen.clone();
//! let _sub = ranking.subscribe(&[EventKind::DirtyValues], move |ctx| {
//!     assert_eq!(ctx.primary, EventKind::WidthChanged);
//!     seen_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! column.emit(&[EventKind::WidthChanged, EventKind::DirtyValues], 150.0);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::CoreError;
use crate::logging::targets;

new_key_type! {
    /// Identifies one listener within a dispatcher.
    pub struct SubscriptionId;
}

/// Process-unique identity of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatcherId(u64);

impl DispatcherId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

macro_rules! event_kinds {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)*) => {
        /// The kinds of events emitted by columns, rankings and providers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($(#[$doc])* $variant,)*
        }

        impl EventKind {
            /// Every event kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)*];

            /// The wire name of this event, e.g. `"dirtyValues"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)*
                }
            }
        }

        impl FromStr for EventKind {
            type Err = CoreError;

            /// Parses a name with an optional `.namespace` suffix, which is ignored.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let name = s.split('.').next().unwrap_or_default();
                if name.is_empty() {
                    return Err(CoreError::EmptyEventName);
                }
                match name {
                    $($name => Ok(EventKind::$variant),)*
                    other => Err(CoreError::UnknownEvent(other.to_string())),
                }
            }
        }
    };
}

event_kinds! {
    /// Umbrella notification: something changed.
    Dirty => "dirty",
    /// Display-only state changed.
    DirtyHeader => "dirtyHeader",
    /// Data or order derived from values is invalid.
    DirtyValues => "dirtyValues",
    /// Cached statistics are invalid.
    DirtyCaches => "dirtyCaches",
    /// Row order of a ranking must be recomputed.
    DirtyOrder => "dirtyOrder",
    WidthChanged => "widthChanged",
    VisibilityChanged => "visibilityChanged",
    LabelChanged => "labelChanged",
    MetaDataChanged => "metaDataChanged",
    RendererTypeChanged => "rendererTypeChanged",
    GroupRendererChanged => "groupRendererChanged",
    SortMethodChanged => "sortMethodChanged",
    GroupingChanged => "groupingChanged",
    FilterChanged => "filterChanged",
    MappingChanged => "mappingChanged",
    AddColumn => "addColumn",
    RemoveColumn => "removeColumn",
    MoveColumn => "moveColumn",
    WeightsChanged => "weightsChanged",
    CollapseChanged => "collapseChanged",
    ReduceChanged => "reduceChanged",
    SortCriteriaChanged => "sortCriteriaChanged",
    GroupCriteriaChanged => "groupCriteriaChanged",
    GroupSortCriteriaChanged => "groupSortCriteriaChanged",
    OrderChanged => "orderChanged",
    GroupsChanged => "groupsChanged",
    AddRanking => "addRanking",
    RemoveRanking => "removeRanking",
    SelectionChanged => "selectionChanged",
    Busy => "busy",
    Aggregate => "aggregate",
    ShowTopNChanged => "showTopNChanged",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The invocation context shared by all listeners of one emit.
#[derive(Debug)]
pub struct EventContext<P> {
    /// The dispatcher currently delivering the event.
    pub source: DispatcherId,
    /// The dispatcher that originally emitted the event.
    pub origin: DispatcherId,
    /// The kind this listener is being notified for.
    pub kind: EventKind,
    /// The first kind of the originating emit.
    pub primary: EventKind,
    /// The payload, shared by every kind of the emit.
    pub payload: Arc<P>,
}

impl<P> Clone for EventContext<P> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            origin: self.origin,
            kind: self.kind,
            primary: self.primary,
            payload: self.payload.clone(),
        }
    }
}

impl<P> EventContext<P> {
    /// Whether this event was raised locally rather than forwarded.
    pub fn is_local(&self) -> bool {
        self.source == self.origin
    }
}

type Slot<P> = Arc<dyn Fn(&EventContext<P>) + Send + Sync>;

struct Listener<P> {
    kinds: Vec<EventKind>,
    namespace: Option<String>,
    seq: u64,
    slot: Slot<P>,
}

struct Inner<P> {
    id: DispatcherId,
    listeners: Mutex<SlotMap<SubscriptionId, Listener<P>>>,
    next_seq: AtomicU64,
    blocked: AtomicBool,
}

impl<P: Send + Sync + 'static> Inner<P> {
    fn dispatch(&self, ctx: &EventContext<P>) {
        if self.blocked.load(Ordering::SeqCst) {
            tracing::trace!(target: targets::EVENT, kind = %ctx.kind, "dispatcher blocked, skipping");
            return;
        }
        let mut slots: Vec<(u64, Slot<P>)> = {
            let listeners = self.listeners.lock();
            listeners
                .values()
                .filter(|l| l.kinds.contains(&ctx.kind))
                .map(|l| (l.seq, l.slot.clone()))
                .collect()
        };
        if slots.is_empty() {
            return;
        }
        slots.sort_by_key(|(seq, _)| *seq);
        tracing::trace!(target: targets::EVENT, kind = %ctx.kind, listeners = slots.len(), "dispatching");
        for (_, slot) in slots {
            slot(ctx);
        }
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: SubscriptionId) -> bool;
}

impl<P: Send + Sync + 'static> Detach for Inner<P> {
    fn detach(&self, id: SubscriptionId) -> bool {
        self.listeners.lock().remove(id).is_some()
    }
}

/// A handle to an active listener. Dropping it unsubscribes.
///
/// The handle only holds a weak reference, so it never keeps the dispatcher
/// alive and is safe to drop after the dispatcher is gone.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    target: Weak<dyn Detach>,
    id: SubscriptionId,
}

impl Subscription {
    /// Whether the dispatcher this handle points at is still alive.
    pub fn is_active(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(target) = self.target.upgrade() {
            target.detach(self.id);
        }
    }
}

/// A cloneable handle to a set of typed event channels.
///
/// Clones share the same listeners and identity.
pub struct EventDispatcher<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for EventDispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Send + Sync + 'static> Default for EventDispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for EventDispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl<P: Send + Sync + 'static> EventDispatcher<P> {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: DispatcherId::next(),
                listeners: Mutex::new(SlotMap::with_key()),
                next_seq: AtomicU64::new(0),
                blocked: AtomicBool::new(false),
            }),
        }
    }

    /// This dispatcher's identity.
    pub fn id(&self) -> DispatcherId {
        self.inner.id
    }

    /// Listen to any of `kinds`. The listener lives as long as the returned handle.
    pub fn subscribe<F>(&self, kinds: &[EventKind], listener: F) -> Subscription
    where
        F: Fn(&EventContext<P>) + Send + Sync + 'static,
    {
        self.insert(kinds, None, Arc::new(listener))
    }

    fn insert(&self, kinds: &[EventKind], namespace: Option<String>, slot: Slot<P>) -> Subscription {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = {
            let mut listeners = self.inner.listeners.lock();
            if let Some(ns) = &namespace {
                listeners.retain(|_, l| l.namespace.as_ref() != Some(ns) || l.kinds != kinds);
            }
            listeners.insert(Listener {
                kinds: kinds.to_vec(),
                namespace,
                seq,
                slot,
            })
        };
        tracing::trace!(target: targets::EVENT, dispatcher = self.inner.id.0, ?kinds, "subscribed");
        let inner: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            target: Arc::downgrade(&inner),
            id,
        }
    }

    /// Listen by wire name, e.g. `"dirtyValues.order"`.
    ///
    /// A listener with a `.namespace` suffix replaces the earlier listener
    /// registered under the same kind and namespace; the earlier handle
    /// becomes inert.
    pub fn subscribe_named<F>(&self, name: &str, listener: F) -> crate::Result<Subscription>
    where
        F: Fn(&EventContext<P>) + Send + Sync + 'static,
    {
        let kind: EventKind = name.parse()?;
        let namespace = name
            .split_once('.')
            .map(|(_, ns)| ns.to_string())
            .filter(|ns| !ns.is_empty());
        Ok(self.insert(&[kind], namespace, Arc::new(listener)))
    }

    /// Number of listeners interested in `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .lock()
            .values()
            .filter(|l| l.kinds.contains(&kind))
            .count()
    }

    /// Temporarily suppress all emits and forwards through this dispatcher.
    pub fn set_blocked(&self, blocked: bool) {
        self.inner.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether emission is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::SeqCst)
    }

    /// Announce one change under every kind in `kinds`, in order.
    ///
    /// The first kind becomes the [`EventContext::primary`] kind.
    pub fn emit(&self, kinds: &[EventKind], payload: P) {
        let Some(&primary) = kinds.first() else {
            return;
        };
        let payload = Arc::new(payload);
        for &kind in kinds {
            self.inner.dispatch(&EventContext {
                source: self.inner.id,
                origin: self.inner.id,
                kind,
                primary,
                payload: payload.clone(),
            });
        }
    }

    /// Re-emit `kinds` raised on `child` as if raised here.
    ///
    /// The forwarding stays active as long as the returned handle; it holds
    /// only a weak reference to `self`.
    pub fn forward(&self, child: &EventDispatcher<P>, kinds: &[EventKind]) -> Subscription {
        let target = Arc::downgrade(&self.inner);
        child.subscribe(kinds, move |ctx| {
            if let Some(target) = target.upgrade() {
                target.dispatch(&EventContext {
                    source: target.id,
                    origin: ctx.origin,
                    kind: ctx.kind,
                    primary: ctx.primary,
                    payload: ctx.payload.clone(),
                });
            }
        })
    }
}

static_assertions::assert_impl_all!(EventDispatcher<()>: Send, Sync);
static_assertions::assert_impl_all!(Subscription: Send, Sync);
