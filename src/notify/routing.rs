//! Per-device handler tables.
//!
//! Each device definition owns one [`HandlerTable`] per notification category.
//! A table maps a notification id to a [`HandlerSlot`] holding an immediate
//! handler, a deferred handler, or both.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use axerrno::AxResult;

use crate::device::PepDevice;

use super::work::{StatusSlot, WorkInfo};
use super::{NotificationCategory, NotificationId};

/// Result returned by a notification handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// The request is finished with the given result.
    Complete(AxResult),
    /// The request needs another round on the deferred path.
    MoreWork,
}

/// Arguments passed to a handler.
pub struct HandlerRequest<'a> {
    /// Device the notification targets.
    pub device: &'a PepDevice,
    /// Category the notification arrived on.
    pub category: NotificationCategory,
    /// Notification id.
    pub notification_id: NotificationId,
    /// Request context. Immediate handlers see the caller's buffer; deferred
    /// handlers see the copy owned by their work item.
    pub context: &'a mut [u8],
    /// Caller's result slot, if one was supplied.
    pub status: Option<&'a StatusSlot>,
}

/// A notification handler.
///
/// Immediate handlers are called with `work = None` inside the dispatch call.
/// Deferred handlers are called from the worker with the item's [`WorkInfo`],
/// which they fill in for the host.
///
/// Implemented for every matching closure:
///
/// ```rust,ignore
/// let slot = HandlerSlot::new().with_deferred(|request: &mut HandlerRequest<'_>, work: Option<&mut WorkInfo>| {
///     if let Some(work) = work {
///         work.output.extend_from_slice(request.context);
///     }
///     HandlerResult::Complete(Ok(()))
/// });
/// ```
pub trait NotificationHandler: Send + Sync {
    /// Handles one notification.
    fn handle(&self, request: &mut HandlerRequest<'_>, work: Option<&mut WorkInfo>) -> HandlerResult;
}

impl<F> NotificationHandler for F
where
    F: Fn(&mut HandlerRequest<'_>, Option<&mut WorkInfo>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, request: &mut HandlerRequest<'_>, work: Option<&mut WorkInfo>) -> HandlerResult {
        self(request, work)
    }
}

/// Immediate and deferred handlers registered for one notification id.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    immediate: Option<Arc<dyn NotificationHandler>>,
    deferred: Option<Arc<dyn NotificationHandler>>,
}

impl HandlerSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler called inline during dispatch.
    pub fn with_immediate<H>(mut self, handler: H) -> Self
    where
        H: NotificationHandler + 'static,
    {
        self.immediate = Some(Arc::new(handler));
        self
    }

    /// Sets the handler run on the worker.
    pub fn with_deferred<H>(mut self, handler: H) -> Self
    where
        H: NotificationHandler + 'static,
    {
        self.deferred = Some(Arc::new(handler));
        self
    }

    /// Gets the immediate handler.
    pub fn immediate(&self) -> Option<&Arc<dyn NotificationHandler>> {
        self.immediate.as_ref()
    }

    /// Gets the deferred handler.
    pub fn deferred(&self) -> Option<&Arc<dyn NotificationHandler>> {
        self.deferred.as_ref()
    }

    /// Chooses the handler to run first.
    ///
    /// The immediate handler wins when present. Otherwise the deferred
    /// handler is used and the selection records that no synchronous handler
    /// existed.
    pub fn select(&self) -> Option<HandlerSelection> {
        if let Some(handler) = &self.immediate {
            return Some(HandlerSelection::Immediate(Arc::clone(handler)));
        }
        self.deferred.as_ref().map(|handler| HandlerSelection::Deferred {
            handler: Arc::clone(handler),
            fallback: true,
        })
    }

    /// Chooses the deferred handler that continues after the immediate
    /// handler returned [`HandlerResult::MoreWork`].
    pub fn continuation(&self) -> Option<HandlerSelection> {
        self.deferred.as_ref().map(|handler| HandlerSelection::Deferred {
            handler: Arc::clone(handler),
            fallback: false,
        })
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("immediate", &self.immediate.is_some())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

/// Handler chosen for a dispatch.
#[derive(Clone)]
pub enum HandlerSelection {
    /// Call inline.
    Immediate(Arc<dyn NotificationHandler>),
    /// Schedule on the worker.
    Deferred {
        /// Handler to run.
        handler: Arc<dyn NotificationHandler>,
        /// Set when the slot had no immediate handler.
        fallback: bool,
    },
}

impl fmt::Debug for HandlerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerSelection::Immediate(_) => f.write_str("Immediate"),
            HandlerSelection::Deferred { fallback, .. } => {
                f.debug_struct("Deferred").field("fallback", fallback).finish()
            }
        }
    }
}

/// One row of a handler table.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    /// Notification id this row answers.
    pub id: NotificationId,
    /// Handlers for the id.
    pub slot: HandlerSlot,
}

impl HandlerEntry {
    /// Creates a table row.
    pub fn new(id: NotificationId, slot: HandlerSlot) -> Self {
        Self { id, slot }
    }
}

/// Notification routing table for one device and one category.
///
/// Lookups scan the rows in insertion order and return the first row whose id
/// matches. Later rows with the same id are never reached.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    entries: Vec<HandlerEntry>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row.
    pub fn with_entry(mut self, id: NotificationId, slot: HandlerSlot) -> Self {
        self.push(HandlerEntry::new(id, slot));
        self
    }

    /// Appends a row in place.
    pub fn push(&mut self, entry: HandlerEntry) {
        if self.lookup(entry.id).is_some() {
            debug!("Handler table already routes {:?}; the new row is shadowed", entry.id);
        }
        self.entries.push(entry);
    }

    /// Finds the first row for `id`.
    pub fn lookup(&self, id: NotificationId) -> Option<&HandlerEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Checks whether any row routes `id`.
    pub fn contains(&self, id: NotificationId) -> bool {
        self.lookup(id).is_some()
    }

    /// Iterates over the rows in lookup order.
    pub fn entries(&self) -> impl Iterator<Item = &HandlerEntry> {
        self.entries.iter()
    }

    /// Gets the number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
