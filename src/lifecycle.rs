//! Device lifecycle management with atomic state machine and access tracking.
//!
//! Each dispatch takes an access on its device for as long as a handler runs.
//! Unregistration moves the device to Removing so new accesses are refused;
//! the device becomes Removed when the last access ends. Nobody waits for
//! that: instances are reference counted, so a Removing device stays valid
//! for the handlers still using it, and a handler may unregister its own
//! device.
//!
//! Layout of the shared word: `[state(8 bits) | access_count(24 bits)]`

use core::sync::atomic::{AtomicU32, Ordering};

/// Device lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    /// Device is registered and accepts notifications.
    Active = 0,
    /// Device is unregistered but handlers are still running on it.
    Removing = 1,
    /// Device is unregistered and idle.
    Removed = 2,
}

/// State and access count packed into one atomic, so that checking the state
/// and taking an access happen in a single CAS.
struct StateAndCount(AtomicU32);

impl StateAndCount {
    const STATE_SHIFT: u32 = 24;
    const COUNT_MASK: u32 = (1 << Self::STATE_SHIFT) - 1;
    const STATE_ACTIVE: u32 = 0;
    const STATE_REMOVING: u32 = 1;
    const STATE_REMOVED: u32 = 2;

    /// Raw value of a Removing device with no accesses left.
    const REMOVING_IDLE: u32 = Self::STATE_REMOVING << Self::STATE_SHIFT;

    fn new() -> Self {
        Self(AtomicU32::new(Self::STATE_ACTIVE << Self::STATE_SHIFT))
    }

    fn decode_state(raw: u32) -> DeviceState {
        match raw >> Self::STATE_SHIFT {
            Self::STATE_ACTIVE => DeviceState::Active,
            Self::STATE_REMOVING => DeviceState::Removing,
            _ => DeviceState::Removed,
        }
    }

    #[inline]
    fn state(&self) -> DeviceState {
        Self::decode_state(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & Self::COUNT_MASK
    }

    /// Increments the access count if the state is Active.
    fn try_acquire(&self) -> Result<(), DeviceState> {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let state = current >> Self::STATE_SHIFT;
            if state != Self::STATE_ACTIVE {
                return Err(Self::decode_state(current));
            }

            let count = current & Self::COUNT_MASK;
            if count == Self::COUNT_MASK {
                return Err(DeviceState::Active);
            }

            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(_) => continue,
            }
        }
    }

    /// Decrements the access count and returns the new raw value.
    #[inline]
    fn release(&self) -> u32 {
        self.0.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Moves Active to Removing. Returns false if the state was not Active.
    fn set_removing(&self) -> bool {
        loop {
            let current = self.0.load(Ordering::Acquire);
            if current >> Self::STATE_SHIFT != Self::STATE_ACTIVE {
                return false;
            }
            let count = current & Self::COUNT_MASK;
            let new_value = (Self::STATE_REMOVING << Self::STATE_SHIFT) | count;

            match self.0.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Moves an idle Removing device to Removed.
    ///
    /// Accesses cannot be taken once Removing, so the idle value is final and
    /// exactly one caller wins the exchange.
    fn try_set_removed(&self) -> bool {
        self.0
            .compare_exchange(
                Self::REMOVING_IDLE,
                Self::STATE_REMOVED << Self::STATE_SHIFT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Tracks whether a device accepts notifications and how many dispatches are
/// currently inside its handlers.
///
/// ```text
/// ┌─────────┐  begin_removal()   ┌──────────┐  last access ends  ┌─────────┐
/// │ Active  │ ─────────────────> │ Removing │ ─────────────────> │ Removed │
/// └─────────┘                    └──────────┘                    └─────────┘
/// ```
///
/// With no access in flight, `begin_removal` goes straight to Removed.
pub struct DeviceLifecycle {
    state_count: StateAndCount,
}

impl DeviceLifecycle {
    /// Creates a lifecycle in Active state.
    pub fn new() -> Self {
        Self {
            state_count: StateAndCount::new(),
        }
    }

    /// Gets the current lifecycle state.
    #[inline]
    pub fn state(&self) -> DeviceState {
        self.state_count.state()
    }

    /// Gets the number of dispatches in flight.
    #[inline]
    pub fn active_accesses(&self) -> usize {
        self.state_count.count() as usize
    }

    /// Takes an access. Returns `None` if the device is not Active.
    ///
    /// The access ends when the returned guard drops.
    pub fn try_access(&self) -> Option<AccessGuard<'_>> {
        self.state_count.try_acquire().ok()?;
        Some(AccessGuard { lifecycle: self })
    }

    fn end_access(&self) {
        if self.state_count.release() == StateAndCount::REMOVING_IDLE {
            self.state_count.try_set_removed();
        }
    }

    /// Starts removal. New accesses are refused from now on.
    ///
    /// Returns `false` if the device was already Removing or Removed.
    pub fn begin_removal(&self) -> bool {
        if !self.state_count.set_removing() {
            return false;
        }
        self.state_count.try_set_removed();
        true
    }
}

impl Default for DeviceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeviceLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceLifecycle")
            .field("state", &self.state())
            .field("active_accesses", &self.active_accesses())
            .finish()
    }
}

/// An access on a device, released on drop.
///
/// Dropping the last access of a Removing device completes its removal.
pub struct AccessGuard<'a> {
    lifecycle: &'a DeviceLifecycle,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.end_access();
    }
}
