//! Fixed-capacity channel records shared between main-line code and the timer interrupt.
//!
//! Every field is an atomic so that a single-field update (a new pulse width) is never observed
//! half-written by the interrupt. Multi-field updates happen before a channel is published in the
//! active set, or inside the bus critical section.

use portable_atomic::{AtomicU8, AtomicU16, AtomicU32, Ordering};

/// Number of servo channels one bus can drive.
pub const MAX_CHANNELS: usize = 12;

/// Identifies one attached servo channel.
///
/// A failed attach returns [`ChannelHandle::INVALID`]; every operation on an invalid or detached
/// handle is a silent no-op.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
pub struct ChannelHandle(u8);

impl ChannelHandle {
    /// Sentinel returned when no channel could be attached. Never a valid index.
    pub const INVALID: Self = Self(u8::MAX);

    /// Channel index, or `None` for [`ChannelHandle::INVALID`] and other out-of-range values.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        let index = usize::from(self.0);
        (index < MAX_CHANNELS).then_some(index)
    }

    /// Whether this handle names a channel slot at all (it may still be detached).
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.index().is_some()
    }

    /// Raw slot number, as reported in logs.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    fn from_index(index: usize) -> Self {
        u8::try_from(index).map_or(Self::INVALID, Self)
    }
}

/// A set of channel indices, one bit per channel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, defmt::Format)]
pub struct ChannelMask(u16);

impl ChannelMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Whether `index` is in the set.
    #[must_use]
    pub fn contains(self, index: usize) -> bool {
        self.0 & bit(index) != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest channel index not in the set.
    #[must_use]
    pub fn first_free(self) -> Option<usize> {
        (0..MAX_CHANNELS).find(|&index| !self.contains(index))
    }

    /// Channel indices in the set, lowest first.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_CHANNELS).filter(move |&index| self.contains(index))
    }
}

fn bit(index: usize) -> u16 {
    if index >= MAX_CHANNELS {
        return 0;
    }
    u32::try_from(index)
        .ok()
        .and_then(|shift| 1u16.checked_shl(shift))
        .unwrap_or(0)
}

struct ChannelRecord {
    pin: AtomicU8,
    pulse_ticks: AtomicU32,
    min_ticks: AtomicU32,
    max_ticks: AtomicU32,
}

impl ChannelRecord {
    const fn new() -> Self {
        Self {
            pin: AtomicU8::new(0),
            pulse_ticks: AtomicU32::new(0),
            min_ticks: AtomicU32::new(0),
            max_ticks: AtomicU32::new(0),
        }
    }
}

/// Pin and pulse width the scheduler needs for one channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ChannelSlot {
    pub(crate) pin: u8,
    pub(crate) pulse_ticks: u32,
}

/// The channel arena: per-channel records plus the *allocated* and *active* sets.
pub struct ChannelTable {
    records: [ChannelRecord; MAX_CHANNELS],
    allocated: AtomicU16,
    active: AtomicU16,
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTable {
    /// An empty table with no channels allocated.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [const { ChannelRecord::new() }; MAX_CHANNELS],
            allocated: AtomicU16::new(0),
            active: AtomicU16::new(0),
        }
    }

    /// Channels currently claimed by a caller.
    #[must_use]
    pub fn allocated(&self) -> ChannelMask {
        ChannelMask(self.allocated.load(Ordering::Acquire))
    }

    /// Channels currently eligible to be pulsed.
    #[must_use]
    pub fn active(&self) -> ChannelMask {
        ChannelMask(self.active.load(Ordering::Acquire))
    }

    /// Claim the lowest free slot and write its record. The slot is allocated but not yet active.
    ///
    /// Callers must hold the bus critical section so two claims cannot race for one slot.
    pub(crate) fn claim(
        &self,
        pin: u8,
        min_ticks: u32,
        max_ticks: u32,
        pulse_ticks: u32,
    ) -> Option<ChannelHandle> {
        let index = self.allocated().first_free()?;
        let record = self.records.get(index)?;
        record.pin.store(pin, Ordering::Relaxed);
        record.min_ticks.store(min_ticks, Ordering::Relaxed);
        record.max_ticks.store(max_ticks, Ordering::Relaxed);
        record
            .pulse_ticks
            .store(pulse_ticks.clamp(min_ticks, max_ticks), Ordering::Relaxed);
        self.allocated.fetch_or(bit(index), Ordering::Release);
        Some(ChannelHandle::from_index(index))
    }

    /// Publish an allocated channel to the scheduler. Returns `false` if it is not allocated.
    pub(crate) fn activate(&self, handle: ChannelHandle) -> bool {
        let Some(index) = self.allocated_index(handle) else {
            return false;
        };
        self.active.fetch_or(bit(index), Ordering::Release);
        true
    }

    /// Clear `handle` from both sets. Returns the pin it drove, or `None` if it was not allocated.
    pub(crate) fn release(&self, handle: ChannelHandle) -> Option<u8> {
        let index = self.allocated_index(handle)?;
        let pin = self.records.get(index)?.pin.load(Ordering::Relaxed);
        self.active.fetch_and(!bit(index), Ordering::AcqRel);
        self.allocated.fetch_and(!bit(index), Ordering::AcqRel);
        Some(pin)
    }

    /// Whether `handle` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, handle: ChannelHandle) -> bool {
        self.allocated_index(handle).is_some()
    }

    /// Whether `handle` is currently in the active set.
    #[must_use]
    pub fn is_active(&self, handle: ChannelHandle) -> bool {
        handle.index().is_some_and(|index| self.active().contains(index))
    }

    /// Output pin of an allocated channel.
    #[must_use]
    pub fn pin(&self, handle: ChannelHandle) -> Option<u8> {
        self.record(handle).map(|record| record.pin.load(Ordering::Relaxed))
    }

    /// Commanded pulse width of an allocated channel, in ticks.
    #[must_use]
    pub fn pulse_ticks(&self, handle: ChannelHandle) -> Option<u32> {
        self.record(handle)
            .map(|record| record.pulse_ticks.load(Ordering::Acquire))
    }

    /// Inclusive `(min_ticks, max_ticks)` bounds of an allocated channel.
    #[must_use]
    pub fn bounds(&self, handle: ChannelHandle) -> Option<(u32, u32)> {
        self.record(handle).map(|record| {
            (
                record.min_ticks.load(Ordering::Relaxed),
                record.max_ticks.load(Ordering::Relaxed),
            )
        })
    }

    /// Clamp `ticks` to the channel bounds and store it with one atomic write.
    ///
    /// Returns the stored value, or `None` if the handle is not allocated.
    pub(crate) fn store_pulse_ticks(&self, handle: ChannelHandle, ticks: u32) -> Option<u32> {
        let (min_ticks, max_ticks) = self.bounds(handle)?;
        let ticks = ticks.clamp(min_ticks, max_ticks);
        self.record(handle)?
            .pulse_ticks
            .store(ticks, Ordering::Release);
        Some(ticks)
    }

    /// Pin and pulse width for the scheduler, read by index.
    pub(crate) fn slot(&self, index: usize) -> Option<ChannelSlot> {
        let record = self.records.get(index)?;
        Some(ChannelSlot {
            pin: record.pin.load(Ordering::Relaxed),
            pulse_ticks: record.pulse_ticks.load(Ordering::Acquire),
        })
    }

    fn allocated_index(&self, handle: ChannelHandle) -> Option<usize> {
        handle
            .index()
            .filter(|&index| self.allocated().contains(index))
    }

    fn record(&self, handle: ChannelHandle) -> Option<&ChannelRecord> {
        self.allocated_index(handle)
            .and_then(|index| self.records.get(index))
    }
}
