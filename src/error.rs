use derive_more::{Display, Error};

/// Errors reported by this crate.
///
/// Most of the channel API never returns these: an invalid handle degrades to a no-op and a
/// failed attach yields [`ChannelHandle::INVALID`](crate::channel_table::ChannelHandle::INVALID).
/// The `try_` variants surface the same conditions as values.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq, defmt::Format)]
pub enum Error {
    /// Every channel slot is already attached.
    #[display("no free servo channel")]
    ResourceExhausted,

    /// The handle is out of range or no longer attached.
    #[display("servo channel handle is not attached")]
    InvalidHandle,

    /// The function/trigger table has no room for another pair.
    #[display("function trigger table is full")]
    TriggerTableFull,

    /// A stored function ID does not name any function.
    #[display("unknown function id {_0}")]
    UnknownFunction(#[error(not(source))] u16),

    /// A byte does not match any entry of the table it was decoded against.
    #[display("unknown code {_0:#04x}")]
    UnknownCode(#[error(not(source))] u8),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
