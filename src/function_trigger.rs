//! Function/trigger pairs: which RC switch position fires which vehicle function.
//!
//! A trigger is an RC channel in a given switch position, encoded as `channel * 10 + position`
//! (channel 3 in position 2 is trigger 32). A function is either a user sound action, encoded as
//! `sound * 10 + action` (sound 14 play is 141), or a special function, encoded as
//! `1000 + function number`. The encodings are the ones stored in the vehicle's configuration,
//! so [`TriggerId::raw`] and [`FunctionId::code`] are stable.

use heapless::Vec;

use crate::{Error, Result};

/// Trigger ID is `channel * TRIGGER_ID_MULTIPLIER + position`.
pub const TRIGGER_ID_MULTIPLIER: u16 = 10;

/// Most function/trigger pairs a vehicle configuration can hold.
pub const MAX_FUNCTION_TRIGGERS: usize = 40;

/// Highest user sound number a function ID can name.
pub const MAX_USER_SOUNDS: u8 = 22;

const USER_SOUND_MULTIPLIER: u16 = 10;
const SPECIAL_FUNCTION_START: u16 = 1000;

/// Position of a multi-position switch on an RC channel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum SwitchPosition {
    /// Position 1.
    Pos1 = 1,
    /// Position 2.
    Pos2 = 2,
    /// Position 3.
    Pos3 = 3,
    /// Position 4.
    Pos4 = 4,
    /// Position 5.
    Pos5 = 5,
    /// Position 6.
    Pos6 = 6,
}

impl TryFrom<u8> for SwitchPosition {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Pos1,
            2 => Self::Pos2,
            3 => Self::Pos3,
            4 => Self::Pos4,
            5 => Self::Pos5,
            6 => Self::Pos6,
            _ => return Err(Error::UnknownCode(value)),
        })
    }
}

/// An RC channel switch position that can fire functions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
pub struct TriggerId(u16);

impl TriggerId {
    /// Trigger for `channel` in `position`.
    #[must_use]
    pub fn new(channel: u8, position: SwitchPosition) -> Self {
        Self(
            u16::from(channel)
                .saturating_mul(TRIGGER_ID_MULTIPLIER)
                .saturating_add(u16::from(position as u8)),
        )
    }

    /// Trigger from its stored encoding.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Stored encoding.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// RC channel number.
    #[must_use]
    pub const fn channel(self) -> u16 {
        self.0 / TRIGGER_ID_MULTIPLIER
    }

    /// Switch position, or `None` if the encoding's last digit is not 1 through 6.
    #[must_use]
    pub fn position(self) -> Option<SwitchPosition> {
        u8::try_from(self.0 % TRIGGER_ID_MULTIPLIER)
            .ok()
            .and_then(|digit| SwitchPosition::try_from(digit).ok())
    }
}

/// What to do with a user sound.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum SoundAction {
    /// Play once.
    Play = 1,
    /// Play on a loop.
    Repeat = 2,
    /// Stop playing.
    Stop = 3,
}

/// Functions with a fixed meaning, numbered as stored after the `1000` offset.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum SwitchFunction {
    /// Placeholder that does nothing.
    Null = 0,
    /// Start the engine.
    EngineStart = 1,
    /// Stop the engine.
    EngineStop = 2,
    /// Start the engine if stopped, stop it if running.
    EngineToggle = 3,
    /// Fire the main gun.
    CannonFire = 4,
    /// Start the machine gun.
    MgFire = 5,
    /// Stop the machine gun.
    MgStop = 6,
    /// Start the second machine gun.
    Mg2Fire = 7,
    /// Stop the second machine gun.
    Mg2Stop = 8,
}

impl SwitchFunction {
    /// Every special function, in numeric order.
    pub const ALL: [Self; 9] = [
        Self::Null,
        Self::EngineStart,
        Self::EngineStop,
        Self::EngineToggle,
        Self::CannonFire,
        Self::MgFire,
        Self::MgStop,
        Self::Mg2Fire,
        Self::Mg2Stop,
    ];

    /// Human-readable name, as shown on the configuration console.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "NULL FUNCTION",
            Self::EngineStart => "Engine - Turn On",
            Self::EngineStop => "Engine - Turn Off",
            Self::EngineToggle => "Engine - Toggle",
            Self::CannonFire => "Cannon Fire",
            Self::MgFire => "Machine Gun - Fire",
            Self::MgStop => "Machine Gun - Stop",
            Self::Mg2Fire => "2nd Machine Gun - Fire",
            Self::Mg2Stop => "2nd Machine Gun - Stop",
        }
    }
}

impl TryFrom<u8> for SwitchFunction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(Error::UnknownCode(value))
    }
}

/// A function a trigger can fire.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
pub enum FunctionId {
    /// Act on user sound `sound` (1 through [`MAX_USER_SOUNDS`]).
    UserSound {
        /// Sound number.
        sound: u8,
        /// What to do with it.
        action: SoundAction,
    },
    /// A function with a fixed meaning.
    Special(SwitchFunction),
}

impl FunctionId {
    /// A user sound function, or `None` if `sound` is outside 1 through [`MAX_USER_SOUNDS`].
    #[must_use]
    pub const fn user_sound(sound: u8, action: SoundAction) -> Option<Self> {
        if sound == 0 || sound > MAX_USER_SOUNDS {
            return None;
        }
        Some(Self::UserSound { sound, action })
    }

    /// Stored encoding.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::UserSound { sound, action } => u16::from(sound)
                .saturating_mul(USER_SOUND_MULTIPLIER)
                .saturating_add(u16::from(action as u8)),
            Self::Special(function) => {
                SPECIAL_FUNCTION_START.saturating_add(u16::from(function as u8))
            }
        }
    }

    /// Human-readable name of a special function. User sounds have no fixed name.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::UserSound { .. } => None,
            Self::Special(function) => Some(function.name()),
        }
    }
}

impl TryFrom<u16> for FunctionId {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        let unknown = Error::UnknownFunction(code);
        if let Some(offset) = code.checked_sub(SPECIAL_FUNCTION_START) {
            let number = u8::try_from(offset).map_err(|_| unknown)?;
            return SwitchFunction::try_from(number)
                .map(Self::Special)
                .map_err(|_| unknown);
        }
        let action = match code % USER_SOUND_MULTIPLIER {
            1 => SoundAction::Play,
            2 => SoundAction::Repeat,
            3 => SoundAction::Stop,
            _ => return Err(unknown),
        };
        let sound = u8::try_from(code / USER_SOUND_MULTIPLIER).map_err(|_| unknown)?;
        Self::user_sound(sound, action).ok_or(unknown)
    }
}

/// One configured trigger and the function it fires.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub struct FunctionTrigger {
    /// The switch position.
    pub trigger: TriggerId,
    /// The function it fires.
    pub function: FunctionId,
}

/// Fixed-capacity list of function/trigger pairs.
///
/// One trigger may fire several functions and one function may have several triggers.
#[derive(Clone, Debug, Default)]
pub struct FunctionTriggerTable<const N: usize = MAX_FUNCTION_TRIGGERS> {
    pairs: Vec<FunctionTrigger, N>,
}

impl<const N: usize> FunctionTriggerTable<N> {
    /// An empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Add a pair. Adding a pair that is already present does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::TriggerTableFull`] if the table already holds `N` pairs.
    pub fn insert(&mut self, trigger: TriggerId, function: FunctionId) -> Result<()> {
        let pair = FunctionTrigger { trigger, function };
        if self.pairs.contains(&pair) {
            return Ok(());
        }
        self.pairs.push(pair).map_err(|_| Error::TriggerTableFull)
    }

    /// Remove every pair for `trigger`.
    pub fn remove_trigger(&mut self, trigger: TriggerId) {
        self.pairs.retain(|pair| pair.trigger != trigger);
    }

    /// Functions fired by `trigger`, in insertion order.
    pub fn functions_for(&self, trigger: TriggerId) -> impl Iterator<Item = FunctionId> + '_ {
        self.pairs
            .iter()
            .filter(move |pair| pair.trigger == trigger)
            .map(|pair| pair.function)
    }

    /// Every pair, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionTrigger> {
        self.pairs.iter()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Remove every pair.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}
