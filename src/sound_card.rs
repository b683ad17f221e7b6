//! Command set of the vehicle's serial sound card.
//!
//! Every packet sent to the card starts with [`SOUND_CARD_ADDRESS`] and carries one
//! [`Command`]. Some commands use the modifier byte to say which sound, squeak, or volume
//! channel they apply to.

use crate::function_trigger::{FunctionId, SoundAction, SwitchFunction};
use crate::{Error, Result};

/// Address byte that identifies the sound card on the serial line.
pub const SOUND_CARD_ADDRESS: u8 = 0xDA;

/// Number of squeak sounds the card implements.
pub const MAX_NUM_SQUEAKS: u8 = 6;

/// Number of user sounds the card implements.
pub const MAX_NUM_USER_SOUNDS: u8 = 4;

/// Commands understood by the sound card.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum Command {
    /// Serial watchdog keep-alive.
    SerialWatchdog = 0x0E,
    /// Change baud rate; the value is a [`BaudCode`].
    BaudRate = 0x0F,
    /// Start the engine sound.
    EngineStart = 0x2C,
    /// Stop the engine sound.
    EngineStop = 0x2D,
    /// Set engine speed.
    EngineSetSpeed = 0x2E,
    /// Drop the engine to idle.
    EngineSetIdle = 0x2F,
    /// Start the repair sound.
    RepairStart = 0x30,
    /// Stop the repair sound.
    RepairStop = 0x31,
    /// Main gun fire.
    Cannon = 0x32,
    /// Hit by cannon fire.
    CannonHit = 0x33,
    /// Vehicle destroyed.
    TankDestroyed = 0x34,
    /// Start machine gun fire.
    MgStart = 0x35,
    /// Stop machine gun fire.
    MgStop = 0x36,
    /// Hit by machine gun fire.
    MgHit = 0x37,
    /// Start the turret rotation sound.
    TurretStart = 0x38,
    /// Stop the turret rotation sound.
    TurretStop = 0x39,
    /// Start the barrel elevation sound.
    BarrelStart = 0x3A,
    /// Stop the barrel elevation sound.
    BarrelStop = 0x3B,
    /// Headlight switch click.
    Headlight = 0x3C,
    /// Play a user sound once; the modifier picks the sound.
    UserSoundPlay = 0x3D,
    /// Play a user sound on a loop; the modifier picks the sound.
    UserSoundRepeat = 0x3E,
    /// Stop a user sound; the modifier picks the sound.
    UserSoundStop = 0x3F,
    /// Start track squeaks.
    SqueaksStart = 0x40,
    /// Stop track squeaks.
    SqueaksStop = 0x41,
    /// Set a squeak's minimum interval; the modifier picks the squeak.
    SqueakSetMin = 0x42,
    /// Set a squeak's maximum interval; the modifier picks the squeak.
    SqueakSetMax = 0x43,
    /// Enable or disable a squeak.
    SqueakEnable = 0x44,
    /// Beep once.
    BeepOnce = 0x45,
    /// Beep a number of times.
    BeepX = 0x46,
    /// Set master volume.
    SetVolume = 0x47,
    /// Brake squeal.
    BrakeSound = 0x48,
    /// Start second machine gun fire.
    SecondMgStart = 0x49,
    /// Stop second machine gun fire.
    SecondMgStop = 0x4A,
    /// Set vehicle speed for track overlay sounds.
    VehicleSetSpeed = 0x4B,
    /// Set one relative volume; the modifier picks the channel (see [`VolumeChannel`]).
    SetRelativeVolume = 0x4C,
    /// Engage (1) or disengage (0) the transmission.
    EngageTransmission = 0x4D,
    /// Cannon reloaded.
    CannonReady = 0x4E,
}

impl Command {
    /// Every command, in code order.
    pub const ALL: [Self; 37] = [
        Self::SerialWatchdog,
        Self::BaudRate,
        Self::EngineStart,
        Self::EngineStop,
        Self::EngineSetSpeed,
        Self::EngineSetIdle,
        Self::RepairStart,
        Self::RepairStop,
        Self::Cannon,
        Self::CannonHit,
        Self::TankDestroyed,
        Self::MgStart,
        Self::MgStop,
        Self::MgHit,
        Self::TurretStart,
        Self::TurretStop,
        Self::BarrelStart,
        Self::BarrelStop,
        Self::Headlight,
        Self::UserSoundPlay,
        Self::UserSoundRepeat,
        Self::UserSoundStop,
        Self::SqueaksStart,
        Self::SqueaksStop,
        Self::SqueakSetMin,
        Self::SqueakSetMax,
        Self::SqueakEnable,
        Self::BeepOnce,
        Self::BeepX,
        Self::SetVolume,
        Self::BrakeSound,
        Self::SecondMgStart,
        Self::SecondMgStop,
        Self::VehicleSetSpeed,
        Self::SetRelativeVolume,
        Self::EngageTransmission,
        Self::CannonReady,
    ];

    /// Command byte on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|command| command.code() == code)
            .ok_or(Error::UnknownCode(code))
    }
}

/// Relative volume channels addressed by [`Command::SetRelativeVolume`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum VolumeChannel {
    /// Engine.
    Engine = 0,
    /// Track overlay.
    TrackOverlay = 1,
    /// Effects.
    Effects = 2,
    /// Flash.
    Flash = 3,
}

impl TryFrom<u8> for VolumeChannel {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::Engine,
            1 => Self::TrackOverlay,
            2 => Self::Effects,
            3 => Self::Flash,
            _ => return Err(Error::UnknownCode(code)),
        })
    }
}

/// Baud-rate codes for [`Command::BaudRate`].
///
/// 57600 is last because the first five codes follow an older numbering that left it out.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, defmt::Format)]
#[repr(u8)]
pub enum BaudCode {
    /// 2400 baud.
    B2400 = 1,
    /// 9600 baud.
    B9600 = 2,
    /// 19200 baud.
    B19200 = 3,
    /// 38400 baud.
    B38400 = 4,
    /// 115200 baud.
    B115200 = 5,
    /// 57600 baud. Unreliable on some boards.
    B57600 = 6,
}

impl BaudCode {
    /// Line rate in bits per second.
    #[must_use]
    pub const fn baud(self) -> u32 {
        match self {
            Self::B2400 => 2_400,
            Self::B9600 => 9_600,
            Self::B19200 => 19_200,
            Self::B38400 => 38_400,
            Self::B115200 => 115_200,
            Self::B57600 => 57_600,
        }
    }

    /// Code for a line rate, if the card supports it.
    #[must_use]
    pub const fn from_baud(baud: u32) -> Option<Self> {
        Some(match baud {
            2_400 => Self::B2400,
            9_600 => Self::B9600,
            19_200 => Self::B19200,
            38_400 => Self::B38400,
            115_200 => Self::B115200,
            57_600 => Self::B57600,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for BaudCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::B2400,
            2 => Self::B9600,
            3 => Self::B19200,
            4 => Self::B38400,
            5 => Self::B115200,
            6 => Self::B57600,
            _ => return Err(Error::UnknownCode(code)),
        })
    }
}

/// A command and its modifier byte, ready to send.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub struct SoundRequest {
    /// What to do.
    pub command: Command,
    /// Which sound it applies to, for commands that take one; otherwise 0.
    pub modifier: u8,
}

impl SoundRequest {
    /// A request without a modifier.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            modifier: 0,
        }
    }

    /// Select which relative volume the following level applies to.
    #[must_use]
    pub const fn relative_volume(channel: VolumeChannel) -> Self {
        Self {
            command: Command::SetRelativeVolume,
            modifier: channel as u8,
        }
    }

    /// The sound card request that carries out `function`, if the card has one.
    ///
    /// Engine toggle depends on engine state and the null function does nothing, so neither maps
    /// to a request.
    #[must_use]
    pub const fn for_function(function: FunctionId) -> Option<Self> {
        let command = match function {
            FunctionId::UserSound { sound, action } => {
                let command = match action {
                    SoundAction::Play => Command::UserSoundPlay,
                    SoundAction::Repeat => Command::UserSoundRepeat,
                    SoundAction::Stop => Command::UserSoundStop,
                };
                return Some(Self {
                    command,
                    modifier: sound,
                });
            }
            FunctionId::Special(SwitchFunction::Null | SwitchFunction::EngineToggle) => {
                return None;
            }
            FunctionId::Special(SwitchFunction::EngineStart) => Command::EngineStart,
            FunctionId::Special(SwitchFunction::EngineStop) => Command::EngineStop,
            FunctionId::Special(SwitchFunction::CannonFire) => Command::Cannon,
            FunctionId::Special(SwitchFunction::MgFire) => Command::MgStart,
            FunctionId::Special(SwitchFunction::MgStop) => Command::MgStop,
            FunctionId::Special(SwitchFunction::Mg2Fire) => Command::SecondMgStart,
            FunctionId::Special(SwitchFunction::Mg2Stop) => Command::SecondMgStop,
        };
        Some(Self::new(command))
    }
}
