#![allow(missing_docs)]
//! Host-level tests for the vehicle configuration tables and status LED.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use servo_mux::Error;
use servo_mux::blinker::{BLINK_RATE_HEARTBEAT, BlinkStream, Blinker};
use servo_mux::function_trigger::{
    FunctionId, FunctionTriggerTable, MAX_FUNCTION_TRIGGERS, SoundAction, SwitchFunction,
    SwitchPosition, TriggerId,
};
use servo_mux::sound_card::{
    BaudCode, Command, MAX_NUM_SQUEAKS, MAX_NUM_USER_SOUNDS, SOUND_CARD_ADDRESS, SoundRequest,
};

#[test]
fn switch_positions_dispatch_sound_card_requests() -> Result<(), Error> {
    let mut table: FunctionTriggerTable = FunctionTriggerTable::new();
    let engine_switch = TriggerId::new(1, SwitchPosition::Pos1);
    let gun_switch = TriggerId::new(2, SwitchPosition::Pos3);

    table.insert(engine_switch, FunctionId::Special(SwitchFunction::EngineStart))?;
    table.insert(gun_switch, FunctionId::Special(SwitchFunction::CannonFire))?;
    table.insert(gun_switch, FunctionId::try_from(41_u16)?)?;

    let requests: Vec<SoundRequest> = table
        .functions_for(gun_switch)
        .filter_map(SoundRequest::for_function)
        .collect();
    assert_eq!(
        requests,
        vec![
            SoundRequest::new(Command::Cannon),
            SoundRequest {
                command: Command::UserSoundPlay,
                modifier: 4,
            },
        ]
    );

    // Codes as stored in the vehicle configuration.
    let stored: Vec<(u16, u16)> = table
        .iter()
        .map(|pair| (pair.trigger.raw(), pair.function.code()))
        .collect();
    assert_eq!(stored, vec![(11, 1001), (23, 1004), (23, 41)]);
    Ok(())
}

#[test]
fn default_table_holds_forty_pairs() {
    let mut table: FunctionTriggerTable = FunctionTriggerTable::new();
    let function = FunctionId::Special(SwitchFunction::MgFire);
    for raw in 0..MAX_FUNCTION_TRIGGERS {
        let raw = u16::try_from(raw).unwrap_or(u16::MAX);
        assert_eq!(table.insert(TriggerId::from_raw(raw), function), Ok(()));
    }
    assert_eq!(
        table.insert(TriggerId::from_raw(999), function),
        Err(Error::TriggerTableFull)
    );
}

#[test]
fn every_user_sound_action_round_trips_through_its_code() {
    for sound in 1..=22 {
        for action in [SoundAction::Play, SoundAction::Repeat, SoundAction::Stop] {
            let function = FunctionId::user_sound(sound, action);
            assert!(function.is_some());
            let code = function.map_or(0, FunctionId::code);
            assert_eq!(FunctionId::try_from(code).ok(), function);
        }
    }
}

#[test]
fn sound_card_constants() {
    assert_eq!(SOUND_CARD_ADDRESS, 218);
    assert_eq!(MAX_NUM_SQUEAKS, 6);
    assert_eq!(MAX_NUM_USER_SOUNDS, 4);
    assert_eq!(BaudCode::try_from(5).map(BaudCode::baud), Ok(115_200));
    assert_eq!(Command::try_from(0x46), Ok(Command::BeepX));
}

#[derive(Default)]
struct Led {
    lit: bool,
}

impl ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.lit = true;
        Ok(())
    }
}

#[test]
fn heartbeat_alternates_at_its_rate() {
    let mut led = Blinker::new(Led::default(), false);
    led.heartbeat();

    let rate = u32::from(BLINK_RATE_HEARTBEAT);
    let mut seen = Vec::new();
    for beat in 0_u32..6 {
        led.update(beat.saturating_mul(rate));
        seen.push(led.is_on());
    }
    assert_eq!(seen, vec![true, false, true, false, true, false]);
    assert!(!led.into_inner().lit);
}

#[test]
fn triple_tap_then_custom_stream() {
    let mut led = Blinker::new(Led::default(), false);
    led.triple_tap(false);
    let mut rising = 0u32;
    let mut was_on = false;
    for now in (0..2000).step_by(10) {
        led.update(now);
        if led.is_on() && !was_on {
            rising = rising.saturating_add(1);
        }
        was_on = led.is_on();
    }
    assert_eq!(rising, 3);
    assert!(!led.is_blinking());

    let stream = BlinkStream::new(&[30, 70, 30], false);
    assert!(stream.as_ref().is_some_and(|stream| !stream.repeats()));
    led.stream_blink(stream.unwrap_or_default());
    led.update(0);
    led.update(30);
    led.update(100);
    assert!(led.is_on());
    led.update(130);
    assert!(!led.is_blinking());
}
