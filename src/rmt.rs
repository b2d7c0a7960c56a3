//! esp-hal backends for the pulse channel and the shared GPIO lines

use alloc::vec::Vec;

use esp_hal::Blocking;
use esp_hal::gpio::{AnyPin, Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::peripherals::RMT;
use esp_hal::rmt::{Channel, PulseCode, Rmt, TxChannel, TxChannelConfig, TxChannelCreator};
use esp_hal::time::Rate;
use log::{error, info, warn};

use crate::encoder::{PulseChannel, PulseItem};
use crate::pins::{PinControl, PinMode};
use crate::{LedError, config};

/// Low hold closing every frame, in channel ticks (20us at 40MHz). Frame spacing itself
/// comes from the refresh task.
const END_HOLD_TICKS: u16 = 800;

/// Channel tick rate for the default RMT setup
pub const fn default_clock_hz() -> u32 {
    config::RMT_SOURCE_MHZ * 1_000_000 / config::RMT_CLOCK_DIVIDER as u32
}

fn level(high: bool) -> Level {
    if high { Level::High } else { Level::Low }
}

/// Blocking RMT transmit channel 0 on the strip data pin
pub struct RmtPulseChannel {
    channel: Option<Channel<Blocking, 0>>,
    config: TxChannelConfig,
    clock_hz: u32,
    /// Routed to the data pin and not used by a strip session yet
    fresh: bool,
    codes: Vec<u32>,
}

impl RmtPulseChannel {
    /// Wrap a channel already configured on [`config::LED_STRIP_DATA_PIN`] with `config`
    pub fn new(channel: Channel<Blocking, 0>, config: TxChannelConfig, clock_hz: u32) -> Self {
        Self {
            channel: Some(channel),
            config,
            clock_hz,
            fresh: true,
            codes: Vec::new(),
        }
    }

    /// Set the channel up again so the RMT output drives the data pin once more
    fn reattach(&mut self) -> Result<(), LedError> {
        self.channel = None;

        // SAFETY: the previous channel was dropped above and nothing else in the firmware
        // touches the RMT block or the data pin outside a strip session
        let (rmt, pin) = unsafe { (RMT::steal(), AnyPin::steal(config::LED_STRIP_DATA_PIN)) };

        let rmt = Rmt::new(rmt, Rate::from_mhz(config::RMT_SOURCE_MHZ)).map_err(|e| {
            error!("[RMT] Failed to re-initialize RMT: {:?}", e);
            LedError::HardwareInitFailed
        })?;
        let channel = rmt.channel0.configure(pin, self.config).map_err(|e| {
            error!("[RMT] Failed to re-configure channel: {:?}", e);
            LedError::HardwareInitFailed
        })?;

        self.channel = Some(channel);
        info!("[RMT] Channel routed to GPIO{} again", config::LED_STRIP_DATA_PIN);
        Ok(())
    }
}

impl PulseChannel for RmtPulseChannel {
    fn acquire(&mut self) -> Result<u32, LedError> {
        if self.clock_hz == 0 {
            return Err(LedError::HardwareInitFailed);
        }
        // the previous session handed the data pin to the SD card as an input
        if !self.fresh || self.channel.is_none() {
            self.reattach()?;
        }
        self.fresh = false;
        Ok(self.clock_hz)
    }

    async fn transmit(&mut self, pulses: &[PulseItem]) -> Result<(), LedError> {
        self.codes.clear();
        self.codes
            .try_reserve(pulses.len() + 1)
            .map_err(|_| LedError::OutOfMemory)?;
        self.codes.extend(pulses.iter().map(|p| {
            <u32 as PulseCode>::new(level(p.level0), p.duration0, level(p.level1), p.duration1)
        }));

        // Hold the line low, the zero-length second phase ends the transmission
        self.codes
            .push(<u32 as PulseCode>::new(Level::Low, END_HOLD_TICKS, Level::Low, 0));

        let Some(channel) = self.channel.take() else {
            error!("[RMT] Channel lost after a failed transmission");
            return Err(LedError::WriteFailed);
        };

        match channel.transmit(&self.codes) {
            Ok(transaction) => match transaction.wait() {
                Ok(channel) => {
                    self.channel = Some(channel);
                    Ok(())
                }
                Err((e, channel)) => {
                    warn!("[RMT] Transmission finished with error: {:?}", e);
                    self.channel = Some(channel);
                    Err(LedError::WriteFailed)
                }
            },
            Err(e) => {
                error!("[RMT] Failed to start transmission: {:?}", e);
                Err(LedError::WriteFailed)
            }
        }
    }
}

/// Direct GPIO access by pin number for the lines shared with the SD card
#[derive(Debug, Default)]
pub struct EspPins;

impl EspPins {
    fn pin(number: u8) -> AnyPin<'static> {
        // SAFETY: only used for the shared lines while this crate owns the bus
        unsafe { AnyPin::steal(number) }
    }
}

impl PinControl for EspPins {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), LedError> {
        let pull = match mode {
            PinMode::DigitalOut => {
                let output = Output::new(Self::pin(pin), Level::Low, OutputConfig::default());
                // keep the configuration after the driver goes away
                core::mem::forget(output);
                return Ok(());
            }
            PinMode::InputPullUp => Pull::Up,
            PinMode::InputPullDown => Pull::Down,
            PinMode::DigitalIn | PinMode::Reset => Pull::None,
        };

        let input = Input::new(Self::pin(pin), InputConfig::default().with_pull(pull));
        core::mem::forget(input);
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), LedError> {
        let mut output = Output::new(Self::pin(pin), level(high), OutputConfig::default());
        output.set_level(level(high));
        core::mem::forget(output);
        Ok(())
    }
}
