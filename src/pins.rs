//! GPIO sharing between the LED strip and the SD card interface
//!
//! The strip data line and one more GPIO double as SD card lines, and the onboard white
//! light flashes with SD traffic. Whoever holds the [`SharedBus`] may drive them.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{info, warn};

use crate::{LedError, config};

/// Modes we use the pins in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    DigitalOut,
    DigitalIn,
    InputPullUp,
    InputPullDown,
    Reset,
}

/// Low-level GPIO access
pub trait PinControl {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), LedError>;
    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), LedError>;
}

impl<P: PinControl + ?Sized> PinControl for &mut P {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), LedError> {
        (**self).set_mode(pin, mode)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), LedError> {
        (**self).digital_write(pin, high)
    }
}

/// Current user of the shared GPIO lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOwner {
    Free,
    LedStrip,
    SdCard,
}

/// Arbiter for the GPIO lines shared with the SD card
pub struct SharedBus<M: RawMutex> {
    owner: BlockingMutex<M, Cell<BusOwner>>,
}

impl<M: RawMutex> SharedBus<M> {
    pub const fn new() -> Self {
        Self {
            owner: BlockingMutex::new(Cell::new(BusOwner::Free)),
        }
    }

    pub fn owner(&self) -> BusOwner {
        self.owner.lock(Cell::get)
    }

    /// Take the lines for `who`. Claiming again as the current owner succeeds.
    pub fn claim(&self, who: BusOwner) -> Result<(), LedError> {
        self.owner.lock(|owner| match owner.get() {
            BusOwner::Free => {
                owner.set(who);
                Ok(())
            }
            current if current == who => Ok(()),
            current => {
                warn!("[PINS] {:?} wants the shared pins, held by {:?}", who, current);
                Err(LedError::PinConflict)
            }
        })
    }

    /// Give the lines back; a release by a non-owner is ignored
    pub fn release(&self, who: BusOwner) {
        self.owner.lock(|owner| {
            if owner.get() == who {
                owner.set(BusOwner::Free);
            }
        });
    }
}

impl<M: RawMutex> Default for SharedBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Put the shared lines into a state the SD card driver can take over from
pub fn restore_shared_pins<P: PinControl + ?Sized>(pins: &mut P) -> Result<(), LedError> {
    let mut result = Ok(());
    for pin in config::SD_SHARED_PINS {
        if let Err(e) = pins.set_mode(pin, PinMode::InputPullUp) {
            warn!("[PINS] Failed to restore GPIO{}: {:?}", pin, e);
            result = Err(e);
        }
    }
    result
}

/// The white LED on the top of the board
pub struct WhiteLight<'a, M: RawMutex, P: PinControl> {
    bus: &'a SharedBus<M>,
    pins: P,
    pin: u8,
    on: bool,
}

impl<'a, M: RawMutex, P: PinControl> WhiteLight<'a, M, P> {
    pub fn new(bus: &'a SharedBus<M>, pins: P) -> Self {
        Self {
            bus,
            pins,
            pin: config::WHITE_LIGHT_PIN,
            on: false,
        }
    }

    /// Turn the light on or off. Refused while the SD card is active.
    pub fn set(&mut self, on: bool) -> Result<(), LedError> {
        if self.bus.owner() == BusOwner::SdCard {
            warn!("[PINS] SD card is active, ignoring light request");
            return Err(LedError::PinConflict);
        }

        // Reconfigure every time, the SD driver takes the pin over
        self.pins.set_mode(self.pin, PinMode::DigitalOut)?;
        self.pins.digital_write(self.pin, on)?;
        self.on = on;
        info!("[PINS] White light {}", if on { "on" } else { "off" });
        Ok(())
    }

    pub fn blink(&mut self) -> Result<(), LedError> {
        self.set(!self.on)
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
