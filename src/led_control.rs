//! Double-buffered pixel store and strip lifecycle
//!
//! Callers draw into the `draw` buffer with [`LedStrip::set_led`] and publish it with
//! [`LedStrip::flip`], which copies it (optionally through a [`Filter`]) into the `output`
//! buffer the refresh task transmits. Channel order inside a pixel is G, R, B, W.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ops::Range;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use log::{error, info, warn};

use crate::animator::{Animator, Filter};
use crate::color::Rgbw;
use crate::encoder::{BitTiming, PulseChannel, PulseEncoder, PulseItem};
use crate::pins::{BusOwner, PinControl, SharedBus, restore_shared_pins};
use crate::refresh::Refresher;
use crate::segment::{Layout, Segment, SegmentConfig};
use crate::{LedError, config};

/// `set_led` index addressing every LED of a segment
pub const ALL_LEDS: i32 = -1;

/// What happens to the animator and filter on deinit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRetention {
    ClearOnDeinit,
    KeepAcrossRestart,
}

/// Runtime knobs of a strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripOptions {
    pub timing: BitTiming,
    /// Pause between cycles when no animator is installed
    pub refresh_tick: Duration,
    pub transmit_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub hooks: HookRetention,
}

impl StripOptions {
    pub const fn new() -> Self {
        Self {
            timing: config::SK6812_TIMING,
            refresh_tick: config::REFRESH_TICK,
            transmit_timeout: config::TRANSMIT_TIMEOUT,
            shutdown_timeout: config::SHUTDOWN_TIMEOUT,
            hooks: HookRetention::ClearOnDeinit,
        }
    }

    pub const fn with_hooks(mut self, hooks: HookRetention) -> Self {
        self.hooks = hooks;
        self
    }

    pub const fn with_refresh_tick(mut self, tick: Duration) -> Self {
        self.refresh_tick = tick;
        self
    }

    pub const fn with_timing(mut self, timing: BitTiming) -> Self {
        self.timing = timing;
        self
    }

    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StripOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// State owned by callers: layout, draw buffer and hook registrations
pub(crate) struct PixelStore {
    pending: Vec<SegmentConfig>,
    pub(crate) layout: Option<Layout>,
    pub(crate) draw: Vec<u8>,
    pub(crate) animator: Option<Box<dyn Animator + Send>>,
    filter: Option<Box<dyn Filter + Send>>,
    /// Shared pin lines, held from init until they are handed back
    pins: Option<Box<dyn PinControl + Send>>,
    /// Bumped whenever the buffers are released; a refresher only acts for its own
    pub(crate) generation: u32,
}

impl PixelStore {
    const fn new() -> Self {
        Self {
            pending: Vec::new(),
            layout: None,
            draw: Vec::new(),
            animator: None,
            filter: None,
            pins: None,
            generation: 0,
        }
    }

    fn layout(&self) -> Result<&Layout, LedError> {
        self.layout.as_ref().ok_or(LedError::NotInitialized)
    }

    /// Resolve a segment and an LED index to a byte range of `draw`
    fn led_bytes(&self, name: &str, index: usize) -> Result<(Segment, Range<usize>), LedError> {
        let segment = *self.layout()?.find(name).ok_or(LedError::InvalidArgument)?;
        let led = segment.led_range(index).ok_or(LedError::InvalidArgument)?;
        let start = segment.first_pixel_offset + led.start;
        Ok((segment, start..start + segment.channels()))
    }
}

/// State shared with the refresh task
pub(crate) struct Frame {
    pub(crate) output: Vec<u8>,
    /// `output` holds data not yet on the wire
    pub(crate) dirty: bool,
}

/// A chain of LED segments driven from one data pin
pub struct LedStrip<'b, M: RawMutex> {
    pub(crate) options: StripOptions,
    bus: &'b SharedBus<M>,
    pub(crate) store: BlockingMutex<M, RefCell<PixelStore>>,
    pub(crate) frame: Mutex<M, Frame>,
    pub(crate) exit: Signal<M, ()>,
    /// Raised by the refresh task on its way out; carries whether the strip went dark
    pub(crate) stopped: Signal<M, bool>,
}

fn zeroed(len: usize) -> Result<Vec<u8>, LedError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| LedError::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

impl<'b, M: RawMutex> LedStrip<'b, M> {
    /// A strip whose data line is arbitrated by `bus`
    pub const fn new(options: StripOptions, bus: &'b SharedBus<M>) -> Self {
        Self {
            options,
            bus,
            store: BlockingMutex::new(RefCell::new(PixelStore::new())),
            frame: Mutex::new(Frame {
                output: Vec::new(),
                dirty: false,
            }),
            exit: Signal::new(),
            stopped: Signal::new(),
        }
    }

    pub fn options(&self) -> &StripOptions {
        &self.options
    }

    pub fn bus(&self) -> &'b SharedBus<M> {
        self.bus
    }

    /// Record the segment list used by the next [`init`](Self::init).
    ///
    /// The layout is validated here so a bad list is reported before any hardware is
    /// touched. A running strip keeps its current layout until re-initialized.
    pub fn configure(&self, segments: &[SegmentConfig]) -> Result<(), LedError> {
        Layout::new(segments)?;

        let mut pending = Vec::new();
        pending
            .try_reserve_exact(segments.len())
            .map_err(|_| LedError::OutOfMemory)?;
        pending.extend_from_slice(segments);

        self.store.lock(|store| store.borrow_mut().pending = pending);
        info!("[LED] Configured {} segments", segments.len());
        Ok(())
    }

    /// Configure and initialize in one go
    pub async fn init_with<'a, C, P>(
        &'a self,
        segments: &[SegmentConfig],
        channel: C,
        pins: P,
    ) -> Result<Refresher<'a, M, C>, LedError>
    where
        C: PulseChannel,
        P: PinControl + Send + 'static,
    {
        self.configure(segments)?;
        self.init(channel, pins).await
    }

    /// Allocate the pixel buffers and bring up the pulse channel.
    ///
    /// Returns the refresh task body; spawn [`Refresher::run`] to start sending frames.
    /// Initializing a running strip shuts it down first and fails if that shutdown did
    /// not complete cleanly.
    pub async fn init<'a, C, P>(
        &'a self,
        mut channel: C,
        mut pins: P,
    ) -> Result<Refresher<'a, M, C>, LedError>
    where
        C: PulseChannel,
        P: PinControl + Send + 'static,
    {
        if self.is_initialized() {
            info!("[LED] Re-initializing, tearing down the running strip");
            self.deinit().await?;
        }

        let layout = self.store.lock(|store| {
            let store = store.borrow();
            if store.pending.is_empty() {
                warn!("[LED] Init without configured segments");
                return Err(LedError::InvalidArgument);
            }
            Layout::new(&store.pending)
        })?;

        self.bus.claim(BusOwner::LedStrip)?;

        let encoder = match channel
            .acquire()
            .and_then(|hz| PulseEncoder::new(&self.options.timing, hz))
        {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("[LED] Pulse channel init failed: {:?}", e);
                self.abort_init(&mut pins).await;
                return Err(LedError::HardwareInitFailed);
            }
        };

        let total = layout.total_pixels();
        let allocated = zeroed(total).and_then(|draw| {
            let output = zeroed(total)?;
            let mut pulses: Vec<PulseItem> = Vec::new();
            let items = total.checked_mul(8).ok_or(LedError::OutOfMemory)?;
            pulses
                .try_reserve_exact(items)
                .map_err(|_| LedError::OutOfMemory)?;
            Ok((draw, output, pulses))
        });
        let (draw, output, pulses) = match allocated {
            Ok(buffers) => buffers,
            Err(e) => {
                error!("[LED] Failed to allocate {} byte pixel buffers", total);
                self.abort_init(&mut pins).await;
                return Err(e);
            }
        };

        {
            let mut frame = self.frame.lock().await;
            frame.output = output;
            frame.dirty = false;
        }

        info!(
            "[LED] Initialized {} segments, {} LEDs, {} bytes per buffer",
            layout.segments().len(),
            layout.total_leds(),
            total
        );

        let pins: Box<dyn PinControl + Send> = Box::new(pins);
        let generation = self.store.lock(|store| {
            let mut store = store.borrow_mut();
            store.draw = draw;
            store.layout = Some(layout);
            store.pins = Some(pins);
            store.generation
        });

        Ok(Refresher::new(self, channel, encoder, pulses, generation))
    }

    /// Best-effort cleanup after a failed init
    async fn abort_init<P: PinControl>(&self, pins: &mut P) {
        self.release_buffers().await;
        let _ = restore_shared_pins(pins);
        self.bus.release(BusOwner::LedStrip);
    }

    /// Put the shared pins back into SD card mode and give up the bus claim.
    ///
    /// Does nothing for the pins once they have been handed back.
    pub(crate) fn release_pins(&self) {
        let pins = self.store.lock(|store| store.borrow_mut().pins.take());
        if let Some(mut pins) = pins {
            let _ = restore_shared_pins(&mut *pins);
        }
        self.bus.release(BusOwner::LedStrip);
    }

    /// Whether `generation` is still the live session
    pub(crate) fn is_current(&self, generation: u32) -> bool {
        self.store.lock(|store| {
            let store = store.borrow();
            store.layout.is_some() && store.generation == generation
        })
    }

    async fn release_buffers(&self) {
        {
            let mut frame = self.frame.lock().await;
            frame.output = Vec::new();
            frame.dirty = false;
        }

        let clear_hooks = self.options.hooks == HookRetention::ClearOnDeinit;
        self.store.lock(|store| {
            let mut store = store.borrow_mut();
            store.layout = None;
            store.draw = Vec::new();
            store.generation = store.generation.wrapping_add(1);
            if clear_hooks {
                store.animator = None;
                store.filter = None;
            }
        });
    }

    /// Stop the refresh task and free the buffers.
    ///
    /// The task blanks the strip, restores the shared pins and confirms before the buffers
    /// go away. If it does not confirm within the shutdown timeout, or could not blank the
    /// strip, the pins and buffers are released anyway and `WriteFailed` is returned. A
    /// task that confirms late finds its session gone and leaves the hardware alone.
    pub async fn deinit(&self) -> Result<(), LedError> {
        if !self.is_initialized() {
            return Err(LedError::NotInitialized);
        }

        info!("[LED] Stopping refresh task...");
        self.exit.signal(());

        let result = match with_timeout(self.options.shutdown_timeout, self.stopped.wait()).await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("[LED] Refresh task stopped without blanking the strip");
                Err(LedError::WriteFailed)
            }
            Err(_) => {
                warn!("[LED] Refresh task did not confirm shutdown, releasing pins anyway");
                Err(LedError::WriteFailed)
            }
        };

        self.release_buffers().await;
        self.release_pins();
        self.exit.reset();
        self.stopped.reset();
        info!("[LED] Deinitialized");
        result
    }

    pub fn is_initialized(&self) -> bool {
        self.store.lock(|store| store.borrow().layout.is_some())
    }

    /// Write one LED (or every LED of the segment for [`ALL_LEDS`]) into the draw buffer.
    ///
    /// Channels the segment does not have are ignored.
    pub fn set_led(&self, segment: &str, index: i32, color: Rgbw) -> Result<(), LedError> {
        let bytes = color.to_grbw();
        self.store.lock(|store| {
            let mut store = store.borrow_mut();

            if index == ALL_LEDS {
                let segment = *store.layout()?.find(segment).ok_or(LedError::InvalidArgument)?;
                let channels = segment.channels();
                for led in store.draw[segment.range()].chunks_exact_mut(channels) {
                    led.copy_from_slice(&bytes[..channels]);
                }
                return Ok(());
            }

            let index = usize::try_from(index).map_err(|_| LedError::InvalidArgument)?;
            let (segment, range) = store.led_bytes(segment, index)?;
            store.draw[range].copy_from_slice(&bytes[..segment.channels()]);
            Ok(())
        })
    }

    /// Write every LED of every segment
    pub fn set_all(&self, color: Rgbw) -> Result<(), LedError> {
        let bytes = color.to_grbw();
        self.store.lock(|store| {
            let mut store = store.borrow_mut();
            let PixelStore { layout, draw, .. } = &mut *store;
            let layout = layout.as_ref().ok_or(LedError::NotInitialized)?;
            for segment in layout.segments() {
                let channels = segment.channels();
                for led in draw[segment.range()].chunks_exact_mut(channels) {
                    led.copy_from_slice(&bytes[..channels]);
                }
            }
            Ok(())
        })
    }

    /// Read one LED back from the draw buffer; absent channels read as zero
    pub fn get_led(&self, segment: &str, index: i32) -> Result<Rgbw, LedError> {
        self.store.lock(|store| {
            let store = store.borrow();
            store.layout()?;
            let index = usize::try_from(index).map_err(|_| LedError::InvalidArgument)?;
            let (_, range) = store.led_bytes(segment, index)?;
            Ok(Rgbw::from_grbw(&store.draw[range]))
        })
    }

    /// Zero the draw buffer. Takes effect on the next flip.
    pub fn clear(&self) -> Result<(), LedError> {
        self.store.lock(|store| {
            let mut store = store.borrow_mut();
            store.layout()?;
            store.draw.fill(0);
            Ok(())
        })
    }

    /// Publish the draw buffer to the output buffer and mark it for sending
    pub async fn flip(&self) -> Result<(), LedError> {
        let mut frame = self.frame.lock().await;
        let output = &mut frame.output;

        self.store.lock(|store| {
            let mut store = store.borrow_mut();
            store.layout()?;
            let PixelStore { draw, filter, .. } = &mut *store;
            if output.len() != draw.len() {
                return Err(LedError::NotInitialized);
            }

            match filter {
                Some(filter) => {
                    if !filter.apply(output, draw) {
                        warn!("[LED] Filter rejected frame, publishing unfiltered");
                        output.copy_from_slice(draw);
                    }
                }
                None => output.copy_from_slice(draw),
            }
            Ok(())
        })?;

        frame.dirty = true;
        Ok(())
    }

    /// Install or remove the animator. Replaces any previous one.
    pub fn set_animator(&self, animator: Option<Box<dyn Animator + Send>>) {
        self.store.lock(|store| store.borrow_mut().animator = animator);
    }

    /// Install or remove the flip filter. Replaces any previous one.
    pub fn set_filter(&self, filter: Option<Box<dyn Filter + Send>>) {
        self.store.lock(|store| store.borrow_mut().filter = filter);
    }

    pub fn has_animator(&self) -> bool {
        self.store.lock(|store| store.borrow().animator.is_some())
    }

    pub fn has_filter(&self) -> bool {
        self.store.lock(|store| store.borrow().filter.is_some())
    }

    /// Copy of a segment's layout; the first segment when `name` is `None`
    pub fn segment(&self, name: Option<&str>) -> Result<Segment, LedError> {
        self.store.lock(|store| {
            let store = store.borrow();
            store.layout()?.lookup(name).copied().ok_or(LedError::InvalidArgument)
        })
    }

    pub fn segment_count(&self) -> usize {
        self.store.lock(|store| {
            store
                .borrow()
                .layout
                .as_ref()
                .map_or(0, |layout| layout.segments().len())
        })
    }

    /// Length of each pixel buffer
    pub fn buffer_len(&self) -> Result<usize, LedError> {
        self.store.lock(|store| Ok(store.borrow().layout()?.total_pixels()))
    }

    /// Snapshot of the output buffer
    pub async fn read_output(&self) -> Result<Vec<u8>, LedError> {
        let frame = self.frame.lock().await;
        if !self.is_initialized() {
            return Err(LedError::NotInitialized);
        }
        let mut copy = Vec::new();
        copy.try_reserve_exact(frame.output.len())
            .map_err(|_| LedError::OutOfMemory)?;
        copy.extend_from_slice(&frame.output);
        Ok(copy)
    }

    /// Whether the output buffer still waits to be sent
    pub async fn is_dirty(&self) -> bool {
        self.frame.lock().await.dirty
    }
}
