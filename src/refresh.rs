//! Refresh task
//!
//! Each cycle either lets the animator draw straight into the output buffer or sends the
//! last flipped frame. Frames are only sent when the output buffer is dirty and never
//! closer together than the protocol reset time. Failed frames stay dirty and are retried
//! on the next cycle. A refresher belongs to one init; once its strip has been released it
//! stops without touching the wire or the pins.

use alloc::vec::Vec;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer, with_timeout};
use log::{debug, error, info, warn};

use crate::animator::SegmentFrame;
use crate::encoder::{PulseChannel, PulseEncoder, PulseItem};
use crate::led_control::{LedStrip, PixelStore};
use crate::{LedError, config};

/// Body of the dedicated refresh task, created by [`LedStrip::init`]
pub struct Refresher<'a, M: RawMutex, C: PulseChannel> {
    strip: &'a LedStrip<'a, M>,
    channel: C,
    encoder: PulseEncoder,
    pulses: Vec<PulseItem>,
    last_transmit: Option<Instant>,
    generation: u32,
}

impl<'a, M, C> Refresher<'a, M, C>
where
    M: RawMutex,
    C: PulseChannel,
{
    pub(crate) fn new(
        strip: &'a LedStrip<'a, M>,
        channel: C,
        encoder: PulseEncoder,
        pulses: Vec<PulseItem>,
        generation: u32,
    ) -> Self {
        Self {
            strip,
            channel,
            encoder,
            pulses,
            last_transmit: None,
            generation,
        }
    }

    pub fn encoder(&self) -> &PulseEncoder {
        &self.encoder
    }

    /// Run until [`LedStrip::deinit`] asks to stop, then blank the strip, hand the shared
    /// pins back and return the channel.
    pub async fn run(mut self) -> C {
        info!("[LED] Refresh task started");

        while !self.strip.exit.signaled() && self.strip.is_current(self.generation) {
            self.cycle().await;
        }

        self.shutdown().await;
        self.channel
    }

    /// One pass of the refresh loop
    pub async fn cycle(&mut self) {
        match self.animate().await {
            Some(interval) => {
                self.send().await;
                if interval.as_ticks() == 0 {
                    yield_now().await;
                } else {
                    Timer::after(interval).await;
                }
            }
            None => {
                self.send().await;
                Timer::after(self.strip.options.refresh_tick).await;
            }
        }
    }

    async fn send(&mut self) {
        if let Err(e) = self.transmit().await {
            error!("[LED] Frame transmission failed: {:?}, retrying next cycle", e);
        }
    }

    /// Run the animator over every segment. `None` when no animator is installed.
    async fn animate(&mut self) -> Option<Duration> {
        let strip = self.strip;
        let generation = self.generation;
        let mut frame = strip.frame.lock().await;
        let output = &mut frame.output;

        let (updated, interval) = strip.store.lock(|store| {
            let mut store = store.borrow_mut();
            let PixelStore {
                layout,
                draw,
                animator,
                generation: current,
                ..
            } = &mut *store;
            if *current != generation {
                return None;
            }
            let animator = animator.as_mut()?;
            let layout = layout.as_ref()?;
            if output.len() != draw.len() {
                return None;
            }

            // every segment gets its turn, no short-circuit
            let mut updated = false;
            for segment in layout.segments() {
                let range = segment.range();
                updated |= animator.process(SegmentFrame {
                    segment,
                    draw: &draw[range.clone()],
                    output: &mut output[range],
                });
            }
            animator.end_cycle();
            Some((updated, animator.frame_interval()))
        })?;

        if updated {
            frame.dirty = true;
        }
        Some(interval)
    }

    /// Send the output buffer if it holds a new frame. Returns whether a frame went out.
    pub async fn transmit(&mut self) -> Result<bool, LedError> {
        let strip = self.strip;
        if !strip.frame.lock().await.dirty {
            return Ok(false);
        }

        if let Some(last) = self.last_transmit {
            let reset = self.encoder.reset();
            let elapsed = last.elapsed();
            if elapsed < reset {
                Timer::after(reset - elapsed).await;
            }
        }

        let mut frame = strip.frame.lock().await;
        if !frame.dirty || !strip.is_current(self.generation) {
            return Ok(false);
        }

        self.encode(&frame.output)?;
        let result = with_timeout(
            strip.options.transmit_timeout,
            self.channel.transmit(&self.pulses),
        )
        .await;
        self.last_transmit = Some(Instant::now());

        match result {
            Ok(Ok(())) => {
                frame.dirty = false;
                debug!("[LED] Sent {} bytes", frame.output.len());
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                error!("[LED] Frame transmission timed out");
                Err(LedError::WriteFailed)
            }
        }
    }

    /// Fill the pulse buffer in encoder-sized batches
    fn encode(&mut self, output: &[u8]) -> Result<(), LedError> {
        self.pulses.clear();
        self.pulses.resize(output.len() * 8, PulseItem::default());

        let mut consumed = 0;
        while consumed < output.len() {
            let dest = &mut self.pulses[consumed * 8..];
            let wanted = dest.len().min(config::ENCODER_BATCH_ITEMS);
            let done = self.encoder.translate(&output[consumed..], dest, wanted);
            if done.bytes == 0 {
                return Err(LedError::WriteFailed);
            }
            consumed += done.bytes;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        let strip = self.strip;
        if !strip.is_current(self.generation) {
            warn!("[LED] Refresh task outlived its strip, leaving the hardware alone");
            return;
        }

        info!("[LED] Refresh task stopping, blanking strip");
        let blanked = self.blank().await;

        // deinit may have given up on us while the blank frame was going out
        if !strip.is_current(self.generation) {
            warn!("[LED] Strip released during shutdown, leaving the hardware alone");
            return;
        }
        strip.release_pins();

        strip.stopped.signal(blanked);
        info!("[LED] Refresh task stopped");
    }

    /// Publish an all-zero frame and push it out, retrying a few times
    async fn blank(&mut self) -> bool {
        let strip = self.strip;
        if strip.clear().is_err() || strip.flip().await.is_err() {
            return false;
        }

        for attempt in 1..=config::SHUTDOWN_BLANK_ATTEMPTS {
            match self.transmit().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!("[LED] Blank frame attempt {} failed: {:?}", attempt, e);
                    Timer::after(strip.options.refresh_tick).await;
                }
            }
        }

        error!("[LED] Failed to blank strip on shutdown");
        false
    }
}
