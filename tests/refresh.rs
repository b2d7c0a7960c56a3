//! Host-level tests for the refresh task: what reaches the wire and when.

mod common;

use common::{Bus, RecordingChannel, RecordingPins, SEGMENTS, Strip, Wire, options};
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use pixelstrip_board::{
    ALL_LEDS, BusOwner, ChaseAnimator, HueCycleAnimator, LedError, PinMode, PixelType, Refresher,
    Rgbw, SegmentConfig, SegmentFrame, config,
};

type TestRefresher<'a> = Refresher<'a, CriticalSectionRawMutex, RecordingChannel>;

fn start<'a>(strip: &'a Strip<'a>, wire: &Wire, pins: &RecordingPins) -> TestRefresher<'a> {
    block_on(strip.init_with(&SEGMENTS, RecordingChannel::new(wire), pins.clone())).unwrap()
}

#[test]
fn encoder_uses_board_timing() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let refresher = start(&strip, &wire, &RecordingPins::default());

    let encoder = refresher.encoder();
    assert_eq!((encoder.zero().duration0, encoder.zero().duration1), (12, 36));
    assert_eq!((encoder.one().duration0, encoder.one().duration1), (24, 24));
    assert_eq!(encoder.reset(), config::SK6812_TIMING.reset);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn flipped_frame_is_sent_once() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    // nothing flipped yet
    assert_eq!(block_on(refresher.transmit()), Ok(false));
    assert_eq!(wire.count(), 0);

    strip.set_led("A", 0, Rgbw::new(64, 0, 0, 0)).unwrap();
    strip.set_led("B", 2, Rgbw::new(7, 8, 9, 0)).unwrap();
    block_on(strip.flip()).unwrap();

    assert_eq!(block_on(refresher.transmit()), Ok(true));
    assert_eq!(block_on(refresher.transmit()), Ok(false));
    assert!(!block_on(strip.is_dirty()));

    let frame = wire.last().unwrap();
    assert_eq!(frame.len(), 41);
    assert_eq!(&frame[..4], &[0, 64, 0, 0]);
    assert_eq!(&frame[38..], &[8, 7, 9]);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn failed_frame_is_retried() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    strip.set_led("A", ALL_LEDS, Rgbw::new(0, 0, 0, 255)).unwrap();
    block_on(strip.flip()).unwrap();

    wire.fail_next(1);
    assert_eq!(block_on(refresher.transmit()), Err(LedError::WriteFailed));
    assert!(block_on(strip.is_dirty()));
    assert_eq!(wire.count(), 0);

    assert_eq!(block_on(refresher.transmit()), Ok(true));
    assert_eq!(wire.last().unwrap()[3], 255);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn frames_are_spaced_by_reset_time() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    for level in [10, 20, 30] {
        strip.set_led("A", 0, Rgbw::new(level, 0, 0, 0)).unwrap();
        block_on(strip.flip()).unwrap();
        assert_eq!(block_on(refresher.transmit()), Ok(true));
    }

    let stamps = wire.timestamps();
    assert_eq!(stamps.len(), 3);
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= config::SK6812_TIMING.reset);
    }

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn refresh_loop_sends_flipped_frames() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let refresher = start(&strip, &wire, &RecordingPins::default());

    block_on(join(refresher.run(), async {
        strip.set_led("A", 2, Rgbw::new(0, 0, 99, 0)).unwrap();
        strip.flip().await.unwrap();
        Timer::after(Duration::from_millis(20)).await;
        assert!(!strip.is_dirty().await);
        assert_eq!(wire.count(), 1);
        assert_eq!(wire.last().unwrap()[10], 99);
        strip.deinit().await.unwrap();
    }));
}

#[test]
fn deinit_during_animation_blanks_the_strip() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let pins = RecordingPins::default();
    let refresher = start(&strip, &wire, &pins);

    strip.set_led("A", ALL_LEDS, Rgbw::new(200, 0, 0, 10)).unwrap();
    strip.set_led("B", ALL_LEDS, Rgbw::new(50, 50, 50, 0)).unwrap();
    block_on(strip.flip()).unwrap();
    strip.set_animator(Some(Box::new(
        HueCycleAnimator::new().with_interval(Duration::from_millis(2)),
    )));

    let (_, result) = block_on(join(refresher.run(), async {
        Timer::after(Duration::from_millis(30)).await;
        strip.deinit().await
    }));

    assert_eq!(result, Ok(()));
    assert!(wire.count() > 2);
    assert_eq!(wire.last().unwrap(), vec![0; 41]);
    assert!(!strip.is_initialized());
    assert_eq!(bus.owner(), BusOwner::Free);

    let modes = pins.modes();
    assert_eq!(
        &modes[modes.len() - 2..],
        &[(12, PinMode::InputPullUp), (13, PinMode::InputPullUp)]
    );
}

#[test]
fn animator_sees_every_segment() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = seen.clone();
    strip.set_animator(Some(Box::new(move |frame: SegmentFrame<'_>| {
        log.lock().unwrap().push((frame.segment.name, frame.output.len()));
        // only the first segment reports a change
        frame.segment.name == "A"
    })));

    block_on(refresher.cycle());
    assert_eq!(*seen.lock().unwrap(), vec![("A", 32), ("B", 9)]);
    assert_eq!(wire.count(), 1);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn idle_animator_sends_nothing() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    strip.set_animator(Some(Box::new(|_: SegmentFrame<'_>| false)));
    block_on(refresher.cycle());
    block_on(refresher.cycle());
    assert_eq!(wire.count(), 0);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn chase_rotates_drawn_pattern() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    strip.set_led("A", 1, Rgbw::new(0, 0, 0, 77)).unwrap();
    strip.set_animator(Some(Box::new(
        ChaseAnimator::new().with_interval(Duration::from_ticks(0)),
    )));

    // first cycle copies the pattern as drawn
    block_on(refresher.cycle());
    assert_eq!(&wire.last().unwrap()[4..8], &[0, 0, 0, 77]);

    // second cycle moves it one LED towards the start
    block_on(refresher.cycle());
    assert_eq!(&wire.last().unwrap()[..4], &[0, 0, 0, 77]);
    assert_eq!(&wire.last().unwrap()[4..8], &[0, 0, 0, 0]);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn stopped_strip_can_be_started_again() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let pins = RecordingPins::default();

    let refresher = start(&strip, &wire, &pins);
    let (channel, _) = block_on(join(refresher.run(), strip.deinit()));

    // the same channel comes back and is brought up again
    let mut refresher = block_on(strip.init(channel, pins.clone())).unwrap();
    assert_eq!(wire.acquisitions(), 2);
    strip.set_led("B", 0, Rgbw::new(1, 1, 1, 0)).unwrap();
    block_on(strip.flip()).unwrap();
    assert_eq!(block_on(refresher.transmit()), Ok(true));
    assert_eq!(&wire.last().unwrap()[32..35], &[1, 1, 1]);

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn hue_cycle_turns_all_rgbw_segments_together() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let rings = [
        SegmentConfig::new("L", PixelType::Rgbw, 2),
        SegmentConfig::new("R", PixelType::Rgbw, 2),
    ];
    let mut refresher =
        block_on(strip.init_with(&rings, RecordingChannel::new(&wire), RecordingPins::default()))
            .unwrap();

    strip.set_all(Rgbw::new(255, 0, 0, 0)).unwrap();
    strip.set_animator(Some(Box::new(
        HueCycleAnimator::new()
            .with_step(10)
            .with_interval(Duration::from_ticks(0)),
    )));

    block_on(refresher.cycle());
    assert!(wire.last().unwrap().chunks(4).all(|led| led == [0, 255, 0, 0]));

    // one step per cycle, the same for both rings
    block_on(refresher.cycle());
    assert!(wire.last().unwrap().chunks(4).all(|led| led == [85, 255, 0, 0]));

    block_on(join(refresher.run(), strip.deinit()));
}

#[test]
fn init_on_running_strip_stops_the_old_task_first() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let pins = RecordingPins::default();
    let refresher = start(&strip, &wire, &pins);

    block_on(join(refresher.run(), async {
        strip.set_led("A", 0, Rgbw::new(9, 9, 9, 9)).unwrap();
        strip.flip().await.unwrap();
        Timer::after(Duration::from_millis(5)).await;
        assert_eq!(wire.count(), 1);

        let second = Wire::default();
        let fresh = strip
            .init(RecordingChannel::new(&second), pins.clone())
            .await
            .unwrap();

        // the old task blanked the strip before the new buffers came up
        assert_eq!(wire.last().unwrap(), vec![0; 41]);
        assert_eq!(strip.get_led("A", 0), Ok(Rgbw::default()));
        assert_eq!(bus.owner(), BusOwner::LedStrip);

        strip.set_led("A", 0, Rgbw::new(1, 0, 0, 0)).unwrap();
        strip.flip().await.unwrap();
        let (_, result) = join(fresh.run(), async {
            Timer::after(Duration::from_millis(5)).await;
            strip.deinit().await
        })
        .await;
        assert_eq!(result, Ok(()));

        // only the new channel carried frames after the re-init
        assert_eq!(wire.count(), 2);
        assert_eq!(&second.frames()[0][..4], &[0, 1, 0, 0]);
        assert_eq!(second.last().unwrap(), vec![0; 41]);
    }));
    assert_eq!(bus.owner(), BusOwner::Free);
}

#[test]
fn blank_frame_is_retried_on_shutdown() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let mut refresher = start(&strip, &wire, &RecordingPins::default());

    strip.set_led("A", ALL_LEDS, Rgbw::new(0, 80, 0, 0)).unwrap();
    block_on(strip.flip()).unwrap();
    assert_eq!(block_on(refresher.transmit()), Ok(true));

    wire.fail_next(1);
    let (_, result) = block_on(join(refresher.run(), strip.deinit()));

    assert_eq!(result, Ok(()));
    assert_eq!(wire.count(), 2);
    assert_eq!(wire.last().unwrap(), vec![0; 41]);
    assert_eq!(bus.owner(), BusOwner::Free);
}

#[test]
fn strip_that_cannot_be_blanked_reports_it() {
    let bus = Bus::new();
    let strip = Strip::new(options(), &bus);
    let wire = Wire::default();
    let pins = RecordingPins::default();
    let refresher = start(&strip, &wire, &pins);

    wire.fail_next(usize::MAX);
    let (_, result) = block_on(join(refresher.run(), strip.deinit()));

    assert_eq!(result, Err(LedError::WriteFailed));
    assert_eq!(wire.count(), 0);
    assert!(!strip.is_initialized());
    assert_eq!(bus.owner(), BusOwner::Free);
    assert_eq!(
        pins.modes(),
        vec![(12, PinMode::InputPullUp), (13, PinMode::InputPullUp)]
    );
}
