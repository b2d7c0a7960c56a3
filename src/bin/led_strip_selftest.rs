//! LED strip self test
//!
//! Runs the pixel store through its paces on the real RMT channel and reports each check
//! over the serial console.

#![no_std]
#![no_main]

extern crate alloc;

use embassy_futures::{block_on, join::join};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::Level;
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;

use pixelstrip_board::rmt::{EspPins, RmtPulseChannel, default_clock_hz};
use pixelstrip_board::{
    ALL_LEDS, BusOwner, LedError, LedStrip, PixelType, Rgbw, SegmentConfig, SharedBus,
    StripOptions, command, config, hsv_to_rgbw, rgbw_to_hsv,
};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

static SHARED_BUS: SharedBus<CriticalSectionRawMutex> = SharedBus::new();
static LED_STRIP: LedStrip<'static, CriticalSectionRawMutex> =
    LedStrip::new(StripOptions::new(), &SHARED_BUS);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("❌ {}", info);
    loop {}
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    println!("=== LED strip self test ===");

    let rmt = Rmt::new(peripherals.RMT, Rate::from_mhz(config::RMT_SOURCE_MHZ))
        .expect("RMT init");
    let tx_config = TxChannelConfig::default()
        .with_clk_divider(config::RMT_CLOCK_DIVIDER)
        .with_idle_output_level(Level::Low)
        .with_idle_output(true);
    let rmt_channel = rmt
        .channel0
        .configure(peripherals.GPIO13, tx_config)
        .expect("RMT channel");
    let channel = RmtPulseChannel::new(rmt_channel, tx_config, default_clock_hz());

    block_on(async {
        println!("\n1. Layout");
        LED_STRIP
            .configure(&[
                SegmentConfig::new("A", PixelType::Rgbw, 8),
                SegmentConfig::new("B", PixelType::Uv3, 3),
            ])
            .expect("configure");
        let mut refresher = LED_STRIP
            .init(channel, EspPins)
            .await
            .expect("init");
        let b = LED_STRIP.segment(Some("B")).expect("segment B");
        assert_eq!(b.first_pixel_offset, 32);
        assert_eq!(b.first_led_index, 8);
        assert_eq!(LED_STRIP.buffer_len(), Ok(41));
        println!("✅ 2 segments, 41 byte buffers");

        println!("\n2. Bounds");
        assert_eq!(
            LED_STRIP.set_led("A", 8, Rgbw::new(1, 1, 1, 1)),
            Err(LedError::InvalidArgument)
        );
        assert_eq!(
            LED_STRIP.set_led("C", 0, Rgbw::default()),
            Err(LedError::InvalidArgument)
        );
        println!("✅ Out of range writes rejected");

        println!("\n3. Set and get");
        LED_STRIP.set_led("A", 0, Rgbw::new(64, 0, 0, 0)).expect("set A0");
        LED_STRIP.set_led("B", ALL_LEDS, Rgbw::new(10, 20, 30, 40)).expect("set B");
        assert_eq!(LED_STRIP.get_led("A", 0), Ok(Rgbw::new(64, 0, 0, 0)));
        assert_eq!(LED_STRIP.get_led("B", 2), Ok(Rgbw::new(10, 20, 30, 0)));
        println!("✅ Draw buffer holds G,R,B,W bytes");

        println!("\n4. Flip and transmit");
        LED_STRIP.flip().await.expect("flip");
        let output = LED_STRIP.read_output().await.expect("output");
        assert_eq!(&output[..4], &[0, 64, 0, 0]);
        assert_eq!(refresher.transmit().await, Ok(true));
        assert!(!LED_STRIP.is_dirty().await);
        println!("✅ Frame sent, A0 should glow red");

        println!("\n5. Color conversion");
        let px = Rgbw::new(200, 100, 50, 0);
        let back = hsv_to_rgbw(rgbw_to_hsv(px));
        assert!(back.r.abs_diff(px.r) <= 2 && back.g.abs_diff(px.g) <= 2);
        println!("✅ {:?} -> {:?}", px, back);

        println!("\n6. Color command");
        let white = command::parse_led_color("%23808080").expect("parse");
        assert_eq!(white, Rgbw::new(0, 0, 0, 0x80));
        command::apply(&LED_STRIP, None, white).await.expect("apply");
        assert_eq!(refresher.transmit().await, Ok(true));
        println!("✅ Color segment set to white");

        println!("\n7. Shutdown");
        let (channel, result) = join(refresher.run(), LED_STRIP.deinit()).await;
        assert_eq!(result, Ok(()));
        assert!(!LED_STRIP.is_initialized());
        assert_eq!(SHARED_BUS.owner(), BusOwner::Free);
        println!("✅ Strip blanked and released");

        println!("\n8. Restart");
        let mut refresher = LED_STRIP.init(channel, EspPins).await.expect("re-init");
        LED_STRIP.set_led("A", 1, Rgbw::new(0, 64, 0, 0)).expect("set A1");
        LED_STRIP.flip().await.expect("flip");
        assert_eq!(refresher.transmit().await, Ok(true));
        let (_, result) = join(refresher.run(), LED_STRIP.deinit()).await;
        assert_eq!(result, Ok(()));
        println!("✅ Data pin routed to RMT again, A1 flashed green");
    });

    println!("\n=== All LED strip checks passed ===");
    loop {}
}
