#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::Level;
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_embassy::Executor;
use log::{error, info, warn};
use static_cell::StaticCell;

use pixelstrip_board::rmt::{EspPins, RmtPulseChannel, default_clock_hz};
use pixelstrip_board::{
    HueCycleAnimator, LedStrip, PixelType, Refresher, SegmentConfig, SharedBus, StripOptions,
    WhiteLight, command, config,
};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type LedRefresher = Refresher<'static, CriticalSectionRawMutex, RmtPulseChannel>;

static SHARED_BUS: SharedBus<CriticalSectionRawMutex> = SharedBus::new();
static LED_STRIP: LedStrip<'static, CriticalSectionRawMutex> =
    LedStrip::new(StripOptions::new(), &SHARED_BUS);

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

/// Board chain: an RGBW ring followed by three UV LEDs
const SEGMENTS: [SegmentConfig; 2] = [
    SegmentConfig::new("Color", PixelType::Rgbw, 8),
    SegmentConfig::new("UV", PixelType::Uv3, 3),
];

/// Color painted at boot, set through `BOOT_LED_COLOR` in `.env`
const BOOT_LED_COLOR: &str = env!("BOOT_LED_COLOR");

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("[MAIN] Panic: {}", info);
    loop {}
}

#[embassy_executor::task]
async fn led_refresh_task(refresher: LedRefresher) {
    let _ = refresher.run().await;
    info!("[MAIN] LED refresh task finished");
}

#[embassy_executor::task]
async fn app_task(spawner: Spawner, channel: RmtPulseChannel) {
    let refresher = match LED_STRIP
        .init_with(&SEGMENTS, channel, EspPins)
        .await
    {
        Ok(refresher) => refresher,
        Err(e) => {
            error!("[MAIN] ❌ LED strip init failed: {:?}", e);
            return;
        }
    };

    if let Err(e) = spawner.spawn(led_refresh_task(refresher)) {
        error!("[MAIN] ❌ Failed to spawn LED refresh task: {:?}", e);
        return;
    }
    info!("[MAIN] ✅ LED refresh task spawned");

    match command::parse_led_color(BOOT_LED_COLOR) {
        Ok(color) => {
            if let Err(e) = command::apply(&LED_STRIP, None, color).await {
                warn!("[MAIN] Failed to apply boot color: {:?}", e);
            }
        }
        Err(_) => warn!("[MAIN] Ignoring invalid BOOT_LED_COLOR {:?}", BOOT_LED_COLOR),
    }

    LED_STRIP.set_animator(Some(Box::new(HueCycleAnimator::new())));

    // Short flash of the white light to show the board is up
    let mut light = WhiteLight::new(LED_STRIP.bus(), EspPins);
    if light.set(true).is_ok() {
        Timer::after(Duration::from_millis(100)).await;
        let _ = light.set(false);
    }

    loop {
        Timer::after(Duration::from_secs(10)).await;
        info!(
            "[MAIN] Alive: {} segments, animator {}",
            LED_STRIP.segment_count(),
            if LED_STRIP.has_animator() { "on" } else { "off" }
        );
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Pixel buffers and pulse trains live on the heap
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    info!("[LED] Initializing RMT peripheral...");
    let rmt = match Rmt::new(peripherals.RMT, Rate::from_mhz(config::RMT_SOURCE_MHZ)) {
        Ok(rmt) => rmt,
        Err(e) => {
            error!("[LED] ❌ Failed to initialize RMT: {:?}", e);
            panic!("RMT initialization failed");
        }
    };

    let tx_config = TxChannelConfig::default()
        .with_clk_divider(config::RMT_CLOCK_DIVIDER)
        .with_idle_output_level(Level::Low)
        .with_idle_output(true)
        .with_carrier_modulation(false);

    // GPIO13, see config::LED_STRIP_DATA_PIN
    let rmt_channel = match rmt.channel0.configure(peripherals.GPIO13, tx_config) {
        Ok(channel) => channel,
        Err(e) => {
            error!("[LED] ❌ Failed to configure RMT channel: {:?}", e);
            panic!("RMT channel configuration failed");
        }
    };
    let channel = RmtPulseChannel::new(rmt_channel, tx_config, default_clock_hz());
    info!(
        "[LED] RMT channel ready on GPIO{} at {}Hz",
        config::LED_STRIP_DATA_PIN,
        default_clock_hz()
    );

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        info!("[MAIN] Spawning app task...");
        if let Err(e) = spawner.spawn(app_task(spawner, channel)) {
            error!("[MAIN] ❌ Failed to spawn app task: {:?}", e);
        }
    });
}
