//! padlink firmware: nRF52840 + S140 as a BLE central for one game controller.
//!
//! Scans for the controller, bonds, decodes its HID reports and pulses the
//! rumble motors whenever A is pressed.

#![no_std]
#![no_main]

mod softdevice;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_nrf::interrupt;
use embassy_time::{Instant, Timer};
use nrf_softdevice::{self as sd, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, nrf_softdevice_s140 as _, panic_probe as _};

use padlink::{CodecFamily, ControllerConfig, GamepadController, LinkState, RumbleReport};

use crate::softdevice::{notification_task, Bonder, SoftdeviceStack};

/// Controller loop period (ms).
const TICK_INTERVAL_MS: u64 = 10;

const CONFIG: ControllerConfig = ControllerConfig::new();

static LINK: LinkState<CodecFamily> = LinkState::new(CodecFamily::Xbox, CONFIG, now_ms);
static BONDER: StaticCell<Bonder> = StaticCell::new();
static STACK: StaticCell<SoftdeviceStack> = StaticCell::new();

fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("padlink starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut c = embassy_nrf::config::Config::default();
    c.gpiote_interrupt_priority = interrupt::Priority::P2;
    c.time_interrupt_priority = interrupt::Priority::P2;
    let _p = embassy_nrf::init(c);

    let config = sd::Config {
        clock: Some(sd::raw::nrf_clock_lf_cfg_t {
            source: sd::raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: sd::raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(sd::raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(sd::raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gap_role_count: Some(sd::raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 1,
            _bitfield_1: sd::raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&config);
    spawner.must_spawn(softdevice_task(sd));
    spawner.must_spawn(notification_task(&LINK));

    let bonder = BONDER.init(Bonder::new());
    let stack = STACK.init(SoftdeviceStack::new(sd, &LINK, bonder));
    let mut pad = GamepadController::new(stack, &LINK);
    if let Err(e) = pad.begin().await {
        warn!("BLE stack init failed: {}", e);
    }

    let mut a_was_pressed = false;
    loop {
        pad.tick().await;

        let a = pad.gamepad().a;
        if a && !a_was_pressed {
            info!("A pressed, rumble");
            if let Err(e) = pad.send_rumble(&RumbleReport::full_power_for_1sec()).await {
                warn!("rumble rejected: {}", e);
            }
        }
        a_was_pressed = a;

        Timer::after_millis(TICK_INTERVAL_MS).await;
    }
}
