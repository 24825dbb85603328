//! Application-facing controller handle.

use crate::ble::connection::ConnectionManager;
use crate::ble::state::{ConnectionState, LinkState};
use crate::ble::{Address, BleStack};
use crate::codec::output::RumbleReport;
use crate::codec::ReportCodec;
use crate::config::{ControllerConfig, MAX_VALUE_LEN};
use crate::error::Error;
use crate::gamepad::GamepadState;

/// One BLE game controller.
///
/// `tick` drives the connection from the application loop; the host
/// stack feeds the shared [`LinkState`] from its own context.
///
/// ```ignore
/// static LINK: LinkState<CodecFamily> =
///     LinkState::new(CodecFamily::Xbox, ControllerConfig::new(), now_ms);
///
/// let mut pad = GamepadController::new(&stack, &LINK);
/// pad.begin().await?;
/// loop {
///     pad.tick().await;
///     if pad.gamepad().a {
///         pad.send_rumble(&RumbleReport::full_power_for_1sec()).await?;
///     }
/// }
/// ```
pub struct GamepadController<'a, S, C> {
    manager: ConnectionManager<'a, S, C>,
}

impl<'a, S: BleStack, C: ReportCodec> GamepadController<'a, S, C> {
    /// Settings come from `link`, see [`LinkState::new`].
    pub fn new(stack: &'a S, link: &'a LinkState<C>) -> Self {
        Self {
            manager: ConnectionManager::new(stack, link),
        }
    }

    /// Bring the stack up and publish the codec's neutral state.
    pub async fn begin(&mut self) -> Result<(), S::Error> {
        self.link().request_clear();
        self.manager.stack().begin().await?;
        info!("controller ready, scanning");
        Ok(())
    }

    pub async fn tick(&mut self) {
        self.manager.tick().await;
    }

    /// Write a raw output frame.  Silently does nothing without a
    /// connection.
    pub async fn send_report(&self, frame: &[u8]) {
        match self.manager.write_output(frame).await {
            Ok(()) | Err(Error::NoActiveConnection) => {}
            Err(e) => warn!("output report dropped: {}", e),
        }
    }

    pub async fn send_rumble(&self, report: &RumbleReport) -> Result<(), Error> {
        let frame = report.to_frame()?;
        self.send_report(&frame).await;
        Ok(())
    }

    /// Encode `state` in the controller's own layout and send it.
    pub async fn send_state(&self, state: &GamepadState) -> Result<(), Error> {
        let mut buf = [0u8; MAX_VALUE_LEN];
        let len = self.link().codec().encode(state, &mut buf)?;
        self.send_report(&buf[..len]).await;
        Ok(())
    }

    // Accessors

    pub fn gamepad(&self) -> GamepadState {
        self.link().gamepad()
    }

    /// Back to the neutral state, e.g. after the application consumed a
    /// press.  Holds until the next report decodes.
    pub fn clear_gamepad(&self) {
        self.link().request_clear();
    }

    pub fn battery(&self) -> u8 {
        self.link().battery()
    }

    pub fn failed_connections(&self) -> u8 {
        self.link().failed_connections()
    }

    pub fn peer_address(&self) -> Option<Address> {
        self.link().peer_address()
    }

    pub fn state(&self) -> ConnectionState {
        self.link().state()
    }

    /// A link is up, including before its first notification.
    pub fn is_connected(&self) -> bool {
        self.state().is_linked()
    }

    pub fn is_waiting_for_first_notification(&self) -> bool {
        self.state() == ConnectionState::WaitingForFirstNotification
    }

    pub fn notification_count(&self) -> u32 {
        self.link().notification_count()
    }

    pub fn decode_error_count(&self) -> u32 {
        self.link().decode_error_count()
    }

    pub fn last_notification_ms(&self) -> u32 {
        self.link().last_notification_ms()
    }

    pub fn last_error(&self) -> Option<Error> {
        self.link().last_error()
    }

    pub fn config(&self) -> &'a ControllerConfig {
        self.manager.config()
    }

    fn link(&self) -> &'a LinkState<C> {
        self.manager.link()
    }
}
