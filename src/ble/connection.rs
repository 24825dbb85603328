//! Connection state machine: scan, connect with bounded retries, set up
//! the GATT subscriptions and recover from drops.
//!
//! [`ConnectionManager::tick`] performs at most one transition category
//! per call so the application loop stays responsive:
//!
//! | state                          | tick                                         |
//! |--------------------------------|----------------------------------------------|
//! | `Scanning`                     | consume a matched candidate, or (re)start a scan |
//! | `Found`                        | connect with retries                         |
//! | `Connecting` / `Waiting…`      | post-connect setup, once                     |
//! | linked                         | drop to `Scanning` if the stack lost the link |

use heapless::Vec;

use crate::ble::state::{ConnectionState, LinkState};
use crate::ble::{AdvertisedCandidate, BleStack, ConnHandle, RemoteCharacteristic};
use crate::codec::ReportCodec;
use crate::config::{
    ControllerConfig, BATTERY_LEVEL_CHAR_UUID, BATTERY_SERVICE_UUID, HID_SERVICE_UUID,
    KNOWN_SERVICES, MAX_VALUE_LEN,
};
use crate::error::Error;

pub struct ConnectionManager<'a, S, C> {
    stack: &'a S,
    link: &'a LinkState<C>,
    found: Option<AdvertisedCandidate>,
    setup_pending: bool,
}

impl<'a, S: BleStack, C: ReportCodec> ConnectionManager<'a, S, C> {
    pub fn new(stack: &'a S, link: &'a LinkState<C>) -> Self {
        Self {
            stack,
            link,
            found: None,
            setup_pending: false,
        }
    }

    pub fn stack(&self) -> &'a S {
        self.stack
    }

    pub fn link(&self) -> &'a LinkState<C> {
        self.link
    }

    /// Settings live on the link so the matcher and the retry loop agree.
    pub fn config(&self) -> &'a ControllerConfig {
        self.link.config()
    }

    /// Advance the state machine by one step.
    ///
    /// Failures are recorded on the link (`last_error`, failed counter)
    /// and never surface here.
    pub async fn tick(&mut self) {
        let result = match self.link.state() {
            ConnectionState::Scanning => {
                self.setup_pending = false;
                self.scan_step().await
            }
            ConnectionState::Found => self.connect_step().await,
            ConnectionState::Connecting | ConnectionState::WaitingForFirstNotification
                if self.setup_pending =>
            {
                self.setup_step().await
            }
            ConnectionState::Connecting
            | ConnectionState::WaitingForFirstNotification
            | ConnectionState::Connected => {
                self.check_link();
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("tick failed: {}", e);
            self.link.record_error(e);
        }
    }

    fn take_candidate(&mut self) -> bool {
        match self.link.take_candidate() {
            Some(candidate) => {
                info!("candidate {} found", candidate.address);
                self.found = Some(candidate);
                self.link.set_state(ConnectionState::Found);
                true
            }
            None => false,
        }
    }

    async fn scan_step(&mut self) -> Result<(), Error> {
        if self.take_candidate() || self.stack.is_scanning() {
            return Ok(());
        }
        let duration = self.config().scan_duration_secs;
        debug!("starting scan ({} s)", duration);
        if self
            .stack
            .start_scan(duration)
            .await
            .is_err()
        {
            warn!("scan could not be started");
        }
        Ok(())
    }

    async fn connect_step(&mut self) -> Result<(), Error> {
        let Some(candidate) = self.found.take() else {
            self.link.set_state(ConnectionState::Scanning);
            return Ok(());
        };
        let address = candidate.address;

        self.stack.stop_scan();
        self.link.set_state(ConnectionState::Connecting);

        let conn = match self.stack.find_connection(&address) {
            Some(conn) => conn,
            None => {
                if self.stack.connection_count() >= self.stack.max_connections() {
                    self.link.set_state(ConnectionState::Scanning);
                    return Err(Error::TooManyConnections);
                }
                match self.stack.create_connection(&address) {
                    Ok(conn) => conn,
                    Err(_) => return Err(self.give_up(&candidate).await),
                }
            }
        };

        let config = self.config();
        let attempts = config.connect_attempts.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                self.stack.delay_ms(config.retry_interval_ms).await;
            }
            if self.link.state() != ConnectionState::Connecting
                && self.link.state() != ConnectionState::WaitingForFirstNotification
            {
                // Reset by a disconnect while we were waiting.
                return Ok(());
            }
            debug!("connect attempt {}/{}", attempt + 1, attempts);
            if self.stack.connect(conn, true).await {
                info!("connected to {}", address);
                self.link.set_active(Some(conn));
                self.link.set_peer(address);
                self.link.clear_failed_connections();
                self.setup_pending = true;
                return Ok(());
            }
        }

        Err(self.give_up(&candidate).await)
    }

    /// Retry budget exhausted: forget the bond so the next attempt pairs
    /// from scratch, and go back to scanning.
    async fn give_up(&self, candidate: &AdvertisedCandidate) -> Error {
        if self.stack.delete_bond(&candidate.address).await.is_err() {
            warn!("could not delete bond for {}", candidate.address);
        }
        let failed = self.link.record_failed_connection();
        warn!("giving up on {} ({} failed)", candidate.address, failed);
        self.link.set_active(None);
        self.link.set_state(ConnectionState::Scanning);
        Error::ConnectFailure
    }

    async fn setup_step(&mut self) -> Result<(), Error> {
        self.setup_pending = false;
        let Some(conn) = self.link.active_handle() else {
            self.link.set_state(ConnectionState::Scanning);
            return Ok(());
        };

        match self.setup(conn).await {
            Ok(output) => {
                self.link.set_output(output);
                info!("setup complete");
                Ok(())
            }
            Err(e) => {
                if self.stack.disconnect(conn).await.is_err() {
                    warn!("disconnect after failed setup failed");
                }
                self.link.on_disconnect();
                Err(e)
            }
        }
    }

    /// Discover, read and subscribe.  Returns the characteristic used for
    /// output reports.
    async fn setup(&self, conn: ConnHandle) -> Result<Option<RemoteCharacteristic>, Error> {
        let services = self
            .stack
            .discover_services(conn, &KNOWN_SERVICES)
            .await
            .map_err(|_| Error::SetupFailed)?;

        if !services.iter().any(|s| s.uuid == HID_SERVICE_UUID) {
            warn!("peer has no HID service");
            return Err(Error::SetupFailed);
        }

        let mut output = None;
        for service in services.iter() {
            for characteristic in service.characteristics.iter() {
                if characteristic.props.read {
                    let value = self.read_nonempty(conn, characteristic).await?;
                    if service.uuid == BATTERY_SERVICE_UUID
                        && characteristic.uuid == BATTERY_LEVEL_CHAR_UUID
                    {
                        if let Some(&level) = value.first() {
                            self.link.set_battery(level);
                        }
                    }
                }
                if characteristic.props.can_notify() {
                    self.stack
                        .subscribe(conn, characteristic)
                        .await
                        .map_err(|_| Error::SetupFailed)?;
                }
                if service.uuid == HID_SERVICE_UUID
                    && output.is_none()
                    && characteristic.props.can_write()
                {
                    output = Some(*characteristic);
                }
            }
        }
        Ok(output)
    }

    /// Some controllers answer the first read with an empty value.
    async fn read_nonempty(
        &self,
        conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<Vec<u8, MAX_VALUE_LEN>, Error> {
        let value = self
            .stack
            .read(conn, characteristic)
            .await
            .map_err(|_| Error::SetupFailed)?;
        if !value.is_empty() {
            return Ok(value);
        }
        self.stack
            .read(conn, characteristic)
            .await
            .map_err(|_| Error::SetupFailed)
    }

    /// A linked state whose connection the stack no longer reports is a
    /// missed disconnect.
    fn check_link(&self) {
        let alive = self
            .link
            .active_handle()
            .map_or(false, |conn| self.stack.is_connected(conn));
        if !alive {
            self.link.on_disconnect();
        }
    }

    /// Fire-and-forget write to the output characteristic.
    pub async fn write_output(&self, frame: &[u8]) -> Result<(), Error> {
        if !self.link.state().is_linked() {
            return Err(Error::NoActiveConnection);
        }
        let (Some(conn), Some(characteristic)) =
            (self.link.active_handle(), self.link.output_characteristic())
        else {
            return Err(Error::NoActiveConnection);
        };
        if self
            .stack
            .write(conn, &characteristic, frame, false)
            .await
            .is_err()
        {
            debug!("output write failed");
        }
        Ok(())
    }
}
