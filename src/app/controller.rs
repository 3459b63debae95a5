//! Device controller: the application core.
//!
//! Owns the FSM, sensor manager, remote client and provisioning service.
//! Each [`tick`](DeviceController::tick):
//!
//! 1. Runs provisioning housekeeping and dispatches client commands.
//! 2. Writes fresh observations into the FSM blackboard.
//! 3. Advances the FSM one step.
//! 4. Carries out whatever the active state handler requested.
//!
//! All I/O goes through the port traits, so the whole lifecycle runs
//! unchanged on the host against the mock board.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::adapters::device_id::DeviceIdentity;
use crate::app::credentials::Credentials;
use crate::app::events::{AppEvent, ReadingsReport, StatusReport};
use crate::app::ports::{DevicePorts, EventSink, LoadCellPort, StoragePort};
use crate::app::remote::RemoteClient;
use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::provisioning::ProvisioningService;
use crate::sensors::SensorManager;

pub struct DeviceController<C> {
    fsm: Fsm,
    ctx: FsmContext,
    sensors: SensorManager<C>,
    client: RemoteClient,
    provisioning: ProvisioningService,
    restart_issued: bool,
}

impl<C: LoadCellPort> DeviceController<C> {
    /// Build the controller.  A persisted setup-complete flag skips
    /// provisioning and starts in CONNECTING.
    pub fn new(
        cells: C,
        config: DeviceConfig,
        identity: DeviceIdentity,
        storage: &impl StoragePort,
    ) -> Self {
        let creds = Credentials::load(storage);
        let initial = if creds.setup_complete {
            StateId::Connecting
        } else {
            StateId::Provisioning
        };

        let mut client = RemoteClient::new(&config);
        client.load_credentials(&creds);

        Self {
            fsm: Fsm::new(build_state_table(), initial),
            sensors: SensorManager::new(cells, &config),
            provisioning: ProvisioningService::new(identity, &config, creds.setup_complete),
            client,
            ctx: FsmContext::new(config),
            restart_issued: false,
        }
    }

    /// Load scale factors, detect sensors and enter the initial state.
    ///
    /// Fails when fewer than the minimum number of bins respond.
    pub fn init(
        &mut self,
        io: &mut (impl DevicePorts + DelayNs),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.sensors.load_scale_factors(&*io);
        let found = self.sensors.detect(io)?;

        self.ctx.now_ms = io.uptime_ms();
        self.ctx.inputs.setup_complete = self.provisioning.is_setup_complete();
        self.fsm.start(&mut self.ctx);

        sink.emit(&AppEvent::Started { state: self.fsm.current_state(), sensors: found });
        Ok(())
    }

    /// One iteration of the main loop.  Does nothing once a restart has
    /// been issued (the host restart returns; hardware never gets here).
    pub fn tick(&mut self, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        if self.restart_issued {
            return;
        }
        let now = io.uptime_ms();
        self.ctx.now_ms = now;

        for outcome in self.provisioning.update(now, io, &mut self.sensors) {
            sink.emit(&AppEvent::CommandHandled { command: outcome.command, ok: outcome.ok });
        }

        self.ctx.inputs.setup_complete = self.provisioning.is_setup_complete();
        self.ctx.inputs.provisioning_active = self.provisioning.is_active();
        self.ctx.inputs.network_connected = io.is_connected();

        self.ctx.requests = Default::default();
        let before = self.fsm.current_state();
        self.fsm.tick(&mut self.ctx);
        let after = self.fsm.current_state();

        if before != after {
            if before == StateId::Operating {
                self.client.reset();
            }
            sink.emit(&AppEvent::StateChanged { from: before, to: after });
        }

        self.apply_requests(now, io, sink);
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn state_entered_ms(&self) -> u64 {
        self.fsm.state_entered_ms()
    }

    pub fn is_restart_issued(&self) -> bool {
        self.restart_issued
    }

    pub fn sensors(&self) -> &SensorManager<C> {
        &self.sensors
    }

    pub fn provisioning(&self) -> &ProvisioningService {
        &self.provisioning
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    // ── Request execution ────────────────────────────────────

    fn apply_requests(&mut self, now: u64, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        let requests = self.ctx.requests;

        if requests.start_provisioning && !self.provisioning.start(now, io) {
            warn!("CTRL: provisioning service failed to start");
        }
        if requests.start_settings && !self.provisioning.start_settings(now, io) {
            warn!("CTRL: settings service failed to start");
        }
        if let Some(report) = requests.status {
            self.broadcast(&report, now, io, sink);
        }
        if requests.connect_network {
            self.connect_network(io, sink);
        }
        if requests.authenticate {
            self.authenticate(io, sink);
        }
        if requests.poll_sensors {
            self.poll_and_submit(now, io, sink);
        }
        if let Some(reason) = requests.restart {
            sink.emit(&AppEvent::RestartRequested { reason });
            self.restart_issued = true;
            io.restart();
        }
    }

    fn broadcast(
        &mut self,
        report: &StatusReport,
        now: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) {
        self.provisioning.broadcast_status(report, now, io);
        sink.emit(&AppEvent::StatusBroadcast(*report));
    }

    fn connect_network(&mut self, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::ConnectAttempt {
            attempt: self.ctx.wifi_attempts,
            max: self.ctx.config.wifi_max_retries,
        });

        let creds = Credentials::load(&*io);
        if !creds.has_wifi() {
            sink.emit(&AppEvent::ConnectFailed(Error::Config("WiFi credentials not provisioned")));
            return;
        }
        let timeout = self.ctx.config.wifi_connect_timeout_ms;
        match io.connect(&creds.wifi_ssid, &creds.wifi_password, timeout) {
            Ok(()) => info!("CTRL: WiFi associated with '{}'", creds.wifi_ssid),
            Err(e) => sink.emit(&AppEvent::ConnectFailed(e.into())),
        }
    }

    fn authenticate(&mut self, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        self.client.load_credentials(&Credentials::load(&*io));
        match self.client.authenticate(io) {
            Ok(()) => {
                self.ctx.inputs.auth_result = Some(true);
                sink.emit(&AppEvent::Authenticated);
            }
            Err(e) => {
                self.ctx.inputs.auth_result = Some(false);
                sink.emit(&AppEvent::AuthFailed(e));
            }
        }
    }

    fn poll_and_submit(&mut self, now: u64, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        self.sensors.update(now);
        let readings = self.sensors.all_readings();

        let submitted = match self.client.submit(&readings, now, io) {
            Ok(count) => {
                info!("CTRL: submitted {} readings", count);
                true
            }
            Err(e) => {
                sink.emit(&AppEvent::SubmitFailed(e));
                false
            }
        };
        sink.emit(&AppEvent::Readings(ReadingsReport { timestamp_ms: now, readings, submitted }));

        let sensors = if readings.iter().any(|r| r.valid) { "reading" } else { "error" };
        let api = if submitted { "authenticated" } else { "failed" };
        self.broadcast(&StatusReport::new("connected", api, sensors), now, io, sink);
    }
}
