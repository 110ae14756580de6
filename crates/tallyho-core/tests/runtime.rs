//! Runtime loop driven end to end through a scripted platform.
//!
//! Time is simulated: the delay and the scripted transport advance a shared
//! clock, so ping deadlines and backoffs run instantly.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::rc::Rc;

use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_hal::delay::DelayNs;

use tallyho_core::boot::BOOT_SUCCEEDED;
use tallyho_core::config::{ConfigStore, MemoryStorage, ServerAddress, WifiCredentials, keys};
use tallyho_core::display::IndicatorLayout;
use tallyho_core::error::FatalError;
use tallyho_core::identity::MacAddress;
use tallyho_core::net::{Connection, Connector, LinkError, NetworkLink, SessionState, TransportError};
use tallyho_core::platform::{Clock, Peripherals, Platform, Severity, StatusLed, TallyDisplay, Watchdog};
use tallyho_core::runtime::TallyRuntime;
use tallyho_core::tally::{CameraNumber, SwitcherState, TallyIndication};

const DEVICE_MAC: MacAddress = MacAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 7);

// =============================================================================
// Simulated time
// =============================================================================

type SimTime = Rc<Cell<u64>>;

fn advance(time: &SimTime, nanos: u64) {
    time.set(time.get() + nanos);
}

struct SimClock(SimTime);

impl Clock for SimClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.0.get() / 1_000)
    }
}

struct SimDelay(SimTime);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        advance(&self.0, u64::from(ns));
    }
}

// =============================================================================
// Scripted transport
// =============================================================================

enum Step {
    Data(&'static str),
    NoData,
    Fail(TransportError),
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    time: SimTime,
}

impl Connection for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Data(text)) => {
                buf[..text.len()].copy_from_slice(text.as_bytes());
                Ok(text.len())
            }
            Some(Step::Fail(e)) => Err(e),
            Some(Step::NoData) | None => {
                // A real socket blocks for the read timeout
                advance(&self.time, 200_000_000);
                Err(TransportError::NoData)
            }
        }
    }
}

struct ScriptedConnector {
    connections: VecDeque<Vec<Step>>,
    connects: Rc<Cell<usize>>,
    time: SimTime,
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn connect(
        &mut self,
        _server: &ServerAddress,
        read_timeout: Duration,
    ) -> Result<ScriptedConnection, TransportError> {
        assert_eq!(read_timeout, Duration::from_millis(200));
        self.connects.set(self.connects.get() + 1);
        match self.connections.pop_front() {
            Some(steps) => Ok(ScriptedConnection {
                steps: steps.into(),
                time: self.time.clone(),
            }),
            None => Err(TransportError::Refused),
        }
    }
}

// =============================================================================
// Recording peripherals
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Layout(IndicatorLayout),
    State(TallyIndication, Option<CameraNumber>),
    Notice(String, Severity),
    ClearNotice,
    Identity(MacAddress, Option<Ipv4Addr>),
    Backlight(u8),
}

type Events = Rc<RefCell<Vec<Event>>>;

struct RecordingDisplay(Events);

impl TallyDisplay for RecordingDisplay {
    type Error = Infallible;

    fn set_layout(&mut self, layout: IndicatorLayout) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(Event::Layout(layout));
        Ok(())
    }

    fn set_state(
        &mut self,
        indication: TallyIndication,
        camera: Option<CameraNumber>,
    ) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(Event::State(indication, camera));
        Ok(())
    }

    fn show_notice(&mut self, message: &str, severity: Severity) -> Result<(), Self::Error> {
        self.0
            .borrow_mut()
            .push(Event::Notice(message.to_string(), severity));
        Ok(())
    }

    fn clear_notice(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(Event::ClearNotice);
        Ok(())
    }

    fn show_identity(&mut self, mac: MacAddress, ip: Option<Ipv4Addr>) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(Event::Identity(mac, ip));
        Ok(())
    }

    fn set_backlight(&mut self, pct: u8) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(Event::Backlight(pct));
        Ok(())
    }
}

struct RecordingLed(Rc<RefCell<Vec<Option<Rgb888>>>>);

impl StatusLed for RecordingLed {
    fn set_color(&mut self, color: Option<Rgb888>) {
        self.0.borrow_mut().push(color);
    }
}

struct CountingWatchdog(Rc<Cell<usize>>);

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

struct SimLink {
    up: Rc<Cell<bool>>,
    join_succeeds: bool,
    joins: Rc<Cell<usize>>,
    /// Polls a join stays pending before the link comes up.
    join_polls: Rc<Cell<usize>>,
    joining: bool,
}

impl NetworkLink for SimLink {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError> {
        assert_eq!(credentials.ssid, "Studio");
        self.joins.set(self.joins.get() + 1);
        self.joining = self.join_succeeds;
        Ok(())
    }

    fn is_up(&mut self) -> bool {
        if self.joining {
            match self.join_polls.get() {
                0 => {
                    self.joining = false;
                    self.up.set(true);
                }
                n => self.join_polls.set(n - 1),
            }
        }
        self.up.get()
    }

    fn mac_address(&self) -> MacAddress {
        DEVICE_MAC
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.up.get().then_some(DEVICE_IP)
    }
}

struct SimPlatform;

impl Platform for SimPlatform {
    type Storage = MemoryStorage;
    type Connector = ScriptedConnector;
    type Link = SimLink;
    type Display = RecordingDisplay;
    type Led = RecordingLed;
    type Watchdog = CountingWatchdog;
    type Clock = SimClock;
    type Delay = SimDelay;
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    time: SimTime,
    events: Events,
    leds: Rc<RefCell<Vec<Option<Rgb888>>>>,
    feeds: Rc<Cell<usize>>,
    connects: Rc<Cell<usize>>,
    link_up: Rc<Cell<bool>>,
    joins: Rc<Cell<usize>>,
    join_polls: Rc<Cell<usize>>,
}

impl Harness {
    fn notices(&self, text: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Notice(m, _) if m == text))
            .count()
    }

    fn last_state(&self) -> Option<Event> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find(|e| matches!(e, Event::State(..)))
            .cloned()
    }

    fn elapsed(&self) -> Duration {
        Duration::from_micros(self.time.get() / 1_000)
    }
}

fn storage(camera: Option<&str>) -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    storage.insert_raw(keys::WIFI, "Studio,secret");
    if let Some(camera) = camera {
        storage.insert_raw(keys::CAMERA, camera);
    }
    storage
}

fn start(
    storage: MemoryStorage,
    connections: Vec<Vec<Step>>,
    join_succeeds: bool,
) -> (Harness, Result<TallyRuntime<SimPlatform>, FatalError>) {
    let harness = Harness {
        time: Rc::new(Cell::new(0)),
        events: Rc::default(),
        leds: Rc::default(),
        feeds: Rc::default(),
        connects: Rc::default(),
        link_up: Rc::default(),
        joins: Rc::default(),
        join_polls: Rc::default(),
    };

    let connector = ScriptedConnector {
        connections: connections.into(),
        connects: harness.connects.clone(),
        time: harness.time.clone(),
    };
    let io = Peripherals::<SimPlatform> {
        link: SimLink {
            up: harness.link_up.clone(),
            join_succeeds,
            joins: harness.joins.clone(),
            join_polls: harness.join_polls.clone(),
            joining: false,
        },
        display: RecordingDisplay(harness.events.clone()),
        led: RecordingLed(harness.leds.clone()),
        watchdog: CountingWatchdog(harness.feeds.clone()),
        clock: SimClock(harness.time.clone()),
        delay: SimDelay(harness.time.clone()),
    };

    let runtime = TallyRuntime::setup(ConfigStore::new(storage), connector, io);
    (harness, runtime)
}

fn running(camera: Option<&str>, connections: Vec<Vec<Step>>) -> (Harness, TallyRuntime<SimPlatform>) {
    let (harness, runtime) = start(storage(camera), connections, true);
    (harness, runtime.expect("setup failed"))
}

// =============================================================================
// Setup
// =============================================================================

#[test]
fn test_setup_shows_link_and_waits_for_data() {
    let (h, runtime) = running(Some("2"), vec![]);

    assert_eq!(h.notices("WIFI Connecting...\nSSID:Studio"), 1);
    assert_eq!(h.notices("WIFI Connected!\n10.0.0.7"), 1);
    assert_eq!(h.notices("Waiting for data..."), 1);
    assert_eq!(h.events.borrow()[0], Event::Layout(IndicatorLayout::Ring));
    assert!(h.events.borrow().contains(&Event::Backlight(100)));
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Standby, Some(2))));
    assert_eq!(runtime.context().tally.assignment(), Some(2));
    assert_eq!(runtime.session().state(), SessionState::Disconnected);
}

#[test]
fn test_first_run_assigns_default_camera() {
    let (h, runtime) = running(None, vec![]);

    assert_eq!(h.notices("No camera assigned\nUsing camera 1"), 1);
    assert_eq!(runtime.context().tally.assignment(), Some(1));
    assert_eq!(runtime.context().config.storage().raw(keys::CAMERA), Some("1"));
    // Link notice and camera notice are each held on screen
    assert!(h.elapsed() >= Duration::from_secs(4));
}

#[test]
fn test_square_board_uses_bar_layout() {
    let mut storage = storage(Some("1"));
    storage.insert_raw(keys::MODEL, "square");
    storage.insert_raw(keys::BACKLIGHT, "140");
    let (h, runtime) = start(storage, vec![], true);
    assert!(runtime.is_ok());
    assert_eq!(h.events.borrow()[0], Event::Layout(IndicatorLayout::Bar));
    assert!(h.events.borrow().contains(&Event::Backlight(100)));
}

#[test]
fn test_missing_wifi_details_is_fatal() {
    let (h, runtime) = start(MemoryStorage::new(), vec![], true);

    assert_eq!(runtime.err(), Some(FatalError::Link(LinkError::NoCredentials)));
    assert_eq!(h.notices("No WiFi Details!"), 1);
    assert!(h.elapsed() >= Duration::from_secs(20));
    // Fed at least once per second while holding off
    assert!(h.feeds.get() >= 20);
    assert_eq!(h.joins.get(), 0);
}

#[test]
fn test_invalid_wifi_details_is_fatal() {
    let mut storage = MemoryStorage::new();
    storage.insert_raw(keys::WIFI, "no-comma-here");
    let (h, runtime) = start(storage, vec![], true);

    assert_eq!(
        runtime.err(),
        Some(FatalError::Link(LinkError::InvalidCredentials))
    );
    assert_eq!(h.notices("Invalid WiFi Details!"), 1);
}

#[test]
fn test_link_that_never_comes_up_times_out() {
    let (h, runtime) = start(storage(Some("1")), vec![], false);

    assert_eq!(runtime.err(), Some(FatalError::Link(LinkError::Timeout)));
    assert!(h.elapsed() >= Duration::from_secs(30));
}

// =============================================================================
// Loop
// =============================================================================

#[test]
fn test_connect_clears_notice() {
    let (h, mut runtime) = running(Some("2"), vec![vec![Step::NoData]]);

    runtime.iterate().unwrap();
    assert_eq!(h.connects.get(), 1);
    assert_eq!(runtime.session().state(), SessionState::Connected);
    assert_eq!(h.events.borrow().last(), Some(&Event::ClearNotice));
}

#[test]
fn test_live_and_preview_updates() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![
            Step::Data("{\"CAM_LIVE\":2,\"CAM_PREV\":3}\n"),
            Step::Data("{\"CAM_LIVE\":3,\"CAM_PREV\":2}\n"),
            Step::Data("{\"CAM_LIVE\":4,\"CAM_PREV\":5}\n"),
        ]],
    );

    runtime.iterate().unwrap();
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Live, Some(2))));
    assert_eq!(h.leds.borrow().last(), Some(&Some(Rgb888::new(0xFF, 0, 0))));

    runtime.iterate().unwrap();
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Preview, Some(2))));
    assert_eq!(h.leds.borrow().last(), Some(&Some(Rgb888::new(0, 0x77, 0))));

    runtime.iterate().unwrap();
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Standby, Some(2))));
    assert_eq!(h.leds.borrow().last(), Some(&None));
}

#[test]
fn test_message_for_other_device_is_ignored() {
    let (_h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::Data("{\"MAC\":\"AA:BB:CC:DD:EE:FF\",\"SET_CAM\":3}\n")]],
    );

    runtime.iterate().unwrap();
    assert_eq!(runtime.context().tally.assignment(), Some(2));
    assert_eq!(runtime.context().config.storage().raw(keys::CAMERA), Some("2"));
}

#[test]
fn test_set_cam_for_this_device() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::Data("{\"MAC\":\"11:22:33:44:55:66\",\"SET_CAM\":7}\n")]],
    );

    runtime.iterate().unwrap();
    assert_eq!(runtime.context().tally.assignment(), Some(7));
    assert_eq!(runtime.context().config.storage().raw(keys::CAMERA), Some("7"));
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Standby, Some(7))));
}

#[test]
fn test_read_timeout_keeps_session() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::NoData, Step::NoData, Step::NoData]],
    );

    for _ in 0..3 {
        runtime.iterate().unwrap();
    }
    assert_eq!(h.connects.get(), 1);
    assert_eq!(runtime.session().state(), SessionState::Connected);
}

#[test]
fn test_transport_error_reconnects_after_backoff() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::Fail(TransportError::Reset)], vec![Step::NoData]],
    );

    let started = h.elapsed();
    runtime.iterate().unwrap();
    assert_eq!(runtime.session().state(), SessionState::Disconnected);
    assert_eq!(h.notices("connection reset"), 1);
    assert!(h.elapsed() - started >= Duration::from_secs(1));

    runtime.iterate().unwrap();
    assert_eq!(h.connects.get(), 2);
    assert_eq!(runtime.session().state(), SessionState::Connected);
}

#[test]
fn test_peer_close_reconnects() {
    let (h, mut runtime) = running(Some("2"), vec![vec![Step::Data("")], vec![]]);

    runtime.iterate().unwrap();
    assert_eq!(h.notices("connection closed by server"), 1);
    runtime.iterate().unwrap();
    assert_eq!(h.connects.get(), 2);
}

#[test]
fn test_missing_ping_expires_exactly_once() {
    let (h, mut runtime) = running(Some("2"), vec![vec![]]);

    // Each empty read takes 200 ms, so the deadline passes after ~50 reads.
    // Later reconnect attempts are refused.
    for _ in 0..70 {
        runtime.iterate().unwrap();
    }
    assert_eq!(h.notices("Ping exceeded"), 1);
    assert!(h.connects.get() >= 2);
    assert_ne!(runtime.session().state(), SessionState::Connected);
    assert_eq!(runtime.session().ping_deadline(), None);
}

#[test]
fn test_pings_keep_session_alive() {
    let mut steps = Vec::new();
    for _ in 0..30 {
        steps.extend([Step::NoData, Step::NoData, Step::NoData, Step::NoData]);
        steps.push(Step::Data("{\"PING\":true}\n"));
    }
    let (h, mut runtime) = running(Some("2"), vec![steps]);

    for _ in 0..150 {
        runtime.iterate().unwrap();
    }
    assert!(h.elapsed() > Duration::from_secs(20));
    assert_eq!(h.notices("Ping exceeded"), 0);
    assert_eq!(h.connects.get(), 1);
    assert_eq!(runtime.session().state(), SessionState::Connected);
}

#[test]
fn test_malformed_lines_change_nothing() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![
            Step::Data("{\"CAM_LIVE\":1,\"CAM_PREV\":2}\n"),
            Step::Data("{\"CAM_LIVE\":2,\"CAM_\n"),
            Step::Data("{\"CAM_LIVE\":\"2\"}\n"),
            Step::Data("[2,3]\n"),
        ]],
    );

    for _ in 0..4 {
        runtime.iterate().unwrap();
    }
    assert_eq!(
        runtime.context().tally.switcher(),
        SwitcherState { live: 1, preview: 2 }
    );
    assert_eq!(runtime.context().tally.assignment(), Some(2));
    assert_eq!(runtime.session().state(), SessionState::Connected);
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Preview, Some(2))));
}

#[test]
fn test_message_split_across_reads() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::Data("{\"CAM_LIVE\""), Step::Data(":2}\n")]],
    );

    runtime.iterate().unwrap();
    assert_eq!(runtime.context().tally.switcher(), SwitcherState::default());
    runtime.iterate().unwrap();
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Live, Some(2))));
}

#[test]
fn test_backlight_is_applied_and_persisted() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::Data("{\"BACKLIGHT_PCT\":55}\n")]],
    );

    runtime.iterate().unwrap();
    assert_eq!(h.events.borrow().last(), Some(&Event::Backlight(55)));
    assert_eq!(runtime.context().config.storage().raw(keys::BACKLIGHT), Some("55"));
}

#[test]
fn test_identify_feeds_watchdog_while_showing() {
    let (h, mut runtime) = running(Some("2"), vec![vec![Step::Data("{\"IDENTIFY\":null}\n")]]);

    let feeds = h.feeds.get();
    let started = h.elapsed();
    runtime.iterate().unwrap();

    assert!(
        h.events
            .borrow()
            .contains(&Event::Identity(DEVICE_MAC, Some(DEVICE_IP)))
    );
    assert!(h.elapsed() - started >= Duration::from_secs(4));
    assert!(h.feeds.get() - feeds >= 4);
    assert_eq!(h.last_state(), Some(Event::State(TallyIndication::Standby, Some(2))));
}

#[test]
fn test_boot_success_recorded_after_first_iteration() {
    let mut storage = storage(Some("2"));
    storage.insert_raw(keys::BOOT_COUNTER, "2");
    let (_h, runtime) = start(storage, vec![vec![Step::NoData]], true);
    let mut runtime = runtime.unwrap();

    assert_eq!(runtime.context().config.storage().raw(keys::BOOT_COUNTER), Some("2"));
    runtime.iterate().unwrap();
    let expected = BOOT_SUCCEEDED.to_string();
    assert_eq!(
        runtime.context().config.storage().raw(keys::BOOT_COUNTER),
        Some(expected.as_str())
    );
    assert!(runtime.context().boot_success.is_recorded());
}

#[test]
fn test_link_drop_triggers_rejoin() {
    let (h, mut runtime) = running(Some("2"), vec![vec![Step::NoData], vec![Step::NoData]]);

    runtime.iterate().unwrap();
    assert_eq!(h.joins.get(), 1);

    h.link_up.set(false);
    runtime.iterate().unwrap();
    assert_eq!(h.joins.get(), 2);
    assert_eq!(h.connects.get(), 2);
    assert_eq!(runtime.session().state(), SessionState::Connected);
}

#[test]
fn test_slow_rejoin_gives_new_connection_a_full_ping_period() {
    let (h, mut runtime) = running(
        Some("2"),
        vec![vec![Step::NoData], vec![Step::NoData, Step::NoData]],
    );
    runtime.iterate().unwrap();

    // About 12 s of polling before the link is back, longer than a ping period
    h.join_polls.set(121);
    h.link_up.set(false);
    let started = h.elapsed();
    runtime.iterate().unwrap();
    assert!(h.elapsed() - started > Duration::from_secs(10));
    assert_eq!(h.connects.get(), 2);
    assert_eq!(runtime.session().state(), SessionState::Connected);

    runtime.iterate().unwrap();
    assert_eq!(h.notices("Ping exceeded"), 0);
    assert_eq!(runtime.session().state(), SessionState::Connected);
}

#[test]
fn test_refused_reconnects_do_not_report_ping_exceeded() {
    let (h, mut runtime) = running(Some("2"), vec![vec![Step::Fail(TransportError::Reset)]]);

    // Every reconnect is refused and backs off for 1 s, well past the old deadline
    for _ in 0..15 {
        runtime.iterate().unwrap();
    }
    assert!(h.elapsed() > Duration::from_secs(14));
    assert_eq!(h.notices("connection reset"), 1);
    assert_eq!(h.notices("connection refused"), 14);
    assert_eq!(h.notices("Ping exceeded"), 0);
    assert_eq!(runtime.session().state(), SessionState::Disconnected);
}
