use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use chrono_tz::Tz;
use embedded_svc::{
    mqtt::client::{EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyOutputPin, Level, Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, LwtConfiguration, MqttClientConfiguration},
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, trace, warn};

use relay_lights_common::{
    Availability, ClockTick, ConnectionAction, ConnectionEvent, Intent, MessageSink, PinLevel,
    RelayBank, RelayLights, RuntimeConfig, Topics, MAX_PAYLOAD_BYTES,
};

const CLOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type EspLights = RelayLights<GpioRelayBank, EspMqttSink>;

/// Messages forwarded from the MQTT connection thread to the control loop.
enum Inbound {
    Connection(ConnectionEvent),
    Message { topic: String, payload: Vec<u8> },
}

struct GpioRelayBank {
    pins: Vec<(i32, PinDriver<'static, AnyOutputPin, Output>)>,
}

impl GpioRelayBank {
    /// Claims every relay pin and releases its relay straight away. A freshly
    /// claimed output sits low, which would energise an active-low relay.
    fn new(pins: &[i32]) -> anyhow::Result<Self> {
        let mut drivers = Vec::with_capacity(pins.len());
        for &pin in pins {
            let mut driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }
                .with_context(|| format!("failed to claim relay GPIO{pin}"))?;
            driver
                .set_level(gpio_level(PinLevel::RELEASED))
                .with_context(|| format!("failed to release relay GPIO{pin}"))?;
            drivers.push((pin, driver));
        }
        Ok(Self { pins: drivers })
    }
}

fn gpio_level(level: PinLevel) -> Level {
    match level {
        PinLevel::Low => Level::Low,
        PinLevel::High => Level::High,
    }
}

impl RelayBank for GpioRelayBank {
    fn len(&self) -> usize {
        self.pins.len()
    }

    fn set_output(&mut self, index: usize, on: bool) {
        let (pin, driver) = &mut self.pins[index];
        if let Err(err) = driver.set_level(gpio_level(PinLevel::for_power(on))) {
            warn!("failed to drive relay GPIO{pin}: {err}");
        }
    }
}

struct EspMqttSink {
    client: EspMqttClient<'static>,
    log_topic: String,
}

impl EspMqttSink {
    fn subscribe(&mut self, topics: &Topics) {
        for topic in topics.subscriptions() {
            if let Err(err) = self.client.subscribe(&topic, QoS::AtLeastOnce) {
                warn!("subscribe to {topic} failed: {err:?}");
            }
        }
    }
}

impl MessageSink for EspMqttSink {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        if topic == self.log_topic {
            info!("{payload}");
        }

        if let Err(err) =
            self.client
                .enqueue(topic, QoS::AtLeastOnce, retain, payload.as_bytes())
        {
            warn!("publish to {topic} failed: {err:?}");
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let config = build_runtime_config()?;
    let timezone: Tz = config
        .timezone
        .parse()
        .map_err(|err| anyhow!("unknown timezone `{}`: {err}", config.timezone))?;
    let topics = Topics::new(&config.lights.topic_prefix);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    // Relays are OFF before anything touches the network.
    let relays = GpioRelayBank::new(&config.lights.relay_pins)?;

    let _wifi = connect_wifi(modem, sys_loop, nvs_partition, &config)
        .context("wifi startup failed")?;

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    let (client, conn) = create_mqtt_client(&config, &topics)?;
    let sink = EspMqttSink {
        client,
        log_topic: topics.log().to_string(),
    };
    let mut lights = RelayLights::new(&config.lights, relays, sink);

    let (tx, rx) = mpsc::channel();
    spawn_mqtt_receiver(conn, tx)?;

    info!(
        "relay lights controller started: {} lights under `{}`",
        lights.lights().len(),
        config.lights.topic_prefix
    );

    run_control_loop(&mut lights, &topics, &rx, &timezone);
    Ok(())
}

fn build_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let mut runtime = RuntimeConfig::default();
    if let Some(ssid) = option_env!("WIFI_SSID") {
        runtime.network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("WIFI_PASS") {
        runtime.network.wifi_pass = pass.to_string();
    }
    if let Some(host) = option_env!("MQTT_HOST") {
        runtime.network.mqtt_host = host.to_string();
    }
    if let Some(timezone) = option_env!("LIGHTS_TZ") {
        runtime.timezone = timezone.to_string();
    }

    runtime.sanitize();
    runtime.validate().context("invalid runtime config")?;
    Ok(runtime)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    config: &RuntimeConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let network = &config.network;
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
                return Ok(wifi);
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt} failed: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }
}

fn create_mqtt_client(
    config: &RuntimeConfig,
    topics: &Topics,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let network = &config.network;
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some(network.client_id.as_str()),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        lwt: Some(LwtConfiguration {
            topic: topics.availability(),
            payload: Availability::Offline.as_str().as_bytes(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }),
        reconnect_timeout: Some(Duration::from_millis(config.lights.reconnect_delay_ms)),
        ..Default::default()
    };

    Ok(EspMqttClient::new(url.as_str(), &conf)?)
}

fn spawn_mqtt_receiver(mut conn: EspMqttConnection, tx: Sender<Inbound>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            let inbound = match conn.next() {
                Ok(event) => match event.payload() {
                    EventPayload::BeforeConnect => {
                        Some(Inbound::Connection(ConnectionEvent::Attempt))
                    }
                    EventPayload::Connected(_) => {
                        Some(Inbound::Connection(ConnectionEvent::ConnAck))
                    }
                    EventPayload::Disconnected => {
                        Some(Inbound::Connection(ConnectionEvent::Error))
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        ..
                    } => Some(Inbound::Message {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    }),
                    _ => None,
                },
                Err(err) => {
                    warn!("mqtt receive loop error: {err:?}");
                    return;
                }
            };

            if let Some(inbound) = inbound {
                if tx.send(inbound).is_err() {
                    return;
                }
            }
        })
        .context("failed to spawn mqtt receiver thread")?;
    Ok(())
}

fn run_control_loop(
    lights: &mut EspLights,
    topics: &Topics,
    rx: &Receiver<Inbound>,
    timezone: &Tz,
) {
    loop {
        match rx.recv_timeout(CLOCK_POLL_INTERVAL) {
            Ok(Inbound::Connection(event)) => match lights.on_connection_event(event) {
                Some(ConnectionAction::Resync) => {
                    info!("mqtt connected");
                    lights.lights_mut().publisher_mut().sink_mut().subscribe(topics);
                }
                Some(ConnectionAction::RetryAfter(delay)) => {
                    // The client reconnects on its own. Ticks and commands
                    // stay dropped until it reports Connected again.
                    warn!(
                        "mqtt disconnected; retry {} in {}ms",
                        lights.connection().failed_attempts(),
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                None => {}
            },
            Ok(Inbound::Message { topic, payload }) => {
                handle_mqtt_message(lights, &topic, &payload, now_in_timezone(timezone));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("mqtt receiver stopped; restarting device");
                thread::sleep(Duration::from_millis(100));
                unsafe { esp_idf_svc::sys::esp_restart() };
            }
        }

        let changed = lights.on_tick(now_in_timezone(timezone));
        if changed > 0 {
            debug!("timer reconciled {changed} lights");
        }
    }
}

fn handle_mqtt_message(
    lights: &mut EspLights,
    topic: &str,
    payload: &[u8],
    now: Option<ClockTick>,
) {
    if payload.len() > MAX_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return;
    }

    let Ok(message) = core::str::from_utf8(payload) else {
        warn!("dropping non utf8 MQTT payload on topic {topic}");
        return;
    };

    match lights.handle_message(topic, message, now) {
        Ok(Intent::Ignored) => trace!("ignoring message on {topic}"),
        Ok(intent) => debug!("handled {intent:?}"),
        Err(err) => warn!("timer command rejected: {err}"),
    }
}

/// `None` until SNTP has set the RTC for the first time; every poll after
/// that reads the clock.
fn now_in_timezone(timezone: &Tz) -> Option<ClockTick> {
    ClockTick::from_wall_clock(&Utc::now().with_timezone(timezone))
}
