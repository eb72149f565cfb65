use std::{io::ErrorKind, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use chrono::Utc;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use relay_lights_common::{
    Availability, ClockTick, ConnectionAction, ConnectionEvent, Intent, MessageSink, RelayBank, RelayLights, RuntimeConfig, SimulatedRelayBank, Topics,
    MAX_PAYLOAD_BYTES,
};

const CLOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

type HostLights = RelayLights<LoggingRelayBank, MqttSink>;

/// Simulated relays that trace every level change, standing in for GPIO.
struct LoggingRelayBank {
    inner: SimulatedRelayBank,
}

impl RelayBank for LoggingRelayBank {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn set_output(&mut self, index: usize, on: bool) {
        self.inner.set_output(index, on);
        debug!(
            "relay {} (GPIO{}) -> {:?}",
            index + 1,
            self.inner.pin(index),
            self.inner.level(index)
        );
    }
}

struct MqttSink {
    client: AsyncClient,
    log_topic: String,
}

impl MessageSink for MqttSink {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        if topic == self.log_topic {
            info!("{payload}");
        } else {
            debug!("publish {topic} = {payload} (retain={retain})");
        }

        if let Err(err) =
            self.client
                .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
        {
            warn!("publish to {topic} failed: {err}");
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_runtime_config().await?;
    let timezone: Tz = config
        .timezone
        .parse()
        .map_err(|err| anyhow!("unknown timezone `{}`: {err}", config.timezone))?;
    let topics = Topics::new(&config.lights.topic_prefix);

    let network = &config.network;
    let mut mqtt_options =
        MqttOptions::new(&network.client_id, &network.mqtt_host, network.mqtt_port);
    mqtt_options.set_keep_alive(MQTT_KEEP_ALIVE);
    mqtt_options.set_last_will(LastWill::new(
        topics.availability(),
        Availability::Offline.as_str(),
        QoS::AtLeastOnce,
        true,
    ));
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(&network.mqtt_user, &network.mqtt_pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 64);

    let relays = LoggingRelayBank {
        inner: SimulatedRelayBank::new(config.lights.relay_pins.clone()),
    };
    let sink = MqttSink {
        client: mqtt.clone(),
        log_topic: topics.log().to_string(),
    };
    let mut lights = RelayLights::new(&config.lights, relays, sink);
    lights.on_connection_event(ConnectionEvent::Attempt);

    info!(
        "relay lights controller started: {} lights under `{}`, broker {}:{}, timezone {}",
        lights.lights().len(),
        config.lights.topic_prefix,
        network.mqtt_host,
        network.mqtt_port,
        timezone,
    );

    let mut clock = tokio::time::interval(CLOCK_POLL_INTERVAL);
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if let Some(ConnectionAction::Resync) =
                        lights.on_connection_event(ConnectionEvent::ConnAck)
                    {
                        info!("mqtt connected");
                        subscribe_topics(&mqtt, &topics);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    handle_mqtt_message(
                        &mut lights,
                        &message.topic,
                        &message.payload,
                        now_in_timezone(&timezone),
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    if let Some(ConnectionAction::RetryAfter(delay)) =
                        lights.on_connection_event(ConnectionEvent::Error)
                    {
                        warn!(
                            "mqtt connection lost ({err}); retry {} in {}ms",
                            lights.connection().failed_attempts(),
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        lights.on_connection_event(ConnectionEvent::Attempt);
                    }
                }
            },
            // Ticks keep firing during the connect attempt; `on_tick` drops
            // them until the next ConnAck.
            _ = clock.tick() => {
                let changed = lights.on_tick(now_in_timezone(&timezone));
                if changed > 0 {
                    debug!("timer reconciled {changed} lights");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

fn subscribe_topics(mqtt: &AsyncClient, topics: &Topics) {
    for topic in topics.subscriptions() {
        if let Err(err) = mqtt.try_subscribe(&topic, QoS::AtLeastOnce) {
            warn!("subscribe to {topic} failed: {err}");
        }
    }
}

fn handle_mqtt_message(
    lights: &mut HostLights,
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

    let Ok(message) = std::str::from_utf8(payload) else {
        warn!("dropping non utf8 MQTT payload on topic {topic}");
        return;
    };

    match lights.handle_message(topic, message, now) {
        Ok(Intent::Ignored) => trace!("ignoring message on {topic}"),
        Ok(intent) => debug!("handled {intent:?}"),
        Err(err) => warn!("timer command rejected: {err}"),
    }
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("RELAY_LIGHTS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./relay-lights.json"));

    let mut runtime = match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("{} not found, using defaults", path.display());
            RuntimeConfig::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
        runtime.network.mqtt_pass = std::env::var("MQTT_PASS").unwrap_or_default();
    }
    if let Ok(timezone) = std::env::var("LIGHTS_TZ") {
        runtime.timezone = timezone;
    }

    runtime.sanitize();
    runtime.validate().context("invalid runtime config")?;
    Ok(runtime)
}

fn now_in_timezone(timezone: &Tz) -> Option<ClockTick> {
    ClockTick::from_wall_clock(&Utc::now().with_timezone(timezone))
}
