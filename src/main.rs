use anyhow::{anyhow, Result};
use hand_sync::config::HandSyncConfig;
use hand_sync::input::{ControllerInput, InputSelector, TrackingInput};
use hand_sync::mqtt_channel::MqttChannel;
use hand_sync::session::{HandEvent, HandSync};
use hand_sync::tick::FixedTicker;
use hand_sync::transport::PeerId;
use log::*;
use rumqtt::{MqttClient, MqttOptions, Notification, QoS, ReconnectOptions};
use simplelog::{Config, LevelFilter, SimpleLogger, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "hand_sync",
    about = "Shares locally tracked hands with the other peers of a session"
)]
struct Opt {
    /// JSON config file
    #[structopt(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured peer id
    #[structopt(long)]
    peer_id: Option<String>,

    /// MQTT broker host
    #[structopt(long)]
    host: Option<String>,

    /// MQTT broker port
    #[structopt(short, long)]
    port: Option<u16>,

    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn setup_logging(level: LevelFilter) {
    if TermLogger::init(level, Config::default(), TerminalMode::Mixed).is_err() {
        // no terminal attached
        let _ = SimpleLogger::init(level, Config::default());
    }
}

fn load_config(args: &Opt) -> Result<HandSyncConfig> {
    let mut config = match &args.config {
        Some(path) => HandSyncConfig::load(path)?,
        None => HandSyncConfig::default(),
    };
    if let Some(peer_id) = &args.peer_id {
        config.peer_id = PeerId(peer_id.clone());
    }
    if let Some(host) = &args.host {
        config.mqtt_host = host.clone();
    }
    if let Some(port) = args.port {
        config.mqtt_port = port;
    }
    Ok(config)
}

fn subscribe(input: Arc<Mutex<InputSelector>>, config: &HandSyncConfig) -> Result<()> {
    let mqtt_options = MqttOptions::new(
        format!("hand_sync_tracking_{}", config.peer_id),
        config.mqtt_host.as_str(),
        config.mqtt_port,
    )
    .set_reconnect_opts(ReconnectOptions::Always(5));
    let (mut mqtt_client, notifications) = MqttClient::start(mqtt_options)
        .map_err(|e| anyhow!("Failed to connect to MQTT host: {:?}", e))?;
    info!("Connected to MQTT for tracking");

    let tracking = config.tracking_topic.clone();
    let controllers = config.controller_topic.clone();
    for topic_name in &[&tracking, &controllers] {
        mqtt_client
            .subscribe(topic_name.to_string(), QoS::AtMostOnce)
            .map_err(|e| anyhow!("Failed to subscribe to topic {}: {:?}", topic_name, e))?;
        trace!("Subscribing to {}", topic_name);
    }

    std::thread::spawn(move || {
        // keeps the connection alive for as long as the thread runs
        let _mqtt_client = mqtt_client;
        for notification in notifications {
            if let Notification::Publish(message) = notification {
                if message.topic_name != tracking && message.topic_name != controllers {
                    continue;
                }
                let mut input = match input.lock() {
                    Ok(input) => input,
                    Err(_) => {
                        error!("tracking input lock poisoned");
                        return;
                    }
                };
                let result = if message.topic_name == tracking {
                    input.tracking.apply_message(&message.payload)
                } else {
                    input.controllers.apply_message(&message.payload)
                };
                if let Err(error) = result {
                    warn!("bad message on {}: {}", message.topic_name, error);
                }
            }
        }
        warn!("tracking subscription ended");
    });
    Ok(())
}

fn main() -> Result<()> {
    let args = Opt::from_args();
    setup_logging(args.log_level);
    let config = load_config(&args)?;
    info!("Starting peer {}", config.peer_id);

    let input = Arc::new(Mutex::new(InputSelector::new(
        TrackingInput::new(config.pinch_distance),
        ControllerInput::new(config.controller_pinch_threshold),
    )));
    subscribe(input.clone(), &config)?;

    let channel = MqttChannel::connect(
        config.peer_id.clone(),
        &config.mqtt_host,
        config.mqtt_port,
        &config.frame_topic_prefix,
        config.max_buffered_frames,
    )?;
    let mut sync = HandSync::from_config(channel, &config);
    let mut ticker = FixedTicker::new(config.tick_hz);
    let mut input_type = None;

    loop {
        {
            let input = input
                .lock()
                .map_err(|_| anyhow!("tracking input lock poisoned"))?;
            if input.input_type() != input_type {
                input_type = input.input_type();
                info!("Input switched to {:?}", input_type);
            }
            sync.tick(&*input);
        }

        for event in sync.drain_events() {
            match event {
                HandEvent::Joined(key) => info!("{} joined", key),
                HandEvent::Shown(key) => info!("{} is visible", key),
                HandEvent::Hidden(key) => info!("{} is hidden", key),
                HandEvent::Dropped { key, attempts } => {
                    debug!("no usable frame from {} after {} attempts", key, attempts)
                }
                HandEvent::Left(key) => info!("{} left", key),
                HandEvent::Pinched(chirality) => debug!("{} hand pinched", chirality),
            }
        }

        let skipped = ticker.wait();
        if skipped > 0 {
            debug!("tick overran, skipped {} deadlines", skipped);
        }
    }
}
