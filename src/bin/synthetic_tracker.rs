use anyhow::{anyhow, Result};
use hand_sync::data::{ControllerMessage, HandMessage, PoseMessage};
use hand_sync::hand::{Chirality, HandData, Pose};
use hand_sync::input::ControllerInput;
use hand_sync::tick::FixedTicker;
use log::*;
use nalgebra as na;
use rumqtt::{MqttClient, MqttOptions, QoS, ReconnectOptions};
use simplelog::{Config, LevelFilter, SimpleLogger, TermLogger, TerminalMode};
use std::time::Instant;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "synthetic_tracker",
    about = "Publishes animated hands on the tracking topic for testing without hardware"
)]
struct Opt {
    #[structopt(long, default_value = "mqtt.local")]
    host: String,

    #[structopt(short, long, default_value = "1883")]
    port: u16,

    #[structopt(short, long, default_value = "tracking/hand")]
    topic: String,

    /// Publish raw controller states instead of skeletons
    #[structopt(long)]
    controllers: bool,

    #[structopt(long, default_value = "tracking/controller")]
    controller_topic: String,

    /// Messages per second for each hand
    #[structopt(long, default_value = "50")]
    rate: f32,

    /// Seconds for one full close and open of the hands
    #[structopt(long, default_value = "2")]
    grab_period: f32,

    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn wrist_pose(chirality: Chirality, time: f32) -> Pose {
    let side = match chirality {
        Chirality::Left => -1.0,
        Chirality::Right => 1.0,
    };
    let sway = (time * 0.5).sin() * 0.05;
    let position = na::Vector3::new(side * 0.2 + sway, 1.2, 0.35);
    // palms facing each other, fingers pointing away from the viewer
    let rotation = na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), side * -1.57);
    Pose::new(position, rotation)
}

fn main() -> Result<()> {
    let args = Opt::from_args();
    if TermLogger::init(args.log_level, Config::default(), TerminalMode::Mixed).is_err() {
        let _ = SimpleLogger::init(args.log_level, Config::default());
    }
    if !(args.rate > 0.0) || !(args.grab_period > 0.0) {
        return Err(anyhow!("rate and grab period must be positive"));
    }

    let mqtt_options =
        MqttOptions::new("hand_sync_synthetic_tracker", args.host.as_str(), args.port)
            .set_reconnect_opts(ReconnectOptions::Always(5));
    let (mut mqtt_client, _notifications) = MqttClient::start(mqtt_options)
        .map_err(|e| anyhow!("Failed to connect to MQTT host: {:?}", e))?;
    info!("Connected to MQTT");

    let mut input = ControllerInput::new(hand_sync::input::DEFAULT_CONTROLLER_PINCH_THRESHOLD);
    let mut ticker = FixedTicker::new(args.rate);
    let start = Instant::now();

    loop {
        let time = start.elapsed().as_secs_f32();
        let phase = time / args.grab_period * std::f32::consts::PI * 2.0;
        let grab = 0.5 - 0.5 * phase.cos();

        input.left.update(Some(wrist_pose(Chirality::Left, time)), grab);
        input.right.update(Some(wrist_pose(Chirality::Right, time)), grab);

        for hand in &[&input.left, &input.right] {
            let (topic, payload) = if args.controllers {
                let message = ControllerMessage {
                    chirality: hand.chirality(),
                    tracked: hand.is_valid(),
                    pose: PoseMessage::from(&hand.wrist()),
                    grab: hand.grab(),
                };
                (&args.controller_topic, message.to_json()?)
            } else {
                (&args.topic, HandMessage::from_hand(*hand).to_json()?)
            };
            if let Err(e) = mqtt_client.publish(topic.clone(), QoS::AtMostOnce, false, payload) {
                warn!("Failed to publish tracking message: {:?}", e);
            }
        }
        trace!("published hands with grab {:.2}", grab);

        ticker.wait();
    }
}
