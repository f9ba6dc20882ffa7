pub mod avatar;
pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod frame;
pub mod hand;
pub mod input;
pub mod mqtt_channel;
pub mod reconstruction;
pub mod session;
pub mod tick;
pub mod transport;
