//! Lossy fixed-size encodings used inside hand frames

pub mod quaternion;
pub mod vector;
