//! 3D offsets, either exact (3 × f32 little-endian) or compressed to one byte per axis.
//!
//! Compressed vectors cover `[-COMPRESS_RANGE / 2, COMPRESS_RANGE / 2]` meters per axis,
//! enough for any finger joint measured from its own wrist. Resolution is
//! `COMPRESS_RANGE / 255`, roughly 1.2 mm.

use crate::error::CodecError;
use nalgebra as na;

/// Full width of the compressed range, in meters
pub const COMPRESS_RANGE: f32 = 0.3;
pub const EXACT_LEN: usize = 12;
pub const COMPRESSED_LEN: usize = 3;

pub fn encode_exact(vector: &na::Vector3<f32>) -> [u8; EXACT_LEN] {
    let mut bytes = [0; EXACT_LEN];
    for axis in 0..3 {
        bytes[axis * 4..axis * 4 + 4].copy_from_slice(&vector[axis].to_le_bytes());
    }
    bytes
}

pub fn encode_compressed(vector: &na::Vector3<f32>) -> [u8; COMPRESSED_LEN] {
    let half = COMPRESS_RANGE / 2.0;
    let mut bytes = [0; COMPRESSED_LEN];
    for axis in 0..3 {
        let clamped = vector[axis].max(-half).min(half);
        // float to int casts saturate, NaN lands on 0
        bytes[axis] = ((clamped + half) / COMPRESS_RANGE * 255.0).floor() as u8;
    }
    bytes
}

pub fn encode(vector: &na::Vector3<f32>, compressed: bool) -> Vec<u8> {
    if compressed {
        encode_compressed(vector).to_vec()
    } else {
        encode_exact(vector).to_vec()
    }
}

/// Decodes either representation, picked by buffer length
pub fn decode(bytes: &[u8]) -> Result<na::Vector3<f32>, CodecError> {
    match bytes.len() {
        COMPRESSED_LEN => {
            let half = COMPRESS_RANGE / 2.0;
            Ok(na::Vector3::from_fn(|axis, _| {
                bytes[axis] as f32 / 255.0 * COMPRESS_RANGE - half
            }))
        }
        EXACT_LEN => {
            let mut vector = na::Vector3::zeros();
            for axis in 0..3 {
                let mut raw = [0; 4];
                raw.copy_from_slice(&bytes[axis * 4..axis * 4 + 4]);
                vector[axis] = f32::from_le_bytes(raw);
            }
            Ok(vector)
        }
        len => Err(CodecError::InvalidLength { len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const STEP: f32 = COMPRESS_RANGE / 255.0;

    #[test]
    fn exact_is_lossless() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..1000 {
            let v = na::Vector3::new(
                rng.gen_range(-1000.0..1000.0),
                rng.gen_range(-1000.0..1000.0),
                rng.gen_range(-1000.0..1000.0),
            );
            assert_eq!(decode(&encode(&v, false)).unwrap(), v);
        }
        let odd = na::Vector3::new(f32::MIN_POSITIVE, -0.0, f32::MAX);
        assert_eq!(decode(&encode_exact(&odd)).unwrap(), odd);
    }

    #[test]
    fn exact_layout_is_little_endian() {
        let bytes = encode_exact(&na::Vector3::new(1.0, -2.0, 0.5));
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.0f32).to_le_bytes());
        assert_eq!(&bytes[8..12], &0.5f32.to_le_bytes());
    }

    #[test]
    fn compressed_within_one_step() {
        let mut rng = StdRng::seed_from_u64(34);
        for _ in 0..1000 {
            let v: na::Vector3<f32> = na::Vector3::new(
                rng.gen_range(-0.15..0.15),
                rng.gen_range(-0.15..0.15),
                rng.gen_range(-0.15..0.15),
            );
            let decoded = decode(&encode(&v, true)).unwrap();
            for axis in 0..3 {
                assert!(
                    (decoded[axis] - v[axis]).abs() <= STEP + 1e-6,
                    "axis {} of {:?} decoded as {}",
                    axis,
                    v,
                    decoded[axis]
                );
            }
        }
    }

    #[test]
    fn compressed_boundaries() {
        assert_eq!(encode_compressed(&na::Vector3::new(-0.15, 0.0, 0.15)), [0, 127, 255]);

        let decoded = decode(&encode_compressed(&na::Vector3::new(-0.15, 0.15, 0.0))).unwrap();
        assert!((decoded.x + 0.15).abs() < 1e-6);
        assert!((decoded.y - 0.15).abs() < 1e-6);
    }

    #[test]
    fn compressed_clamps_out_of_range() {
        let v = na::Vector3::new(-3.0, 0.2, 100.0);
        assert_eq!(encode_compressed(&v), [0, 255, 255]);
        let decoded = decode(&encode_compressed(&v)).unwrap();
        assert!((decoded.x + 0.15).abs() < 1e-6);
        assert!((decoded.y - 0.15).abs() < 1e-6);
        assert!((decoded.z - 0.15).abs() < 1e-6);
    }

    #[test]
    fn rejects_other_lengths() {
        for len in &[0, 1, 2, 4, 11, 13] {
            let bytes = vec![0; *len];
            assert_eq!(decode(&bytes), Err(CodecError::InvalidLength { len: *len }));
        }
    }
}
