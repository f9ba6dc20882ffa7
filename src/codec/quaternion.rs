//! Smallest-three quaternion compression.
//!
//! A unit quaternion is fully described by its three smallest components once the
//! largest one is known to be non-negative. Those three always lie within
//! `[-1/√2, 1/√2]` and are quantized to 10 bits each. Together with the 2-bit index
//! of the dropped component they fill a single `u32`.
//!
//! Bit layout, most significant first:
//!
//! | bits  | field                       |
//! |-------|-----------------------------|
//! | 31-30 | index of largest component  |
//! | 29-20 | first following component   |
//! | 19-10 | second following component  |
//! | 9-0   | third following component   |
//!
//! Component indices are x = 0, y = 1, z = 2, w = 3 and the following components
//! are taken cyclically after the largest one.

use nalgebra as na;

pub const ENCODED_LEN: usize = 4;

const BITS: u32 = 10;
const MAX_INTEGER: u32 = (1 << BITS) - 1;
const MINIMUM: f32 = -std::f32::consts::FRAC_1_SQRT_2;
const MAXIMUM: f32 = std::f32::consts::FRAC_1_SQRT_2;
const DELTA: f32 = MAXIMUM - MINIMUM;

fn components(quat: &na::UnitQuaternion<f32>) -> [f32; 4] {
    let q = quat.quaternion();
    [q.i, q.j, q.k, q.w]
}

fn quantize(value: f32) -> u32 {
    let normalized = ((value - MINIMUM) / DELTA).max(0.0).min(1.0);
    ((normalized * MAX_INTEGER as f32 + 0.5).floor() as u32) & MAX_INTEGER
}

fn dequantize(value: u32) -> f32 {
    (value & MAX_INTEGER) as f32 / MAX_INTEGER as f32 * DELTA + MINIMUM
}

/// Packs a unit quaternion into 32 bits
pub fn pack(quat: &na::UnitQuaternion<f32>) -> u32 {
    let c = components(quat);

    let mut largest = 0;
    for i in 1..4 {
        if c[i].abs() > c[largest].abs() {
            largest = i;
        }
    }

    // q and -q describe the same rotation, flip so the dropped component is positive
    let sign = if c[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut packed = (largest as u32) << 30;
    for n in 1..4 {
        let value = sign * c[(largest + n) % 4];
        packed |= quantize(value) << (BITS * (3 - n as u32));
    }
    packed
}

/// Inverse of [`pack`]. Every bit pattern decodes to some rotation.
pub fn unpack(packed: u32) -> na::UnitQuaternion<f32> {
    let largest = (packed >> 30) as usize;

    let mut c = [0.0_f32; 4];
    let mut sum_squares = 0.0;
    for n in 1..4 {
        let value = dequantize(packed >> (BITS * (3 - n as u32)));
        c[(largest + n) % 4] = value;
        sum_squares += value * value;
    }
    c[largest] = (1.0 - sum_squares).max(0.0).sqrt();

    na::UnitQuaternion::new_normalize(na::Quaternion::new(c[3], c[0], c[1], c[2]))
}

pub fn encode(quat: &na::UnitQuaternion<f32>) -> [u8; ENCODED_LEN] {
    pack(quat).to_le_bytes()
}

pub fn decode(bytes: [u8; ENCODED_LEN]) -> na::UnitQuaternion<f32> {
    unpack(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const MAX_ERROR_RADIANS: f32 = 1.0 * std::f32::consts::PI / 180.0;

    fn quat(w: f32, x: f32, y: f32, z: f32) -> na::UnitQuaternion<f32> {
        na::UnitQuaternion::new_normalize(na::Quaternion::new(w, x, y, z))
    }

    fn assert_round_trip(q: &na::UnitQuaternion<f32>) {
        let decoded = decode(encode(q));
        let error = decoded.angle_to(q);
        assert!(
            error < MAX_ERROR_RADIANS,
            "{:?} decoded as {:?}, off by {} rad",
            q,
            decoded,
            error
        );
    }

    #[test]
    fn identity_round_trip() {
        let decoded = decode(encode(&na::UnitQuaternion::identity()));
        assert!(decoded.angle() < MAX_ERROR_RADIANS);
    }

    #[test]
    fn axis_aligned_round_trip() {
        for q in &[
            quat(1.0, 0.0, 0.0, 0.0),
            quat(0.0, 1.0, 0.0, 0.0),
            quat(0.0, 0.0, 1.0, 0.0),
            quat(0.0, 0.0, 0.0, 1.0),
            quat(0.0, -1.0, 0.0, 0.0),
            quat(-1.0, 0.0, 0.0, 0.0),
        ] {
            assert_round_trip(q);
        }
    }

    #[test]
    fn near_degenerate_round_trip() {
        // two or more components of equal magnitude
        for q in &[
            quat(1.0, 1.0, 0.0, 0.0),
            quat(1.0, -1.0, 0.0, 0.0),
            quat(0.5, 0.5, 0.5, 0.5),
            quat(-0.5, 0.5, -0.5, 0.5),
            quat(1.0, 1.0, 1.0, 1e-4),
            quat(0.0, 0.0, 1.0, 1.0 + 1e-6),
        ] {
            assert_round_trip(q);
        }
    }

    #[test]
    fn random_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x4841_4e44);
        let mut sampled = 0;
        while sampled < 10_000 {
            let v = na::Vector4::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            // reject outside the unit ball for an even spread of rotations
            let norm: f32 = v.norm();
            if norm < 0.1 || norm > 1.0 {
                continue;
            }
            assert_round_trip(&quat(v[3], v[0], v[1], v[2]));
            sampled += 1;
        }
    }

    #[test]
    fn sign_does_not_matter() {
        let q = quat(0.3, -0.8, 0.2, 0.4);
        let negated = na::UnitQuaternion::new_unchecked(-q.into_inner());
        assert_eq!(encode(&q), encode(&negated));
    }

    #[test]
    fn largest_index_in_top_bits() {
        assert_eq!(pack(&quat(1.0, 0.0, 0.0, 0.0)) >> 30, 3);
        assert_eq!(pack(&quat(0.0, 1.0, 0.0, 0.0)) >> 30, 0);
        assert_eq!(pack(&quat(0.0, 0.0, 1.0, 0.0)) >> 30, 1);
        assert_eq!(pack(&quat(0.0, 0.0, 0.0, 1.0)) >> 30, 2);
    }

    #[test]
    fn identity_packs_to_midpoints() {
        // zero quantizes to round(511.5) = 512 for each remaining component
        let packed = pack(&na::UnitQuaternion::identity());
        assert_eq!(packed, (3 << 30) | (512 << 20) | (512 << 10) | 512);
        assert_eq!(encode(&na::UnitQuaternion::identity()), packed.to_le_bytes());
    }

    #[test]
    fn any_bits_decode() {
        for &bits in &[0u32, u32::MAX, 0xDEAD_BEEF, 0x8000_0000] {
            let q = unpack(bits);
            assert!((q.quaternion().norm() - 1.0).abs() < 1e-5);
        }
    }
}
