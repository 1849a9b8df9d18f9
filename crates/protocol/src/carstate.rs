//! Vehicle-state (`0x12`) payload decoding.
//!
//! A payload is a 16-bit simulation time, a 12-bit flag field and then one of
//! two bit-packed profiles chosen by the ground flag. Every field is a
//! [`QuantizedFloat`] with fixed constants taken from the game client; they
//! are wire contracts and must not be tidied up.

use crate::bitstream::{BitCursor, BitWriter, EscapeBit, QuantizedFloat};
use crate::ProtocolError;
use glam::{DQuat, DVec3};

/// Width of the flag field following the simulation time.
pub const FLAG_BITS: u32 = 12;
/// Ground flag inside the flag field (stream bit 20, `byte[2] >> 3 & 1`).
pub const GROUND_FLAG: u16 = 1 << 7;
/// Bytes needed to hold the time + flag header.
pub const HEADER_BYTES: usize = 4;

mod fields {
    use super::QuantizedFloat;

    // Shared angle encodings (air profile, legacy ground orientation).
    pub const YAW: QuantizedFloat = QuantizedFloat::new(9, 0xE0, 0.5, 0.007853982, -3.1415927);
    pub const PITCH: QuantizedFloat = QuantizedFloat::new(8, 0x70, 0.5, 0.007853982, -1.5707964);
    pub const ROLL: QuantizedFloat = YAW;
    pub const ANG_VEL: QuantizedFloat = QuantizedFloat::new(8, 0xD3, 0.5, 0.12524623, -18.849556);

    // Ground
    pub const GROUND_POS_Y: QuantizedFloat = QuantizedFloat::new(17, 62144, 0.5, 0.039999999, -5000.0);
    pub const GROUND_POS_Z: QuantizedFloat = QuantizedFloat::new(11, 96, 0.5, 0.12774999, -112.0);
    pub const GROUND_POS_X: QuantizedFloat = QuantizedFloat::new(17, 62144, 0.5, 0.059999999, 0.0);
    pub const GROUND_LIN_VEL_XY: QuantizedFloat =
        QuantizedFloat::new(14, 0x31E0, 0.5, 0.016666668, -166.66667);
    pub const GROUND_LIN_VEL_Z: QuantizedFloat =
        QuantizedFloat::new(10, 0x350, 0.5, 0.1388889, -83.333336);
    pub const QUAT_XY: QuantizedFloat = QuantizedFloat::new(8, 1, 0.5, 0.0039138943, -1.0);
    pub const QUAT_ZW: QuantizedFloat = QuantizedFloat::new(9, 0xE0, 0.5, 0.0024999999, -1.0);
    pub const WHEEL: QuantizedFloat = QuantizedFloat::new(6, 0x1B, 0.5, 0.021980198, -1.11);
    pub const LIGHT_FLAG_BITS: u32 = 13;

    // Air
    pub const AIR_POS_XY: QuantizedFloat = QuantizedFloat::new(17, 62144, 0.5, 0.15000001, -15000.0);
    pub const AIR_POS_Z: QuantizedFloat = QuantizedFloat::new(11, 96, 0.5, 0.639999999, -512.0);
    pub const AIR_LIN_VEL: QuantizedFloat = QuantizedFloat::new(9, 0x7B, 0.5, 0.30829942, -138.8889);
}

/// How grounded vehicles encode their orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationEncoding {
    /// Older clients: yaw/pitch/roll angles.
    Angles,
    /// Newer clients: X/Y/Z/W quaternion.
    #[default]
    Quaternion,
}

/// Decoder settings that vary between client revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    pub orientation: OrientationEncoding,
    pub escape: EscapeBit,
}

/// Position and velocities in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub position: DVec3,
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
}

/// Yaw/pitch/roll in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    Angles(Angles),
    Quaternion(DQuat),
}

/// A vehicle with its wheels on the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundState {
    pub kinematics: Kinematics,
    pub orientation: Orientation,
    pub front_wheel_angle: f64,
    pub rear_wheel_angle: f64,
    pub light_flags: u16,
}

/// An airborne vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirState {
    pub kinematics: Kinematics,
    pub angles: Angles,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    Ground(GroundState),
    Air(AirState),
}

/// A decoded vehicle-state payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub sim_time: u16,
    /// The full flag field; only [`GROUND_FLAG`] is interpreted.
    pub flags: u16,
    pub profile: Profile,
}

impl VehicleState {
    /// Decode a vehicle-state payload.
    ///
    /// Only a payload too short for the header is rejected; a truncated body
    /// decodes best-effort through clamped reads.
    pub fn decode(data: &[u8], options: DecodeOptions) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_BYTES {
            return Err(ProtocolError::ShortVehicleState(data.len()));
        }

        let mut cursor = BitCursor::new(data);
        let sim_time = cursor.read_bits(16) as u16;
        let flags = cursor.read_bits(FLAG_BITS) as u16;

        let mut reader = FieldReader {
            cursor,
            escape: options.escape,
        };
        let profile = if flags & GROUND_FLAG != 0 {
            Profile::Ground(reader.ground(options.orientation))
        } else {
            Profile::Air(reader.air())
        };

        Ok(Self {
            sim_time,
            flags,
            profile,
        })
    }

    /// Encode back into the wire layout.
    ///
    /// The ground flag is forced to match the profile. Quantization loses
    /// precision, so `decode(encode(s))` is only close to `s`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(16, self.sim_time as u32);

        let flags = match self.profile {
            Profile::Ground(_) => self.flags | GROUND_FLAG,
            Profile::Air(_) => self.flags & !GROUND_FLAG,
        };
        w.write_bits(FLAG_BITS, flags as u32);

        match &self.profile {
            Profile::Ground(g) => encode_ground(&mut w, g),
            Profile::Air(a) => encode_air(&mut w, a),
        }
        w.into_bytes()
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self.profile, Profile::Ground(_))
    }

    pub fn kinematics(&self) -> &Kinematics {
        match &self.profile {
            Profile::Ground(g) => &g.kinematics,
            Profile::Air(a) => &a.kinematics,
        }
    }

    pub fn position(&self) -> DVec3 {
        self.kinematics().position
    }

    pub fn linear_velocity(&self) -> DVec3 {
        self.kinematics().linear_velocity
    }

    pub fn angular_velocity(&self) -> DVec3 {
        self.kinematics().angular_velocity
    }

    /// Heading shown to spectators, in degrees.
    ///
    /// For quaternion orientation this is the negated Euler roll; otherwise
    /// the yaw.
    pub fn rotation_degrees(&self) -> f64 {
        match &self.profile {
            Profile::Ground(GroundState {
                orientation: Orientation::Quaternion(q),
                ..
            }) => -quaternion_roll(*q).to_degrees(),
            Profile::Ground(GroundState {
                orientation: Orientation::Angles(angles),
                ..
            }) => angles.yaw.to_degrees(),
            Profile::Air(a) => a.angles.yaw.to_degrees(),
        }
    }
}

/// Rotation about the X axis of a (not necessarily normalized) quaternion.
pub fn quaternion_roll(q: DQuat) -> f64 {
    let sin_roll = 2.0 * (q.w * q.x + q.y * q.z);
    let cos_roll = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
    sin_roll.atan2(cos_roll)
}

struct FieldReader<'a> {
    cursor: BitCursor<'a>,
    escape: EscapeBit,
}

impl FieldReader<'_> {
    #[inline]
    fn read(&mut self, field: QuantizedFloat) -> f64 {
        field.decode(&mut self.cursor, self.escape)
    }

    fn angles(&mut self) -> Angles {
        let yaw = self.read(fields::YAW);
        let pitch = self.read(fields::PITCH);
        let roll = self.read(fields::ROLL);
        Angles { yaw, pitch, roll }
    }

    fn ground(&mut self, encoding: OrientationEncoding) -> GroundState {
        use fields::*;

        let pos_y = -self.read(GROUND_POS_Y);
        let pos_z = self.read(GROUND_POS_Z);
        let pos_x = self.read(GROUND_POS_X);

        let lin_y = -self.read(GROUND_LIN_VEL_XY);
        let lin_z = self.read(GROUND_LIN_VEL_Z);
        let lin_x = self.read(GROUND_LIN_VEL_XY);

        let orientation = match encoding {
            OrientationEncoding::Angles => Orientation::Angles(self.angles()),
            OrientationEncoding::Quaternion => {
                let y = self.read(QUAT_XY);
                let z = self.read(QUAT_ZW);
                let x = self.read(QUAT_XY);
                let w = self.read(QUAT_ZW);
                Orientation::Quaternion(DQuat::from_xyzw(x, y, z, w))
            }
        };

        let ang_y = -self.read(ANG_VEL);
        let ang_z = self.read(ANG_VEL);
        let ang_x = self.read(ANG_VEL);

        let front_wheel_angle = self.read(WHEEL);
        let rear_wheel_angle = self.read(WHEEL);
        let light_flags = self.cursor.read_bits(LIGHT_FLAG_BITS) as u16;

        GroundState {
            kinematics: Kinematics {
                position: DVec3::new(pos_x, pos_y, pos_z),
                linear_velocity: DVec3::new(lin_x, lin_y, lin_z),
                angular_velocity: DVec3::new(ang_x, ang_y, ang_z),
            },
            orientation,
            front_wheel_angle,
            rear_wheel_angle,
            light_flags,
        }
    }

    fn air(&mut self) -> AirState {
        use fields::*;

        let angles = self.angles();

        let pos_y = -self.read(AIR_POS_XY);
        let pos_z = self.read(AIR_POS_Z);
        let pos_x = self.read(AIR_POS_XY);

        let lin_y = -self.read(AIR_LIN_VEL);
        let lin_z = self.read(AIR_LIN_VEL);
        let lin_x = self.read(AIR_LIN_VEL);

        let ang_y = -self.read(ANG_VEL);
        let ang_z = -self.read(ANG_VEL);
        let ang_x = self.read(ANG_VEL);

        AirState {
            kinematics: Kinematics {
                position: DVec3::new(pos_x, pos_y, pos_z),
                linear_velocity: DVec3::new(lin_x, lin_y, lin_z),
                angular_velocity: DVec3::new(ang_x, ang_y, ang_z),
            },
            angles,
        }
    }
}

fn encode_angles(w: &mut BitWriter, angles: &Angles) {
    fields::YAW.encode(w, angles.yaw);
    fields::PITCH.encode(w, angles.pitch);
    fields::ROLL.encode(w, angles.roll);
}

fn encode_ground(w: &mut BitWriter, g: &GroundState) {
    use fields::*;
    let k = &g.kinematics;

    GROUND_POS_Y.encode(w, -k.position.y);
    GROUND_POS_Z.encode(w, k.position.z);
    GROUND_POS_X.encode(w, k.position.x);

    GROUND_LIN_VEL_XY.encode(w, -k.linear_velocity.y);
    GROUND_LIN_VEL_Z.encode(w, k.linear_velocity.z);
    GROUND_LIN_VEL_XY.encode(w, k.linear_velocity.x);

    match &g.orientation {
        Orientation::Angles(angles) => encode_angles(w, angles),
        Orientation::Quaternion(q) => {
            QUAT_XY.encode(w, q.y);
            QUAT_ZW.encode(w, q.z);
            QUAT_XY.encode(w, q.x);
            QUAT_ZW.encode(w, q.w);
        }
    }

    ANG_VEL.encode(w, -k.angular_velocity.y);
    ANG_VEL.encode(w, k.angular_velocity.z);
    ANG_VEL.encode(w, k.angular_velocity.x);

    WHEEL.encode(w, g.front_wheel_angle);
    WHEEL.encode(w, g.rear_wheel_angle);
    w.write_bits(LIGHT_FLAG_BITS, g.light_flags as u32);
}

fn encode_air(w: &mut BitWriter, a: &AirState) {
    use fields::*;
    let k = &a.kinematics;

    encode_angles(w, &a.angles);

    AIR_POS_XY.encode(w, -k.position.y);
    AIR_POS_Z.encode(w, k.position.z);
    AIR_POS_XY.encode(w, k.position.x);

    AIR_LIN_VEL.encode(w, -k.linear_velocity.y);
    AIR_LIN_VEL.encode(w, k.linear_velocity.z);
    AIR_LIN_VEL.encode(w, k.linear_velocity.x);

    ANG_VEL.encode(w, -k.angular_velocity.y);
    ANG_VEL.encode(w, -k.angular_velocity.z);
    ANG_VEL.encode(w, k.angular_velocity.x);
}
