//! Postest - decode a captured vehicle-state payload and print it.
//!
//! Usage: `postest [hex] [angles|quaternion] [peek|consume]`

use anyhow::{Context, bail};
use protocol::{DecodeOptions, EscapeBit, OrientationEncoding, Profile, VehicleState};

/// An airborne capture, used when no payload is given.
const SAMPLE: &str = "2ea6900e626f45cbfa27a97e6e570f4b932b2d2b3668187f";

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        bail!("not a hex digit: {:?}", bad);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("bad hex at offset {}", i))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let payload = parse_hex(&args.next().unwrap_or_else(|| SAMPLE.to_string()))?;

    let mut options = DecodeOptions::default();
    for arg in args {
        match arg.as_str() {
            "angles" => options.orientation = OrientationEncoding::Angles,
            "quaternion" => options.orientation = OrientationEncoding::Quaternion,
            "peek" => options.escape = EscapeBit::Peek,
            "consume" => options.escape = EscapeBit::Consume,
            other => bail!("unknown option {:?}", other),
        }
    }

    let state = VehicleState::decode(&payload, options)?;
    let pos = state.position();
    let vel = state.linear_velocity();
    let spin = state.angular_velocity();

    println!("bytes:    {}", payload.len());
    println!("time:     {}", state.sim_time);
    println!("flags:    {:#05x}", state.flags);
    println!("grounded: {}", state.is_grounded());
    println!("position: {:.3} {:.3} {:.3}", pos.x, pos.y, pos.z);
    println!("velocity: {:.3} {:.3} {:.3}", vel.x, vel.y, vel.z);
    println!("angular:  {:.3} {:.3} {:.3}", spin.x, spin.y, spin.z);
    println!("rotation: {:.3} deg", state.rotation_degrees());
    if let Profile::Ground(ground) = &state.profile {
        println!(
            "wheels:   {:.3} {:.3}",
            ground.front_wheel_angle, ground.rear_wheel_angle
        );
        println!("lights:   {:#06x}", ground.light_flags);
    }
    Ok(())
}
