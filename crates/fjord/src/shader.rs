//! Shader programs.
//!
//! [`ShaderProgram`] is the one generic program type. Each pass describes its
//! program with a [`ProgramSource`] (WGSL text, attribute slots, uniform
//! block, texture units) and keeps its own uniform-loading functions next to
//! the pass. Uniform locations are resolved once at compile time and looked
//! up by name afterwards.

use std::collections::HashMap;

use crate::error::Result;
use crate::gpu::{ProgramHandle, ProgramSource, RenderDevice, UniformLocation, UniformValue};
use crate::math::{Mat4, Vec3};
use crate::scene::{Light, MAX_LIGHTS};

/// A compiled program plus its resolved uniform locations.
#[derive(Debug)]
pub struct ShaderProgram {
    handle: ProgramHandle,
    name: &'static str,
    locations: HashMap<&'static str, UniformLocation>,
}

impl ShaderProgram {
    /// Compile `source`, bind its attribute slots and resolve every declared
    /// uniform.
    pub fn compile(device: &mut dyn RenderDevice, source: &ProgramSource) -> Result<Self> {
        let handle = device.create_program(source)?;
        let mut program = Self {
            handle,
            name: source.name,
            locations: HashMap::with_capacity(source.uniforms.len()),
        };
        for (slot, name) in source.attributes {
            program.bind_attribute(device, *slot, name);
        }
        for (name, _) in source.uniforms {
            match device.uniform_location(handle, name) {
                Some(location) => {
                    program.locations.insert(name, location);
                }
                None => log::warn!("program '{}' has no uniform '{name}'", source.name),
            }
        }
        log::info!("Compiled program '{}'", source.name);
        Ok(program)
    }

    pub fn bind_attribute(&self, device: &mut dyn RenderDevice, slot: u32, name: &str) {
        device.bind_attribute(self.handle, slot, name);
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&self, device: &mut dyn RenderDevice) {
        device.use_program(Some(self.handle));
    }

    pub fn stop(&self, device: &mut dyn RenderDevice) {
        device.use_program(None);
    }

    /// Set a uniform by name. Unknown names are ignored.
    pub fn set(&self, device: &mut dyn RenderDevice, name: &str, value: impl Into<UniformValue>) {
        match self.locations.get(name) {
            Some(location) => device.set_uniform(*location, value.into()),
            None => log::debug!("program '{}': no uniform '{name}'", self.name),
        }
    }

    pub fn set_flag(&self, device: &mut dyn RenderDevice, name: &str, value: bool) {
        self.set(device, name, UniformValue::flag(value));
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        device.delete_program(self.handle);
    }
}

pub(crate) const LIGHT_POSITION: [&str; MAX_LIGHTS] = [
    "light_position0",
    "light_position1",
    "light_position2",
    "light_position3",
];
pub(crate) const LIGHT_COLOUR: [&str; MAX_LIGHTS] = [
    "light_colour0",
    "light_colour1",
    "light_colour2",
    "light_colour3",
];
pub(crate) const ATTENUATION: [&str; MAX_LIGHTS] = [
    "attenuation0",
    "attenuation1",
    "attenuation2",
    "attenuation3",
];

/// Upload up to [`MAX_LIGHTS`] lights, filling unused slots with
/// [`Light::UNUSED`]. With `eye_space`, positions are moved into view space
/// first.
pub(crate) fn load_lights(
    program: &ShaderProgram,
    device: &mut dyn RenderDevice,
    lights: &[Light],
    eye_space: Option<Mat4>,
) {
    for i in 0..MAX_LIGHTS {
        let light = lights.get(i).copied().unwrap_or(Light::UNUSED);
        let position: Vec3 = match eye_space {
            Some(view) if i < lights.len() => view.transform_point3(light.position),
            _ => light.position,
        };
        program.set(device, LIGHT_POSITION[i], position);
        program.set(device, LIGHT_COLOUR[i], light.colour);
        program.set(device, ATTENUATION[i], light.attenuation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;
    use crate::gpu::UniformKind;

    const LIT: ProgramSource = ProgramSource {
        name: "lit",
        wgsl: "// lit",
        attributes: &[(0, "position")],
        uniforms: &[
            ("light_position0", UniformKind::Vec3),
            ("light_colour0", UniformKind::Vec3),
            ("attenuation0", UniformKind::Vec3),
            ("light_position1", UniformKind::Vec3),
            ("light_colour1", UniformKind::Vec3),
            ("attenuation1", UniformKind::Vec3),
        ],
        textures: &[],
    };

    const FOUR_LIGHTS: ProgramSource = ProgramSource {
        name: "four_lights",
        wgsl: "// four lights",
        attributes: &[(0, "position")],
        uniforms: &[
            ("light_position0", UniformKind::Vec3),
            ("light_colour0", UniformKind::Vec3),
            ("attenuation0", UniformKind::Vec3),
            ("light_position1", UniformKind::Vec3),
            ("light_colour1", UniformKind::Vec3),
            ("attenuation1", UniformKind::Vec3),
            ("light_position2", UniformKind::Vec3),
            ("light_colour2", UniformKind::Vec3),
            ("attenuation2", UniformKind::Vec3),
            ("light_position3", UniformKind::Vec3),
            ("light_colour3", UniformKind::Vec3),
            ("attenuation3", UniformKind::Vec3),
        ],
        textures: &[],
    };

    #[test]
    fn lights_beyond_the_fourth_are_ignored() {
        let mut device = RecordingDevice::new(640, 480);
        let program = ShaderProgram::compile(&mut device, &FOUR_LIGHTS).unwrap();
        let lights: Vec<Light> = (1..=5)
            .map(|i| Light::new(Vec3::splat(i as f32 * 10.0), Vec3::splat(i as f32)))
            .collect();
        load_lights(&program, &mut device, &lights, None);

        let h = program.handle();
        assert_eq!(device.uniform(h, "light_colour3"), Some(UniformValue::Vec3(Vec3::splat(4.0))));
        assert_eq!(
            device.uniform(h, "light_position3"),
            Some(UniformValue::Vec3(Vec3::splat(40.0)))
        );
        for slot in 0..MAX_LIGHTS {
            assert_ne!(
                device.uniform(h, LIGHT_COLOUR[slot]),
                Some(UniformValue::Vec3(Vec3::splat(5.0))),
                "slot {slot}"
            );
        }
    }

    #[test]
    fn unused_light_slots_are_zeroed() {
        let mut device = RecordingDevice::new(640, 480);
        let program = ShaderProgram::compile(&mut device, &LIT).unwrap();
        let sun = Light::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE);
        load_lights(&program, &mut device, &[sun], None);

        let h = program.handle();
        assert_eq!(device.uniform(h, "light_colour0"), Some(UniformValue::Vec3(Vec3::ONE)));
        assert_eq!(device.uniform(h, "light_colour1"), Some(UniformValue::Vec3(Vec3::ZERO)));
        assert_eq!(
            device.uniform(h, "attenuation1"),
            Some(UniformValue::Vec3(Vec3::new(1.0, 0.0, 0.0)))
        );
    }

    #[test]
    fn eye_space_lights_are_transformed() {
        let mut device = RecordingDevice::new(640, 480);
        let program = ShaderProgram::compile(&mut device, &LIT).unwrap();
        let sun = Light::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ONE);
        let view = Mat4::from_translation(Vec3::new(0.0, -5.0, 0.0));
        load_lights(&program, &mut device, &[sun], Some(view));
        assert_eq!(
            device.uniform(program.handle(), "light_position0"),
            Some(UniformValue::Vec3(Vec3::new(1.0, -5.0, 0.0)))
        );
    }
}
