//! A lake in rolling hills: terrain, crates, a normal-mapped pillar, water,
//! a smoke emitter, a GUI badge and a line of text. Every texture is
//! generated at startup, so the example needs no asset files.
//!
//! WASD moves, holding the left mouse button and dragging looks around,
//! the wheel changes speed. `P` pauses the particles.
//!
//! ```sh
//! RUST_LOG=info cargo run --example water_scene
//! # then, in another terminal:
//! cargo run -p fjord-telemetry
//! ```

use std::f32::consts::TAU;
use std::rc::Rc;

use fjord::prelude::*;
use fjord::terrain::{SIZE as TERRAIN_SIZE, VERTEX_COUNT};

const WATER_HEIGHT: f32 = 0.0;
const LAKE: Vec2 = Vec2::new(750.0, 750.0);

struct WaterScene {
    renderer: MasterRenderer,
    camera: Camera,
    speed: f32,
    lights: Vec<Light>,
    terrain: Terrain,
    crates: Vec<Entity>,
    pillars: Vec<Entity>,
    water: Vec<WaterTile>,
    guis: Vec<GuiTexture>,
    smoke: ParticleSystem,
    paused: bool,
}

impl WaterScene {
    fn new(ctx: &mut FrameContext<'_>) -> Result<Self> {
        let device = &mut *ctx.device;
        let registry = &mut *ctx.registry;

        let textures = SceneTextures {
            day_sky: sky_cube(registry, device, "day sky", [0.45, 0.65, 0.95], [0.85, 0.9, 1.0]),
            night_sky: sky_cube(registry, device, "night sky", [0.02, 0.02, 0.08], [0.1, 0.1, 0.2]),
            water_dudv: texture(registry, device, "dudv", 128, Filter::Linear, dudv_pixel),
            water_normal: texture(registry, device, "water normal", 128, Filter::Linear, ripple_normal_pixel),
        };

        let mut texts = TextRegistry::new();
        let font = FontType::new(texture(registry, device, "font", 64, Filter::Linear, disc_distance_pixel));
        let banner = GuiText::new("fjord", 1.0, font, Vec2::new(0.02, 0.02))
            .with_colour(Vec3::new(1.0, 0.9, 0.6))
            .with_outline(0.6, 0.1, Vec3::new(0.1, 0.1, 0.1));
        texts.load_text(banner, &banner_mesh(), registry, device);

        let mut renderer = MasterRenderer::new(
            device,
            registry,
            ctx.config.clone(),
            textures,
            ParticleRegistry::new(),
            texts,
        )?;
        renderer.skybox_mut().set_time(9000.0);

        let pack = TerrainTexturePack {
            background: texture(registry, device, "grass", 128, Filter::Linear, grass_pixel),
            r: texture(registry, device, "mud", 128, Filter::Linear, |x, y, _| {
                let n = hash(x, y) * 30.0;
                [90 + n as u8, 60 + n as u8, 40, 255]
            }),
            g: texture(registry, device, "flowers", 128, Filter::Linear, |x, y, _| {
                if hash(x, y) > 0.92 { [230, 200, 60, 255] } else { [70, 140, 60, 255] }
            }),
            b: texture(registry, device, "path", 128, Filter::Linear, |x, y, _| {
                let n = (hash(x, y) * 40.0) as u8;
                [150 + n, 140 + n, 120 + n, 255]
            }),
        };
        let blend_map = texture(registry, device, "blend map", 256, Filter::Linear, blend_map_pixel);
        let heights = HeightGrid::from_fn(VERTEX_COUNT, hill_height);
        let terrain = Terrain::new(0, 0, heights, registry, device, pack, blend_map);

        let crate_texture = texture(registry, device, "crate", 64, Filter::Nearest, crate_pixel);
        let crate_model = Rc::new(TexturedModel::new(
            cube(registry, device, false),
            ModelTexture::new(crate_texture).with_shine(10.0, 0.3),
        ));
        let crates = (0..12)
            .map(|i| {
                let angle = i as f32 / 12.0 * TAU;
                let x = LAKE.x + angle.cos() * 80.0;
                let z = LAKE.y + angle.sin() * 80.0;
                let y = terrain.height_at(x, z) + 3.0;
                Entity::new(
                    crate_model.clone(),
                    Transform::from_xyz(x, y, z)
                        .with_rotation(0.0, angle.to_degrees(), 0.0)
                        .with_scale(3.0),
                )
            })
            .collect();

        let stone = texture(registry, device, "stone", 64, Filter::Linear, |x, y, _| {
            let n = (hash(x / 4, y / 4) * 50.0) as u8;
            [110 + n, 110 + n, 115 + n, 255]
        });
        let bumps = texture(registry, device, "stone normal", 64, Filter::Linear, bump_normal_pixel);
        let pillar_model = Rc::new(TexturedModel::new(
            cube(registry, device, true),
            ModelTexture::new(stone).with_normal_map(bumps).with_shine(20.0, 0.5),
        ));
        let pillar_x = LAKE.x + 40.0;
        let pillar_z = LAKE.y - 100.0;
        let pillars = vec![Entity::new(
            pillar_model,
            Transform::from_xyz(pillar_x, terrain.height_at(pillar_x, pillar_z) + 10.0, pillar_z).with_scale(10.0),
        )];

        let smoke_texture = ParticleTexture::new(
            texture(registry, device, "smoke atlas", 256, Filter::Linear, smoke_atlas_pixel),
            4,
        );
        let mut smoke = ParticleSystem::new(smoke_texture, 40.0, 8.0, 0.1, 4.0, 6.0);
        smoke.set_direction(Vec3::Y, 0.15);
        smoke.set_speed_error(0.3);
        smoke.set_life_error(0.2);
        smoke.set_scale_error(0.4);
        smoke.randomize_rotation();

        let badge = texture(registry, device, "badge", 32, Filter::Linear, |x, y, size| {
            let d = Vec2::new(x as f32, y as f32) / size as f32 - Vec2::splat(0.5);
            if d.length() < 0.45 { [40, 120, 200, 200] } else { [0, 0, 0, 0] }
        });
        let guis = vec![GuiTexture::new(badge, Vec2::new(0.85, 0.8), Vec2::new(0.08, 0.14))];

        let lights = vec![
            Light::new(Vec3::new(10_000.0, 15_000.0, -10_000.0), Vec3::splat(0.9)),
            Light::new(Vec3::new(pillar_x, 40.0, pillar_z), Vec3::new(2.0, 1.2, 0.4))
                .with_attenuation(Vec3::new(1.0, 0.01, 0.002)),
        ];

        let camera_y = terrain.height_at(LAKE.x - 150.0, LAKE.y + 150.0).max(WATER_HEIGHT) + 25.0;
        Ok(Self {
            renderer,
            camera: Camera::new(Vec3::new(LAKE.x - 150.0, camera_y, LAKE.y + 150.0), 10.0, 45.0),
            speed: 40.0,
            lights,
            terrain,
            crates,
            pillars,
            water: vec![WaterTile::new(LAKE.x, LAKE.y, WATER_HEIGHT)],
            guis,
            smoke,
            paused: false,
        })
    }

    fn move_camera(&mut self, input: &InputState, dt: f32) {
        self.speed = (self.speed * 1.2f32.powf(input.wheel())).clamp(5.0, 400.0);
        if input.mouse.pressed(MouseButton::Left) {
            let delta = input.cursor_delta();
            self.camera.yaw += delta.x * 0.2;
            self.camera.pitch = (self.camera.pitch + delta.y * 0.2).clamp(-89.0, 89.0);
        }

        let yaw = self.camera.yaw.to_radians();
        let forward = Vec3::new(yaw.sin(), 0.0, -yaw.cos());
        let right = Vec3::new(yaw.cos(), 0.0, yaw.sin());
        let mut step = Vec3::ZERO;
        for (key, dir) in [
            (KeyCode::KeyW, forward),
            (KeyCode::KeyS, -forward),
            (KeyCode::KeyD, right),
            (KeyCode::KeyA, -right),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ShiftLeft, -Vec3::Y),
        ] {
            if input.keys.pressed(key) {
                step += dir;
            }
        }
        self.camera.position += step.normalize_or_zero() * self.speed * dt;

        let ground = self
            .terrain
            .height_at(self.camera.position.x, self.camera.position.z)
            .max(WATER_HEIGHT);
        self.camera.position.y = self.camera.position.y.max(ground + 2.0);
    }
}

impl Scene for WaterScene {
    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32) {
        self.move_camera(ctx.input, dt);
        if ctx.input.keys.just_pressed(KeyCode::KeyP) {
            self.paused = !self.paused;
        }
        if !self.paused {
            let chimney = self.pillars[0].transform.position + Vec3::new(0.0, 10.0, 0.0);
            self.smoke
                .generate_particles(chimney, dt, self.renderer.particles_mut());
        }
        for entity in &mut self.crates {
            entity.increase_rotation(0.0, 20.0 * dt, 0.0);
        }
        self.renderer.update(&self.camera, dt);
    }

    fn render(&mut self, ctx: &mut FrameContext<'_>) {
        self.renderer.process_terrain(&self.terrain);
        for entity in &self.crates {
            self.renderer.process_entity(entity);
        }
        for entity in &self.pillars {
            self.renderer.process_normal_map_entity(entity);
        }
        let frame = FrameInput {
            lights: &self.lights,
            camera: &self.camera,
            water: &self.water,
            guis: &self.guis,
        };
        self.renderer.render_frame(ctx.device, &frame);
    }

    fn resized(&mut self, ctx: &mut FrameContext<'_>, width: u32, height: u32) -> Result<()> {
        self.renderer.resize(ctx.device, width, height)
    }

    fn clean_up(&mut self, ctx: &mut FrameContext<'_>) {
        self.renderer.clean_up(ctx.device, ctx.registry);
    }

    fn renderer(&self) -> Option<&MasterRenderer> {
        Some(&self.renderer)
    }
}

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match RendererConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        None => RendererConfig {
            sky_colour: [0.55, 0.7, 0.85],
            post_processing: true,
            ..Default::default()
        },
    };

    if let Err(e) = App::new(config).with_title("fjord water scene").run(WaterScene::new) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

// ── Procedural assets ────────────────────────────────────────────────────

fn hash(x: u32, y: u32) -> f32 {
    let mut h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (h ^ (h >> 16)) as f32 / u32::MAX as f32
}

fn texture(
    registry: &mut ResourceRegistry,
    device: &mut dyn RenderDevice,
    label: &str,
    size: u32,
    filter: Filter,
    pixel: impl Fn(u32, u32, u32) -> [u8; 4],
) -> TextureHandle {
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            rgba.extend_from_slice(&pixel(x, y, size));
        }
    }
    registry.load_texture_rgba8(device, label, size, size, &rgba, filter, true)
}

/// Vertical gradient from `zenith` at the top face to `horizon` around the sides.
fn sky_cube(
    registry: &mut ResourceRegistry,
    device: &mut dyn RenderDevice,
    label: &str,
    zenith: [f32; 3],
    horizon: [f32; 3],
) -> TextureHandle {
    const SIZE: u32 = 64;
    let lerp = |t: f32| -> [u8; 4] {
        let c = Vec3::from(horizon).lerp(Vec3::from(zenith), t.clamp(0.0, 1.0)) * 255.0;
        [c.x as u8, c.y as u8, c.z as u8, 255]
    };
    let face = |top: Option<bool>| -> Vec<u8> {
        let mut rgba = Vec::with_capacity((SIZE * SIZE * 4) as usize);
        for y in 0..SIZE {
            for _ in 0..SIZE {
                let t = match top {
                    Some(true) => 1.0,
                    Some(false) => 0.0,
                    None => 1.0 - y as f32 / (SIZE - 1) as f32,
                };
                rgba.extend_from_slice(&lerp(t));
            }
        }
        rgba
    };
    let side = face(None);
    let top = face(Some(true));
    let bottom = face(Some(false));
    registry.load_cube_map_rgba8(device, label, SIZE, [&side, &side, &top, &bottom, &side, &side])
}

fn dudv_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let u = x as f32 / size as f32 * TAU;
    let v = y as f32 / size as f32 * TAU;
    let r = ((u * 2.0).sin() * (v * 3.0).cos() * 0.5 + 0.5) * 255.0;
    let g = ((u * 3.0).cos() * (v * 2.0).sin() * 0.5 + 0.5) * 255.0;
    [r as u8, g as u8, 0, 255]
}

fn ripple_normal_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let u = x as f32 / size as f32 * TAU;
    let v = y as f32 / size as f32 * TAU;
    let n = Vec3::new((u * 4.0).cos() * 0.3, 1.0, (v * 4.0).cos() * 0.3).normalize();
    // Water normals are stored with the up axis in blue.
    [((n.x * 0.5 + 0.5) * 255.0) as u8, ((n.z * 0.5 + 0.5) * 255.0) as u8, ((n.y * 0.5 + 0.5) * 255.0) as u8, 255]
}

fn bump_normal_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let cell = size / 4;
    let (cx, cy) = ((x % cell) as f32 / cell as f32 - 0.5, (y % cell) as f32 / cell as f32 - 0.5);
    let n = Vec3::new(cx, cy, 0.6).normalize();
    [((n.x * 0.5 + 0.5) * 255.0) as u8, ((n.y * 0.5 + 0.5) * 255.0) as u8, ((n.z * 0.5 + 0.5) * 255.0) as u8, 255]
}

fn disc_distance_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let d = (Vec2::new(x as f32, y as f32) / size as f32 - Vec2::splat(0.5)).length();
    let alpha = ((0.5 - d) * 2.0 + 0.5).clamp(0.0, 1.0);
    [255, 255, 255, (alpha * 255.0) as u8]
}

fn grass_pixel(x: u32, y: u32, _size: u32) -> [u8; 4] {
    let n = hash(x, y);
    [(50.0 + n * 30.0) as u8, (110.0 + n * 50.0) as u8, (40.0 + n * 20.0) as u8, 255]
}

fn crate_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let edge = x < 4 || y < 4 || x >= size - 4 || y >= size - 4;
    let plank = (y / 8) % 2 == 0;
    match (edge, plank) {
        (true, _) => [80, 50, 25, 255],
        (false, true) => [160, 110, 60, 255],
        (false, false) => [140, 95, 50, 255],
    }
}

fn blend_map_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let p = Vec2::new(x as f32, y as f32) / size as f32;
    let lake = (p - LAKE / TERRAIN_SIZE).length();
    let mud = ((0.12 - (lake - 0.1).abs()) * 10.0).clamp(0.0, 1.0);
    let path = (1.0 - ((p.x - p.y).abs() * 40.0)).clamp(0.0, 1.0);
    let flowers = (hash(x / 8, y / 8) - 0.7).max(0.0) * 3.0;
    [(mud * 255.0) as u8, (flowers.min(1.0) * 255.0) as u8, (path * 255.0) as u8, 255]
}

fn smoke_atlas_pixel(x: u32, y: u32, size: u32) -> [u8; 4] {
    let cell = size / 4;
    let stage = (y / cell) * 4 + x / cell;
    let local = Vec2::new((x % cell) as f32, (y % cell) as f32) / cell as f32 - Vec2::splat(0.5);
    let radius = 0.2 + stage as f32 / 16.0 * 0.28;
    let density = (1.0 - local.length() / radius).clamp(0.0, 1.0);
    let fade = 1.0 - stage as f32 / 16.0;
    let grey = (200.0 - stage as f32 * 5.0) as u8;
    [grey, grey, grey, (density * fade * 220.0) as u8]
}

/// Rolling hills that dip below the water around the lake.
fn hill_height(x: usize, z: usize) -> f32 {
    let scale = TERRAIN_SIZE / (VERTEX_COUNT - 1) as f32;
    let world = Vec2::new(x as f32, z as f32) * scale;
    let lake = (world - LAKE).length();
    let hills = (world.x * 0.01).sin() * 12.0 + (world.y * 0.013).cos() * 10.0 + (world.x * 0.031 + world.y * 0.027).sin() * 4.0;
    let basin = (1.0 - lake / 220.0).max(0.0) * 35.0;
    hills + 8.0 - basin
}

/// One glyph-sized quad, enough to show the distance-field text path.
fn banner_mesh() -> TextMeshData {
    let (w, h) = (0.05, 0.08);
    TextMeshData {
        positions: vec![0.0, 0.0, 0.0, -h, w, 0.0, w, 0.0, 0.0, -h, w, -h],
        uvs: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    }
}

/// Unit cube with per-face normals. With `tangents`, slot 3 carries the
/// face tangent for normal mapping.
fn cube(registry: &mut ResourceRegistry, device: &mut dyn RenderDevice, tangents: bool) -> RawModel {
    // (normal, tangent, bitangent) per face.
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let mut positions = Vec::with_capacity(72);
    let mut uvs = Vec::with_capacity(48);
    let mut normals = Vec::with_capacity(72);
    let mut tangent_data = Vec::with_capacity(72);
    let mut indices = Vec::with_capacity(36);
    for (i, (normal, tangent, bitangent)) in faces.into_iter().enumerate() {
        let base = i as u32 * 4;
        for (u, v) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)] {
            let p = normal + tangent * (u * 2.0 - 1.0) + bitangent * (1.0 - v * 2.0);
            positions.extend_from_slice(&p.to_array());
            uvs.extend_from_slice(&[u, v]);
            normals.extend_from_slice(&normal.to_array());
            tangent_data.extend_from_slice(&tangent.to_array());
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    if tangents {
        registry.load_to_vao_tangents(device, &positions, &uvs, &normals, &tangent_data, &indices)
    } else {
        registry.load_to_vao(device, &positions, &uvs, &normals, &indices)
    }
}
