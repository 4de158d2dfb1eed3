//! # Master Renderer: One Frame, Every Pass
//!
//! The application pushes this frame's drawables, then calls
//! [`MasterRenderer::render_frame`]. The passes run in a fixed order:
//!
//! ```text
//! reflection  ─▶ water reflection target   (mirrored camera, clip below h - 1)
//! refraction  ─▶ water refraction target   (clip above h)
//! main        ─▶ screen, or the post target when post-processing is on
//!                entities, normal-mapped entities, terrain, skybox
//! water       ─▶ samples both offscreen targets
//! particles   ─▶ one instanced draw per texture, back to front
//! post        ─▶ contrast pass onto the screen (optional)
//! gui, text   ─▶ overlays
//! ```
//!
//! The reflection and refraction passes only run when there is water.
//! After the last pass the batch maps and the terrain list are emptied, so
//! every frame starts from nothing.
//!
//! Per-pass [`FrameStats`] are kept for diagnostics.

use std::collections::HashSet;

use crate::batch::BatchMap;
use crate::config::RendererConfig;
use crate::error::Result;
use crate::fbo;
use crate::gpu::{Capability, ClearFlags, FrameStats, MeshHandle, RenderDevice, TextureHandle};
use crate::math::{Mat4, Projection, Vec3, Vec4};
use crate::particles::registry::ParticleRegistry;
use crate::particles::renderer::ParticleRenderer;
use crate::registry::ResourceRegistry;
use crate::scene::{Camera, Entity, Light};
use crate::terrain::Terrain;
use crate::water::framebuffers::WaterFrameBuffers;
use crate::water::renderer::{self as water_renderer, WaterRenderer};
use crate::water::tile::WaterTile;
use crate::water::{self, OffscreenPass, WaterPass};

use super::entity::EntityRenderer;
use super::gui::{GuiRenderer, GuiTexture};
use super::normal_map::NormalMapRenderer;
use super::post::PostProcessing;
use super::skybox::SkyboxRenderer;
use super::terrain::TerrainRenderer;
use super::text::{FontRenderer, TextRegistry};
use super::{enable_culling, SceneUniforms, NO_CLIP};

/// Textures the built-in passes need but do not load themselves.
#[derive(Debug, Clone, Copy)]
pub struct SceneTextures {
    pub day_sky: TextureHandle,
    pub night_sky: TextureHandle,
    pub water_dudv: TextureHandle,
    pub water_normal: TextureHandle,
}

/// Per-frame inputs that are not accumulated.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub lights: &'a [Light],
    pub camera: &'a Camera,
    pub water: &'a [WaterTile],
    pub guis: &'a [GuiTexture],
}

/// Device counters for one pass of the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub name: &'static str,
    pub stats: FrameStats,
}

pub struct MasterRenderer {
    config: RendererConfig,
    projection: Projection,
    entity_renderer: EntityRenderer,
    normal_map_renderer: NormalMapRenderer,
    terrain_renderer: TerrainRenderer,
    skybox_renderer: SkyboxRenderer,
    water_renderer: WaterRenderer,
    water_buffers: WaterFrameBuffers,
    particle_renderer: ParticleRenderer,
    gui_renderer: GuiRenderer,
    font_renderer: FontRenderer,
    post: Option<PostProcessing>,
    particles: ParticleRegistry,
    texts: TextRegistry,
    entities: BatchMap,
    normal_map_entities: BatchMap,
    terrains: Vec<Terrain>,
    pass_stats: Vec<PassStats>,
    drawn_batches: usize,
    missing_normal_maps: HashSet<MeshHandle>,
}

impl MasterRenderer {
    pub fn new(
        device: &mut dyn RenderDevice,
        registry: &mut ResourceRegistry,
        config: RendererConfig,
        textures: SceneTextures,
        particles: ParticleRegistry,
        texts: TextRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let projection = Projection::new(
            config.display_width as f32,
            config.display_height as f32,
            config.fov,
            config.near_plane,
            config.far_plane,
        )?;
        let matrix = projection.matrix();
        enable_culling(device);

        let post = if config.post_processing {
            Some(PostProcessing::new(
                device,
                registry,
                config.display_width,
                config.display_height,
                config.contrast,
            )?)
        } else {
            None
        };

        let renderer = Self {
            entity_renderer: EntityRenderer::new(device, matrix)?,
            normal_map_renderer: NormalMapRenderer::new(device, matrix)?,
            terrain_renderer: TerrainRenderer::new(device, matrix)?,
            skybox_renderer: SkyboxRenderer::new(device, registry, matrix, textures.day_sky, textures.night_sky)?,
            water_renderer: WaterRenderer::new(
                device,
                registry,
                matrix,
                config.near_plane,
                config.far_plane,
                config.wave_speed,
                textures.water_dudv,
                textures.water_normal,
            )?,
            water_buffers: WaterFrameBuffers::new(device, &config),
            particle_renderer: ParticleRenderer::new(device, registry, matrix)?,
            gui_renderer: GuiRenderer::new(device, registry)?,
            font_renderer: FontRenderer::new(device)?,
            post,
            particles,
            texts,
            entities: BatchMap::new(),
            normal_map_entities: BatchMap::new(),
            terrains: Vec::new(),
            pass_stats: Vec::new(),
            drawn_batches: 0,
            missing_normal_maps: HashSet::new(),
            projection,
            config,
        };
        log::info!(
            "Master renderer ready ({}x{}, fov {}, post-processing {})",
            renderer.config.display_width,
            renderer.config.display_height,
            renderer.config.fov,
            if renderer.post.is_some() { "on" } else { "off" }
        );
        Ok(renderer)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    pub fn sky_colour(&self) -> Vec3 {
        Vec3::from(self.config.sky_colour)
    }

    pub fn particles(&self) -> &ParticleRegistry {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleRegistry {
        &mut self.particles
    }

    pub fn texts(&self) -> &TextRegistry {
        &self.texts
    }

    pub fn texts_mut(&mut self) -> &mut TextRegistry {
        &mut self.texts
    }

    pub fn skybox(&self) -> &SkyboxRenderer {
        &self.skybox_renderer
    }

    pub fn skybox_mut(&mut self) -> &mut SkyboxRenderer {
        &mut self.skybox_renderer
    }

    /// Counters for each pass of the last rendered frame, in pass order.
    pub fn pass_stats(&self) -> &[PassStats] {
        &self.pass_stats
    }

    /// Entity batches the last [`render_frame`](Self::render_frame) drew.
    pub fn drawn_batches(&self) -> usize {
        self.drawn_batches
    }

    /// Entities and normal-mapped entities currently queued.
    pub fn queued_instances(&self) -> usize {
        self.entities.instance_count() + self.normal_map_entities.instance_count()
    }

    pub fn queued_batches(&self) -> usize {
        self.entities.len() + self.normal_map_entities.len()
    }

    pub fn queued_terrains(&self) -> usize {
        self.terrains.len()
    }

    // ── Accumulation ────────────────────────────────────────────────────

    /// Queue an entity for this frame. Entities with no model or a
    /// non-finite transform are dropped.
    pub fn process_entity(&mut self, entity: &Entity) {
        self.entities.push(entity);
    }

    /// Queue a normal-mapped entity. Models without a normal map are
    /// rejected, with one warning per mesh.
    pub fn process_normal_map_entity(&mut self, entity: &Entity) -> bool {
        if let Some(model) = &entity.model
            && model.texture.normal_map.is_none()
        {
            if self.missing_normal_maps.insert(model.raw.mesh) {
                log::warn!("mesh {:?} queued as normal-mapped but has no normal map", model.raw.mesh);
            }
            return false;
        }
        self.normal_map_entities.push(entity)
    }

    pub fn process_terrain(&mut self, terrain: &Terrain) {
        self.terrains.push(terrain.clone());
    }

    // ── Frame ───────────────────────────────────────────────────────────

    /// Advance everything that animates: the sky cycle, the water ripples,
    /// and the particles.
    pub fn update(&mut self, camera: &Camera, dt: f32) {
        self.skybox_renderer.update(dt);
        self.water_renderer.update(dt);
        self.particles.update(camera.position, dt);
    }

    /// Run every pass for the queued drawables, then empty the queues.
    pub fn render_frame(&mut self, device: &mut dyn RenderDevice, frame: &FrameInput<'_>) {
        self.pass_stats.clear();

        if let Some(passes) = water::offscreen_passes(&self.water_buffers, frame.water, frame.camera) {
            set_clip_distance(device, true);
            for pass in &passes {
                self.render_offscreen(device, frame.lights, pass);
            }
            set_clip_distance(device, false);
        }

        let before = device.frame_stats();
        match &self.post {
            Some(post) => post.bind_scene(device),
            None => fbo::bind_default(device),
        }
        self.render(device, frame.lights, frame.camera, NO_CLIP);
        self.record("main", device, &before);

        let before = device.frame_stats();
        let sun = water_renderer::sun(frame.lights);
        self.water_renderer
            .render(device, frame.water, frame.camera, &sun, &self.water_buffers);
        self.record("water", device, &before);

        let before = device.frame_stats();
        self.particle_renderer.render(device, &self.particles, frame.camera);
        self.record("particles", device, &before);

        if let Some(post) = &self.post {
            let before = device.frame_stats();
            post.do_post_processing(device);
            self.record("post", device, &before);
        }

        let before = device.frame_stats();
        self.gui_renderer.render(device, frame.guis);
        self.record("gui", device, &before);

        let before = device.frame_stats();
        self.font_renderer.render(device, &self.texts);
        self.record("text", device, &before);

        self.drawn_batches = self.queued_batches();
        self.clear_queues();
    }

    fn render_offscreen(&mut self, device: &mut dyn RenderDevice, lights: &[Light], pass: &OffscreenPass) {
        let before = device.frame_stats();
        pass.bind(device);
        self.render(device, lights, &pass.camera, pass.clip_plane);
        let name = match pass.kind {
            WaterPass::Reflection => "reflection",
            WaterPass::Refraction => "refraction",
        };
        self.record(name, device, &before);
    }

    /// Single-pass entry point: queue the given drawables, render one scene
    /// pass into the current target, and empty the queues.
    #[allow(clippy::too_many_arguments)]
    pub fn render_scene(
        &mut self,
        device: &mut dyn RenderDevice,
        entities: &[Entity],
        normal_map_entities: &[Entity],
        terrains: &[Terrain],
        lights: &[Light],
        camera: &Camera,
        clip_plane: Vec4,
    ) {
        for terrain in terrains {
            self.process_terrain(terrain);
        }
        for entity in entities {
            self.process_entity(entity);
        }
        for entity in normal_map_entities {
            self.process_normal_map_entity(entity);
        }
        self.render(device, lights, camera, clip_plane);
        self.clear_queues();
    }

    /// One scene pass over the queued drawables into the current target.
    /// The queues are left intact.
    pub fn render(&self, device: &mut dyn RenderDevice, lights: &[Light], camera: &Camera, clip_plane: Vec4) {
        let sky = self.sky_colour();
        self.prepare(device, sky);
        let scene = SceneUniforms {
            lights,
            camera,
            clip_plane,
            sky_colour: sky,
            fog_density: self.config.fog_density,
            fog_gradient: self.config.fog_gradient,
        };

        self.entity_renderer.begin(device, &scene);
        self.entity_renderer.render(device, &self.entities);
        self.entity_renderer.end(device);

        self.normal_map_renderer
            .render(device, &self.normal_map_entities, &scene);
        self.terrain_renderer.render(device, &self.terrains, &scene);
        self.skybox_renderer.render(device, camera, sky);
    }

    fn prepare(&self, device: &mut dyn RenderDevice, sky: Vec3) {
        device.enable(Capability::DepthTest);
        device.clear(sky.extend(1.0), ClearFlags::ALL);
    }

    fn clear_queues(&mut self) {
        self.entities.clear();
        self.normal_map_entities.clear();
        self.terrains.clear();
    }

    fn record(&mut self, name: &'static str, device: &dyn RenderDevice, before: &FrameStats) {
        self.pass_stats.push(PassStats {
            name,
            stats: device.frame_stats().since(before),
        });
    }

    /// Follow a display resize: new aspect ratio for every program and a
    /// matching post-processing target.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<()> {
        let projection = Projection::new(
            width as f32,
            height as f32,
            self.config.fov,
            self.config.near_plane,
            self.config.far_plane,
        )?;
        self.projection = projection;
        self.config.display_width = width;
        self.config.display_height = height;

        let matrix = projection.matrix();
        for shader in [
            self.entity_renderer.shader(),
            self.normal_map_renderer.shader(),
            self.terrain_renderer.shader(),
            self.skybox_renderer.shader(),
            self.water_renderer.shader(),
            self.particle_renderer.shader(),
        ] {
            shader.start(device);
            shader.set(device, "projection_matrix", matrix);
            shader.stop(device);
        }
        if let Some(post) = &mut self.post {
            post.resize(device, width, height);
        }
        Ok(())
    }

    /// Release every program, offscreen target and tracked allocation.
    pub fn clean_up(&mut self, device: &mut dyn RenderDevice, registry: &mut ResourceRegistry) {
        self.entity_renderer.clean_up(device);
        self.normal_map_renderer.clean_up(device);
        self.terrain_renderer.clean_up(device);
        self.skybox_renderer.clean_up(device);
        self.water_renderer.clean_up(device);
        self.water_buffers.clean_up(device);
        self.particle_renderer.clean_up(device);
        self.gui_renderer.clean_up(device);
        self.font_renderer.clean_up(device);
        if let Some(post) = &self.post {
            post.clean_up(device);
        }
        self.particles.clear();
        self.clear_queues();
        registry.clean_up(device);
    }
}

fn set_clip_distance(device: &mut dyn RenderDevice, enabled: bool) {
    if !device.is_supported(Capability::ClipDistance0) {
        log::warn!("user clip planes are not supported by this device");
        return;
    }
    if enabled {
        device.enable(Capability::ClipDistance0);
    } else {
        device.disable(Capability::ClipDistance0);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};
    use crate::gpu::{Attachment, ProgramHandle};
    use crate::math::{Transform, Vec2};
    use crate::model::{ModelTexture, RawModel, TexturedModel};
    use crate::particles::particle::Particle;
    use crate::particles::texture::ParticleTexture;
    use crate::render::text::{FontType, GuiText, TextMeshData};
    use crate::terrain::{HeightGrid, TerrainTexturePack};

    struct Fixture {
        device: RecordingDevice,
        registry: ResourceRegistry,
        renderer: MasterRenderer,
    }

    fn textures() -> SceneTextures {
        SceneTextures {
            day_sky: TextureHandle(1000),
            night_sky: TextureHandle(1001),
            water_dudv: TextureHandle(1002),
            water_normal: TextureHandle(1003),
        }
    }

    fn fixture_with(mut device: RecordingDevice, config: RendererConfig) -> Fixture {
        let mut registry = ResourceRegistry::new();
        let renderer = MasterRenderer::new(
            &mut device,
            &mut registry,
            config,
            textures(),
            ParticleRegistry::new(),
            TextRegistry::new(),
        )
        .unwrap();
        Fixture {
            device,
            registry,
            renderer,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingDevice::new(1280, 720), RendererConfig::default())
    }

    fn model(mesh: u32, transparent: bool) -> Rc<TexturedModel> {
        Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(mesh),
                vertex_count: 36,
            },
            ModelTexture::new(TextureHandle(mesh + 100)).with_transparency(transparent),
        ))
    }

    fn queue_scene(f: &mut Fixture) {
        let fern = model(500, true);
        let pine = model(501, false);
        for i in 0..4 {
            let model = if i % 2 == 0 { &fern } else { &pine };
            f.renderer
                .process_entity(&Entity::new(model.clone(), Transform::from_xyz(i as f32, 0.0, 0.0)));
        }
        let pack = TerrainTexturePack {
            background: TextureHandle(1),
            r: TextureHandle(2),
            g: TextureHandle(3),
            b: TextureHandle(4),
        };
        let terrain = Terrain::new(
            0,
            -1,
            HeightGrid::flat(4, 0.0),
            &mut f.registry,
            &mut f.device,
            pack,
            TextureHandle(5),
        );
        f.renderer.process_terrain(&terrain);
    }

    fn programs_used(device: &RecordingDevice) -> Vec<ProgramHandle> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::UseProgram(Some(p)) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn lights() -> [Light; 1] {
        [Light::new(Vec3::new(0.0, 1000.0, 0.0), Vec3::ONE)]
    }

    #[test]
    fn normal_mapped_entities_need_a_normal_map() {
        let mut f = fixture();
        let bare = model(510, false);
        let bumpy = Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(511),
                vertex_count: 36,
            },
            ModelTexture::new(TextureHandle(611)).with_normal_map(TextureHandle(612)),
        ));
        assert!(!f.renderer.process_normal_map_entity(&Entity::new(bare.clone(), Transform::IDENTITY)));
        assert!(!f.renderer.process_normal_map_entity(&Entity::new(bare, Transform::IDENTITY)));
        assert!(f.renderer.process_normal_map_entity(&Entity::new(bumpy, Transform::IDENTITY)));
        assert_eq!(f.renderer.queued_instances(), 1);
        assert_eq!(f.renderer.missing_normal_maps.len(), 1);
    }

    #[test]
    fn passes_run_in_order_with_water() {
        let mut f = fixture();
        queue_scene(&mut f);
        let water = [WaterTile::new(0.0, 0.0, 0.0)];
        let camera = Camera::new(Vec3::new(0.0, 10.0, 0.0), 10.0, 0.0);
        let lights = lights();
        let input = FrameInput {
            lights: &lights,
            camera: &camera,
            water: &water,
            guis: &[GuiTexture::new(TextureHandle(9), Vec2::ZERO, Vec2::ONE)],
        };
        f.device.begin_frame();
        f.device.clear_commands();
        f.renderer.render_frame(&mut f.device, &input);

        let names: Vec<&str> = f.renderer.pass_stats().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            ["reflection", "refraction", "main", "water", "particles", "gui", "text"]
        );

        let targets: Vec<Option<_>> = f
            .device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindTarget { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(targets.len(), 3);
        assert!(targets[0].is_some() && targets[1].is_some());
        assert_ne!(targets[0], targets[1]);
        assert_eq!(targets[2], None);

        // Clip planes are on for the offscreen passes only.
        let commands = f.device.commands();
        let enable = commands
            .iter()
            .position(|c| *c == Command::Enable(Capability::ClipDistance0))
            .unwrap();
        let disable = commands
            .iter()
            .position(|c| *c == Command::Disable(Capability::ClipDistance0))
            .unwrap();
        let main_bind = commands
            .iter()
            .position(|c| matches!(c, Command::BindTarget { target: None, .. }))
            .unwrap();
        assert!(enable < disable && disable < main_bind);

        let program = |name| f.device.program_named(name).unwrap();
        let scene = [program("entity"), program("normal_map"), program("terrain"), program("skybox")];
        let mut expected = Vec::new();
        for _ in 0..3 {
            expected.extend_from_slice(&scene);
        }
        expected.extend_from_slice(&[program("water"), program("gui")]);
        assert_eq!(programs_used(&f.device), expected);

        let main = f.renderer.pass_stats()[2].stats;
        assert_eq!(main.mesh_binds, 2 + 1 + 1);
        assert_eq!(main.draw_calls, 4 + 1 + 1);
    }

    #[test]
    fn offscreen_passes_are_skipped_without_water() {
        let mut f = fixture();
        queue_scene(&mut f);
        let camera = Camera::default();
        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[],
            guis: &[],
        };
        f.device.clear_commands();
        f.renderer.render_frame(&mut f.device, &input);
        assert_eq!(f.device.count(|c| matches!(c, Command::BindTarget { .. })), 1);
        assert_eq!(f.device.count(|c| *c == Command::Enable(Capability::ClipDistance0)), 0);
        assert_eq!(f.device.count(|c| matches!(c, Command::Clear { .. })), 1);
    }

    #[test]
    fn queues_are_empty_after_a_frame() {
        let mut f = fixture();
        queue_scene(&mut f);
        assert_eq!(f.renderer.queued_instances(), 4);
        assert_eq!(f.renderer.queued_batches(), 2);
        assert_eq!(f.renderer.queued_terrains(), 1);
        let camera = Camera::default();
        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[WaterTile::new(0.0, 0.0, -2.0)],
            guis: &[],
        };
        f.renderer.render_frame(&mut f.device, &input);
        assert_eq!(f.renderer.drawn_batches(), 2);
        assert_eq!(f.renderer.queued_instances(), 0);
        assert_eq!(f.renderer.queued_batches(), 0);
        assert_eq!(f.renderer.queued_terrains(), 0);
    }

    #[test]
    fn render_scene_is_one_pass_and_clears() {
        let mut f = fixture();
        let fern = model(500, false);
        let entities = [
            Entity::new(fern.clone(), Transform::IDENTITY),
            Entity::new(fern, Transform::from_xyz(1.0, 0.0, 0.0)),
        ];
        f.device.begin_frame();
        f.renderer.render_scene(
            &mut f.device,
            &entities,
            &[],
            &[],
            &lights(),
            &Camera::default(),
            water::refraction_clip_plane(3.0),
        );
        assert_eq!(f.device.frame_stats().draw_calls, 2 + 1);
        assert_eq!(f.renderer.queued_instances(), 0);
        let entity = f.device.program_named("entity").unwrap();
        assert_eq!(
            f.device.uniform(entity, "plane"),
            Some(Vec4::new(0.0, -1.0, 0.0, 3.0).into())
        );
    }

    #[test]
    fn malformed_entities_are_dropped() {
        let mut f = fixture();
        let mut placeholder = Entity::new(model(500, false), Transform::IDENTITY);
        placeholder.model = None;
        f.renderer.process_entity(&placeholder);
        f.renderer
            .process_entity(&Entity::new(model(501, false), Transform::from_xyz(f32::NAN, 0.0, 0.0)));
        assert_eq!(f.renderer.queued_instances(), 0);
    }

    #[test]
    fn broken_attachment_is_logged_and_frames_continue() {
        let mut device = RecordingDevice::new(1280, 720);
        device.fail_attachment(Attachment::DepthTexture);
        let mut f = fixture_with(device, RendererConfig::default());
        queue_scene(&mut f);
        let camera = Camera::default();
        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[WaterTile::new(0.0, 0.0, 0.0)],
            guis: &[],
        };
        f.device.begin_frame();
        f.renderer.render_frame(&mut f.device, &input);
        assert!(f.device.check_error().is_none());
        assert!(f.device.frame_stats().draw_calls > 0);
    }

    #[test]
    fn unsupported_culling_only_warns() {
        let device = RecordingDevice::new(1280, 720).without_capability(Capability::CullFace);
        let mut f = fixture_with(device, RendererConfig::default());
        queue_scene(&mut f);
        let camera = Camera::default();
        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[],
            guis: &[],
        };
        f.device.begin_frame();
        f.renderer.render_frame(&mut f.device, &input);
        assert_eq!(f.device.count(|c| matches!(c, Command::Enable(Capability::CullFace))), 0);
        assert_eq!(f.device.count(|c| matches!(c, Command::Disable(Capability::CullFace))), 0);
        assert_eq!(f.renderer.pass_stats()[0].stats.draw_calls, 6);
    }

    #[test]
    fn post_processing_composites_before_overlays() {
        let config = RendererConfig {
            post_processing: true,
            ..Default::default()
        };
        let mut f = fixture_with(RecordingDevice::new(1280, 720), config);
        let font = FontType::new(TextureHandle(77));
        let mesh = TextMeshData {
            positions: vec![0.0; 12],
            uvs: vec![0.0; 12],
        };
        let text = GuiText::new("fps", 1.0, font, Vec2::ZERO);
        let Fixture {
            device,
            registry,
            renderer,
        } = &mut f;
        renderer.texts_mut().load_text(text, &mesh, registry, device);

        let camera = Camera::default();
        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[],
            guis: &[],
        };
        f.device.clear_commands();
        f.renderer.render_frame(&mut f.device, &input);

        let names: Vec<&str> = f.renderer.pass_stats().iter().map(|p| p.name).collect();
        assert_eq!(names, ["main", "water", "particles", "post", "gui", "text"]);
        let first_bind = f
            .device
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::BindTarget { target, .. } => Some(*target),
                _ => None,
            })
            .unwrap();
        assert!(first_bind.is_some());
        let used = programs_used(&f.device);
        let contrast = f.device.program_named("contrast").unwrap();
        let font = f.device.program_named("font").unwrap();
        let contrast_at = used.iter().position(|p| *p == contrast).unwrap();
        assert_eq!(used.last(), Some(&font));
        assert!(contrast_at < used.len() - 1);
    }

    #[test]
    fn particles_are_stepped_and_drawn() {
        let mut f = fixture();
        let smoke = ParticleTexture::new(TextureHandle(60), 4);
        for z in [1.0, 2.0, 3.0] {
            f.renderer.particles_mut().add_particle(Particle::new(
                smoke,
                Vec3::new(0.0, 0.0, z),
                Vec3::ZERO,
                0.0,
                1.0,
                0.0,
                1.0,
            ));
        }
        let camera = Camera::default();
        f.renderer.update(&camera, 0.25);
        assert_eq!(f.renderer.particles().particle_count(), 3);

        let input = FrameInput {
            lights: &[],
            camera: &camera,
            water: &[],
            guis: &[],
        };
        f.renderer.render_frame(&mut f.device, &input);
        let particles = f
            .renderer
            .pass_stats()
            .iter()
            .find(|p| p.name == "particles")
            .unwrap();
        assert_eq!(particles.stats.instanced_draws, 1);
        assert_eq!(particles.stats.instances, 3);

        for _ in 0..3 {
            f.renderer.update(&camera, 0.25);
        }
        assert!(f.renderer.particles().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut device = RecordingDevice::new(1280, 720);
        let mut registry = ResourceRegistry::new();
        let config = RendererConfig {
            fov: 0.0,
            ..Default::default()
        };
        let result = MasterRenderer::new(
            &mut device,
            &mut registry,
            config,
            textures(),
            ParticleRegistry::new(),
            TextRegistry::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn resize_reloads_projection() {
        let mut f = fixture();
        f.renderer.resize(&mut f.device, 800, 800).unwrap();
        assert_eq!(f.renderer.projection().aspect, 1.0);
        let entity = f.device.program_named("entity").unwrap();
        assert_eq!(
            f.device.uniform(entity, "projection_matrix"),
            Some(f.renderer.projection_matrix().into())
        );
        assert!(f.renderer.resize(&mut f.device, 0, 600).is_err());
    }

    #[test]
    fn clean_up_releases_everything() {
        let mut f = fixture();
        queue_scene(&mut f);
        f.renderer.clean_up(&mut f.device, &mut f.registry);
        assert_eq!(f.device.live_resource_count(), 0);
        assert_eq!(f.registry.allocation_count(), 0);
    }
}
