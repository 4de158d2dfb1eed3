//! Convenience re-exports: `use fjord::prelude::*` for the common items.

pub use crate::app::{App, FrameContext, Scene};
pub use crate::config::RendererConfig;
pub use crate::error::{FjordError, Result};
pub use crate::gpu::{Filter, RenderDevice, TextureHandle};
pub use crate::input::{InputState, KeyCode, MouseButton};
pub use crate::math::{Mat4, Projection, Quat, Transform, Vec2, Vec3, Vec4};
pub use crate::model::{ModelTexture, RawModel, TexturedModel};
pub use crate::particles::registry::ParticleRegistry;
pub use crate::particles::system::ParticleSystem;
pub use crate::particles::texture::ParticleTexture;
pub use crate::registry::ResourceRegistry;
pub use crate::render::gui::GuiTexture;
pub use crate::render::master::{FrameInput, MasterRenderer, SceneTextures};
pub use crate::render::text::{FontType, GuiText, TextMeshData, TextRegistry};
pub use crate::render::NO_CLIP;
pub use crate::scene::{Camera, Entity, Light};
pub use crate::terrain::{HeightGrid, Terrain, TerrainTexturePack};
pub use crate::time::Time;
pub use crate::water::tile::WaterTile;
