//! Globe Scene
//!
//! Orchestration for the tracking globe. The view owns every piece of scene
//! state and drives an external [`Renderer`] through a narrow capability set:
//!
//! - [`layers`]: one marker batch per data layer, rebuilt wholesale per refresh
//! - [`lod`]: throttled camera-altitude tiers gating the camera markers
//! - [`selection`]: pick → tracked entity, satellite orbit previews
//! - [`effects`]: mutually exclusive visual modes plus derived bloom
//! - [`controls`]: key bindings, city landmarks and geocoder fly-to
//! - [`view`]: the single-writer [`GlobeView`] and its event loop

pub mod controls;
pub mod effects;
pub mod entity;
pub mod layers;
pub mod lod;
pub mod renderer;
pub mod selection;
pub mod shaders;
pub mod view;

pub use effects::{EffectMode, EffectPipeline, ShaderEffectState, ShaderParam, ShaderParams};
pub use entity::{EntityKind, ExtraValue, MarkerPayload, TrackedEntity};
pub use layers::{DensityMode, LayerBatchManager, LayerId, LayerVisibility, SceneData};
pub use lod::{AltitudeTier, CameraLodController, LodReading};
pub use renderer::{HeadlessRenderer, Renderer, RendererError};
pub use selection::{PickOutcome, SelectionController};
pub use view::{request, GlobeView, LayerStatus, SceneStatus, ViewAction, ViewCommand};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Renderer error: {0}")]
    Renderer(#[from] RendererError),

    #[error("Globe view is not mounted")]
    NotMounted,

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Unknown shader parameter: {0}")]
    UnknownParam(String),

    #[error("Unknown effect mode: {0}")]
    UnknownMode(String),

    #[error("Unknown city: {0}")]
    UnknownCity(String),

    #[error("Unknown density mode: {0}")]
    UnknownDensity(String),

    #[error("Globe view has shut down")]
    ViewClosed,
}

pub type Result<T> = std::result::Result<T, SceneError>;
