//! Effect Pipeline Controller
//!
//! Five mutually exclusive visual modes and one derived bloom overlay. All
//! stage enable flags come out of a single transition, so exactly one mode's
//! stage can ever be on. A stage the engine refuses to build leaves its mode
//! inert instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::renderer::{Renderer, StageDescriptor, StageHandle, StageSource};
use crate::shaders;
use crate::SceneError;

/// Bloom below this brightness is imperceptible and stays off.
pub const BLOOM_FLOOR: f64 = 0.05;
const BLOOM_SIGMA: f64 = 2.5;
const BLOOM_STEP_SIZE: f64 = 3.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectMode {
    #[default]
    Normal,
    Crt,
    NightVision,
    Thermal,
    Flare,
}

impl EffectMode {
    pub const ALL: [EffectMode; 5] = [
        Self::Normal,
        Self::Crt,
        Self::NightVision,
        Self::Thermal,
        Self::Flare,
    ];

    /// Number keys `1`-`5`.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '1' => Some(Self::Normal),
            '2' => Some(Self::Crt),
            '3' => Some(Self::NightVision),
            '4' => Some(Self::Thermal),
            '5' => Some(Self::Flare),
            _ => None,
        }
    }

    /// The stage this mode turns on, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Normal => None,
            Self::Crt => Some(StageKind::Crt),
            Self::NightVision => Some(StageKind::NightVision),
            Self::Thermal => Some(StageKind::Thermal),
            Self::Flare => Some(StageKind::Flare),
        }
    }
}

impl FromStr for EffectMode {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, SceneError> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "crt" => Ok(Self::Crt),
            "nightvision" | "night_vision" | "nvg" => Ok(Self::NightVision),
            "thermal" => Ok(Self::Thermal),
            "flare" => Ok(Self::Flare),
            _ => Err(SceneError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Crt,
    NightVision,
    Thermal,
    Flare,
    Bloom,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        Self::Crt,
        Self::NightVision,
        Self::Thermal,
        Self::Flare,
        Self::Bloom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Crt => "wv_crt",
            Self::NightVision => "wv_nightvision",
            Self::Thermal => "wv_thermal",
            Self::Flare => "wv_flare",
            Self::Bloom => "wv_bloom",
        }
    }

    fn descriptor(&self, params: &ShaderParams) -> StageDescriptor {
        let (source, uniforms) = match self {
            Self::Crt => (
                StageSource::Glsl(shaders::CRT_SHADER),
                vec![
                    ("scanlineIntensity", params.scanline_intensity),
                    ("pixelation", params.pixelation),
                ],
            ),
            Self::NightVision => (StageSource::Builtin(shaders::NIGHT_VISION_BUILTIN), vec![]),
            Self::Thermal => (
                StageSource::Glsl(shaders::THERMAL_SHADER),
                vec![("sensitivity", params.sensitivity)],
            ),
            Self::Flare => (StageSource::Glsl(shaders::FLARE_SHADER), vec![]),
            Self::Bloom => (
                StageSource::Builtin(shaders::BLOOM_BUILTIN),
                vec![
                    ("brightness", params.bloom_brightness),
                    ("sigma", BLOOM_SIGMA),
                    ("stepSize", BLOOM_STEP_SIZE),
                ],
            ),
        };
        StageDescriptor {
            name: self.name(),
            source,
            uniforms,
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Slider bounds for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParamSpec {
    /// Snap to the slider step and clamp into range. Non-finite input falls
    /// back to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        let snapped = self.min + ((value - self.min) / self.step).round() * self.step;
        let snapped = (snapped * 1e6).round() / 1e6;
        snapped.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShaderParam {
    ScanlineIntensity,
    Pixelation,
    Sensitivity,
    BloomBrightness,
}

impl ShaderParam {
    pub const ALL: [ShaderParam; 4] = [
        Self::ScanlineIntensity,
        Self::Pixelation,
        Self::Sensitivity,
        Self::BloomBrightness,
    ];

    pub fn spec(&self) -> ParamSpec {
        match self {
            Self::ScanlineIntensity => ParamSpec { min: 0.0, max: 1.0, step: 0.05, default: 0.7 },
            Self::Pixelation => ParamSpec { min: 1.0, max: 8.0, step: 0.5, default: 1.5 },
            Self::Sensitivity => ParamSpec { min: 0.5, max: 4.0, step: 0.1, default: 2.0 },
            Self::BloomBrightness => ParamSpec { min: 0.0, max: 1.0, step: 0.05, default: 0.2 },
        }
    }

    /// Stage and uniform the parameter is bound to.
    fn binding(&self) -> (StageKind, &'static str) {
        match self {
            Self::ScanlineIntensity => (StageKind::Crt, "scanlineIntensity"),
            Self::Pixelation => (StageKind::Crt, "pixelation"),
            Self::Sensitivity => (StageKind::Thermal, "sensitivity"),
            Self::BloomBrightness => (StageKind::Bloom, "brightness"),
        }
    }
}

impl fmt::Display for ShaderParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScanlineIntensity => "scanlineIntensity",
            Self::Pixelation => "pixelation",
            Self::Sensitivity => "sensitivity",
            Self::BloomBrightness => "bloomBrightness",
        };
        f.write_str(name)
    }
}

impl FromStr for ShaderParam {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, SceneError> {
        match s {
            "scanlineIntensity" | "scanline_intensity" | "scanline" => Ok(Self::ScanlineIntensity),
            "pixelation" => Ok(Self::Pixelation),
            "sensitivity" => Ok(Self::Sensitivity),
            "bloomBrightness" | "bloom_brightness" | "bloom" => Ok(Self::BloomBrightness),
            _ => Err(SceneError::UnknownParam(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderParams {
    pub scanline_intensity: f64,
    pub pixelation: f64,
    pub sensitivity: f64,
    pub bloom_brightness: f64,
}

impl Default for ShaderParams {
    fn default() -> Self {
        Self {
            scanline_intensity: ShaderParam::ScanlineIntensity.spec().default,
            pixelation: ShaderParam::Pixelation.spec().default,
            sensitivity: ShaderParam::Sensitivity.spec().default,
            bloom_brightness: ShaderParam::BloomBrightness.spec().default,
        }
    }
}

impl ShaderParams {
    pub fn get(&self, param: ShaderParam) -> f64 {
        match param {
            ShaderParam::ScanlineIntensity => self.scanline_intensity,
            ShaderParam::Pixelation => self.pixelation,
            ShaderParam::Sensitivity => self.sensitivity,
            ShaderParam::BloomBrightness => self.bloom_brightness,
        }
    }

    /// Store the clamped value and return it.
    pub fn set(&mut self, param: ShaderParam, value: f64) -> f64 {
        let value = param.spec().clamp(value);
        let slot = match param {
            ShaderParam::ScanlineIntensity => &mut self.scanline_intensity,
            ShaderParam::Pixelation => &mut self.pixelation,
            ShaderParam::Sensitivity => &mut self.sensitivity,
            ShaderParam::BloomBrightness => &mut self.bloom_brightness,
        };
        *slot = value;
        value
    }
}

// ============================================================================
// Effect state
// ============================================================================

pub fn bloom_enabled(mode: EffectMode, bloom_brightness: f64) -> bool {
    matches!(mode, EffectMode::Normal | EffectMode::Flare) && bloom_brightness > BLOOM_FLOOR
}

/// Active mode, parameters and the bloom flag derived from both. Only
/// [`ShaderEffectState::transition`] produces new states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderEffectState {
    active_mode: EffectMode,
    bloom_enabled: bool,
    params: ShaderParams,
}

impl Default for ShaderEffectState {
    fn default() -> Self {
        Self::transition(EffectMode::Normal, ShaderParams::default())
    }
}

impl ShaderEffectState {
    pub fn transition(mode: EffectMode, params: ShaderParams) -> Self {
        Self {
            active_mode: mode,
            bloom_enabled: bloom_enabled(mode, params.bloom_brightness),
            params,
        }
    }

    pub fn active_mode(&self) -> EffectMode {
        self.active_mode
    }

    pub fn bloom_enabled(&self) -> bool {
        self.bloom_enabled
    }

    pub fn params(&self) -> &ShaderParams {
        &self.params
    }

    pub fn stage_enabled(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Bloom => self.bloom_enabled,
            other => self.active_mode.stage() == Some(other),
        }
    }

    pub fn enabled_stages(&self) -> BTreeSet<StageKind> {
        StageKind::ALL
            .into_iter()
            .filter(|s| self.stage_enabled(*s))
            .collect()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Default)]
pub struct EffectPipeline {
    state: ShaderEffectState,
    stages: BTreeMap<StageKind, StageHandle>,
    initialized: bool,
}

impl EffectPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ShaderEffectState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn registered_stages(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.stages.keys().copied()
    }

    /// Register every stage the engine can build. A second call is a no-op.
    /// Returns the number of registered stages.
    pub fn initialize<R: Renderer>(&mut self, renderer: &mut R) -> usize {
        if self.initialized {
            debug!("effect pipeline already initialized");
            return self.stages.len();
        }

        for kind in StageKind::ALL {
            match renderer.add_stage(&kind.descriptor(&self.state.params)) {
                Ok(handle) => {
                    self.stages.insert(kind, handle);
                }
                Err(e) => warn!(stage = kind.name(), "stage unavailable, mode stays inert: {}", e),
            }
        }

        self.initialized = true;
        self.sync(renderer);
        info!(stages = self.stages.len(), "effect pipeline initialized");
        self.stages.len()
    }

    pub fn set_mode<R: Renderer>(&mut self, renderer: &mut R, mode: EffectMode) -> ShaderEffectState {
        self.state = ShaderEffectState::transition(mode, self.state.params);
        self.sync(renderer);
        debug!(mode = ?mode, bloom = self.state.bloom_enabled, "effect mode applied");
        self.state
    }

    /// Clamp, store and push one parameter live. Returns the applied value.
    pub fn set_param<R: Renderer>(&mut self, renderer: &mut R, param: ShaderParam, value: f64) -> f64 {
        let mut params = self.state.params;
        let applied = params.set(param, value);
        self.state = ShaderEffectState::transition(self.state.active_mode, params);

        let (stage, uniform) = param.binding();
        if let Some(&handle) = self.stages.get(&stage) {
            if let Err(e) = renderer.set_uniform(handle, uniform, applied) {
                warn!(stage = stage.name(), uniform, "failed to push uniform: {}", e);
            }
        }

        self.sync(renderer);
        applied
    }

    /// Remove registered stages and clear the guard so a later mount can
    /// initialize from scratch. Mode and parameters are kept.
    pub fn reset<R: Renderer>(&mut self, renderer: &mut R) {
        for (kind, handle) in std::mem::take(&mut self.stages) {
            if let Err(e) = renderer.remove_stage(handle) {
                warn!(stage = kind.name(), "failed to remove stage: {}", e);
            }
        }
        self.initialized = false;
    }

    fn sync<R: Renderer>(&self, renderer: &mut R) {
        for (&kind, &handle) in &self.stages {
            if let Err(e) = renderer.set_stage_enabled(handle, self.state.stage_enabled(kind)) {
                warn!(stage = kind.name(), "failed to toggle stage: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::HeadlessRenderer;
    use proptest::prelude::*;

    fn initialized() -> (HeadlessRenderer, EffectPipeline) {
        let mut renderer = HeadlessRenderer::default();
        let mut pipeline = EffectPipeline::new();
        assert_eq!(pipeline.initialize(&mut renderer), 5);
        (renderer, pipeline)
    }

    #[test]
    fn test_defaults() {
        let (renderer, pipeline) = initialized();
        let state = pipeline.state();
        assert_eq!(state.active_mode(), EffectMode::Normal);
        assert_eq!(state.params().scanline_intensity, 0.7);
        assert_eq!(state.params().pixelation, 1.5);
        assert_eq!(state.params().sensitivity, 2.0);
        assert_eq!(state.params().bloom_brightness, 0.2);
        assert!(state.bloom_enabled());
        assert_eq!(renderer.enabled_stages(), vec!["wv_bloom"]);

        let bloom = renderer.stage_by_name("wv_bloom").unwrap();
        assert_eq!(bloom.uniforms["sigma"], 2.5);
        assert_eq!(bloom.uniforms["stepSize"], 3.0);
    }

    #[test]
    fn test_modes_mutually_exclusive() {
        let (mut renderer, mut pipeline) = initialized();

        pipeline.set_mode(&mut renderer, EffectMode::Crt);
        assert_eq!(renderer.enabled_stages(), vec!["wv_crt"]);

        pipeline.set_mode(&mut renderer, EffectMode::Thermal);
        assert_eq!(renderer.enabled_stages(), vec!["wv_thermal"]);

        pipeline.set_mode(&mut renderer, EffectMode::Flare);
        let mut enabled = renderer.enabled_stages();
        enabled.sort();
        assert_eq!(enabled, vec!["wv_bloom", "wv_flare"]);

        pipeline.set_mode(&mut renderer, EffectMode::NightVision);
        assert_eq!(renderer.enabled_stages(), vec!["wv_nightvision"]);
    }

    #[test]
    fn test_initialize_is_guarded() {
        let (mut renderer, mut pipeline) = initialized();
        assert_eq!(pipeline.initialize(&mut renderer), 5);
        assert_eq!(renderer.stage_count(), 5);

        pipeline.reset(&mut renderer);
        assert_eq!(renderer.stage_count(), 0);
        assert!(!pipeline.is_initialized());
        pipeline.reset(&mut renderer);

        assert_eq!(pipeline.initialize(&mut renderer), 5);
        assert_eq!(renderer.stage_count(), 5);
    }

    #[test]
    fn test_unavailable_stage_leaves_mode_inert() {
        let mut renderer = HeadlessRenderer::default();
        renderer.refuse_stage("wv_thermal");
        let mut pipeline = EffectPipeline::new();

        assert_eq!(pipeline.initialize(&mut renderer), 4);
        let state = pipeline.set_mode(&mut renderer, EffectMode::Thermal);

        assert_eq!(state.active_mode(), EffectMode::Thermal);
        assert!(renderer.enabled_stages().is_empty());
        assert_eq!(pipeline.set_param(&mut renderer, ShaderParam::Sensitivity, 3.0), 3.0);
    }

    #[test]
    fn test_set_param_clamps_and_pushes_uniform() {
        let (mut renderer, mut pipeline) = initialized();

        assert_eq!(pipeline.set_param(&mut renderer, ShaderParam::ScanlineIntensity, 1.7), 1.0);
        assert_eq!(pipeline.set_param(&mut renderer, ShaderParam::Pixelation, 0.2), 1.0);
        assert_eq!(pipeline.set_param(&mut renderer, ShaderParam::Sensitivity, 2.34), 2.3);
        assert_eq!(pipeline.set_param(&mut renderer, ShaderParam::Pixelation, 3.4), 3.5);

        let crt = renderer.stage_by_name("wv_crt").unwrap();
        assert_eq!(crt.uniforms["scanlineIntensity"], 1.0);
        assert_eq!(crt.uniforms["pixelation"], 3.5);
        assert!(!crt.enabled);
        assert_eq!(renderer.stage_by_name("wv_thermal").unwrap().uniforms["sensitivity"], 2.3);
    }

    #[test]
    fn test_dim_bloom_disabled() {
        let (mut renderer, mut pipeline) = initialized();

        pipeline.set_param(&mut renderer, ShaderParam::BloomBrightness, 0.05);
        assert!(!pipeline.state().bloom_enabled());
        assert!(renderer.enabled_stages().is_empty());

        pipeline.set_param(&mut renderer, ShaderParam::BloomBrightness, 0.1);
        assert!(pipeline.state().bloom_enabled());
        assert_eq!(renderer.stage_by_name("wv_bloom").unwrap().uniforms["brightness"], 0.1);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("nightVision".parse::<EffectMode>().unwrap(), EffectMode::NightVision);
        assert_eq!("nvg".parse::<EffectMode>().unwrap(), EffectMode::NightVision);
        assert!("sepia".parse::<EffectMode>().is_err());
        assert_eq!("bloomBrightness".parse::<ShaderParam>().unwrap(), ShaderParam::BloomBrightness);
        assert_eq!(EffectMode::from_key('4'), Some(EffectMode::Thermal));
        assert_eq!(EffectMode::from_key('9'), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Mode(EffectMode),
        Param(ShaderParam, f64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::sample::select(EffectMode::ALL.to_vec()).prop_map(Op::Mode),
            (proptest::sample::select(ShaderParam::ALL.to_vec()), -1.0f64..10.0)
                .prop_map(|(p, v)| Op::Param(p, v)),
        ]
    }

    proptest! {
        #[test]
        fn prop_stage_flags_follow_transition(ops in proptest::collection::vec(op(), 1..30)) {
            let (mut renderer, mut pipeline) = initialized();

            for op in ops {
                match op {
                    Op::Mode(mode) => { pipeline.set_mode(&mut renderer, mode); }
                    Op::Param(param, value) => { pipeline.set_param(&mut renderer, param, value); }
                }

                let state = *pipeline.state();
                let expected_bloom = matches!(state.active_mode(), EffectMode::Normal | EffectMode::Flare)
                    && state.params().bloom_brightness > BLOOM_FLOOR;
                prop_assert_eq!(state.bloom_enabled(), expected_bloom);

                let mode_stages = renderer
                    .enabled_stages()
                    .into_iter()
                    .filter(|name| *name != "wv_bloom")
                    .count();
                prop_assert!(mode_stages <= 1);
                prop_assert_eq!(mode_stages == 1, state.active_mode() != EffectMode::Normal);
                prop_assert_eq!(renderer.stage_by_name("wv_bloom").unwrap().enabled, expected_bloom);
            }
        }

        #[test]
        fn prop_params_stay_in_bounds(value in proptest::num::f64::ANY) {
            for param in ShaderParam::ALL {
                let spec = param.spec();
                let clamped = spec.clamp(value);
                prop_assert!(clamped >= spec.min && clamped <= spec.max);
            }
        }
    }
}
