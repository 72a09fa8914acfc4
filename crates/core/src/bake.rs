//! Bake request vocabulary: what is being baked and with which quality
//! settings.
//!
//! Parameters arrive as a flat set of scalars (query string on the wire)
//! and are forwarded to the external baking tool as command-line arguments,
//! so every value that reaches a path or an argument is validated here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Pipeline steps the baking tool understands.
pub const KNOWN_STEPS: &[&str] = &["import", "bake", "apply", "probes", "export"];

/// Shorthand accepted by the tool for every step except light probes.
pub const NO_PROBES_STEPS: &str = "no_probes";

/// Steps after which the tool can dump its intermediate scene.
pub const DUMP_STEPS: &[&str] = &["import", "bake", "denoise", "apply"];

pub const DEFAULT_STEPS: &str = "import,bake,apply,export";
pub const DEFAULT_SAMPLES: u32 = 64;
pub const DEFAULT_RESOLUTION: u32 = 512;
pub const DEFAULT_MARGIN: u32 = 2;

pub const MIN_RESOLUTION: u32 = 32;
pub const MAX_RESOLUTION: u32 = 8192;
pub const MAX_SAMPLES: u32 = 16_384;
pub const MAX_MARGIN: u32 = 64;

/// Maximum length of a `game` or `name` path segment.
pub const MAX_NAME_LEN: usize = 128;

/// Kind of scene being baked. Decides where the output lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakeKind {
    Island,
    IsoScene,
}

impl BakeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Island => "island",
            Self::IsoScene => "iso_scene",
        }
    }

    /// Output subdirectory under the game's model directory.
    pub fn target_dir(self) -> &'static str {
        match self {
            Self::Island => "islands",
            Self::IsoScene => "iso_scenes",
        }
    }
}

impl FromStr for BakeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "island" => Ok(Self::Island),
            "iso_scene" | "iso-scene" => Ok(Self::IsoScene),
            other => Err(CoreError::Validation(format!(
                "unknown bake kind '{other}', expected island or iso_scene"
            ))),
        }
    }
}

/// Denoiser quality passed through to the tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Denoise {
    None,
    #[default]
    Fast,
    Accurate,
}

impl Denoise {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Fast => "FAST",
            Self::Accurate => "ACCURATE",
        }
    }
}

impl FromStr for Denoise {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "FAST" => Ok(Self::Fast),
            "ACCURATE" => Ok(Self::Accurate),
            _ => Err(CoreError::Validation(format!(
                "unknown denoise mode '{s}', expected NONE, FAST or ACCURATE"
            ))),
        }
    }
}

/// Quality settings for one bake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BakeParams {
    /// Comma-separated subset of [`KNOWN_STEPS`], or [`NO_PROBES_STEPS`].
    pub steps: String,
    pub samples: u32,
    /// Lightmap texture size in texels (square, power of two).
    #[serde(alias = "textureSize")]
    pub resolution: u32,
    /// Texel margin around each lightmap island.
    pub margin: u32,
    pub denoise: Denoise,
    /// File name of an HDR environment map inside the HDRI directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdri_rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdri_exposure: Option<f64>,
    /// Step after which the intermediate scene is dumped for debugging.
    /// `none` disables the dump.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_after: Option<String>,
}

impl Default for BakeParams {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_string(),
            samples: DEFAULT_SAMPLES,
            resolution: DEFAULT_RESOLUTION,
            margin: DEFAULT_MARGIN,
            denoise: Denoise::default(),
            hdri: None,
            hdri_rotation: None,
            hdri_exposure: None,
            dump_after: None,
        }
    }
}

impl BakeParams {
    /// Check every field against the ranges the tool accepts.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_steps(&self.steps)?;

        if !(1..=MAX_SAMPLES).contains(&self.samples) {
            return Err(CoreError::Validation(format!(
                "samples must be between 1 and {MAX_SAMPLES}, got {}",
                self.samples
            )));
        }

        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution)
            || !self.resolution.is_power_of_two()
        {
            return Err(CoreError::Validation(format!(
                "resolution must be a power of two between {MIN_RESOLUTION} and {MAX_RESOLUTION}, got {}",
                self.resolution
            )));
        }

        if self.margin > MAX_MARGIN {
            return Err(CoreError::Validation(format!(
                "margin must be at most {MAX_MARGIN}, got {}",
                self.margin
            )));
        }

        if let Some(hdri) = &self.hdri {
            validate_file_name(hdri, "hdri")?;
        }
        validate_finite(self.hdri_rotation, "hdriRotation")?;
        validate_finite(self.hdri_exposure, "hdriExposure")?;

        if let Some(step) = &self.dump_after {
            if step != "none" && !DUMP_STEPS.contains(&step.as_str()) {
                return Err(CoreError::Validation(format!(
                    "dumpAfter must be one of none, {}; got '{step}'",
                    DUMP_STEPS.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// The dump step, if dumping is enabled.
    pub fn dump_step(&self) -> Option<&str> {
        self.dump_after.as_deref().filter(|s| *s != "none")
    }
}

/// One bake: which scene, where it belongs and how to bake it.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeRequest {
    pub kind: BakeKind,
    pub game: String,
    pub name: String,
    pub params: BakeParams,
}

impl BakeRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_name(&self.game, "game")?;
        validate_name(&self.name, "name")?;
        self.params.validate()
    }
}

fn validate_steps(steps: &str) -> Result<(), CoreError> {
    if steps == NO_PROBES_STEPS {
        return Ok(());
    }
    let parts: Vec<&str> = steps.split(',').map(str::trim).collect();
    if parts.iter().all(|p| p.is_empty()) {
        return Err(CoreError::Validation("steps must not be empty".into()));
    }
    if let Some(unknown) = parts.iter().find(|p| !KNOWN_STEPS.contains(p)) {
        return Err(CoreError::Validation(format!(
            "unknown step '{unknown}', expected a subset of {}",
            KNOWN_STEPS.join(",")
        )));
    }
    Ok(())
}

fn validate_finite(value: Option<f64>, field: &str) -> Result<(), CoreError> {
    match value {
        Some(v) if !v.is_finite() => Err(CoreError::Validation(format!(
            "{field} must be a finite number"
        ))),
        _ => Ok(()),
    }
}

fn validate_file_name(value: &str, field: &str) -> Result<(), CoreError> {
    if value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..")
        || value.contains('\0')
    {
        return Err(CoreError::Validation(format!(
            "{field} must be a plain file name, got '{value}'"
        )));
    }
    Ok(())
}

/// Validate a `game` or `name` path segment.
///
/// Segments end up in file paths, so only ASCII letters, digits, `_`, `-`
/// and `.` are allowed, and a leading `.` is rejected.
pub fn validate_name(value: &str, field: &str) -> Result<(), CoreError> {
    if value.is_empty() || value.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "{field} must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    if value.starts_with('.')
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(CoreError::Validation(format!(
            "{field} contains invalid characters: '{value}'"
        )));
    }
    Ok(())
}
