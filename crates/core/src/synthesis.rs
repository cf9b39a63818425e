//! Synthesis request input, validation, and normalization.
//!
//! [`SynthesisInput`] mirrors the JSON body of `POST /synthesize`.
//! [`SynthesisInput::validate`] turns it into an immutable
//! [`SynthesisRequest`] or rejects it with [`CoreError::Validation`] before
//! any job exists.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults and bounds
// ---------------------------------------------------------------------------

/// Default classifier-free guidance scale.
pub const DEFAULT_CFG_SCALE: f64 = 2.0;

/// Default number of diffusion steps.
pub const DEFAULT_STEPS: u32 = 10;

/// Seed value requesting a fresh random seed per call.
pub const RANDOM_SEED: i64 = -1;

/// Upper bound on the guidance scale.
pub const MAX_CFG_SCALE: f64 = 20.0;

/// Upper bound on the step count.
pub const MAX_STEPS: u32 = 200;

/// Upper bound on the text length, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Adapter name that clients send to mean "no adapter selected".
pub const NO_ADAPTER_SENTINEL: &str = "None";

fn default_cfg_scale() -> f64 {
    DEFAULT_CFG_SCALE
}

fn default_steps() -> i64 {
    DEFAULT_STEPS as i64
}

fn default_seed() -> i64 {
    RANDOM_SEED
}

fn default_async_mode() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// Raw synthesis parameters as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisInput {
    pub text: String,
    #[serde(default)]
    pub lora_name: Option<String>,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default = "default_steps")]
    pub steps: i64,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub ref_audio_path: Option<String>,
    #[serde(default)]
    pub ref_text: Option<String>,
    #[serde(default = "default_async_mode")]
    pub async_mode: bool,
}

impl SynthesisInput {
    /// Build an input with defaults for everything but the text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lora_name: None,
            cfg_scale: DEFAULT_CFG_SCALE,
            steps: DEFAULT_STEPS as i64,
            seed: RANDOM_SEED,
            ref_audio_path: None,
            ref_text: None,
            async_mode: true,
        }
    }

    /// Validate every field and produce the normalized request.
    ///
    /// Adapter existence is not checked here; callers resolve
    /// [`SynthesisRequest::lora_name`] against their adapter catalog.
    pub fn validate(self) -> Result<SynthesisRequest, CoreError> {
        if self.text.trim().is_empty() {
            return Err(CoreError::Validation("text must not be empty".into()));
        }
        let chars = self.text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(CoreError::Validation(format!(
                "text must not exceed {MAX_TEXT_CHARS} characters (got {chars})"
            )));
        }

        if !self.cfg_scale.is_finite() || self.cfg_scale <= 0.0 || self.cfg_scale > MAX_CFG_SCALE
        {
            return Err(CoreError::Validation(format!(
                "cfg_scale must be greater than 0 and at most {MAX_CFG_SCALE}"
            )));
        }

        if self.steps < 1 || self.steps > MAX_STEPS as i64 {
            return Err(CoreError::Validation(format!(
                "steps must be between 1 and {MAX_STEPS}"
            )));
        }

        if self.seed < RANDOM_SEED {
            return Err(CoreError::Validation(
                "seed must be -1 (random) or a non-negative integer".into(),
            ));
        }

        let voice_clone = match (non_blank(self.ref_audio_path), non_blank(self.ref_text)) {
            (Some(audio), Some(transcript)) => Some(VoiceClone {
                ref_audio_path: PathBuf::from(audio),
                ref_text: transcript,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(CoreError::Validation(
                    "ref_text is required when ref_audio_path is given".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(CoreError::Validation(
                    "ref_audio_path is required when ref_text is given".into(),
                ))
            }
        };

        Ok(SynthesisRequest {
            text: self.text,
            lora_name: normalize_adapter_name(self.lora_name),
            cfg_scale: self.cfg_scale,
            steps: self.steps as u32,
            seed: self.seed,
            voice_clone,
        })
    }
}

/// Collapse the "no adapter" spellings (absent, blank, sentinel) to `None`.
pub fn normalize_adapter_name(name: Option<String>) -> Option<String> {
    let name = non_blank(name)?;
    if name == NO_ADAPTER_SENTINEL {
        None
    } else {
        Some(name)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Normalized request
// ---------------------------------------------------------------------------

/// Reference audio plus its transcript for voice cloning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceClone {
    pub ref_audio_path: PathBuf,
    pub ref_text: String,
}

/// Validated, immutable synthesis parameters attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    /// Selected adapter, `None` for the base model.
    pub lora_name: Option<String>,
    pub cfg_scale: f64,
    pub steps: u32,
    /// `-1` requests a fresh random seed per call.
    pub seed: i64,
    pub voice_clone: Option<VoiceClone>,
}

impl SynthesisRequest {
    /// The seed to use for one generation call.
    ///
    /// A random seed is drawn on every call when the request asked for one,
    /// otherwise the requested seed is returned unchanged.
    pub fn resolve_seed(&self) -> u64 {
        if self.seed == RANDOM_SEED {
            rand::random::<u32>() as u64
        } else {
            self.seed as u64
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
