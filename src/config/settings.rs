use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::header::TimelineKind;
use crate::timeline::ProcessingHeader;
use crate::timeline::waveform::Framing;

pub(super) const DEFAULT_FRAME_SKIP_SECONDS: f64 = 0.005;
pub(super) const DEFAULT_FRAME_SAMPLES: u32 = 80;

/// Settings for producing a timeline from audio.
///
/// Config keys (TOML): `kind`, `frame_skip_seconds`, `frame_samples`, `processing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSettings {
    /// Container kind written into the header.
    #[serde(default = "default_kind")]
    pub kind: TimelineKind,
    /// Nominal frame skip stored as a lookup hint.
    #[serde(default = "default_frame_skip_seconds")]
    pub frame_skip_seconds: f64,
    /// Samples per datagram when no pitchmarks are given.
    #[serde(default = "default_frame_samples")]
    pub frame_samples: u32,
    /// Free-form provenance copied into the processing header.
    #[serde(default)]
    pub processing: BTreeMap<String, String>,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            frame_skip_seconds: default_frame_skip_seconds(),
            frame_samples: default_frame_samples(),
            processing: BTreeMap::new(),
        }
    }
}

impl TimelineSettings {
    /// Replace out-of-range values with defaults.
    pub fn normalized(mut self) -> Self {
        if !self.frame_skip_seconds.is_finite() || self.frame_skip_seconds < 0.0 {
            warn!(
                "frame_skip_seconds {} is invalid; using {DEFAULT_FRAME_SKIP_SECONDS}",
                self.frame_skip_seconds
            );
            self.frame_skip_seconds = DEFAULT_FRAME_SKIP_SECONDS;
        }
        if self.frame_samples == 0 {
            warn!("frame_samples must be positive; using {DEFAULT_FRAME_SAMPLES}");
            self.frame_samples = DEFAULT_FRAME_SAMPLES;
        }
        self
    }

    /// Processing header recording these settings plus the `processing` table.
    pub fn processing_header(&self) -> ProcessingHeader {
        let mut header: ProcessingHeader = self.processing.clone().into_iter().collect();
        for (key, value) in [
            ("frame_samples", self.frame_samples.to_string()),
            ("frame_skip_seconds", self.frame_skip_seconds.to_string()),
        ] {
            if header.get(key).is_none() {
                // Both keys are valid single-line text.
                let _ = header.insert(key, value);
            }
        }
        header
    }

    /// Fixed framing with `frame_samples` per datagram.
    pub fn framing(&self) -> Framing {
        Framing::Fixed {
            frame_samples: self.frame_samples,
        }
    }
}

fn default_kind() -> TimelineKind {
    TimelineKind::Waveform
}

fn default_frame_skip_seconds() -> f64 {
    DEFAULT_FRAME_SKIP_SECONDS
}

fn default_frame_samples() -> u32 {
    DEFAULT_FRAME_SAMPLES
}
