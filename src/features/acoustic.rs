//! Per-unit acoustic features appended to an existing schema.

use tracing::{debug, warn};

use super::definition::FeatureDefinition;
use super::error::FeatureError;
use super::vector::FeatureVector;
use crate::units::Unit;

/// Unit duration in seconds.
pub const UNIT_DURATION: &str = "unit_duration";
/// Natural log of the unit's mean F0 in Hz.
pub const UNIT_LOGF0: &str = "unit_logf0";
/// Stored in place of values that cannot be computed.
pub const SENTINEL: f32 = 0.0;

/// Measured acoustics of one unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitAcoustics {
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Mean fundamental frequency in Hz; zero or negative when unvoiced.
    pub f0_hz: f64,
}

impl UnitAcoustics {
    /// Acoustics of `unit`, whose times are given at `sample_rate`.
    pub fn for_unit(unit: &Unit, sample_rate: u32, f0_hz: f64) -> Self {
        let duration_seconds = if sample_rate == 0 {
            f64::NAN
        } else {
            f64::from(unit.duration) / f64::from(sample_rate)
        };
        UnitAcoustics {
            duration_seconds,
            f0_hz,
        }
    }
}

/// Extends vectors of a base schema with [`UNIT_DURATION`] and [`UNIT_LOGF0`].
#[derive(Debug)]
pub struct AcousticFeatureExtender {
    base: FeatureDefinition,
    extended: FeatureDefinition,
    sanitized: usize,
}

impl AcousticFeatureExtender {
    /// Fails if `base` already declares either acoustic feature.
    pub fn new(base: &FeatureDefinition) -> Result<Self, FeatureError> {
        let extended = base.extended_with(&[UNIT_DURATION, UNIT_LOGF0])?;
        Ok(AcousticFeatureExtender {
            base: base.clone(),
            extended,
            sanitized: 0,
        })
    }

    /// Schema of the produced vectors.
    pub fn extended_definition(&self) -> &FeatureDefinition {
        &self.extended
    }

    /// Number of values replaced by [`SENTINEL`] so far.
    pub fn sanitized_count(&self) -> usize {
        self.sanitized
    }

    /// Append acoustic values to one base vector.
    pub fn extend(
        &mut self,
        vector: &FeatureVector,
        acoustics: UnitAcoustics,
    ) -> Result<FeatureVector, FeatureError> {
        self.base.check_shape(vector)?;
        let duration = self.finite_or_sentinel(acoustics.duration_seconds);
        let logf0 = if acoustics.duration_seconds == 0.0 && acoustics.f0_hz <= 0.0 {
            // Boundary units carry no pitch.
            SENTINEL
        } else if acoustics.f0_hz > 0.0 {
            self.finite_or_sentinel(acoustics.f0_hz.ln())
        } else {
            self.sanitized += 1;
            SENTINEL
        };
        Ok(vector.with_appended_floats(&[duration, logf0]))
    }

    /// Extend a whole file's worth of vectors, reporting sanitized values once.
    pub fn extend_all(
        &mut self,
        vectors: &[FeatureVector],
        acoustics: &[UnitAcoustics],
    ) -> Result<Vec<FeatureVector>, FeatureError> {
        if vectors.len() != acoustics.len() {
            return Err(FeatureError::FieldCountMismatch {
                expected: vectors.len(),
                found: acoustics.len(),
            });
        }
        let before = self.sanitized;
        let extended = vectors
            .iter()
            .zip(acoustics)
            .map(|(vector, acoustics)| self.extend(vector, *acoustics))
            .collect::<Result<Vec<_>, _>>()?;
        let replaced = self.sanitized - before;
        if replaced > 0 {
            warn!(
                "Replaced {replaced} non-finite acoustic values with {SENTINEL} across {} units",
                vectors.len()
            );
        } else {
            debug!("Extended {} vectors with acoustic features", vectors.len());
        }
        Ok(extended)
    }

    fn finite_or_sentinel(&mut self, value: f64) -> f32 {
        let narrowed = value as f32;
        if narrowed.is_finite() {
            narrowed
        } else {
            self.sanitized += 1;
            SENTINEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSlot;

    fn base() -> FeatureDefinition {
        FeatureDefinition::new(vec![
            FeatureSlot::byte("edge", ["0", "start", "end"]),
            FeatureSlot::byte("phone", ["0", "a"]),
        ])
        .unwrap()
    }

    #[test]
    fn appends_duration_and_log_f0() {
        let def = base();
        let mut extender = AcousticFeatureExtender::new(&def).unwrap();
        let vector = def.feature_vector(0, vec![0, 1], vec![], vec![]).unwrap();
        let unit = Unit::new(0, 0, 1600);
        let extended = extender
            .extend(&vector, UnitAcoustics::for_unit(&unit, 16_000, 100.0))
            .unwrap();
        let ext_def = extender.extended_definition();
        let duration = extended
            .continuous_feature(ext_def.feature_index(UNIT_DURATION).unwrap())
            .unwrap();
        let logf0 = extended
            .continuous_feature(ext_def.feature_index(UNIT_LOGF0).unwrap())
            .unwrap();
        assert!((duration - 0.1).abs() < 1e-6);
        assert!((logf0 - 100f32.ln()).abs() < 1e-5);
        assert_eq!(extender.sanitized_count(), 0);
    }

    #[test]
    fn unvoiced_unit_gets_sentinel_and_is_counted() {
        let def = base();
        let mut extender = AcousticFeatureExtender::new(&def).unwrap();
        let vector = def.feature_vector(0, vec![0, 1], vec![], vec![]).unwrap();
        let extended = extender
            .extend(
                &vector,
                UnitAcoustics {
                    duration_seconds: 0.05,
                    f0_hz: 0.0,
                },
            )
            .unwrap();
        assert_eq!(extended.continuous_values(), &[0.05, SENTINEL]);
        assert_eq!(extender.sanitized_count(), 1);
    }

    #[test]
    fn edge_units_are_not_counted() {
        let def = base();
        let mut extender = AcousticFeatureExtender::new(&def).unwrap();
        let edge = def.edge_vector(0, crate::features::Edge::Start).unwrap();
        let extended = extender
            .extend(
                &edge,
                UnitAcoustics {
                    duration_seconds: 0.0,
                    f0_hz: 0.0,
                },
            )
            .unwrap();
        assert_eq!(extended.continuous_values(), &[0.0, 0.0]);
        assert_eq!(extender.sanitized_count(), 0);
    }

    #[test]
    fn schema_with_acoustic_features_cannot_be_extended_again() {
        let def = base().extended_with(&[UNIT_DURATION]).unwrap();
        assert!(matches!(
            AcousticFeatureExtender::new(&def),
            Err(FeatureError::Format(_))
        ));
    }

    #[test]
    fn extend_all_requires_matching_lengths() {
        let def = base();
        let mut extender = AcousticFeatureExtender::new(&def).unwrap();
        let vector = def.feature_vector(0, vec![0, 1], vec![], vec![]).unwrap();
        assert!(extender.extend_all(&[vector], &[]).is_err());
    }
}
