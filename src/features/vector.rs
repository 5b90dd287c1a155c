use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::definition::{FeatureDefinition, FeatureKind};
use super::error::FeatureError;

/// One fixed-shape record of feature values for a single unit.
///
/// Values are stored as three arrays in feature order. Global feature indices
/// address byte features first, then short features, then continuous ones.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    unit_index: usize,
    bytes: Vec<i8>,
    shorts: Vec<i16>,
    floats: Vec<f32>,
}

impl FeatureVector {
    /// Unchecked construction; use [`FeatureDefinition::feature_vector`] to validate codes.
    pub(crate) fn from_parts(
        unit_index: usize,
        bytes: Vec<i8>,
        shorts: Vec<i16>,
        floats: Vec<f32>,
    ) -> Self {
        FeatureVector {
            unit_index,
            bytes,
            shorts,
            floats,
        }
    }

    /// Unit this vector describes.
    pub fn unit_index(&self) -> usize {
        self.unit_index
    }

    pub fn byte_values(&self) -> &[i8] {
        &self.bytes
    }

    pub fn short_values(&self) -> &[i16] {
        &self.shorts
    }

    pub fn continuous_values(&self) -> &[f32] {
        &self.floats
    }

    /// Total number of values held.
    pub fn number_of_features(&self) -> usize {
        self.bytes.len() + self.shorts.len() + self.floats.len()
    }

    /// Byte code at global feature index `index`.
    pub fn byte_feature(&self, index: usize) -> Result<i8, FeatureError> {
        self.bytes
            .get(index)
            .copied()
            .ok_or(self.out_of_range(index, FeatureKind::Byte))
    }

    /// Short code at global feature index `index`.
    pub fn short_feature(&self, index: usize) -> Result<i16, FeatureError> {
        index
            .checked_sub(self.bytes.len())
            .and_then(|offset| self.shorts.get(offset))
            .copied()
            .ok_or(self.out_of_range(index, FeatureKind::Short))
    }

    /// Float value at global feature index `index`.
    pub fn continuous_feature(&self, index: usize) -> Result<f32, FeatureError> {
        index
            .checked_sub(self.bytes.len() + self.shorts.len())
            .and_then(|offset| self.floats.get(offset))
            .copied()
            .ok_or(self.out_of_range(index, FeatureKind::Continuous))
    }

    /// Encoded record length in bytes.
    pub fn binary_len(&self) -> usize {
        self.bytes.len() + 2 * self.shorts.len() + 4 * self.floats.len()
    }

    /// Write the record: bytes, then big-endian shorts, then big-endian floats.
    pub fn write_binary<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        for value in &self.bytes {
            out.write_i8(*value)?;
        }
        for value in &self.shorts {
            out.write_i16::<BigEndian>(*value)?;
        }
        for value in &self.floats {
            out.write_f32::<BigEndian>(*value)?;
        }
        Ok(())
    }

    /// Encoded record as an owned buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.binary_len());
        // Writing into a Vec cannot fail.
        let _ = self.write_binary(&mut buf);
        buf
    }

    /// Read one record whose shape is given by `definition`.
    pub fn read_binary<R: Read + ?Sized>(
        input: &mut R,
        definition: &FeatureDefinition,
        unit_index: usize,
    ) -> Result<Self, FeatureError> {
        let what = || format!("feature vector for unit {unit_index}");
        let mut bytes = vec![0i8; definition.number_of_byte_features()];
        input
            .read_i8_into(&mut bytes)
            .map_err(|err| FeatureError::from_read(err, what()))?;
        let mut shorts = vec![0i16; definition.number_of_short_features()];
        input
            .read_i16_into::<BigEndian>(&mut shorts)
            .map_err(|err| FeatureError::from_read(err, what()))?;
        let mut floats = vec![0f32; definition.number_of_continuous_features()];
        input
            .read_f32_into::<BigEndian>(&mut floats)
            .map_err(|err| FeatureError::from_read(err, what()))?;
        Ok(FeatureVector::from_parts(unit_index, bytes, shorts, floats))
    }

    /// Canonical text form, see [`FeatureDefinition::to_feature_string`].
    pub fn to_text(&self, definition: &FeatureDefinition) -> Result<String, FeatureError> {
        definition.to_feature_string(self)
    }

    /// Copy of this vector with extra continuous values appended.
    pub fn with_appended_floats(&self, extra: &[f32]) -> FeatureVector {
        let mut floats = self.floats.clone();
        floats.extend_from_slice(extra);
        FeatureVector::from_parts(self.unit_index, self.bytes.clone(), self.shorts.clone(), floats)
    }

    fn out_of_range(&self, index: usize, kind: FeatureKind) -> FeatureError {
        let byte_end = self.bytes.len();
        let short_end = byte_end + self.shorts.len();
        let (start, end) = match kind {
            FeatureKind::Byte => (0, byte_end),
            FeatureKind::Short => (byte_end, short_end),
            FeatureKind::Continuous => (short_end, short_end + self.floats.len()),
        };
        FeatureError::IndexOutOfRange {
            index,
            section: kind.section(),
            start,
            end,
        }
    }
}
