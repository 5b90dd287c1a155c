//! Feature schema: ordered, typed feature slots with their value domains.

use std::collections::HashMap;

use super::error::FeatureError;
use super::vector::FeatureVector;

/// Name of the feature that marks unit boundaries in edge vectors.
pub const EDGE_FEATURE: &str = "edge";
/// Edge value used for the start boundary.
pub const EDGE_START: &str = "start";
/// Edge value used for the end boundary.
pub const EDGE_END: &str = "end";
/// Neutral discrete value used to fill edge vectors.
pub const NULL_VALUE: &str = "0";
/// Weight function recorded when none was given.
pub const NO_WEIGHT_FUNCTION: &str = "none";

const MAX_BYTE_VALUES: usize = 1 << 8;
const MAX_SHORT_VALUES: usize = 1 << 16;

/// Storage class of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Discrete, encoded as a signed 8-bit code.
    Byte,
    /// Discrete, encoded as a signed 16-bit code.
    Short,
    /// Raw 32-bit float.
    Continuous,
}

impl FeatureKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            FeatureKind::Byte => 0,
            FeatureKind::Short => 1,
            FeatureKind::Continuous => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FeatureKind::Byte),
            1 => Some(FeatureKind::Short),
            2 => Some(FeatureKind::Continuous),
            _ => None,
        }
    }

    pub(crate) fn section(self) -> &'static str {
        match self {
            FeatureKind::Byte => "byte",
            FeatureKind::Short => "short",
            FeatureKind::Continuous => "continuous",
        }
    }
}

/// Which boundary an edge vector marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Start of an utterance.
    Start,
    /// End of an utterance.
    End,
}

/// One named feature of a definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSlot {
    name: String,
    kind: FeatureKind,
    values: Vec<String>,
    weight: f32,
    weight_function: String,
}

impl FeatureSlot {
    /// Byte-valued discrete feature.
    pub fn byte<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::discrete(name, FeatureKind::Byte, values)
    }

    /// Short-valued discrete feature.
    pub fn short<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::discrete(name, FeatureKind::Short, values)
    }

    /// Continuous float feature.
    pub fn continuous(name: impl Into<String>) -> Self {
        FeatureSlot {
            name: name.into(),
            kind: FeatureKind::Continuous,
            values: Vec::new(),
            weight: 0.0,
            weight_function: NO_WEIGHT_FUNCTION.to_string(),
        }
    }

    /// Attach a target-cost weight and weight-function tag.
    pub fn with_weight(mut self, weight: f32, weight_function: impl Into<String>) -> Self {
        self.weight = weight;
        self.weight_function = weight_function.into();
        self
    }

    fn discrete<I, S>(name: impl Into<String>, kind: FeatureKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureSlot {
            name: name.into(),
            kind,
            values: values.into_iter().map(Into::into).collect(),
            weight: 0.0,
            weight_function: NO_WEIGHT_FUNCTION.to_string(),
        }
    }

    /// Feature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage class.
    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Declared values, empty for continuous features.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Raw (unnormalized) weight.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Weight-function tag.
    pub fn weight_function(&self) -> &str {
        &self.weight_function
    }

    fn validate(&self) -> Result<(), FeatureError> {
        if !is_token(&self.name) {
            return Err(FeatureError::format(format!(
                "feature name '{}' must be a non-empty token without whitespace",
                self.name
            )));
        }
        if !is_token(&self.weight_function) {
            return Err(FeatureError::format(format!(
                "weight function of '{}' must be a non-empty token without whitespace",
                self.name
            )));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(FeatureError::format(format!(
                "weight {} of '{}' must be finite and non-negative",
                self.weight, self.name
            )));
        }
        let limit = match self.kind {
            FeatureKind::Byte => MAX_BYTE_VALUES,
            FeatureKind::Short => MAX_SHORT_VALUES,
            FeatureKind::Continuous => {
                if !self.values.is_empty() {
                    return Err(FeatureError::format(format!(
                        "continuous feature '{}' cannot declare values",
                        self.name
                    )));
                }
                return Ok(());
            }
        };
        if self.values.is_empty() {
            return Err(FeatureError::format(format!(
                "discrete feature '{}' declares no values",
                self.name
            )));
        }
        if self.values.len() > limit {
            return Err(FeatureError::format(format!(
                "{} feature '{}' declares {} values (max {limit})",
                self.kind.section(),
                self.name,
                self.values.len()
            )));
        }
        for value in &self.values {
            if !is_token(value) || value.contains('|') {
                return Err(FeatureError::format(format!(
                    "value '{value}' of '{}' must be a non-empty token without '|'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Immutable feature schema shared by every vector derived from it.
#[derive(Clone, Debug)]
pub struct FeatureDefinition {
    slots: Vec<FeatureSlot>,
    byte_count: usize,
    short_count: usize,
    names: HashMap<String, usize>,
    value_positions: Vec<HashMap<String, usize>>,
}

impl PartialEq for FeatureDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
    }
}

impl FeatureDefinition {
    /// Build a definition from slots ordered byte, then short, then continuous.
    pub fn new(slots: Vec<FeatureSlot>) -> Result<Self, FeatureError> {
        let mut names = HashMap::with_capacity(slots.len());
        let mut value_positions = Vec::with_capacity(slots.len());
        let mut byte_count = 0;
        let mut short_count = 0;
        let mut previous = FeatureKind::Byte;
        for (index, slot) in slots.iter().enumerate() {
            slot.validate()?;
            if kind_rank(slot.kind) < kind_rank(previous) {
                return Err(FeatureError::format(format!(
                    "feature '{}' is {} but follows a {} feature",
                    slot.name,
                    slot.kind.section(),
                    previous.section()
                )));
            }
            previous = slot.kind;
            match slot.kind {
                FeatureKind::Byte => byte_count += 1,
                FeatureKind::Short => short_count += 1,
                FeatureKind::Continuous => {}
            }
            if names.insert(slot.name.clone(), index).is_some() {
                return Err(FeatureError::format(format!(
                    "feature name '{}' is declared twice",
                    slot.name
                )));
            }
            let mut positions = HashMap::with_capacity(slot.values.len());
            for (position, value) in slot.values.iter().enumerate() {
                if positions.insert(value.clone(), position).is_some() {
                    return Err(FeatureError::format(format!(
                        "value '{value}' is declared twice for feature '{}'",
                        slot.name
                    )));
                }
            }
            value_positions.push(positions);
        }
        Ok(FeatureDefinition {
            slots,
            byte_count,
            short_count,
            names,
            value_positions,
        })
    }

    /// All slots in feature order.
    pub fn slots(&self) -> &[FeatureSlot] {
        &self.slots
    }

    /// Total number of features.
    pub fn number_of_features(&self) -> usize {
        self.slots.len()
    }

    /// Number of byte-valued features (indices `0..n`).
    pub fn number_of_byte_features(&self) -> usize {
        self.byte_count
    }

    /// Number of short-valued features.
    pub fn number_of_short_features(&self) -> usize {
        self.short_count
    }

    /// Number of continuous features.
    pub fn number_of_continuous_features(&self) -> usize {
        self.slots.len() - self.byte_count - self.short_count
    }

    /// Byte length of one encoded feature vector.
    pub fn record_len(&self) -> usize {
        self.byte_count + 2 * self.short_count + 4 * self.number_of_continuous_features()
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Result<&FeatureSlot, FeatureError> {
        self.slots.get(index).ok_or(FeatureError::IndexOutOfRange {
            index,
            section: "any",
            start: 0,
            end: self.slots.len(),
        })
    }

    /// Feature names in order.
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    /// Name of the feature at `index`.
    pub fn feature_name(&self, index: usize) -> Result<&str, FeatureError> {
        self.slot(index).map(FeatureSlot::name)
    }

    /// Index of the named feature.
    pub fn feature_index(&self, name: &str) -> Result<usize, FeatureError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| FeatureError::UnknownFeature(name.to_string()))
    }

    /// Whether a feature with this name exists.
    pub fn has_feature(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Storage class of the feature at `index`.
    pub fn kind_of(&self, index: usize) -> Result<FeatureKind, FeatureError> {
        self.slot(index).map(FeatureSlot::kind)
    }

    /// Raw weight of the feature at `index`.
    pub fn weight(&self, index: usize) -> Result<f32, FeatureError> {
        self.slot(index).map(FeatureSlot::weight)
    }

    /// Weight-function tag of the feature at `index`.
    pub fn weight_function(&self, index: usize) -> Result<&str, FeatureError> {
        self.slot(index).map(FeatureSlot::weight_function)
    }

    /// Weights scaled to sum to one; all zeros if every weight is zero.
    pub fn normalized_weights(&self) -> Vec<f32> {
        let sum: f32 = self.slots.iter().map(|slot| slot.weight).sum();
        self.slots
            .iter()
            .map(|slot| if sum > 0.0 { slot.weight / sum } else { 0.0 })
            .collect()
    }

    /// Declared values of the feature at `index`.
    pub fn possible_values(&self, index: usize) -> Result<&[String], FeatureError> {
        self.slot(index).map(FeatureSlot::values)
    }

    /// Whether `value` is declared for the feature at `index`.
    pub fn has_feature_value(&self, index: usize, value: &str) -> bool {
        self.value_positions
            .get(index)
            .is_some_and(|positions| positions.contains_key(value))
    }

    /// Encode `value` as the byte code of the feature at `index`.
    pub fn value_as_byte(&self, index: usize, value: &str) -> Result<i8, FeatureError> {
        self.require_section(index, FeatureKind::Byte)?;
        let position = self.value_position(index, value)?;
        Ok(position as u8 as i8)
    }

    /// Encode `value` as the short code of the feature at `index`.
    pub fn value_as_short(&self, index: usize, value: &str) -> Result<i16, FeatureError> {
        self.require_section(index, FeatureKind::Short)?;
        let position = self.value_position(index, value)?;
        Ok(position as u16 as i16)
    }

    /// Decode a discrete code of the feature at `index` back to its value string.
    pub fn value_as_string(&self, index: usize, code: i32) -> Result<&str, FeatureError> {
        let slot = self.slot(index)?;
        let position = match slot.kind {
            FeatureKind::Byte => code_position_byte(code),
            FeatureKind::Short => code_position_short(code),
            FeatureKind::Continuous => None,
        };
        position
            .and_then(|position| slot.values.get(position))
            .map(String::as_str)
            .ok_or(FeatureError::InvalidCode {
                feature: slot.name.clone(),
                code,
                count: slot.values.len(),
            })
    }

    /// Schema equality ignoring weights.
    pub fn same_features_as(&self, other: &FeatureDefinition) -> bool {
        self.slots.len() == other.slots.len()
            && self.slots.iter().zip(&other.slots).all(|(a, b)| {
                a.name == b.name && a.kind == b.kind && a.values == b.values
            })
    }

    /// Build a validated vector from raw arrays.
    pub fn feature_vector(
        &self,
        unit_index: usize,
        bytes: Vec<i8>,
        shorts: Vec<i16>,
        floats: Vec<f32>,
    ) -> Result<FeatureVector, FeatureError> {
        let found = bytes.len() + shorts.len() + floats.len();
        if bytes.len() != self.byte_count
            || shorts.len() != self.short_count
            || floats.len() != self.number_of_continuous_features()
        {
            return Err(FeatureError::FieldCountMismatch {
                expected: self.number_of_features(),
                found,
            });
        }
        let vector = FeatureVector::from_parts(unit_index, bytes, shorts, floats);
        self.check_codes(&vector)?;
        Ok(vector)
    }

    /// Parse a whitespace-separated line of feature values.
    ///
    /// Discrete features are given as value strings, continuous ones as numbers.
    pub fn to_feature_vector(
        &self,
        unit_index: usize,
        line: &str,
    ) -> Result<FeatureVector, FeatureError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != self.number_of_features() {
            return Err(FeatureError::FieldCountMismatch {
                expected: self.number_of_features(),
                found: tokens.len(),
            });
        }
        let mut bytes = Vec::with_capacity(self.byte_count);
        let mut shorts = Vec::with_capacity(self.short_count);
        let mut floats = Vec::with_capacity(self.number_of_continuous_features());
        for (index, token) in tokens.into_iter().enumerate() {
            match self.slots[index].kind {
                FeatureKind::Byte => bytes.push(self.value_as_byte(index, token)?),
                FeatureKind::Short => shorts.push(self.value_as_short(index, token)?),
                FeatureKind::Continuous => {
                    let value = token.parse::<f32>().map_err(|err| {
                        FeatureError::format(format!(
                            "continuous feature '{}' has non-numeric value '{token}': {err}",
                            self.slots[index].name
                        ))
                    })?;
                    floats.push(value);
                }
            }
        }
        Ok(FeatureVector::from_parts(unit_index, bytes, shorts, floats))
    }

    /// Render a vector as value strings separated by single spaces.
    pub fn to_feature_string(&self, vector: &FeatureVector) -> Result<String, FeatureError> {
        self.check_shape(vector)?;
        let mut out = Vec::with_capacity(self.number_of_features());
        for (index, code) in vector.byte_values().iter().enumerate() {
            out.push(self.value_as_string(index, i32::from(*code))?.to_string());
        }
        for (offset, code) in vector.short_values().iter().enumerate() {
            let index = self.byte_count + offset;
            out.push(self.value_as_string(index, i32::from(*code))?.to_string());
        }
        for value in vector.continuous_values() {
            out.push(value.to_string());
        }
        Ok(out.join(" "))
    }

    /// Boundary vector: discrete features at their `"0"` value, the edge feature at start or end.
    pub fn edge_vector(&self, unit_index: usize, edge: Edge) -> Result<FeatureVector, FeatureError> {
        let edge_index = self.feature_index(EDGE_FEATURE)?;
        let edge_value = match edge {
            Edge::Start => EDGE_START,
            Edge::End => EDGE_END,
        };
        if edge_index >= self.byte_count {
            return Err(FeatureError::IndexOutOfRange {
                index: edge_index,
                section: FeatureKind::Byte.section(),
                start: 0,
                end: self.byte_count,
            });
        }
        let mut bytes = Vec::with_capacity(self.byte_count);
        for index in 0..self.byte_count {
            let value = if index == edge_index { edge_value } else { NULL_VALUE };
            bytes.push(self.value_as_byte(index, value)?);
        }
        let mut shorts = Vec::with_capacity(self.short_count);
        for offset in 0..self.short_count {
            shorts.push(self.value_as_short(self.byte_count + offset, NULL_VALUE)?);
        }
        let floats = vec![0.0; self.number_of_continuous_features()];
        Ok(FeatureVector::from_parts(unit_index, bytes, shorts, floats))
    }

    /// Count the discrete features on which two vectors agree.
    pub fn common_discrete_features(
        &self,
        a: &FeatureVector,
        b: &FeatureVector,
    ) -> Result<usize, FeatureError> {
        self.check_shape(a)?;
        self.check_shape(b)?;
        let bytes = a
            .byte_values()
            .iter()
            .zip(b.byte_values())
            .filter(|(x, y)| x == y)
            .count();
        let shorts = a
            .short_values()
            .iter()
            .zip(b.short_values())
            .filter(|(x, y)| x == y)
            .count();
        Ok(bytes + shorts)
    }

    /// Every discrete code of `vector` must index its feature's value list.
    pub(crate) fn check_codes(&self, vector: &FeatureVector) -> Result<(), FeatureError> {
        for (index, code) in vector.byte_values().iter().enumerate() {
            self.value_as_string(index, i32::from(*code))?;
        }
        for (offset, code) in vector.short_values().iter().enumerate() {
            self.value_as_string(self.byte_count + offset, i32::from(*code))?;
        }
        Ok(())
    }

    pub(crate) fn check_shape(&self, vector: &FeatureVector) -> Result<(), FeatureError> {
        if vector.byte_values().len() != self.byte_count
            || vector.short_values().len() != self.short_count
            || vector.continuous_values().len() != self.number_of_continuous_features()
        {
            return Err(FeatureError::FieldCountMismatch {
                expected: self.number_of_features(),
                found: vector.number_of_features(),
            });
        }
        Ok(())
    }

    pub(crate) fn section_range(&self, kind: FeatureKind) -> (usize, usize) {
        match kind {
            FeatureKind::Byte => (0, self.byte_count),
            FeatureKind::Short => (self.byte_count, self.byte_count + self.short_count),
            FeatureKind::Continuous => (self.byte_count + self.short_count, self.slots.len()),
        }
    }

    fn require_section(&self, index: usize, kind: FeatureKind) -> Result<(), FeatureError> {
        let (start, end) = self.section_range(kind);
        if index < start || index >= end {
            return Err(FeatureError::IndexOutOfRange {
                index,
                section: kind.section(),
                start,
                end,
            });
        }
        Ok(())
    }

    fn value_position(&self, index: usize, value: &str) -> Result<usize, FeatureError> {
        self.value_positions[index]
            .get(value)
            .copied()
            .ok_or_else(|| FeatureError::UnknownValue {
                feature: self.slots[index].name.clone(),
                value: value.to_string(),
            })
    }
}

fn kind_rank(kind: FeatureKind) -> u8 {
    kind.tag()
}

fn code_position_byte(code: i32) -> Option<usize> {
    i8::try_from(code).ok().map(|code| code as u8 as usize)
}

fn code_position_short(code: i32) -> Option<usize> {
    i16::try_from(code).ok().map(|code| code as u16 as usize)
}

fn is_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone_definition() -> FeatureDefinition {
        FeatureDefinition::new(vec![
            FeatureSlot::byte("edge", ["0", "start", "end"]),
            FeatureSlot::byte("phone", ["0", "a", "b"]).with_weight(10.0, "none"),
            FeatureSlot::short("word", ["0", "hello", "world"]),
            FeatureSlot::continuous("unit_duration").with_weight(1000.0, "linear"),
        ])
        .unwrap()
    }

    #[test]
    fn counts_follow_slot_order() {
        let def = phone_definition();
        assert_eq!(def.number_of_byte_features(), 2);
        assert_eq!(def.number_of_short_features(), 1);
        assert_eq!(def.number_of_continuous_features(), 1);
        assert_eq!(def.record_len(), 2 + 2 + 4);
        assert_eq!(def.feature_index("word").unwrap(), 2);
    }

    #[test]
    fn unknown_feature_and_value_are_named_errors() {
        let def = phone_definition();
        assert!(matches!(
            def.feature_index("stress"),
            Err(FeatureError::UnknownFeature(name)) if name == "stress"
        ));
        assert!(matches!(
            def.value_as_byte(1, "z"),
            Err(FeatureError::UnknownValue { .. })
        ));
    }

    #[test]
    fn value_as_short_rejects_byte_index() {
        let def = phone_definition();
        assert!(matches!(
            def.value_as_short(0, "0"),
            Err(FeatureError::IndexOutOfRange { section: "short", .. })
        ));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let err = FeatureDefinition::new(vec![
            FeatureSlot::byte("phone", ["a"]),
            FeatureSlot::continuous("phone"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn out_of_order_kinds_are_rejected() {
        let err = FeatureDefinition::new(vec![
            FeatureSlot::continuous("f0"),
            FeatureSlot::byte("phone", ["a"]),
        ])
        .unwrap_err();
        assert!(matches!(err, FeatureError::Format(_)));
    }

    #[test]
    fn large_byte_value_lists_wrap_to_negative_codes() {
        let values: Vec<String> = (0..200).map(|v| format!("v{v}")).collect();
        let def = FeatureDefinition::new(vec![FeatureSlot::byte("big", values)]).unwrap();
        let code = def.value_as_byte(0, "v150").unwrap();
        assert!(code < 0);
        assert_eq!(def.value_as_string(0, i32::from(code)).unwrap(), "v150");
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let def = phone_definition();
        let sum: f32 = def.normalized_weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn edge_vector_marks_boundary() {
        let def = phone_definition();
        let start = def.edge_vector(7, Edge::Start).unwrap();
        assert_eq!(start.unit_index(), 7);
        assert_eq!(def.to_feature_string(&start).unwrap(), "start 0 0 0");
        let end = def.edge_vector(8, Edge::End).unwrap();
        assert_eq!(def.common_discrete_features(&start, &end).unwrap(), 2);
    }

    #[test]
    fn text_line_round_trips() {
        let def = phone_definition();
        let line = "0   b\tworld 0.25";
        let vector = def.to_feature_vector(3, line).unwrap();
        assert_eq!(vector.byte_values(), &[0, 2]);
        assert_eq!(vector.short_values(), &[2]);
        assert_eq!(def.to_feature_string(&vector).unwrap(), "0 b world 0.25");
    }

    #[test]
    fn text_line_with_wrong_field_count_fails() {
        let def = phone_definition();
        assert!(matches!(
            def.to_feature_vector(0, "0 a hello"),
            Err(FeatureError::FieldCountMismatch { expected: 4, found: 3 })
        ));
    }

    #[test]
    fn feature_vector_rejects_invalid_code() {
        let def = phone_definition();
        let err = def.feature_vector(0, vec![0, 5], vec![0], vec![0.0]).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidCode { code: 5, .. }));
    }
}
