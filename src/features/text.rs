//! Human-editable text form of a feature definition.
//!
//! ```text
//! # comment
//! 2 0 1
//! 0 none a x|y
//! 0 none b p|q|r
//! 1 linear c float
//! ```
//!
//! Weight columns are optional per line; a line without them parses to weight 0.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use super::definition::{FeatureDefinition, FeatureKind, FeatureSlot, NO_WEIGHT_FUNCTION};
use super::error::FeatureError;

/// Marker used in place of a value list for continuous features.
pub const CONTINUOUS_MARKER: &str = "float";
/// Weight function given to features appended through [`FeatureDefinition::extended_with`].
pub const LINEAR_WEIGHT_FUNCTION: &str = "linear";

const DISCRETE_PRIORITY: &[&str] = &[
    "phone",
    "ph_vc",
    "prev_phone",
    "next_phone",
    "stressed",
    "syl_break",
    "prev_syl_break",
    "next_is_pause",
    "prev_is_pause",
];
const DISCRETE_PHONOLOGY_SUFFIXES: &[&str] = &[
    "cplace", "ctype", "cvox", "vfront", "vheight", "vlng", "vrnd", "vc",
];

impl FeatureDefinition {
    /// Parse the text form.
    pub fn parse_text(text: &str) -> Result<Self, FeatureError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| FeatureError::format("missing feature count header"))?;
        let counts = parse_counts(header_line, header)?;
        let expected = counts
            .iter()
            .try_fold(0usize, |total, count| total.checked_add(*count))
            .ok_or_else(|| {
                FeatureError::format(format!("line {header_line}: feature counts overflow"))
            })?;
        let kinds = [FeatureKind::Byte, FeatureKind::Short, FeatureKind::Continuous];

        // Each slot needs its own line, so the text bounds the allocation.
        let mut slots = Vec::with_capacity(expected.min(text.lines().count()));
        for (kind, count) in kinds.into_iter().zip(counts) {
            for _ in 0..count {
                let (line_number, line) = lines.next().ok_or_else(|| {
                    FeatureError::format(format!(
                        "header declares {expected} features but only {} lines follow",
                        slots.len()
                    ))
                })?;
                slots.push(parse_slot(line_number, line, kind)?);
            }
        }
        if let Some((line_number, _)) = lines.next() {
            return Err(FeatureError::format(format!(
                "line {line_number}: more feature lines than the {expected} declared"
            )));
        }
        FeatureDefinition::new(slots)
    }

    /// Parse the text form from a reader.
    pub fn read_text<R: BufRead>(input: R) -> Result<Self, FeatureError> {
        let mut text = String::new();
        for line in input.lines() {
            let line = line.map_err(|err| FeatureError::from_read(err, "feature definition text"))?;
            text.push_str(&line);
            text.push('\n');
        }
        Self::parse_text(&text)
    }

    /// Write the text form, optionally without weight columns.
    pub fn write_text<W: Write + ?Sized>(&self, out: &mut W, include_weights: bool) -> io::Result<()> {
        out.write_all(self.to_text_string(include_weights).as_bytes())
    }

    /// Text form as a string.
    pub fn to_text_string(&self, include_weights: bool) -> String {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} {} {}",
            self.number_of_byte_features(),
            self.number_of_short_features(),
            self.number_of_continuous_features()
        );
        for slot in self.slots() {
            push_slot_line(&mut text, slot, include_weights);
        }
        text
    }

    /// Emit a hand-tunable weights file with default weights per feature.
    ///
    /// The output parses back with [`FeatureDefinition::parse_text`].
    pub fn generate_feature_weights_file<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let mut text = String::from(
            "# Default target-cost weights. Edit the first column to tune them.\n",
        );
        let _ = writeln!(
            text,
            "{} {} {}",
            self.number_of_byte_features(),
            self.number_of_short_features(),
            self.number_of_continuous_features()
        );
        for slot in self.slots() {
            let (weight, function) = default_weight(slot);
            let weighted = slot.clone().with_weight(weight, function);
            push_slot_line(&mut text, &weighted, true);
        }
        out.write_all(text.as_bytes())
    }

    /// New definition with extra continuous features appended after the existing ones.
    ///
    /// Fails with [`FeatureError::Format`] if a name is already taken.
    pub fn extended_with(&self, extra: &[&str]) -> Result<Self, FeatureError> {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} {} {}",
            self.number_of_byte_features(),
            self.number_of_short_features(),
            self.number_of_continuous_features() + extra.len()
        );
        for slot in self.slots() {
            push_slot_line(&mut text, slot, true);
        }
        for name in extra {
            let slot = FeatureSlot::continuous(*name).with_weight(0.0, LINEAR_WEIGHT_FUNCTION);
            push_slot_line(&mut text, &slot, true);
        }
        Self::parse_text(&text)
    }
}

fn parse_counts(line_number: usize, line: &str) -> Result<[usize; 3], FeatureError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(FeatureError::format(format!(
            "line {line_number}: expected '<byte> <short> <continuous>' counts, found '{line}'"
        )));
    }
    let mut counts = [0usize; 3];
    for (slot, token) in counts.iter_mut().zip(tokens) {
        *slot = token.parse().map_err(|_| {
            FeatureError::format(format!(
                "line {line_number}: feature count '{token}' is not a non-negative integer"
            ))
        })?;
    }
    Ok(counts)
}

fn parse_slot(line_number: usize, line: &str, kind: FeatureKind) -> Result<FeatureSlot, FeatureError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (weight, function, name, values) = match tokens.as_slice() {
        [weight, function, name, values] => {
            let weight: f32 = weight.parse().map_err(|_| {
                FeatureError::format(format!(
                    "line {line_number}: weight '{weight}' is not a number"
                ))
            })?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(FeatureError::format(format!(
                    "line {line_number}: weight {weight} must be finite and non-negative"
                )));
            }
            (weight, *function, *name, *values)
        }
        [name, values] => (0.0, NO_WEIGHT_FUNCTION, *name, *values),
        _ => {
            return Err(FeatureError::format(format!(
                "line {line_number}: expected '[weight function] name values', found '{line}'"
            )));
        }
    };

    let slot = match kind {
        FeatureKind::Continuous => {
            if values != CONTINUOUS_MARKER {
                return Err(FeatureError::format(format!(
                    "line {line_number}: continuous feature '{name}' must end in '{CONTINUOUS_MARKER}'"
                )));
            }
            FeatureSlot::continuous(name)
        }
        FeatureKind::Byte | FeatureKind::Short => {
            let list: Vec<&str> = values.split('|').collect();
            if list.iter().any(|value| value.is_empty()) {
                return Err(FeatureError::format(format!(
                    "line {line_number}: feature '{name}' has an empty value"
                )));
            }
            if kind == FeatureKind::Byte {
                FeatureSlot::byte(name, list)
            } else {
                FeatureSlot::short(name, list)
            }
        }
    };
    Ok(slot.with_weight(weight, function))
}

fn push_slot_line(text: &mut String, slot: &FeatureSlot, include_weights: bool) {
    if include_weights {
        let _ = write!(text, "{} {} ", slot.weight(), slot.weight_function());
    }
    let values = match slot.kind() {
        FeatureKind::Continuous => CONTINUOUS_MARKER.to_string(),
        FeatureKind::Byte | FeatureKind::Short => slot.values().join("|"),
    };
    let _ = writeln!(text, "{} {values}", slot.name());
}

fn default_weight(slot: &FeatureSlot) -> (f32, &'static str) {
    let name = slot.name();
    match slot.kind() {
        FeatureKind::Continuous => {
            let weight = match name {
                "unit_duration" => 1000.0,
                "unit_logf0" => 100.0,
                _ => 0.0,
            };
            (weight, LINEAR_WEIGHT_FUNCTION)
        }
        FeatureKind::Byte if DISCRETE_PRIORITY.contains(&name) => (10.0, NO_WEIGHT_FUNCTION),
        FeatureKind::Byte
            if DISCRETE_PHONOLOGY_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix)) =>
        {
            (5.0, NO_WEIGHT_FUNCTION)
        }
        FeatureKind::Byte | FeatureKind::Short => (0.0, NO_WEIGHT_FUNCTION),
    }
}
