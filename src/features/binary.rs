use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::definition::{FeatureDefinition, FeatureKind, FeatureSlot};
use super::error::FeatureError;
use crate::wire::{read_count, read_string, write_count, write_string};

impl FeatureDefinition {
    /// Write the binary form: section counts, then one record per feature.
    pub fn write_binary<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write_count(out, self.number_of_byte_features())?;
        write_count(out, self.number_of_short_features())?;
        write_count(out, self.number_of_continuous_features())?;
        for slot in self.slots() {
            out.write_u8(slot.kind().tag())?;
            write_string(out, slot.name())?;
            write_count(out, slot.values().len())?;
            for value in slot.values() {
                write_string(out, value)?;
            }
            out.write_f32::<BigEndian>(slot.weight())?;
            write_string(out, slot.weight_function())?;
        }
        Ok(())
    }

    /// Read the binary form written by [`FeatureDefinition::write_binary`].
    pub fn read_binary<R: Read + ?Sized>(input: &mut R) -> Result<Self, FeatureError> {
        let counts = [
            read_count(input).map_err(|err| FeatureError::from_read(err, "byte feature count"))?,
            read_count(input).map_err(|err| FeatureError::from_read(err, "short feature count"))?,
            read_count(input)
                .map_err(|err| FeatureError::from_read(err, "continuous feature count"))?,
        ];
        let kinds = [FeatureKind::Byte, FeatureKind::Short, FeatureKind::Continuous];
        let mut slots = Vec::new();
        for (expected_kind, count) in kinds.into_iter().zip(counts) {
            for _ in 0..count {
                slots.push(read_slot(input, expected_kind, slots.len())?);
            }
        }
        FeatureDefinition::new(slots)
    }
}

fn read_slot<R: Read + ?Sized>(
    input: &mut R,
    expected: FeatureKind,
    index: usize,
) -> Result<FeatureSlot, FeatureError> {
    let what = || format!("definition of feature {index}");
    let tag = input
        .read_u8()
        .map_err(|err| FeatureError::from_read(err, what()))?;
    let kind = FeatureKind::from_tag(tag).ok_or_else(|| {
        FeatureError::format(format!("feature {index} has unknown kind tag {tag}"))
    })?;
    if kind != expected {
        return Err(FeatureError::format(format!(
            "feature {index} is tagged {} but the counts place it in the {} section",
            kind.section(),
            expected.section()
        )));
    }
    let name = read_string(input).map_err(|err| FeatureError::from_read(err, what()))?;
    let value_count = read_count(input).map_err(|err| FeatureError::from_read(err, what()))?;
    let mut values = Vec::with_capacity(value_count.min(1 << 16));
    for _ in 0..value_count {
        values.push(read_string(input).map_err(|err| FeatureError::from_read(err, what()))?);
    }
    let weight = input
        .read_f32::<BigEndian>()
        .map_err(|err| FeatureError::from_read(err, what()))?;
    let weight_function =
        read_string(input).map_err(|err| FeatureError::from_read(err, what()))?;
    let slot = match kind {
        FeatureKind::Byte => FeatureSlot::byte(name, values),
        FeatureKind::Short => FeatureSlot::short(name, values),
        FeatureKind::Continuous if values.is_empty() => FeatureSlot::continuous(name),
        FeatureKind::Continuous => {
            return Err(FeatureError::format(format!(
                "continuous feature '{name}' carries {} values",
                values.len()
            )));
        }
    };
    Ok(slot.with_weight(weight, weight_function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn definition() -> FeatureDefinition {
        FeatureDefinition::new(vec![
            FeatureSlot::byte("a", ["x", "y"]).with_weight(2.5, "none"),
            FeatureSlot::short("s", ["0", "1"]),
            FeatureSlot::continuous("c").with_weight(0.125, "linear"),
        ])
        .unwrap()
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let def = definition();
        let mut buf = Vec::new();
        def.write_binary(&mut buf).unwrap();
        let decoded = FeatureDefinition::read_binary(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, def);
        assert_eq!(decoded.weight_function(2).unwrap(), "linear");
    }

    #[test]
    fn layout_starts_with_counts_and_first_tag() {
        let mut buf = Vec::new();
        definition().write_binary(&mut buf).unwrap();
        assert_eq!(&buf[..12], &[0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(buf[12], 0);
        assert_eq!(&buf[13..16], &[0, 1, b'a']);
    }

    #[test]
    fn tag_outside_its_section_is_rejected() {
        let mut buf = Vec::new();
        definition().write_binary(&mut buf).unwrap();
        buf[12] = 2;
        let err = FeatureDefinition::read_binary(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FeatureError::Format(_)));
    }

    #[test]
    fn truncated_definition_is_reported() {
        let mut buf = Vec::new();
        definition().write_binary(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = FeatureDefinition::read_binary(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FeatureError::TruncatedRecord(_)));
    }
}
