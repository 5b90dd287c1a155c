//! Feature files: common header, binary definition, vector count, then vectors.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::definition::FeatureDefinition;
use super::error::FeatureError;
use super::vector::FeatureVector;
use crate::header::{FileKind, HEADER_LEN, expect_header, write_header};
use crate::wire::read_count;

/// Streams vectors into a feature file, persisting it atomically on [`finish`](Self::finish).
pub struct FeatureFileWriter {
    path: PathBuf,
    definition: FeatureDefinition,
    out: BufWriter<NamedTempFile>,
    count_offset: u64,
    written: usize,
}

impl FeatureFileWriter {
    /// Start a feature file at `path` for vectors shaped by `definition`.
    pub fn create(path: &Path, definition: &FeatureDefinition) -> Result<Self, FeatureError> {
        let temp = create_tempfile(path)?;
        let mut out = BufWriter::new(temp);
        let mut definition_bytes = Vec::new();
        definition.write_binary(&mut definition_bytes)?;
        write_header(&mut out, FileKind::Features)?;
        out.write_all(&definition_bytes)?;
        // Placeholder count, patched in finish().
        out.write_i32::<BigEndian>(0)?;
        Ok(FeatureFileWriter {
            path: path.to_path_buf(),
            definition: definition.clone(),
            out,
            count_offset: HEADER_LEN + definition_bytes.len() as u64,
            written: 0,
        })
    }

    /// Append the next vector; unit indices must run 0, 1, 2, ...
    pub fn write_vector(&mut self, vector: &FeatureVector) -> Result<(), FeatureError> {
        self.definition.check_shape(vector)?;
        if vector.unit_index() != self.written {
            return Err(FeatureError::UnitOrder {
                expected: self.written,
                found: vector.unit_index(),
            });
        }
        vector.write_binary(&mut self.out)?;
        self.written += 1;
        Ok(())
    }

    /// Number of vectors written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Patch the vector count and move the file into place.
    pub fn finish(self) -> Result<usize, FeatureError> {
        let FeatureFileWriter {
            path,
            out,
            count_offset,
            written,
            ..
        } = self;
        let mut temp = out
            .into_inner()
            .map_err(|err| FeatureError::Io(err.into_error()))?;
        let count = i32::try_from(written).map_err(|_| {
            FeatureError::format(format!("{written} vectors do not fit in a feature file"))
        })?;
        temp.seek(SeekFrom::Start(count_offset))?;
        temp.write_i32::<BigEndian>(count)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|err| FeatureError::Persist {
            path: path.clone(),
            source: err.error,
        })?;
        info!("Wrote {written} feature vectors to {}", path.display());
        Ok(written)
    }
}

/// Write a complete feature file in one call.
pub fn write_feature_file(
    path: &Path,
    definition: &FeatureDefinition,
    vectors: &[FeatureVector],
) -> Result<(), FeatureError> {
    let mut writer = FeatureFileWriter::create(path, definition)?;
    for vector in vectors {
        writer.write_vector(vector)?;
    }
    writer.finish()?;
    Ok(())
}

/// Feature file loaded into memory.
#[derive(Clone, Debug)]
pub struct FeatureFileReader {
    definition: FeatureDefinition,
    vectors: Vec<FeatureVector>,
}

impl FeatureFileReader {
    /// Load every vector of the feature file at `path`.
    pub fn open(path: &Path) -> Result<Self, FeatureError> {
        let file = File::open(path).map_err(|source| FeatureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = Self::from_reader(&mut BufReader::new(file))?;
        debug!(
            "Loaded {} feature vectors from {}",
            reader.vectors.len(),
            path.display()
        );
        Ok(reader)
    }

    /// Decode a feature file from any byte stream.
    ///
    /// Discrete codes outside their feature's value list fail with [`FeatureError::InvalidCode`].
    pub fn from_reader<R: Read + ?Sized>(input: &mut R) -> Result<Self, FeatureError> {
        expect_header(input, FileKind::Features)?;
        let definition = FeatureDefinition::read_binary(input)?;
        let count =
            read_count(input).map_err(|err| FeatureError::from_read(err, "vector count"))?;
        let mut vectors = Vec::with_capacity(count.min(1 << 20));
        for unit_index in 0..count {
            let vector = FeatureVector::read_binary(input, &definition, unit_index)?;
            definition.check_codes(&vector)?;
            vectors.push(vector);
        }
        let mut trailing = [0u8; 1];
        if input.read(&mut trailing)? != 0 {
            return Err(FeatureError::format(format!(
                "feature file has data after its {count} declared vectors"
            )));
        }
        Ok(FeatureFileReader {
            definition,
            vectors,
        })
    }

    /// Shared schema of every vector.
    pub fn definition(&self) -> &FeatureDefinition {
        &self.definition
    }

    pub fn number_of_units(&self) -> usize {
        self.vectors.len()
    }

    /// Vector of unit `index`.
    pub fn vector(&self, index: usize) -> Result<&FeatureVector, FeatureError> {
        self.vectors.get(index).ok_or(FeatureError::UnitOutOfRange {
            index,
            count: self.vectors.len(),
        })
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    /// Split into definition and vectors.
    pub fn into_parts(self) -> (FeatureDefinition, Vec<FeatureVector>) {
        (self.definition, self.vectors)
    }
}

fn create_tempfile(path: &Path) -> Result<NamedTempFile, FeatureError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".voxfile_features")
        .tempfile_in(dir)
        .map_err(|source| FeatureError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSlot;

    fn definition() -> FeatureDefinition {
        FeatureDefinition::new(vec![
            FeatureSlot::byte("phone", ["0", "a", "b"]),
            FeatureSlot::continuous("unit_duration"),
        ])
        .unwrap()
    }

    #[test]
    fn file_round_trip_preserves_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.feats");
        let def = definition();
        let vectors = vec![
            def.feature_vector(0, vec![1], vec![], vec![0.1]).unwrap(),
            def.feature_vector(1, vec![2], vec![], vec![0.25]).unwrap(),
        ];
        write_feature_file(&path, &def, &vectors).unwrap();
        let reader = FeatureFileReader::open(&path).unwrap();
        assert_eq!(reader.definition(), &def);
        assert_eq!(reader.vectors(), vectors.as_slice());
        assert!(matches!(
            reader.vector(2),
            Err(FeatureError::UnitOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn out_of_order_vector_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let def = definition();
        let mut writer = FeatureFileWriter::create(&dir.path().join("x.feats"), &def).unwrap();
        let vector = def.feature_vector(3, vec![0], vec![], vec![0.0]).unwrap();
        assert!(matches!(
            writer.write_vector(&vector),
            Err(FeatureError::UnitOrder { expected: 0, found: 3 })
        ));
    }

    #[test]
    fn unfinished_writer_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.feats");
        let writer = FeatureFileWriter::create(&path, &definition()).unwrap();
        drop(writer);
        assert!(!path.exists());
    }

    #[test]
    fn truncated_file_reports_truncated_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.feats");
        let def = definition();
        let vectors = vec![def.feature_vector(0, vec![1], vec![], vec![0.5]).unwrap()];
        write_feature_file(&path, &def, &vectors).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        let err = FeatureFileReader::from_reader(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, FeatureError::TruncatedRecord(_)));
    }

    #[test]
    fn code_outside_value_list_fails_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.feats");
        let def = FeatureDefinition::new(vec![FeatureSlot::byte("a", ["x", "y"])]).unwrap();
        let vectors = vec![def.feature_vector(0, vec![1], vec![], vec![]).unwrap()];
        write_feature_file(&path, &def, &vectors).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        std::fs::write(&path, bytes).unwrap();

        let err = FeatureFileReader::open(&path).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::InvalidCode { code: 7, count: 2, .. }
        ));
    }

    #[test]
    fn finished_file_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("only.feats");
        let def = definition();
        let vectors = vec![def.feature_vector(0, vec![2], vec![], vec![1.0]).unwrap()];
        write_feature_file(&path, &def, &vectors).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("only.feats")]);
        assert_eq!(FeatureFileReader::open(&path).unwrap().vectors(), vectors.as_slice());
    }
}
