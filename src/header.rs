//! Common magic/version/kind header that opens every voxfile.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Magic bytes at offset zero of every voxfile.
pub const VOXFILE_MAGIC: &[u8; 4] = b"VOXF";
/// Current layout version.
pub const VOXFILE_VERSION: u32 = 1;
/// Byte length of the common header.
pub const HEADER_LEN: u64 = 4 + 4 + 4;

const KIND_UNITS: u32 = 1;
const KIND_FEATURES: u32 = 2;

/// Flavor of datagram payload stored in a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    /// Payload format is not declared.
    Generic,
    /// Raw waveform frames or pitch periods.
    Waveform,
    /// Harmonics-plus-noise analysis frames.
    Hnm,
    /// Mel-cepstrum frames.
    Mcep,
    /// Voice quality parameter frames.
    VoiceQuality,
    /// LPC residual frames.
    Lpc,
    /// Per-unit feature blobs.
    UnitFeatures,
}

impl TimelineKind {
    const ALL: [TimelineKind; 7] = [
        TimelineKind::Generic,
        TimelineKind::Waveform,
        TimelineKind::Hnm,
        TimelineKind::Mcep,
        TimelineKind::VoiceQuality,
        TimelineKind::Lpc,
        TimelineKind::UnitFeatures,
    ];

    fn code(self) -> u32 {
        match self {
            TimelineKind::Generic => 100,
            TimelineKind::Waveform => 101,
            TimelineKind::Hnm => 102,
            TimelineKind::Mcep => 103,
            TimelineKind::VoiceQuality => 104,
            TimelineKind::Lpc => 105,
            TimelineKind::UnitFeatures => 106,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Container kinds sharing the common header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Fixed-width (start, duration) unit records.
    Units,
    /// Feature definition followed by feature vectors.
    Features,
    /// Indexed datagram timeline.
    Timeline(TimelineKind),
}

impl FileKind {
    /// Numeric tag stored on disk.
    pub fn code(self) -> u32 {
        match self {
            FileKind::Units => KIND_UNITS,
            FileKind::Features => KIND_FEATURES,
            FileKind::Timeline(kind) => kind.code(),
        }
    }

    /// Resolve an on-disk tag.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            KIND_UNITS => Some(FileKind::Units),
            KIND_FEATURES => Some(FileKind::Features),
            other => TimelineKind::from_code(other).map(FileKind::Timeline),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Units => f.write_str("unit file"),
            FileKind::Features => f.write_str("feature file"),
            FileKind::Timeline(kind) => write!(f, "{kind:?} timeline"),
        }
    }
}

/// Errors raised while reading or writing the common header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The file does not start with the voxfile magic.
    #[error("Bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    /// The layout version is not understood by this build.
    #[error("Unsupported voxfile version {0}")]
    UnsupportedVersion(u32),
    /// The kind tag does not name a known container.
    #[error("Unknown container kind tag {0}")]
    UnknownKind(u32),
    /// The container is valid but not the kind the caller asked for.
    #[error("Expected a {expected}, found a {found}")]
    WrongKind { expected: FileKind, found: FileKind },
    /// The stream ended before the header was complete.
    #[error("File is shorter than the voxfile header")]
    Truncated,
    /// Underlying I/O failure.
    #[error("Header I/O failed: {0}")]
    Io(#[source] io::Error),
}

/// Write the common header for `kind`.
pub fn write_header<W: Write + ?Sized>(out: &mut W, kind: FileKind) -> io::Result<()> {
    out.write_all(VOXFILE_MAGIC)?;
    out.write_u32::<BigEndian>(VOXFILE_VERSION)?;
    out.write_u32::<BigEndian>(kind.code())
}

/// Read and validate the common header, returning the declared kind.
pub fn read_header<R: Read + ?Sized>(input: &mut R) -> Result<FileKind, HeaderError> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic).map_err(map_io)?;
    if &magic != VOXFILE_MAGIC {
        return Err(HeaderError::BadMagic {
            expected: *VOXFILE_MAGIC,
            found: magic,
        });
    }
    let version = input.read_u32::<BigEndian>().map_err(map_io)?;
    if version != VOXFILE_VERSION {
        return Err(HeaderError::UnsupportedVersion(version));
    }
    let code = input.read_u32::<BigEndian>().map_err(map_io)?;
    FileKind::from_code(code).ok_or(HeaderError::UnknownKind(code))
}

/// Read the header and require a specific kind.
pub fn expect_header<R: Read + ?Sized>(
    input: &mut R,
    expected: FileKind,
) -> Result<(), HeaderError> {
    let found = read_header(input)?;
    if found != expected {
        return Err(HeaderError::WrongKind { expected, found });
    }
    Ok(())
}

fn map_io(err: io::Error) -> HeaderError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        HeaderError::Truncated
    } else {
        HeaderError::Io(err)
    }
}
