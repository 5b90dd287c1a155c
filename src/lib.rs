//! Binary containers for voice databases: feature files, timelines, and unit files.
/// TOML settings for timeline production.
pub mod config;
/// Feature definitions, feature vectors, and feature files.
pub mod features;
/// Magic/version/kind header shared by every container.
pub mod header;
/// Tracing subscriber setup.
pub mod logging;
/// Indexed datagram timelines.
pub mod timeline;
/// Unit files of `(start, duration)` records.
pub mod units;
/// Big-endian primitives and length-prefixed strings.
pub mod wire;
