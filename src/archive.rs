use anyhow::{Context, Result};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use structure_common::ArchiveFormat;

/// Path of an archive: `base` with the extension of `format`.
pub fn archive_path(base: &Path, format: ArchiveFormat) -> PathBuf {
    base.with_extension(format.extension())
}

/// Serializes `value` next to `base` in the given format and returns the
/// written path.
pub fn write_archive<T: Serialize>(value: &T, base: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let path = archive_path(base, format);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create archive '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        ArchiveFormat::Json => serde_json::to_writer(&mut writer, value)
            .with_context(|| format!("Failed to serialize '{}' as JSON", path.display()))?,
        ArchiveFormat::Bincode => bincode::serialize_into(&mut writer, value)
            .with_context(|| format!("Failed to serialize '{}' with bincode", path.display()))?,
        ArchiveFormat::MessagePack => rmp_serde::encode::write_named(&mut writer, value)
            .with_context(|| format!("Failed to serialize '{}' as MessagePack", path.display()))?,
    }
    writer.flush()?;
    info!("Saved {}", path.display());
    Ok(path)
}

/// Reads an archive written by [`write_archive`].
pub fn read_archive<T: DeserializeOwned>(path: &Path, format: ArchiveFormat) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open archive '{}'", path.display()))?;
    let reader = BufReader::new(file);
    let value = match format {
        ArchiveFormat::Json => serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON archive '{}'", path.display()))?,
        ArchiveFormat::Bincode => bincode::deserialize_from(reader)
            .with_context(|| format!("Failed to parse bincode archive '{}'", path.display()))?,
        ArchiveFormat::MessagePack => rmp_serde::decode::from_read(reader)
            .with_context(|| format!("Failed to parse MessagePack archive '{}'", path.display()))?,
    };
    Ok(value)
}
