use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

use crate::common::IMAGE_FORMAT_VERSION;
use crate::errors::{ErrorKind, KvError, KvResult};

use super::{ImageMeta, SnapshotProvider, StoreImage};

const IMAGE_EXTENSION: &str = "kvimg";
const TEMP_EXTENSION: &str = "kvimg.tmp";
const MAGIC: &[u8; 4] = b"SKVI";
const TRAILER_LEN: usize = 8;

#[derive(Serialize, Deserialize)]
struct ImageHeader {
    version: u32,
    meta: ImageMeta,
    count: u64,
    deadline_count: u64,
}

/// Hashes everything written through it.
struct ChecksumWriter<W: Write> {
    inner: W,
    hasher: Xxh3,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        ChecksumWriter {
            inner,
            hasher: Xxh3::new(),
        }
    }

    fn finish(self) -> (W, u64) {
        (self.inner, self.hasher.digest())
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Stores one file per store image in a directory.
///
/// A file is the magic `SKVI`, a bincode header (format version, store
/// metadata, entry and deadline counts), the bincode-encoded entries, the
/// `(key, deadline)` records, and an xxh3-64 checksum of everything before
/// it. Images are written to a temporary
/// file and renamed over the previous one, so a crash mid-write leaves the
/// old image intact.
#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    dir: PathBuf,
}

impl FileSnapshotProvider {
    /// Uses `dir` for images, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> KvResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| {
            log::error!("Cannot create image directory {}: {}", dir.display(), err);
            KvError::new_with_cause(
                &format!("Cannot create image directory {}", dir.display()),
                ErrorKind::PersistenceFailure,
                err.into(),
            )
        })?;
        Ok(FileSnapshotProvider { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the image file for store `name`.
    pub fn image_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_file_name(name), IMAGE_EXTENSION))
    }

    fn write_stream(&self, path: &Path, image: &StoreImage) -> KvResult<()> {
        let config = bincode::config::standard();
        let file = File::create(path)?;
        let mut writer = ChecksumWriter::new(BufWriter::new(file));

        writer.write_all(MAGIC)?;
        let header = ImageHeader {
            version: IMAGE_FORMAT_VERSION,
            meta: image.meta.clone(),
            count: image.entries.len() as u64,
            deadline_count: image.deadlines.len() as u64,
        };
        bincode::serde::encode_into_std_write(&header, &mut writer, config)?;
        for (key, value) in &image.entries {
            bincode::serde::encode_into_std_write((key, value), &mut writer, config)?;
        }
        for (key, deadline) in &image.deadlines {
            bincode::serde::encode_into_std_write((key, deadline), &mut writer, config)?;
        }

        let (mut buffered, checksum) = writer.finish();
        buffered.write_all(&checksum.to_le_bytes())?;
        let file = buffered
            .into_inner()
            .map_err(|err| KvError::from(err.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl SnapshotProvider for FileSnapshotProvider {
    fn write_image(&self, image: &StoreImage) -> KvResult<()> {
        let path = self.image_path(image.name());
        let temp = path.with_extension(TEMP_EXTENSION);

        if let Err(err) = self.write_stream(&temp, image) {
            let _ = fs::remove_file(&temp);
            log::error!("Failed to write image of store {}: {}", image.name(), err);
            return Err(KvError::new_with_cause(
                &format!("Failed to write image of store {}", image.name()),
                ErrorKind::PersistenceFailure,
                err,
            ));
        }
        if let Err(err) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            log::error!(
                "Failed to move image of store {} into place: {}",
                image.name(),
                err
            );
            return Err(KvError::new_with_cause(
                &format!("Failed to move image of store {} into place", image.name()),
                ErrorKind::PersistenceFailure,
                err.into(),
            ));
        }
        log::debug!(
            "Wrote {} entries of store {} to {}",
            image.len(),
            image.name(),
            path.display()
        );
        Ok(())
    }

    fn read_image(&self, name: &str) -> KvResult<Option<StoreImage>> {
        let path = self.image_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                log::error!("Failed to read image {}: {}", path.display(), err);
                return Err(err.into());
            }
        };
        decode_image(&bytes, name).map(Some)
    }

    fn has_image(&self, name: &str) -> KvResult<bool> {
        Ok(self.image_path(name).try_exists()?)
    }

    fn remove_image(&self, name: &str) -> KvResult<()> {
        match fs::remove_file(self.image_path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn image_names(&self) -> KvResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(IMAGE_EXTENSION) {
                continue;
            }
            let decoded = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(decode_file_name);
            match decoded {
                Some(name) => names.push(name),
                None => log::warn!("Ignoring unrecognised image file {}", path.display()),
            }
        }
        names.sort();
        Ok(names)
    }
}

fn decode_image(bytes: &[u8], name: &str) -> KvResult<StoreImage> {
    if bytes.len() < MAGIC.len() + TRAILER_LEN {
        return Err(corrupted(name, "file is truncated"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let mut expected = [0u8; TRAILER_LEN];
    expected.copy_from_slice(trailer);
    if xxh3_64(body) != u64::from_le_bytes(expected) {
        return Err(corrupted(name, "checksum mismatch"));
    }
    if !body.starts_with(MAGIC) {
        return Err(corrupted(name, "not a store image"));
    }

    let config = bincode::config::standard();
    let mut offset = MAGIC.len();
    let (header, read): (ImageHeader, usize) =
        bincode::serde::decode_from_slice(&body[offset..], config)?;
    offset += read;
    if header.version != IMAGE_FORMAT_VERSION {
        return Err(corrupted(
            name,
            &format!("unsupported format version {}", header.version),
        ));
    }
    if header.meta.name != name {
        return Err(corrupted(
            name,
            &format!("image belongs to store {}", header.meta.name),
        ));
    }

    let mut entries = Vec::with_capacity(header.count.min(1 << 20) as usize);
    for _ in 0..header.count {
        let (entry, read): ((Vec<u8>, Vec<u8>), usize) =
            bincode::serde::decode_from_slice(&body[offset..], config)?;
        offset += read;
        entries.push(entry);
    }
    let mut deadlines = Vec::with_capacity(header.deadline_count.min(1 << 20) as usize);
    for _ in 0..header.deadline_count {
        let (deadline, read): ((Vec<u8>, u64), usize) =
            bincode::serde::decode_from_slice(&body[offset..], config)?;
        offset += read;
        deadlines.push(deadline);
    }
    if offset != body.len() {
        return Err(corrupted(name, "trailing bytes after the last record"));
    }

    Ok(StoreImage {
        meta: header.meta,
        entries,
        deadlines,
    })
}

fn corrupted(name: &str, reason: &str) -> KvError {
    log::error!("Image of store {} is corrupted: {}", name, reason);
    KvError::new(
        &format!("Image of store {} is corrupted: {}", name, reason),
        ErrorKind::FileCorrupted,
    )
}

/// Maps a store name to a portable file name: ASCII letters, digits, `-`
/// and `_` are kept, every other byte becomes `%XX`.
pub fn encode_file_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Inverse of [`encode_file_name`].
pub fn decode_file_name(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;

    fn sample(name: &str) -> StoreImage {
        let entries = (0..500)
            .map(|i| (format!("key{:04}", i).into_bytes(), format!("D{}", i).into_bytes()))
            .collect();
        StoreImage::new(name, StoreConfig::new(true, 4).unwrap(), entries)
    }

    #[test]
    fn test_file_name_encoding() {
        for name in ["configuration", "a/b c", "weird%name", "ünïcode", "dots.and.more"] {
            let encoded = encode_file_name(name);
            assert!(encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'%'));
            assert_eq!(decode_file_name(&encoded).as_deref(), Some(name));
        }
        assert_eq!(encode_file_name("test"), "test");
        assert_eq!(decode_file_name("%Z1"), None);
        assert_eq!(decode_file_name("%4"), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        let image = sample("test");

        assert!(!provider.has_image("test").unwrap());
        assert_eq!(provider.read_image("test").unwrap(), None);
        provider.write_image(&image).unwrap();
        assert!(provider.has_image("test").unwrap());
        assert_eq!(provider.read_image("test").unwrap(), Some(image));
        assert!(!provider.image_path("test").with_extension(TEMP_EXTENSION).exists());
    }

    #[test]
    fn test_image_names_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path().join("nested")).unwrap();
        provider.write_image(&sample("b store")).unwrap();
        provider.write_image(&sample("a")).unwrap();
        fs::write(dir.path().join("nested").join("notes.txt"), b"ignored").unwrap();

        assert_eq!(
            provider.image_names().unwrap(),
            vec!["a".to_string(), "b store".to_string()]
        );
        provider.remove_image("a").unwrap();
        provider.remove_image("a").unwrap();
        assert_eq!(provider.image_names().unwrap(), vec!["b store".to_string()]);
    }

    #[test]
    fn test_flipped_byte_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        provider.write_image(&sample("test")).unwrap();

        let path = provider.image_path("test");
        let mut bytes = fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x5A;
        fs::write(&path, &bytes).unwrap();

        let err = provider.read_image("test").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::FileCorrupted);
    }

    #[test]
    fn test_truncated_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        provider.write_image(&sample("test")).unwrap();

        let path = provider.image_path("test");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();
        assert_eq!(
            provider.read_image("test").unwrap_err().kind(),
            &ErrorKind::FileCorrupted
        );

        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            provider.read_image("test").unwrap_err().kind(),
            &ErrorKind::FileCorrupted
        );
    }

    #[test]
    fn test_image_of_another_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        provider.write_image(&sample("left")).unwrap();
        fs::copy(provider.image_path("left"), provider.image_path("right")).unwrap();

        assert_eq!(
            provider.read_image("right").unwrap_err().kind(),
            &ErrorKind::FileCorrupted
        );
    }

    #[test]
    fn test_deadlines_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        let image = sample("ttl").with_deadlines(vec![
            (b"key0001".to_vec(), 1_900_000_000_000),
            (b"key0042".to_vec(), u64::MAX),
        ]);
        provider.write_image(&image).unwrap();
        let read = provider.read_image("ttl").unwrap().unwrap();
        assert_eq!(read.deadlines, image.deadlines);
        assert_eq!(read, image);
    }

    #[test]
    fn test_failed_rename_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        // a directory where the image should go makes the rename fail
        let path = provider.image_path("blocked");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupant"), b"x").unwrap();

        let err = provider.write_image(&sample("blocked")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::PersistenceFailure);
        assert!(!path.with_extension(TEMP_EXTENSION).exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_empty_image() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path()).unwrap();
        let image = StoreImage::new("empty", StoreConfig::default(), vec![]);
        provider.write_image(&image).unwrap();
        assert_eq!(provider.read_image("empty").unwrap(), Some(image));
    }
}
