//! Layer archives
//!
//! Layers travel through the cache as uncompressed tar streams whose
//! entries are relative to the layer directory. Archives are written
//! deterministically, so hashing a directory and hashing the archive
//! stored for it give the same `sha256:<hex>` digest.

use crate::error::{KilnError, KilnResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tar::{Archive, Builder, HeaderMode};
use walkdir::WalkDir;

/// Write sink that only hashes what passes through it
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> (W, String) {
        let digest = format!("sha256:{}", hex::encode(self.hasher.finalize()));
        (self.inner, digest)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn append_dir_contents<W: Write>(builder: &mut Builder<W>, dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        let name = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        builder.append_path_with_name(entry.path(), name)?;
    }
    Ok(())
}

/// Write the contents of `dir` as a deterministic tar stream and return
/// the writer together with the stream's digest.
///
/// A missing directory produces an empty archive.
pub fn write_layer_tar<W: Write>(dir: &Path, writer: W) -> KilnResult<(W, String)> {
    let archive_err = |source| KilnError::io(format!("archiving layer {}", dir.display()), source);

    let mut builder = Builder::new(HashingWriter::new(writer));
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    append_dir_contents(&mut builder, dir).map_err(archive_err)?;
    let hashing = builder.into_inner().map_err(archive_err)?;
    Ok(hashing.finish())
}

/// Digest of the archive that [`write_layer_tar`] would produce for `dir`
pub fn digest_layer_dir(dir: &Path) -> KilnResult<String> {
    let (_, digest) = write_layer_tar(dir, io::sink())?;
    Ok(digest)
}

/// Replace the contents of `dest` with the entries of a layer archive
pub fn extract_layer<R: Read>(reader: R, dest: &Path) -> KilnResult<()> {
    let extract_err = |source| KilnError::LayerExtract {
        path: dest.to_path_buf(),
        source,
    };

    match fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(extract_err(e)),
    }
    fs::create_dir_all(dest).map_err(extract_err)?;

    let mut archive = Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(extract_err)
}
