//! Runtime archive extraction

use crate::error::{NodepackError, NodepackResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Unpack a `.tar.gz` into `dest_dir`, dropping the archive's top-level
/// directory (`node-v6.11.0-linux-x64/bin/node` lands at `bin/node`).
///
/// Any previous contents of `dest_dir` are removed first. Entries that would
/// escape `dest_dir` are skipped. Hard links are recreated against the
/// already extracted target inside `dest_dir`.
pub fn extract_tarball(archive_path: &Path, dest_dir: &Path) -> NodepackResult<()> {
    let wrap = |e: std::io::Error| {
        NodepackError::io(
            format!("extracting {} into {}", archive_path.display(), dest_dir.display()),
            e,
        )
    };

    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir).map_err(wrap)?;
    }
    fs::create_dir_all(dest_dir).map_err(wrap)?;

    let file = File::open(archive_path).map_err(wrap)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    let mut count = 0usize;
    for entry in archive.entries().map_err(wrap)? {
        let mut entry = entry.map_err(wrap)?;
        let path = entry.path().map_err(wrap)?.into_owned();
        let Some(relative) = strip_top_level(&path) else {
            continue;
        };

        let full_dest = dest_dir.join(&relative);
        if let Some(parent) = full_dest.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }

        if entry.header().entry_type() == tar::EntryType::Link {
            let target = entry
                .link_name()
                .map_err(wrap)?
                .and_then(|t| strip_top_level(&t))
                .map(|t| dest_dir.join(t));
            match target {
                Some(target) if target.is_file() => {
                    fs::hard_link(&target, &full_dest).map_err(wrap)?;
                    count += 1;
                }
                _ => debug!("Skipping hard link {} with unusable target", path.display()),
            }
            continue;
        }

        entry.unpack(&full_dest).map_err(wrap)?;
        count += 1;
    }

    debug!("Extracted {} entries into {}", count, dest_dir.display());
    Ok(())
}

/// Archive path relative to the top-level directory; `None` for the top-level
/// directory itself and for entries that would escape it
fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = path.components().skip(1).collect();
    if components.is_empty() {
        return None;
    }
    if components
        .iter()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        debug!("Skipping unsafe archive entry {}", path.display());
        return None;
    }
    Some(components.iter().collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    /// Build a gzipped tarball with every file under `top/`
    pub(crate) fn tarball(top: &str, files: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{top}/{name}"), *body)
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn strips_top_level_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("node.tgz");
        fs::write(
            &archive,
            tarball(
                "node-v6.11.0-linux-x64",
                &[("bin/node", b"#!/bin/sh\necho v6.11.0\n", 0o755), ("LICENSE", b"MIT", 0o644)],
            ),
        )
        .unwrap();

        let dest = temp.path().join("deps").join("0").join("node");
        extract_tarball(&archive, &dest).unwrap();

        assert!(dest.join("bin").join("node").is_file());
        assert_eq!(fs::read(dest.join("LICENSE")).unwrap(), b"MIT");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("bin").join("node"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn replaces_previous_contents() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("node.tgz");
        fs::write(&archive, tarball("node", &[("bin/node", b"new", 0o755)])).unwrap();

        let dest = temp.path().join("node");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale"), b"old").unwrap();

        extract_tarball(&archive, &dest).unwrap();
        assert!(!dest.join("stale").exists());
        assert_eq!(fs::read(dest.join("bin").join("node")).unwrap(), b"new");
    }

    #[test]
    fn hard_links_resolve_inside_destination() {
        let temp = TempDir::new().unwrap();
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "node/bin/node", &b"node"[..])
            .unwrap();
        let links = [
            ("node/bin/nodejs", "node/bin/node"),
            ("node/bin/evil", "../../etc/passwd"),
        ];
        for (name, target) in links {
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Link);
            link.set_size(0);
            link.set_link_name(target).unwrap();
            link.set_cksum();
            builder.append_data(&mut link, name, std::io::empty()).unwrap();
        }
        let archive = temp.path().join("node.tgz");
        fs::write(&archive, builder.into_inner().unwrap().finish().unwrap()).unwrap();

        let dest = temp.path().join("out");
        extract_tarball(&archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("bin").join("nodejs")).unwrap(), b"node");
        assert!(!dest.join("bin").join("evil").exists());
    }

    #[test]
    fn corrupt_archive_is_io_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tgz");
        fs::write(&archive, b"not gzip").unwrap();

        let err = extract_tarball(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, NodepackError::Io { .. }));
    }
}
