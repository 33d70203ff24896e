//! Content fingerprints for sync items.
//!
//! Files hash to the hex SHA-256 of their content. Directories hash to
//! `h1:` followed by the base64 SHA-256 of a manifest listing every file
//! below the directory as `"<hex sha256>  <relative/path>\n"`, sorted by
//! path, so the digest only depends on names and contents.

use base64::Engine;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Fingerprint a file or a directory tree.
pub fn fingerprint(path: &Path, is_dir: bool) -> io::Result<String> {
    if is_dir {
        hash_dir(path)
    } else {
        hash_file(path)
    }
}

pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_dir(path: &Path) -> io::Result<String> {
    let mut files = Vec::new();
    collect_files(path, path, &mut files)?;
    files.sort();

    let mut manifest = Sha256::new();
    for relative in &files {
        let digest = hash_file(&path.join(relative))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        manifest.update(format!("{}  {}\n", digest, name).as_bytes());
    }

    Ok(format!(
        "h1:{}",
        base64::prelude::BASE64_STANDARD.encode(manifest.finalize())
    ))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            // read_dir only yields children of root
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}
