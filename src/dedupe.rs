use indexmap::IndexMap;
use log::{error, info};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::hash::{dhash, ImageHash};
use crate::utils::open_image;

/// Result of deduplicating one label's files.
#[derive(Debug, Default, Clone)]
pub struct Dedupe {
    /// First occurrence of every hash, in input order
    pub unique: Vec<PathBuf>,
    /// Every decodable file grouped by hash
    pub groups: IndexMap<ImageHash, Vec<PathBuf>>,
}

impl Dedupe {
    /// Files that were dropped because an earlier file had the same hash.
    pub fn duplicates(&self) -> impl Iterator<Item = &PathBuf> {
        self.groups.values().flat_map(|paths| paths.iter().skip(1))
    }
}

/// Open a file as an image and compute its difference hash.
pub fn hash_file(path: &Path, hash_size: u32) -> Result<ImageHash> {
    Ok(dhash(&open_image(path)?, hash_size))
}

/// Drop near-duplicate and undecodable files, keeping the input order of the
/// first file seen for every hash.
pub fn dedupe_files(files: &[PathBuf], hash_size: u32) -> Dedupe {
    info!("deduping {} files", files.len());

    let mut dedupe = Dedupe::default();
    for file in files {
        let hash = match hash_file(file, hash_size) {
            Ok(hash) => hash,
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };

        let group = dedupe.groups.entry(hash).or_default();
        if group.is_empty() {
            dedupe.unique.push(file.clone());
        }
        group.push(file.clone());
    }
    dedupe
}
