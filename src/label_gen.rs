use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::dedupe::dedupe_files;
use crate::detector::DetectionModel;
use crate::error::{Error, Result};
use crate::example::{Example, ExampleBuilder};
use crate::jpg_cache::JpgCache;
use crate::types::Detected;

/// Produces the examples of one label, one file per call, in shuffled order.
///
/// Files are deduplicated up front; [`LabelGen::count`] is the number of
/// calls to [`LabelGen::next_example`] the generator can serve.
#[derive(Debug)]
pub struct LabelGen<'a, M> {
    label: String,
    files: Vec<PathBuf>,
    unique_files: Vec<PathBuf>,
    order: Vec<usize>,
    cursor: usize,
    jpg_cache: &'a JpgCache,
    builder: &'a ExampleBuilder<'a, M>,
}

impl<'a, M: DetectionModel> LabelGen<'a, M> {
    pub fn new<R: Rng + ?Sized>(
        label: impl Into<String>,
        files: Vec<PathBuf>,
        hash_size: u32,
        jpg_cache: &'a JpgCache,
        builder: &'a ExampleBuilder<'a, M>,
        rng: &mut R,
    ) -> Self {
        let unique_files = dedupe_files(&files, hash_size).unique;
        let mut order: Vec<usize> = (0..unique_files.len()).collect();
        order.shuffle(rng);

        Self {
            label: label.into(),
            files,
            unique_files,
            order,
            cursor: 0,
            jpg_cache,
            builder,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Files left after deduplication.
    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// Files handed in, before deduplication.
    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// Files dropped as duplicates or because they could not be decoded.
    pub fn skip_count(&self) -> usize {
        self.files.len() - self.unique_files.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.order.len()
    }

    /// The next file in shuffle order, without converting it.
    fn advance(&mut self) -> Result<&Path> {
        let idx = *self.order.get(self.cursor).ok_or_else(|| Error::Exhausted {
            label: self.label.clone(),
        })?;
        self.cursor += 1;
        Ok(&self.unique_files[idx])
    }

    /// Normalize the next file and build its example.
    ///
    /// Every call consumes one file, also when it fails or the target class
    /// is not found. Calling this after [`LabelGen::count`] calls returns
    /// [`Error::Exhausted`].
    pub fn next_example(&mut self) -> Result<Detected<Example>> {
        let jpg_cache = self.jpg_cache;
        let builder = self.builder;
        let source = self.advance()?.to_path_buf();

        let jpg_path = jpg_cache.to_jpg(&source, &self.label)?;
        builder.build(&jpg_path, &self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::TargetDetector;
    use crate::label_map::LabelMap;
    use crate::types::{BoundingBox, RawDetection};
    use image::{DynamicImage, GrayImage, Luma};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    struct AlwaysDog;

    impl DetectionModel for AlwaysDog {
        fn top_detection(&self, _image: &DynamicImage) -> Result<Option<RawDetection>> {
            Ok(Some(RawDetection {
                class_id: 18,
                score: 1.0,
                bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            }))
        }
    }

    // Horizontal step at `edge`, a different hash for every edge position
    fn write_step(path: &Path, edge: u32) {
        GrayImage::from_fn(90, 30, |x, _| Luma([if x < edge { 255 } else { 0 }]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_visits_every_unique_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dog");
        std::fs::create_dir_all(&src).unwrap();

        let mut files = Vec::new();
        for (i, edge) in [20u32, 45, 70].iter().enumerate() {
            let path = src.join(format!("{}.png", i));
            write_step(&path, *edge);
            files.push(path);
        }
        // same content as 0.png
        let copy = src.join("copy.png");
        write_step(&copy, 20);
        files.push(copy);

        let label_map = LabelMap::from_labels(&["dog"]);
        let detector = TargetDetector::new(AlwaysDog, 18);
        let builder = ExampleBuilder::new(&label_map, &detector);
        let jpg_cache = JpgCache::new(dir.path().join("out"), None);
        let mut rng = StdRng::seed_from_u64(7);

        let mut gen = LabelGen::new("dog", files, 8, &jpg_cache, &builder, &mut rng);
        assert_eq!(gen.label(), "dog");
        assert_eq!(gen.total(), 4);
        assert_eq!(gen.count(), 3);
        assert_eq!(gen.skip_count(), 1);
        assert_eq!(gen.skip_count() + gen.count(), gen.total());

        let mut seen = HashSet::new();
        for _ in 0..gen.count() {
            let example = gen.next_example().unwrap().found().unwrap();
            assert_eq!(example.label_id, 1);
            seen.insert(example.filename);
        }
        let expected: HashSet<String> =
            ["0.jpg", "1.jpg", "2.jpg"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);

        assert!(gen.is_exhausted());
        assert!(matches!(
            gen.next_example(),
            Err(Error::Exhausted { label }) if label == "dog"
        ));
    }

    #[test]
    fn test_empty_label() {
        let dir = tempfile::tempdir().unwrap();
        let label_map = LabelMap::from_labels(&["cat"]);
        let detector = TargetDetector::new(AlwaysDog, 18);
        let builder = ExampleBuilder::new(&label_map, &detector);
        let jpg_cache = JpgCache::new(dir.path(), None);
        let mut rng = StdRng::seed_from_u64(0);

        let mut gen = LabelGen::new("cat", Vec::new(), 8, &jpg_cache, &builder, &mut rng);
        assert_eq!(gen.count(), 0);
        assert!(gen.is_exhausted());
        assert!(gen.next_example().is_err());
    }
}
