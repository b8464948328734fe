use indicatif::ProgressBar;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

use crate::config::Args;
use crate::detector::{DetectionModel, TargetDetector};
use crate::error::{Error, Result};
use crate::example::{Example, ExampleBuilder};
use crate::hash::{is_valid_hash_size, MAX_HASH_SIZE, MIN_HASH_SIZE};
use crate::jpg_cache::JpgCache;
use crate::label_gen::LabelGen;
use crate::label_map::write_label_map;
use crate::record;
use crate::types::{Detected, LabelStats, RunStats};
use crate::utils::{create_progress_bar, ensure_directory, list_dir};

pub const TRAIN_RECORD_FILE: &str = "train.tfrecords";
pub const TEST_RECORD_FILE: &str = "test.tfrecords";

/// Label names: the subdirectories of `dataset`, in listing order.
pub fn list_labels(dataset: &Path) -> Result<Vec<String>> {
    let mut labels = Vec::new();
    for entry in list_dir(dataset)? {
        let path = entry.path();
        if !path.is_dir() {
            warn!("Ignoring {} which is not a label directory", path.display());
            continue;
        }
        labels.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(labels)
}

/// Files of one label, in listing order.
pub fn list_label_files(dataset: &Path, label: &str) -> Result<Vec<PathBuf>> {
    Ok(list_dir(&dataset.join(label))?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect())
}

/// Number of examples going to the training split.
pub fn split_point(len: usize, ratio: f64) -> usize {
    ((len as f64 * ratio).floor() as usize).min(len)
}

/// Split into a training prefix and a test suffix.
pub fn split_examples<T>(mut examples: Vec<T>, ratio: f64) -> (Vec<T>, Vec<T>) {
    let test = examples.split_off(split_point(examples.len(), ratio));
    (examples, test)
}

/// Pull examples out of `gen` until it runs dry or `max_per_label` examples
/// were found. Images that fail or miss the target class are counted and
/// skipped; only fatal errors stop the loop.
pub fn collect_label<M: DetectionModel>(
    gen: &mut LabelGen<'_, M>,
    max_per_label: Option<usize>,
    pb: &ProgressBar,
) -> Result<(Vec<Example>, LabelStats)> {
    let mut stats = LabelStats {
        total: gen.total(),
        skip_count: gen.skip_count(),
        ..Default::default()
    };
    let mut examples = Vec::new();

    for _ in 0..gen.count() {
        if max_per_label.is_some_and(|max| examples.len() >= max) {
            break;
        }

        match gen.next_example() {
            Ok(Detected::Found(example)) => examples.push(example),
            Ok(Detected::Mismatch(mismatch)) => {
                error!("{}", mismatch);
                stats.increment_not_detected();
            }
            Err(e) if e.is_per_image() => {
                error!("{}", e);
                stats.increment_failed();
            }
            Err(e) => return Err(e),
        }
        pb.inc(1);
    }

    stats.count = examples.len();
    Ok((examples, stats))
}

/// Check the inputs that must exist before any output is produced.
pub fn validate_setup(args: &Args) -> Result<()> {
    if !args.dataset.is_dir() {
        return Err(Error::Setup(format!(
            "The specified dataset directory does not exist: {}",
            args.dataset.display()
        )));
    }
    if !is_valid_hash_size(args.hash_size) {
        return Err(Error::Setup(format!(
            "hash size must be between {} and {}, got {}",
            MIN_HASH_SIZE, MAX_HASH_SIZE, args.hash_size
        )));
    }
    Ok(())
}

/// Main dataset processing pipeline
pub fn process_dataset<M: DetectionModel>(args: &Args, model: M) -> Result<RunStats> {
    validate_setup(args)?;
    let output = ensure_directory(&args.output)?;

    let labels = list_labels(&args.dataset)?;
    info!("Found {} labels.", labels.len());
    let label_map = write_label_map(&labels, &output)?;

    let detector = TargetDetector::new(model, args.target_class);
    let builder = ExampleBuilder::new(&label_map, &detector);
    let jpg_cache = JpgCache::new(&output, args.min_dim);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut label_gens = Vec::with_capacity(labels.len());
    for label in &labels {
        let files = list_label_files(&args.dataset, label)?;
        label_gens.push(LabelGen::new(
            label.as_str(),
            files,
            args.hash_size,
            &jpg_cache,
            &builder,
            &mut rng,
        ));
    }

    let mut stats = RunStats::new();
    let mut all_train = Vec::new();
    let mut all_test = Vec::new();
    for gen in &mut label_gens {
        let pb = create_progress_bar(gen.count() as u64, gen.label());
        let (examples, mut label_stats) = collect_label(gen, args.max_per_label, &pb)?;
        pb.finish_and_clear();

        let (train, test) = split_examples(examples, args.split);
        label_stats.train = train.len();
        label_stats.test = test.len();
        info!(
            "{}: {} train, {} test",
            gen.label(),
            label_stats.train,
            label_stats.test
        );

        all_train.extend(train);
        all_test.extend(test);
        stats.record_label(gen.label(), label_stats);
    }

    write_examples(&output.join(TRAIN_RECORD_FILE), &all_train)?;
    write_examples(&output.join(TEST_RECORD_FILE), &all_test)?;

    Ok(stats)
}

fn write_examples(path: &Path, examples: &[Example]) -> Result<()> {
    let count = record::write_examples(path, examples.iter().map(Example::to_tf_example))?;
    info!("Wrote {} records to {}", count, path.display());
    Ok(())
}
