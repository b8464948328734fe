//! TFRecord files of `tensorflow.Example` records.

use std::path::Path;
use tfrecord::{Example, ExampleReader, ExampleWriter, Feature, RecordReaderInit, RecordWriterInit};

use crate::error::{Error, Result};

fn record_error(path: &Path) -> impl FnOnce(tfrecord::Error) -> Error + '_ {
    move |source| Error::Record {
        path: path.to_path_buf(),
        source,
    }
}

/// Write every example to a new record file at `path` and return how many
/// were written. No examples still produce an empty file.
pub fn write_examples<I>(path: &Path, examples: I) -> Result<usize>
where
    I: IntoIterator<Item = Example>,
{
    let mut writer: ExampleWriter<_> =
        RecordWriterInit::create(path).map_err(record_error(path))?;
    let mut count = 0;
    for example in examples {
        writer.send(example).map_err(record_error(path))?;
        count += 1;
    }
    writer.flush().map_err(record_error(path))?;
    Ok(count)
}

/// Read back every example of a record file, checking the record checksums.
pub fn read_examples(path: &Path) -> Result<Vec<Example>> {
    let reader: ExampleReader<_> = RecordReaderInit::default()
        .open(path)
        .map_err(record_error(path))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(record_error(path))
}

pub fn bytes_feature(value: impl Into<Vec<u8>>) -> Feature {
    Feature::BytesList(vec![value.into()])
}

pub fn int64_feature(value: i64) -> Feature {
    Feature::Int64List(vec![value])
}

pub fn float_feature(value: f32) -> Feature {
    Feature::FloatList(vec![value])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(name: &str, id: i64) -> Example {
        vec![
            ("name".to_string(), bytes_feature(name)),
            ("id".to_string(), int64_feature(id)),
            ("score".to_string(), float_feature(0.5)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_write_then_read_examples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tfrecords");

        let examples = vec![example("rex", 1), example("tom", 2), example("", 3)];
        let count = write_examples(&path, examples.clone()).unwrap();
        assert_eq!(count, 3);

        let read = read_examples(&path).unwrap();
        assert_eq!(read.len(), 3);
        for (written, read) in examples.iter().zip(read.iter()) {
            assert_eq!(written.get("name"), read.get("name"));
            assert_eq!(written.get("id"), read.get("id"));
            assert_eq!(read.get("score"), Some(&Feature::FloatList(vec![0.5])));
        }
    }

    #[test]
    fn test_empty_record_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.tfrecords");

        assert_eq!(write_examples(&path, Vec::new()).unwrap(), 0);
        assert!(path.exists());
        assert!(read_examples(&path).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tfrecords");
        write_examples(&path, vec![example("rex", 1)]).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read_examples(&path), Err(Error::Record { .. })));
    }

    #[test]
    fn test_missing_record_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_examples(&dir.path().join("nope.tfrecords")).is_err());
    }
}
