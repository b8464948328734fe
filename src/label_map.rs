use indexmap::IndexMap;
use log::info;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub const LABEL_MAP_FILE: &str = "label_map.pbtxt";

/// Label name to class id, in the order labels were discovered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelMap {
    ids: IndexMap<String, i64>,
}

impl LabelMap {
    /// Assign ids `1..=N` following the order of `labels`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let ids = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_ref().to_string(), i as i64 + 1))
            .collect();
        Self { ids }
    }

    pub fn id(&self, label: &str) -> Result<i64> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.ids.iter().map(|(label, id)| (label.as_str(), *id))
    }

    /// Render as a `StringIntLabelMap` in protobuf text format.
    pub fn to_pbtxt(&self) -> String {
        let mut content = String::with_capacity(self.ids.len() * 32);
        for (label, id) in self.iter() {
            content.push_str("item {\n");
            content.push_str(&format!("  name: \"{}\"\n", escape_text(label)));
            content.push_str(&format!("  id: {}\n", id));
            content.push_str("}\n");
        }
        content
    }
}

// Escape a string the way protobuf text format does
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Build the label map for `labels` and persist it to
/// `{output_dir}/label_map.pbtxt`.
pub fn write_label_map<S: AsRef<str>>(labels: &[S], output_dir: &Path) -> Result<LabelMap> {
    let label_map = LabelMap::from_labels(labels);

    let path = output_dir.join(LABEL_MAP_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(&path, label_map.to_pbtxt()).map_err(|e| Error::io(&path, e))?;

    info!(
        "wrote {} labels to {}",
        label_map.len(),
        path.display()
    );
    Ok(label_map)
}
