//! Object detection: the model seam, lazy loading, and the target-class check.

use image::imageops::FilterType;
use image::DynamicImage;
use log::info;
use once_cell::unsync::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

use crate::error::{Error, Result};
use crate::types::{BoundingBox, ClassMismatch, Detected, RawDetection};

/// COCO class id of "dog".
pub const DEFAULT_TARGET_CLASS: i64 = 18;

pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// A pretrained detector that can be asked for its best detection.
pub trait DetectionModel {
    /// Highest scoring detection in `image`, or `None` if the model found
    /// nothing.
    fn top_detection(&self, image: &DynamicImage) -> Result<Option<RawDetection>>;
}

impl<M: DetectionModel + ?Sized> DetectionModel for &M {
    fn top_detection(&self, image: &DynamicImage) -> Result<Option<RawDetection>> {
        (**self).top_detection(image)
    }
}

impl<M: DetectionModel + ?Sized> DetectionModel for Box<M> {
    fn top_detection(&self, image: &DynamicImage) -> Result<Option<RawDetection>> {
        (**self).top_detection(image)
    }
}

/// Loads the wrapped model on first use and keeps it for the rest of the run.
pub struct LazyModel<M> {
    loader: Box<dyn Fn() -> Result<M>>,
    model: OnceCell<M>,
}

impl<M> LazyModel<M> {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<M> + 'static,
    {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
        }
    }

    /// The loaded model, running the loader if this is the first call. A
    /// failed load is not cached.
    pub fn get(&self) -> Result<&M> {
        self.model.get_or_try_init(|| (self.loader)())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

impl LazyModel<OnnxDetectionModel> {
    pub fn onnx(path: impl Into<PathBuf>, input_size: u32) -> Self {
        let path = path.into();
        Self::new(move || {
            info!("loading model... {}", path.display());
            OnnxDetectionModel::load(&path, input_size)
        })
    }
}

impl<M> fmt::Debug for LazyModel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyModel")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl<M: DetectionModel> DetectionModel for LazyModel<M> {
    fn top_detection(&self, image: &DynamicImage) -> Result<Option<RawDetection>> {
        self.get()?.top_detection(image)
    }
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Bare tensor name: "serving/detection_boxes:0" -> "detection_boxes"
fn output_key(name: &str) -> &str {
    let name = match name.rsplit_once(':') {
        Some((base, index)) if index.chars().all(|c| c.is_ascii_digit()) => base,
        _ => name,
    };
    name.rsplit('/').next().unwrap_or(name)
}

// Positions of the interesting tensors among the model outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputSlots {
    boxes: usize,
    classes: usize,
    scores: usize,
}

impl OutputSlots {
    fn from_names<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        let find = |key: &str| names.iter().position(|name| output_key(name.as_ref()) == key);
        Some(Self {
            boxes: find("detection_boxes")?,
            classes: find("detection_classes")?,
            scores: find("detection_scores")?,
        })
    }
}

/// An object detection model exported to ONNX from the TensorFlow Object
/// Detection API, run with tract.
///
/// The model takes a `uint8[1, size, size, 3]` image and returns
/// `detection_boxes` (`[1, N, 4]`, ymin/xmin/ymax/xmax normalized),
/// `detection_classes` and `detection_scores` (`[1, N]`).
pub struct OnnxDetectionModel {
    path: PathBuf,
    plan: OnnxPlan,
    slots: OutputSlots,
    input_size: u32,
}

impl fmt::Debug for OnnxDetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxDetectionModel")
            .field("path", &self.path)
            .field("slots", &self.slots)
            .field("input_size", &self.input_size)
            .finish()
    }
}

/// Accept either the `.onnx` file or a directory holding `model.onnx`.
pub fn resolve_model_path(path: &Path) -> Result<PathBuf> {
    let model_path = if path.is_dir() {
        path.join("model.onnx")
    } else {
        path.to_path_buf()
    };
    if !model_path.is_file() {
        return Err(Error::Setup(format!(
            "detection model not found: {}",
            model_path.display()
        )));
    }
    Ok(model_path)
}

fn load_error(path: &Path, e: TractError) -> Error {
    Error::ModelLoad {
        path: path.to_path_buf(),
        source: e.into(),
    }
}

impl OnnxDetectionModel {
    pub fn load(path: &Path, input_size: u32) -> Result<Self> {
        let path = resolve_model_path(path)?;
        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .map_err(|e| load_error(&path, e))?;

        let names = model
            .output_outlets()
            .map_err(|e| load_error(&path, e))?
            .iter()
            .map(|outlet| {
                model
                    .outlet_label(*outlet)
                    .map(str::to_string)
                    .unwrap_or_else(|| model.node(outlet.node).name.clone())
            })
            .collect::<Vec<_>>();
        let slots = OutputSlots::from_names(&names).ok_or_else(|| Error::ModelLoad {
            path: path.clone(),
            source: format!("missing detection outputs, model provides {:?}", names).into(),
        })?;

        let size = input_size as usize;
        let plan = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(u8::datum_type(), tvec!(1, size, size, 3)),
            )
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| load_error(&path, e))?;

        info!("model loaded from {}", path.display());
        Ok(Self {
            path,
            plan,
            slots,
            input_size,
        })
    }

    fn input_tensor(&self, image: &DynamicImage) -> Tensor {
        let size = self.input_size;
        let rgb = image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        tract_ndarray::Array4::from_shape_fn(
            (1, size as usize, size as usize, 3),
            |(_, y, x, c)| rgb.get_pixel(x as u32, y as u32)[c],
        )
        .into()
    }

    fn run(&self, image: &DynamicImage) -> TractResult<Option<RawDetection>> {
        let outputs = self.plan.run(tvec!(self.input_tensor(image).into()))?;

        let boxes = outputs[self.slots.boxes].cast_to::<f32>()?;
        let classes = outputs[self.slots.classes].cast_to::<f32>()?;
        let scores = outputs[self.slots.scores].cast_to::<f32>()?;
        let boxes = boxes.as_slice::<f32>()?;
        let classes = classes.as_slice::<f32>()?;
        let scores = scores.as_slice::<f32>()?;

        Ok(top_of(boxes, classes, scores))
    }
}

/// Pick the best scoring detection out of flat `[N * 4]`, `[N]`, `[N]`
/// output buffers.
pub fn top_of(boxes: &[f32], classes: &[f32], scores: &[f32]) -> Option<RawDetection> {
    let count = scores.len().min(classes.len()).min(boxes.len() / 4);
    let best = (0..count).max_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            // prefer the earlier index on ties
            .then(b.cmp(&a))
    })?;

    let b = &boxes[best * 4..best * 4 + 4];
    Some(RawDetection {
        class_id: classes[best].round() as i64,
        score: scores[best],
        bbox: BoundingBox::new(b[0], b[1], b[2], b[3]),
    })
}

impl DetectionModel for OnnxDetectionModel {
    fn top_detection(&self, image: &DynamicImage) -> Result<Option<RawDetection>> {
        self.run(image).map_err(|e| Error::Inference {
            path: self.path.clone(),
            source: e.into(),
        })
    }
}

/// Checks that the best detection of a model is the class we want.
#[derive(Debug)]
pub struct TargetDetector<M> {
    model: M,
    target_class: i64,
}

impl<M: DetectionModel> TargetDetector<M> {
    pub fn new(model: M, target_class: i64) -> Self {
        Self {
            model,
            target_class,
        }
    }

    pub fn target_class(&self) -> i64 {
        self.target_class
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Box of the target object, or the mismatch when the top detection is
    /// some other class.
    pub fn find(&self, image: &DynamicImage) -> Result<Detected<BoundingBox>> {
        let top = self.model.top_detection(image)?;
        Ok(match top {
            Some(detection) if detection.class_id == self.target_class => {
                Detected::Found(detection.bbox.clamped())
            }
            other => Detected::Mismatch(ClassMismatch {
                expected: self.target_class,
                found: other.map(|detection| detection.class_id),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Fixed(Option<RawDetection>);

    impl DetectionModel for Fixed {
        fn top_detection(&self, _image: &DynamicImage) -> Result<Option<RawDetection>> {
            Ok(self.0)
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
    }

    fn detection(class_id: i64) -> RawDetection {
        RawDetection {
            class_id,
            score: 0.9,
            bbox: BoundingBox::new(0.1, 0.2, 0.3, 0.4),
        }
    }

    #[test]
    fn test_target_found() {
        let detector = TargetDetector::new(Fixed(Some(detection(18))), 18);
        assert_eq!(
            detector.find(&image()).unwrap(),
            Detected::Found(BoundingBox::new(0.1, 0.2, 0.3, 0.4))
        );
    }

    #[test]
    fn test_found_box_is_clamped() {
        let detector = TargetDetector::new(
            Fixed(Some(RawDetection {
                class_id: 18,
                score: 0.7,
                bbox: BoundingBox::new(-0.05, 0.2, 1.2, 0.9),
            })),
            18,
        );
        assert_eq!(
            detector.find(&image()).unwrap(),
            Detected::Found(BoundingBox::new(0.0, 0.2, 1.0, 0.9))
        );
    }

    #[test]
    fn test_target_mismatch() {
        let detector = TargetDetector::new(Fixed(Some(detection(17))), 18);
        assert_eq!(
            detector.find(&image()).unwrap(),
            Detected::Mismatch(ClassMismatch {
                expected: 18,
                found: Some(17)
            })
        );

        let empty = TargetDetector::new(Fixed(None), 18);
        assert_eq!(
            empty.find(&image()).unwrap(),
            Detected::Mismatch(ClassMismatch {
                expected: 18,
                found: None
            })
        );
    }

    #[test]
    fn test_lazy_model_loads_once() {
        let loads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&loads);
        let lazy = LazyModel::new(move || {
            counter.set(counter.get() + 1);
            Ok(Fixed(Some(detection(18))))
        });

        assert!(!lazy.is_loaded());
        assert_eq!(loads.get(), 0);

        let detector = TargetDetector::new(&lazy, 18);
        for _ in 0..5 {
            assert!(detector.find(&image()).unwrap().is_found());
        }
        assert!(lazy.is_loaded());
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn test_lazy_model_failure_is_not_cached() {
        let attempts = Rc::new(Cell::new(0));
        let counter = Rc::clone(&attempts);
        let lazy: LazyModel<Fixed> = LazyModel::new(move || {
            counter.set(counter.get() + 1);
            Err(Error::ModelLoad {
                path: PathBuf::from("model.onnx"),
                source: "corrupt".into(),
            })
        });

        assert!(matches!(lazy.get(), Err(Error::ModelLoad { .. })));
        assert!(matches!(
            lazy.top_detection(&image()),
            Err(Error::ModelLoad { .. })
        ));
        assert_eq!(attempts.get(), 2);
        assert!(!lazy.is_loaded());
    }

    #[test]
    fn test_top_of_picks_highest_score() {
        let boxes = [
            0.0, 0.0, 0.5, 0.5, //
            0.1, 0.2, 0.8, 0.9, //
            0.3, 0.3, 0.4, 0.4,
        ];
        let classes = [1.0, 18.0, 3.0];
        let scores = [0.4, 0.95, 0.95];

        let top = top_of(&boxes, &classes, &scores).unwrap();
        assert_eq!(top.class_id, 18);
        assert_eq!(top.bbox, BoundingBox::new(0.1, 0.2, 0.8, 0.9));
        assert!(top_of(&[], &[], &[]).is_none());
    }

    #[test]
    fn test_output_slots_from_names() {
        let names = [
            "detection_anchor_indices",
            "detection_boxes",
            "detection_classes",
            "detection_multiclass_scores",
            "detection_scores",
            "num_detections",
        ];
        assert_eq!(
            OutputSlots::from_names(&names),
            Some(OutputSlots {
                boxes: 1,
                classes: 2,
                scores: 4
            })
        );
        assert_eq!(OutputSlots::from_names(&["logits"]), None);
    }

    #[test]
    fn test_output_slots_ignore_raw_outputs() {
        let names = [
            "raw_detection_boxes",
            "raw_detection_scores",
            "detection_boxes",
            "detection_classes",
            "detection_scores",
        ];
        assert_eq!(
            OutputSlots::from_names(&names),
            Some(OutputSlots {
                boxes: 2,
                classes: 3,
                scores: 4
            })
        );

        let suffixed = [
            "StatefulPartitionedCall/raw_detection_boxes:0",
            "StatefulPartitionedCall/detection_scores:0",
            "StatefulPartitionedCall/detection_classes:0",
            "StatefulPartitionedCall/detection_boxes:0",
        ];
        assert_eq!(
            OutputSlots::from_names(&suffixed),
            Some(OutputSlots {
                boxes: 3,
                classes: 2,
                scores: 1
            })
        );
        assert_eq!(
            OutputSlots::from_names(&["raw_detection_boxes", "detection_classes", "detection_scores"]),
            None
        );
    }

    #[test]
    fn test_output_key() {
        assert_eq!(output_key("detection_boxes"), "detection_boxes");
        assert_eq!(output_key("detection_boxes:0"), "detection_boxes");
        assert_eq!(output_key("a/b/detection_scores:12"), "detection_scores");
        assert_eq!(output_key("odd:name"), "odd:name");
    }

    #[test]
    fn test_resolve_model_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_model_path(dir.path()),
            Err(Error::Setup(_))
        ));

        let model = dir.path().join("model.onnx");
        std::fs::write(&model, b"").unwrap();
        assert_eq!(resolve_model_path(dir.path()).unwrap(), model);
        assert_eq!(resolve_model_path(&model).unwrap(), model);
    }
}
