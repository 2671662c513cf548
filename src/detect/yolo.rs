//! YOLO-style pre- and post-processing shared by model backends.
//!
//! Preprocessing letterboxes the source image onto a square gray canvas.
//! Postprocessing accepts the usual single-head layout (`[1, 4 + C, N]` or
//! `[1, N, 4 + C]`, boxes as centre/size in input pixels), keeps the best
//! class per anchor and applies class-aware non-maximum suppression.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};

use crate::detect::result::{BoundingBox, Detection};
use crate::frame::DecodedImage;

/// Canvas fill value for letterbox padding.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Hard cap on candidates entering NMS.
const MAX_NMS_INPUTS: usize = 3_000;

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_labels() -> Vec<String> {
    COCO_LABELS.iter().map(|l| l.to_string()).collect()
}

/// Read class names, one per line. Blank lines are skipped.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let labels: Vec<String> = raw
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(labels)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// Mapping between source-image pixels and the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub resized_w: u32,
    pub resized_h: u32,
    pub src_w: u32,
    pub src_h: u32,
}

impl Letterbox {
    pub fn new(src_w: u32, src_h: u32, input_size: u32) -> Result<Self> {
        if src_w == 0 || src_h == 0 || input_size == 0 {
            return Err(anyhow!(
                "cannot letterbox {}x{} into {}",
                src_w,
                src_h,
                input_size
            ));
        }
        let scale = (input_size as f32 / src_w as f32).min(input_size as f32 / src_h as f32);
        let resized_w = ((src_w as f32 * scale).round() as u32).clamp(1, input_size);
        let resized_h = ((src_h as f32 * scale).round() as u32).clamp(1, input_size);
        Ok(Self {
            scale,
            pad_x: ((input_size - resized_w) / 2) as f32,
            pad_y: ((input_size - resized_h) / 2) as f32,
            resized_w,
            resized_h,
            src_w,
            src_h,
        })
    }

    /// Map a model-space box back to source pixels.
    pub fn to_source(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(
            (x1 - self.pad_x) / self.scale,
            (y1 - self.pad_y) / self.scale,
            (x2 - self.pad_x) / self.scale,
            (y2 - self.pad_y) / self.scale,
        )
    }
}

/// Letterbox `image` into a planar RGB `3 x size x size` buffer scaled to `0..1`.
pub fn letterbox_chw(image: &DecodedImage, input_size: u32) -> Result<(Vec<f32>, Letterbox)> {
    let lb = Letterbox::new(image.width(), image.height(), input_size)?;
    let resized = imageops::resize(image.rgb(), lb.resized_w, lb.resized_h, FilterType::Triangle);

    let size = input_size as usize;
    let plane = size * size;
    let mut data = vec![PAD_VALUE; plane * 3];
    let off_x = lb.pad_x as usize;
    let off_y = lb.pad_y as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = (off_y + y as usize) * size + off_x + x as usize;
        for channel in 0..3 {
            data[channel * plane + idx] = pixel[channel] as f32 / 255.0;
        }
    }
    Ok((data, lb))
}

/// Decode a raw YOLO output tensor into source-space detections.
pub fn decode_output(
    data: &[f32],
    shape: &[usize],
    labels: &[String],
    letterbox: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<Detection>> {
    let dims: Vec<usize> = match shape {
        [1, a, b] => vec![*a, *b],
        [a, b] => vec![*a, *b],
        _ => return Err(anyhow!("unexpected model output shape {:?}", shape)),
    };
    let (a, b) = (dims[0], dims[1]);
    if a.checked_mul(b) != Some(data.len()) {
        return Err(anyhow!(
            "model output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            a.saturating_mul(b)
        ));
    }

    let features = labels.len() + 4;
    // Rows are anchors in the transposed layout, features otherwise.
    let (anchors, feature_major) = if a == features {
        (b, true)
    } else if b == features {
        (a, false)
    } else {
        return Err(anyhow!(
            "model output shape {:?} does not match {} classes",
            shape,
            labels.len()
        ));
    };
    let at = |anchor: usize, feature: usize| -> f32 {
        if feature_major {
            data[feature * anchors + anchor]
        } else {
            data[anchor * features + feature]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_idx, score) = (0..labels.len())
            .map(|c| (c, at(anchor, 4 + c)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }
        let bbox = letterbox.to_source(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
        let Some(bbox) = bbox.clamped(letterbox.src_w, letterbox.src_h) else {
            continue;
        };
        candidates.push(Detection::new(
            labels[class_idx].clone(),
            score.min(1.0),
            bbox,
        ));
    }

    let mut kept = non_max_suppression(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);
    log::debug!("yolo decode kept {} of {} anchors", kept.len(), anchors);
    Ok(kept)
}

/// Greedy class-aware NMS. Output is sorted by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(MAX_NMS_INPUTS);

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn labels() -> Vec<String> {
        vec!["person".to_string(), "car".to_string()]
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let lb = Letterbox::new(1280, 640, 640).unwrap();
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.resized_w, lb.resized_h), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0.0, 160.0));
        let bbox = lb.to_source(100.0, 160.0, 200.0, 480.0);
        assert_eq!(bbox, BoundingBox::new(200.0, 0.0, 400.0, 640.0));
    }

    #[test]
    fn letterbox_chw_fills_padding() {
        let mut rgb = RgbImage::new(4, 2);
        for pixel in rgb.pixels_mut() {
            pixel.0 = [255, 0, 0];
        }
        let image = DecodedImage::from_rgb(rgb).unwrap();
        let (data, lb) = letterbox_chw(&image, 4).unwrap();
        assert_eq!(data.len(), 3 * 16);
        assert_eq!(lb.pad_y, 1.0);
        // Row 0 is padding, row 1 is image content.
        assert_eq!(data[0], PAD_VALUE);
        assert_eq!(data[4], 1.0);
        assert_eq!(data[16 + 4], 0.0);
    }

    #[test]
    fn decodes_feature_major_output() {
        let lb = Letterbox::new(640, 640, 640).unwrap();
        // Two anchors, layout [1, 6, 2]: cx, cy, w, h, person, car.
        let data = vec![
            100.0, 400.0, // cx
            100.0, 300.0, // cy
            20.0, 40.0, // w
            40.0, 20.0, // h
            0.9, 0.1, // person
            0.05, 0.7, // car
        ];
        let detections =
            decode_output(&data, &[1, 6, 2], &labels(), &lb, &YoloParams::default()).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "person");
        assert_eq!(detections[0].bbox, BoundingBox::new(90.0, 80.0, 110.0, 120.0));
        assert_eq!(detections[1].label, "car");
        assert_eq!(detections[1].bbox.centroid(), (400.0, 300.0));
    }

    #[test]
    fn decodes_anchor_major_output_and_filters_low_scores() {
        let lb = Letterbox::new(640, 640, 640).unwrap();
        let data = vec![
            50.0, 50.0, 10.0, 10.0, 0.2, 0.3, //
            60.0, 60.0, 10.0, 10.0, 0.8, 0.1,
        ];
        let detections =
            decode_output(&data, &[1, 2, 6], &labels(), &lb, &YoloParams::default()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.8);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let lb = Letterbox::new(640, 640, 640).unwrap();
        let params = YoloParams::default();
        assert!(decode_output(&[0.0; 10], &[1, 5, 2], &labels(), &lb, &params).is_err());
        assert!(decode_output(&[0.0; 12], &[1, 6, 3], &labels(), &lb, &params).is_err());
        assert!(decode_output(&[0.0; 12], &[2, 1, 6, 2], &labels(), &lb, &params).is_err());
    }

    #[test]
    fn nms_is_class_aware() {
        let a = Detection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = Detection::new("person", 0.8, BoundingBox::new(1.0, 0.0, 11.0, 10.0));
        let c = Detection::new("car", 0.7, BoundingBox::new(1.0, 0.0, 11.0, 10.0));
        let kept = non_max_suppression(vec![b, c, a], 0.45);
        let names: Vec<(&str, f32)> = kept
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
            .collect();
        assert_eq!(names, vec![("person", 0.9), ("car", 0.7)]);
    }

    #[test]
    fn loads_labels_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "person\n\n  car \n").unwrap();
        assert_eq!(load_labels(&path).unwrap(), labels());
        std::fs::write(&path, "\n").unwrap();
        assert!(load_labels(&path).is_err());
    }

    #[test]
    fn coco_labels_start_with_person() {
        let labels = coco_labels();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels[0], "person");
    }
}
