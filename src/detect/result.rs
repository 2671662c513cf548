use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Reference point used for ground projection.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.x_min as f64 + self.x_max as f64) / 2.0,
            (self.y_min as f64 + self.y_max as f64) / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox {
            x_min: self.x_min.max(other.x_min),
            y_min: self.y_min.max(other.y_min),
            x_max: self.x_max.min(other.x_max),
            y_max: self.y_max.min(other.y_max),
        };
        if inter.width() <= 0.0 || inter.height() <= 0.0 {
            return 0.0;
        }
        let inter_area = inter.area();
        let union = self.area() + other.area() - inter_area;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        inter_area / union
    }

    /// Clamp to `width x height`. Returns `None` when nothing valid remains.
    pub fn clamped(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let w = width as f32;
        let h = height as f32;
        let clamped = BoundingBox {
            x_min: self.x_min.clamp(0.0, w),
            y_min: self.y_min.clamp(0.0, h),
            x_max: self.x_max.clamp(0.0, w),
            y_max: self.y_max.clamp(0.0, h),
        };
        if clamped.x_min < clamped.x_max && clamped.y_min < clamped.y_max {
            Some(clamped)
        } else {
            None
        }
    }
}

/// One detected object. Immutable once produced by a backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_is_box_centre() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(bbox.centroid(), (20.0, 40.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn clamps_into_image_bounds() {
        let bbox = BoundingBox::new(-5.0, 10.0, 700.0, 490.0);
        let clamped = bbox.clamped(640, 480).unwrap();
        assert_eq!(clamped, BoundingBox::new(0.0, 10.0, 640.0, 480.0));
    }

    #[test]
    fn clamping_drops_boxes_outside_the_image() {
        assert!(BoundingBox::new(650.0, 10.0, 700.0, 20.0)
            .clamped(640, 480)
            .is_none());
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 20.0)
            .clamped(640, 480)
            .is_none());
        assert!(BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0)
            .clamped(640, 480)
            .is_none());
    }
}
