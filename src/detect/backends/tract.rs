#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{self, YoloParams};
use crate::frame::DecodedImage;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// The optimized plan is immutable after loading, so one instance serves all
/// requests. It does not perform any network I/O or write to disk.
pub struct TractBackend {
    model: Plan,
    input_size: u32,
    labels: Vec<String>,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for square `input_size` input.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded detector model {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            labels: yolo::coco_labels(),
            params: YoloParams::default(),
        })
    }

    /// Replace the class names the model was trained on.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Override the decoding thresholds.
    pub fn with_params(mut self, params: YoloParams) -> Self {
        self.params = params;
        self
    }

    fn build_input(&self, image: &DecodedImage) -> Result<(Tensor, yolo::Letterbox)> {
        let (data, letterbox) = yolo::letterbox_chw(image, self.input_size)?;
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), data)
            .context("letterboxed input has the wrong size")?;
        Ok((input.into_tensor(), letterbox))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = scores.shape().to_vec();
        let data: Vec<f32> = scores.iter().copied().collect();
        yolo::decode_output(&data, &shape, &self.labels, &letterbox, &self.params)
    }

    fn warm_up(&self) -> Result<()> {
        let side = self.input_size as usize;
        let input = Tensor::zero::<f32>(&[1, 3, side, side])?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}
