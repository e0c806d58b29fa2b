// ============================================================
// Layer 5 — Serving Adapter
// ============================================================
// The public serving contract never changes with the model:
//
//   input   "image"        rank 3  [batch, 28, 28]   (no channel)
//   output  "predictions"  { probabilities, class_ids }
//
// The catalog needs rank 4 [batch, 28, 28, 1], so the exported
// servable carries its own adapter that appends the channel
// axis. Requests that are already rank 4 are rejected.

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::ClassifierError;
use crate::domain::hparams::Hyperparameters;
use crate::domain::mode::Mode;
use crate::domain::{HEIGHT, WIDTH};
use crate::ml::model::ImageClassifier;
use crate::ml::model_fn::{image_classifier, PredictionSet, Predictions};

pub const SIGNATURE_NAME: &str = "predictions";
pub const INPUT_NAME: &str = "image";

// ─── Signature ────────────────────────────────────────────────────────────────
/// Named export of the predictions, written next to every export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingSignature {
    pub name:        String,
    pub input:       String,
    /// -1 marks the batch dimension
    pub input_shape: Vec<i64>,
    pub outputs:     Vec<String>,
}

impl ServingSignature {
    pub fn predictions() -> Self {
        Self {
            name:        SIGNATURE_NAME.to_string(),
            input:       INPUT_NAME.to_string(),
            input_shape: vec![-1, HEIGHT as i64, WIDTH as i64],
            outputs:     vec!["probabilities".to_string(), "class_ids".to_string()],
        }
    }
}

/// Append the channel axis: [batch, H, W] → [batch, H, W, 1].
pub fn serving_input_fn<B: Backend>(image: Tensor<B, 3>) -> Tensor<B, 4> {
    image.unsqueeze_dim(3)
}

// ─── Requests ─────────────────────────────────────────────────────────────────
/// A decoded inference request: a flat pixel buffer plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ServingRequest {
    data:  Vec<f32>,
    shape: Vec<usize>,
}

impl ServingRequest {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, ClassifierError> {
        let request = Self { data, shape };
        request.validate()?;
        Ok(request)
    }

    /// Parse `{"image": [[[...]]]}` into a request, inferring the shape
    /// from the nesting.
    pub fn from_json(body: &Value) -> Result<Self, ClassifierError> {
        let image = body.get(INPUT_NAME).ok_or_else(|| {
            ClassifierError::contract_violation(format!("request has no '{INPUT_NAME}' field"))
        })?;

        let mut shape = Vec::new();
        let mut level = image;
        while let Value::Array(items) = level {
            shape.push(items.len());
            match items.first() {
                Some(first) => level = first,
                None => break,
            }
        }

        // Reject the shape before sizing a buffer from it
        check_request_shape(&shape)?;
        let mut data = Vec::with_capacity(shape.iter().product());
        flatten_into(image, &shape, &mut data)?;
        Self::new(data, shape)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.shape[0]
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        check_request_shape(&self.shape)?;
        let expected = self.shape.iter().product::<usize>();
        if self.data.len() != expected {
            return Err(ClassifierError::shape_mismatch(
                format!("{expected} pixel values"),
                &[self.data.len()],
            ));
        }
        Ok(())
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::from_data(
            TensorData::new(self.data.clone(), [self.shape[0], HEIGHT, WIDTH]),
            device,
        )
    }
}

fn check_request_shape(shape: &[usize]) -> Result<(), ClassifierError> {
    match shape {
        [batch, HEIGHT, WIDTH] if *batch > 0 => Ok(()),
        _ => Err(ClassifierError::shape_mismatch(
            format!("'{INPUT_NAME}' of shape [batch, {HEIGHT}, {WIDTH}]"),
            shape,
        )),
    }
}

fn flatten_into(value: &Value, shape: &[usize], out: &mut Vec<f32>) -> Result<(), ClassifierError> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) if items.len() == len => {
            items.iter().try_for_each(|item| flatten_into(item, rest, out))
        }
        (Value::Number(n), None) => {
            let v = n.as_f64().ok_or_else(|| {
                ClassifierError::contract_violation(format!("pixel value {n} is not a float"))
            })?;
            out.push(v as f32);
            Ok(())
        }
        (Value::Array(items), _) => Err(ClassifierError::shape_mismatch(
            "a rectangular nested array",
            &[items.len()],
        )),
        _ => Err(ClassifierError::contract_violation(format!(
            "'{INPUT_NAME}' must be a nested array of numbers"
        ))),
    }
}

// ─── Servable ─────────────────────────────────────────────────────────────────
/// A frozen model behind the serving contract. Always runs in PREDICT mode.
pub struct Servable<B: Backend> {
    model:     ImageClassifier<B>,
    hparams:   Hyperparameters,
    signature: ServingSignature,
    device:    B::Device,
}

impl<B: Backend> Servable<B> {
    pub fn new(model: ImageClassifier<B>, hparams: Hyperparameters, device: B::Device) -> Self {
        Self { model, hparams, signature: ServingSignature::predictions(), device }
    }

    pub fn signature(&self) -> &ServingSignature {
        &self.signature
    }

    pub fn hparams(&self) -> &Hyperparameters {
        &self.hparams
    }

    /// Rank-3 tensor in, device-side predictions out.
    pub fn predict_tensor(&self, image: Tensor<B, 3>) -> Result<Predictions<B>, ClassifierError> {
        let images = serving_input_fn(image);
        let output = image_classifier(&self.model, images, None, Mode::Predict, &self.hparams)?;
        Ok(output.into_predictions())
    }

    pub fn predict(&self, request: &ServingRequest) -> Result<PredictionSet, ClassifierError> {
        let predictions = self.predict_tensor(request.to_tensor::<B>(&self.device))?;
        tracing::debug!("Served {} predictions", request.batch_size());
        Ok(predictions.into_host())
    }
}
