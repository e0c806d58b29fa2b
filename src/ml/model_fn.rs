// ============================================================
// Layer 5 — Model Function (mode dispatch)
// ============================================================
// One entry point builds the per-mode outputs of a catalog model:
//
//   all modes     probabilities = softmax(logits)
//                 class_ids     = argmax(probabilities)
//   TRAIN / EVAL  loss = mean(softmax_cross_entropy(logits, labels))
//   TRAIN         a TrainStep handle (backward + Adam update)
//   EVAL          accuracy = mean(class_ids == argmax(labels))
//
// The result is an enum, so "EVAL has no train step" and
// "PREDICT has no loss" are facts of the type, not conventions.
//
// Burn folds running-statistic updates (batch norm) into the
// forward pass, which always happens before TrainStep::apply.
//
// Reference: Burn Book §5 (Training), Kingma & Ba (2015) Adam

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{
        activation::{log_softmax, softmax},
        backend::AutodiffBackend,
    },
};
use serde::{Deserialize, Serialize};

use crate::domain::error::ClassifierError;
use crate::domain::hparams::Hyperparameters;
use crate::domain::mode::Mode;
use crate::ml::model::ImageClassifier;

// ─── Predictions ──────────────────────────────────────────────────────────────
/// Always present, whatever the mode.
#[derive(Debug, Clone)]
pub struct Predictions<B: Backend> {
    /// Shape: [batch, num_classes], rows sum to 1
    pub probabilities: Tensor<B, 2>,

    /// Shape: [batch], values in [0, num_classes)
    pub class_ids: Tensor<B, 1, Int>,
}

/// Host-side copy of a prediction batch, as returned to serving clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub probabilities: Vec<Vec<f32>>,
    pub class_ids:     Vec<u8>,
}

impl<B: Backend> Predictions<B> {
    pub fn into_host(self) -> PredictionSet {
        let [_, num_classes] = self.probabilities.dims();
        let flat: Vec<f32> = self.probabilities.into_data().iter::<f32>().collect();
        let probabilities = flat
            .chunks(num_classes.max(1))
            .map(|row| row.to_vec())
            .collect();
        let class_ids = self.class_ids
            .into_data()
            .iter::<i64>()
            .map(|id| id as u8)
            .collect();
        PredictionSet { probabilities, class_ids }
    }
}

// ─── Train step ───────────────────────────────────────────────────────────────
/// Opaque handle for "apply one optimisation update to reduce this loss".
/// Only produced in TRAIN mode; applying it needs an autodiff backend.
#[derive(Debug)]
pub struct TrainStep<B: Backend> {
    loss:          Tensor<B, 1>,
    learning_rate: f64,
}

impl<B: Backend> TrainStep<B> {
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl<B: AutodiffBackend> TrainStep<B> {
    /// Backward pass, then one optimiser update of every trainable parameter.
    pub fn apply<O>(self, model: ImageClassifier<B>, optim: &mut O) -> ImageClassifier<B>
    where
        O: Optimizer<ImageClassifier<B>, B>,
        ImageClassifier<B>: AutodiffModule<B>,
    {
        let grads = self.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        optim.step(self.learning_rate, model, grads)
    }
}

// ─── Eval metrics ─────────────────────────────────────────────────────────────
/// Streaming accuracy counts for one batch; sum them across batches
/// before dividing to get the pass accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalMetrics {
    pub correct: usize,
    pub total:   usize,
}

impl EvalMetrics {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.correct as f64 / self.total as f64 }
    }
}

// ─── Model output ─────────────────────────────────────────────────────────────
#[derive(Debug)]
pub struct TrainOutput<B: Backend> {
    pub predictions: Predictions<B>,
    pub loss:        Tensor<B, 1>,
    pub train_step:  TrainStep<B>,
}

#[derive(Debug)]
pub struct EvalOutput<B: Backend> {
    pub predictions: Predictions<B>,
    pub loss:        Tensor<B, 1>,
    pub metrics:     EvalMetrics,
}

#[derive(Debug)]
pub struct PredictOutput<B: Backend> {
    pub predictions: Predictions<B>,
}

#[derive(Debug)]
pub enum ModelOutput<B: Backend> {
    Train(TrainOutput<B>),
    Eval(EvalOutput<B>),
    Predict(PredictOutput<B>),
}

impl<B: Backend> ModelOutput<B> {
    pub fn mode(&self) -> Mode {
        match self {
            ModelOutput::Train(_)   => Mode::Train,
            ModelOutput::Eval(_)    => Mode::Eval,
            ModelOutput::Predict(_) => Mode::Predict,
        }
    }

    pub fn predictions(&self) -> &Predictions<B> {
        match self {
            ModelOutput::Train(out)   => &out.predictions,
            ModelOutput::Eval(out)    => &out.predictions,
            ModelOutput::Predict(out) => &out.predictions,
        }
    }

    pub fn into_predictions(self) -> Predictions<B> {
        match self {
            ModelOutput::Train(out)   => out.predictions,
            ModelOutput::Eval(out)    => out.predictions,
            ModelOutput::Predict(out) => out.predictions,
        }
    }

    /// Present in TRAIN and EVAL only.
    pub fn loss(&self) -> Option<&Tensor<B, 1>> {
        match self {
            ModelOutput::Train(out)  => Some(&out.loss),
            ModelOutput::Eval(out)   => Some(&out.loss),
            ModelOutput::Predict(_)  => None,
        }
    }

    pub fn eval_metrics(&self) -> Option<EvalMetrics> {
        match self {
            ModelOutput::Eval(out) => Some(out.metrics),
            _ => None,
        }
    }

    /// Asking for an optimisation step outside TRAIN is a caller bug.
    pub fn into_train_step(self) -> Result<TrainStep<B>, ClassifierError> {
        match self {
            ModelOutput::Train(out) => Ok(out.train_step),
            other => Err(ClassifierError::contract_violation(format!(
                "optimisation step requested from a {} output", other.mode()
            ))),
        }
    }

    pub fn into_eval(self) -> Result<EvalOutput<B>, ClassifierError> {
        match self {
            ModelOutput::Eval(out) => Ok(out),
            other => Err(ClassifierError::contract_violation(format!(
                "eval metrics requested from a {} output", other.mode()
            ))),
        }
    }
}

// ─── Losses and metrics ───────────────────────────────────────────────────────
/// Mean softmax cross-entropy against one-hot (or soft) labels.
pub fn softmax_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (labels * log_softmax(logits, 1))
        .sum_dim(1)
        .neg()
        .mean()
}

fn accuracy_counts<B: Backend>(
    class_ids: Tensor<B, 1, Int>,
    labels:    Tensor<B, 2>,
) -> EvalMetrics {
    let total   = class_ids.dims()[0];
    // argmax(1) returns [batch, 1]; flatten before comparing with [batch]
    let targets = labels.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = class_ids
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    EvalMetrics { correct: correct as usize, total }
}

// ─── The model function ───────────────────────────────────────────────────────
/// Build the outputs of `model` for one batch in the given mode.
///
/// `labels` must be present in TRAIN and EVAL; it is ignored in PREDICT.
pub fn image_classifier<B: Backend>(
    model:   &ImageClassifier<B>,
    images:  Tensor<B, 4>,
    labels:  Option<Tensor<B, 2>>,
    mode:    Mode,
    hparams: &Hyperparameters,
) -> Result<ModelOutput<B>, ClassifierError> {
    if model.kind() != hparams.model {
        return Err(ClassifierError::configuration(format!(
            "model is '{}' but hyperparameters select '{}'", model.kind(), hparams.model
        )));
    }

    let labels = if mode.requires_labels() {
        let labels = labels.ok_or_else(|| {
            ClassifierError::contract_violation(format!("{mode} mode requires a label batch"))
        })?;
        Some(labels)
    } else {
        None
    };

    let (logits, num_classes) = model.logits(images, mode)?;

    let probabilities = softmax(logits.clone(), 1);
    let class_ids     = probabilities.clone().argmax(1).flatten::<1>(0, 1);
    let predictions   = Predictions { probabilities, class_ids };

    let Some(labels) = labels else {
        return Ok(ModelOutput::Predict(PredictOutput { predictions }));
    };

    let [batch_size, _] = logits.dims();
    if labels.dims() != [batch_size, num_classes] {
        return Err(ClassifierError::shape_mismatch(
            format!("[{batch_size}, {num_classes}] one-hot labels"),
            &labels.dims(),
        ));
    }

    let loss = softmax_cross_entropy(logits, labels.clone());

    if mode.is_training() {
        let train_step = TrainStep { loss: loss.clone(), learning_rate: hparams.learning_rate };
        Ok(ModelOutput::Train(TrainOutput { predictions, loss, train_step }))
    } else {
        let metrics = accuracy_counts(predictions.class_ids.clone(), labels);
        Ok(ModelOutput::Eval(EvalOutput { predictions, loss, metrics }))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use burn::tensor::Distribution;

    use crate::data::batcher::one_hot;
    use crate::domain::hparams::ArchitectureKind;
    use crate::domain::{HEIGHT, NCLASSES, WIDTH};

    type TestBackend         = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn images<B: Backend>(batch: usize, device: &B::Device) -> Tensor<B, 4> {
        Tensor::random([batch, HEIGHT, WIDTH, 1], Distribution::Uniform(0.0, 1.0), device)
    }

    fn labels<B: Backend>(batch: usize, device: &B::Device) -> Tensor<B, 2> {
        let ids: Vec<u8> = (0..batch).map(|i| (i % NCLASSES) as u8).collect();
        Tensor::from_data(
            TensorData::new(one_hot(&ids, NCLASSES), [batch, NCLASSES]),
            device,
        )
    }

    fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
        t.clone().into_scalar().elem::<f64>()
    }

    #[test]
    fn test_predict_needs_no_labels() {
        let device = Default::default();
        for kind in ArchitectureKind::ALL {
            let hp    = Hyperparameters::new(kind, 0.01, 10);
            let model = kind.init::<TestBackend>(&hp, &device).unwrap();
            let out   = image_classifier(&model, images(5, &device), None, Mode::Predict, &hp)
                .unwrap();

            assert_eq!(out.mode(), Mode::Predict);
            assert!(out.loss().is_none());
            assert!(out.eval_metrics().is_none());

            let host = out.into_predictions().into_host();
            assert_eq!(host.class_ids.len(), 5);
            assert!(host.class_ids.iter().all(|&id| usize::from(id) < NCLASSES));
            for row in &host.probabilities {
                assert_eq!(row.len(), NCLASSES);
                let sum: f32 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
            }
        }
    }

    #[test]
    fn test_train_and_eval_require_labels() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).unwrap();
        for mode in [Mode::Train, Mode::Eval] {
            let err = image_classifier(&model, images(2, &device), None, mode, &hp).unwrap_err();
            assert!(matches!(err, ClassifierError::ContractViolation(_)));
        }
    }

    #[test]
    fn test_train_step_only_from_train_output() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).unwrap();

        let eval = image_classifier(
            &model, images(4, &device), Some(labels(4, &device)), Mode::Eval, &hp,
        ).unwrap();
        assert!(matches!(
            eval.into_train_step(),
            Err(ClassifierError::ContractViolation(_))
        ));

        let predict = image_classifier(&model, images(4, &device), None, Mode::Predict, &hp)
            .unwrap();
        assert!(predict.into_train_step().is_err());
    }

    #[test]
    fn test_label_shape_must_match_logits() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).unwrap();
        let err = image_classifier(
            &model, images(4, &device), Some(labels(3, &device)), Mode::Eval, &hp,
        ).unwrap_err();
        assert!(matches!(err, ClassifierError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_hparams_must_match_model_kind() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).unwrap();
        let other  = Hyperparameters::new(ArchitectureKind::Dnn, 0.01, 10);
        assert!(matches!(
            image_classifier(&model, images(1, &device), None, Mode::Predict, &other),
            Err(ClassifierError::Configuration(_))
        ));
    }

    #[test]
    fn test_cross_entropy_of_perfect_prediction_is_small() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[20.0, 0.0], [0.0, 20.0]], &device);
        let labels = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        let loss   = scalar(&softmax_cross_entropy(logits, labels));
        assert!((0.0..1e-6).contains(&loss));

        let uniform = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        let target  = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 1.0, 0.0]], &device);
        let loss    = scalar(&softmax_cross_entropy(uniform, target));
        assert!((loss - 4.0f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_eval_accuracy_counts() {
        let metrics = EvalMetrics { correct: 3, total: 4 };
        assert_eq!(metrics.accuracy(), 0.75);
        assert_eq!(EvalMetrics::default().accuracy(), 0.0);
    }

    // hparams {linear, lr 0.01, 10 steps}, 100 images, 10 classes
    #[test]
    fn test_linear_scenario_ten_train_steps_then_eval() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let mut model = ArchitectureKind::Linear
            .init::<TestAutodiffBackend>(&hp, &device)
            .unwrap();
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, ImageClassifier<_>>();

        let batch_images = images::<TestAutodiffBackend>(100, &device);
        let batch_labels = labels::<TestAutodiffBackend>(100, &device);

        let mut global_step = 0u64;
        while global_step < hp.train_steps {
            let out = image_classifier(
                &model,
                batch_images.clone(),
                Some(batch_labels.clone()),
                Mode::Train,
                &hp,
            ).unwrap();

            let loss = scalar(out.loss().unwrap());
            assert!(loss >= 0.0);

            let step = out.into_train_step().unwrap();
            assert_eq!(step.learning_rate(), 0.01);
            model = step.apply(model, &mut optim);
            global_step += 1;
        }
        assert_eq!(global_step, 10);

        let model_valid = model.valid();
        let eval = image_classifier(
            &model_valid,
            images::<TestBackend>(20, &device),
            Some(labels::<TestBackend>(20, &device)),
            Mode::Eval,
            &hp,
        ).unwrap().into_eval().unwrap();

        assert_eq!(eval.metrics.total, 20);
        let accuracy = eval.metrics.accuracy();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(scalar(&eval.loss) >= 0.0);
    }

    #[test]
    fn test_training_reduces_loss_on_fixed_batch() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 30);
        let mut model = ArchitectureKind::Linear
            .init::<TestAutodiffBackend>(&hp, &device)
            .unwrap();
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, ImageClassifier<_>>();

        let x = images::<TestAutodiffBackend>(20, &device);
        let y = labels::<TestAutodiffBackend>(20, &device);

        let mut losses = Vec::new();
        for _ in 0..hp.train_steps {
            let out = image_classifier(&model, x.clone(), Some(y.clone()), Mode::Train, &hp)
                .unwrap();
            losses.push(scalar(out.loss().unwrap()));
            model = out.into_train_step().unwrap().apply(model, &mut optim);
        }
        assert!(losses.last().unwrap() < losses.first().unwrap());
    }
}
