// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code lives here:
//
//   model.rs     — the architecture catalog
//                  linear, dnn, dnn_dropout and cnn, behind one
//                  ImageClassifier module enum
//
//   model_fn.rs  — the mode dispatcher
//                  logits → probabilities/class_ids, plus loss and
//                  a train step (TRAIN) or accuracy (EVAL)
//
//   serving.rs   — the serving adapter
//                  rank-3 requests in, predictions out
//
//   trainer.rs   — the training / evaluation driver
//                  step loop, checkpoints, periodic evaluation,
//                  latest-only export
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Architecture catalog
pub mod model;

/// Mode dispatcher: TRAIN / EVAL / PREDICT outputs
pub mod model_fn;

/// Serving signature and rank-3 → rank-4 adapter
pub mod serving;

/// Training loop with evaluation and export
pub mod trainer;

/// Backend used for evaluation, export and serving.
#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;
#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

/// Backend used for training (gradients recorded).
pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;
