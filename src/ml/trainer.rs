// ============================================================
// Layer 5 — Training / Evaluation Driver
// ============================================================
// Runs one training job from configuration to exported model:
//
//   Initializing ─► Training ⇄ (Evaluating ─► Exporting) ─► Terminal
//
//   - Training:   one TRAIN dispatch + optimiser update per batch,
//                 the shuffled train loader is re-iterated until
//                 global_step reaches train_steps
//   - Checkpoint: every checkpoint_every_steps steps
//   - Evaluating: after a checkpoint, once eval_interval_secs have
//                 passed since the last evaluation
//   - Exporting:  after every evaluation (latest-only retention)
//   - Terminal:   final checkpoint, then exactly one evaluation and
//                 one export of the weights at train_steps
//
// Training runs on the autodiff backend; evaluation and export use
// model.valid(), the same weights on the inner backend, so dropout
// is off and no graph is recorded.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::AdamConfig,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::JobConfig;
use crate::data::batcher::{ImageBatch, ImageBatcher};
use crate::data::dataset::ImageDataset;
use crate::domain::hparams::Hyperparameters;
use crate::domain::job_state::TrainingJobState;
use crate::domain::mode::Mode;
use crate::infra::{
    checkpoint::CheckpointManager,
    exporter::Exporter,
    metrics::{EvalResult, SummaryWriter},
};
use crate::ml::model::ImageClassifier;
use crate::ml::model_fn::{image_classifier, EvalMetrics};
use crate::ml::TrainBackend;

/// What a finished job did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub state:           TrainingJobState,
    /// Every evaluation of this run, in step order
    pub evaluations:     Vec<EvalResult>,
    /// The evaluation of the weights at train_steps
    pub final_eval:      Option<EvalResult>,
    pub latest_export:   Option<PathBuf>,
    pub exports_written: usize,
}

/// Train on the default backend for this build.
pub fn run_training(
    cfg:   &JobConfig,
    train: ImageDataset,
    eval:  ImageDataset,
) -> Result<JobReport> {
    let device = <TrainBackend as Backend>::Device::default();
    tracing::info!("Using device: {:?}", device);
    train_and_evaluate::<TrainBackend>(cfg, train, eval, &device)
}

pub fn train_and_evaluate<B: AutodiffBackend>(
    cfg:    &JobConfig,
    train:  ImageDataset,
    eval:   ImageDataset,
    device: &B::Device,
) -> Result<JobReport> {
    // ── Initializing ──────────────────────────────────────────────────────────
    cfg.validate()?;
    let hp    = &cfg.hparams;
    let _span = tracing::info_span!("job", model = %hp.model).entered();

    let seed = cfg.seed.unwrap_or_else(rand::random);
    B::seed(seed);
    tracing::info!("Shuffle seed: {}", seed);

    let ckpt          = CheckpointManager::new(cfg.checkpoint_dir())?;
    let exporter      = Exporter::new(cfg.export_dir(), cfg.exports_to_keep);
    let mut summaries = SummaryWriter::open(cfg.eval_dir())?;

    let mut model: ImageClassifier<B> = hp.model.init(hp, device)?;
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, ImageClassifier<B>>();
    let mut state = TrainingJobState::new(ckpt.dir(), exporter.root());

    if let Some(saved) = ckpt.load_state()? {
        let stored = ckpt.load_hparams()?;
        hp.check_resumable_from(&stored)?;
        model = ckpt.load_model(model, saved.global_step, device)?;
        optim = ckpt.load_optimizer(optim, saved.global_step, device)?;
        state.global_step         = saved.global_step;
        state.last_evaluated_step = saved.last_evaluated_step;
        tracing::info!("Resumed from step {}", state.global_step);
    }
    ckpt.save_hparams(hp)?;

    let eval_loader = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(cfg.eval_batch_size)
        .build(eval);

    let mut report = JobReport {
        state:           state.clone(),
        evaluations:     Vec::new(),
        final_eval:      None,
        latest_export:   exporter.latest()?,
        exports_written: 0,
    };

    // ── Training ──────────────────────────────────────────────────────────────
    if !state.is_terminal(hp.train_steps) {
        if train.example_count() == 0 {
            bail!("Training split is empty; nothing to train on");
        }
        tracing::info!(
            "Training {} from step {} to {} on {} examples",
            hp.model, state.global_step, hp.train_steps, train.example_count(),
        );

        let train_loader = DataLoaderBuilder::new(ImageBatcher::<B>::new(device.clone()))
            .batch_size(cfg.train_batch_size)
            .shuffle(seed)
            .build(train);

        let eval_interval = Duration::from_secs(cfg.eval_interval_secs);
        let mut last_eval = Instant::now();

        'training: loop {
            for batch in train_loader.iter() {
                let output = image_classifier(&model, batch.images, Some(batch.labels), Mode::Train, hp)?;
                let loss   = output.loss().cloned();
                model = output.into_train_step()?.apply(model, &mut optim);
                state.global_step += 1;

                if state.is_terminal(hp.train_steps) {
                    break 'training;
                }
                if state.global_step % cfg.checkpoint_every_steps != 0 {
                    continue;
                }

                if let Some(loss) = loss {
                    tracing::info!(
                        "Step {:>6}/{} | loss={:.4}",
                        state.global_step, hp.train_steps, loss.into_scalar().elem::<f64>(),
                    );
                }
                ckpt.save(&model, &optim, &state)?;

                if last_eval.elapsed() >= eval_interval {
                    let result = evaluate_and_export(
                        &model, eval_loader.as_ref(), hp, &mut state, &exporter, &mut summaries, &mut report,
                    )?;
                    report.evaluations.push(result);
                    ckpt.save_state(&state)?;
                    last_eval = Instant::now();
                }
            }
        }
    }

    // ── Terminal ──────────────────────────────────────────────────────────────
    ckpt.save(&model, &optim, &state)?;
    if state.needs_evaluation() {
        let result = evaluate_and_export(
            &model, eval_loader.as_ref(), hp, &mut state, &exporter, &mut summaries, &mut report,
        )?;
        report.evaluations.push(result.clone());
        report.final_eval = Some(result);
        ckpt.save_state(&state)?;
    } else {
        tracing::info!("Step {} was already evaluated and exported", state.global_step);
    }

    tracing::info!("Training complete at step {}", state.global_step);
    report.state = state;
    Ok(report)
}

fn evaluate_and_export<B: AutodiffBackend>(
    model:       &ImageClassifier<B>,
    eval_loader: &dyn DataLoader<ImageBatch<B::InnerBackend>>,
    hparams:     &Hyperparameters,
    state:       &mut TrainingJobState,
    exporter:    &Exporter,
    summaries:   &mut SummaryWriter,
    report:      &mut JobReport,
) -> Result<EvalResult> {
    let model_valid = model.valid();

    let result = evaluate(&model_valid, eval_loader, hparams, state.global_step)?;
    tracing::info!(
        "Eval @ step {} | loss={:.4} | accuracy={:.1}% | {} examples",
        result.global_step, result.loss, result.accuracy * 100.0, result.examples,
    );
    summaries.log(&result)?;

    report.latest_export   = Some(exporter.export(&model_valid, hparams, state.global_step)?);
    report.exports_written += 1;

    state.last_evaluated_step = Some(state.global_step);
    Ok(result)
}

/// One unshuffled pass over the eval split: mean loss over batches
/// and accuracy over all examples.
pub fn evaluate<B: Backend>(
    model:       &ImageClassifier<B>,
    loader:      &dyn DataLoader<ImageBatch<B>>,
    hparams:     &Hyperparameters,
    global_step: u64,
) -> Result<EvalResult> {
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut counts   = EvalMetrics::default();

    for batch in loader.iter() {
        let output = image_classifier(model, batch.images, Some(batch.labels), Mode::Eval, hparams)?
            .into_eval()?;
        loss_sum += output.loss.into_scalar().elem::<f64>();
        batches  += 1;
        counts.correct += output.metrics.correct;
        counts.total   += output.metrics.total;
    }

    let loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
    Ok(EvalResult {
        global_step,
        loss,
        accuracy: counts.accuracy(),
        examples: counts.total,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::fs;

    use crate::domain::error::ClassifierError;
    use crate::domain::hparams::ArchitectureKind;
    use crate::domain::image::LabeledImage;
    use crate::domain::{HEIGHT, NCLASSES, WIDTH};

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn synthetic(n: usize, seed: u64) -> ImageDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let examples = (0..n)
            .map(|i| {
                let pixels = (0..HEIGHT * WIDTH).map(|_| rng.gen::<f32>()).collect();
                LabeledImage::new(pixels, (i % NCLASSES) as u8)
            })
            .collect();
        ImageDataset::new(examples)
    }

    fn job(output_dir: &std::path::Path, train_steps: u64) -> JobConfig {
        let mut cfg = JobConfig::new(
            output_dir.join("train"),
            output_dir.join("eval"),
            output_dir,
            Hyperparameters::new(ArchitectureKind::Linear, 0.01, train_steps),
        );
        cfg.train_batch_size       = 8;
        cfg.eval_batch_size        = 16;
        cfg.checkpoint_every_steps = 3;
        cfg.eval_interval_secs     = 0;
        cfg.seed                   = Some(42);
        cfg
    }

    fn run(cfg: &JobConfig) -> Result<JobReport> {
        train_and_evaluate::<TestAutodiffBackend>(
            cfg, synthetic(40, 1), synthetic(20, 2), &Default::default(),
        )
    }

    #[test]
    fn test_stops_at_exactly_train_steps() {
        let dir    = tempfile::tempdir().unwrap();
        let report = run(&job(dir.path(), 7)).unwrap();

        assert_eq!(report.state.global_step, 7);
        assert_eq!(report.state.last_evaluated_step, Some(7));

        let steps: Vec<u64> = report.evaluations.iter().map(|e| e.global_step).collect();
        assert_eq!(steps, vec![3, 6, 7]);
        assert_eq!(steps.iter().filter(|&&s| s == 7).count(), 1);

        let final_eval = report.final_eval.unwrap();
        assert_eq!(final_eval.global_step, 7);
        assert_eq!(final_eval.examples, 20);
        assert!((0.0..=1.0).contains(&final_eval.accuracy));
        assert!(final_eval.loss >= 0.0);
    }

    #[test]
    fn test_only_final_export_remains() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = job(dir.path(), 7);
        let report = run(&cfg).unwrap();

        assert_eq!(report.exports_written, 3);
        let exports = Exporter::new(cfg.export_dir(), 1).exports().unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].0, 7);
        assert_eq!(report.latest_export, Some(exports[0].1.clone()));

        // One CSV row per evaluation
        let csv = fs::read_to_string(cfg.eval_dir().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 3);
    }

    #[test]
    fn test_long_interval_gives_single_final_evaluation() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = job(dir.path(), 7);
        cfg.eval_interval_secs = 3600;
        let report  = run(&cfg).unwrap();

        assert_eq!(report.evaluations.len(), 1);
        assert_eq!(report.evaluations[0].global_step, 7);
        assert_eq!(report.exports_written, 1);
    }

    #[test]
    fn test_resume_continues_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        run(&job(dir.path(), 7)).unwrap();

        let report = run(&job(dir.path(), 10)).unwrap();
        assert_eq!(report.state.global_step, 10);
        let steps: Vec<u64> = report.evaluations.iter().map(|e| e.global_step).collect();
        assert_eq!(steps, vec![9, 10]);

        let exports = Exporter::new(dir.path().join("export").join("exporter"), 1).exports().unwrap();
        assert_eq!(exports.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_finished_job_is_not_retrained_or_reevaluated() {
        let dir = tempfile::tempdir().unwrap();
        run(&job(dir.path(), 7)).unwrap();

        let report = run(&job(dir.path(), 7)).unwrap();
        assert_eq!(report.state.global_step, 7);
        assert!(report.evaluations.is_empty());
        assert!(report.final_eval.is_none());
        assert_eq!(report.exports_written, 0);
    }

    #[test]
    fn test_architecture_change_on_resume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        run(&job(dir.path(), 4)).unwrap();

        let mut cfg = job(dir.path(), 8);
        cfg.hparams.model = ArchitectureKind::Dnn;
        let err = run(&cfg).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClassifierError>(),
            Some(ClassifierError::Configuration(_))
        ));
    }

    #[test]
    fn test_kernel_change_on_resume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = job(dir.path(), 2);
        cfg.hparams = Hyperparameters::new(ArchitectureKind::Cnn, 0.01, 2);
        cfg.hparams.nfil1 = 2;
        cfg.hparams.nfil2 = 4;
        run(&cfg).unwrap();

        let mut resumed = cfg.clone();
        resumed.hparams.train_steps = 4;
        resumed.hparams.ksize1      = 3;
        let err = run(&resumed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClassifierError>(),
            Some(ClassifierError::Configuration(_))
        ));

        // The stored settings are untouched, so the original job still resumes
        cfg.hparams.train_steps = 4;
        assert_eq!(run(&cfg).unwrap().state.global_step, 4);
    }

    #[test]
    fn test_empty_training_split_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = train_and_evaluate::<TestAutodiffBackend>(
            &job(dir.path(), 5), ImageDataset::new(Vec::new()), synthetic(4, 2), &Default::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_evaluate_on_empty_split() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 1);
        let model  = ArchitectureKind::Linear.init::<NdArray>(&hp, &device).unwrap();
        let loader = DataLoaderBuilder::new(ImageBatcher::<NdArray>::new(device))
            .batch_size(4)
            .build(ImageDataset::new(Vec::new()));

        let result = evaluate(&model, loader.as_ref(), &hp, 0).unwrap();
        assert!(result.loss.is_nan());
        assert_eq!(result.accuracy, 0.0);
        assert_eq!(result.examples, 0);
    }
}
