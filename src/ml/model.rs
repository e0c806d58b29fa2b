// ============================================================
// Layer 5 — Architecture Catalog
// ============================================================
// Four model-building strategies, all mapping an image batch
// [batch, HEIGHT, WIDTH, 1] to logits [batch, NCLASSES]:
//
//   linear      — flatten → dense(NCLASSES)
//   dnn         — flatten → 3 × (dense + ReLU) → dense(NCLASSES)
//   dnn_dropout — dnn with dropout on the last hidden layer
//   cnn         — 2 × (conv same-padding + ReLU → maxpool 2/2)
//                 → flatten → dense(300) + ReLU → dropout
//                 → dense(NCLASSES)
//
// Dropout only fires in Mode::Train. Burn's Dropout is already
// a no-op without autodiff, but the mode check also keeps EVAL
// and PREDICT deterministic when they run on the autodiff backend.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::error::ClassifierError;
use crate::domain::hparams::{ArchitectureKind, Hyperparameters};
use crate::domain::mode::Mode;
use crate::domain::{HEIGHT, NCLASSES, WIDTH};

/// Width of the dense layer after the convolution stages
const CNN_HIDDEN: usize = 300;

// ─── linear ──────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct LinearNetConfig {
    pub num_classes: usize,
}

impl LinearNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LinearNet<B> {
        LinearNet {
            output:      LinearConfig::new(HEIGHT * WIDTH, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

#[derive(Module, Debug)]
pub struct LinearNet<B: Backend> {
    pub output:      Linear<B>,
    pub num_classes: usize,
}

impl<B: Backend> LinearNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();
        self.output.forward(images.reshape([batch_size, HEIGHT * WIDTH]))
    }
}

// ─── dnn / dnn_dropout ───────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct DnnNetConfig {
    pub num_classes:  usize,
    pub hidden_units: Vec<usize>,
    /// Drop probability on the last hidden layer; 0 disables dropout
    #[config(default = 0.0)]
    pub dprob:        f64,
}

impl DnnNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DnnNet<B> {
        let mut fan_in = HEIGHT * WIDTH;
        let hidden: Vec<Linear<B>> = self
            .hidden_units
            .iter()
            .map(|&units| {
                let layer = LinearConfig::new(fan_in, units).init(device);
                fan_in = units;
                layer
            })
            .collect();
        let output  = LinearConfig::new(fan_in, self.num_classes).init(device);
        let dropout = (self.dprob > 0.0).then(|| DropoutConfig::new(self.dprob).init());
        DnnNet { hidden, output, dropout, num_classes: self.num_classes }
    }
}

#[derive(Module, Debug)]
pub struct DnnNet<B: Backend> {
    pub hidden:      Vec<Linear<B>>,
    pub output:      Linear<B>,
    pub dropout:     Option<Dropout>,
    pub num_classes: usize,
}

impl<B: Backend> DnnNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();
        let mut x = images.reshape([batch_size, HEIGHT * WIDTH]);
        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }
        if let (Some(dropout), true) = (&self.dropout, mode.is_training()) {
            x = dropout.forward(x);
        }
        self.output.forward(x)
    }
}

// ─── cnn ─────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct CnnNetConfig {
    pub num_classes: usize,
    pub nfil1:       usize,
    pub ksize1:      usize,
    pub nfil2:       usize,
    pub ksize2:      usize,
    pub dprob:       f64,
    #[config(default = 300)]
    pub hidden:      usize,
}

impl CnnNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnNet<B> {
        let conv1 = Conv2dConfig::new([1, self.nfil1], [self.ksize1, self.ksize1])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([self.nfil1, self.nfil2], [self.ksize2, self.ksize2])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        // Two 2x2/stride-2 pools: 28 → 14 → 7
        let flat_len = (HEIGHT / 4) * (WIDTH / 4) * self.nfil2;
        CnnNet {
            conv1,
            pool1:   MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2,
            pool2:   MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            hidden:  LinearConfig::new(flat_len, self.hidden).init(device),
            dropout: DropoutConfig::new(self.dprob).init(),
            output:  LinearConfig::new(self.hidden, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

#[derive(Module, Debug)]
pub struct CnnNet<B: Backend> {
    pub conv1:       Conv2d<B>,
    pub pool1:       MaxPool2d,
    pub conv2:       Conv2d<B>,
    pub pool2:       MaxPool2d,
    pub hidden:      Linear<B>,
    pub dropout:     Dropout,
    pub output:      Linear<B>,
    pub num_classes: usize,
}

impl<B: Backend> CnnNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        // NHWC → NCHW, the layout Burn's Conv2d expects
        let x = images.swap_dims(1, 3).swap_dims(2, 3);

        let x = self.pool1.forward(relu(self.conv1.forward(x))); // [B, nfil1, 14, 14]
        let x = self.pool2.forward(relu(self.conv2.forward(x))); // [B, nfil2, 7, 7]

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = relu(self.hidden.forward(x));
        let x = if mode.is_training() { self.dropout.forward(x) } else { x };
        self.output.forward(x)
    }
}

// ─── Catalog dispatch ────────────────────────────────────────────────────────
/// One built catalog entry. The variant is chosen once, at
/// configuration time, by the variant selector.
#[derive(Module, Debug)]
pub enum ImageClassifier<B: Backend> {
    Linear(LinearNet<B>),
    Dnn(DnnNet<B>),
    DnnDropout(DnnNet<B>),
    Cnn(CnnNet<B>),
}

impl ArchitectureKind {
    /// Build the catalog entry for this kind with fresh parameters.
    pub fn init<B: Backend>(
        self,
        hparams: &Hyperparameters,
        device:  &B::Device,
    ) -> Result<ImageClassifier<B>, ClassifierError> {
        hparams.validate()?;
        if hparams.model != self {
            return Err(ClassifierError::configuration(format!(
                "hyperparameters describe '{}' but '{}' was requested", hparams.model, self
            )));
        }

        let model = match self {
            ArchitectureKind::Linear => ImageClassifier::Linear(
                LinearNetConfig::new(NCLASSES).init(device),
            ),
            ArchitectureKind::Dnn => ImageClassifier::Dnn(
                DnnNetConfig::new(NCLASSES, hparams.hidden_units.clone()).init(device),
            ),
            ArchitectureKind::DnnDropout => ImageClassifier::DnnDropout(
                DnnNetConfig::new(NCLASSES, hparams.hidden_units.clone())
                    .with_dprob(hparams.dprob)
                    .init(device),
            ),
            ArchitectureKind::Cnn => ImageClassifier::Cnn(
                CnnNetConfig::new(
                    NCLASSES,
                    hparams.nfil1, hparams.ksize1,
                    hparams.nfil2, hparams.ksize2,
                    hparams.dprob,
                )
                .with_hidden(CNN_HIDDEN)
                .init(device),
            ),
        };
        Ok(model)
    }
}

/// Reject any batch that is not [batch, HEIGHT, WIDTH, 1].
pub fn check_image_shape(dims: &[usize]) -> Result<(), ClassifierError> {
    match dims {
        [batch, HEIGHT, WIDTH, 1] if *batch > 0 => Ok(()),
        _ => Err(ClassifierError::shape_mismatch(
            format!("[batch, {HEIGHT}, {WIDTH}, 1]"),
            dims,
        )),
    }
}

impl<B: Backend> ImageClassifier<B> {
    pub fn kind(&self) -> ArchitectureKind {
        match self {
            ImageClassifier::Linear(_)     => ArchitectureKind::Linear,
            ImageClassifier::Dnn(_)        => ArchitectureKind::Dnn,
            ImageClassifier::DnnDropout(_) => ArchitectureKind::DnnDropout,
            ImageClassifier::Cnn(_)        => ArchitectureKind::Cnn,
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            ImageClassifier::Linear(net) => net.num_classes,
            ImageClassifier::Dnn(net) | ImageClassifier::DnnDropout(net) => net.num_classes,
            ImageClassifier::Cnn(net) => net.num_classes,
        }
    }

    /// images: [batch, HEIGHT, WIDTH, 1] → (logits [batch, num_classes], num_classes)
    pub fn logits(
        &self,
        images: Tensor<B, 4>,
        mode:   Mode,
    ) -> Result<(Tensor<B, 2>, usize), ClassifierError> {
        check_image_shape(&images.dims())?;
        let logits = match self {
            ImageClassifier::Linear(net) => net.forward(images),
            ImageClassifier::Dnn(net) | ImageClassifier::DnnDropout(net) => net.forward(images, mode),
            ImageClassifier::Cnn(net) => net.forward(images, mode),
        };
        Ok((logits, self.num_classes()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend         = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn random_images<B: Backend>(batch: usize, device: &B::Device) -> Tensor<B, 4> {
        Tensor::random([batch, HEIGHT, WIDTH, 1], Distribution::Uniform(0.0, 1.0), device)
    }

    fn to_vec<B: Backend>(t: Tensor<B, 2>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_every_architecture_produces_class_logits() {
        let device = Default::default();
        for kind in ArchitectureKind::ALL {
            let hp    = Hyperparameters::new(kind, 0.01, 10);
            let model = kind.init::<TestBackend>(&hp, &device).unwrap();
            assert_eq!(model.kind(), kind);

            let (logits, nclasses) = model
                .logits(random_images::<TestBackend>(3, &device), Mode::Predict)
                .unwrap();
            assert_eq!(nclasses, NCLASSES);
            assert_eq!(logits.dims(), [3, NCLASSES]);
        }
    }

    #[test]
    fn test_dnn_uses_three_hidden_layers() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::DnnDropout, 0.01, 10);
        match ArchitectureKind::DnnDropout.init::<TestBackend>(&hp, &device).unwrap() {
            ImageClassifier::DnnDropout(net) => {
                assert_eq!(net.hidden.len(), 3);
                assert!(net.dropout.is_some());
            }
            other => panic!("unexpected variant {:?}", other.kind()),
        }
    }

    #[test]
    fn test_dropout_models_are_deterministic_outside_training() {
        let device = Default::default();
        for kind in [ArchitectureKind::DnnDropout, ArchitectureKind::Cnn] {
            let mut hp = Hyperparameters::new(kind, 0.01, 10);
            hp.dprob   = 0.5;
            // Autodiff backend: Burn's dropout would fire here if the mode allowed it
            let model  = kind.init::<TestAutodiffBackend>(&hp, &device).unwrap();
            let images = random_images::<TestAutodiffBackend>(4, &device);

            for mode in [Mode::Eval, Mode::Predict] {
                let (a, _) = model.logits(images.clone(), mode).unwrap();
                let (b, _) = model.logits(images.clone(), mode).unwrap();
                assert_eq!(to_vec(a), to_vec(b), "{kind} not deterministic in {mode}");
            }
        }
    }

    #[test]
    fn test_dropout_varies_in_training() {
        let device = Default::default();
        let mut hp = Hyperparameters::new(ArchitectureKind::DnnDropout, 0.01, 10);
        hp.dprob   = 0.5;
        let model  = ArchitectureKind::DnnDropout
            .init::<TestAutodiffBackend>(&hp, &device)
            .unwrap();
        let images = random_images::<TestAutodiffBackend>(8, &device);

        let (a, _) = model.logits(images.clone(), Mode::Train).unwrap();
        let (b, _) = model.logits(images, Mode::Train).unwrap();
        assert_ne!(to_vec(a), to_vec(b));
    }

    #[test]
    fn test_wrong_image_shape_is_rejected() {
        let device = Default::default();
        let hp     = Hyperparameters::new(ArchitectureKind::Linear, 0.01, 10);
        let model  = ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).unwrap();

        let rgb = Tensor::<TestBackend, 4>::zeros([2, HEIGHT, WIDTH, 3], &device);
        assert!(matches!(
            model.logits(rgb, Mode::Predict),
            Err(ClassifierError::ShapeMismatch { .. })
        ));

        let small = Tensor::<TestBackend, 4>::zeros([2, 14, 14, 1], &device);
        assert!(model.logits(small, Mode::Predict).is_err());
    }

    #[test]
    fn test_init_validates_hyperparameters() {
        let device = Default::default();
        let mut hp = Hyperparameters::new(ArchitectureKind::Cnn, 0.01, 10);
        hp.ksize1  = 2;
        assert!(ArchitectureKind::Cnn.init::<TestBackend>(&hp, &device).is_err());

        let hp = Hyperparameters::new(ArchitectureKind::Cnn, 0.01, 10);
        assert!(ArchitectureKind::Linear.init::<TestBackend>(&hp, &device).is_err());
    }
}
