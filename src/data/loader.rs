// ============================================================
// Layer 4 — IDX Image Loader
// ============================================================
// Loads MNIST-style IDX files: one IDX3 file of images and one
// IDX1 file of labels, optionally gzip-compressed.
//
// File layout (all integers big-endian u32):
//   images: magic 2051 | count | rows | cols | count*rows*cols bytes
//   labels: magic 2049 | count | count bytes
//
// A data path may name the images file directly, in which case
// the labels file is found by the MNIST naming convention
// (images-idx3 → labels-idx1), or a directory holding exactly
// one such pair.
//
// Reference: http://yann.lecun.com/exdb/mnist/ (file format)

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use crate::domain::image::LabeledImage;
use crate::domain::traits::ImageSource;
use crate::domain::{HEIGHT, NCLASSES, WIDTH};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Loads one split (train or eval) from a pair of IDX files.
pub struct IdxLoader {
    images: PathBuf,
    labels: PathBuf,
}

impl IdxLoader {
    pub fn new(images: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self { images: images.into(), labels: labels.into() }
    }

    /// Resolve a configured data path into an images/labels pair.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let images = if path.is_dir() {
            find_images_file(path)?
        } else {
            path.to_path_buf()
        };
        let labels = labels_path_for(&images)?;
        Ok(Self::new(images, labels))
    }

    pub fn images_path(&self) -> &Path {
        &self.images
    }

    pub fn labels_path(&self) -> &Path {
        &self.labels
    }
}

impl ImageSource for IdxLoader {
    fn load_all(&self) -> Result<Vec<LabeledImage>> {
        let image_bytes = read_maybe_gz(&self.images)?;
        let label_bytes = read_maybe_gz(&self.labels)?;

        let images = parse_images(&image_bytes)
            .with_context(|| format!("Invalid IDX image file '{}'", self.images.display()))?;
        let labels = parse_labels(&label_bytes)
            .with_context(|| format!("Invalid IDX label file '{}'", self.labels.display()))?;

        if images.len() != labels.len() {
            bail!(
                "'{}' holds {} images but '{}' holds {} labels",
                self.images.display(), images.len(),
                self.labels.display(), labels.len(),
            );
        }

        let examples: Vec<LabeledImage> = images
            .into_iter()
            .zip(labels)
            .map(|(pixels, label)| LabeledImage::new(pixels, label))
            .collect();

        tracing::info!(
            "Loaded {} examples from '{}'",
            examples.len(),
            self.images.display()
        );
        Ok(examples)
    }
}

fn find_images_file(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("images-idx3"))
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => bail!("No '*images-idx3*' file found in '{}'", dir.display()),
        _ => bail!(
            "Several IDX image files in '{}' ({:?}); pass the images file explicitly",
            dir.display(), candidates
        ),
    }
}

fn labels_path_for(images: &Path) -> Result<PathBuf> {
    let name = images
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid images path '{}'", images.display()))?;
    if !name.contains("images-idx3") {
        bail!(
            "Cannot derive a labels file from '{}': expected a name containing 'images-idx3'",
            images.display()
        );
    }
    Ok(images.with_file_name(name.replacen("images-idx3", "labels-idx1", 1)))
}

fn read_maybe_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let mut bytes = Vec::new();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .with_context(|| format!("Cannot decompress '{}'", path.display()))?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
    }
    Ok(bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let chunk = bytes
        .get(offset..offset + 4)
        .with_context(|| format!("Truncated header at byte {offset}"))?;
    Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Decode an IDX3 image file into per-image pixel vectors scaled to [0, 1].
pub fn parse_images(bytes: &[u8]) -> Result<Vec<Vec<f32>>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        bail!("Bad magic number {magic}, expected {IMAGES_MAGIC}");
    }
    let count = read_u32(bytes, 4)? as usize;
    let rows  = read_u32(bytes, 8)? as usize;
    let cols  = read_u32(bytes, 12)? as usize;
    if rows != HEIGHT || cols != WIDTH {
        bail!("Images are {rows}x{cols}, expected {HEIGHT}x{WIDTH}");
    }

    let body = &bytes[16..];
    let size = rows * cols;
    if body.len() != count * size {
        bail!("Expected {} pixel bytes, found {}", count * size, body.len());
    }

    Ok(body
        .chunks_exact(size)
        .map(|img| img.iter().map(|&p| f32::from(p) / 255.0).collect())
        .collect())
}

/// Decode an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = read_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        bail!("Bad magic number {magic}, expected {LABELS_MAGIC}");
    }
    let count = read_u32(bytes, 4)? as usize;
    let body  = &bytes[8..];
    if body.len() != count {
        bail!("Expected {count} labels, found {}", body.len());
    }
    if let Some(bad) = body.iter().find(|&&l| usize::from(l) >= NCLASSES) {
        bail!("Label {bad} is outside [0, {NCLASSES})");
    }
    Ok(body.to_vec())
}
