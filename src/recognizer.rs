//! CRNN text line recognizer with CTC greedy decoding.

use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, RgbImage};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use crate::{
    error::{Error, Result},
    geometry::normalized_tensor,
    session::{open_session, require_file, ExecutionProvider},
};

const DEST_HEIGHT: u32 = 48;
const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Decoded text of one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

impl TextLine {
    /// Mean character score, `0.0` for an empty line.
    pub fn confidence(&self) -> f32 {
        if self.character_scores.is_empty() {
            0.0
        } else {
            self.character_scores.iter().sum::<f32>() / self.character_scores.len() as f32
        }
    }
}

pub struct TextRecognizer {
    session: Session,
    charset: Charset,
}

impl TextRecognizer {
    pub fn init(
        model: &Path,
        dictionary: &Path,
        threads: usize,
        providers: &[ExecutionProvider],
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        let session = open_session(model, threads, providers, cache_path)?;
        let symbols = std::fs::read_to_string(require_file(dictionary)?)?;
        let charset = Charset::from_dictionary(&symbols);
        log::debug!("Loaded {} symbols from {dictionary:?}", charset.len());
        Ok(Self { session, charset })
    }

    #[instrument(level = "debug", skip(self, crops))]
    pub fn recognize(&self, crops: &[RgbImage]) -> Result<Vec<TextLine>> {
        crops.iter().map(|crop| self.recognize_one(crop)).collect()
    }

    fn recognize_one(&self, crop: &RgbImage) -> Result<TextLine> {
        let scale = DEST_HEIGHT as f32 / crop.height().max(1) as f32;
        let dest_width = ((crop.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let resized = image::imageops::resize(crop, dest_width, DEST_HEIGHT, FilterType::Nearest);
        let input = normalized_tensor(&resized, &MEAN_VALUES, &NORM_VALUES);

        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| Error::Model("recognizer produced no outputs".into()))?;
        let logits = output.try_extract_tensor::<f32>()?;
        let shape = logits.shape();
        if shape.len() != 3 {
            return Err(Error::Model(format!("recognizer output shape {shape:?}")));
        }
        log::trace!("Recognizer output shape: {shape:?}");
        let (steps, classes) = (shape[1], shape[2]);
        let logits = logits
            .to_shape((steps, classes))
            .map_err(|err| Error::Model(err.to_string()))?;

        Ok(self.charset.decode(logits.view()))
    }
}

/// Symbol table of a recognition model: CTC blank at index 0, the dictionary
/// lines, then a trailing space.
#[derive(Debug, Clone)]
pub(crate) struct Charset {
    symbols: Vec<String>,
}

impl Charset {
    pub(crate) fn from_dictionary(dictionary: &str) -> Self {
        let symbols = std::iter::once(String::new())
            .chain(dictionary.lines().map(str::to_string))
            .chain(std::iter::once(" ".to_string()))
            .collect();
        Self { symbols }
    }

    pub(crate) fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Greedy CTC decoding: best class per step, blanks and repeats dropped.
    pub(crate) fn decode(&self, logits: ArrayView2<f32>) -> TextLine {
        let mut text = String::new();
        let mut character_scores = Vec::new();
        let mut previous = 0;

        for step in logits.axis_iter(Axis(0)) {
            let Some((index, score)) = step
                .indexed_iter()
                .max_by_key(|(_, score)| FloatOrd(**score))
                .map(|(index, score)| (index, *score))
            else {
                continue;
            };
            if index != 0 && index != previous {
                if let Some(symbol) = self.symbols.get(index) {
                    text.push_str(symbol);
                    character_scores.push(score);
                }
            }
            previous = index;
        }

        TextLine {
            text,
            character_scores,
        }
    }
}
