use std::{fmt, path::PathBuf, str::FromStr};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    classifier::OrientationClassifier,
    detection::Detection,
    detector::TextDetector,
    error::{Error, Result},
    geometry::crop_region,
    recognizer::{TextLine, TextRecognizer},
    session::{providers_for, ExecutionProvider},
};

/// Anything that turns a frame into text detections.
pub trait TextReader {
    fn read_text(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Recognition languages with a bundled model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    English,
    Hindi,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Hindi];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
        }
    }

    fn model_file(self) -> String {
        format!("rec_{}.onnx", self.code())
    }

    fn dictionary_file(self) -> String {
        format!("{}_dict.txt", self.code())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        let code = code.trim();
        Language::ALL
            .into_iter()
            .find(|language| language.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| {
                Error::Config(format!(
                    "unsupported language {code:?}, expected one of {}",
                    Language::ALL.map(Language::code).join(", ")
                ))
            })
    }
}

impl TryFrom<String> for Language {
    type Error = Error;

    fn try_from(code: String) -> Result<Self> {
        code.parse()
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.code().to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    /// Probability above which a pixel counts as text.
    pub box_threshold: f32,
    /// Minimum mean probability for a region to be kept.
    pub box_score_threshold: f32,
    pub unclip_ratio: f32,
    /// Overrides the engine's max side length when non-zero.
    pub max_side_len: u32,
    /// Rotate all crops the way most of them are oriented.
    pub majority_orientation: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            box_threshold: 0.3,
            box_score_threshold: 0.5,
            unclip_ratio: 1.6,
            max_side_len: 0,
            majority_orientation: true,
        }
    }
}

pub struct OcrEngineBuilder {
    languages: Vec<Language>,
    use_gpu: bool,
    model_dir: PathBuf,
    threads: usize,
    max_side_len: u32,
    use_classifier: bool,
    cache_path: Option<PathBuf>,
    options: DetectionOptions,
}

impl OcrEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        self.languages = languages.into_iter().collect();
        self
    }

    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn model_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_dir = path.into();
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    pub fn use_classifier(mut self, use_classifier: bool) -> Self {
        self.use_classifier = use_classifier;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn detection_options(mut self, options: DetectionOptions) -> Self {
        self.options = options;
        self
    }

    fn model_path(&self, file: &str) -> PathBuf {
        self.model_dir.join(file)
    }

    #[instrument(skip(self), fields(languages = ?self.languages, gpu = self.use_gpu))]
    pub fn build(mut self) -> Result<OcrEngine> {
        self.languages.sort();
        self.languages.dedup();
        if self.languages.is_empty() {
            return Err(Error::Config("at least one OCR language is required".into()));
        }

        let providers = providers_for(self.use_gpu);
        let cache_path = self.cache_path.as_deref();
        let detector = TextDetector::init(
            &self.model_path("det.onnx"),
            self.threads,
            &providers,
            cache_path,
        )?;
        let classifier = if self.use_classifier {
            Some(OrientationClassifier::init(
                &self.model_path("cls.onnx"),
                self.threads,
                &providers,
            )?)
        } else {
            None
        };
        let recognizers = self
            .languages
            .iter()
            .map(|language| {
                let recognizer = TextRecognizer::init(
                    &self.model_path(&language.model_file()),
                    &self.model_path(&language.dictionary_file()),
                    self.threads,
                    &providers,
                    cache_path,
                )?;
                Ok((*language, recognizer))
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "OCR engine ready ({} language(s), providers {:?})",
            recognizers.len(),
            providers
        );
        Ok(OcrEngine {
            detector,
            classifier,
            recognizers,
            providers,
            max_side_len: self.max_side_len,
            options: self.options,
        })
    }
}

impl Default for OcrEngineBuilder {
    fn default() -> Self {
        Self {
            languages: Language::ALL.to_vec(),
            use_gpu: true,
            model_dir: PathBuf::from("models"),
            threads: 4,
            max_side_len: 1024,
            use_classifier: true,
            cache_path: None,
            options: DetectionOptions::default(),
        }
    }
}

/// Detection, optional orientation fix and per-language recognition.
pub struct OcrEngine {
    detector: TextDetector,
    classifier: Option<OrientationClassifier>,
    recognizers: Vec<(Language, TextRecognizer)>,
    providers: Vec<ExecutionProvider>,
    max_side_len: u32,
    options: DetectionOptions,
}

impl OcrEngine {
    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.recognizers.iter().map(|(language, _)| *language)
    }

    pub fn providers(&self) -> &[ExecutionProvider] {
        &self.providers
    }

    #[instrument(level = "debug", skip(self, frame))]
    pub fn detect(&self, frame: &RgbImage, options: &DetectionOptions) -> Result<Vec<Detection>> {
        let max_side_len = if options.max_side_len != 0 {
            options.max_side_len
        } else {
            self.max_side_len
        };
        let regions = self.detector.detect(frame, max_side_len, options)?;
        log::debug!(
            "{} text regions, box scores {:.2?}",
            regions.len(),
            regions.iter().map(|region| region.score).collect::<Vec<_>>()
        );
        let (regions, mut crops): (Vec<_>, Vec<_>) = regions
            .into_iter()
            .filter_map(|region| {
                let crop = crop_region(frame, &region.polygon)?;
                Some((region, crop))
            })
            .unzip();
        #[cfg(feature = "debug")]
        {
            std::fs::create_dir_all("crops")?;
            for (i, crop) in crops.iter().enumerate() {
                crop.save(format!("crops/{i}.png"))?;
            }
        }

        if let Some(classifier) = &self.classifier {
            let orientations = classifier.classify(&crops, options.majority_orientation)?;
            for (index, (crop, orientation)) in crops.iter_mut().zip(orientations).enumerate() {
                if orientation.upside_down {
                    log::trace!("Crop {index} is upside down ({:.2})", orientation.score);
                    image::imageops::rotate180_in_place(crop);
                }
            }
        }

        let mut candidates = Vec::with_capacity(self.recognizers.len());
        for (language, recognizer) in &self.recognizers {
            log::trace!("Recognizing {} crops as {language}", crops.len());
            candidates.push(recognizer.recognize(&crops)?);
        }

        Ok(regions
            .into_iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let line = best_line(candidates.iter().filter_map(|lines| lines.get(index)))?;
                Some(Detection::new(region.quad, line.text.clone(), line.confidence()))
            })
            .collect())
    }
}

impl TextReader for OcrEngine {
    fn read_text(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let options = self.options;
        self.detect(frame, &options)
    }
}

/// Highest confidence non-empty line among the per-language candidates.
fn best_line<'a>(lines: impl Iterator<Item = &'a TextLine>) -> Option<&'a TextLine> {
    lines
        .filter(|line| !line.text.trim().is_empty())
        .max_by_key(|line| float_ord::FloatOrd(line.confidence()))
}

pub fn parse_languages(codes: &[String]) -> Result<Vec<Language>> {
    codes.iter().map(|code| code.parse()).collect()
}
