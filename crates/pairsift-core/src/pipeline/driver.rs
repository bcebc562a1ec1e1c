//! Per-sample driver: read, decode, segment, generate candidates, embed,
//! score, aggregate, flush.
//!
//! Samples are processed one at a time. Decoding and the embedding/scoring
//! step run on the blocking pool but are awaited before the next sample, so
//! stats and the sample table are only ever touched from the loop.

use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;

use crate::config::Config;
use crate::dataset::{DatasetEntry, DatasetSource};
use crate::embedding::{create_backend, EmbeddingBackend};
use crate::error::{PipelineError, Result};
use crate::report::{JsonReportSink, NoopSink, PreviewGenerator, ReportSink};
use crate::scoring::score;
use crate::stats::{Aggregator, RunningStats, SampleOutcome, ScoredMatch, SKIPPED_SAMPLES};
use crate::text::{
    segment, AssumedLanguage, CandidateGenerator, LanguageDetector, PerplexityScorer,
    UnigramModel,
};
use crate::types::{MatchResult, RunSummary, Sample, TextSpan};

use super::decode::ImageDecoder;

/// The scoring pipeline, built once per run.
pub struct Pipeline {
    config: Config,
    backend: Arc<dyn EmbeddingBackend>,
    detector: Arc<dyn LanguageDetector>,
    generator: CandidateGenerator,
    decoder: ImageDecoder,
    sink: Box<dyn ReportSink>,
    preview: Option<PreviewGenerator>,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        config: Config,
        backend: Arc<dyn EmbeddingBackend>,
        detector: Arc<dyn LanguageDetector>,
        perplexity: Option<Arc<dyn PerplexityScorer>>,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self> {
        let generator =
            CandidateGenerator::from_config(&config.candidates, Arc::clone(&detector), perplexity)?;
        let preview = config
            .reporting
            .enabled
            .then(|| PreviewGenerator::new(config.reporting.preview_size));

        Ok(Self {
            decoder: ImageDecoder::new(config.limits.clone()),
            config,
            backend,
            detector,
            generator,
            sink,
            preview,
        })
    }

    /// Build everything the configuration describes: the embedding backend,
    /// the assumed-language detector, the perplexity model (if named) and the
    /// report sink.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend: Arc<dyn EmbeddingBackend> = Arc::from(create_backend(&config)?);
        let detector: Arc<dyn LanguageDetector> =
            Arc::new(AssumedLanguage::new(config.candidates.assumed_language.clone()));

        let perplexity: Option<Arc<dyn PerplexityScorer>> =
            match &config.candidates.perplexity_lm_name {
                Some(name) => {
                    let model = UnigramModel::load(name, &config.language_model_path(name))?;
                    Some(Arc::new(model))
                }
                None => None,
            };

        let sink: Box<dyn ReportSink> = if config.reporting.enabled {
            Box::new(JsonReportSink::create(&config.report_dir())?)
        } else {
            Box::new(NoopSink)
        };

        Self::new(config, backend, detector, perplexity, sink)
    }

    /// Process every record in `source`.
    pub async fn run(&mut self, source: &DatasetSource) -> Result<RunSummary> {
        self.run_with(source, |_| {}).await
    }

    /// Process every record in `source`, calling `on_sample` after each one.
    ///
    /// Recoverable data errors skip the sample; any other error stops the
    /// run. Tables already flushed stay valid either way.
    pub async fn run_with<F>(&mut self, source: &DatasetSource, mut on_sample: F) -> Result<RunSummary>
    where
        F: FnMut(&RunningStats),
    {
        let start = Instant::now();
        let total = source.len();
        let log_every = self.config.log_frequency();
        let mut aggregator =
            Aggregator::new(self.config.matching.threshold, self.config.flush_interval());

        if let Err(e) = self.sink.log_config(&self.config) {
            tracing::warn!("Failed to record run configuration: {e}");
        }

        tracing::info!(
            "Scoring {} samples with {} (threshold {}, ngrams {:?})",
            total,
            self.backend.name(),
            self.config.matching.threshold,
            self.generator.range().lengths()
        );

        for (i, entry) in source.entries().iter().enumerate() {
            match self.process_entry(entry).await {
                Ok((outcome, image)) => {
                    let preview = self.preview;
                    let flush_due =
                        aggregator.record(outcome, || preview.and_then(|p| p.generate(&image)));
                    if flush_due {
                        aggregator.flush(self.sink.as_mut());
                    }
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping {}: {e}", entry.key);
                    aggregator.record_skipped();
                }
                Err(e) => {
                    tracing::error!("Fatal error at {}: {e}", entry.key);
                    return Err(e.into());
                }
            }

            let seen = i + 1;
            if seen % log_every == 0 || seen == total {
                let stats = aggregator.stats();
                tracing::info!(
                    "[{}/{}] scored: {}, matches: {}, stored: {}, {:.1} samples/s",
                    seen,
                    total,
                    stats.get(crate::stats::NUM_CANDIDATES_SCORED),
                    stats.matches(),
                    aggregator.table().len(),
                    seen as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON)
                );
            }
            on_sample(aggregator.stats());
        }

        aggregator.flush(self.sink.as_mut());

        let total_seconds = start.elapsed().as_secs_f64();
        let summary = RunSummary {
            stats: aggregator.stats().rows(),
            rows_stored: aggregator.table().len(),
            skipped: aggregator.stats().get(SKIPPED_SAMPLES),
            samples_per_second: if total_seconds > 0.0 {
                total as f64 / total_seconds
            } else {
                0.0
            },
            total_seconds,
        };

        tracing::info!(
            "Done: {} samples, {} matches, {} skipped in {:.1}s",
            total,
            aggregator.stats().matches(),
            summary.skipped,
            total_seconds
        );
        Ok(summary)
    }

    async fn process_entry(
        &self,
        entry: &DatasetEntry,
    ) -> std::result::Result<(SampleOutcome, DynamicImage), PipelineError> {
        let raw = entry.load(&self.config.limits).await?;
        let image = self.decoder.decode_from_bytes(raw.image_bytes, &raw.key).await?;
        self.process_sample(Sample {
            key: raw.key,
            caption: raw.caption,
            image,
        })
        .await
    }

    /// Score one decoded sample. The image is handed back for the preview.
    async fn process_sample(
        &self,
        sample: Sample,
    ) -> std::result::Result<(SampleOutcome, DynamicImage), PipelineError> {
        let Sample {
            key,
            caption,
            image,
        } = sample;

        let (before, after) = segment(&caption, &self.config.candidates.split_marker);
        let before = self.detect(before);
        let after = self.detect(after);

        // Only spans with a detected language contribute candidates.
        let mut candidates = Vec::new();
        for span in [&before, &after] {
            if let Some(language) = &span.language {
                candidates.extend(self.generator.generate(&span.text, language));
            }
        }

        let mut outcome = SampleOutcome {
            key,
            before_language: before.language,
            after_language: after.language,
            scored: None,
        };

        if candidates.is_empty() {
            tracing::debug!("{}: no candidates", outcome.key);
            return Ok((outcome, image));
        }

        let backend = Arc::clone(&self.backend);
        let started = Instant::now();
        let (image, result) = tokio::task::spawn_blocking(move || {
            let result = embed_and_score(backend.as_ref(), &image, &candidates);
            (image, result)
        })
        .await
        .map_err(|e| PipelineError::Model {
            message: format!("Scoring task failed: {e}"),
        })?;
        let result = result?;
        let elapsed = started.elapsed();

        tracing::debug!(
            "{}: '{}' scored {:.3} in {:?}",
            outcome.key,
            result.candidate,
            result.score,
            elapsed
        );
        outcome.scored = Some(ScoredMatch { result, elapsed });
        Ok((outcome, image))
    }

    fn detect(&self, text: &str) -> TextSpan {
        let language = self.detector.detect(text).map(|d| d.language);
        TextSpan::new(text, language)
    }
}

fn embed_and_score(
    backend: &dyn EmbeddingBackend,
    image: &DynamicImage,
    candidates: &[String],
) -> std::result::Result<MatchResult, PipelineError> {
    let t = Instant::now();
    let text_embeddings = backend.encode_text(candidates)?;
    tracing::trace!("  Text: {} candidates in {:?}", candidates.len(), t.elapsed());

    let t = Instant::now();
    let image_embedding = backend.encode_image(image)?;
    tracing::trace!("  Image: {:?}", t.elapsed());

    score(image_embedding, text_embeddings, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NgramRange;
    use crate::report::json::{CONFIG_FILE, PREDICTIONS_FILE};
    use crate::stats::{MATCHES, NO_CANDIDATES, NUM_CANDIDATES_SCORED, TOTAL_IMGS};
    use ndarray::Array2;
    use std::path::Path;
    use std::sync::Mutex;

    /// Image embeds to [1, 0]; "red car" sits at cosine 0.9 from it and
    /// every other phrase at 0.1.
    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<Vec<String>>>,
        zero_image: bool,
    }

    impl EmbeddingBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        fn embedding_dim(&self) -> usize {
            2
        }

        fn encode_text(
            &self,
            candidates: &[String],
        ) -> std::result::Result<Array2<f32>, PipelineError> {
            self.calls.lock().unwrap().push(candidates.to_vec());
            let flat: Vec<f32> = candidates
                .iter()
                .flat_map(|c| {
                    let cos: f32 = if c == "red car" { 0.9 } else { 0.1 };
                    [cos, (1.0 - cos * cos).sqrt()]
                })
                .collect();
            Ok(Array2::from_shape_vec((candidates.len(), 2), flat).unwrap())
        }

        fn encode_image(
            &self,
            _image: &DynamicImage,
        ) -> std::result::Result<Array2<f32>, PipelineError> {
            if self.zero_image {
                return Ok(Array2::zeros((1, 2)));
            }
            Ok(Array2::from_shape_vec((1, 2), vec![1.0, 0.0]).unwrap())
        }
    }

    fn write_sample(dir: &Path, key: &str, caption: &str) {
        image::RgbImage::new(16, 16)
            .save(dir.join(format!("{key}.png")))
            .unwrap();
        std::fs::write(dir.join(format!("{key}.txt")), caption).unwrap();
    }

    fn test_config(report_dir: Option<&Path>) -> Config {
        let mut config = Config::default();
        config.candidates.ngram_range = NgramRange::new(1, 2).unwrap();
        config.matching.threshold = 0.3;
        match report_dir {
            Some(dir) => config.reporting.dir = dir.to_path_buf(),
            None => config.reporting.enabled = false,
        }
        config
    }

    fn build(config: Config, backend: Arc<MockBackend>, sink: Box<dyn ReportSink>) -> Pipeline {
        Pipeline::new(
            config,
            backend,
            Arc::new(AssumedLanguage::new("en")),
            None,
            sink,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_red_car_end_to_end() {
        let data = tempfile::tempdir().unwrap();
        write_sample(data.path(), "000001", "a red car <SPLIT> driving fast");
        let source = DatasetSource::discover(data.path(), &Default::default()).unwrap();

        let backend = Arc::new(MockBackend::default());
        let config = test_config(None);
        let mut pipeline = build(config, Arc::clone(&backend), Box::new(NoopSink));
        let summary = pipeline.run(&source).await.unwrap();

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec!["a", "red", "car", "a red", "red car", "driving", "fast", "driving fast"]
        );

        let count = |name: &str| {
            summary
                .stats
                .iter()
                .find(|r| r.description == name)
                .map(|r| r.count)
                .unwrap_or(0.0)
        };
        assert_eq!(count(TOTAL_IMGS), 1.0);
        assert_eq!(count(NUM_CANDIDATES_SCORED), 1.0);
        assert_eq!(count(MATCHES), 1.0);
        assert_eq!(count("before_en"), 1.0);
        assert_eq!(count("after_en"), 1.0);
        assert_eq!(summary.rows_stored, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_report_contains_best_prediction() {
        let data = tempfile::tempdir().unwrap();
        let report = tempfile::tempdir().unwrap();
        write_sample(data.path(), "000001", "a red car <SPLIT> driving fast");
        let source = DatasetSource::discover(data.path(), &Default::default()).unwrap();

        let config = test_config(Some(report.path()));
        let sink = Box::new(JsonReportSink::create(report.path()).unwrap());
        let mut pipeline = build(config, Arc::new(MockBackend::default()), sink);
        pipeline.run(&source).await.unwrap();

        let content = std::fs::read_to_string(report.path().join(PREDICTIONS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        let row = &json["data"][0];
        assert_eq!(row["text"], "red car");
        assert!((row["score"].as_f64().unwrap() - 0.9).abs() < 1e-4);
        assert_eq!(row["image"]["format"], "webp");

        let content = std::fs::read_to_string(report.path().join(CONFIG_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!((json["matching"]["threshold"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(json["candidates"]["ngram_range"], serde_json::json!([1, 2]));
        assert_eq!(json["embedding"]["model_type"], "open_clip");
    }

    #[tokio::test]
    async fn test_empty_and_short_captions_count_without_scoring() {
        let data = tempfile::tempdir().unwrap();
        write_sample(data.path(), "000001", "");
        write_sample(data.path(), "000002", "a red car");
        write_sample(data.path(), "000003", "   <SPLIT>   ");

        let mut config = test_config(None);
        config.candidates.ngram_range = NgramRange::new(4, 20).unwrap();
        let source = DatasetSource::discover(data.path(), &Default::default()).unwrap();
        let backend = Arc::new(MockBackend::default());
        let mut pipeline = build(config, Arc::clone(&backend), Box::new(NoopSink));

        let mut progress = Vec::new();
        let summary = pipeline
            .run_with(&source, |stats| progress.push(stats.total_imgs()))
            .await
            .unwrap();

        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(progress, vec![1, 2, 3]);
        let no_candidates = summary
            .stats
            .iter()
            .find(|r| r.description == NO_CANDIDATES)
            .unwrap();
        assert_eq!(no_candidates.count, 3.0);
        assert!(summary
            .stats
            .iter()
            .all(|r| r.description != NUM_CANDIDATES_SCORED));
    }

    #[tokio::test]
    async fn test_corrupt_image_is_skipped() {
        let data = tempfile::tempdir().unwrap();
        write_sample(data.path(), "000001", "a red car");
        std::fs::write(data.path().join("000002.jpg"), b"truncated").unwrap();
        std::fs::write(data.path().join("000002.txt"), "a blue bike").unwrap();

        let source = DatasetSource::discover(data.path(), &Default::default()).unwrap();
        let mut pipeline = build(
            test_config(None),
            Arc::new(MockBackend::default()),
            Box::new(NoopSink),
        );
        let summary = pipeline.run(&source).await.unwrap();

        assert_eq!(summary.skipped, 1);
        let total = summary
            .stats
            .iter()
            .find(|r| r.description == TOTAL_IMGS)
            .unwrap();
        assert_eq!(total.count, 2.0);
    }

    #[tokio::test]
    async fn test_zero_norm_embedding_stops_run() {
        let data = tempfile::tempdir().unwrap();
        write_sample(data.path(), "000001", "a red car");
        write_sample(data.path(), "000002", "a red car");

        let source = DatasetSource::discover(data.path(), &Default::default()).unwrap();
        let backend = Arc::new(MockBackend {
            zero_image: true,
            ..Default::default()
        });
        let mut pipeline = build(test_config(None), Arc::clone(&backend), Box::new(NoopSink));

        let err = pipeline.run(&source).await.unwrap_err();
        assert!(err.to_string().contains("zero-norm"));
        assert_eq!(backend.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_ngram_range_rejected_at_construction() {
        let mut config = test_config(None);
        config.candidates.ngram_range = NgramRange { min: 0, max: 2 };
        let result = Pipeline::new(
            config,
            Arc::new(MockBackend::default()),
            Arc::new(AssumedLanguage::new("en")),
            None,
            Box::new(NoopSink),
        );
        assert!(result.is_err());
    }
}
