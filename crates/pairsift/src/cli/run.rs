//! The `pairsift run` command.

use std::path::{Path, PathBuf};

use clap::Args;
use pairsift_core::config::NgramRange;
use pairsift_core::{Config, DatasetSource, Pipeline};

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Extracted dataset directory (`<key>.jpg` + `<key>.txt` pairs)
    #[arg(required = true)]
    pub dataset: String,

    /// Backend family: open_clip, sentence_transformers, xlm_roberta_large_vit_l14
    #[arg(long)]
    pub model_type: Option<String>,

    /// Model name (open_clip only), e.g. ViT-B-32-quickgelu
    #[arg(long)]
    pub model_name: Option<String>,

    /// Compute device: cpu, cuda, cuda:N
    #[arg(long, env = "PAIRSIFT_DEVICE")]
    pub device: Option<String>,

    /// Minimum cosine similarity for a pair to count as a match
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Shortest candidate phrase, in tokens
    #[arg(long)]
    pub ngram_min: Option<usize>,

    /// Longest candidate phrase, in tokens
    #[arg(long)]
    pub ngram_max: Option<usize>,

    /// Largest text batch sent to the model in one call
    #[arg(long)]
    pub max_batch_size: Option<usize>,

    /// Drop candidates whose detected language differs from their span's
    #[arg(long)]
    pub filter_by_language: bool,

    /// Unigram language model name under `<model_dir>/lm/` for perplexity filtering
    #[arg(long)]
    pub perplexity_lm: Option<String>,

    /// Do not write report tables
    #[arg(long)]
    pub no_report: bool,

    /// Report directory
    #[arg(long)]
    pub report_dir: Option<String>,

    /// Log and flush after every sample
    #[arg(long)]
    pub debug: bool,
}

/// Apply command-line overrides on top of the loaded config and re-validate.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(model_type) = &args.model_type {
        config.embedding.model_type = model_type.clone();
    }
    if let Some(model_name) = &args.model_name {
        config.embedding.model_name = model_name.clone();
    }
    if let Some(device) = &args.device {
        config.embedding.device = device.clone();
    }
    if let Some(threshold) = args.threshold {
        config.matching.threshold = threshold;
    }
    if args.ngram_min.is_some() || args.ngram_max.is_some() {
        let current = config.candidates.ngram_range;
        config.candidates.ngram_range = NgramRange::new(
            args.ngram_min.unwrap_or(current.min),
            args.ngram_max.unwrap_or(current.max),
        )?;
    }
    if let Some(max_batch_size) = args.max_batch_size {
        config.embedding.max_batch_size = max_batch_size;
    }
    if args.filter_by_language {
        config.candidates.filter_by_language = true;
    }
    if let Some(lm) = &args.perplexity_lm {
        config.candidates.perplexity_lm_name = Some(lm.clone());
    }
    if args.no_report {
        config.reporting.enabled = false;
    }
    if let Some(dir) = &args.report_dir {
        config.reporting.dir = super::expand_path(dir);
    }
    if args.debug {
        config.general.debug = true;
    }

    config.validate()?;
    Ok(())
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let dataset: PathBuf = super::expand_path(&args.dataset);
    if !dataset.is_dir() {
        anyhow::bail!(
            "Dataset directory does not exist: {:?}\n\n  Hint: point at an extracted shard containing <key>.jpg and <key>.txt files.",
            dataset
        );
    }

    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, &args)?;

    let source = DatasetSource::discover(&dataset, &config.dataset)?;
    if source.missing_captions() > 0 {
        tracing::warn!(
            "{} images without a caption file were skipped",
            source.missing_captions()
        );
    }
    if source.is_empty() {
        anyhow::bail!("No image-caption pairs found under {:?}", dataset);
    }

    let mut pipeline = Pipeline::from_config(config)?;

    let pb = create_progress_bar(source.len() as u64);
    let summary = pipeline
        .run_with(&source, |stats| {
            pb.inc(1);
            pb.set_message(format!(
                "{} matches / {} scored",
                stats.matches(),
                stats.get(pairsift_core::stats::NUM_CANDIDATES_SCORED)
            ));
        })
        .await;
    pb.finish_and_clear();
    let summary = summary?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Create a progress bar for the scoring loop.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        let args = RunArgs {
            dataset: "unused".to_string(),
            model_type: Some("sentence_transformers".to_string()),
            threshold: Some(0.5),
            ngram_min: Some(1),
            max_batch_size: Some(64),
            no_report: true,
            debug: true,
            ..Default::default()
        };
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.embedding.model_type, "sentence_transformers");
        assert!((config.matching.threshold - 0.5).abs() < 1e-6);
        assert_eq!(config.candidates.ngram_range.min, 1);
        assert_eq!(config.candidates.ngram_range.max, 20);
        assert_eq!(config.embedding.max_batch_size, 64);
        assert!(!config.reporting.enabled);
        assert_eq!(config.flush_interval(), 1);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = Config::default();
        let args = RunArgs {
            ngram_min: Some(5),
            ngram_max: Some(2),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &args).is_err());

        let args = RunArgs {
            threshold: Some(1.5),
            ..Default::default()
        };
        assert!(apply_overrides(&mut Config::default(), &args).is_err());

        let args = RunArgs {
            model_type: Some("clap".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut Config::default(), &args).is_err());
    }

    #[tokio::test]
    async fn test_missing_dataset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            dataset: dir.path().join("nope").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let err = execute(args, None).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
