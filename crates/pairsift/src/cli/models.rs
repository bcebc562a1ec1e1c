//! The `pairsift models` command.
//!
//! Models are not downloaded; each variant expects exported ONNX towers and
//! a tokenizer under `<model_dir>/<variant dir>/`.

use std::path::Path;

use clap::{Args, Subcommand};
use pairsift_core::ModelVariant;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model inspection.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List supported variants and whether their files are installed
    List,

    /// Show model directory path
    Path,
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let model_dir = config.model_dir();

    match args.command {
        ModelsCommand::List => {
            let selected = config.model_variant().ok();
            println!("Model directory: {}", model_dir.display());
            println!();
            for line in list_lines(&model_dir, selected) {
                println!("{line}");
            }
        }

        ModelsCommand::Path => {
            println!("{}", model_dir.display());
        }
    }

    Ok(())
}

/// One line per variant: marker, name, dimension, directory, install state.
fn list_lines(model_dir: &Path, selected: Option<ModelVariant>) -> Vec<String> {
    ModelVariant::ALL
        .iter()
        .map(|&variant| {
            let marker = if Some(variant) == selected { "*" } else { " " };
            let state = if variant.files_present(model_dir) {
                "installed".to_string()
            } else {
                format!("missing ({})", variant.required_files().join(", "))
            };
            format!(
                "{marker} {:<42} {:>5}d  {:<40} {}",
                variant.to_string(),
                variant.embedding_dim(),
                variant.dir_name(),
                state
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_marks_selected_and_installed() {
        let dir = tempfile::tempdir().unwrap();
        let variant = ModelVariant::SentenceTransformers;
        let variant_dir = variant.model_dir(dir.path());
        std::fs::create_dir_all(&variant_dir).unwrap();
        for file in variant.required_files() {
            std::fs::write(variant_dir.join(file), b"").unwrap();
        }

        let lines = list_lines(dir.path(), Some(variant));
        assert_eq!(lines.len(), ModelVariant::ALL.len());

        let st = lines
            .iter()
            .find(|l| l.contains("sentence_transformers"))
            .unwrap();
        assert!(st.starts_with('*'));
        assert!(st.contains("installed"));
        assert!(st.contains("512d"));

        let missing = lines.iter().filter(|l| l.contains("missing")).count();
        assert_eq!(missing, ModelVariant::ALL.len() - 1);
    }
}
