//! `pipewright render` - Write the engine document for merged fragments

use anyhow::{Context, Result};
use pipewright::infrastructure::OutputFormat;
use pipewright::pipeline::{self, ValidatedPipeline};
use std::fs;
use std::path::Path;

/// Renders a validated pipeline in the requested format
pub fn render_document(validated: &ValidatedPipeline, format: OutputFormat) -> Result<String> {
    let document = pipeline::render(validated);
    let text = match format {
        OutputFormat::Yaml => document.to_yaml(),
        OutputFormat::Json => document.to_json().map(|mut json| {
            json.push('\n');
            json
        }),
    }
    .with_context(|| format!("Failed to write {format} document"))?;

    tracing::info!(
        pipeline = %validated.pipeline().name,
        %format,
        bytes = text.len(),
        "rendered pipeline"
    );
    Ok(text)
}

/// Writes a rendered document to a file
pub fn save_document(document: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, document)
        .with_context(|| format!("Failed to write document to: {}", output_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::load_pipeline;
    use crate::cli::tests::{git_validator, write_fragments};
    use tempfile::TempDir;

    #[test]
    fn test_render_yaml() {
        let dir = TempDir::new().unwrap();
        let validated = load_pipeline(&write_fragments(&dir), &git_validator()).unwrap();
        let yaml = render_document(&validated, OutputFormat::Yaml).unwrap();
        assert!(yaml.starts_with("resources:"));
        assert!(yaml.contains("- name: deploy"));
        assert!(!yaml.contains("resource_types:"));
    }

    #[test]
    fn test_render_json() {
        let dir = TempDir::new().unwrap();
        let validated = load_pipeline(&write_fragments(&dir), &git_validator()).unwrap();
        let json = render_document(&validated, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["jobs"][2]["plan"][0]["passed"][0], "build");
    }

    #[test]
    fn test_save_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yml");
        save_document("jobs: []\n", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "jobs: []\n");
    }

    #[test]
    fn test_render_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let paths = write_fragments(&dir);
        let first = render_document(&load_pipeline(&paths, &git_validator()).unwrap(), OutputFormat::Yaml).unwrap();
        let second = render_document(&load_pipeline(&paths, &git_validator()).unwrap(), OutputFormat::Yaml).unwrap();
        assert_eq!(first, second);
    }
}
