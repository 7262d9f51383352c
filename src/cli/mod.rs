//! CLI tools for pipewright
//!
//! Every command reads pipeline fragments from YAML files and merges them
//! before doing its work:
//! - `render`: Validate and print the engine document
//! - `check`: Validate and print a summary
//! - `graph`: Print `passed` dependency edges and a job order
//! - `completions`: Generate shell completions

pub mod check;
pub mod completions;
pub mod graph;
pub mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pipewright::infrastructure::{self, OutputFormat};
use pipewright::pipeline::{self, Pipeline, ValidatedPipeline, Validator};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI arguments for pipewright
#[derive(Parser, Debug)]
#[command(name = "pipewright")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./pipewright.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge, validate and render fragments into an engine document
    Render {
        /// Fragment files, merged in order
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
        /// Output format (defaults to the configured one)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge and validate fragments without rendering
    Check {
        /// Fragment files, merged in order
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
    },

    /// Show the passed-constraint graph of the merged pipeline
    Graph {
        /// Fragment files, merged in order
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Yaml,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => OutputFormat::Yaml,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    use clap::CommandFactory;
    Args::command()
}

/// Reads one fragment file
pub fn read_fragment(path: &Path) -> Result<Pipeline> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fragment: {}", path.display()))?;
    let mut fragment: Pipeline = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse fragment: {}", path.display()))?;
    if fragment.name.is_empty() {
        fragment.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("pipeline")
            .to_string();
    }
    tracing::debug!(path = %path.display(), jobs = fragment.jobs.len(), "read fragment");
    Ok(fragment)
}

/// Reads, merges and validates fragments
pub fn load_pipeline(paths: &[PathBuf], validator: &Validator) -> Result<ValidatedPipeline> {
    let fragments = paths
        .iter()
        .map(|path| read_fragment(path))
        .collect::<Result<Vec<_>>>()?;
    let merged = pipeline::merge(fragments).context("Failed to merge fragments")?;
    let validated = validator
        .validate(merged)
        .context("Pipeline validation failed")?;
    Ok(validated)
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let config = infrastructure::Config::discover(args.config.as_deref(), &cwd)
        .context("Failed to load configuration")?;
    infrastructure::init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));
    let validator = Validator::new(config.validation_options());

    match args.command {
        Command::Render {
            fragments,
            format,
            output,
        } => {
            let validated = load_pipeline(&fragments, &validator)?;
            let format = format.map_or(config.output_format, OutputFormat::from);
            let document = render::render_document(&validated, format)?;

            if let Some(output_path) = output {
                render::save_document(&document, &output_path)?;
            } else {
                print!("{document}");
            }
        }
        Command::Check { fragments } => {
            let validated = load_pipeline(&fragments, &validator)?;
            println!("{}", check::summarize(&validated, config.team.as_deref()));
        }
        Command::Graph { fragments } => {
            let validated = load_pipeline(&fragments, &validator)?;
            print!("{}", graph::format_graph(&validated));
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright::pipeline::ValidationOptions;
    use tempfile::TempDir;

    pub(crate) const BUILD_FRAGMENT: &str = "
name: app
resources:
  - name: repo
    type: git
    source:
      uri: https://example.com/app.git
jobs:
  - name: unit
    plan:
      - step: get
        resource: repo
        trigger: true
      - step: task
        name: test
        config:
          run:
            path: make
            args: [test]
        inputs: [repo]
  - name: build
    plan:
      - step: get
        resource: repo
        passed: [unit]
      - step: put
        resource: repo
";

    pub(crate) const DEPLOY_FRAGMENT: &str = "
name: deploy
resources:
  - name: repo
    type: git
    source:
      uri: https://example.com/app.git
jobs:
  - name: deploy
    plan:
      - step: get
        resource: repo
        trigger: true
        passed: [build]
";

    pub(crate) fn write_fragments(dir: &TempDir) -> Vec<PathBuf> {
        let build = dir.path().join("build.yaml");
        let deploy = dir.path().join("deploy.yaml");
        fs::write(&build, BUILD_FRAGMENT).unwrap();
        fs::write(&deploy, DEPLOY_FRAGMENT).unwrap();
        vec![build, deploy]
    }

    pub(crate) fn git_validator() -> Validator {
        Validator::new(ValidationOptions {
            base_resource_types: vec!["git".to_string()],
        })
    }

    #[test]
    fn test_load_pipeline_merges_fragments() {
        let dir = TempDir::new().unwrap();
        let paths = write_fragments(&dir);
        let validated = load_pipeline(&paths, &git_validator()).unwrap();
        let pipeline = validated.pipeline();
        assert_eq!(pipeline.name, "app");
        assert_eq!(pipeline.resources.len(), 1);
        assert_eq!(pipeline.jobs.len(), 3);
    }

    #[test]
    fn test_load_pipeline_strict_types() {
        let dir = TempDir::new().unwrap();
        let paths = write_fragments(&dir);
        let err = load_pipeline(&paths, &Validator::default()).unwrap_err();
        assert!(format!("{err:#}").contains("undefined resource type 'git'"));
    }

    #[test]
    fn test_read_fragment_defaults_name_to_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nightly.yaml");
        fs::write(&path, "jobs: []\n").unwrap();
        assert_eq!(read_fragment(&path).unwrap().name, "nightly");
    }

    #[test]
    fn test_read_fragment_missing_file() {
        let err = read_fragment(Path::new("/nonexistent/fragment.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read fragment"));
    }

    #[test]
    fn test_cli_parses_render() {
        let args = Args::try_parse_from(["pipewright", "render", "a.yaml", "b.yaml", "--format", "json"]).unwrap();
        match args.command {
            Command::Render { fragments, format, .. } => {
                assert_eq!(fragments.len(), 2);
                assert_eq!(format, Some(FormatArg::Json));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_fragments() {
        assert!(Args::try_parse_from(["pipewright", "check"]).is_err());
    }
}
