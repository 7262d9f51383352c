//! `pipewright completions` - Generate shell completions
//!
//! Supports bash, zsh, fish, and PowerShell.

use anyhow::{Context, Result};
use clap_complete::Shell;
use std::fs;
use std::path::Path;

/// Generates the completion script for `shell`
pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "pipewright", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

/// Writes a completion script to a file
pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_bash_completions() {
        let completions = generate_completions(Shell::Bash).unwrap();
        assert!(completions.contains("pipewright"));
        assert!(completions.contains("render"));
    }

    #[test]
    fn test_generate_zsh_completions() {
        let completions = generate_completions(Shell::Zsh).unwrap();
        assert!(completions.contains("pipewright"));
    }

    #[test]
    fn test_generate_fish_completions() {
        let completions = generate_completions(Shell::Fish).unwrap();
        assert!(completions.contains("graph"));
    }

    #[test]
    fn test_save_completions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipewright.bash");
        save_completions("complete -F _pipewright pipewright", &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("_pipewright"));
    }
}
