//! Output contract structures and writers

use crate::signing::{sha256_file, signature_path};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the provenance manifest; never listed inside itself
pub const PROVENANCE_FILE: &str = "provenance.json";

/// Output directory contract
#[derive(Debug, Clone)]
pub struct OutputContract {
    /// Base output directory
    pub base_dir: PathBuf,
}

impl OutputContract {
    /// Create output contract and ensure the directory exists
    pub fn new(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create directory: {}", base_dir.display()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    // Shared
    pub fn metrics_json(&self) -> PathBuf {
        self.file("metrics.json")
    }

    pub fn provenance_json(&self) -> PathBuf {
        self.file(PROVENANCE_FILE)
    }

    pub fn status_html(&self) -> PathBuf {
        self.file("status.html")
    }

    // TruthfulQA scoring
    pub fn truthfulqa_accuracy_svg(&self) -> PathBuf {
        self.file("truthfulqa_accuracy.svg")
    }

    pub fn truthfulqa_category_accuracy_svg(&self) -> PathBuf {
        self.file("truthfulqa_category_accuracy.svg")
    }

    // EmoBench analysis
    pub fn confusion_matrix_json(&self) -> PathBuf {
        self.file("confusion_matrix.json")
    }

    pub fn confusion_matrix_svg(&self) -> PathBuf {
        self.file("confusion_matrix.svg")
    }

    pub fn classification_report_json(&self) -> PathBuf {
        self.file("classification_report.json")
    }

    pub fn score_statistics_json(&self) -> PathBuf {
        self.file("score_statistics.json")
    }

    /// `kind` is "safety" or "empathy"
    pub fn score_distribution_svg(&self, kind: &str) -> PathBuf {
        self.file(&format!("{}_score_distribution.svg", kind))
    }

    pub fn score_by_emotion_svg(&self, kind: &str) -> PathBuf {
        self.file(&format!("{}_score_by_emotion.svg", kind))
    }

    // Latency analysis
    pub fn latency_metrics_json(&self) -> PathBuf {
        self.file("latency_metrics.json")
    }

    pub fn latency_distribution_svg(&self) -> PathBuf {
        self.file("latency_distribution.svg")
    }

    pub fn component_breakdown_svg(&self) -> PathBuf {
        self.file("component_breakdown.svg")
    }

    pub fn component_distribution_svg(&self) -> PathBuf {
        self.file("component_distribution.svg")
    }

    pub fn cache_comparison_svg(&self) -> PathBuf {
        self.file("cache_comparison.svg")
    }

    pub fn prompt_length_impact_svg(&self) -> PathBuf {
        self.file("prompt_length_impact.svg")
    }

    // Fixed suites and frame rate
    pub fn truthfulqa_suite_json(&self) -> PathBuf {
        self.file("truthfulqa.json")
    }

    pub fn emobench_suite_json(&self) -> PathBuf {
        self.file("emobench.json")
    }

    pub fn fps_json(&self) -> PathBuf {
        self.file("fps.json")
    }

    /// Record the files a stage wrote (and their `.sig` companions) into provenance.json
    pub fn write_provenance(&self, command: &str, written: &[PathBuf]) -> Result<ProvenanceManifest> {
        let manifest = ProvenanceManifest::collect(&self.base_dir, command, written)?;
        let path = self.provenance_json();
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Provenance: {} files", manifest.files.len());
        Ok(manifest)
    }
}

/// Provenance tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceManifest {
    /// Generation timestamp (RFC 3339)
    pub generated_at: String,
    pub tool_version: String,
    /// Subcommand that produced the directory
    pub command: String,
    /// Files written by the command, sorted by path
    pub files: Vec<ProvenanceFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceFile {
    /// Path relative to the output directory, `/`-separated
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
}

impl ProvenanceManifest {
    /// Hash `written` plus any `.sig` file next to each one.
    ///
    /// Other files in `base_dir` are not listed, so inputs or results from
    /// earlier runs sharing the directory stay out of the manifest.
    pub fn collect(base_dir: &Path, command: &str, written: &[PathBuf]) -> Result<Self> {
        let mut paths = Vec::with_capacity(written.len() * 2);
        for path in written {
            paths.push(path.clone());
            let sig = signature_path(path);
            if sig.is_file() {
                paths.push(sig);
            }
        }
        paths.sort();
        paths.dedup();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let rel = relative_display(base_dir, &path);
            if rel == PROVENANCE_FILE {
                continue;
            }
            let size_bytes = fs::metadata(&path)
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .len();
            let sha256 = sha256_file(&path)
                .with_context(|| format!("Failed to hash {}", path.display()))?;
            files.push(ProvenanceFile {
                path: rel,
                size_bytes,
                sha256,
            });
        }

        Ok(Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool_version: crate::VERSION.to_string(),
            command: command.to_string(),
            files,
        })
    }
}

/// Recursively list regular files below `dir`. Symlinks are not followed.
pub(crate) fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// `base/sub/x.json` -> `sub/x.json`
pub(crate) fn relative_display(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_contract_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("results");
        let contract = OutputContract::new(&dir).unwrap();

        assert!(dir.exists());
        assert_eq!(contract.metrics_json().file_name().unwrap(), "metrics.json");
        assert_eq!(
            contract.score_distribution_svg("safety").file_name().unwrap(),
            "safety_score_distribution.svg"
        );
    }

    #[test]
    fn test_provenance_lists_written_files_and_signatures() {
        let tmp = TempDir::new().unwrap();
        let contract = OutputContract::new(tmp.path()).unwrap();
        let metrics = contract.metrics_json();
        fs::write(&metrics, "{}").unwrap();
        fs::write(signature_path(&metrics), "00").unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        let extra = tmp.path().join("sub").join("a.txt");
        fs::write(&extra, "abc").unwrap();

        let written = vec![extra.clone(), metrics.clone(), contract.provenance_json()];
        contract.write_provenance("test", &written).unwrap();
        // Second run must not pick up the first manifest
        let manifest = contract.write_provenance("test", &written).unwrap();

        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["metrics.json", "metrics.json.sig", "sub/a.txt"]);
        assert_eq!(manifest.files[2].size_bytes, 3);
        assert_eq!(
            manifest.files[2].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(manifest.command, "test");
        assert!(chrono::DateTime::parse_from_rfc3339(&manifest.generated_at).is_ok());
    }

    #[test]
    fn test_provenance_ignores_unrelated_files() {
        let tmp = TempDir::new().unwrap();
        let contract = OutputContract::new(tmp.path()).unwrap();
        let metrics = contract.metrics_json();
        fs::write(&metrics, "{}").unwrap();

        // Input file and an earlier result sharing the output directory
        fs::write(tmp.path().join("preds.jsonl"), "{}\n").unwrap();
        fs::write(contract.fps_json(), "{}").unwrap();

        let manifest = contract.write_provenance("truthfulqa", &[metrics]).unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["metrics.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_files_skips_symlinks() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.json"), "{}").unwrap();
        fs::write(tmp.path().join("fps.json"), "{}").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.json"),
            tmp.path().join("linked.json"),
        )
        .unwrap();

        let mut found = Vec::new();
        walk_files(tmp.path(), &mut found).unwrap();
        let rel: Vec<_> = found.iter().map(|p| relative_display(tmp.path(), p)).collect();
        assert_eq!(rel, vec!["fps.json"]);
    }
}
