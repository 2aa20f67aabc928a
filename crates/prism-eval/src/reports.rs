//! HTML status page over a results directory
//!
//! The page only restates what the files on disk contain: which result
//! files exist, whether each one still matches its signature, and a few
//! numeric fields read straight out of the JSON.

use crate::outputs::{relative_display, walk_files, PROVENANCE_FILE};
use crate::signing::{verify_signed_json, SignatureStatus};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Headline metrics shown per artifact
pub const MAX_HEADLINE_METRICS: usize = 4;

/// Nested fields worth surfacing when present
const NESTED_HEADLINES: &[&str] = &[
    "percentiles.p50",
    "percentiles.p95",
    "percentiles.p99",
    "percentiles.mean",
    "safety_score.mean",
    "empathy_score.mean",
    "macro avg.f1-score",
    "cache_stats.improvement.mean_reduction_percent",
];

/// One JSON result file found under the results directory
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: String,
    pub size_bytes: u64,
    /// `None` when the file could not be read or parsed
    pub signature: Option<SignatureStatus>,
    pub error: Option<String>,
    pub headline: Vec<(String, f64)>,
}

impl Artifact {
    pub fn status_label(&self) -> &'static str {
        match &self.signature {
            Some(status) => status.label(),
            None => "unreadable",
        }
    }

    fn badge(&self) -> &'static str {
        match &self.signature {
            Some(SignatureStatus::Verified { .. }) => "badge-success",
            Some(SignatureStatus::Mismatch { .. }) => "badge-danger",
            Some(SignatureStatus::Unsigned) => "badge-info",
            None => "badge-warning",
        }
    }
}

/// Numeric fields to show for one JSON document
pub fn headline_metrics(value: &Value) -> Vec<(String, f64)> {
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };

    let mut metrics: Vec<(String, f64)> = obj
        .iter()
        .filter(|(_, v)| v.is_number())
        .filter_map(|(k, v)| v.as_f64().map(|x| (k.clone(), x)))
        .collect();

    for path in NESTED_HEADLINES {
        let mut cursor = Some(value);
        for key in path.split('.') {
            cursor = cursor.and_then(|v| v.get(key));
        }
        if let Some(x) = cursor.and_then(Value::as_f64) {
            metrics.push((path.to_string(), x));
        }
    }

    metrics.truncate(MAX_HEADLINE_METRICS);
    metrics
}

/// Snapshot of a results directory
#[derive(Debug, Clone)]
pub struct StatusPage {
    pub results_dir: PathBuf,
    pub generated_at: String,
    pub artifacts: Vec<Artifact>,
}

impl StatusPage {
    pub fn scan(results_dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        walk_files(results_dir, &mut files)?;

        let mut artifacts = Vec::new();
        for path in files {
            let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
            let is_provenance = path.file_name().map(|n| n == PROVENANCE_FILE).unwrap_or(false);
            if !is_json || is_provenance {
                continue;
            }
            artifacts.push(Self::inspect(results_dir, &path)?);
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        log::info!("Found {} result files in {}", artifacts.len(), results_dir.display());

        Ok(Self {
            results_dir: results_dir.to_path_buf(),
            generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
            artifacts,
        })
    }

    fn inspect(base: &Path, path: &Path) -> Result<Artifact> {
        let rel = relative_display(base, path);
        let size_bytes = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<Value>(&s).map_err(anyhow::Error::from));
        let value = match parsed {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Skipping unreadable {}: {}", rel, e);
                return Ok(Artifact {
                    path: rel,
                    size_bytes,
                    signature: None,
                    error: Some(e.to_string()),
                    headline: Vec::new(),
                });
            }
        };

        let (signature, error) = match verify_signed_json(path) {
            Ok(status) => (Some(status), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(Artifact {
            path: rel,
            size_bytes,
            signature,
            error,
            headline: headline_metrics(&value),
        })
    }

    /// Artifacts with the given status label
    pub fn count(&self, label: &str) -> usize {
        self.artifacts.iter().filter(|a| a.status_label() == label).count()
    }

    pub fn render(&self) -> String {
        let mut html = String::new();
        html.push_str(&Self::html_header());
        html.push_str(&self.title_section());
        html.push_str(&self.summary_section());
        html.push_str(&self.artifacts_section());
        html.push_str(&Self::html_footer());
        html
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote status page to {}", path.display());
        Ok(())
    }

    fn html_header() -> String {
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>prism-eval Results Status</title>
    <style>
        :root {
            --primary: #2563eb;
            --success: #22c55e;
            --warning: #f59e0b;
            --danger: #ef4444;
            --dark: #1e293b;
            --light: #f8fafc;
            --border: #e2e8f0;
        }
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
        }
        .container { max-width: 1200px; margin: 0 auto; padding: 40px 20px; }
        .header {
            text-align: center;
            margin-bottom: 40px;
            padding-bottom: 20px;
            border-bottom: 3px solid var(--primary);
        }
        .header h1 { font-size: 32px; margin-bottom: 10px; }
        .header .subtitle { font-size: 18px; color: #64748b; }
        .section {
            background: white;
            border-radius: 8px;
            padding: 24px;
            margin-bottom: 24px;
            box-shadow: 0 1px 3px rgba(0,0,0,0.1);
            border: 1px solid var(--border);
        }
        .section h2 {
            font-size: 22px;
            margin-bottom: 16px;
            padding-bottom: 8px;
            border-bottom: 2px solid var(--primary);
        }
        .stats-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
            gap: 16px;
        }
        .stat-card {
            background: var(--light);
            border-radius: 6px;
            padding: 16px;
            text-align: center;
        }
        .stat-card .label { font-size: 12px; color: #64748b; text-transform: uppercase; }
        .stat-card .value { font-size: 28px; font-weight: 700; margin: 4px 0; }
        .badge {
            display: inline-block;
            padding: 4px 12px;
            border-radius: 20px;
            font-size: 12px;
            font-weight: 600;
        }
        .badge-success { background: #dcfce7; color: #166534; }
        .badge-warning { background: #fef3c7; color: #92400e; }
        .badge-danger { background: #fee2e2; color: #991b1b; }
        .badge-info { background: #dbeafe; color: #1e40af; }
        table { width: 100%; border-collapse: collapse; margin: 16px 0; }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid var(--border); }
        th { background: var(--light); font-weight: 600; }
        code { font-size: 13px; }
        .metric { white-space: nowrap; }
        .footer {
            text-align: center;
            padding-top: 20px;
            border-top: 1px solid var(--border);
            color: #64748b;
        }
    </style>
</head>
<body>
<div class="container">
"#
        .to_string()
    }

    fn title_section(&self) -> String {
        format!(
            r#"
    <div class="header">
        <h1>Evaluation Results Status</h1>
        <div class="subtitle">
            Directory: <strong>{}</strong> |
            Generated: {}
        </div>
    </div>
"#,
            escape_html(&self.results_dir.display().to_string()),
            self.generated_at
        )
    }

    fn summary_section(&self) -> String {
        let mut cards = String::new();
        for (label, badge) in [
            ("verified", "badge-success"),
            ("mismatch", "badge-danger"),
            ("unsigned", "badge-info"),
        ] {
            cards.push_str(&format!(
                r#"
            <div class="stat-card">
                <div class="label">{}</div>
                <div class="value">{}</div>
                <span class="badge {}">{}</span>
            </div>
"#,
                label,
                self.count(label),
                badge,
                label.to_uppercase()
            ));
        }

        let unreadable = self.count("unreadable");
        if unreadable > 0 {
            cards.push_str(&format!(
                r#"
            <div class="stat-card">
                <div class="label">unreadable</div>
                <div class="value">{}</div>
                <span class="badge badge-warning">UNREADABLE</span>
            </div>
"#,
                unreadable
            ));
        }

        format!(
            r#"
    <div class="section">
        <h2>Signature Summary</h2>
        <div class="stats-grid">{}        </div>
    </div>
"#,
            cards
        )
    }

    fn artifacts_section(&self) -> String {
        let mut html = String::from(
            r#"
    <div class="section">
        <h2>Result Files</h2>
"#,
        );

        if self.artifacts.is_empty() {
            html.push_str(r#"<p style="color: #64748b;">No result files found.</p>"#);
            html.push_str("</div>");
            return html;
        }

        html.push_str(
            r#"
        <table>
            <thead>
                <tr>
                    <th>File</th>
                    <th>Size</th>
                    <th>Signature</th>
                    <th>Metrics</th>
                </tr>
            </thead>
            <tbody>
"#,
        );

        for artifact in &self.artifacts {
            let metrics = if artifact.headline.is_empty() {
                match &artifact.error {
                    Some(e) => escape_html(e),
                    None => "-".to_string(),
                }
            } else {
                artifact
                    .headline
                    .iter()
                    .map(|(k, v)| format!(r#"<span class="metric">{} = {}</span>"#, escape_html(k), format_metric(*v)))
                    .collect::<Vec<_>>()
                    .join("<br>")
            };

            html.push_str(&format!(
                r#"
                <tr>
                    <td><code>{}</code></td>
                    <td>{}</td>
                    <td><span class="badge {}">{}</span></td>
                    <td>{}</td>
                </tr>
"#,
                escape_html(&artifact.path),
                format_size(artifact.size_bytes),
                artifact.badge(),
                artifact.status_label().to_uppercase(),
                metrics
            ));
        }

        html.push_str("</tbody></table>");
        html.push_str("</div>");
        html
    }

    fn html_footer() -> String {
        format!(
            r#"
    <div class="footer">
        <p>Generated by <strong>prism-eval</strong> {}</p>
    </div>
</div>
</body>
</html>
"#,
            crate::VERSION
        )
    }
}

fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::write_signed_json;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_headline_top_level_and_nested() {
        let v = json!({"accuracy": 0.75, "count": 8, "categories": null, "label": "x"});
        let h = headline_metrics(&v);
        assert_eq!(h, vec![("accuracy".to_string(), 0.75), ("count".to_string(), 8.0)]);

        let v = json!({"percentiles": {"p50": 120.0, "p95": 300.0, "p99": 410.0}, "cache_stats": {}});
        let h = headline_metrics(&v);
        assert_eq!(h[0], ("percentiles.p50".to_string(), 120.0));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_headline_capped() {
        let v = json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5});
        assert_eq!(headline_metrics(&v).len(), MAX_HEADLINE_METRICS);
        assert!(headline_metrics(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_scan_classifies_signatures() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        write_signed_json(&base.join("metrics.json"), &json!({"accuracy": 0.5}), true).unwrap();
        write_signed_json(&base.join("fps.json"), &json!({"meanFPS": 60.0}), false).unwrap();
        fs::create_dir_all(base.join("nested")).unwrap();
        write_signed_json(&base.join("nested/emobench.json"), &json!({"total_prompts": 4}), true).unwrap();
        fs::write(base.join("nested/emobench.json"), r#"{"total_prompts": 5}"#).unwrap();
        fs::write(base.join(PROVENANCE_FILE), "{}").unwrap();
        fs::write(base.join("notes.txt"), "ignored").unwrap();

        let page = StatusPage::scan(base).unwrap();
        let paths: Vec<&str> = page.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["fps.json", "metrics.json", "nested/emobench.json"]);
        assert_eq!(page.count("verified"), 1);
        assert_eq!(page.count("unsigned"), 1);
        assert_eq!(page.count("mismatch"), 1);
    }

    #[test]
    fn test_unreadable_json_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let page = StatusPage::scan(dir.path()).unwrap();
        assert_eq!(page.artifacts.len(), 1);
        assert_eq!(page.artifacts[0].status_label(), "unreadable");
        assert!(page.artifacts[0].error.is_some());
    }

    #[test]
    fn test_render_contains_table_and_escapes() {
        let dir = TempDir::new().unwrap();
        write_signed_json(&dir.path().join("a<b>.json"), &json!({"accuracy": 1.0}), true).unwrap();
        let page = StatusPage::scan(dir.path()).unwrap();
        let html = page.render();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("a&lt;b&gt;.json"));
        assert!(html.contains("VERIFIED"));
        assert!(html.contains("accuracy = 1"));
        assert!(html.contains(&page.generated_at));

        let out = dir.path().join("site/status.html");
        page.write(&out).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let page = StatusPage::scan(dir.path()).unwrap();
        assert!(page.artifacts.is_empty());
        assert!(page.render().contains("No result files found."));
    }
}
