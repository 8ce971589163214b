/// One-time download of the local MiniLM model files from HuggingFace.
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Local file name and path relative to [`HF_BASE`].
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Files still missing from `model_dir`.
#[must_use]
pub fn missing_files(model_dir: &Path) -> Vec<&'static str> {
    MODEL_FILES
        .iter()
        .filter(|(name, _)| !model_dir.join(name).exists())
        .map(|(name, _)| *name)
        .collect()
}

/// Download whichever model files are missing. Existing files are kept.
pub fn download_model_files(model_dir: &Path) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory: {}", model_dir.display()))?;

    let missing = missing_files(model_dir);
    if missing.is_empty() {
        info!("All model files present in {}", model_dir.display());
        return Ok(());
    }

    for &(name, url_path) in MODEL_FILES {
        if !missing.contains(&name) {
            continue;
        }
        let url = format!("{HF_BASE}/{url_path}");
        info!("Downloading {name}");
        download_file(&model_dir.join(name), &url)
            .with_context(|| format!("failed to download {name}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Stream `url` into `dest` through a `.part` file so an interrupted download
/// never leaves a truncated model behind.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;
    anyhow::ensure!(resp.status().is_success(), "bad status {} for {url}", resp.status());

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                    .context("invalid progress template")?
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf).context("failed to read response body")?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).context("failed to write file")?;
        pb.inc(n as u64);
    }
    file.flush()?;
    fs::rename(&partial, dest)?;
    pb.finish_and_clear();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_files_empty_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(missing_files(dir.path()).len(), MODEL_FILES.len());
    }

    #[test]
    fn test_missing_files_partial() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        let missing = missing_files(dir.path());
        assert!(!missing.contains(&"tokenizer.json"));
        assert!(missing.contains(&"model.onnx"));
    }

    #[test]
    fn test_nothing_downloaded_when_complete() {
        let dir = tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        assert!(missing_files(dir.path()).is_empty());
        download_model_files(dir.path()).unwrap();
    }
}
