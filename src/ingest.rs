//! `docsage ingest`: upload files and directory trees.
//!
//! Directories are walked recursively in name order; hidden entries are
//! skipped. A failing file is reported and the run continues; the command
//! fails at the end if any file did.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::service::DocumentService;

/// Expand `paths` into the list of files to ingest.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
            for entry in walker {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

pub async fn run_ingest(service: &DocumentService, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        bail!("No files to ingest");
    }

    let mut failed = 0usize;
    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match service.ingest(bytes, &filename, None).await {
            Ok(report) => {
                println!("ingested {}", path.display());
                println!("  id: {}", report.document_id);
                println!(
                    "  kind: {}  chars: {}  chunks: {}{}",
                    report.kind.mime(),
                    report.char_count,
                    report.chunk_count,
                    if report.truncated { "  (truncated)" } else { "" }
                );
                if let Some(err) = &report.embedding_error {
                    println!("  not searchable: {}", err);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("failed {}: {}", path.display(), e.user_message());
            }
        }
    }

    println!("{} of {} files ingested", files.len() - failed, files.len());
    if failed > 0 {
        bail!("{} file(s) failed to ingest", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_walks_sorted_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("b.txt"), "b").unwrap();
        std::fs::write(root.join("a.md"), "a").unwrap();
        std::fs::write(root.join("sub").join("c.csv"), "c").unwrap();
        std::fs::write(root.join(".git").join("HEAD"), "x").unwrap();
        std::fs::write(root.join(".hidden.txt"), "x").unwrap();

        let files = collect_files(&[root.to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt", "sub/c.csv"]);
    }

    #[test]
    fn test_collect_missing_path_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_files(&[tmp.path().join("nope")]).is_err());
    }
}
