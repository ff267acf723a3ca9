use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// A readable text file found for ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub title: String,
    pub content: String,
}

pub struct FileWalker;

impl FileWalker {
    /// Collects textual files under `path` (or `path` itself when it is a
    /// file), honouring `.gitignore`. Binary, unreadable and blank files are
    /// skipped.
    pub fn walk(path: &Path) -> Result<Vec<SourceFile>> {
        if !path.exists() {
            bail!("Path not found: {}", path.display());
        }

        let mut files = Vec::new();
        let walker = WalkBuilder::new(path).git_ignore(true).build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Walk error: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            if !is_textual(path) {
                debug!("Skipping non-text file {}", path.display());
                continue;
            }
            match fs::read_to_string(path) {
                Ok(content) if !content.trim().is_empty() => files.push(SourceFile {
                    path: path.to_path_buf(),
                    title: title_for(path),
                    content,
                }),
                Ok(_) => debug!("Skipping empty file {}", path.display()),
                Err(err) => warn!("Cannot read {}: {}", path.display(), err),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Unknown extensions count as text; `read_to_string` rejects real binaries.
fn is_textual(path: &Path) -> bool {
    let mime = mime_guess::from_path(path).first_or_text_plain();
    if mime.type_() == mime_guess::mime::TEXT {
        return true;
    }
    mime.type_() == mime_guess::mime::APPLICATION
        && matches!(
            mime.subtype().as_str(),
            "json" | "xml" | "toml" | "x-yaml" | "yaml" | "javascript" | "x-sh"
        )
}

fn title_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
