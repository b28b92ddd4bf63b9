//! Output sinks for the rendered fragment.

use std::path::{Path, PathBuf};

use tracing::info;

use super::page::{replace_element_content, ReportPage};
use crate::error::{ReportError, Result};

/// Where the rendered fragment ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Print the bare fragment to stdout.
    Stdout,
    /// Write a new standalone page with the fragment inside the target element.
    Page(PathBuf),
    /// Replace the target element's content inside an existing page file.
    Patch(PathBuf),
}

impl OutputSink {
    /// Deliver a fragment, replacing the target element's content wholesale.
    pub async fn write(&self, element_id: &str, title: &str, fragment: &str) -> Result<()> {
        match self {
            OutputSink::Stdout => {
                println!("{}", fragment);
                Ok(())
            }
            OutputSink::Page(path) => {
                let html = ReportPage {
                    title,
                    element_id,
                    fragment,
                }
                .to_html()?;
                write_file(path, &html).await?;
                info!("Wrote report page to {}", path.display());
                Ok(())
            }
            OutputSink::Patch(path) => {
                let page = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ReportError::Sink(format!("failed to read {}: {}", path.display(), e))
                })?;
                let patched = replace_element_content(&page, element_id, fragment)?;
                write_file(path, &patched).await?;
                info!("Updated #{} in {}", element_id, path.display());
                Ok(())
            }
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ReportError::Sink(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| ReportError::Sink(format!("failed to write {}: {}", path.display(), e)))
}
