//! PDF page rasterization.

use std::{path::Path, process::Stdio};

use {async_trait::async_trait, tracing::debug};

use crate::{Error, Result, error::Context};

/// Parameters of a page extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub max_size_px: u32,
    pub quality_pct: u8,
    pub max_pages: u32,
    pub maintain_aspect_ratio: bool,
}

/// Turns a PDF into one encoded image per page, in page order.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf: Vec<u8>, options: PageOptions) -> Result<Vec<Vec<u8>>>;
}

/// Rasterizer that shells out to poppler's `pdftoppm`.
///
/// The child is killed if the future is dropped, so an outer timeout cancels
/// the conversion.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: String,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(options: &PageOptions, input: &Path, prefix: &Path) -> Vec<String> {
        let mut args = vec![
            "-jpeg".to_string(),
            "-jpegopt".to_string(),
            format!("quality={}", options.quality_pct),
            "-f".to_string(),
            "1".to_string(),
            "-l".to_string(),
            options.max_pages.to_string(),
        ];
        if options.maintain_aspect_ratio {
            args.extend(["-scale-to".to_string(), options.max_size_px.to_string()]);
        } else {
            args.extend([
                "-scale-to-x".to_string(),
                options.max_size_px.to_string(),
                "-scale-to-y".to_string(),
                options.max_size_px.to_string(),
            ]);
        }
        args.push(input.display().to_string());
        args.push(prefix.display().to_string());
        args
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: Vec<u8>, options: PageOptions) -> Result<Vec<Vec<u8>>> {
        let work = tempfile::tempdir()?;
        let input = work.path().join("input.pdf");
        tokio::fs::write(&input, &pdf).await?;
        let prefix = work.path().join("page");

        let output = tokio::process::Command::new(&self.binary)
            .args(Self::args(&options, &input, &prefix))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::message(format!(
                "{} failed ({}): {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let pages = collect_pages(work.path()).await?;
        debug!(pages = pages.len(), bytes_in = pdf.len(), "rasterized pdf");
        Ok(pages)
    }
}

/// Read `page-<n>.<ext>` files sorted by page number.
async fn collect_pages(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(number) = page_number(&name.to_string_lossy()) {
            numbered.push((number, entry.path()));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(numbered.len());
    for (_, path) in numbered {
        pages.push(tokio::fs::read(&path).await?);
    }
    Ok(pages)
}

/// `page-007.jpg` → 7. pdftoppm zero-pads to the width of the last page.
fn page_number(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_prefix("page-")?;
    let (digits, _ext) = stem.split_once('.')?;
    digits.parse().ok()
}
