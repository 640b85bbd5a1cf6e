//! Tesseract-backed block source.
//!
//! Drives the system `tesseract` binary in TSV mode for word-level text,
//! confidence and geometry, with `pdftotext`/`pdftoppm` (Poppler) handling
//! PDFs: text-layer extraction first, page rasterization + OCR when the
//! text layer is too sparse to trust.
//!
//! This is the adapter the CLI uses against real files. The pipeline itself
//! only depends on the [`BlockSource`] trait.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::models::Region;

use super::block::{Block, BlockSource, BlockSourceError};

/// Confidence assigned to PDF text-layer lines (no OCR uncertainty).
const PDF_TEXT_CONFIDENCE: f32 = 0.95;

/// Tesseract block source using the system binary.
pub struct TesseractBlockSource {
    language: String,
    /// Minimum characters from the PDF text layer before OCR kicks in.
    min_chars: usize,
}

impl Default for TesseractBlockSource {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            min_chars: 100,
        }
    }
}

impl TesseractBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, lang: &str) -> Self {
        self.language = lang.to_string();
        self
    }
}

#[async_trait]
impl BlockSource for TesseractBlockSource {
    async fn extract_blocks(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError> {
        let bytes = bytes.to_vec();
        let mime_type = mime_type.to_string();
        let language = self.language.clone();
        let min_chars = self.min_chars;

        tokio::task::spawn_blocking(move || {
            extract_sync(&bytes, &mime_type, &language, min_chars)
        })
        .await
        .map_err(|e| BlockSourceError::Failed(format!("extraction task panicked: {e}")))?
    }
}

fn extract_sync(
    bytes: &[u8],
    mime_type: &str,
    language: &str,
    min_chars: usize,
) -> Result<Vec<Block>, BlockSourceError> {
    let dir = TempDir::new()?;

    match mime_type {
        "application/pdf" => {
            let pdf_path = dir.path().join("input.pdf");
            std::fs::write(&pdf_path, bytes)?;

            let text = pdf_to_text(&pdf_path)?;
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful >= min_chars {
                return Ok(text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| Block::line(l.trim(), PDF_TEXT_CONFIDENCE))
                    .collect());
            }

            // Sparse text layer: rasterize and OCR each page.
            let pages = pdf_to_images(&pdf_path, dir.path())?;
            let mut blocks = Vec::new();
            for page in pages {
                blocks.extend(run_tesseract_tsv(&page, language)?);
            }
            Ok(blocks)
        }
        "image/jpeg" | "image/png" | "image/webp" => {
            let ext = match mime_type {
                "image/jpeg" => "jpg",
                "image/webp" => "webp",
                _ => "png",
            };
            let image_path = dir.path().join(format!("input.{ext}"));
            std::fs::write(&image_path, bytes)?;
            run_tesseract_tsv(&image_path, language)
        }
        other => Err(BlockSourceError::Failed(format!(
            "no extraction strategy for {other}"
        ))),
    }
}

/// Extract the PDF text layer with pdftotext.
fn pdf_to_text(pdf_path: &Path) -> Result<String, BlockSourceError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(pdf_path)
        .arg("-")
        .output();

    match output {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BlockSourceError::Failed(format!(
                "pdftotext failed: {stderr}"
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlockSourceError::Unavailable(
            "pdftotext not found (install poppler-utils)".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Rasterize all PDF pages to PNG with pdftoppm.
fn pdf_to_images(pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, BlockSourceError> {
    let prefix = out_dir.join("page");
    let status = Command::new("pdftoppm")
        .args(["-png", "-r", "300"])
        .arg(pdf_path)
        .arg(&prefix)
        .status();

    match status {
        Ok(s) if s.success() => {
            let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().is_some_and(|ext| ext == "png")
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with("page"))
                })
                .collect();
            pages.sort();
            Ok(pages)
        }
        Ok(_) => Err(BlockSourceError::Failed(
            "pdftoppm failed to convert PDF pages".to_string(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlockSourceError::Unavailable(
            "pdftoppm not found (install poppler-utils)".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Run tesseract in TSV mode and parse word rows into blocks.
fn run_tesseract_tsv(image_path: &Path, language: &str) -> Result<Vec<Block>, BlockSourceError> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", language, "tsv"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BlockSourceError::Failed(format!(
                "tesseract failed: {stderr}"
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlockSourceError::Unavailable(
            "tesseract not found (install tesseract-ocr)".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// One parsed word row from tesseract TSV output.
struct TsvWord {
    line_key: (u32, u32, u32, u32),
    text: String,
    confidence: f32,
    region: Region,
}

/// Parse tesseract TSV: level 1 rows carry page geometry, level 5 rows carry
/// words with confidence 0-100 and pixel boxes.
fn parse_tsv(tsv: &str) -> Vec<Block> {
    let mut page_width = 0.0f32;
    let mut page_height = 0.0f32;
    let mut words: Vec<TsvWord> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level: u32 = cols[0].parse().unwrap_or(0);
        let parse_f = |i: usize| cols[i].parse::<f32>().unwrap_or(0.0);

        if level == 1 {
            page_width = parse_f(8);
            page_height = parse_f(9);
            continue;
        }
        if level != 5 {
            continue;
        }

        let confidence = parse_f(10);
        let text = cols[11].trim();
        if confidence < 0.0 || text.is_empty() {
            continue;
        }

        let region = if page_width > 0.0 && page_height > 0.0 {
            Region {
                left: parse_f(6) / page_width,
                top: parse_f(7) / page_height,
                width: parse_f(8) / page_width,
                height: parse_f(9) / page_height,
            }
        } else {
            Region::default()
        };

        let parse_u = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        words.push(TsvWord {
            line_key: (parse_u(1), parse_u(2), parse_u(3), parse_u(4)),
            text: text.to_string(),
            confidence: confidence / 100.0,
            region,
        });
    }

    let mut blocks = Vec::new();

    // Line blocks: words grouped by (page, block, paragraph, line), in
    // document order. TSV rows are already ordered.
    let mut current_key = None;
    let mut current_words: Vec<&TsvWord> = Vec::new();
    let flush = |buffered: &mut Vec<&TsvWord>, blocks: &mut Vec<Block>| {
        if buffered.is_empty() {
            return;
        }
        let text: Vec<&str> = buffered.iter().map(|w| w.text.as_str()).collect();
        let confidence =
            buffered.iter().map(|w| w.confidence).sum::<f32>() / buffered.len() as f32;
        blocks.push(Block::line(&text.join(" "), confidence));
        buffered.clear();
    };

    for word in &words {
        if current_key != Some(word.line_key) {
            flush(&mut current_words, &mut blocks);
            current_key = Some(word.line_key);
        }
        current_words.push(word);
    }
    flush(&mut current_words, &mut blocks);

    for word in &words {
        blocks.push(Block::word(&word.text, word.confidence, word.region));
    }

    blocks
}
