//! PDF text extraction backed by MuPDF.
//!
//! Exam PDFs almost always carry running headers and footers: the test
//! series name, page numbers, download URLs. Left in, those lines split
//! passages mid-paragraph and confuse segmentation, so blocks falling in a
//! configurable top or bottom band of each page are dropped.
//!
//! This crate is isolated from the rest of the workspace because of
//! MuPDF's AGPL license and native build requirements.

use std::path::Path;

use mupdf::{Document, TextPageFlags};

use examloom_parsing::{ExtractError, PdfBackend};

/// MuPDF-based [`PdfBackend`].
///
/// Text blocks are emitted with a blank line between them so downstream
/// paragraph splitting sees block boundaries as paragraph boundaries.
pub struct MupdfBackend {
    /// Fraction of page height treated as footer and skipped.
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height treated as header and skipped.
    header_exclusion_ratio: Option<f32>,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        MupdfBackend {
            footer_exclusion_ratio: Some(0.05),
            header_exclusion_ratio: Some(0.04),
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the footer band; `None` keeps footer text.
    pub fn with_footer_exclusion(mut self, ratio: Option<f32>) -> Self {
        self.footer_exclusion_ratio = ratio;
        self
    }

    /// Overrides the header band; `None` keeps header text.
    pub fn with_header_exclusion(mut self, ratio: Option<f32>) -> Self {
        self.header_exclusion_ratio = ratio;
        self
    }
}

impl PdfBackend for MupdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let Some(path_str) = path.to_str() else {
            return Err(ExtractError::Open("path is not valid UTF-8".to_string()));
        };
        let document = Document::open(path_str).map_err(|e| ExtractError::Open(e.to_string()))?;

        let mut pages_text = Vec::new();
        let pages = document
            .pages()
            .map_err(|e| ExtractError::Extraction(e.to_string()))?;
        for page in pages {
            let page = page.map_err(|e| ExtractError::Extraction(e.to_string()))?;
            let bounds = page
                .bounds()
                .map_err(|e| ExtractError::Extraction(e.to_string()))?;
            let page_height = bounds.y1 - bounds.y0;
            let footer_cutoff = self
                .footer_exclusion_ratio
                .map(|ratio| bounds.y1 - page_height * ratio);
            let header_cutoff = self
                .header_exclusion_ratio
                .map(|ratio| bounds.y0 + page_height * ratio);

            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| ExtractError::Extraction(e.to_string()))?;
            let mut page_text = String::new();
            for block in text_page.blocks() {
                let block_bounds = block.bounds();
                // A block is header text only when it sits entirely inside
                // the band; footer text when it starts inside the band.
                if let Some(cutoff) = header_cutoff
                    && block_bounds.y1 <= cutoff
                {
                    continue;
                }
                if let Some(cutoff) = footer_cutoff
                    && block_bounds.y0 >= cutoff
                {
                    continue;
                }
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(&line_text);
                    page_text.push('\n');
                }
                page_text.push('\n');
            }
            pages_text.push(page_text);
        }
        Ok(pages_text.join("\n"))
    }
}
