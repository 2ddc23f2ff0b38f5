//! Page-range extraction from PDF books

use lopdf::Document;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("could not read PDF: {0}")]
    Read(#[from] lopdf::Error),

    #[error("could not write PDF: {0}")]
    Write(#[from] std::io::Error),

    #[error("page range {start}-{end} is outside the document's {page_count} pages")]
    PageRange { start: i32, end: i32, page_count: usize },
}

/// Number of pages in a PDF.
pub fn page_count(source: &[u8]) -> Result<usize, PdfError> {
    Ok(Document::load_mem(source)?.get_pages().len())
}

/// Copy the inclusive 1-based page range `[start, end]` into a new PDF.
pub fn extract_pages(source: &[u8], start: i32, end: i32) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::load_mem(source)?;
    let page_count = doc.get_pages().len();

    if start < 1 || start > end || end as usize > page_count {
        return Err(PdfError::PageRange {
            start,
            end,
            page_count,
        });
    }

    let dropped: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|&n| n < start as u32 || n > end as u32)
        .collect();
    doc.delete_pages(&dropped);
    doc.prune_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}
