//! Document extraction: OCR delegation, block post-processing and
//! structured-field recognition.
//!
//! The external OCR engine is abstracted behind [`BlockSource`]; the
//! [`TesseractBlockSource`] adapter drives the system tesseract/poppler
//! binaries for real files, and tests script their own sources.

mod block;
mod extractor;
mod fields;
mod tesseract;

pub use block::{Block, BlockKind, BlockSource, BlockSourceError};
pub use extractor::{DocumentExtractor, ExtractError, ExtractOptions};
pub use fields::FieldExtractor;
pub use tesseract::TesseractBlockSource;
