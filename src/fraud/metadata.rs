//! Metadata/tamper heuristics over the raw file bytes.
//!
//! Looks for structural red flags without parsing the full container: a
//! mismatched PDF magic number and editing-tool signatures left in the byte
//! stream (producer strings, XMP history, EXIF software tags all surface as
//! plain text in practice).

use crate::models::MetadataAnalysis;

/// PDF editing tool signatures; each hit multiplies consistency by 0.7.
const PDF_EDITOR_SIGNATURES: &[&str] = &["iText", "PDFtk", "Ghostscript", "LibreOffice", "Foxit"];

/// Image editor signatures; each hit multiplies consistency by 0.8.
const IMAGE_EDITOR_SIGNATURES: &[&str] = &["Photoshop", "GIMP", "Paint", "Pixelmator", "Canva"];

/// Tools whose presence alone marks the metadata suspicious.
const HIGH_RISK_TOOLS: &[&str] = &["Photoshop", "GIMP", "Paint"];

const PDF_EDITOR_PENALTY: f32 = 0.7;
const IMAGE_EDITOR_PENALTY: f32 = 0.8;
const SUSPICIOUS_CONSISTENCY: f32 = 0.6;

/// Analyze raw bytes for tampering signals.
pub fn analyze(bytes: &[u8], mime_type: &str) -> MetadataAnalysis {
    let mut consistency: f32 = 1.0;
    let mut tools = Vec::new();
    let mut has_been_edited = false;

    // A file claiming to be a PDF must start with the PDF magic number.
    if mime_type == "application/pdf" && !bytes.starts_with(b"%PDF-") {
        consistency = 0.0;
    }

    for signature in PDF_EDITOR_SIGNATURES {
        if find_subsequence(bytes, signature.as_bytes()) {
            has_been_edited = true;
            tools.push(signature.to_string());
            consistency *= PDF_EDITOR_PENALTY;
        }
    }

    for signature in IMAGE_EDITOR_SIGNATURES {
        if find_subsequence(bytes, signature.as_bytes()) {
            has_been_edited = true;
            tools.push(signature.to_string());
            consistency *= IMAGE_EDITOR_PENALTY;
        }
    }

    let high_risk = tools
        .iter()
        .any(|t| HIGH_RISK_TOOLS.iter().any(|h| t.contains(h)));
    let suspicious = consistency < SUSPICIOUS_CONSISTENCY || high_risk;

    MetadataAnalysis {
        has_been_edited,
        suspicious,
        consistency,
        tools,
    }
}

/// Naive subsequence search; signatures are short and files are bounded by
/// the ingestion size cap.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
