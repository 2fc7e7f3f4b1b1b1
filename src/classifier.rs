use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BinaryType {
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
    Xls,
    Xlsx,
    Zip,
    Rar,
    SevenZ,
    Tar,
    Tiff,
    Bin,
}

impl BinaryType {
    pub fn code(self) -> &'static str {
        match self {
            BinaryType::Pdf => "PDF",
            BinaryType::Doc => "DOC",
            BinaryType::Docx => "DOCX",
            BinaryType::Ppt => "PPT",
            BinaryType::Pptx => "PPTX",
            BinaryType::Xls => "XLS",
            BinaryType::Xlsx => "XLSX",
            BinaryType::Zip => "ZIP",
            BinaryType::Rar => "RAR",
            BinaryType::SevenZ => "7Z",
            BinaryType::Tar => "TAR",
            BinaryType::Tiff => "TIFF",
            BinaryType::Bin => "BIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Html,
    Binary(BinaryType),
    Unknown,
}

/// URL extensions that are always crawled regardless of robots.txt
/// disallow rules — a deliberate carve-out, not an oversight.
pub const ALWAYS_ALLOWED_EXTENSIONS: [&str; 7] =
    ["pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx"];

fn binary_type_from_extension(ext: &str) -> Option<BinaryType> {
    match ext {
        "pdf" => Some(BinaryType::Pdf),
        "doc" => Some(BinaryType::Doc),
        "docx" => Some(BinaryType::Docx),
        "ppt" => Some(BinaryType::Ppt),
        "pptx" => Some(BinaryType::Pptx),
        "xls" => Some(BinaryType::Xls),
        "xlsx" => Some(BinaryType::Xlsx),
        _ => None,
    }
}

fn binary_type_from_content_type(content_type: &str) -> Option<BinaryType> {
    let stripped = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    match stripped.as_str() {
        "application/pdf" | "application/x-pdf" => Some(BinaryType::Pdf),
        "application/msword" => Some(BinaryType::Doc),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(BinaryType::Docx)
        }
        "application/vnd.ms-powerpoint" => Some(BinaryType::Ppt),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(BinaryType::Pptx)
        }
        "application/vnd.ms-excel" => Some(BinaryType::Xls),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Some(BinaryType::Xlsx)
        }
        "application/zip" => Some(BinaryType::Zip),
        "application/x-rar" | "application/x-rar-compressed" => Some(BinaryType::Rar),
        "application/x-7z-compressed" => Some(BinaryType::SevenZ),
        "application/x-tar" => Some(BinaryType::Tar),
        "image/tiff" => Some(BinaryType::Tiff),
        "application/octet-stream" => Some(BinaryType::Bin),
        _ => None,
    }
}

pub fn url_extension(url: &Url) -> Option<String> {
    let path = url.path();
    path.rsplit('.').next().map(|s| s.to_lowercase()).filter(|_| path.contains('.'))
}

/// Classify a response from its Content-Type header and the request URL,
/// in the rule order spec.md §4.6 requires: content-type binary mapping
/// first, then URL extension, then text/html, else Unknown.
pub fn classify(content_type: Option<&str>, url: &Url) -> Classification {
    // A specific content-type (e.g. application/pdf) is authoritative and wins
    // immediately. A generic octet-stream marker is ambiguous, so it defers to
    // the URL extension when one maps to a more specific type — this is what
    // lets `/terms.pdf` served as `application/octet-stream` classify as PDF
    // rather than the generic BIN code (spec.md §4.6, §8 boundary behavior).
    let ct_binary = content_type.and_then(binary_type_from_content_type);
    if let Some(bt) = ct_binary {
        if bt != BinaryType::Bin {
            return Classification::Binary(bt);
        }
    }

    if let Some(ext) = url_extension(url) {
        if let Some(bt) = binary_type_from_extension(&ext) {
            return Classification::Binary(bt);
        }
    }

    if let Some(bt) = ct_binary {
        return Classification::Binary(bt);
    }

    if let Some(ct) = content_type {
        if ct.to_lowercase().contains("text/html") {
            return Classification::Html;
        }
    }

    Classification::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octet_stream_pdf_url_classified_as_pdf() {
        let url = Url::parse("https://example.com/terms.pdf").unwrap();
        let c = classify(Some("application/octet-stream"), &url);
        assert_eq!(c, Classification::Binary(BinaryType::Pdf));
    }

    #[test]
    fn content_type_wins_when_it_maps_to_binary() {
        let url = Url::parse("https://example.com/report").unwrap();
        let c = classify(Some("application/pdf; charset=binary"), &url);
        assert_eq!(c, Classification::Binary(BinaryType::Pdf));
    }

    #[test]
    fn html_content_type_classified_html() {
        let url = Url::parse("https://example.com/").unwrap();
        let c = classify(Some("text/html; charset=utf-8"), &url);
        assert_eq!(c, Classification::Html);
    }

    #[test]
    fn octet_stream_without_extension_falls_back_to_bin() {
        let url = Url::parse("https://example.com/download").unwrap();
        let c = classify(Some("application/octet-stream"), &url);
        assert_eq!(c, Classification::Binary(BinaryType::Bin));
    }

    #[test]
    fn unknown_without_hints() {
        let url = Url::parse("https://example.com/api/data").unwrap();
        let c = classify(Some("application/json"), &url);
        assert_eq!(c, Classification::Unknown);
    }
}
