pub mod csv_export;
pub mod csv_import;
pub mod file;

pub use csv_export::export_csv;
pub use csv_import::{import_estimates, CsvEstimationSource};
pub use file::FileTimelineStore;

/// Keep ASCII letters, digits, `-` and `_`; percent-encode every other byte.
/// Project ids pass through this before becoming file names.
pub(crate) fn escape_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
