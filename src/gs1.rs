//! GS1 segment padding.
//!
//! Inside a GS1 composite barcode every segment has a fixed digit length
//! (GTIN-14 for products, GLN-13 for locations, SSCC-18 for packages). A
//! record whose own barcode is a shorter number is reachable through its
//! zero-padded form.

/// Zero-pad `barcode` to `length` digits.
///
/// Returns `None` unless the barcode is non-empty, purely numeric and
/// strictly shorter than `length`; a barcode that already has the full
/// length (or more) is never altered.
pub fn pad(barcode: &str, length: usize) -> Option<String> {
    if barcode.is_empty() || barcode.len() >= length {
        return None;
    }
    if !barcode.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>width$}", barcode, width = length))
}
