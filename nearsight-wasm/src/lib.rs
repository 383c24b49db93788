//! WebAssembly bindings for Nearsight.
//!
//! Builds descriptors and searches a caller-supplied corpus directly in the
//! browser. Every entry point takes and returns JSON strings; failures are
//! reported in the `error` field instead of being thrown.

use serde::Serialize;
use wasm_bindgen::prelude::*;
use nearsight_core::{
    hamming_distance, scoring, CancelFlag, CorpusEntry, DescriptorBuilder, ImageDescriptor,
    ScanControl, SearchConfig, SearchProgress, SearchReport, SignalScores, StoredRecord,
};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Result of building a descriptor.
#[derive(Serialize)]
pub struct DescriptorResponse {
    pub ok: bool,
    pub descriptor: Option<ImageDescriptor>,
    pub error: Option<String>,
}

/// Result of a corpus search.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub ok: bool,
    pub report: Option<SearchReport>,
    /// Corpus entries that could not be parsed as records
    pub unreadable: usize,
    pub error: Option<String>,
}

/// Result of comparing two descriptors.
#[derive(Serialize)]
pub struct CompareResponse {
    pub ok: bool,
    pub signals: Option<SignalScores>,
    pub error: Option<String>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(r#"{{"ok":false,"error":"Serialization error: {}"}}"#, e)
    })
}

fn parse_config(config_json: Option<String>) -> Result<SearchConfig, String> {
    match config_json {
        Some(json) if !json.trim().is_empty() => {
            SearchConfig::from_json(&json).map_err(|e| format!("Invalid config: {}", e))
        }
        _ => Ok(SearchConfig::default()),
    }
}

fn parse_descriptor(json: &str, what: &str) -> Result<ImageDescriptor, String> {
    serde_json::from_str(json).map_err(|e| format!("Failed to parse {}: {}", what, e))
}

/// Build a descriptor from encoded image bytes (JPEG, PNG, GIF or WebP).
///
/// # Arguments
/// * `image_bytes` - The encoded image file
/// * `config_json` - Optional search configuration JSON
///
/// # Returns
/// A JSON string `{ok, descriptor, error}`
#[wasm_bindgen]
pub fn build_descriptor_wasm(image_bytes: &[u8], config_json: Option<String>) -> String {
    let response = match build_internal(image_bytes, config_json) {
        Ok(descriptor) => DescriptorResponse {
            ok: true,
            descriptor: Some(descriptor),
            error: None,
        },
        Err(e) => DescriptorResponse {
            ok: false,
            descriptor: None,
            error: Some(e),
        },
    };
    to_json(&response)
}

fn build_internal(
    image_bytes: &[u8],
    config_json: Option<String>,
) -> Result<ImageDescriptor, String> {
    let config = parse_config(config_json)?;
    DescriptorBuilder::from_config(&config)
        .build_from_bytes(image_bytes)
        .map_err(|e| e.to_string())
}

/// Search a corpus of stored records.
///
/// # Arguments
/// * `query_json` - Query descriptor JSON
/// * `records_json` - JSON array of stored records (current or legacy shape)
/// * `config_json` - Optional search configuration JSON
/// * `progress` - Optional callback invoked as `progress(processed, total)`;
///   returning a truthy value cancels the scan
///
/// # Returns
/// A JSON string `{ok, report, unreadable, error}`
#[wasm_bindgen]
pub fn search_wasm(
    query_json: &str,
    records_json: &str,
    config_json: Option<String>,
    progress: Option<js_sys::Function>,
) -> String {
    let should_stop = move |p: SearchProgress| {
        let Some(callback) = &progress else {
            return false;
        };
        // A throwing callback does not stop the scan
        matches!(
            callback.call2(
                &JsValue::NULL,
                &JsValue::from_f64(p.processed_count as f64),
                &JsValue::from_f64(p.total_count as f64),
            ),
            Ok(v) if v.is_truthy()
        )
    };

    let response = match search_internal(query_json, records_json, config_json, should_stop) {
        Ok((report, unreadable)) => SearchResponse {
            ok: true,
            report: Some(report),
            unreadable,
            error: None,
        },
        Err(e) => SearchResponse {
            ok: false,
            report: None,
            unreadable: 0,
            error: Some(e),
        },
    };
    to_json(&response)
}

/// Run a search, cancelling it once `should_stop` returns true for a progress report.
fn search_internal(
    query_json: &str,
    records_json: &str,
    config_json: Option<String>,
    mut should_stop: impl FnMut(SearchProgress) -> bool + 'static,
) -> Result<(SearchReport, usize), String> {
    let config = parse_config(config_json)?;
    let query = parse_descriptor(query_json, "query descriptor")?;
    let (corpus, unreadable) = parse_records(records_json)?;

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let mut control = ScanControl::new()
        .with_cancel(cancel)
        .on_progress(move |p| {
            if should_stop(p) {
                trigger.cancel();
            }
        });

    let report = nearsight_core::search(&query, &corpus, &config, &mut control)
        .map_err(|e| format!("Search failed: {}", e))?;
    Ok((report, unreadable))
}

/// Parse a JSON array of records, counting the elements that do not decode.
fn parse_records(records_json: &str) -> Result<(Vec<CorpusEntry>, usize), String> {
    let values: Vec<serde_json::Value> = serde_json::from_str(records_json)
        .map_err(|e| format!("Failed to parse records: {}", e))?;

    let mut corpus = Vec::with_capacity(values.len());
    let mut unreadable = 0;
    for value in values {
        match StoredRecord::from_json(&value.to_string()) {
            Ok(record) => corpus.push(CorpusEntry::from(record)),
            Err(_) => unreadable += 1,
        }
    }
    Ok((corpus, unreadable))
}

/// Compare two descriptors and return every signal without gating.
#[wasm_bindgen]
pub fn compare_wasm(
    query_json: &str,
    candidate_json: &str,
    config_json: Option<String>,
) -> String {
    let result = parse_config(config_json).and_then(|config| {
        let query = parse_descriptor(query_json, "query descriptor")?;
        let candidate = parse_descriptor(candidate_json, "candidate descriptor")?;
        Ok(scoring::compare(&query, &candidate, &config))
    });

    let response = match result {
        Ok(signals) => CompareResponse {
            ok: true,
            signals: Some(signals),
            error: None,
        },
        Err(e) => CompareResponse {
            ok: false,
            signals: None,
            error: Some(e),
        },
    };
    to_json(&response)
}

/// Bit distance between two equal-length hex hashes, or -1 if incomparable.
#[wasm_bindgen]
pub fn hamming_distance_wasm(a: &str, b: &str) -> i32 {
    hamming_distance(a, b).map_or(-1, |d| i32::try_from(d).unwrap_or(i32::MAX))
}

/// Get the library version.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearsight_core::ScanStatus;
    use serde_json::Value;

    fn png(seed: u8) -> Vec<u8> {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            let v = ((x * 4) as u8).wrapping_add((y as u8).wrapping_mul(seed));
            image::Rgb([v, v.wrapping_mul(3), 255 - v])
        });
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn descriptor_json(seed: u8) -> String {
        let response: Value =
            serde_json::from_str(&build_descriptor_wasm(&png(seed), None)).unwrap();
        assert_eq!(response["ok"], true);
        response["descriptor"].to_string()
    }

    #[test]
    fn test_build_descriptor_reports_errors_as_json() {
        let response: Value =
            serde_json::from_str(&build_descriptor_wasm(b"not an image", None)).unwrap();
        assert_eq!(response["ok"], false);
        assert!(response["error"].as_str().is_some());
    }

    #[test]
    fn test_search_mixed_records() {
        let query = descriptor_json(3);
        let records = format!(
            r#"[
                {{"id":"a","name":"a.png","path":"root","createdAt":"2024-01-01T00:00:00Z","descriptor":{query}}},
                {{"garbage":true}}
            ]"#
        );

        let (report, unreadable) = search_internal(&query, &records, None, |_| false).unwrap();
        assert_eq!(unreadable, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].id, "a");

        let response: Value =
            serde_json::from_str(&search_wasm(&query, &records, None, None)).unwrap();
        assert_eq!(response["ok"], true);
        assert_eq!(response["unreadable"], 1);
    }

    #[test]
    fn test_progress_callback_can_stop_the_search() {
        let query = descriptor_json(5);
        let descriptor: Value = serde_json::from_str(&query).unwrap();
        let records: Vec<Value> = (0..6)
            .map(|i| {
                serde_json::json!({
                    "id": format!("r{i}"),
                    "name": format!("r{i}.png"),
                    "path": "root",
                    "createdAt": "2024-01-01T00:00:00Z",
                    "descriptor": descriptor,
                })
            })
            .collect();
        let records = Value::Array(records).to_string();
        let config = Some(r#"{"search":{"progress_interval":2}}"#.to_string());

        let mut calls = 0;
        let (report, _) = search_internal(&query, &records, config.clone(), move |p| {
            calls += 1;
            calls == 1 && p.processed_count == 2
        })
        .unwrap();
        assert_eq!(report.status, ScanStatus::Cancelled);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.total, 6);
        assert_eq!(report.results.len(), 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "cancelled");

        let (report, _) = search_internal(&query, &records, config, |_| false).unwrap();
        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.scanned, 6);
    }

    #[test]
    fn test_search_rejects_bad_query() {
        let response: Value = serde_json::from_str(&search_wasm("{}", "[]", None, None)).unwrap();
        assert_eq!(response["ok"], false);

        let response: Value =
            serde_json::from_str(&search_wasm("nope", "[]", Some(String::new()), None)).unwrap();
        assert_eq!(response["ok"], false);
    }

    #[test]
    fn test_compare_and_hamming() {
        let a = descriptor_json(3);
        let response: Value = serde_json::from_str(&compare_wasm(&a, &a, None)).unwrap();
        assert_eq!(response["ok"], true);
        assert_eq!(response["signals"]["global"], 1.0);

        assert_eq!(hamming_distance_wasm("ff", "0f"), 4);
        assert_eq!(hamming_distance_wasm("ff", "f"), -1);
        assert!(!get_version().is_empty());
    }
}
