//! End-to-end tests for `invgate` runs: loading, concurrent validation,
//! schema merging, report output and exit codes.

use std::io::Write;
use std::path::PathBuf;

use invgate_cli::load;
use invgate_cli::report::ReportFormat;
use invgate_cli::run::{self, RunOptions};
use invgate_core::{Domain, Layer, ValidationEngine, ValidationResult};
use serde_json::json;
use tempfile::NamedTempFile;

fn write_json(value: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, "{value}").expect("write temp file");
    file
}

fn options(input: Option<PathBuf>) -> RunOptions {
    RunOptions {
        input,
        schema_result: None,
        output: None,
        format: ReportFormat::Text,
    }
}

fn taiwan_relend_document(market: &str) -> serde_json::Value {
    json!({
        "inventoryData": {
            "inventory": [{
                "securityId": "2330",
                "market": market,
                "calculationType": "FOR_LOAN",
                "businessDate": "2024-03-15",
                "availableQuantity": 1000,
                "isBorrowed": true
            }]
        }
    })
}

// ---------------------------------------------------------------------------
// Test: built-in sample
// ---------------------------------------------------------------------------

/// The built-in sample is clean data and exits 0.
#[tokio::test]
async fn sample_document_passes() {
    let outcome = run::execute(&options(None)).await.expect("run should succeed");
    assert!(outcome.result.success, "unexpected violations:\n{}", outcome.report);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report.starts_with("Validation PASSED"));
}

// ---------------------------------------------------------------------------
// Test: violations and exit codes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn taiwan_relend_fails_with_exit_code_one() {
    let input = write_json(&taiwan_relend_document("TW"));
    let outcome = run::execute(&options(Some(input.path().to_path_buf())))
        .await
        .expect("run should succeed");

    assert!(!outcome.result.success);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.result.len(), 1);
    assert!(outcome.report.contains("Taiwan market rule violation: "));
}

#[tokio::test]
async fn same_record_outside_taiwan_passes() {
    let input = write_json(&taiwan_relend_document("US"));
    let outcome = run::execute(&options(Some(input.path().to_path_buf())))
        .await
        .expect("run should succeed");
    assert!(outcome.result.success);
}

/// A failed schema layer fails the run even when every rule passes.
#[tokio::test]
async fn schema_failure_is_merged() {
    let input = write_json(&json!({ "marketData": {} }));
    let schema = write_json(&json!({
        "success": false,
        "violations": [{ "message": "prices is required", "path": "/marketData" }]
    }));

    let mut opts = options(Some(input.path().to_path_buf()));
    opts.schema_result = Some(schema.path().to_path_buf());
    let outcome = run::execute(&opts).await.expect("run should succeed");

    assert!(!outcome.result.success);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.result.violations[0].layer, Layer::Schema);
    assert!(outcome.report.contains("[schema]"));
}

// ---------------------------------------------------------------------------
// Test: precondition failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_input_file_is_an_error() {
    let err = run::execute(&options(Some(PathBuf::from("/nonexistent/invgate-input.json"))))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read input file"));
}

#[tokio::test]
async fn malformed_collection_is_an_error() {
    let input = write_json(&json!({ "marketData": { "prices": { "not": "an array" } } }));
    let err = run::execute(&options(Some(input.path().to_path_buf())))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("not a valid dataset"));
}

// ---------------------------------------------------------------------------
// Test: report output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn json_report_is_written_to_output_file() {
    let input = write_json(&taiwan_relend_document("TW"));
    let output = NamedTempFile::new().expect("temp file");

    let opts = RunOptions {
        input: Some(input.path().to_path_buf()),
        schema_result: None,
        output: Some(output.path().to_path_buf()),
        format: ReportFormat::Json,
    };
    run::execute(&opts).await.expect("run should succeed");

    let written = std::fs::read_to_string(output.path()).expect("report written");
    let parsed: ValidationResult = serde_json::from_str(&written).expect("valid JSON report");
    assert!(!parsed.success);
    assert_eq!(parsed.violations[0].category, "Taiwan market rule violation");
    assert_eq!(parsed.violations[0].domain, Some(Domain::InventoryData));
}

// ---------------------------------------------------------------------------
// Test: concurrent validation
// ---------------------------------------------------------------------------

/// Running domains concurrently gives the same result as running them in
/// sequence.
#[tokio::test]
async fn concurrent_validation_matches_sequential() {
    let mut document = taiwan_relend_document("TW");
    document["positionData"] = json!({
        "settlementLadders": [{
            "positionId": "P-404",
            "settlementDate": "2024-03-18",
            "buckets": [{ "bucket": "SD0", "receipts": 0, "deliveries": 0, "netSettlement": 0 }]
        }]
    });
    let datasets = load::parse_document(&document).expect("valid document");

    let engine = ValidationEngine::new();
    let sequential = engine.validate_all(&datasets);
    let concurrent = run::validate_concurrently(&engine, datasets)
        .await
        .expect("tasks should not panic");

    assert_eq!(concurrent, sequential);
    assert_eq!(concurrent.len(), 2);
    assert_eq!(concurrent.violations[0].domain, Some(Domain::PositionData));
}
