//! Integration tests for decoding backend payloads into domain records
//!
//! Uses payloads shaped like real `search_read` responses, including the
//! backend's `false`-for-empty convention and fields the records do not model.

use erpshield_domain::{
    CountryState, Many2One, PipelineStage, RemoteRecord, SalesTeam, Salesperson, ShieldError,
};
use serde_json::json;

/// Validates decoding a full stage listing.
///
/// # Test Steps
/// 1. Decode a `search_read` result for `crm.stage`
/// 2. Verify ordering, won flags and team references survive
/// 3. Confirm unmodelled fields land in `extra`
#[test]
fn test_decode_stage_listing() {
    let payload = json!([
        {"id": 1, "name": "New", "sequence": 1, "is_won": false, "fold": false, "team_id": false},
        {"id": 2, "name": "Qualified", "sequence": 2, "is_won": false, "fold": false, "team_id": [3, "Europe"]},
        {"id": 4, "name": "Won", "sequence": 70, "is_won": true, "fold": false, "team_id": false,
         "rotting_threshold_days": 0}
    ]);

    let stages: Vec<PipelineStage> = serde_json::from_value(payload).unwrap();

    assert_eq!(stages.len(), 3);
    assert_eq!(stages.iter().filter(|s| s.is_won).count(), 1);
    assert_eq!(stages[1].team_id, Some(Many2One::new(3, "Europe")));
    assert_eq!(stages[2].extra.get("rotting_threshold_days"), Some(&json!(0)));
}

/// Validates that every reference record names its model and requests `id`.
#[test]
fn test_reference_models_request_ids() {
    for (model, fields) in [
        (PipelineStage::MODEL, PipelineStage::FIELDS),
        (SalesTeam::MODEL, SalesTeam::FIELDS),
        (Salesperson::MODEL, Salesperson::FIELDS),
        (CountryState::MODEL, CountryState::FIELDS),
    ] {
        assert!(fields.contains(&"id"), "{model} must request id");
        assert!(fields.contains(&"name"), "{model} must request name");
    }
    assert_eq!(Salesperson::default_domain(), json!([["share", "=", false]]));
}

/// Validates that a payload of the wrong shape becomes a serialization error.
#[test]
fn test_wrong_shape_is_serialization_error() {
    let result: Result<Vec<CountryState>, ShieldError> =
        serde_json::from_value(json!({"id": 1})).map_err(ShieldError::from);

    assert!(matches!(result, Err(ShieldError::Serialization { .. })));
}
