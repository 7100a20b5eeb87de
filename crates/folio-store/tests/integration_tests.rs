//! Integration tests for folio-store
//!
//! These tests verify the stage store contract against both implementations,
//! plus the aggregate file cycle.

use chrono::{TimeZone, Utc};
use folio_domain::{StageKey, StageRecord, StageStore};
use folio_store::{
    load_aggregate, save_aggregate, AggregateOutput, JsonStageStore, MemoryStageStore,
};
use serde_json::json;
use tempfile::tempdir;

fn record(hash: &str, stage: &str, prompt_hash: &str) -> StageRecord {
    StageRecord {
        source_path: format!("{}.md", hash),
        source_hash: hash.to_string(),
        prompt_template: "two_pass".to_string(),
        stage_name: stage.to_string(),
        output_language: "en".to_string(),
        prompt_hash: prompt_hash.to_string(),
        provider: "mock".to_string(),
        model: "mock-model".to_string(),
        source_truncated: false,
        extracted_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        output: json!({ stage: format!("{} output", stage) }),
    }
}

fn exercise_store<S: StageStore>(store: &S)
where
    S::Error: std::fmt::Debug,
{
    assert!(store.load_all().unwrap().is_empty());

    store.put(&record("h1", "meta", "p1")).unwrap();
    store.put(&record("h1", "summary", "p1")).unwrap();
    store.put(&record("h2", "meta", "p1")).unwrap();

    let fetched = store.get(&StageKey::new("h1", "summary")).unwrap().unwrap();
    assert_eq!(fetched.output, json!({"summary": "summary output"}));
    assert!(store.get(&StageKey::new("h2", "summary")).unwrap().is_none());

    // Later success overwrites; still one record per key
    store.put(&record("h1", "meta", "p2")).unwrap();
    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 3);
    let meta = all.iter().find(|r| r.key() == StageKey::new("h1", "meta")).unwrap();
    assert_eq!(meta.prompt_hash, "p2");
}

#[test]
fn test_json_store_contract() {
    let dir = tempdir().unwrap();
    let store = JsonStageStore::new(dir.path().join("stages")).unwrap();
    exercise_store(&store);

    assert!(dir.path().join("stages/h1/meta.json").exists());
}

#[test]
fn test_memory_store_contract() {
    let store = MemoryStageStore::new();
    exercise_store(&store);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_json_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let original = record("h1", "meta", "p1");
    {
        let store = JsonStageStore::new(dir.path()).unwrap();
        store.put(&original).unwrap();
    }

    let reopened = JsonStageStore::new(dir.path()).unwrap();
    let records = reopened.load_all().unwrap();
    assert_eq!(records, vec![original]);
}

#[test]
fn test_stage_file_has_required_fields() {
    let dir = tempdir().unwrap();
    let store = JsonStageStore::new(dir.path()).unwrap();
    store.put(&record("h1", "meta", "p1")).unwrap();

    let text = std::fs::read_to_string(dir.path().join("h1/meta.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    for field in [
        "source_path",
        "source_hash",
        "prompt_template",
        "stage_name",
        "output_language",
        "prompt_hash",
        "extracted_at",
        "output",
    ] {
        assert!(value.get(field).is_some(), "missing field {}", field);
    }
}

#[test]
fn test_aggregate_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("papers.json");
    assert!(load_aggregate(&path).unwrap().is_none());

    let mut aggregate = AggregateOutput::new("two_pass");
    aggregate.papers.push(json!({"source_hash": "h1", "title": "A"}));
    save_aggregate(&path, &aggregate).unwrap();

    let loaded = load_aggregate(&path).unwrap().unwrap();
    assert_eq!(loaded, aggregate);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["template_tag"], "two_pass");
    assert!(raw["papers"].is_array());
}
