//! End-to-end tests for ctxengine.
//!
//! The first half drives the library crates in-process: assemble a context
//! package with mock adapters, then score generated text against the tags
//! the assembly produced. The second half runs the `ctxengine` binary on
//! JSON files.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use ctxengine_config::EngineConfig;
use ctxengine_core::{
    AdapterBundle, AdapterError, DataItem, EntitySource, KnowledgeSource, ProvenanceFields, Slot,
};
use ctxengine_grounding::{GroundingVerifier, VerificationStep};
use ctxengine_pipeline::{ContextAssembler, ContextRequest, UserContext};
use serde_json::{Value, json};

// ── Mock adapters ────────────────────────────────────────────────────────

struct StaticEntities {
    items: Vec<DataItem>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl EntitySource for StaticEntities {
    async fn get_entity_data(&self, _ids: &[String], _domain: &str) -> Result<Vec<DataItem>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
}

struct StaticKb(Vec<DataItem>);

#[async_trait::async_trait]
impl KnowledgeSource for StaticKb {
    async fn get_kb_chunks(&self, _domain: &str, _query: &str) -> Result<Vec<DataItem>, AdapterError> {
        Ok(self.0.clone())
    }
}

fn sourced(id: &str, source_type: &str, tier: i64, classification: &str) -> DataItem {
    DataItem {
        id: Some(id.into()),
        domain: Some("NPA".into()),
        data_classification: Some(classification.into()),
        ..DataItem::new(format!("content of {id}"))
    }
    .with_provenance(ProvenanceFields {
        source_id: Some(id.into()),
        source_type: Some(source_type.into()),
        authority_tier: Some(tier),
        fetched_at: Some(Utc::now().to_rfc3339()),
        ttl_seconds: Some(86_400),
        trust_class: Some("TRUSTED".into()),
        data_classification: Some(classification.into()),
        ..Default::default()
    })
}

fn worker_request() -> ContextRequest {
    serde_json::from_value(json!({
        "agent_id": "npa-classifier",
        "entity_ids": ["NPA-2026-001"],
        "query": "structured note classification",
        "system_prompt": "You classify new products.",
        "few_shot_examples": [{"input": "FX forward", "output": "Tier 3"}],
    }))
    .unwrap()
}

// ── In-process pipeline ──────────────────────────────────────────────────

#[tokio::test]
async fn assembled_tags_ground_cited_claims() {
    let entities = Arc::new(StaticEntities {
        items: vec![sourced("booking-sor", "system_of_record", 1, "CONFIDENTIAL")],
        calls: AtomicUsize::new(0),
    });
    let adapters = AdapterBundle::new()
        .with_entity_source(entities.clone())
        .with_knowledge_source(Arc::new(StaticKb(vec![sourced(
            "sop-governance-7",
            "bank_sop",
            2,
            "INTERNAL",
        )])));
    let user = UserContext {
        user_id: Some("u-42".into()),
        role: Some("analyst".into()),
        jurisdiction: Some("SG".into()),
        ..Default::default()
    };

    let config = Arc::new(EngineConfig::default());
    let assembler = ContextAssembler::new(config.clone()).unwrap();
    let assembled = assembler
        .assemble(&worker_request(), "worker", "NPA", Some(&user), &adapters)
        .await
        .unwrap();

    assert_eq!(entities.calls.load(Ordering::SeqCst), 1);
    assert!(assembler.validate(&assembled.context, "worker").unwrap().valid);
    assert!(!assembled.context.contains(Slot::CrossAgentContext));
    assert_eq!(assembled.metadata.provenance_tags.len(), 2);

    let tags: Vec<ProvenanceFields> = assembled
        .metadata
        .provenance_tags
        .iter()
        .map(ProvenanceFields::from)
        .collect();
    let verifier = GroundingVerifier::new(config.grounding.clone());

    let cited = "Per sop-governance-7, governance requires desk review for structured notes.";
    let report = verifier.score_grounding(cited, &tags, Utc::now());
    assert_eq!(report.claims_checked, 1);
    assert_eq!(report.score, 1.0);
    assert_eq!(report.verifications[0].cited_source.as_deref(), Some("sop-governance-7"));

    // A tier-2 SOP cannot back a financial threshold.
    let threshold = "Per sop-governance-7, the notional exceeds USD 50m.";
    let report = verifier.score_grounding(threshold, &tags, Utc::now());
    assert_eq!(report.score, 0.0);
    assert_eq!(
        report.verifications[0].failed_steps,
        vec![VerificationStep::AuthoritySufficient]
    );
}

#[tokio::test]
async fn assembled_package_serializes_with_metadata() {
    let assembler = ContextAssembler::new(Arc::new(EngineConfig::default())).unwrap();
    let assembled = assembler
        .assemble(&worker_request(), "orchestrator", "NPA", None, &AdapterBundle::new())
        .await
        .unwrap();

    let value = serde_json::to_value(&assembled).unwrap();
    assert!(value["context"].get("knowledge_chunks").is_none());
    assert_eq!(value["context"]["system_prompt_context"], "You classify new products.");
    assert_eq!(value["_metadata"]["archetype"], "orchestrator");
    let stages: Vec<&str> = value["_metadata"]["stages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["stage"].as_str())
        .collect();
    assert_eq!(
        stages,
        vec!["CLASSIFY", "SCOPE", "RETRIEVE", "RANK", "BUDGET", "ASSEMBLE", "TAG"]
    );
    assert_eq!(value["_metadata"]["budget_report"]["profile"], "lightweight");
}

// ── Binary ───────────────────────────────────────────────────────────────

fn write(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn ctxengine(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }
    Command::new(env!("CARGO_BIN_EXE_ctxengine"))
        .env_remove("CTXENGINE_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn cli_assemble_validate_and_ground_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let request = write(
        dir.path(),
        "request.json",
        &json!({
            "entity_ids": ["NPA-1"],
            "query": "structured notes",
            "system_prompt": "You are the NPA worker.",
        }),
    );
    let kb_item = serde_json::to_value(sourced("sop-governance-7", "bank_sop", 2, "INTERNAL")).unwrap();
    let kb = write(dir.path(), "kb.json", &json!([kb_item]));
    let entities = write(
        dir.path(),
        "entities.json",
        &json!([
            {"id": "mine", "entity_id": "NPA-1", "data_classification": "INTERNAL"},
            {"id": "theirs", "entity_id": "NPA-9", "data_classification": "INTERNAL"}
        ]),
    );

    let output = ctxengine(
        dir.path(),
        &[
            "assemble", "--request", &request, "--archetype", "worker", "--domain", "NPA",
            "--entities", &entities, "--kb", &kb,
        ],
    );
    let assembled = stdout_json(&output);
    let entity_ids: Vec<&str> = assembled["context"]["entity_data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["id"].as_str())
        .collect();
    assert_eq!(entity_ids, vec!["mine"]);
    assert!(assembled["_metadata"]["trace_id"].as_str().unwrap().starts_with("ctx-"));

    let package = write(dir.path(), "assembled.json", &assembled);
    let output = ctxengine(dir.path(), &["validate", "--package", &package, "--archetype", "worker"]);
    assert_eq!(stdout_json(&output)["valid"], true);

    let text = dir.path().join("answer.txt");
    std::fs::write(&text, "As sop-governance-7 states, policy requires dual review.").unwrap();
    let output = ctxengine(
        dir.path(),
        &["ground", "--text", &text.to_string_lossy(), "--tags", &package],
    );
    let report = stdout_json(&output);
    assert_eq!(report["claims_checked"], 1);
    assert_eq!(report["score"], 1.0);
}

#[test]
fn cli_validate_fails_on_missing_required_slot() {
    let dir = tempfile::tempdir().unwrap();
    let package = write(dir.path(), "package.json", &json!({"system_prompt_context": "hi"}));
    let output = ctxengine(dir.path(), &["validate", "--package", &package, "--archetype", "worker"]);
    assert!(!output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], false);
    assert!(
        result["missing_required"]
            .as_array()
            .unwrap()
            .contains(&json!("entity_data"))
    );
}

#[test]
fn cli_assemble_rejects_deny_listed_sources() {
    let dir = tempfile::tempdir().unwrap();
    let request = write(
        dir.path(),
        "request.json",
        &json!({
            "system_prompt": "p",
            "sources": [{"content": "rumour", "source_type": "social_media"}]
        }),
    );
    let output = ctxengine(
        dir.path(),
        &["assemble", "--request", &request, "--archetype", "worker", "--domain", "NPA"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("social_media"));
}

#[test]
fn cli_classify_reports_trust_and_tier() {
    let dir = tempfile::tempdir().unwrap();
    let output = ctxengine(dir.path(), &["classify", "bank_sop"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TRUSTED"));
    assert!(stdout.contains("tier 2"));

    let output = ctxengine(dir.path(), &["classify", "competitor_intelligence"]);
    assert!(!output.status.success());
}

#[test]
fn cli_config_prints_parseable_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let output = ctxengine(dir.path(), &["config"]);
    assert!(output.status.success());
    let parsed: toml::Value = toml::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(parsed["resilience"]["failure_threshold"].as_integer(), Some(3));
    assert!(parsed["budget"]["profiles"].get("compact").is_some());
}
