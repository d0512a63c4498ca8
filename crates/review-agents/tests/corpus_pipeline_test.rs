//! On-disk corpus and artifact pipeline: fixture corpus in a temp dir,
//! scripted transport in place of the HTTP client.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use coordination::corpus::TRUNCATION_MARKER;
use coordination::debate::{load_batch, write_atomic, write_json};
use coordination::{
    CompletionRequest, CompletionTransport, DataError, DebateOrchestrator, PaperLoader,
    ResultAggregator, ReviewAgent, TransportError,
};
use review_agents::{load_manifest, FsPaperLoader, PanelConfig};

const RATINGS: &str = "paper_id\tdecision\t0\t1\t2\n\
                       p1\tAccept\t8\t6\t7\n\
                       p2\tReject\t3\t4\t\n\
                       p3\tReject\t2\t2\t2\n\
                       p4\tAccept\t9\t9\t9\n";

fn write_corpus(dir: &Path) {
    std::fs::write(dir.join("ratings_subset.tsv"), RATINGS).unwrap();
    let parsed = dir.join("iclr_parsed");
    std::fs::create_dir_all(&parsed).unwrap();
    std::fs::write(parsed.join("p1.txt"), "Paper one. ".repeat(10)).unwrap();
    std::fs::write(parsed.join("p2.txt"), "x".repeat(500)).unwrap();
    // p3 has no extracted text.
    std::fs::write(parsed.join("p4.txt"), "Paper four.").unwrap();
}

/// Every agent scores by model name length; Round 1 moves everyone to 6.
struct LengthScorer;

#[async_trait]
impl CompletionTransport for LengthScorer {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError> {
        let prompt = request.last_user_content().unwrap_or_default();
        let score = if prompt.contains("previously reviewed") {
            6
        } else {
            request.model.len().clamp(1, 10)
        };
        Ok(format!(
            "Here is my review:\n```json\n{{\"score\": {score}, \"decision\": \"Reject\", \"reasoning\": \"ok\"}}\n```"
        ))
    }
}

// ── Manifest ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_manifest_matches_text_files_and_applies_limit() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());

    let all = load_manifest(dir.path(), None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|m| m.paper_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p4"]);
    assert_eq!(all[0].ground_truth_score, Some(7.0));
    assert_eq!(all[1].ground_truth_score, Some(3.5));
    assert_eq!(all[1].ground_truth_decision, "Reject");

    let limited = load_manifest(dir.path(), Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[1].paper_id, "p2");
}

#[tokio::test]
async fn test_manifest_treats_directory_as_missing_text() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    std::fs::create_dir(dir.path().join("iclr_parsed").join("p3.txt")).unwrap();

    let ids: Vec<String> = load_manifest(dir.path(), None)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.paper_id)
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "p4"]);
}

#[tokio::test]
async fn test_manifest_without_ratings_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_manifest(dir.path(), None).await.unwrap_err();
    assert!(matches!(err, DataError::Missing(_)));
}

// ── Loader ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_loader_caps_text() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let manifest = load_manifest(dir.path(), None).await.unwrap();

    let record = FsPaperLoader::new(10).load(&manifest[1]).await.unwrap();
    assert!(record.text.starts_with(&"x".repeat(40)));
    assert!(record.text.ends_with(TRUNCATION_MARKER));
    assert!(record.text.len() < 500);

    let record = FsPaperLoader::new(10_000).load(&manifest[2]).await.unwrap();
    assert_eq!(record.text, "Paper four.");
}

#[tokio::test]
async fn test_loader_missing_file_is_data_error() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let manifest = load_manifest(dir.path(), None).await.unwrap();
    std::fs::remove_file(&manifest[0].text_path).unwrap();

    let err = FsPaperLoader::new(100).load(&manifest[0]).await.unwrap_err();
    assert!(matches!(err, DataError::Missing(_)));
}

// ── Full pipeline ──────────────────────────────────────────────────

#[tokio::test]
async fn test_pipeline_writes_all_artifacts() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_corpus(data.path());

    let mut config = PanelConfig::default();
    config.run.data_dir = data.path().to_path_buf();
    config.run.output_dir = out.path().join("results");
    config.validate().unwrap();

    let manifest = load_manifest(&config.run.data_dir, config.run.limit)
        .await
        .unwrap();
    // Text disappears between manifest and processing: paper is skipped.
    std::fs::remove_file(&manifest[1].text_path).unwrap();

    let transport: Arc<dyn CompletionTransport> = Arc::new(LengthScorer);
    let agents: Vec<ReviewAgent> = config
        .identities()
        .into_iter()
        .map(|id| ReviewAgent::new(id, transport.clone()))
        .collect();

    let report = DebateOrchestrator::new(agents, Arc::new(FsPaperLoader::new(config.run.max_tokens)))
        .unwrap()
        .with_config(config.run.orchestrator_config())
        .run_report(manifest)
        .await
        .unwrap();

    let ids: Vec<&str> = report.batch.iter().map(|p| p.paper_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p4"]);
    assert_eq!(report.skipped.len(), 1);

    // openai/gpt-4o = 13 chars, clamped to 10; claude id > 10; mini > 10.
    assert_eq!(report.batch[0].reviews_round_0.scores(), vec![10, 10, 10]);
    assert_eq!(report.batch[0].reviews_round_1.scores(), vec![6, 6, 6]);

    let checkpoint = load_batch(&config.run.checkpoint_path()).await.unwrap();
    assert_eq!(checkpoint.len(), 2);

    write_json(&config.run.results_path(), &report.batch).await.unwrap();
    let csv = ResultAggregator::render_csv(&ResultAggregator::flatten(&report.batch));
    write_atomic(&config.run.table_path(), csv.as_bytes())
        .await
        .unwrap();

    let final_batch = load_batch(&config.run.results_path()).await.unwrap();
    assert_eq!(final_batch, report.batch);

    let table = std::fs::read_to_string(config.run.table_path()).unwrap();
    let mut lines = table.lines();
    assert_eq!(
        lines.next().unwrap(),
        "paper_id,gt_decision,gt_score,score_0_GPT-4o,score_0_Claude-3.5,score_0_GPT-4o-mini,avg_score_0,\
         score_1_GPT-4o,score_1_Claude-3.5,score_1_GPT-4o-mini,avg_score_1"
    );
    assert_eq!(lines.next().unwrap(), "p1,Accept,7.0,10,10,10,10.0,6,6,6,6.0");
    assert_eq!(lines.next().unwrap(), "p4,Accept,9.0,10,10,10,10.0,6,6,6,6.0");
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("panel.toml");
    std::fs::write(
        &path,
        r#"
        [provider]
        base_url = "http://localhost:8080/v1"

        [[agents]]
        model = "local/reviewer"
        name = "Local"

        [run]
        limit = 1
        resume = true
        "#,
    )
    .unwrap();

    let config = PanelConfig::load(Some(&path)).unwrap();
    assert_eq!(config.agents.len(), 1);
    assert_eq!(config.run.limit, Some(1));
    assert!(config.run.resume);
    config.validate().unwrap();

    assert!(PanelConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
}
