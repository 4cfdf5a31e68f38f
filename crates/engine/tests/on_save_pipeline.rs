use advisor_engine::{Advisor, ContextBundle, EngineConfig, InferenceClient, Verdict, VerdictStream};
use advisor_scoring::Embedder;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Deterministic embedder: methods sharing a name suffix land on the
/// same basis vector, everything else is orthogonal.
struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> advisor_scoring::Result<Vec<f32>> {
        let key = text
            .trim_end_matches("()")
            .rsplit(['_', ' '])
            .next()
            .unwrap_or(text);
        let slot = (key.bytes().map(u64::from).sum::<u64>() % 16) as usize;
        let mut basis = vec![0.0f32; 16];
        basis[slot] = 1.0;
        Ok(basis)
    }
}

struct StubInference {
    calls: AtomicUsize,
}

#[async_trait]
impl InferenceClient for StubInference {
    async fn advise(&self, _bundle: ContextBundle) -> advisor_engine::Result<VerdictStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(4);
        tx.send("well, ".to_string()).await.ok();
        tx.send("actually...".to_string()).await.ok();
        Ok(rx)
    }
}

const SERVICE_V1: &str = r#"import sqlalchemy
import jwt
import smtplib

class LedgerService:
    def create_record(self, payload):
        total = payload
        return sqlalchemy.insert(total)

    def delete_record(self, key):
        return sqlalchemy.delete(key)

    def check_token(self, token):
        return jwt.decode(token)

    def verify_token(self, token):
        return jwt.decode(token)

    def send_alert(self, message):
        return smtplib.send(message)

    def publish_alert(self, message):
        return smtplib.send(message)

    def compute_digest(self, payload):
        return hash(payload)

    def run_pipeline(self, payload):
        return payload
"#;

/// Same logic as V1 with local identifiers renamed: `total` -> `amount`
/// and `payload` -> `body` inside create_record.
const SERVICE_COSMETIC: &str = r#"import sqlalchemy
import jwt
import smtplib

class LedgerService:
    def create_record(self, body):
        amount = body
        return sqlalchemy.insert(amount)

    def delete_record(self, key):
        return sqlalchemy.delete(key)

    def check_token(self, token):
        return jwt.decode(token)

    def verify_token(self, token):
        return jwt.decode(token)

    def send_alert(self, message):
        return smtplib.send(message)

    def publish_alert(self, message):
        return smtplib.send(message)

    def compute_digest(self, payload):
        return hash(payload)

    def run_pipeline(self, payload):
        return payload
"#;

/// Structural change: create_record now calls a different external.
const SERVICE_STRUCTURAL: &str = r#"import sqlalchemy
import jwt
import smtplib

class LedgerService:
    def create_record(self, body):
        amount = body
        return sqlalchemy.upsert(amount)

    def delete_record(self, key):
        return sqlalchemy.delete(key)

    def check_token(self, token):
        return jwt.decode(token)

    def verify_token(self, token):
        return jwt.decode(token)

    def send_alert(self, message):
        return smtplib.send(message)

    def publish_alert(self, message):
        return smtplib.send(message)

    def compute_digest(self, payload):
        return hash(payload)

    def run_pipeline(self, payload):
        return payload
"#;

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn advisor_over(dir: &TempDir, inference: Arc<StubInference>) -> Advisor {
    let _ = env_logger::builder().is_test(true).try_init();
    Advisor::in_memory(
        dir.path(),
        EngineConfig::default(),
        Arc::new(StubEmbedder),
        inference,
    )
    .unwrap()
}

#[tokio::test]
async fn cosmetic_edits_replay_the_cached_verdict() {
    let dir = TempDir::new().unwrap();
    write(&dir, "app/service.py", SERVICE_V1);

    let inference = Arc::new(StubInference {
        calls: AtomicUsize::new(0),
    });
    let advisor = advisor_over(&dir, Arc::clone(&inference));
    advisor.genesis_scan().await.unwrap();

    // First save: a miss, so the inference collaborator runs once.
    let first = advisor.on_save("app/service.py").await.unwrap();
    match &first {
        Verdict::Fresh { verdict, score } => {
            assert_eq!(verdict, "well, actually...");
            assert!(*score >= 0.7, "expected a violation, got {score}");
        }
        other => panic!("expected a fresh verdict, got {other:?}"),
    }
    assert_eq!(inference.calls.load(Ordering::SeqCst), 1);
    advisor.flush_effects().await;

    // Cosmetic rename of locals: identical fingerprint, instant replay.
    write(&dir, "app/service.py", SERVICE_COSMETIC);
    let second = advisor.on_save("app/service.py").await.unwrap();
    assert_eq!(
        second,
        Verdict::Cached {
            verdict: "well, actually...".to_string()
        }
    );
    assert_eq!(
        inference.calls.load(Ordering::SeqCst),
        1,
        "cache hits must not consult the inference collaborator"
    );

    // Changing an externally called name is structural: miss again.
    write(&dir, "app/service.py", SERVICE_STRUCTURAL);
    let third = advisor.on_save("app/service.py").await.unwrap();
    assert!(matches!(third, Verdict::Fresh { .. }), "got {third:?}");
    assert_eq!(inference.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ignored_blocks_stay_silent_until_they_change() {
    let dir = TempDir::new().unwrap();
    write(&dir, "app/service.py", SERVICE_V1);

    let inference = Arc::new(StubInference {
        calls: AtomicUsize::new(0),
    });
    let advisor = advisor_over(&dir, Arc::clone(&inference));
    advisor.genesis_scan().await.unwrap();

    let snapshot = advisor.snapshot();
    let focal = snapshot
        .nodes_in_file("app/service.py")
        .into_iter()
        .find(|node| node.id.qualified_name == "LedgerService")
        .cloned()
        .unwrap();
    advisor
        .ignore(focal.fingerprint.clone(), "legacy, rewrite scheduled")
        .unwrap();

    let verdict = advisor.on_save("app/service.py").await.unwrap();
    assert_eq!(verdict, Verdict::Ignored);
    assert_eq!(inference.calls.load(Ordering::SeqCst), 0);

    // A structural change moves the fingerprint and wakes the advisor
    // back up, with no explicit un-ignore.
    write(&dir, "app/service.py", SERVICE_STRUCTURAL);
    let verdict = advisor.on_save("app/service.py").await.unwrap();
    assert!(matches!(verdict, Verdict::Fresh { .. }), "got {verdict:?}");
}

#[tokio::test]
async fn unparsable_files_report_unknown_not_guesses() {
    let dir = TempDir::new().unwrap();
    write(&dir, "app/service.py", SERVICE_V1);

    let inference = Arc::new(StubInference {
        calls: AtomicUsize::new(0),
    });
    let advisor = advisor_over(&dir, Arc::clone(&inference));
    advisor.genesis_scan().await.unwrap();

    write(&dir, "app/service.py", "class Broken(:\n");
    let verdict = advisor.on_save("app/service.py").await.unwrap();
    match verdict {
        Verdict::Unknown { reason } => assert!(reason.contains("syntax")),
        other => panic!("expected unknown, got {other:?}"),
    }

    // The stale-but-valid subtree is still in the graph, and the fact
    // report names the file as needing a syntax fix.
    let facts = advisor.facts();
    assert_eq!(facts.needs_syntax_fix, vec!["app/service.py".to_string()]);
    assert!(advisor.snapshot().contains_file("app/service.py"));
}

#[tokio::test]
async fn violations_and_embeddings_reach_the_ledger_in_background() {
    let dir = TempDir::new().unwrap();
    write(&dir, "app/service.py", SERVICE_V1);

    let inference = Arc::new(StubInference {
        calls: AtomicUsize::new(0),
    });
    let advisor = advisor_over(&dir, Arc::clone(&inference));
    advisor.genesis_scan().await.unwrap();

    let verdict = advisor.on_save("app/service.py").await.unwrap();
    assert!(matches!(verdict, Verdict::Fresh { .. }));
    advisor.flush_effects().await;

    let snapshot = advisor.snapshot();
    let focal_id = snapshot
        .nodes_in_file("app/service.py")
        .into_iter()
        .find(|node| node.id.qualified_name == "LedgerService")
        .map(|node| node.id.clone())
        .unwrap();
    let findings = advisor.prior_findings(&focal_id);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].embedding.is_some(), "vectorization must attach");
    assert!(findings[0].severity >= 0.7);
}
