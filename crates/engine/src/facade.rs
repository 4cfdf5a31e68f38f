use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::inference::{ContextBundle, InferenceClient};
use advisor_graph::{centrality, centrality_percentiles, expand, FactReport, GraphState};
use advisor_ingest::{FileEvent, IngestConfig, IngestionCoordinator, ScanReport};
use advisor_ledger::{CacheKey, IgnoreRecord, Ledger, ViolationRecord};
use advisor_parser::{parse_file, Language, TreeSitterAdapter, UnitOutcome};
use advisor_protocol::{Fingerprint, NodeId, NodeKind, StructuralNode};
use advisor_scoring::{Embedder, ScoreInputs, Scorer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;

const RULE_SINGLE_RESPONSIBILITY: &str = "single-responsibility";

/// Outcome of one on-save advisory pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Below the violation threshold. Nothing is stored: the ledger
    /// tracks findings, not saves.
    Clean { score: f64 },
    /// The block's current fingerprint carries an active ignore.
    Ignored,
    /// A prior verdict for identical logic, replayed without inference.
    Cached { verdict: String },
    /// Fresh inference output; written back to the ledger in the
    /// background.
    Fresh { verdict: String, score: f64 },
    /// The engine could not compute an answer (unparsable file, budget
    /// exhausted). Never a guess.
    Unknown { reason: String },
}

enum Effect {
    StoreVerdict {
        key: CacheKey,
        verdict: String,
    },
    RecordViolation {
        node: NodeId,
        severity: f64,
        snippet: String,
    },
    /// Barrier: acknowledged once every effect queued before it landed.
    Flush {
        done: tokio::sync::oneshot::Sender<()>,
    },
}

/// The engine facade: owns the ingestion coordinator, the ledger, and
/// the collaborator handles, and runs the on-save pipeline.
pub struct Advisor {
    config: EngineConfig,
    coordinator: IngestionCoordinator,
    ledger: Arc<Mutex<Ledger>>,
    embedder: Arc<dyn Embedder>,
    inference: Arc<dyn InferenceClient>,
    effects_tx: mpsc::Sender<Effect>,
}

impl Advisor {
    /// Open an advisor over a project root, with persistent graph and
    /// ledger state under `<root>/.advisor/`.
    pub fn open(
        root: impl AsRef<Path>,
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        inference: Arc<dyn InferenceClient>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let state_dir = root.join(".advisor");
        let graph_path = state_dir.join("graph.json");

        let state = if graph_path.exists() {
            match GraphState::load(&graph_path) {
                Ok(state) => state,
                Err(err) => {
                    log::warn!("Failed to load graph snapshot: {err}; starting fresh");
                    GraphState::new()
                }
            }
        } else {
            GraphState::new()
        };

        let ledger = Ledger::open(state_dir.join("ledger"))?;
        Self::start(root, config, state, ledger, Some(graph_path), embedder, inference)
    }

    /// Ephemeral advisor with in-memory stores.
    pub fn in_memory(
        root: impl AsRef<Path>,
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        inference: Arc<dyn InferenceClient>,
    ) -> Result<Self> {
        Self::start(
            root.as_ref().to_path_buf(),
            config,
            GraphState::new(),
            Ledger::in_memory(),
            None,
            embedder,
            inference,
        )
    }

    fn start(
        root: PathBuf,
        config: EngineConfig,
        state: GraphState,
        ledger: Ledger,
        persist_path: Option<PathBuf>,
        embedder: Arc<dyn Embedder>,
        inference: Arc<dyn InferenceClient>,
    ) -> Result<Self> {
        let coordinator = IngestionCoordinator::start(
            &root,
            state,
            IngestConfig {
                queue_capacity: config.limits.write_queue_capacity,
                batch_size: config.limits.write_batch_size,
                persist_path,
            },
        );

        let ledger = Arc::new(Mutex::new(ledger));
        let (effects_tx, effects_rx) = mpsc::channel(config.limits.effects_queue_capacity);
        spawn_effects_worker(
            Arc::clone(&ledger),
            Arc::clone(&embedder),
            effects_rx,
        );

        Ok(Self {
            config,
            coordinator,
            ledger,
            embedder,
            inference,
            effects_tx,
        })
    }

    /// Full-project ingestion under the configured wall-clock budget.
    pub async fn genesis_scan(&self) -> Result<ScanReport> {
        let budget = Duration::from_millis(self.config.limits.scan_budget_ms);
        Ok(self.coordinator.scan_with_budget(budget).await?)
    }

    /// Latest committed graph snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GraphState> {
        self.coordinator.snapshot()
    }

    /// Deterministic facts over the current snapshot, bounded by the
    /// configured fact budget.
    #[must_use]
    pub fn facts(&self) -> FactReport {
        let deadline = Instant::now() + Duration::from_millis(self.config.limits.fact_budget_ms);
        FactReport::compute(&self.snapshot(), &self.config.layers, Some(deadline))
    }

    /// Prior ledger findings for a node.
    #[must_use]
    pub fn prior_findings(&self, node: &NodeId) -> Vec<ViolationRecord> {
        let ledger = lock_ledger(&self.ledger);
        ledger
            .violations_for(node)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Record an ignore for a block fingerprint. Persisted immediately;
    /// any structural change to the block invalidates it implicitly.
    pub fn ignore(&self, fingerprint: Fingerprint, reason: &str) -> Result<IgnoreRecord> {
        let mut ledger = lock_ledger(&self.ledger);
        let record = ledger.ignore(fingerprint, reason)?;
        if let Err(err) = ledger.save() {
            log::warn!("Failed to persist ledger after ignore: {err}");
        }
        Ok(record)
    }

    /// The full on-save pipeline for one changed file.
    pub async fn on_save(&self, path: impl AsRef<Path>) -> Result<Verdict> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.coordinator.root().join(path)
        };
        let revision = self
            .coordinator
            .on_event(FileEvent::modified(&absolute))
            .await?;
        let snapshot = self.snapshot();
        let rel = relative_to(self.coordinator.root(), &absolute);

        if snapshot.unparsable_files().contains_key(&rel) {
            return Ok(Verdict::Unknown {
                reason: format!("{rel} needs a syntax fix before analysis"),
            });
        }

        let Some(focal) = focal_unit(&snapshot, &rel) else {
            return Ok(Verdict::Clean { score: 0.0 });
        };
        let fingerprint = focal.fingerprint.clone();

        // Interactive fast path: both checks are direct key reads.
        {
            let ledger = lock_ledger(&self.ledger);
            if ledger.is_ignored(&fingerprint) {
                return Ok(Verdict::Ignored);
            }
            let key = CacheKey::new(&fingerprint, &self.config.ruleset_version);
            if let Some(entry) = ledger.lookup(&key) {
                log::debug!("cache hit for {rel} at {revision}");
                return Ok(Verdict::Cached {
                    verdict: entry.verdict.clone(),
                });
            }
        }

        self.advise_on_miss(&rel, &absolute, &snapshot, &focal).await
    }

    /// Cache-miss path: derive facts, score the unit, and consult the
    /// inference collaborator. This is the only place embeddings or
    /// inference are invoked, and never once per save.
    async fn advise_on_miss(
        &self,
        rel: &str,
        path: &Path,
        snapshot: &GraphState,
        focal: &StructuralNode,
    ) -> Result<Verdict> {
        let deadline = Instant::now() + Duration::from_millis(self.config.limits.fact_budget_ms);
        let facts = FactReport::compute(snapshot, &self.config.layers, Some(deadline));
        let neighborhood = expand(snapshot, &focal.id, &self.config.expansion)?;

        let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
        let snippet = content
            .get(focal.span.start_byte..focal.span.end_byte.min(content.len()))
            .unwrap_or(content.as_str())
            .to_string();
        let imports = imports_of(rel, &content);

        let method_names = method_names_of(snapshot, rel, focal);
        let embeddings = self.embed_signatures(&method_names).await?;

        let layer_violation = !facts.violations_for_file(rel).is_empty();
        let scorer = Scorer::new(self.config.weights);
        let breakdown = scorer.score(&ScoreInputs {
            method_names: &method_names,
            method_embeddings: &embeddings,
            imports: &imports,
            tolerance: self.config.tolerances.tolerance_for(rel),
            layer_violation,
        });

        if !breakdown.is_violation(self.config.weights.threshold) {
            return Ok(Verdict::Clean {
                score: breakdown.total,
            });
        }

        let scores = centrality(snapshot, self.config.centrality);
        let blast_radius = centrality_percentiles(&scores)
            .get(&focal.id)
            .copied()
            .unwrap_or(0.0);
        let severity = (breakdown.total
            + blast_radius * self.config.weights.blast_radius_weight)
            .clamp(0.0, 1.0);
        let score = breakdown.total;

        let prior_findings = {
            let ledger = lock_ledger(&self.ledger);
            ledger
                .violations_for(&focal.id)
                .into_iter()
                .cloned()
                .collect()
        };
        let bundle = ContextBundle {
            file: rel.to_string(),
            focal: focal.id.clone(),
            snippet: snippet.clone(),
            facts,
            neighborhood,
            score: breakdown,
            blast_radius,
            prior_findings,
        };

        let budget = Duration::from_millis(self.config.limits.inference_budget_ms);
        let inference = Arc::clone(&self.inference);
        let collected = tokio::time::timeout(budget, async move {
            let mut stream = inference.advise(bundle).await?;
            let mut verdict = String::new();
            while let Some(fragment) = stream.recv().await {
                verdict.push_str(&fragment);
            }
            Ok::<String, EngineError>(verdict)
        })
        .await;

        let verdict = match collected {
            Err(_elapsed) => {
                log::warn!("inference budget exceeded for {rel}");
                return Ok(Verdict::Unknown {
                    reason: format!("inference timed out for {rel}"),
                });
            }
            Ok(Err(err)) => return Err(err),
            Ok(Ok(verdict)) => verdict,
        };

        // Ledger writes and vectorization ride the background queue and
        // never block the interactive response.
        let key = CacheKey::new(&focal.fingerprint, &self.config.ruleset_version);
        self.enqueue(Effect::StoreVerdict {
            key,
            verdict: verdict.clone(),
        });
        self.enqueue(Effect::RecordViolation {
            node: focal.id.clone(),
            severity,
            snippet,
        });

        Ok(Verdict::Fresh { verdict, score })
    }

    async fn embed_signatures(&self, method_names: &[String]) -> Result<Vec<Vec<f32>>> {
        if method_names.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = Arc::clone(&self.embedder);
        let signatures: Vec<String> = method_names
            .iter()
            .map(|name| format!("def {name}()"))
            .collect();
        let embeddings = tokio::task::spawn_blocking(move || {
            signatures
                .iter()
                .map(|signature| embedder.embed(signature))
                .collect::<advisor_scoring::Result<Vec<Vec<f32>>>>()
        })
        .await
        .map_err(|err| EngineError::Inference(format!("embedding task failed: {err}")))??;
        Ok(embeddings)
    }

    fn enqueue(&self, effect: Effect) {
        if self.effects_tx.try_send(effect).is_err() {
            log::warn!("background effects queue is full; dropping a ledger write");
        }
    }

    /// Wait for every previously queued background effect to land.
    pub async fn flush_effects(&self) {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        if self
            .effects_tx
            .send(Effect::Flush { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}

fn spawn_effects_worker(
    ledger: Arc<Mutex<Ledger>>,
    embedder: Arc<dyn Embedder>,
    mut effects_rx: mpsc::Receiver<Effect>,
) {
    tokio::spawn(async move {
        while let Some(effect) = effects_rx.recv().await {
            match effect {
                Effect::StoreVerdict { key, verdict } => {
                    let mut guard = lock_ledger(&ledger);
                    guard.store(key, verdict);
                    if let Err(err) = guard.save() {
                        log::warn!("Failed to persist ledger: {err}");
                    }
                }
                Effect::RecordViolation {
                    node,
                    severity,
                    snippet,
                } => {
                    let text = snippet.clone();
                    let embedder = Arc::clone(&embedder);
                    let embedding =
                        match tokio::task::spawn_blocking(move || embedder.embed(&text)).await {
                            Ok(Ok(vector)) => Some(vector),
                            Ok(Err(err)) => {
                                log::warn!("Violation vectorization failed: {err}");
                                None
                            }
                            Err(err) => {
                                log::warn!("Violation vectorization task failed: {err}");
                                None
                            }
                        };

                    let mut guard = lock_ledger(&ledger);
                    guard.record_violation(ViolationRecord {
                        node,
                        rule: RULE_SINGLE_RESPONSIBILITY.to_string(),
                        severity,
                        snippet,
                        embedding,
                        created_at_unix_ms: now_unix_ms(),
                    });
                    if let Err(err) = guard.save() {
                        log::warn!("Failed to persist ledger: {err}");
                    }
                }
                Effect::Flush { done } => {
                    let _ = done.send(());
                }
            }
        }
    });
}

fn lock_ledger(ledger: &Arc<Mutex<Ledger>>) -> MutexGuard<'_, Ledger> {
    match ledger.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let relative = absolute.strip_prefix(root).unwrap_or(&absolute);
    let mut normalized = relative.to_string_lossy().to_string();
    if normalized.contains('\\') {
        normalized = normalized.replace('\\', "/");
    }
    normalized
}

/// The unit a save is judged by: the type with the most methods, else
/// the first interface, else the file itself.
fn focal_unit(snapshot: &GraphState, rel: &str) -> Option<StructuralNode> {
    let nodes = snapshot.nodes_in_file(rel);
    if nodes.is_empty() {
        return None;
    }

    nodes
        .iter()
        .filter(|node| node.id.kind == NodeKind::Type)
        .max_by_key(|node| (node.method_count, std::cmp::Reverse(node.id.clone())))
        .or_else(|| {
            nodes
                .iter()
                .find(|node| node.id.kind == NodeKind::Interface)
        })
        .or_else(|| nodes.iter().find(|node| node.id.kind == NodeKind::File))
        .map(|node| (*node).clone())
}

/// Simple names of the methods belonging to the focal unit (or the
/// whole file when the focal unit is the file).
fn method_names_of(snapshot: &GraphState, rel: &str, focal: &StructuralNode) -> Vec<String> {
    let scoped = matches!(focal.id.kind, NodeKind::Type | NodeKind::Interface);
    snapshot
        .nodes_in_file(rel)
        .into_iter()
        .filter(|node| node.id.kind == NodeKind::Method)
        .filter(|node| {
            if !scoped {
                return true;
            }
            let qualified = &node.id.qualified_name;
            qualified.starts_with(&format!("{}::", focal.id.qualified_name))
                || qualified.starts_with(&format!("{}.", focal.id.qualified_name))
        })
        .map(|node| simple_method_name(&node.id.qualified_name))
        .collect()
}

fn simple_method_name(qualified: &str) -> String {
    qualified
        .rsplit("::")
        .next()
        .and_then(|tail| tail.rsplit('.').next())
        .unwrap_or(qualified)
        .to_string()
}

/// Raw import names for concern analysis, re-read from the saved file.
fn imports_of(rel: &str, content: &str) -> Vec<String> {
    if Language::from_path(rel).is_none() || content.is_empty() {
        return Vec::new();
    }
    let mut adapter = TreeSitterAdapter::new();
    match parse_file(&mut adapter, rel, content) {
        Ok(UnitOutcome::Parsed(unit)) => unit
            .imports
            .into_iter()
            .map(|record| record.module)
            .collect(),
        _ => Vec::new(),
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}
