use crate::error::{IngestError, Result};
use crate::events::{FileEvent, FileEventKind};
use crate::scanner::FileScanner;
use crate::stats::ScanStats;
use advisor_graph::GraphState;
use advisor_parser::{parse_file, Language, ParsedUnit, TreeSitterAdapter, UnitOutcome};
use advisor_protocol::{Revision, Span};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};

/// Queue and batch limits for the write path.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    /// Transactions applied per drain before a snapshot is published;
    /// bounds how long readers wait for a fresh revision.
    pub batch_size: usize,
    /// Where to persist the graph snapshot; None keeps it in memory.
    pub persist_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            batch_size: 32,
            persist_path: None,
        }
    }
}

/// Result of a genesis scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub revision: Revision,
    pub stats: ScanStats,
}

type Ack = oneshot::Sender<Result<Revision>>;

enum WriteCommand {
    Apply {
        file: String,
        unit: ParsedUnit,
        seq: u64,
        done: Ack,
    },
    MarkUnparsable {
        file: String,
        error_spans: Vec<Span>,
        seq: u64,
        done: Ack,
    },
    Remove {
        file: String,
        seq: u64,
        done: Ack,
    },
}

/// Owns the write side of the graph: a bounded worker pool parses files
/// and emits flat units; one consumer task applies them as batched
/// transactions. Interactive delta updates ride a priority lane drained
/// ahead of bulk-scan batches so a long genesis scan never starves
/// on-save latency.
pub struct IngestionCoordinator {
    root: PathBuf,
    interactive_tx: mpsc::Sender<WriteCommand>,
    bulk_tx: mpsc::Sender<WriteCommand>,
    snapshot_rx: watch::Receiver<Arc<GraphState>>,
    seq: AtomicU64,
}

impl IngestionCoordinator {
    /// Spawn the writer task and return the coordinator handle.
    #[must_use]
    pub fn start(root: impl AsRef<Path>, state: GraphState, config: IngestConfig) -> Self {
        let (interactive_tx, interactive_rx) = mpsc::channel(config.queue_capacity);
        let (bulk_tx, bulk_rx) = mpsc::channel(config.queue_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(state.clone()));

        tokio::spawn(writer_loop(
            state,
            interactive_rx,
            bulk_rx,
            snapshot_tx,
            config.batch_size.max(1),
            config.persist_path,
        ));

        Self {
            root: root.as_ref().to_path_buf(),
            interactive_tx,
            bulk_tx,
            snapshot_rx,
            seq: AtomicU64::new(0),
        }
    }

    /// Latest committed snapshot. Readers never block the writer.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GraphState> {
        self.snapshot_rx.borrow().clone()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Genesis scan: discover, parse, and ingest every source file under
    /// the root. Parse failures are recorded, never fatal.
    pub async fn scan(&self) -> Result<ScanReport> {
        let files = FileScanner::new(&self.root).scan();
        self.scan_files(files, None).await
    }

    /// Genesis scan with a cooperative wall-clock budget: on expiry the
    /// committed prefix stays and the report is marked partial.
    pub async fn scan_with_budget(&self, budget: Duration) -> Result<ScanReport> {
        let files = FileScanner::new(&self.root).scan();
        self.scan_files(files, Some(Instant::now() + budget)).await
    }

    pub async fn scan_files(
        &self,
        files: Vec<PathBuf>,
        deadline: Option<Instant>,
    ) -> Result<ScanReport> {
        let started = Instant::now();
        let mut stats = ScanStats::new();

        // Parsing mixes IO and CPU; a small adaptive cap avoids spikes.
        let max_concurrent = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(2, 8);

        log::info!(
            "Genesis scan: {} files, {} workers",
            files.len(),
            max_concurrent
        );

        let mut acks: Vec<oneshot::Receiver<Result<Revision>>> = Vec::with_capacity(files.len());

        'chunks: for chunk in files.chunks(max_concurrent) {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                log::warn!("Genesis scan budget exceeded; committing partial graph");
                stats.partial = true;
                break 'chunks;
            }

            let mut tasks = Vec::with_capacity(chunk.len());
            for path in chunk {
                let path = path.clone();
                let rel = self.normalize_path(&path);
                tasks.push(tokio::spawn(async move {
                    parse_one(&path, &rel).await
                }));
            }

            for task in tasks {
                match task.await {
                    Ok(Ok((outcome, lines))) => {
                        let done = self
                            .submit(outcome, lines, &mut stats, &self.bulk_tx)
                            .await?;
                        acks.push(done);
                    }
                    Ok(Err(err)) => stats.add_error(err.to_string()),
                    Err(err) => stats.add_error(format!("parse task panicked: {err}")),
                }
            }
        }

        let mut revision = self.snapshot().revision();
        for ack in acks {
            let applied = ack.await.map_err(|_| IngestError::WriterUnavailable)??;
            revision = revision.max(applied);
        }

        stats.time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!("Genesis scan complete: {stats:?}");
        Ok(ScanReport { revision, stats })
    }

    /// Apply one debounced file event as an interactive delta update.
    /// Events for a path are applied in arrival order; a stale in-flight
    /// parse is discarded by sequence number before commit.
    pub async fn on_event(&self, event: FileEvent) -> Result<Revision> {
        let path = if event.path.is_absolute() {
            event.path.clone()
        } else {
            self.root.join(&event.path)
        };
        let rel = self.normalize_path(&path);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        match event.kind {
            FileEventKind::Deleted | FileEventKind::Moved => {
                self.send_interactive(|done| WriteCommand::Remove {
                    file: rel,
                    seq,
                    done,
                })
                .await
            }
            FileEventKind::Created | FileEventKind::Modified => {
                if Language::from_path(&rel).is_none() {
                    return Ok(self.snapshot().revision());
                }
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => {
                        let mut adapter = TreeSitterAdapter::new();
                        let outcome = parse_file(&mut adapter, &rel, &content)?;
                        match outcome {
                            UnitOutcome::Parsed(unit) => {
                                self.send_interactive(|done| WriteCommand::Apply {
                                    file: rel,
                                    unit,
                                    seq,
                                    done,
                                })
                                .await
                            }
                            UnitOutcome::Unparsable { file, error_spans } => {
                                self.send_interactive(|done| WriteCommand::MarkUnparsable {
                                    file,
                                    error_spans,
                                    seq,
                                    done,
                                })
                                .await
                            }
                        }
                    }
                    // The file vanished between the event and the read:
                    // fold into the delete path, which is idempotent.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        self.send_interactive(|done| WriteCommand::Remove {
                            file: rel,
                            seq,
                            done,
                        })
                        .await
                    }
                    Err(err) => Err(IngestError::Io(err)),
                }
            }
        }
    }

    async fn send_interactive(
        &self,
        make: impl FnOnce(Ack) -> WriteCommand,
    ) -> Result<Revision> {
        let (done_tx, done_rx) = oneshot::channel();
        self.interactive_tx
            .send(make(done_tx))
            .await
            .map_err(|_| IngestError::WriterUnavailable)?;
        done_rx.await.map_err(|_| IngestError::WriterUnavailable)?
    }

    async fn submit(
        &self,
        outcome: UnitOutcome,
        lines: usize,
        stats: &mut ScanStats,
        lane: &mpsc::Sender<WriteCommand>,
    ) -> Result<oneshot::Receiver<Result<Revision>>> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (done_tx, done_rx) = oneshot::channel();
        let command = match outcome {
            UnitOutcome::Parsed(unit) => {
                stats.add_file(&unit.language, lines, unit.nodes.len());
                WriteCommand::Apply {
                    file: unit.file.clone(),
                    unit,
                    seq,
                    done: done_tx,
                }
            }
            UnitOutcome::Unparsable { file, error_spans } => {
                stats.add_unparsable();
                stats.add_error(format!("{file}: unparsable"));
                WriteCommand::MarkUnparsable {
                    file,
                    error_spans,
                    seq,
                    done: done_tx,
                }
            }
        };
        lane.send(command)
            .await
            .map_err(|_| IngestError::WriterUnavailable)?;
        Ok(done_rx)
    }

    fn normalize_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut normalized = relative.to_string_lossy().to_string();
        if normalized.contains('\\') {
            normalized = normalized.replace('\\', "/");
        }
        normalized
    }
}

async fn parse_one(path: &Path, rel: &str) -> Result<(UnitOutcome, usize)> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(IngestError::Io)?;
    let lines = content.lines().count();
    let mut adapter = TreeSitterAdapter::new();
    let outcome = parse_file(&mut adapter, rel, &content)?;
    Ok((outcome, lines))
}

async fn writer_loop(
    mut state: GraphState,
    mut interactive_rx: mpsc::Receiver<WriteCommand>,
    mut bulk_rx: mpsc::Receiver<WriteCommand>,
    snapshot_tx: watch::Sender<Arc<GraphState>>,
    batch_size: usize,
    persist_path: Option<PathBuf>,
) {
    let mut latest_seq: HashMap<String, u64> = HashMap::new();

    loop {
        let first = tokio::select! {
            biased;
            Some(command) = interactive_rx.recv() => command,
            Some(command) = bulk_rx.recv() => command,
            else => break,
        };

        let mut batch = vec![first];
        while batch.len() < batch_size {
            // Interactive lane first, then backfill from the bulk lane.
            if let Ok(command) = interactive_rx.try_recv() {
                batch.push(command);
            } else if let Ok(command) = bulk_rx.try_recv() {
                batch.push(command);
            } else {
                break;
            }
        }

        for command in batch {
            apply_command(&mut state, &mut latest_seq, command);
        }

        let snapshot = Arc::new(state.clone());
        let _ = snapshot_tx.send(Arc::clone(&snapshot));

        if let Some(path) = &persist_path {
            let path = path.clone();
            // Snapshot persistence is a background side effect; it must
            // never block the interactive write path.
            tokio::task::spawn_blocking(move || {
                if let Err(err) = snapshot.save(&path) {
                    log::warn!("Failed to persist graph snapshot: {err}");
                }
            });
        }
    }
}

fn apply_command(
    state: &mut GraphState,
    latest_seq: &mut HashMap<String, u64>,
    command: WriteCommand,
) {
    match command {
        WriteCommand::Apply {
            file,
            unit,
            seq,
            done,
        } => {
            if is_stale(latest_seq, &file, seq) {
                log::debug!("Discarding stale parse of {file} (seq {seq})");
                let _ = done.send(Ok(state.revision()));
                return;
            }
            latest_seq.insert(file.clone(), seq);
            let result = state
                .apply_delta(&file, unit.nodes, unit.edges)
                .map_err(IngestError::Graph);
            let _ = done.send(result);
        }
        WriteCommand::MarkUnparsable {
            file,
            error_spans,
            seq,
            done,
        } => {
            if is_stale(latest_seq, &file, seq) {
                let _ = done.send(Ok(state.revision()));
                return;
            }
            latest_seq.insert(file.clone(), seq);
            let revision = state.mark_unparsable(&file, error_spans);
            let _ = done.send(Ok(revision));
        }
        WriteCommand::Remove { file, seq, done } => {
            if is_stale(latest_seq, &file, seq) {
                let _ = done.send(Ok(state.revision()));
                return;
            }
            latest_seq.insert(file.clone(), seq);
            let revision = state.remove_file(&file);
            let _ = done.send(Ok(revision));
        }
    }
}

/// A unit is stale when a newer event for the same path was already
/// committed; its in-flight result is discarded, not applied.
fn is_stale(latest_seq: &HashMap<String, u64>, file: &str, seq: u64) -> bool {
    latest_seq
        .get(file)
        .is_some_and(|&known| seq < known)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_sequence_numbers_are_detected() {
        let mut latest = HashMap::new();
        latest.insert("app.py".to_string(), 5u64);
        assert!(is_stale(&latest, "app.py", 4));
        assert!(!is_stale(&latest, "app.py", 5));
        assert!(!is_stale(&latest, "app.py", 6));
        assert!(!is_stale(&latest, "other.py", 1));
    }
}
