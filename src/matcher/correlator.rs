//! Bounded fan-out of package queries and fan-in of their outcomes.
//!
//! A batch moves through `dispatching -> draining -> done`. A fixed pool of
//! at most `concurrency` worker tasks pulls records off a shared cursor, so
//! no more than that many queries are ever outstanding. Workers hand every
//! outcome, tagged with its record, to a single consumer which owns the
//! result map. One record's failure never fails the batch.

use super::client::PackageQuery;
use crate::error::{CorrelateError, QueryError, QueryFailure};
use crate::model::{BatchResult, PackageRecord, VulnerabilityEntry};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Maximum number of queries in flight when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

struct Outcome {
    record: Arc<PackageRecord>,
    result: Result<Vec<VulnerabilityEntry>, QueryError>,
}

/// Consumer-side state of one batch.
struct Tally {
    results: BatchResult,
    settled: HashSet<String>,
    failed: usize,
}

impl Tally {
    fn with_capacity(total: usize) -> Self {
        Self {
            results: BatchResult::with_capacity(total),
            settled: HashSet::with_capacity(total),
            failed: 0,
        }
    }
}

/// Correlates a batch of records with their vulnerabilities.
pub struct Correlator<Q> {
    query: Arc<Q>,
    concurrency: usize,
    failures: Option<mpsc::UnboundedSender<QueryFailure>>,
}

impl<Q: PackageQuery> Correlator<Q> {
    pub fn new(query: Q) -> Self {
        Self {
            query: Arc::new(query),
            concurrency: DEFAULT_CONCURRENCY,
            failures: None,
        }
    }

    /// Caps the number of simultaneous queries. Values below one are raised
    /// to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Registers a sink that receives every per-record failure.
    ///
    /// Sending never blocks; a dropped receiver is ignored.
    pub fn with_failure_sink(mut self, sink: mpsc::UnboundedSender<QueryFailure>) -> Self {
        self.failures = Some(sink);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Queries every record and waits for all of them.
    pub async fn correlate(
        &self,
        records: &[Arc<PackageRecord>],
    ) -> Result<BatchResult, CorrelateError> {
        self.run(records, &CancellationToken::new(), None).await
    }

    /// Like [`correlate`](Self::correlate), but stops early when `cancel`
    /// fires and returns whatever had completed by then.
    pub async fn correlate_until(
        &self,
        records: &[Arc<PackageRecord>],
        cancel: &CancellationToken,
    ) -> Result<BatchResult, CorrelateError> {
        self.run(records, cancel, None).await
    }

    /// Like [`correlate`](Self::correlate), but gives up on outstanding
    /// queries once `deadline` has elapsed.
    pub async fn correlate_within(
        &self,
        records: &[Arc<PackageRecord>],
        deadline: Duration,
    ) -> Result<BatchResult, CorrelateError> {
        self.run(records, &CancellationToken::new(), Some(Instant::now() + deadline))
            .await
    }

    #[instrument(skip_all, fields(records = records.len(), concurrency = self.concurrency))]
    async fn run(
        &self,
        records: &[Arc<PackageRecord>],
        parent: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<BatchResult, CorrelateError> {
        if records.is_empty() {
            return Ok(BatchResult::new());
        }
        ensure_unique(records)?;

        // Child token: stopping this batch must not cancel the caller's token.
        let cancel = parent.child_token();
        let total = records.len();

        debug!("dispatching");
        let (mut workers, mut outcomes) = self.dispatch(records, &cancel);

        debug!("draining");
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut tally = Tally::with_capacity(total);
        let mut stopped = false;

        while tally.settled.len() < total {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stopped = true;
                    break;
                }
                _ = &mut expired => {
                    debug!("batch deadline expired");
                    stopped = true;
                    break;
                }
                outcome = outcomes.recv() => outcome,
            };
            match outcome {
                Some(outcome) => self.fold(&mut tally, outcome),
                None => break,
            }
        }

        cancel.cancel();
        workers.abort_all();

        // outcomes already handed off still count as completed
        while let Ok(outcome) = outcomes.try_recv() {
            self.fold(&mut tally, outcome);
        }

        let Tally {
            results,
            settled,
            mut failed,
        } = tally;

        let unsettled: Vec<_> = records
            .iter()
            .filter(|r| !settled.contains(&r.id))
            .collect();
        if !unsettled.is_empty() {
            if stopped {
                debug!(abandoned = unsettled.len(), "batch stopped early");
            } else {
                error!(abandoned = unsettled.len(), "workers exited without reporting");
            }
            failed += unsettled.len();
            for record in unsettled {
                self.report(QueryFailure {
                    record: Arc::clone(record),
                    error: QueryError::Canceled,
                });
            }
        }

        info!(
            queried = total,
            matched = results.values().filter(|v| !v.is_empty()).count(),
            failed,
            "done"
        );
        Ok(results)
    }

    fn dispatch(
        &self,
        records: &[Arc<PackageRecord>],
        cancel: &CancellationToken,
    ) -> (JoinSet<()>, mpsc::Receiver<Outcome>) {
        let batch: Arc<[Arc<PackageRecord>]> = records.iter().cloned().collect();
        let cursor = Arc::new(AtomicUsize::new(0));
        // one slot per record, so a worker never waits on the consumer
        let (tx, rx) = mpsc::channel(batch.len());

        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency.min(batch.len()) {
            let query = Arc::clone(&self.query);
            let batch = Arc::clone(&batch);
            let cursor = Arc::clone(&cursor);
            let cancel = cancel.clone();
            let tx = tx.clone();

            workers.spawn(async move {
                while let Some(record) = batch.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                    let record = Arc::clone(record);
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        result = query.query(&record) => result,
                    };
                    if tx.send(Outcome { record, result }).await.is_err() {
                        break;
                    }
                }
            });
        }

        (workers, rx)
    }

    fn fold(&self, tally: &mut Tally, Outcome { record, result }: Outcome) {
        tally.settled.insert(record.id.clone());

        match result {
            Ok(entries) => {
                debug!(record = %record.id, vulnerabilities = entries.len(), "correlated");
                tally.results.insert(record.id.clone(), entries);
            }
            Err(error) => {
                tally.failed += 1;
                warn!(record = %record.id, package = %record, %error, "query failed");
                self.report(QueryFailure { record, error });
            }
        }
    }

    fn report(&self, failure: QueryFailure) {
        if let Some(sink) = &self.failures {
            let _ = sink.send(failure);
        }
    }
}

fn ensure_unique(records: &[Arc<PackageRecord>]) -> Result<(), CorrelateError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(CorrelateError::DuplicateId(record.id.clone()));
        }
    }
    Ok(())
}
