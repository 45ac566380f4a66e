use crate::{DetailParser, ListingParser, PageFetcher, RawDocument, SearchQuery};
use futures::stream::{self, StreamExt};
use rand::Rng;
use staywatch_core::{
    assemble, CanonicalRecord, EnrichmentRecord, FetchError, RecordSink, Result, RunParams,
    StaywatchError, SummaryRecord,
};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_COUNTRY_TOKEN: &str = "España";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: Url,
    /// Upper bound on a single fetch, on top of whatever the fetcher enforces.
    pub fetch_timeout: Duration,
    /// Detail pages in flight at once.
    pub concurrency: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub country_token: String,
}

impl SessionConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            fetch_timeout: Duration::from_secs(30),
            concurrency: 1,
            min_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(5000),
            country_token: DEFAULT_COUNTRY_TOKEN.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(StaywatchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(StaywatchError::Config(format!(
                "min delay {:?} exceeds max delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(StaywatchError::Config(
                "fetch timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Random pause taken before every request.
    pub fn politeness_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if max <= min {
            return self.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    FetchingListing,
    ParsingListing,
    FetchingDetail,
    ParsingDetail,
    Assembling,
    WritingOutput,
    Done,
    Failed,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, FetchingListing)
                | (FetchingListing, ParsingListing)
                | (FetchingListing, Failed)
                | (ParsingListing, FetchingDetail)
                | (ParsingListing, Assembling)
                | (FetchingDetail, ParsingDetail)
                | (FetchingDetail, Assembling)
                | (ParsingDetail, Assembling)
                | (Assembling, FetchingDetail)
                | (Assembling, Assembling)
                | (Assembling, WritingOutput)
                | (WritingOutput, Done)
                | (WritingOutput, Failed)
                | (Done, Idle)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::FetchingListing => "fetching-listing",
            RunState::ParsingListing => "parsing-listing",
            RunState::FetchingDetail => "fetching-detail",
            RunState::ParsingDetail => "parsing-detail",
            RunState::Assembling => "assembling",
            RunState::WritingOutput => "writing-output",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records every state a run passes through. Detail items complete
/// concurrently; their steps are recorded in completion order.
#[derive(Debug, Clone)]
pub struct RunTracker {
    state: RunState,
    history: Vec<RunState>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }
}

impl RunTracker {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn advance(&mut self, next: RunState) {
        if !self.state.can_advance_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected run state transition");
        }
        debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub cards: usize,
    pub details_fetched: usize,
    pub details_failed: usize,
    /// Cards without a usable link; emitted partial without a detail fetch.
    pub unidentified: usize,
    /// Cards dropped because the run was cancelled before their detail completed.
    pub abandoned: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn emitted(&self) -> usize {
        self.cards - self.abandoned
    }
}

/// Result of the extraction stages, before anything is written.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub params: RunParams,
    /// In listing order.
    pub records: Vec<CanonicalRecord>,
    pub report: RunReport,
    pub tracker: RunTracker,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `None` when a cancelled run had nothing to write.
    pub path: Option<PathBuf>,
    pub records: usize,
    pub report: RunReport,
    pub final_state: RunState,
}

/// Cards sharing one detail URL are fetched once.
struct DetailGroup {
    url: Url,
    cards: Vec<usize>,
}

fn group_by_detail_url(summaries: &[SummaryRecord]) -> Vec<DetailGroup> {
    let mut groups: Vec<DetailGroup> = Vec::new();
    let mut index: HashMap<&Url, usize> = HashMap::new();
    for (position, summary) in summaries.iter().enumerate() {
        let Some(url) = summary.detail_key() else {
            continue;
        };
        match index.get(url) {
            Some(&group) => groups[group].cards.push(position),
            None => {
                index.insert(url, groups.len());
                groups.push(DetailGroup {
                    url: url.clone(),
                    cards: vec![position],
                });
            }
        }
    }
    groups
}

/// Drives one listing page and its detail pages through to assembled records.
pub struct ExtractionSession {
    fetcher: Arc<dyn PageFetcher>,
    listing: ListingParser,
    detail: DetailParser,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl ExtractionSession {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            listing: ListingParser::new(config.base_url.clone())?,
            detail: DetailParser::new(config.country_token.clone())?,
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn fetch(&self, url: &Url) -> std::result::Result<RawDocument, FetchError> {
        let pause = self.config.politeness_delay();
        if !pause.is_zero() {
            debug!(url = %url, "Waiting {:?} before request", pause);
            tokio::time::sleep(pause).await;
        }

        match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
        }
    }

    /// Fetches and parses the listing, enriches every identified card from its
    /// detail page and assembles the records in listing order.
    ///
    /// Only a failed listing fetch fails the run. A failed detail fetch yields
    /// a partial record for that card. Cancellation stops at the next completed
    /// detail item and returns what was assembled so far.
    pub async fn run_once(&self, params: &RunParams) -> Result<RunOutput> {
        let mut tracker = RunTracker::default();
        let mut report = RunReport::default();

        tracker.advance(RunState::FetchingListing);
        let listing_url = SearchQuery::new(params.clone()).to_url(&self.config.base_url)?;
        info!("Fetching listing for {}", params);
        let listing = match self.fetch(&listing_url).await {
            Ok(document) => document,
            Err(e) => {
                tracker.advance(RunState::Failed);
                error!(url = %listing_url, error = %e, "Listing fetch failed");
                return Err(StaywatchError::ListingFetch(e));
            }
        };

        tracker.advance(RunState::ParsingListing);
        let summaries = self.listing.parse(&listing.body, params);
        report.cards = summaries.len();

        let groups = group_by_detail_url(&summaries);
        let mut pending: Vec<Option<SummaryRecord>> = summaries.into_iter().map(Some).collect();
        let mut slots: Vec<Option<CanonicalRecord>> = vec![None; pending.len()];

        let jobs = groups.iter().enumerate().map(|(group, detail)| async move {
            let result = self
                .fetch(&detail.url)
                .await
                .map(|document| self.detail.parse(detail.url.clone(), &document.body));
            (group, result)
        });
        let mut completed = stream::iter(jobs).buffer_unordered(self.config.concurrency);

        if !groups.is_empty() {
            tracker.advance(RunState::FetchingDetail);
        }
        let mut remaining = groups.len();
        while remaining > 0 {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Run cancelled with {} detail pages outstanding", remaining);
                    report.cancelled = true;
                    break;
                }
                next = completed.next() => next,
            };
            let Some((group, result)) = next else {
                break;
            };
            remaining -= 1;

            let enrichment: Option<EnrichmentRecord> = match result {
                Ok(record) => {
                    tracker.advance(RunState::ParsingDetail);
                    report.details_fetched += 1;
                    Some(record)
                }
                Err(e) => {
                    warn!(url = %e.url(), error = %e, "Detail fetch failed, emitting partial record");
                    report.details_failed += 1;
                    None
                }
            };

            tracker.advance(RunState::Assembling);
            for &position in &groups[group].cards {
                if let Some(summary) = pending[position].take() {
                    slots[position] = Some(assemble(&params.region, summary, enrichment.clone()));
                }
            }
            if remaining > 0 {
                tracker.advance(RunState::FetchingDetail);
            }
        }
        drop(completed);

        if tracker.state() != RunState::Assembling {
            tracker.advance(RunState::Assembling);
        }
        for (position, summary) in pending.iter_mut().enumerate() {
            let Some(summary) = summary.take() else {
                continue;
            };
            if summary.detail_key().is_none() {
                report.unidentified += 1;
                slots[position] = Some(assemble(&params.region, summary, None));
            } else {
                report.abandoned += 1;
            }
        }

        let records: Vec<CanonicalRecord> = slots.into_iter().flatten().collect();
        info!(
            "Assembled {} records for {} ({} details fetched, {} failed, {} unidentified, {} abandoned)",
            records.len(),
            params,
            report.details_fetched,
            report.details_failed,
            report.unidentified,
            report.abandoned
        );

        Ok(RunOutput {
            params: params.clone(),
            records,
            report,
            tracker,
        })
    }

    /// Runs once and hands the records to `sink`. A cancelled run that
    /// assembled nothing writes nothing.
    pub async fn run_and_write(
        &self,
        params: &RunParams,
        sink: &dyn RecordSink,
    ) -> Result<RunOutcome> {
        let RunOutput {
            records,
            report,
            mut tracker,
            ..
        } = self.run_once(params).await?;

        tracker.advance(RunState::WritingOutput);
        if report.cancelled && records.is_empty() {
            tracker.advance(RunState::Done);
            info!("Nothing to write for cancelled run {}", params);
            return Ok(RunOutcome {
                path: None,
                records: 0,
                report,
                final_state: tracker.state(),
            });
        }

        match sink.write(params, &records) {
            Ok(path) => {
                tracker.advance(RunState::Done);
                info!("Wrote {} records to {}", records.len(), path.display());
                Ok(RunOutcome {
                    path: Some(path),
                    records: records.len(),
                    report,
                    final_state: tracker.state(),
                })
            }
            Err(e) => {
                tracker.advance(RunState::Failed);
                error!(error = %e, "Failed to write records for {}", params);
                Err(e)
            }
        }
    }
}
