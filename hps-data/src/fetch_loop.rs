//! The checkpointed fetch procedure shared by every indicator.
//!
//! Locations are processed strictly in order, one at a time. Each one
//! yields exactly one record: a checkpointed value, a fetched value, or a
//! missing value after the retry also failed. Only a failed credential
//! refresh stops the run, and the checkpoint is flushed before it does.

use crate::{
    checkpoint::{CheckpointStore, ResultBuffer},
    error::{DataError, Result},
};
use hps_sites::{
    fetcher::{Authenticator, Credentials, FetchFailure, IndicatorFetcher},
    indicator::IndicatorRecord,
    location::LocationRecord,
};
use log::{debug, info, warn};
use std::{path::Path, time::Duration};

/// Log progress every this many locations.
const PROGRESS_EVERY: usize = 100;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub total: usize,
    pub from_checkpoint: usize,
    pub fetched: usize,
    pub failed: usize,
    pub refreshes: usize,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub records: Vec<IndicatorRecord>,
    pub summary: FetchSummary,
}

impl FetchReport {
    /// Records holding a value, whether fetched or taken from the checkpoint.
    pub fn with_value(&self) -> usize {
        self.records.iter().filter(|r| r.value.is_some()).count()
    }
}

/// Drives one [`IndicatorFetcher`] over a location set with checkpointing,
/// retry-once and credential refresh.
pub struct FetchLoop<F, A> {
    fetcher: F,
    authenticator: A,
    credentials: Credentials,
    store: CheckpointStore,
    request_pause: Duration,
}

impl<F: IndicatorFetcher, A: Authenticator> FetchLoop<F, A> {
    pub fn new(fetcher: F, authenticator: A, credentials: Credentials, store: CheckpointStore) -> Self {
        FetchLoop {
            fetcher,
            authenticator,
            credentials,
            store,
            request_pause: Duration::ZERO,
        }
    }

    /// Pause after every fetched (not checkpointed) location.
    pub fn with_request_pause(mut self, pause: Duration) -> Self {
        self.request_pause = pause;
        self
    }

    /// The credentials currently in use.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Process every location and write the result table to `result_path`.
    pub async fn run(
        &mut self,
        locations: &[LocationRecord],
        result_path: &Path,
    ) -> Result<FetchReport> {
        let indicator = self.fetcher.indicator();
        let table = self.store.load()?;
        let mut buffer = ResultBuffer::with_capacity(locations.len());
        let mut summary = FetchSummary {
            total: locations.len(),
            ..FetchSummary::default()
        };
        info!("Fetching {} for {} locations", indicator, locations.len());

        for (i, location) in locations.iter().enumerate() {
            let value = match self.store.lookup(&table, location.latitude, location.longitude) {
                Some(stored) => {
                    debug!("Checkpoint hit for {} {}", location.display_name(), location.key());
                    summary.from_checkpoint += 1;
                    stored.value
                }
                None => {
                    let value = match self.fetch_value(location, &mut summary).await {
                        Ok(value) => value,
                        Err(e) => {
                            self.store.flush(&buffer, &table)?;
                            warn!(
                                "Aborting {} run after {} of {} locations; checkpoint saved",
                                indicator,
                                buffer.len(),
                                locations.len()
                            );
                            return Err(e);
                        }
                    };
                    summary.fetched += 1;
                    if value.is_none() {
                        summary.failed += 1;
                    }
                    if !self.request_pause.is_zero() {
                        tokio::time::sleep(self.request_pause).await;
                    }
                    value
                }
            };

            let record = IndicatorRecord::from_location(location, value);
            if self.store.append_and_maybe_flush(&mut buffer, record, &table)? {
                debug!("Checkpoint saved after {} locations", buffer.len());
            }
            if (i + 1) % PROGRESS_EVERY == 0 {
                info!("{}: {}/{} locations processed", indicator, i + 1, locations.len());
            }
        }

        self.store.finalize(&buffer, &table, result_path)?;
        info!(
            "{} done: {} locations, {} from checkpoint, {} fetched, {} failed, {} credential refreshes",
            indicator,
            summary.total,
            summary.from_checkpoint,
            summary.fetched,
            summary.failed,
            summary.refreshes
        );
        Ok(FetchReport {
            records: buffer.into_records(),
            summary,
        })
    }

    /// Fetch one value. A failure is retried once; an expired token is
    /// refreshed once and the call repeated. `Ok(None)` when every attempt
    /// failed, `Err` only when the refresh itself failed.
    async fn fetch_value(
        &mut self,
        location: &LocationRecord,
        summary: &mut FetchSummary,
    ) -> Result<Option<f64>> {
        let mut refreshed = false;
        let mut retried = false;
        loop {
            match self.fetcher.fetch(location, &self.credentials).await {
                Ok(value) => return Ok(Some(value)),
                Err(FetchFailure::AuthExpired) if !refreshed => {
                    info!("Access token expired, refreshing");
                    self.credentials = self
                        .authenticator
                        .refresh(&self.credentials)
                        .await
                        .map_err(DataError::CredentialRefresh)?;
                    summary.refreshes += 1;
                    refreshed = true;
                }
                Err(failure) if !retried => {
                    warn!(
                        "Fetch failed for {} {}: {}; retrying",
                        location.display_name(),
                        location.key(),
                        failure
                    );
                    retried = true;
                }
                Err(failure) => {
                    warn!(
                        "Giving up on {} {}: {}",
                        location.display_name(),
                        location.key(),
                        failure
                    );
                    return Ok(None);
                }
            }
        }
    }
}
