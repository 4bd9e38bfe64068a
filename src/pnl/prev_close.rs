//! Holiday-aware previous trading close resolution
//!
//! Walks backward one calendar day at a time asking the broker for a
//! single-day bar. Weekends and exchange holidays need no calendar: an empty
//! result just means no trading happened and the scan continues.

use crate::client::BrokerApi;
use crate::error::{DashError, Result};
use crate::types::{DayCandle, Instrument, PrevClose};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves the most recent trading day's close before an as-of date.
///
/// Results are memoized per instrument for the lifetime of the resolver,
/// i.e. one rendering pass. Build a fresh resolver for a fresh snapshot.
pub struct PrevCloseResolver<'a> {
    api: &'a dyn BrokerApi,
    lookback_days: u32,
    retry_delay: Duration,
    cache: HashMap<String, Option<PrevClose>>,
}

impl<'a> PrevCloseResolver<'a> {
    pub fn new(api: &'a dyn BrokerApi, lookback_days: u32) -> Self {
        Self {
            api,
            lookback_days,
            retry_delay: Duration::from_millis(500),
            cache: HashMap::new(),
        }
    }

    /// Pause before the single same-day retry
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Most recent trading close strictly before `as_of`, or `None` once the
    /// lookback window is exhausted.
    pub async fn resolve(
        &mut self,
        instrument: &Instrument,
        as_of: NaiveDate,
    ) -> Result<Option<PrevClose>> {
        let key = instrument.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            return Ok(*hit);
        }
        let resolved = self.scan(instrument, as_of).await?;
        self.cache.insert(key, resolved);
        Ok(resolved)
    }

    async fn scan(&self, instrument: &Instrument, as_of: NaiveDate) -> Result<Option<PrevClose>> {
        for days_ago in 1..=i64::from(self.lookback_days) {
            let date = as_of - chrono::Duration::days(days_ago);
            match self.fetch_day(instrument, date).await? {
                Some(candle) => {
                    debug!(%instrument, %date, close = %candle.close, "previous close resolved");
                    return Ok(Some(PrevClose {
                        close: candle.close,
                        date,
                    }));
                }
                None => continue,
            }
        }
        warn!(
            %instrument,
            lookback = self.lookback_days,
            "no trading day found in lookback window"
        );
        Ok(None)
    }

    /// One history call with a single bounded same-day retry on transient
    /// failure; a second failure skips the day rather than aborting the scan.
    async fn fetch_day(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
    ) -> Result<Option<DayCandle>> {
        match self.api.history(instrument, date).await {
            Ok(candle) => Ok(candle),
            Err(e) if e.is_transient() => {
                debug!(%instrument, %date, error = %e, "history call failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                match self.api.history(instrument, date).await {
                    Ok(candle) => Ok(candle),
                    Err(e) if e.is_transient() => {
                        warn!(%instrument, %date, error = %e, "history retry failed, skipping day");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}
