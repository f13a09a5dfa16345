use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use bankstream_banking::{CurrencyPair, ValidityWindow};
use bankstream_core::LedgerResult;

use crate::services::RateFeed;
use crate::store::RateStore;

/// Config for the synthetic rate producer.
#[derive(Debug, Clone)]
pub struct RateProducer {
    pub pair: CurrencyPair,
    pub interval: Duration,
    pub base: f64,
    pub spread: u32,
}

impl RateProducer {
    pub fn new(pair: CurrencyPair) -> Self {
        Self {
            pair,
            interval: Duration::from_secs(5),
            base: 2000.0,
            spread: 300,
        }
    }

    fn window_step(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX).max(1))
    }

    /// `base + uniform[0, spread)`.
    pub fn next_rate(&self) -> f64 {
        if self.spread == 0 {
            return self.base;
        }
        self.base + f64::from(rand::thread_rng().gen_range(0..self.spread))
    }

    /// Record the window that covers `now` and the one after it.
    ///
    /// Returns the last window recorded; pass it to [`Self::produce_after`].
    pub async fn seed<S: RateStore>(&self, feed: &RateFeed<S>, now: DateTime<Utc>) -> LedgerResult<ValidityWindow> {
        let current = ValidityWindow::current(now, self.window_step());
        feed.record(self.pair.clone(), self.next_rate(), current).await?;
        self.produce_after(feed, current, now).await
    }

    /// Record every window after `last` up to the one following `now`.
    ///
    /// Windows are contiguous. If `last` already ended before `now` (a stalled
    /// producer), recording restarts at the window covering `now`.
    pub async fn produce_after<S: RateStore>(
        &self,
        feed: &RateFeed<S>,
        last: ValidityWindow,
        now: DateTime<Utc>,
    ) -> LedgerResult<ValidityWindow> {
        let step = self.window_step();
        let horizon = ValidityWindow::next_aligned(now, step);

        let mut window = last.following(step);
        if window.valid_to < now {
            window = ValidityWindow::current(now, step);
        }

        let mut recorded = last;
        while window.valid_from <= horizon.valid_from {
            feed.record(self.pair.clone(), self.next_rate(), window).await?;
            recorded = window;
            window = window.following(step);
        }
        Ok(recorded)
    }

    /// Seed the current and next windows, then spawn the producer as a tokio task.
    ///
    /// - the seed is awaited, so lookups succeed as soon as this returns
    /// - each tick extends the recorded windows one interval past now
    /// - failures are logged and never stop the loop
    pub async fn start<S>(&self, feed: RateFeed<S>) -> RateProducerHandle
    where
        S: RateStore + 'static,
    {
        let last = match self.seed(&feed, Utc::now()).await {
            Ok(window) => Some(window),
            Err(err) => {
                warn!(pair = %self.pair, error = %err, "failed to seed rate windows");
                None
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let cfg = self.clone();
        let join = tokio::spawn(producer_loop(cfg, feed, last, shutdown_rx));

        RateProducerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

/// Handle for the running producer task.
#[derive(Debug)]
pub struct RateProducerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl RateProducerHandle {
    /// Stop the producer and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "rate producer task ended abnormally");
            }
        }
    }
}

impl Drop for RateProducerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn producer_loop<S>(
    cfg: RateProducer,
    feed: RateFeed<S>,
    mut last: Option<ValidityWindow>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    S: RateStore,
{
    info!(pair = %cfg.pair, interval_ms = cfg.interval.as_millis() as u64, "rate producer started");

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the seed already covered it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                let produced = match last {
                    Some(window) => cfg.produce_after(&feed, window, now).await,
                    None => cfg.seed(&feed, now).await,
                };
                match produced {
                    Ok(window) => last = Some(window),
                    Err(err) => warn!(pair = %cfg.pair, error = %err, "failed to record synthetic rate"),
                }
            }
        }
    }

    info!(pair = %cfg.pair, "rate producer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn producer() -> RateProducer {
        RateProducer::new(CurrencyPair::new("USD", "IDR").unwrap())
    }

    #[test]
    fn synthetic_rate_stays_in_band() {
        let p = producer();
        for _ in 0..200 {
            let r = p.next_rate();
            assert!((2000.0..2300.0).contains(&r), "rate {r} out of band");
        }
    }

    #[test]
    fn zero_spread_is_constant() {
        let mut p = producer();
        p.spread = 0;
        assert_eq!(p.next_rate(), 2000.0);
    }

    fn at(secs: i64, ms: u32) -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.timestamp_opt(secs, ms * 1_000_000).unwrap()
    }

    async fn assert_covered<S: RateStore>(feed: &RateFeed<S>, from: DateTime<Utc>, secs: i64) {
        for offset in 0..=secs {
            let t = from + chrono::Duration::seconds(offset);
            assert!(
                feed.lookup_rate("USD", "IDR", t).await.is_ok(),
                "no rate at {offset}s past {from}"
            );
        }
    }

    #[tokio::test]
    async fn seed_covers_current_and_next_window() {
        let feed = RateFeed::new(Arc::new(InMemoryLedgerStore::new()));
        let p = producer();
        let t0 = at(1_700_000_032, 300);

        let last = p.seed(&feed, t0).await.unwrap();
        assert_eq!(last, ValidityWindow::next_aligned(t0, p.window_step()));
        // [..:30, ..:39.999]
        assert_covered(&feed, t0, 7).await;
    }

    #[tokio::test]
    async fn ticks_keep_windows_contiguous() {
        let feed = RateFeed::new(Arc::new(InMemoryLedgerStore::new()));
        let p = producer();
        let t0 = at(1_700_000_032, 300);

        let mut last = p.seed(&feed, t0).await.unwrap();
        for tick in 1..=3 {
            let now = t0 + chrono::Duration::seconds(5 * tick);
            let recorded = p.produce_after(&feed, last, now).await.unwrap();
            assert_eq!(recorded.valid_from, last.valid_to + chrono::Duration::milliseconds(1));
            assert!(recorded.valid_from > now);
            last = recorded;
        }

        assert_covered(&feed, t0, 22).await;
    }

    #[tokio::test]
    async fn late_tick_fills_every_missing_window() {
        let feed = RateFeed::new(Arc::new(InMemoryLedgerStore::new()));
        let p = producer();
        let t0 = at(1_700_000_032, 300);

        let last = p.seed(&feed, t0).await.unwrap();
        // The tick fires just after the seeded windows run out.
        let late = last.valid_to + chrono::Duration::milliseconds(500);
        let recorded = p.produce_after(&feed, last, late).await.unwrap();

        assert_eq!(recorded, ValidityWindow::next_aligned(late, p.window_step()));
        assert_covered(&feed, t0, 12).await;
    }

    #[tokio::test]
    async fn stalled_producer_restarts_at_current_window() {
        let feed = RateFeed::new(Arc::new(InMemoryLedgerStore::new()));
        let p = producer();
        let t0 = at(1_700_000_032, 300);

        let last = p.seed(&feed, t0).await.unwrap();
        let much_later = t0 + chrono::Duration::hours(1);
        p.produce_after(&feed, last, much_later).await.unwrap();

        assert_covered(&feed, much_later, 2).await;
    }

    #[tokio::test]
    async fn started_producer_is_seeded_and_shuts_down() {
        let feed = RateFeed::new(Arc::new(InMemoryLedgerStore::new()));
        let p = producer();

        let handle = p.start(feed.clone()).await;
        let started = Utc::now();
        handle.shutdown().await;

        // Two windows are seeded, so the next few seconds are covered whatever the phase.
        assert_covered(&feed, started, 4).await;
    }
}
