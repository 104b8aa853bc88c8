//! Check cycles: fetch each distinct price once, evaluate every rule on it,
//! and hand triggered alerts to the notifier.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::PriceSource;
use crate::models::{AlertEvent, AlertState, QueryKey};
use crate::services::alert_service::{evaluate, Evaluation};
use crate::services::cache_service::PriceCache;
use crate::services::notify_service::Notifier;
use crate::utils::{FetchError, NotifyError};

/// What happened during one check cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Keys looked up this cycle
    pub checked: usize,
    /// Events delivered to the notifier
    pub delivered: Vec<AlertEvent>,
    /// Keys answered from an entry older than max age
    pub stale: Vec<QueryKey>,
    /// Keys with no price at all; their rules were skipped
    pub fetch_failures: Vec<(QueryKey, FetchError)>,
    /// Events the notifier failed to deliver; their rules were rolled back
    pub notify_failures: Vec<(AlertEvent, NotifyError)>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.fetch_failures.is_empty() && self.notify_failures.is_empty()
    }
}

/// Run one check cycle over all rule states at `now`.
///
/// A failed delivery restores the rule's previous state, so the alert fires
/// again on the next cycle if the condition still holds.
pub async fn run_cycle<S: PriceSource>(
    cache: &mut PriceCache<S>,
    states: &mut [AlertState],
    notifier: &dyn Notifier,
    max_age: Duration,
    now: DateTime<Utc>,
) -> CycleReport {
    let mut report = CycleReport::default();

    // Group by key => only 1 price lookup per key per cycle
    let mut by_key: BTreeMap<QueryKey, Vec<usize>> = BTreeMap::new();
    for (index, state) in states.iter().enumerate() {
        by_key.entry(state.rule.query_key()).or_default().push(index);
    }

    for (key, indices) in by_key {
        report.checked += 1;

        let cached = match cache.get(&key, max_age, now).await {
            Ok(cached) => cached,
            Err(e) => {
                error!("No price for {}, skipping {} rule(s): {}", key, indices.len(), e);
                report.fetch_failures.push((key, e));
                continue;
            }
        };

        if cached.is_stale() {
            report.stale.push(key.clone());
        }
        debug!("{} = {} ({:?})", key, cached.price(), cached.freshness);

        for index in indices {
            let state = &mut states[index];
            let previous = state.clone();

            let outcome = evaluate(state, cached.price(), now);
            if outcome == Evaluation::Rearmed {
                info!("Alert re-armed: {}", state.rule);
            }
            if !outcome.should_notify() {
                continue;
            }

            let event = AlertEvent {
                id: Uuid::new_v4(),
                rule: state.rule.clone(),
                price: cached.entry.value.clone(),
                triggered_at: now,
            };
            info!("Alert triggered: {} at {}", event.rule, cached.price());

            match notifier.send(&event).await {
                Ok(()) => report.delivered.push(event),
                Err(e) => {
                    warn!("Failed to deliver alert {}: {}", event.id, e);
                    *state = previous;
                    report.notify_failures.push((event, e));
                }
            }
        }
    }

    report
}

/// Options for the periodic monitor loop
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub max_age: Duration,
    /// Run a single cycle and return
    pub once: bool,
}

/// Drive check cycles until Ctrl-C (or after one cycle with `once`).
///
/// Cycles never overlap: the next tick is awaited only after the previous
/// cycle has finished.
pub async fn run_monitor<S: PriceSource>(
    cache: &mut PriceCache<S>,
    states: &mut [AlertState],
    notifier: &dyn Notifier,
    options: &MonitorOptions,
) -> CycleReport {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_monitor_until(cache, states, notifier, options, shutdown).await
}

/// Drive check cycles until `shutdown` resolves.
///
/// `shutdown` lives across cycles, so a request made while a cycle is
/// running stops the loop as soon as that cycle finishes. Returns the report
/// of the last completed cycle.
pub async fn run_monitor_until<S, F>(
    cache: &mut PriceCache<S>,
    states: &mut [AlertState],
    notifier: &dyn Notifier,
    options: &MonitorOptions,
    shutdown: F,
) -> CycleReport
where
    S: PriceSource,
    F: Future<Output = ()>,
{
    let mut interval = time::interval(options.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut last = CycleReport::default();
    loop {
        tokio::select! {
            // Polled first so the signal handler is registered before any cycle runs
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping monitor");
                return last;
            }
            _ = interval.tick() => {
                last = run_cycle(cache, states, notifier, options.max_age, Utc::now()).await;
                log_report(&last);
                if options.once {
                    return last;
                }
            }
        }
    }
}

fn log_report(report: &CycleReport) {
    let summary = format!(
        "Cycle done: {} key(s), {} alert(s) sent, {} stale, {} fetch failure(s), {} delivery failure(s)",
        report.checked,
        report.delivered.len(),
        report.stale.len(),
        report.fetch_failures.len(),
        report.notify_failures.len()
    );
    if report.is_clean() {
        info!("{}", summary);
    } else {
        warn!("{}", summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::coingecko::ApiError;
    use crate::models::{AlertRule, Direction, PriceData};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Price source with a settable price per coin; unknown coins fail
    #[derive(Clone, Default)]
    struct FakeMarket {
        prices: Arc<Mutex<HashMap<String, f64>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeMarket {
        fn set(&self, coin: &str, price: f64) {
            self.prices.lock().unwrap().insert(coin.to_string(), price);
        }

        fn remove(&self, coin: &str) {
            self.prices.lock().unwrap().remove(coin);
        }
    }

    #[async_trait]
    impl PriceSource for FakeMarket {
        async fn fetch_price(&self, key: &QueryKey) -> Result<PriceData, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .lock()
                .unwrap()
                .get(&key.coin_id)
                .copied()
                .map(PriceData::from_price)
                .ok_or_else(|| FetchError::Api(ApiError::RequestError(format!("{} unreachable", key))))
        }
    }

    /// Notifier recording deliveries, optionally failing them
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<AlertEvent>>,
        failing: AtomicBool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, event: &AlertEvent) -> Result<(), NotifyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Transport("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn state(coin: &str, threshold: f64, direction: Direction) -> AlertState {
        AlertState::new(AlertRule {
            coin_id: coin.to_string(),
            currency: "usd".to_string(),
            threshold_price: threshold,
            direction,
        })
    }

    fn at(offset: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap()
    }

    const MAX_AGE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_rules_sharing_a_key_fetch_once() {
        let market = FakeMarket::default();
        market.set("bitcoin", 39_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![
            state("bitcoin", 40_000.0, Direction::Below),
            state("bitcoin", 30_000.0, Direction::Above),
            state("bitcoin", 35_000.0, Direction::Below),
        ];

        let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(0)).await;

        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.checked, 1);
        assert_eq!(report.delivered.len(), 2);
        assert!(states[0].currently_active);
        assert!(states[1].currently_active);
        assert!(!states[2].currently_active);
    }

    #[tokio::test]
    async fn test_price_sequence_across_cycles() {
        let market = FakeMarket::default();
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![state("bitcoin", 40_000.0, Direction::Below)];

        let prices = [42_000.0, 39_000.0, 38_000.0, 41_000.0, 37_000.0];
        let mut fired = Vec::new();
        for (i, &price) in prices.iter().enumerate() {
            market.set("bitcoin", price);
            // cycles further apart than max age so each one refreshes
            let now = at(i as i64 * 120);
            let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, now).await;
            if !report.delivered.is_empty() {
                fired.push(i);
            }
        }

        assert_eq!(fired, vec![1, 4]);
        assert_eq!(notifier.sent(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_only_that_coin() {
        let market = FakeMarket::default();
        market.set("ethereum", 2_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![
            state("bitcoin", 40_000.0, Direction::Below),
            state("ethereum", 2_500.0, Direction::Below),
        ];

        let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(0)).await;

        assert_eq!(report.fetch_failures.len(), 1);
        assert_eq!(report.fetch_failures[0].0, QueryKey::new("bitcoin", "usd"));
        assert_eq!(report.delivered.len(), 1);
        assert!(!states[0].currently_active);
        assert!(states[1].currently_active);
    }

    #[tokio::test]
    async fn test_stale_price_still_evaluates() {
        let market = FakeMarket::default();
        market.set("bitcoin", 41_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![state("bitcoin", 42_000.0, Direction::Below)];

        run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(0)).await;
        assert_eq!(notifier.sent(), 1);

        market.remove("bitcoin");
        let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(300)).await;

        assert_eq!(report.stale, vec![QueryKey::new("bitcoin", "usd")]);
        assert!(report.fetch_failures.is_empty());
        assert_eq!(notifier.sent(), 1);
        assert!(states[0].currently_active);
    }

    #[tokio::test]
    async fn test_delivery_failure_rolls_back_state() {
        let market = FakeMarket::default();
        market.set("bitcoin", 39_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        notifier.failing.store(true, Ordering::SeqCst);
        let mut states = vec![state("bitcoin", 40_000.0, Direction::Below)];

        let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(0)).await;
        assert_eq!(report.notify_failures.len(), 1);
        assert!(!states[0].currently_active);
        assert_eq!(states[0].last_triggered_at, None);

        notifier.failing.store(false, Ordering::SeqCst);
        let report = run_cycle(&mut cache, &mut states, &notifier, MAX_AGE, at(10)).await;
        assert_eq!(report.delivered.len(), 1);
        assert!(states[0].currently_active);
        assert_eq!(states[0].last_triggered_at, Some(at(10)));
    }

    #[tokio::test]
    async fn test_monitor_once_runs_single_cycle() {
        let market = FakeMarket::default();
        market.set("bitcoin", 39_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![state("bitcoin", 40_000.0, Direction::Below)];
        let options = MonitorOptions {
            interval: Duration::from_secs(3600),
            max_age: MAX_AGE,
            once: true,
        };

        let report = run_monitor(&mut cache, &mut states, &notifier, &options).await;

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_cycle_stops_after_it() {
        let market = FakeMarket::default();
        market.set("bitcoin", 39_000.0);
        let mut cache = PriceCache::in_memory(market.clone());
        let notifier = RecordingNotifier::default();
        let mut states = vec![state("bitcoin", 40_000.0, Direction::Below)];
        let options = MonitorOptions {
            interval: Duration::from_millis(100),
            max_age: Duration::ZERO,
            once: false,
        };

        // Resolves once the first fetch has happened, i.e. mid-cycle
        let calls = market.calls.clone();
        let shutdown = async move {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        };

        let report = tokio::time::timeout(
            Duration::from_secs(3),
            run_monitor_until(&mut cache, &mut states, &notifier, &options, shutdown),
        )
        .await
        .expect("monitor kept running after shutdown");

        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered.len(), 1);
    }

    /// Sends SIGINT to this process on its first fetch
    #[cfg(unix)]
    struct InterruptingSource {
        sent: AtomicBool,
    }

    #[cfg(unix)]
    #[async_trait]
    impl PriceSource for InterruptingSource {
        async fn fetch_price(&self, _key: &QueryKey) -> Result<PriceData, FetchError> {
            if !self.sent.swap(true, Ordering::SeqCst) {
                std::process::Command::new("kill")
                    .args(["-INT", &std::process::id().to_string()])
                    .status()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(PriceData::from_price(41_000.0))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ctrl_c_during_cycle_stops_monitor() {
        let source = InterruptingSource {
            sent: AtomicBool::new(false),
        };
        let mut cache = PriceCache::in_memory(source);
        let notifier = RecordingNotifier::default();
        let mut states = vec![state("bitcoin", 40_000.0, Direction::Below)];
        let options = MonitorOptions {
            interval: Duration::from_millis(100),
            max_age: Duration::ZERO,
            once: false,
        };

        let report = tokio::time::timeout(
            Duration::from_secs(3),
            run_monitor(&mut cache, &mut states, &notifier, &options),
        )
        .await
        .expect("Ctrl-C sent during a cycle did not stop the monitor");

        assert_eq!(report.checked, 1);
    }
}
