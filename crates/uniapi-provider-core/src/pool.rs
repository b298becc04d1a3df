use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::rate_limit::RateLimit;

/// Budget applied when neither the model nor `"default"` has an entry.
const FALLBACK_LIMIT: RateLimit = RateLimit { count: 999_999, period_secs: 60 };

pub const DEFAULT_COOLING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleAlgorithm {
    #[default]
    RoundRobin,
    Random,
    FixedPriority,
}

impl ScheduleAlgorithm {
    /// Unknown names fall back to round-robin with a warning.
    pub fn parse(name: &str) -> Self {
        match name {
            "round_robin" => ScheduleAlgorithm::RoundRobin,
            "random" => ScheduleAlgorithm::Random,
            "fixed_priority" => ScheduleAlgorithm::FixedPriority,
            other => {
                warn!(
                    event = "unknown_schedule_algorithm",
                    algorithm = %other,
                    "expected one of round_robin, random, fixed_priority"
                );
                ScheduleAlgorithm::RoundRobin
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("all credentials are rate limited")]
pub struct PoolExhausted;

#[derive(Debug, Default)]
struct PoolInner {
    index: usize,
    /// credential -> model key -> request timestamps (seconds), append-only
    /// within a window, trimmed lazily past the largest configured period.
    requests: HashMap<String, HashMap<String, Vec<f64>>>,
    cooling_until: HashMap<String, f64>,
}

/// A circular list of credentials with per-(credential, model) sliding-window
/// rate limits and externally applied cooling.
///
/// Rate limits are `(pattern, budgets)` pairs in configuration order; when
/// several patterns substring-match a model, the first-declared one wins.
///
/// All mutating operations serialize on one mutex; window trimming and
/// timestamp recording happen inside the same critical section as selection.
#[derive(Debug)]
pub struct CredentialPool {
    items: Vec<String>,
    algorithm: ScheduleAlgorithm,
    rate_limits: Vec<(String, Vec<RateLimit>)>,
    inner: Mutex<PoolInner>,
}

impl CredentialPool {
    pub fn new(
        mut items: Vec<String>,
        rate_limits: Vec<(String, Vec<RateLimit>)>,
        algorithm: ScheduleAlgorithm,
    ) -> Self {
        if algorithm == ScheduleAlgorithm::Random {
            items.shuffle(&mut rand::rng());
        }
        Self {
            items,
            algorithm,
            rate_limits,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Pool without configured budgets (selection still honors cooling).
    pub fn unlimited(items: Vec<String>) -> Self {
        let rate_limits = vec![(
            "default".to_string(),
            vec![RateLimit { count: 999_999, period_secs: 60 }],
        )];
        Self::new(items, rate_limits, ScheduleAlgorithm::RoundRobin)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Select the next credential eligible for `model` and record one request
    /// timestamp for it. Iterates at most one full cycle; fails once every
    /// credential is limited or cooling.
    pub async fn next(&self, model: Option<&str>) -> Result<String, PoolExhausted> {
        if self.items.is_empty() {
            return Err(PoolExhausted);
        }
        let mut inner = self.inner.lock().await;
        if self.algorithm == ScheduleAlgorithm::FixedPriority {
            inner.index = 0;
        }
        let start = inner.index;
        loop {
            let item = self.items[inner.index].clone();
            inner.index = (inner.index + 1) % self.items.len();

            if !self.check_limited(&mut inner, &item, model) {
                Self::record(&mut inner, &item, model);
                return Ok(item);
            }

            if inner.index == start {
                warn!(event = "pool_exhausted", "all credentials are rate limited");
                return Err(PoolExhausted);
            }
        }
    }

    /// Exclude `item` from selection until `duration` has elapsed.
    pub async fn set_cooling(&self, item: &str, duration: Duration) {
        if item.is_empty() {
            return;
        }
        let until = now_secs() + duration.as_secs_f64();
        let mut inner = self.inner.lock().await;
        inner.cooling_until.insert(item.to_string(), until);
        warn!(
            event = "credential_cooling",
            cooling_secs = duration.as_secs_f64(),
            "credential excluded from selection"
        );
    }

    /// Whether `item` is currently cooling or over any applicable budget.
    /// Does not record a request.
    pub async fn is_rate_limited(&self, item: &str, model: Option<&str>) -> bool {
        let mut inner = self.inner.lock().await;
        self.check_limited(&mut inner, item, model)
    }

    /// The credential handed out by the most recent `next` call.
    pub async fn current(&self) -> Option<String> {
        if self.items.is_empty() {
            return None;
        }
        let inner = self.inner.lock().await;
        let index = (inner.index + self.items.len() - 1) % self.items.len();
        Some(self.items[index].clone())
    }

    fn applicable_limits(&self, model: Option<&str>) -> &[RateLimit] {
        if let Some(model) = model {
            if let Some((_, limits)) = self
                .rate_limits
                .iter()
                .find(|(pattern, _)| pattern.as_str() == model)
            {
                return limits;
            }
            // Declaration order breaks ties between overlapping patterns.
            for (pattern, limits) in &self.rate_limits {
                if pattern != "default" && model.contains(pattern.as_str()) {
                    return limits;
                }
            }
        }
        self.rate_limits
            .iter()
            .find(|(pattern, _)| pattern == "default")
            .map(|(_, limits)| limits.as_slice())
            .unwrap_or(std::slice::from_ref(&FALLBACK_LIMIT))
    }

    fn check_limited(&self, inner: &mut PoolInner, item: &str, model: Option<&str>) -> bool {
        let now = now_secs();
        if inner.cooling_until.get(item).is_some_and(|until| now < *until) {
            return true;
        }

        let limits = self.applicable_limits(model);
        let model_key = model.unwrap_or("default");
        let log = inner
            .requests
            .entry(item.to_string())
            .or_default()
            .entry(model_key.to_string())
            .or_default();

        for limit in limits {
            let recent = log
                .iter()
                .filter(|at| **at > now - limit.period_secs as f64)
                .count() as u64;
            if recent >= limit.count {
                warn!(
                    event = "credential_rate_limited",
                    model = %model_key,
                    count = limit.count,
                    period_secs = limit.period_secs,
                );
                return true;
            }
        }

        let max_period = limits
            .iter()
            .map(|limit| limit.period_secs)
            .max()
            .unwrap_or_default();
        log.retain(|at| *at > now - max_period as f64);
        false
    }

    fn record(inner: &mut PoolInner, item: &str, model: Option<&str>) {
        let model_key = model.unwrap_or("default");
        inner
            .requests
            .entry(item.to_string())
            .or_default()
            .entry(model_key.to_string())
            .or_default()
            .push(now_secs());
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
