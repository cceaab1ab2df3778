// src/source/mock.rs
//! Scripted adapter for tests and the demo binary.
//!
//! Behaviour is fixed up front: canned records per query, a queue of errors
//! to return before succeeding, simulated latency and auth failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::types::{AdapterError, Filters, PlatformAdapter, RateLimitInfo, RawRecord};
use crate::platform::Platform;

/// Turn a `json!({...})` literal into a [`RawRecord`]; non-objects become empty.
pub fn raw(v: Value) -> RawRecord {
    match v {
        Value::Object(m) => m,
        _ => RawRecord::new(),
    }
}

pub struct ScriptedAdapter {
    platform: Platform,
    default_records: Vec<RawRecord>,
    per_query: HashMap<String, Vec<RawRecord>>,
    search_failures: Mutex<VecDeque<AdapterError>>,
    always_fail: Option<AdapterError>,
    auth_failures: Mutex<u32>,
    latency: Duration,
    rate_limit: RateLimitInfo,
    calls: Mutex<Vec<String>>,
    auth_attempts: Mutex<u32>,
}

impl ScriptedAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            default_records: Vec::new(),
            per_query: HashMap::new(),
            search_failures: Mutex::new(VecDeque::new()),
            always_fail: None,
            auth_failures: Mutex::new(0),
            latency: Duration::ZERO,
            rate_limit: RateLimitInfo::default(),
            calls: Mutex::new(Vec::new()),
            auth_attempts: Mutex::new(0),
        }
    }

    /// Records returned for any query without a dedicated script.
    pub fn returning(mut self, records: Vec<RawRecord>) -> Self {
        self.default_records = records;
        self
    }

    /// Records returned for one exact query.
    pub fn on_query(mut self, query: &str, records: Vec<RawRecord>) -> Self {
        self.per_query.insert(query.to_string(), records);
        self
    }

    /// Fail the next `n` searches with `err`, then behave normally.
    pub fn failing_first(self, n: usize, err: AdapterError) -> Self {
        {
            let mut q = self.search_failures.lock();
            for _ in 0..n {
                q.push_back(err.clone());
            }
        }
        self
    }

    /// Every search fails with `err`.
    pub fn always_failing(mut self, err: AdapterError) -> Self {
        self.always_fail = Some(err);
        self
    }

    /// Fail the first `n` authentication attempts.
    pub fn with_auth_failures(self, n: u32) -> Self {
        *self.auth_failures.lock() = n;
        self
    }

    /// Sleep this long inside every search.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Never answer within any sane deadline.
    pub fn hanging(self) -> Self {
        self.with_latency(Duration::from_secs(3600))
    }

    pub fn with_rate_limit_info(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = info;
        self
    }

    /// Queries received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn auth_attempts(&self) -> u32 {
        *self.auth_attempts.lock()
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        *self.auth_attempts.lock() += 1;
        let mut left = self.auth_failures.lock();
        if *left > 0 {
            *left -= 1;
            return Err(AdapterError::AuthFailed("scripted auth failure".into()));
        }
        Ok(())
    }

    async fn search(&self, query: &str, _filters: &Filters) -> Result<Vec<RawRecord>, AdapterError> {
        self.calls.lock().push(query.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        if let Some(err) = self.search_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self
            .per_query
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default_records.clone()))
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        self.rate_limit.clone()
    }
}
