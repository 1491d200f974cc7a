//! Scripted connection manager for executor tests
//!
//! Connections replay a queue of outcomes so tests can drive retry,
//! backpressure and cancellation without a database. When the queue is
//! empty every insert succeeds.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use deadpool::managed::{Manager, Metrics, RecycleResult};
use sensorsafrica_connectors::{
    build_pool, ConnectionError, IngestionExecutor, InsertConnection, RetryPolicy,
};
use sensorsafrica_schemas::{BoundValue, InsertStatement};

/// What the next insert does
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Transient,
    Permanent,
    /// Succeed after sleeping
    Slow(Duration),
}

#[derive(Debug, Default)]
struct ScriptState {
    outcomes: VecDeque<Outcome>,
    rejected_tables: HashSet<String>,
    failing_creates: usize,
    created: usize,
    attempts: usize,
}

/// Shared handle to the script driving every connection
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: Outcome) -> Self {
        self.state.lock().unwrap().outcomes.push_back(outcome);
        self
    }

    pub fn times(self, outcome: Outcome, n: usize) -> Self {
        (0..n).fold(self, |script, _| script.then(outcome.clone()))
    }

    /// Every insert into `table` fails permanently
    pub fn reject_table(self, table: &str) -> Self {
        self.state.lock().unwrap().rejected_tables.insert(table.to_string());
        self
    }

    /// The next `n` connection attempts are refused
    pub fn refuse_connections(self, n: usize) -> Self {
        self.state.lock().unwrap().failing_creates = n;
        self
    }

    /// Connections successfully opened so far
    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    /// Inserts attempted so far
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

pub struct ScriptedManager {
    script: Script,
}

impl Manager for ScriptedManager {
    type Type = ScriptedConnection;
    type Error = String;

    async fn create(&self) -> Result<ScriptedConnection, String> {
        let mut state = self.script.state.lock().unwrap();
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err("connection refused".to_string());
        }
        state.created += 1;
        Ok(ScriptedConnection {
            script: self.script.clone(),
        })
    }

    async fn recycle(
        &self,
        _conn: &mut ScriptedConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<String> {
        Ok(())
    }
}

pub struct ScriptedConnection {
    script: Script,
}

#[async_trait::async_trait]
impl InsertConnection for ScriptedConnection {
    async fn insert(&mut self, statement: &InsertStatement) -> Result<u64, ConnectionError> {
        let outcome = {
            let mut state = self.script.state.lock().unwrap();
            state.attempts += 1;
            if state.rejected_tables.contains(&statement.table) {
                Outcome::Permanent
            } else {
                state.outcomes.pop_front().unwrap_or(Outcome::Ok)
            }
        };

        match outcome {
            Outcome::Ok => Ok(1),
            Outcome::Transient => {
                Err(ConnectionError::Transient("connection reset by peer".into()))
            }
            Outcome::Permanent => {
                Err(ConnectionError::Permanent("violates foreign key constraint".into()))
            }
            Outcome::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(1)
            }
        }
    }
}

/// Fast retries so tests stay quick
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

pub fn executor(
    script: &Script,
    pool_size: usize,
    acquire_timeout: Duration,
    retry: RetryPolicy,
) -> IngestionExecutor<ScriptedManager> {
    let pool = build_pool(
        ScriptedManager {
            script: script.clone(),
        },
        pool_size,
    )
    .unwrap();
    IngestionExecutor::new(pool, acquire_timeout, retry)
}

/// A particulate matter insert for `table`
pub fn statement(table: &str) -> InsertStatement {
    InsertStatement {
        table: table.to_string(),
        columns: vec![
            "time".into(),
            "node_id".into(),
            "PM1".into(),
            "location".into(),
            "sensor_name".into(),
        ],
        values: vec![
            BoundValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()),
            BoundValue::Text("esp8266-12".into()),
            BoundValue::Float(35.2),
            BoundValue::Text("Ruiru".into()),
            BoundValue::Text("SDS011".into()),
        ],
    }
}
