//! Test utilities for the carpool crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`, via
//! the `test-support` feature). Nothing here talks to the network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::domain::ports::{
    DeleteRequest, Filter, FilterOp, GatewayError, IdentityProvider, InsertRequest, Order,
    RetrySleeper, RowGateway, SelectRequest, Selection, Table, UpdateRequest,
};
use crate::domain::{Identity, Profile, Ride, parse_instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test support mutex poisoned"),
    }
}

/// Clock whose "now" only moves when a test says so.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *lock(&self.0) += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *lock(&self.0) += TimeDelta::seconds(seconds);
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Debug, Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0).push(duration);
    }
}

/// Identity provider returning a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider(Result<Option<Identity>, GatewayError>);

impl StaticIdentityProvider {
    pub fn signed_in(identity: Identity) -> Self {
        Self(Ok(Some(identity)))
    }

    pub fn signed_out() -> Self {
        Self(Ok(None))
    }

    pub fn failing(error: GatewayError) -> Self {
        Self(Err(error))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, GatewayError> {
        self.0.clone()
    }
}

/// Gateway operation kinds, used for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    Select(Table),
    Insert(Table),
    Update(Table),
    Delete(Table),
}

#[derive(Default)]
struct StoreState {
    rides: Vec<Value>,
    profiles: Vec<Value>,
    next_ride_ids: VecDeque<String>,
    next_sequence: u64,
    one_shot_failures: HashMap<GatewayOperation, VecDeque<GatewayError>>,
    sticky_failures: HashMap<GatewayOperation, GatewayError>,
    calls: Vec<GatewayOperation>,
}

impl StoreState {
    fn table(&self, table: Table) -> &Vec<Value> {
        match table {
            Table::Rides => &self.rides,
            Table::Profiles => &self.profiles,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut Vec<Value> {
        match table {
            Table::Rides => &mut self.rides,
            Table::Profiles => &mut self.profiles,
        }
    }

    fn record(&mut self, operation: GatewayOperation) -> Result<(), GatewayError> {
        self.calls.push(operation);
        if let Some(error) = self
            .one_shot_failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        match self.sticky_failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn project(&self, row: &Value, selection: &Selection) -> Value {
        let Value::Object(fields) = row else {
            return row.clone();
        };
        let mut out = if selection.columns.iter().any(|column| column == "*") {
            fields.clone()
        } else {
            selection
                .columns
                .iter()
                .filter_map(|column| fields.get(column).map(|v| (column.clone(), v.clone())))
                .collect::<Map<String, Value>>()
        };
        for join in &selection.joins {
            let related = match join.table {
                Table::Profiles => fields
                    .get("user_id")
                    .and_then(|user_id| find_by_id(&self.profiles, user_id)),
                Table::Rides => None,
            };
            let embedded = related.map_or(Value::Null, |related| {
                Value::Object(
                    join.columns
                        .iter()
                        .map(|column| {
                            (
                                column.clone(),
                                related.get(column).cloned().unwrap_or(Value::Null),
                            )
                        })
                        .collect(),
                )
            });
            out.insert(join.table.as_str().to_owned(), embedded);
        }
        Value::Object(out)
    }
}

fn find_by_id<'a>(rows: &'a [Value], id: &Value) -> Option<&'a Value> {
    let wanted = value_text(id);
    rows.iter()
        .find(|row| row.get("id").map(value_text) == Some(wanted.clone()))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn compare_column(left: &Value, right: &str) -> Option<std::cmp::Ordering> {
    let left = value_text(left);
    match (parse_instant(&left), parse_instant(right)) {
        (Ok(left), Ok(right)) => Some(left.cmp(&right)),
        _ => Some(left.as_str().cmp(right)),
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    let Some(cell) = row.get(&filter.column) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => value_text(cell) == filter.value,
        FilterOp::ILike => {
            let fragment = filter.value.trim_matches('%').to_lowercase();
            value_text(cell).to_lowercase().contains(&fragment)
        }
        FilterOp::Gte => compare_column(cell, &filter.value).is_some_and(|ord| ord.is_ge()),
        FilterOp::Lt => compare_column(cell, &filter.value).is_some_and(|ord| ord.is_lt()),
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_filter(row, filter))
}

fn sort_rows(rows: &mut [Value], order: &Order) {
    rows.sort_by(|left, right| {
        let left = left.get(&order.column).map(value_text).unwrap_or_default();
        let right = right.get(&order.column).map(value_text).unwrap_or_default();
        let ordering = compare_column(&Value::String(left.clone()), &right)
            .unwrap_or(std::cmp::Ordering::Equal);
        if order.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

/// In-memory row store emulating the hosted row API.
///
/// Supports the filter operators the client issues, embedded
/// `profiles(...)` joins on `user_id`, ordering, the single-row "no rows"
/// signal, failure injection, call recording, and gates that hold writes or
/// reads of one table until released.
#[derive(Default)]
pub struct InMemoryRowStore {
    state: Mutex<StoreState>,
    write_gate: Mutex<Option<Arc<Notify>>>,
    read_gate: Mutex<Option<(Table, Arc<Notify>)>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ride row.
    pub fn with_ride(self, ride: &Ride) -> Self {
        let mut row = serde_json::to_value(ride).unwrap_or(Value::Null);
        if let Value::Object(fields) = &mut row {
            fields.remove("profiles");
        }
        lock(&self.state).rides.push(row);
        self
    }

    /// Seed a profile row.
    pub fn with_profile(self, profile: &Profile) -> Self {
        let row = serde_json::to_value(profile).unwrap_or(Value::Null);
        lock(&self.state).profiles.push(row);
        self
    }

    /// Id handed to the next inserted ride.
    pub fn assign_next_ride_id(&self, id: impl Into<String>) {
        lock(&self.state).next_ride_ids.push_back(id.into());
    }

    /// Fail the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: GatewayOperation, error: GatewayError) {
        lock(&self.state)
            .one_shot_failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `operation` with `error`.
    pub fn fail_always(&self, operation: GatewayOperation, error: GatewayError) {
        lock(&self.state).sticky_failures.insert(operation, error);
    }

    /// Hold every write until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.write_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next select on `table` until the returned handle is notified.
    ///
    /// The held select reads the table only once released; later selects
    /// run straight through.
    pub fn hold_reads(&self, table: Table) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.read_gate) = Some((table, Arc::clone(&gate)));
        gate
    }

    /// Operations issued so far, in order.
    pub fn calls(&self) -> Vec<GatewayOperation> {
        lock(&self.state).calls.clone()
    }

    /// Number of times `operation` was issued.
    pub fn call_count(&self, operation: GatewayOperation) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    /// Stored rides, ordered by date, with poster phone joined.
    pub fn rides(&self) -> Vec<Ride> {
        let state = lock(&self.state);
        let selection = Selection::all().join(Table::Profiles, ["phone_number"]);
        let mut rows: Vec<Value> = state
            .rides
            .iter()
            .map(|row| state.project(row, &selection))
            .collect();
        sort_rows(&mut rows, &Order::ascending("date"));
        rows.into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect()
    }

    async fn wait_for_read_gate(&self, table: Table) {
        let gate = {
            let mut slot = lock(&self.read_gate);
            match slot.take() {
                Some((held, gate)) if held == table => Some(gate),
                other => {
                    *slot = other;
                    None
                }
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    async fn wait_for_write_gate(&self) {
        let gate = lock(&self.write_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl RowGateway for InMemoryRowStore {
    async fn select(&self, request: SelectRequest) -> Result<Vec<Value>, GatewayError> {
        self.wait_for_read_gate(request.table).await;
        let mut state = lock(&self.state);
        state.record(GatewayOperation::Select(request.table))?;
        let mut rows: Vec<Value> = state
            .table(request.table)
            .iter()
            .filter(|row| matches_all(row, &request.filters))
            .map(|row| state.project(row, &request.selection))
            .collect();
        if let Some(order) = &request.order {
            sort_rows(&mut rows, order);
        }
        if request.single && rows.len() != 1 {
            return Err(GatewayError::no_rows());
        }
        Ok(rows)
    }

    async fn insert(&self, request: InsertRequest) -> Result<Value, GatewayError> {
        self.wait_for_write_gate().await;
        let mut state = lock(&self.state);
        state.record(GatewayOperation::Insert(request.table))?;
        let Value::Object(mut row) = request.row else {
            return Err(GatewayError::backend("PGRST102", "row must be an object"));
        };
        if !row.contains_key("id") {
            let id = match state.next_ride_ids.pop_front() {
                Some(id) => id,
                None => {
                    state.next_sequence += 1;
                    format!("r{}", 100 + state.next_sequence)
                }
            };
            row.insert("id".to_owned(), Value::String(id));
        }
        let row = Value::Object(row);
        state.table_mut(request.table).push(row.clone());
        Ok(state.project(&row, &request.returning))
    }

    async fn update(&self, request: UpdateRequest) -> Result<Value, GatewayError> {
        self.wait_for_write_gate().await;
        let mut state = lock(&self.state);
        state.record(GatewayOperation::Update(request.table))?;
        let Value::Object(patch) = request.patch else {
            return Err(GatewayError::backend("PGRST102", "patch must be an object"));
        };
        let mut updated = None;
        for row in state.table_mut(request.table).iter_mut() {
            if !matches_all(row, &request.filters) {
                continue;
            }
            if let Value::Object(fields) = row {
                fields.extend(patch.clone());
            }
            updated = Some(row.clone());
        }
        match updated {
            Some(row) => Ok(state.project(&row, &request.returning)),
            None => Err(GatewayError::no_rows()),
        }
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), GatewayError> {
        self.wait_for_write_gate().await;
        let mut state = lock(&self.state);
        state.record(GatewayOperation::Delete(request.table))?;
        state
            .table_mut(request.table)
            .retain(|row| !matches_all(row, &request.filters));
        Ok(())
    }
}
