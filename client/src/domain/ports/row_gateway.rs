//! Port for the hosted row store.
//!
//! Requests describe a PostgREST-style operation: a table, column selection
//! with optional embedded joins, filters and ordering. Rows travel as
//! `serde_json::Value` so domain services decide how to decode them.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;

/// Gateway error code meaning a single-row request matched nothing.
pub const NO_ROWS_CODE: &str = "PGRST116";

define_port_error! {
    /// Errors raised by row gateway adapters.
    pub enum GatewayError {
        /// The backend processed the request and refused it.
        Backend { code: String, message: String } =>
            "{message}",
        /// The backend could not be reached.
        Transport { message: String } =>
            "gateway transport failed: {message}",
        /// The request did not complete in time.
        Timeout { message: String } =>
            "gateway request timed out: {message}",
        /// The response body could not be decoded.
        Decode { message: String } =>
            "gateway payload could not be decoded: {message}",
    }
}

impl GatewayError {
    /// The "no row found" signal returned by single-row requests.
    pub fn no_rows() -> Self {
        Self::backend(
            NO_ROWS_CODE,
            "JSON object requested, multiple (or no) rows returned",
        )
    }

    /// Whether this error is the "no row found" signal.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::Backend { code, .. } if code == NO_ROWS_CODE)
    }
}

/// Backend tables the client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Posted ride offers.
    Rides,
    /// Per-identity profiles.
    Profiles,
}

impl Table {
    /// Table name as exposed by the row API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rides => "rides",
            Self::Profiles => "profiles",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedded read of a related table, e.g. `profiles(phone_number)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Related table.
    pub table: Table,
    /// Columns read from the related table.
    pub columns: Vec<String>,
}

/// Columns returned by a read or a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Columns of the primary table; `*` selects all of them.
    pub columns: Vec<String>,
    /// Embedded related reads.
    pub joins: Vec<Join>,
}

impl Selection {
    /// Every column, no joins.
    pub fn all() -> Self {
        Self::columns(["*"])
    }

    /// Named columns, no joins.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            joins: Vec::new(),
        }
    }

    /// Add an embedded read of `table`.
    pub fn join<I, S>(mut self, table: Table, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.joins.push(Join {
            table,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Render as a PostgREST `select` parameter value.
    pub fn to_select_param(&self) -> String {
        let mut parts = self.columns.clone();
        parts.extend(
            self.joins
                .iter()
                .map(|join| format!("{}({})", join.table, join.columns.join(","))),
        );
        parts.join(",")
    }
}

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equality.
    Eq,
    /// Case-insensitive pattern match using `%` wildcards.
    ILike,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
}

impl FilterOp {
    /// Operator token understood by the row API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::ILike => "ilike",
            Self::Gte => "gte",
            Self::Lt => "lt",
        }
    }
}

/// One column predicate. All filters of a request are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Comparison.
    pub op: FilterOp,
    /// Right-hand side, already rendered as text.
    pub value: String,
}

impl Filter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Case-insensitive "contains `fragment`".
    pub fn ilike_contains(column: impl Into<String>, fragment: &str) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::ILike,
            value: format!("%{fragment}%"),
        }
    }

    /// `column >= value`.
    pub fn gte(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gte,
            value: value.into(),
        }
    }

    /// `column < value`.
    pub fn lt(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Lt,
            value: value.into(),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to order by.
    pub column: String,
    /// Ascending when true.
    pub ascending: bool,
}

impl Order {
    /// Ascending order on `column`.
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }
}

/// Read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectRequest {
    /// Table read.
    pub table: Table,
    /// Returned columns.
    pub selection: Selection,
    /// Row predicates.
    pub filters: Vec<Filter>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Expect exactly one row; zero rows yield [`GatewayError::no_rows`].
    pub single: bool,
}

impl SelectRequest {
    /// Select every column of `table` with no predicates.
    pub fn new(table: Table) -> Self {
        Self {
            table,
            selection: Selection::all(),
            filters: Vec::new(),
            order: None,
            single: false,
        }
    }

    /// Replace the selection.
    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Add a predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Order the result.
    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Expect a single row.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }
}

/// Insert request for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    /// Target table.
    pub table: Table,
    /// Row body.
    pub row: Value,
    /// Columns of the inserted row to return.
    pub returning: Selection,
}

/// Update request; the filters must identify a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Target table.
    pub table: Table,
    /// Row predicates.
    pub filters: Vec<Filter>,
    /// Columns to overwrite.
    pub patch: Value,
    /// Columns of the updated row to return.
    pub returning: Selection,
}

/// Delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Target table.
    pub table: Table,
    /// Row predicates.
    pub filters: Vec<Filter>,
}

/// Port for the row-oriented query and mutation API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowGateway: Send + Sync {
    /// Read rows. Single requests return exactly one row or
    /// [`GatewayError::no_rows`].
    async fn select(&self, request: SelectRequest) -> Result<Vec<Value>, GatewayError>;

    /// Insert a row and return it as stored.
    async fn insert(&self, request: InsertRequest) -> Result<Value, GatewayError>;

    /// Patch a single row and return it as stored.
    async fn update(&self, request: UpdateRequest) -> Result<Value, GatewayError>;

    /// Delete matching rows.
    async fn delete(&self, request: DeleteRequest) -> Result<(), GatewayError>;
}

/// Fixture gateway holding no rows and accepting no writes.
///
/// Reads return empty lists (or the "no rows" signal for single requests);
/// writes fail with a backend error.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRowGateway;

#[async_trait]
impl RowGateway for FixtureRowGateway {
    async fn select(&self, request: SelectRequest) -> Result<Vec<Value>, GatewayError> {
        if request.single {
            return Err(GatewayError::no_rows());
        }
        Ok(Vec::new())
    }

    async fn insert(&self, request: InsertRequest) -> Result<Value, GatewayError> {
        Err(read_only(request.table))
    }

    async fn update(&self, request: UpdateRequest) -> Result<Value, GatewayError> {
        Err(read_only(request.table))
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), GatewayError> {
        Err(read_only(request.table))
    }
}

fn read_only(table: Table) -> GatewayError {
    GatewayError::backend("42501", format!("fixture gateway cannot write to {table}"))
}
