//! Reqwest-backed row gateway adapter.
//!
//! This adapter owns transport details only: query-string encoding, the
//! headers the row API expects, and HTTP error mapping. Rows are returned as
//! raw JSON for the domain to decode.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::Value;

use super::SessionStore;
use super::errors::{map_rest_status, map_transport_error};
use super::query_params::{QueryPairs, filter_pairs, select_pairs, selection_pair};
use crate::domain::ports::{
    DeleteRequest, GatewayError, InsertRequest, RowGateway, SelectRequest, Table, UpdateRequest,
};

const SINGLE_OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

/// Row gateway speaking the PostgREST dialect.
pub struct PostgrestGateway {
    client: Client,
    rest_url: Url,
    api_key: String,
    session: Arc<SessionStore>,
}

impl PostgrestGateway {
    /// Build a gateway rooted at `rest_url` (e.g. `https://host/rest/v1/`).
    pub fn new(
        client: Client,
        rest_url: Url,
        api_key: impl Into<String>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            client,
            rest_url,
            api_key: api_key.into(),
            session,
        }
    }

    fn table_url(&self, table: Table) -> Result<Url, GatewayError> {
        self.rest_url.join(table.as_str()).map_err(|error| {
            GatewayError::transport(format!("invalid table URL for {table}: {error}"))
        })
    }

    fn request(
        &self,
        method: Method,
        table: Table,
        pairs: &QueryPairs,
    ) -> Result<RequestBuilder, GatewayError> {
        let bearer = self.session.bearer(&self.api_key);
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .query(pairs)
            .header("apikey", self.api_key.as_str())
            .bearer_auth(bearer.as_str()))
    }

    fn single_row(builder: RequestBuilder) -> RequestBuilder {
        builder.header(reqwest::header::ACCEPT, SINGLE_OBJECT_MEDIA_TYPE)
    }

    fn returning(builder: RequestBuilder) -> RequestBuilder {
        Self::single_row(builder).header("Prefer", RETURN_REPRESENTATION)
    }
}

async fn execute(builder: RequestBuilder) -> Result<Vec<u8>, GatewayError> {
    let response = builder.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(map_rest_status(status, body.as_ref()));
    }
    Ok(body.to_vec())
}

fn decode_value(body: &[u8]) -> Result<Value, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|error| GatewayError::decode(format!("invalid row payload: {error}")))
}

/// Normalise a read response into a list of rows.
fn into_rows(value: Value, single: bool) -> Result<Vec<Value>, GatewayError> {
    match value {
        Value::Array(rows) if !single => Ok(rows),
        Value::Array(rows) if rows.len() == 1 => Ok(rows),
        Value::Array(_) => Err(GatewayError::no_rows()),
        Value::Object(_) if single => Ok(vec![value]),
        other => Err(GatewayError::decode(format!(
            "expected rows, got {}",
            json_kind(&other)
        ))),
    }
}

/// Normalise a write representation into the single affected row.
fn into_written_row(value: Value) -> Result<Value, GatewayError> {
    match value {
        Value::Object(_) => Ok(value),
        Value::Array(rows) => rows.into_iter().next().ok_or_else(GatewayError::no_rows),
        other => Err(GatewayError::decode(format!(
            "expected a row, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl RowGateway for PostgrestGateway {
    async fn select(&self, request: SelectRequest) -> Result<Vec<Value>, GatewayError> {
        let mut builder = self.request(Method::GET, request.table, &select_pairs(&request))?;
        if request.single {
            builder = Self::single_row(builder);
        }
        let body = execute(builder).await?;
        into_rows(decode_value(&body)?, request.single)
    }

    async fn insert(&self, request: InsertRequest) -> Result<Value, GatewayError> {
        let pairs = vec![selection_pair(&request.returning)];
        let builder = self
            .request(Method::POST, request.table, &pairs)?
            .json(&Value::Array(vec![request.row]));
        let body = execute(Self::returning(builder)).await?;
        into_written_row(decode_value(&body)?)
    }

    async fn update(&self, request: UpdateRequest) -> Result<Value, GatewayError> {
        let mut pairs = filter_pairs(&request.filters);
        pairs.push(selection_pair(&request.returning));
        let builder = self
            .request(Method::PATCH, request.table, &pairs)?
            .json(&request.patch);
        let body = execute(Self::returning(builder)).await?;
        into_written_row(decode_value(&body)?)
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), GatewayError> {
        let pairs = filter_pairs(&request.filters);
        execute(self.request(Method::DELETE, request.table, &pairs)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for the response normalisation helpers.

    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn list_reads_pass_arrays_through() {
        let rows = into_rows(json!([{ "id": "r1" }, { "id": "r2" }]), false).expect("rows");
        assert_eq!(rows.len(), 2);
    }

    #[rstest]
    fn single_reads_wrap_the_object() {
        let rows = into_rows(json!({ "id": "r1" }), true).expect("row");
        assert_eq!(rows, vec![json!({ "id": "r1" })]);
    }

    #[rstest]
    #[case::empty(json!([]))]
    #[case::many(json!([{ "id": "r1" }, { "id": "r2" }]))]
    fn single_reads_of_arrays_need_exactly_one_row(#[case] body: Value) {
        let error = into_rows(body, true).expect_err("not exactly one row");
        assert!(error.is_no_rows());
    }

    #[rstest]
    fn reads_reject_scalars() {
        let error = into_rows(json!("nope"), false).expect_err("scalar body");
        assert!(matches!(error, GatewayError::Decode { .. }));
    }

    #[rstest]
    fn writes_accept_objects_or_one_element_arrays() {
        assert_eq!(
            into_written_row(json!({ "id": "r9" })).expect("object"),
            json!({ "id": "r9" })
        );
        assert_eq!(
            into_written_row(json!([{ "id": "r9" }])).expect("array"),
            json!({ "id": "r9" })
        );
        assert!(into_written_row(json!([])).expect_err("empty").is_no_rows());
    }

    #[rstest]
    fn table_urls_extend_the_rest_root() {
        let gateway = PostgrestGateway::new(
            Client::new(),
            Url::parse("https://demo.supabase.co/rest/v1/").expect("url"),
            "anon",
            Arc::new(SessionStore::new()),
        );
        assert_eq!(
            gateway.table_url(Table::Rides).expect("url").as_str(),
            "https://demo.supabase.co/rest/v1/rides"
        );
    }
}
