//! Decoding gateway rows into domain values.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Error;
use super::ports::GatewayError;

pub(crate) fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, Error> {
    serde_json::from_value(row).map_err(|err| GatewayError::decode(err.to_string()).into())
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, Error> {
    rows.into_iter().map(decode_row).collect()
}
