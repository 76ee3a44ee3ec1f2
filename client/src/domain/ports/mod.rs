//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod identity_provider;
mod retry_sleeper;
mod row_gateway;

#[cfg(test)]
pub use identity_provider::MockIdentityProvider;
pub use identity_provider::{FixtureIdentityProvider, IdentityProvider};
pub use retry_sleeper::RetrySleeper;
#[cfg(test)]
pub use row_gateway::MockRowGateway;
pub use row_gateway::{
    DeleteRequest, Filter, FilterOp, FixtureRowGateway, GatewayError, InsertRequest, Join,
    NO_ROWS_CODE, Order, RowGateway, SelectRequest, Selection, Table, UpdateRequest,
};
