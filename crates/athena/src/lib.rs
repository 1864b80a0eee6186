pub mod config;
pub mod driver;
pub mod error;
pub mod escape;
pub mod manager;
pub mod split;
pub mod table;
pub mod wrapper;

pub use config::{load_dotenv, AthenaCredentials, CursorKind};
pub use driver::{AthenaConnector, CancelHandle, Connector, QueryState};
pub use error::{AdapterError, CursorError, DriverError, EscapeError};
pub use escape::{escape, format_bindings, BindValue};
pub use manager::{
    AthenaConnectionManager, Connection, ConnectionState, QueryStatus, TransactionControl,
};
pub use split::{split_statements, Statement};
pub use table::{ColumnDescription, Row, Table};
pub use wrapper::ConnectionWrapper;
