//! ifsap - client for the IFS AccessPlsql gateway.
//!
//! Runs SQL queries and PL/SQL calls against an IFS application server
//! through its PL/SQL gateway, speaking the gateway's marker-delimited
//! binary protocol over HTTP.
//!
//! ```no_run
//! use ifsap::{Connection, ConnectionConfig, Params};
//!
//! # async fn run() -> Result<(), ifsap::ClientError> {
//! let config = ConnectionConfig::new("ifs.example.com").with_credentials("ifsapp", "secret");
//! let conn = Connection::new(config);
//!
//! let mut query = conn
//!     .sql("SELECT name FROM person_info WHERE person_id LIKE :ID", &Params::new().bind("ID", "A%"), Some(100), None)
//!     .await?;
//! while query.partial_result() {
//!     query.fetch(100).await?;
//! }
//! query.close_cursor().await?;
//!
//! let response = conn
//!     .plsql("BEGIN :N := Client_SYS.Get_Item_Count__(:ATTR); END;", &Params::new().bind("N", 0).bind("ATTR", ""))
//!     .await?;
//! println!("{:?}", response.bindings());
//! # Ok(())
//! # }
//! ```

pub use ifsap_client::*;
pub use ifsap_marshal as marshal;
pub use ifsap_marshal::{Datum, Row};
