pub mod connection;
pub mod error;
pub mod query;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

pub use connection::HttpConnection;
pub use error::ParseError;
pub use query::parse_query;
pub use request::RequestHead;
pub use response::{Respond, ResponseHeaders};
pub use router::Router;
pub use service::{BuildError, HttpService};

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
