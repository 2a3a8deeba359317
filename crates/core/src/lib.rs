pub mod combine;
pub mod dispatch;
pub mod driver;
pub mod promise;
pub mod sim;
pub mod socket;
pub mod stream;

pub use dispatch::Dispatcher;
pub use driver::{Driver, DriverError, Fd, SharedDriver};
pub use promise::{promise, Resolver, Subscriber};
pub use socket::{Socket, SocketRef};
