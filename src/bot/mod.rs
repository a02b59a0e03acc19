pub mod app;
pub mod convert;
pub mod transport;

pub use app::App;
pub use convert::event_from_callback;
pub use convert::event_from_message;
pub use transport::TeloxideTransport;
