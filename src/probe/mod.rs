pub mod correlate;
pub mod transport;
pub mod wire;

pub use correlate::*;
pub use transport::*;
pub use wire::*;
