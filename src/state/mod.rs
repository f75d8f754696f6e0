pub mod hop;
pub mod ring;
pub mod session;

pub use hop::*;
pub use ring::*;
pub use session::*;
