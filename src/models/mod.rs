pub mod directory;
pub mod enums;
pub mod notification;
pub mod test_request;

pub use directory::*;
pub use enums::*;
pub use notification::*;
pub use test_request::*;
