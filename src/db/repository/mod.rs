pub mod audit;
pub mod directory;
pub mod notification;
pub mod test_request;
