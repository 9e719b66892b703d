pub mod notifications;
pub mod reports;
pub mod review;
pub mod test_requests;
