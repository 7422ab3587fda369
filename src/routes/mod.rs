pub mod dispatch;
pub mod health_check;
pub mod stats;
