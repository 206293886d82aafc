pub mod activity;
pub mod app_error;
pub mod password;
pub mod validation;
