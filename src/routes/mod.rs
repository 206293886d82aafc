pub mod comments;
pub mod posts;
pub mod tiebas;
pub mod users;
