pub mod activity;
pub mod comment;
pub mod pagination;
pub mod post;
pub mod status;
pub mod tieba;
pub mod user;
