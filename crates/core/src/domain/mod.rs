pub mod event;
pub mod keys;
pub mod member;
pub mod submission;
