//! Domain model module declarations.

pub mod event;
pub mod request;
pub mod review;
pub mod tool;
