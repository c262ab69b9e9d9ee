//! Staff desk — assignment, locking and reassignment of operator work.

pub mod config;
pub mod desk;
pub mod error;
pub mod model;
pub mod store;
