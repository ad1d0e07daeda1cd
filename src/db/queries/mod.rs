//! Database queries

pub mod trip;
