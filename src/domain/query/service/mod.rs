//! Interval calculation, request building and batch dispatch.

pub mod dispatcher;
pub mod interval_calculator;
pub mod query_builder;
