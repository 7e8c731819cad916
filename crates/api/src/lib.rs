//! HTTP API: intake endpoints, job/image queries, request validation and
//! error mapping.

pub mod app;
pub mod middleware;
