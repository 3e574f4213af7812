//! Inbound surfaces: HTTP (click/stats API, health, metrics) and gRPC.

pub mod api;
pub mod auth;
pub mod grpc;
pub mod http;
