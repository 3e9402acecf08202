//! Wire protocol for the `io.pact.plugin.PactPlugin` gRPC service.
//!
//! Plugins run as local child processes and expose a gRPC server on a port
//! they announce at startup. The host is always the client. This crate
//! carries the three protocol-facing pieces:
//!
//! - [`messages`]: the protobuf message and enum definitions, maintained by
//!   hand so the crate builds without a protobuf toolchain. Field numbers are
//!   part of the wire contract and must never change.
//! - [`client`]: a thin unary client that authenticates every call with the
//!   bearer token the plugin announced during its startup handshake.
//! - [`values`]: pure conversions between `serde_json::Value` and the
//!   protobuf `Struct`/`Value` well-known types used for all free-form data
//!   crossing the plugin boundary.
//!
//! Everything stateful (process supervision, the capability catalogue, the
//! native content model) lives in the `pact-plugin-host` crate.

pub mod client;
pub mod messages;
pub mod values;

pub use self::client::PactPluginClient;
