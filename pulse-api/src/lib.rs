//! pulse gRPC API
//!
//! This crate defines the gRPC protocol for agent ↔ server metric
//! transfer. The protobuf definitions are in `proto/pulse.proto` and
//! code-generated via `tonic-build`.

// Include the generated code
pub mod pulse {
    pub mod v1 {
        tonic::include_proto!("pulse.v1");
    }
}
