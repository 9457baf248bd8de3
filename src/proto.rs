//! Generated gRPC bindings.
//!
//! `kubeapi` is the kubelet runtime API served to the orchestrator, `hyperd`
//! is the PublicAPI of the hypervisor container engine.

#[allow(clippy::all)]
pub mod kubeapi {
    tonic::include_proto!("runtime");
}

#[allow(clippy::all)]
pub mod hyperd {
    tonic::include_proto!("types");
}
