//! ndbox - Type-erased N-dimensional boxes that live on any compute device
//!
//! A box carries its element type, shape and device at runtime. Memory comes
//! from a per-device backend (CPU, Vulkan-driven accelerators, and stand-ins for
//! CUDA/OpenCL), so the same container works wherever its bytes reside.

pub mod backend;

pub mod config;

pub mod container;

pub mod device;

pub mod element;

pub mod utils;

pub use backend::{Backend, BackendOps, DeviceInfo, backend_for};
pub use config::BackendConfig;
pub use container::{Dims, MAX_RANK, NdBox};
pub use device::{Device, DeviceKind};
pub use element::{Element, ElementType, Scalar};
pub use utils::error::{BoxError, BoxResult, ErrorKind};
