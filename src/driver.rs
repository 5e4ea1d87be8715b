//! Accelerator driver surface.
//!
//! The core treats the driver (CUDA-like allocation primitives, context
//! management, free-memory queries) as an external collaborator: the target
//! program's accelerator runtime, not something this crate implements. This
//! module only defines the trait boundary plus [`NullDriver`], a
//! deterministic host-memory-backed implementation used by this crate's own
//! tests and suitable for exercising the tuning logic without a real
//! accelerator attached.

use bitflags::bitflags;
use std::collections::{HashMap, HashSet};

use crate::error::DriverError;

/// Opaque handle to device-global memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

/// Opaque handle to pinned host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPtr(pub u64);

/// Opaque handle to an accelerator device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Opaque handle to an accelerator context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u64);

bitflags! {
    /// Flags passed to [`Driver::host_pinned_alloc`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostAllocFlags: u32 {
        const PORTABLE       = 0b001;
        const DEVICE_MAPPED  = 0b010;
        const WRITE_COMBINED = 0b100;
    }
}

/// The accelerator driver primitives the core builds placement decisions
/// on top of. An embedder provides a real implementation that calls into
/// its accelerator runtime; the core never assumes anything about the
/// implementation beyond this contract.
pub trait Driver {
    /// Attach to an accelerator context already current on `device`, if any.
    fn context_attach(&mut self, device: DeviceHandle) -> Result<ContextHandle, DriverError>;

    /// Create a fresh accelerator context on `device` with automatic
    /// scheduling and host-mapping enabled.
    fn context_create(&mut self, device: DeviceHandle) -> Result<ContextHandle, DriverError>;

    /// Destroy a context this session created.
    fn context_destroy(&mut self, ctx: ContextHandle);

    /// Allocate `size` bytes of device-global memory.
    fn device_alloc(&mut self, size: u64) -> Result<DevicePtr, DriverError>;

    /// Free a device-global allocation.
    fn device_free(&mut self, ptr: DevicePtr);

    /// Allocate `size` bytes of pinned host memory with the given flags.
    fn host_pinned_alloc(&mut self, size: u64, flags: HostAllocFlags) -> Result<HostPtr, DriverError>;

    /// Map a pinned host allocation into the device's address space.
    fn host_pinned_to_device_ptr(&mut self, host: HostPtr) -> DevicePtr;

    /// Free a pinned host allocation (and its device mapping).
    fn host_pinned_free(&mut self, host: HostPtr);

    /// Query free and total device memory, in bytes.
    fn query_free_memory(&mut self) -> (u64, u64);
}

/// Deterministic, host-memory-backed [`Driver`] for tests and CPU-only
/// smoke-testing of the tuning logic.
///
/// Device memory is modeled as a simple byte budget (`device_capacity`);
/// allocations fail once the budget is exhausted, exactly as a real device
/// would under memory pressure. Pinned host allocations never fail here —
/// if the host running the tuner can't satisfy a pinned allocation the
/// situation is unrecoverable regardless of what drives the accelerator,
/// so `NullDriver` treats host memory as unconstrained for test purposes.
pub struct NullDriver {
    device_capacity: u64,
    device_used: u64,
    total_capacity: u64,
    next_handle: u64,
    /// Handle -> size, so `device_free` knows how much budget to give back.
    live_device: HashMap<u64, u64>,
    live_host: HashSet<u64>,
    context_created: bool,
}

impl NullDriver {
    /// Create a driver that reports `device_capacity` bytes of free device
    /// memory and never attaches to a pre-existing context.
    pub fn with_device_capacity(device_capacity: u64) -> Self {
        Self {
            device_capacity,
            device_used: 0,
            total_capacity: device_capacity,
            next_handle: 1,
            live_device: HashMap::new(),
            live_host: HashSet::new(),
            context_created: false,
        }
    }

    fn alloc_handle(&mut self) -> u64 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }
}

impl Driver for NullDriver {
    fn context_attach(&mut self, _device: DeviceHandle) -> Result<ContextHandle, DriverError> {
        // NullDriver never has a pre-existing context to attach to.
        Err(DriverError::NoContext)
    }

    fn context_create(&mut self, _device: DeviceHandle) -> Result<ContextHandle, DriverError> {
        self.context_created = true;
        Ok(ContextHandle(self.alloc_handle()))
    }

    fn context_destroy(&mut self, _ctx: ContextHandle) {
        self.context_created = false;
    }

    fn device_alloc(&mut self, size: u64) -> Result<DevicePtr, DriverError> {
        if self.device_used + size > self.device_capacity {
            return Err(DriverError::DeviceOutOfMemory);
        }
        self.device_used += size;
        let h = self.alloc_handle();
        self.live_device.insert(h, size);
        Ok(DevicePtr(h))
    }

    fn device_free(&mut self, ptr: DevicePtr) {
        if let Some(size) = self.live_device.remove(&ptr.0) {
            self.device_used -= size;
        }
    }

    fn host_pinned_alloc(&mut self, _size: u64, _flags: HostAllocFlags) -> Result<HostPtr, DriverError> {
        let h = self.alloc_handle();
        self.live_host.insert(h);
        Ok(HostPtr(h))
    }

    fn host_pinned_to_device_ptr(&mut self, host: HostPtr) -> DevicePtr {
        DevicePtr(host.0)
    }

    fn host_pinned_free(&mut self, host: HostPtr) {
        self.live_host.remove(&host.0);
    }

    fn query_free_memory(&mut self) -> (u64, u64) {
        (self.device_capacity - self.device_used, self.total_capacity)
    }
}
