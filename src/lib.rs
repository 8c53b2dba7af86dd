//! Multi-core coordination for the QEMU aarch64 `virt` machine.
//!
//! The interesting pieces live in [`kernel`]: a ticket-queue mutual
//! exclusion gate, a bitmap-indexed fixed-unit memory pool protected by
//! one gate per pool, and the SMP coordinator that powers on secondary
//! cores and hands each one a pool-allocated control block. Everything
//! in [`architecture`] and [`board`] is the thin hardware layer those
//! pieces sit on.
//!
//! The core modules are hardware-agnostic and build (and unit-test) on
//! any target; only the aarch64 boot, PSCI, and PL011 layers are
//! target-gated.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]
#![warn(clippy::style)]

#[cfg(test)]
extern crate std;

/// Architecture-specific implementations
pub mod architecture;
/// Board-specific implementations
pub mod board;
/// Generic implementations
pub mod kernel;
