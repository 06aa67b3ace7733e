//! # Adapters Module
//!
//! Infrastructure adapters implementing the outbound ports.

pub mod feed;
pub mod memory;
pub mod solver;
