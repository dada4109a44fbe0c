//! # Types
//!
//! Core value types shared by every subsystem: strongly typed addresses and
//! the descriptor model for runtime type layouts.
//!
//! Nothing here owns process-wide state; these are the vocabulary the
//! descriptor tables, the resolver, the shadow map, and the query engine all
//! speak.

pub mod address;
pub mod descriptor;

// Re-export all public types
pub use address::Address;
pub use descriptor::{Member, TypeDescriptor, TypeId, TypeInfo, TypeKind, TypeRef};
