//! # Core Module
//!
//! Concurrency primitives shared by the rest of the crate.
//!
//! ## Key Components
//! - `MtResource`: a value published by one thread and read lock-free by any number of
//!   others
//!
//! ## Usage
//! ```rust
//! use std::sync::Arc;
//! use hashlife_voxels::core::MtResource;
//!
//! let counter = MtResource::new(0);
//! let reader = counter.clone();
//! counter.set(Arc::new(1));
//! assert_eq!(*reader.get(), 1);
//! ```

pub mod mt_resource;

pub use mt_resource::MtResource;
