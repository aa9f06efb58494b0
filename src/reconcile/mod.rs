// src/reconcile/mod.rs
pub mod hierarchy;
pub mod names;

pub use hierarchy::{HierarchyBuilder, HierarchyModel, PlacedRow};
