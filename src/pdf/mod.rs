//! Low-level helpers over the lopdf object model

pub mod geometry;
pub mod objects;

pub use geometry::{Matrix, Rect};
