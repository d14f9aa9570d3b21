//! Built-in transformation steps.

pub mod geometry;

pub use geometry::GeometryTransformation;
