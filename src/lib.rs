//! SkinPaint core — a layered editor model for Minecraft skin textures.
//!
//! The crate owns the full editing pipeline: pixel grids and color math,
//! the 64×64 atlas topology of the humanoid model, union-find segmentation
//! of a flat skin into layers, deterministic compositing, diff-based
//! undo/redo, a background offload mirror for composites, and a versioned
//! JSON project format. The `skinpaint` binary exposes the pipeline as a
//! headless CLI.

pub mod cli;
pub mod color;
pub mod composite;
pub mod document;
pub mod grid;
pub mod history;
pub mod io;
pub mod logger;
pub mod mirror;
pub mod ops;
pub mod project;
pub mod topology;

pub use color::Rgba;
pub use document::{Document, Layer, LayerGroup, LayerType};
pub use grid::{PixelGrid, SKIN_SIZE};
pub use history::History;
pub use project::Project;
pub use topology::{ModelVariant, SkinTopology};
