//! Pixel-level operations on skins and layers: segmentation of a flat image
//! into layers, layer merging/splitting, and border blending.

pub mod merge;
pub mod segment;
