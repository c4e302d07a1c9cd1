//! Client-side rendering contract

pub mod interpolation;

pub use interpolation::{RenderFrame, SnapshotBuffer, BUFFER_LEN, RENDER_DELAY};
