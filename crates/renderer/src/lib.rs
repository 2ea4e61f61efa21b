//! Tile rendering through an external program.
//!
//! - `dispatch`: the render job contract and outcome classification
//! - `command`: the subprocess-backed renderer
//! - `png`: minimal PNG encoding for the placeholder tile

pub mod command;
pub mod dispatch;
pub mod png;

pub use command::CommandRenderer;
pub use dispatch::{dispatch, RenderJob, RenderOutcome, RenderReport, Renderer};
