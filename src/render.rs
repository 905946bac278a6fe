/// Escape-time renderer for one zoom frame.
pub mod escape;
/// Stateless per-frame worker logic.
pub mod executor;

pub use escape::{RenderedFrame, render_escape_frame};
pub use executor::WorkerExecutor;
