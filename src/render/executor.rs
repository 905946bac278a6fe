use std::sync::Arc;

use crate::config::FrameGeometry;
use crate::coordinator::{TransformCoordinator, TransformState};
use crate::foundation::core::{FrameRequest, FrameResult};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::escape::render_escape_frame;

/// Turns a [`FrameRequest`] into a [`FrameResult`].
///
/// The executor holds no per-frame state: each call reads the shared transform, renders, and
/// optionally proposes a better center. Coordinator failures never fail the frame; reads fall back
/// to the default transform and failed proposals are dropped.
#[derive(Clone)]
pub struct WorkerExecutor {
    geometry: FrameGeometry,
    coordinator: Arc<dyn TransformCoordinator>,
    parallel: bool,
}

impl WorkerExecutor {
    pub fn new(geometry: FrameGeometry, coordinator: Arc<dyn TransformCoordinator>) -> Self {
        Self {
            geometry,
            coordinator,
            parallel: false,
        }
    }

    /// Render rows on the rayon pool. Only worth it when the executor is not itself one of many
    /// parallel workers.
    pub fn with_parallel_rows(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[tracing::instrument(skip(self), fields(frame = req.index.0))]
    pub fn execute(&self, req: FrameRequest) -> ReelResult<FrameResult> {
        if req.index.0 == 0 {
            return Err(ReelError::validation("frame indices start at 1"));
        }

        let center = match self.coordinator.fetch() {
            Ok(center) => center,
            Err(e) => {
                tracing::debug!(error = %e, "transform fetch failed; using default center");
                TransformState::default()
            }
        };

        let zoom = self.geometry.zoom_for(req.index);
        let frame = render_escape_frame(&self.geometry, zoom, center, self.parallel);

        if let Some(candidate) = frame.candidate
            && let Err(e) = self.coordinator.propose(candidate)
        {
            tracing::debug!(error = %e, "transform proposal dropped");
        }

        let payload = frame.into_payload(self.geometry.encoding)?;
        Ok(FrameResult {
            index: req.index,
            payload,
        })
    }
}
