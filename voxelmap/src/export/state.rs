use std::fmt;

/// Where an export pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Initializing,
    RenderingBaseZoom,
    GeneratingPyramidLevels,
    Checkpointing,
    Completed,
    Failed,
}

impl ExportState {
    /// Whether a pass is in progress.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ExportState::Initializing
                | ExportState::RenderingBaseZoom
                | ExportState::GeneratingPyramidLevels
                | ExportState::Checkpointing
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Idle => "idle",
            ExportState::Initializing => "initializing",
            ExportState::RenderingBaseZoom => "rendering base zoom",
            ExportState::GeneratingPyramidLevels => "generating pyramid levels",
            ExportState::Checkpointing => "checkpointing",
            ExportState::Completed => "completed",
            ExportState::Failed => "failed",
        };
        f.write_str(name)
    }
}
