//! JSON command surface for driving the pipeline from a UI process.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::brush::Brush;
use crate::input::PickEvent;
use crate::pipeline::SculptingPipeline;
use crate::symmetry::MirrorPlane;
use crate::types::SculptError;

/// Commands from the UI to the sculpting core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SculptCommand {
    /// Start a stroke with the current brush
    BeginStroke,
    /// One pointer sample of the active stroke
    Pick(PickEvent),
    /// Pointer released: commit the stroke
    EndStroke,
    /// Abort the stroke and revert its edits
    CancelStroke,
    Undo,
    Redo,
    /// Brush for the next stroke
    SetBrush(Brush),
    /// Mirror plane, or `None` to disable symmetry
    SetSymmetry(Option<MirrorPlane>),
}

/// Replies from the sculpting core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SculptResponse {
    /// Command accepted with nothing further to report
    Ack,
    Picked {
        applied: bool,
        moved: usize,
        split: usize,
        collapsed: usize,
    },
    StrokeEnded {
        committed: bool,
        events: usize,
    },
    /// Result of cancel, undo and redo
    Changed(bool),
}

impl SculptingPipeline {
    /// Execute one command.
    pub fn handle_command(&mut self, command: SculptCommand) -> Result<SculptResponse, SculptError> {
        let response = match command {
            SculptCommand::BeginStroke => {
                self.begin_stroke()?;
                SculptResponse::Ack
            }
            SculptCommand::Pick(event) => {
                let result = self.process_event(&event)?;
                SculptResponse::Picked {
                    applied: result.applied,
                    moved: result.dab.moved + result.mirror.map_or(0, |m| m.moved),
                    split: result.tessellation.edges_split,
                    collapsed: result.tessellation.edges_collapsed,
                }
            }
            SculptCommand::EndStroke => {
                let result = self.end_stroke()?;
                SculptResponse::StrokeEnded {
                    committed: result.committed,
                    events: result.events,
                }
            }
            SculptCommand::CancelStroke => SculptResponse::Changed(self.cancel_stroke()?),
            SculptCommand::Undo => SculptResponse::Changed(self.undo()),
            SculptCommand::Redo => SculptResponse::Changed(self.redo()),
            SculptCommand::SetBrush(brush) => {
                self.set_brush(brush)?;
                SculptResponse::Ack
            }
            SculptCommand::SetSymmetry(plane) => {
                self.set_symmetry(plane)?;
                SculptResponse::Ack
            }
        };
        Ok(response)
    }

    /// Decode a JSON command, execute it and encode the response.
    pub fn handle_json(&mut self, json: &str) -> Result<String, SculptError> {
        let command: SculptCommand = serde_json::from_str(json).inspect_err(|e| {
            warn!("Rejected sculpt command: {}", e);
        })?;
        let response = self.handle_command(command)?;
        Ok(serde_json::to_string(&response)?)
    }
}
