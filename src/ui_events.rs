use crate::app_state::State;
use crate::scene::layout::ClusterSpec;

/// Commands delivered to the render state through the event loop proxy,
/// either from the host page (wasm) or from app-internal signaling.
#[derive(Debug)]
pub enum UserCommand {
    /// Replace the procedural layout's cluster table.
    SetLayout { clusters: Vec<ClusterSpec> },
    /// Notifies App that State setup is complete.
    StateInitialized,
}

impl State {
    pub fn process_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::SetLayout { clusters } => {
                if clusters.is_empty() {
                    log::warn!("Ignoring SetLayout with an empty cluster table.");
                    return;
                }
                log::info!("Rebuilding scene layout with {} clusters.", clusters.len());
                self.scene.rebuild(&clusters);
            }
            UserCommand::StateInitialized => {
                // Handled in App::user_event
            }
        }
    }
}
