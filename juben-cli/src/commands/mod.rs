pub mod agents;
pub mod chat;
pub mod export;
pub mod sessions;

pub use agents::{cmd_agents, cmd_health, cmd_status};
pub use chat::{cmd_chat, ChatArgs};
pub use export::cmd_export;
pub use sessions::{handle_session_command, SessionCommand};

use juben_core::{ClientContext, JubenConfig, SessionController};
use tracing::debug;

pub(crate) fn create_controller(config: &JubenConfig) -> anyhow::Result<SessionController> {
    debug!(api_root = %config.api.api_root(), "Connecting to backend");
    let ctx = ClientContext::from_config(config)?;
    Ok(SessionController::new(ctx))
}
