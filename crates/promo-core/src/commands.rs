//! Host command collaborators.
//!
//! Grant and revoke commands are templates. Placeholders:
//! - `@pid`: the player's stable id
//! - `@p`: the display name (the id when the player is offline)
//! - `@s`: the literal `server`
//!
//! The longest placeholder is matched first, so `@pid` is never read as
//! `@p` followed by `id`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use promo_types::{PlayerId, PlayerSession, TemporaryGrantRecord};

use crate::catalog::DefinitionStore;
use crate::sweeper::RevokeCallback;
use crate::CommandError;

const PLACEHOLDERS: [&str; 3] = ["@pid", "@p", "@s"];

/// Executes rendered commands against the host.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, player_id: PlayerId, command: &str) -> Result<(), CommandError>;
}

/// Resolves player ids to live sessions.
pub trait PlayerDirectory: Send + Sync {
    /// `None` when the player is offline.
    fn find(&self, player_id: PlayerId) -> Option<PlayerSession>;

    /// Show `message` to an online player. Offline players are skipped.
    fn notify(&self, _player_id: PlayerId, _message: &str) {}
}

/// Substitute placeholders in `template`.
pub fn render_command(template: &str, player_id: PlayerId, display_name: &str) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        match PLACEHOLDERS.iter().find(|p| tail.starts_with(**p)) {
            Some(&placeholder) => {
                match placeholder {
                    "@pid" => out.push_str(&player_id.to_string()),
                    "@p" => out.push_str(display_name),
                    _ => out.push_str("server"),
                }
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('@');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Counts from one [`run_commands`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBatch {
    pub total: usize,
    pub failed: usize,
}

impl CommandBatch {
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn into_result(self) -> Result<(), CommandError> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(CommandError::Incomplete {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

/// Render and run every template in order. A failing command is logged and
/// the remaining ones still run.
pub fn run_commands(
    executor: &dyn CommandExecutor,
    templates: &[String],
    player_id: PlayerId,
    display_name: &str,
) -> CommandBatch {
    let mut batch = CommandBatch {
        total: templates.len(),
        failed: 0,
    };
    for template in templates {
        let command = render_command(template, player_id, display_name);
        match executor.execute(player_id, &command) {
            Ok(()) => debug!(player_id, %command, "command executed"),
            Err(e) => {
                error!(player_id, %command, error = %e, "command execution failed");
                batch.failed += 1;
            }
        }
    }
    batch
}

/// Display name of `player_id`, or the id itself when offline.
pub(crate) fn display_name(players: &dyn PlayerDirectory, player_id: PlayerId) -> String {
    players
        .find(player_id)
        .map(|s| s.display_name)
        .unwrap_or_else(|| player_id.to_string())
}

/// Revokes a temporary grant by running its code's revoke commands.
pub struct CommandRevoker {
    definitions: Arc<DefinitionStore>,
    executor: Arc<dyn CommandExecutor>,
    players: Arc<dyn PlayerDirectory>,
}

impl CommandRevoker {
    pub fn new(
        definitions: Arc<DefinitionStore>,
        executor: Arc<dyn CommandExecutor>,
        players: Arc<dyn PlayerDirectory>,
    ) -> Self {
        Self {
            definitions,
            executor,
            players,
        }
    }
}

impl RevokeCallback for CommandRevoker {
    fn revoke(&self, grant: &TemporaryGrantRecord) -> Result<(), CommandError> {
        let Some(definition) = self.definitions.get(&grant.code_name) else {
            warn!(grant_id = %grant.id, code = %grant.code_name, "cannot revoke grant of unknown code");
            return Err(CommandError::CodeMissing(grant.code_name.clone()));
        };

        if !definition.revoke_commands.is_empty() {
            let name = display_name(self.players.as_ref(), grant.player_id);
            run_commands(
                self.executor.as_ref(),
                &definition.revoke_commands,
                grant.player_id,
                &name,
            )
            .into_result()?;
        }

        info!(player_id = grant.player_id, code = %definition.name, grant_id = %grant.id, "temporary grant revoked");
        self.players.notify(
            grant.player_id,
            &format!("Your temporary reward from code {} has expired.", definition.name),
        );
        Ok(())
    }
}
