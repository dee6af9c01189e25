//! `alias` subcommand

use clap::Args;
use openpermit_bridge::room_alias_for;
use openpermit_core::PermitId;

use super::common::AliasSettings;

#[derive(Args, Debug)]
pub struct AliasCommand {
    /// Permit identifier, e.g. PERMIT-123
    pub permit_id: String,

    /// Override the alias prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Override the alias server name
    #[arg(long)]
    pub server: Option<String>,
}

/// Alias for the permit, with command-line overrides applied
pub fn run(cmd: &AliasCommand, settings: &AliasSettings) -> String {
    let prefix = cmd.prefix.as_deref().unwrap_or(&settings.prefix);
    let server = cmd.server.as_deref().unwrap_or(&settings.server);
    room_alias_for(prefix, server, &PermitId::new(cmd.permit_id.as_str())).to_string()
}
