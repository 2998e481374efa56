//! Shared arguments for building a [`cloudkit_facade::CloudAccess`] from
//! the command line. Every subcommand that talks to a provider takes the
//! same `--provider`/`--token`/`--hint` triple back that `auth login`
//! printed, since this workspace persists nothing on the caller's behalf.

use anyhow::{bail, Result};
use cloudkit_core::domain::{Hints, Permission};
use cloudkit_facade::{CloudRegistry, InitData};

#[derive(Debug, clap::Args)]
pub struct ConnectArgs {
    /// Provider to use (see `cloudkit auth providers`)
    #[arg(long)]
    pub provider: String,

    /// Persisted credential from a prior `auth login`
    #[arg(long)]
    pub token: Option<String>,

    /// Persisted `key=value` hint from a prior `auth login`, repeatable
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    pub hints: Vec<String>,

    /// Open the provider read-only
    #[arg(long)]
    pub read_only: bool,
}

impl ConnectArgs {
    fn init_data(&self) -> Result<InitData> {
        let mut hints = Hints::new();
        for entry in &self.hints {
            let Some((key, value)) = entry.split_once('=') else {
                bail!("malformed --hint \"{entry}\", expected KEY=VALUE");
            };
            hints.set(key, value);
        }

        let mut init_data = InitData::new().with_hints(hints);
        if let Some(token) = &self.token {
            init_data = init_data.with_token(token.clone());
        }
        if self.read_only {
            init_data = init_data.with_permission(Permission::ReadOnly);
        }
        Ok(init_data)
    }

    pub async fn connect(&self) -> Result<cloudkit_facade::CloudAccess> {
        let registry = CloudRegistry::bind().await?;
        let access = registry.create(&self.provider, self.init_data()?)?;
        Ok(access)
    }
}

/// Collapses a `CloudAccess`'s resumable state into the flags a later
/// invocation needs to reconstruct the same session, printed by
/// `auth login` for the caller to store.
#[must_use]
pub fn persistable_hints(hints: &cloudkit_core::domain::Hints) -> Vec<String> {
    let mut pairs: Vec<String> = hints.snapshot().into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs
}
