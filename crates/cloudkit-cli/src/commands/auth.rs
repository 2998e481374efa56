//! `cloudkit auth` - enumerate providers and run the login flow.

use anyhow::Result;
use clap::Subcommand;

use crate::connect::{persistable_hints, ConnectArgs};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// List the provider names `--provider` accepts
    Providers,
    /// Run the provider's login flow and print the resumable session
    Login {
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Check whether a persisted session is still authenticated
    Status {
        #[command(flatten)]
        connect: ConnectArgs,
    },
}

impl AuthCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        match self {
            AuthCommand::Providers => {
                for name in cloudkit_facade::PROVIDER_NAMES.iter().copied() {
                    fmt.info(name);
                }
                Ok(())
            }
            AuthCommand::Login { connect } => self.login(connect, &*fmt, format).await,
            AuthCommand::Status { connect } => self.status(connect, &*fmt, format).await,
        }
    }

    async fn login(&self, connect: &ConnectArgs, fmt: &dyn crate::output::OutputFormatter, format: OutputFormat) -> Result<()> {
        let access = connect.connect().await?;

        if let Some(url) = access.authorize_url() {
            fmt.info(&format!("visit this URL to authorize: {url}"));
            let _ = webbrowser::open(&url);
        }

        let token = access.login().await?;
        let hints = persistable_hints(&access.hints());

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "provider": access.name(),
                "token": token.access_token,
                "hints": hints,
            }));
        } else {
            fmt.success(&format!("authenticated with {}", access.name()));
            fmt.info(&format!("token: {}", token.access_token));
            for hint in &hints {
                fmt.info(&format!("hint: {hint}"));
            }
        }
        Ok(())
    }

    async fn status(&self, connect: &ConnectArgs, fmt: &dyn crate::output::OutputFormatter, format: OutputFormat) -> Result<()> {
        let access = connect.connect().await?;
        let data = access.general_data().await?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "provider": access.name(),
                "username": data.username,
                "quota_used": data.quota_used,
                "quota_total": data.quota_total,
            }));
        } else {
            fmt.success(&format!("{} is authenticated as {}", access.name(), data.username));
            fmt.info(&format!("quota: {}/{} bytes", data.quota_used, data.quota_total));
        }
        Ok(())
    }
}
