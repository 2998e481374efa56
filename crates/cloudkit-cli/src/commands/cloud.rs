//! `cloudkit cloud` - list, fetch, and upload items through the facade.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use cloudkit_core::domain::RemotePath;
use cloudkit_core::ports::BufferSink;

use crate::connect::ConnectArgs;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CloudCommand {
    /// List a directory's children
    Ls {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Remote path to list, defaults to the root
        #[arg(default_value = "/")]
        path: String,
    },
    /// Download a file's content
    Get {
        #[command(flatten)]
        connect: ConnectArgs,
        path: String,
        /// Write to this local path instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload a local file
    Put {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Remote directory to upload into
        parent: String,
        /// Local file to read
        #[arg(long)]
        input: PathBuf,
        /// Remote file name, defaults to the local file's name
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a directory
    Mkdir {
        #[command(flatten)]
        connect: ConnectArgs,
        parent: String,
        name: String,
    },
    /// Delete an item
    Rm {
        #[command(flatten)]
        connect: ConnectArgs,
        path: String,
    },
}

impl CloudCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        match self {
            CloudCommand::Ls { connect, path } => self.ls(connect, path, &*fmt, format).await,
            CloudCommand::Get { connect, path, out } => self.get(connect, path, out.as_deref(), &*fmt).await,
            CloudCommand::Put { connect, parent, input, name } => self.put(connect, parent, input, name.as_deref(), &*fmt).await,
            CloudCommand::Mkdir { connect, parent, name } => self.mkdir(connect, parent, name, &*fmt).await,
            CloudCommand::Rm { connect, path } => self.rm(connect, path, &*fmt).await,
        }
    }

    async fn ls(&self, connect: &ConnectArgs, path: &str, fmt: &dyn crate::output::OutputFormatter, format: OutputFormat) -> Result<()> {
        let access = connect.connect().await?;
        let remote_path: RemotePath = path.parse()?;
        let dir = access.get_item(&remote_path).await?;
        let children = access.list_directory(&dir).await?;

        if format == OutputFormat::Json {
            let rows: Vec<_> = children
                .iter()
                .map(|item| serde_json::json!({"name": item.name, "is_directory": item.is_directory(), "size": item.size}))
                .collect();
            fmt.print_json(&serde_json::Value::Array(rows));
        } else {
            for item in &children {
                let marker = if item.is_directory() { "/" } else { "" };
                fmt.info(&format!("{}{marker}", item.name));
            }
        }
        Ok(())
    }

    async fn get(&self, connect: &ConnectArgs, path: &str, out: Option<&std::path::Path>, fmt: &dyn crate::output::OutputFormatter) -> Result<()> {
        let access = connect.connect().await?;
        let remote_path: RemotePath = path.parse()?;
        let item = access.get_item(&remote_path).await?;

        let mut sink = BufferSink::default();
        access.download_file(&item, None, &mut sink).await?;

        match out {
            Some(out) => {
                std::fs::write(out, &sink.data)?;
                fmt.success(&format!("wrote {} bytes to {}", sink.data.len(), out.display()));
            }
            None => {
                use std::io::Write;
                std::io::stdout().write_all(&sink.data)?;
            }
        }
        Ok(())
    }

    async fn put(&self, connect: &ConnectArgs, parent: &str, input: &std::path::Path, name: Option<&str>, fmt: &dyn crate::output::OutputFormatter) -> Result<()> {
        let access = connect.connect().await?;
        let parent_path: RemotePath = parent.parse()?;
        let data = std::fs::read(input)?;
        let name = name.map_or_else(
            || input.file_name().and_then(|n| n.to_str()).unwrap_or("upload").to_string(),
            str::to_string,
        );

        let item = access.upload_file(&parent_path, &name, &data, None).await?;
        fmt.success(&format!("uploaded {} ({} bytes)", item.name, data.len()));
        Ok(())
    }

    async fn mkdir(&self, connect: &ConnectArgs, parent: &str, name: &str, fmt: &dyn crate::output::OutputFormatter) -> Result<()> {
        let access = connect.connect().await?;
        let parent_path: RemotePath = parent.parse()?;
        let parent_item = access.get_item(&parent_path).await?;
        let item = access.create_directory(&parent_item, name).await?;
        fmt.success(&format!("created directory {}", item.name));
        Ok(())
    }

    async fn rm(&self, connect: &ConnectArgs, path: &str, fmt: &dyn crate::output::OutputFormatter) -> Result<()> {
        let access = connect.connect().await?;
        let remote_path: RemotePath = path.parse()?;
        let item = access.get_item(&remote_path).await?;
        access.delete_item(&item).await?;
        fmt.success(&format!("deleted {}", item.name));
        Ok(())
    }
}
