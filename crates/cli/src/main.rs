//! Command-line client for parcel.

mod api_client;
mod upload;

use anyhow::{Context, Result};
use api_client::ApiClient;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use parcel_core::{FileEntry, Tag, TagId};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const DEFAULT_PARALLEL: usize = 4;

#[derive(Parser)]
#[command(name = "parcelctl")]
#[command(about = "Command-line client for the parcel upload service")]
#[command(version)]
struct Cli {
    /// Server API URL
    #[arg(long, global = true, env = "PARCEL_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Retries for chunk transfers failing with 5xx or transport errors
    #[arg(long, global = true, default_value_t = api_client::DEFAULT_MAX_RETRIES)]
    retries: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health and version
    Health,
    /// Upload a file in chunks
    Upload {
        /// File to upload
        path: PathBuf,
        /// Maximum chunks in flight at once
        #[arg(long, default_value_t = DEFAULT_PARALLEL)]
        parallel: usize,
    },
    /// Show the state of an upload
    Status {
        /// Upload ID
        upload_id: String,
    },
    /// Show upload progress (-1 for unknown uploads)
    Progress {
        /// Upload ID
        upload_id: String,
    },
    /// List uploaded files, newest first
    Ls,
    /// Download a completed file
    Download {
        /// Upload ID
        upload_id: String,
        /// Output path (defaults to the file's name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Change a file's display name
    Rename {
        /// Upload ID
        upload_id: String,
        /// New display name
        new_name: String,
    },
    /// Delete a file and everything stored for it
    Rm {
        /// Upload ID
        upload_id: String,
    },
    /// Abort an in-progress upload
    Abort {
        /// Upload ID
        upload_id: String,
    },
    /// Tag management commands
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
}

#[derive(Subcommand)]
enum TagCommands {
    /// Create a tag
    Create {
        /// Tag name
        name: String,
    },
    /// List all tags
    List,
    /// Delete a tag (detaches it from every file)
    Rm {
        /// Tag ID
        tag_id: TagId,
    },
    /// Replace the tags on a file
    Set {
        /// Upload ID
        upload_id: String,
        /// Tag IDs to attach (none clears all tags)
        tag_ids: Vec<TagId>,
    },
    /// Show the tags on a file
    Show {
        /// Upload ID
        upload_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client =
        ApiClient::new(&cli.server)?.with_retry(cli.retries, api_client::DEFAULT_RETRY_DELAY);

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            let caps = client.capabilities().await?;
            println!("Status: {}", health.status);
            println!("Version: {}", health.version);
            println!("Storage backend: {}", health.storage_backend);
            println!("API version: {}", caps.api_version);
            println!("Chunk size: {}", caps.chunk_size);
            println!("Max chunk size: {}", caps.max_chunk_size);
            println!("Resume supported: {}", caps.supports_resume);
        }
        Commands::Upload { path, parallel } => {
            let state = upload::upload_file(&client, &path, parallel).await?;
            println!("Upload completed!");
            println!("\nUpload ID: {}", state.upload_id);
            println!("Name: {}", state.filename);
            println!("Size: {}", state.file_size);
        }
        Commands::Status { upload_id } => {
            let state = client.get_upload(&upload_id).await?;
            println!("Upload ID: {}", state.upload_id);
            println!("Name: {}", state.filename);
            println!("Status: {}", state.status);
            println!(
                "Received: {} / {} bytes ({}%)",
                state.received_bytes, state.file_size, state.progress
            );
            println!("Chunk size: {}", state.chunk_size);
            println!("Received chunks: {}", format_indices(&state.received_chunks));
            if let Some(error) = state.error {
                println!("Error: {error}");
            }
        }
        Commands::Progress { upload_id } => {
            let report = client.get_progress(&upload_id).await?;
            match report.status {
                Some(status) => println!("{}% ({status})", report.progress),
                None => println!("{} (unknown upload)", report.progress),
            }
        }
        Commands::Ls => {
            let files = client.list_files().await?;
            print_files(&files);
        }
        Commands::Download { upload_id, output } => {
            let output = match output {
                Some(path) => path,
                None => {
                    let state = client.get_upload(&upload_id).await?;
                    default_output_path(&state.filename)?
                }
            };
            let written = download_to(&client, &upload_id, &output).await?;
            println!("Downloaded {written} bytes to {}", output.display());
        }
        Commands::Rename {
            upload_id,
            new_name,
        } => {
            let entry = client.rename_file(&upload_id, &new_name).await?;
            println!("Renamed {} to {}", entry.id, entry.filename);
        }
        Commands::Rm { upload_id } => {
            client.delete_file(&upload_id).await?;
            println!("File deleted: {upload_id}");
        }
        Commands::Abort { upload_id } => {
            let state = client.abort_upload(&upload_id).await?;
            println!("Upload {} is now {}", state.upload_id, state.status);
        }
        Commands::Tag { command } => run_tag_command(&client, command).await?,
    }

    Ok(())
}

async fn run_tag_command(client: &ApiClient, command: TagCommands) -> Result<()> {
    match command {
        TagCommands::Create { name } => {
            let tag = client.create_tag(&name).await?;
            println!("Tag created: {} (ID {})", tag.name, tag.id);
        }
        TagCommands::List => {
            let tags = client.list_tags().await?;
            if tags.is_empty() {
                println!("No tags found.");
            } else {
                println!("{:<8} Name", "ID");
                println!("{}", "-".repeat(40));
                for tag in tags {
                    println!("{:<8} {}", tag.id, tag.name);
                }
            }
        }
        TagCommands::Rm { tag_id } => {
            client.delete_tag(tag_id).await?;
            println!("Tag deleted: {tag_id}");
        }
        TagCommands::Set { upload_id, tag_ids } => {
            let tags = client.set_file_tags(&upload_id, &tag_ids).await?;
            println!("Tags on {upload_id}: {}", format_tags(&tags));
        }
        TagCommands::Show { upload_id } => {
            let tags = client.get_file_tags(&upload_id).await?;
            println!("Tags on {upload_id}: {}", format_tags(&tags));
        }
    }
    Ok(())
}

fn print_files(files: &[FileEntry]) {
    if files.is_empty() {
        println!("No files found.");
        return;
    }
    println!(
        "{:<38} {:<30} {:>12} {:<10} {:>4} {:<26} Tags",
        "ID", "Name", "Size", "Status", "%", "Uploaded"
    );
    println!("{}", "-".repeat(140));
    for file in files {
        println!(
            "{:<38} {:<30} {:>12} {:<10} {:>4} {:<26} {}",
            file.id,
            file.filename,
            file.file_size,
            file.status,
            file.progress,
            file.uploaded_at,
            format_tags(&file.tags)
        );
    }
}

fn format_tags(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return "-".to_string();
    }
    tags.iter()
        .map(|tag| tag.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_indices(indices: &[u32]) -> String {
    if indices.is_empty() {
        return "none".to_string();
    }
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Local path for a download when none was given.
///
/// Only the final path component of the server-side name is used, so a
/// stored name can never direct the write outside the current directory.
fn default_output_path(filename: &str) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("cannot derive a local file name from {filename:?}"))?;
    Ok(PathBuf::from(name))
}

async fn download_to(client: &ApiClient, upload_id: &str, output: &Path) -> Result<u64> {
    let response = client.download(upload_id).await?;
    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    let result: Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        drop(file);
        let _ = tokio::fs::remove_file(output).await;
        return Err(err.context("download interrupted"));
    }
    Ok(written)
}
