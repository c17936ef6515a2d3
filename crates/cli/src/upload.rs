//! Chunked file upload with bounded parallelism.
//!
//! Every chunk except the last is sent concurrently. The last chunk goes out
//! only after the others were acknowledged, since it triggers assembly on the
//! server.

use crate::api_client::{ApiClient, ApiFailure};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parcel_core::upload::{ChunkUploadResponse, UploadStateResponse};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// How a file of `file_size` bytes splits into chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("server returned a zero chunk size");
        }
        // An empty file still travels as one empty chunk.
        let count = file_size.div_ceil(chunk_size).max(1);
        let total_chunks = u32::try_from(count)
            .map_err(|_| anyhow::anyhow!("file needs {count} chunks, more than supported"))?;
        Ok(Self {
            file_size,
            chunk_size,
            total_chunks,
        })
    }

    pub fn last_index(&self) -> u32 {
        self.total_chunks - 1
    }

    pub fn offset_of(&self, index: u32) -> u64 {
        u64::from(index) * self.chunk_size
    }

    pub fn len_of(&self, index: u32) -> u64 {
        let start = self.offset_of(index).min(self.file_size);
        (self.file_size - start).min(self.chunk_size)
    }
}

struct ChunkReader {
    file: tokio::fs::File,
    plan: ChunkPlan,
}

impl ChunkReader {
    async fn open(path: &Path, plan: ChunkPlan) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self { file, plan })
    }

    async fn read(&mut self, index: u32) -> Result<Bytes> {
        let len = usize::try_from(self.plan.len_of(index))
            .map_err(|_| anyhow::anyhow!("chunk size exceeds platform limits"))?;
        self.file
            .seek(SeekFrom::Start(self.plan.offset_of(index)))
            .await?;
        let mut data = vec![0u8; len];
        self.file
            .read_exact(&mut data)
            .await
            .with_context(|| format!("failed to read chunk {index}"))?;
        Ok(Bytes::from(data))
    }
}

/// Upload the file at `path` and return the final server-side state.
pub async fn upload_file(
    client: &ApiClient,
    path: &Path,
    parallel: usize,
) -> Result<UploadStateResponse> {
    let file_size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("{} has no usable file name", path.display()))?;

    let created = client.create_upload(filename, file_size).await?;
    let plan = ChunkPlan::new(file_size, created.chunk_size)?;
    let mut reader = ChunkReader::open(path, plan).await?;
    let upload_id = created.upload_id.as_str();

    eprintln!(
        "Uploading {filename} ({file_size} bytes) as {} chunk(s), upload ID {upload_id}",
        plan.total_chunks
    );

    send_chunks(client, upload_id, &mut reader, 0..plan.last_index(), parallel).await?;

    let receipt = match send_last(client, upload_id, &mut reader).await {
        Ok(receipt) => receipt,
        Err(err)
            if err
                .downcast_ref::<ApiFailure>()
                .is_some_and(ApiFailure::is_incomplete_upload) =>
        {
            let state = client.get_upload(upload_id).await?;
            let received: HashSet<u32> = state.received_chunks.into_iter().collect();
            let missing: Vec<u32> = (0..plan.last_index())
                .filter(|index| !received.contains(index))
                .collect();
            eprintln!("  Server is missing {} chunk(s), re-sending", missing.len());

            send_chunks(client, upload_id, &mut reader, missing, parallel).await?;
            send_last(client, upload_id, &mut reader).await?
        }
        Err(err) => return Err(err),
    };

    if !receipt.complete {
        anyhow::bail!("server accepted the last chunk but did not complete the upload");
    }

    client.get_upload(upload_id).await
}

async fn send_chunks(
    client: &ApiClient,
    upload_id: &str,
    reader: &mut ChunkReader,
    indices: impl IntoIterator<Item = u32>,
    parallel: usize,
) -> Result<()> {
    let parallel = parallel.max(1);
    let total = reader.plan.total_chunks;
    let mut in_flight = FuturesUnordered::new();

    for index in indices {
        let data = reader.read(index).await?;
        in_flight.push(async move {
            let response = client.upload_chunk(upload_id, index, total, data).await?;
            report(&response, total);
            Ok::<_, anyhow::Error>(())
        });

        if in_flight.len() >= parallel
            && let Some(result) = in_flight.next().await
        {
            result?;
        }
    }

    while let Some(result) = in_flight.next().await {
        result?;
    }

    Ok(())
}

async fn send_last(
    client: &ApiClient,
    upload_id: &str,
    reader: &mut ChunkReader,
) -> Result<ChunkUploadResponse> {
    let index = reader.plan.last_index();
    let total = reader.plan.total_chunks;
    let data = reader.read(index).await?;
    let response = client.upload_chunk(upload_id, index, total, data).await?;
    report(&response, total);
    Ok(response)
}

fn report(response: &ChunkUploadResponse, total: u32) {
    eprintln!(
        "  chunk {}/{} stored ({}%)",
        response.chunk_index + 1,
        total,
        response.progress
    );
}
