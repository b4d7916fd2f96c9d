//! An in-memory node driven through one full write and read round.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use colored::Colorize;
use serde_json::json;
use tracing::info;

use blobber_alloc::{Allocation, BlobberTerms};
use blobber_core::{
    BlobberConfig, CommitRequest, ContentKind, CoreError, DownloadRequest, FileLocator,
    NodeContext, RequestContext, UploadMode, UploadRequest,
};
use blobber_crypto::{allocation_root, SigningKey};
use blobber_markers::{UnsignedReadMarker, UnsignedWriteMarker, WriteMarker};
use blobber_reftree::ReferenceTree;
use blobber_store::{InMemoryByteStore, InMemoryLedger, InMemoryMetaStore, MetaStore, WriteBatch};
use blobber_types::{Digest, Timestamp};

use crate::cli::OutputFormat;

const ALLOCATION: &str = "demo-allocation";
const CONNECTION: &str = "demo-connection";
const FILE: &str = "/demo/payload.bin";

pub async fn run(config: BlobberConfig, size: usize, format: OutputFormat) -> anyhow::Result<()> {
    let meta = Arc::new(InMemoryMetaStore::new());
    let ctx = NodeContext::new(
        config.clone(),
        meta.clone(),
        Arc::new(InMemoryByteStore::new(config.chunk_size)),
        Arc::new(InMemoryLedger::new()),
    );
    let owner = SigningKey::generate();
    seed_allocation(meta.as_ref(), &owner, &config)?;
    let req = RequestContext::with_key(owner.verifying_key());

    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let uploaded = ctx
        .write_file(
            &req,
            UploadRequest {
                allocation_id: ALLOCATION.into(),
                connection_id: CONNECTION.into(),
                path: FILE.into(),
                mode: UploadMode::Insert,
                data: Bytes::from(data),
                thumbnail: None,
                mime_type: "application/octet-stream".into(),
                expected_content_hash: None,
                expected_merkle_root: None,
                expected_thumbnail_hash: None,
            },
        )
        .await?;

    let now = Timestamp::now();
    let marker = client_marker(&meta, &config, &owner, CONNECTION, None, now)?;
    let committed = ctx
        .commit_write(
            &req,
            CommitRequest {
                allocation_id: ALLOCATION.into(),
                connection_id: CONNECTION.into(),
                write_marker: marker,
            },
        )
        .await?;
    info!(allocation_root = %committed.allocation_root, "demo commit accepted");

    let read_marker = UnsignedReadMarker {
        allocation_id: ALLOCATION.into(),
        blobber_id: config.blobber_id.clone(),
        owner_id: owner.client_id(),
        read_counter: 1,
        timestamp: now,
    }
    .sign(&owner);
    let downloaded = ctx
        .download_file(
            &req,
            DownloadRequest {
                allocation_id: ALLOCATION.into(),
                file: FileLocator::Path(FILE.into()),
                block_num: 0,
                num_blocks: Some(1),
                read_marker,
                auth_ticket: None,
                content: ContentKind::Content,
            },
        )
        .await?;

    // A second connection built on the empty allocation is stale by now.
    let stale_connection = "demo-connection-stale";
    ctx.delete_file(&req, ALLOCATION, stale_connection, FILE).await?;
    let stale = client_marker(&meta, &config, &owner, stale_connection, None, now)?;
    let replay = match ctx
        .commit_write(
            &req,
            CommitRequest {
                allocation_id: ALLOCATION.into(),
                connection_id: stale_connection.into(),
                write_marker: stale,
            },
        )
        .await
    {
        Err(err @ CoreError::RejectedRoot { .. }) => err.to_string(),
        Err(err) => return Err(err.into()),
        Ok(_) => anyhow::bail!("stale write marker was accepted"),
    };
    let chain = ctx.verify_write_marker_chain(ALLOCATION)?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "upload": uploaded,
                "commit": committed,
                "downloaded_bytes": downloaded.data.len(),
                "replay": replay,
                "write_markers": chain,
            }))?
        ),
        OutputFormat::Text => {
            println!("{} Staged {} ({} bytes)", "✓".green().bold(), uploaded.path.bold(), uploaded.size);
            println!("  Content: {}", uploaded.content_hash.short_hex().cyan());
            println!("{} Commit accepted", "✓".green().bold());
            println!("  Allocation root: {}", committed.allocation_root.to_hex().yellow());
            println!("{} Read block 0: {} bytes", "✓".green().bold(), downloaded.data.len());
            println!("{} Replay rejected: {}", "✓".green().bold(), replay.dimmed());
            println!("  Write marker chain: {} link(s), intact", chain);
        }
    }
    Ok(())
}

/// What a client does before committing: replay the staged changes on its
/// copy of the tree and sign the resulting root.
fn client_marker(
    meta: &InMemoryMetaStore,
    config: &BlobberConfig,
    owner: &SigningKey,
    connection_id: &str,
    previous_allocation_root: Option<Digest>,
    at: Timestamp,
) -> anyhow::Result<WriteMarker> {
    let connection = meta
        .connection(connection_id)?
        .with_context(|| format!("connection {connection_id} missing"))?;
    let mut tree = meta
        .reference_tree(ALLOCATION)?
        .unwrap_or_else(|| ReferenceTree::new(ALLOCATION, config.chunk_size));
    connection.apply_changes(&mut tree, at)?;
    Ok(UnsignedWriteMarker {
        allocation_root: allocation_root(&tree.compute_root(false), at),
        previous_allocation_root,
        allocation_id: ALLOCATION.into(),
        size: connection.size,
        blobber_id: config.blobber_id.clone(),
        timestamp: at,
    }
    .sign(owner))
}

fn seed_allocation(
    meta: &InMemoryMetaStore,
    owner: &SigningKey,
    config: &BlobberConfig,
) -> anyhow::Result<()> {
    let mut batch = WriteBatch::new();
    batch.put_allocation(Allocation {
        id: ALLOCATION.into(),
        tx: format!("{ALLOCATION}-tx"),
        owner_id: owner.client_id(),
        owner_public_key: owner.verifying_key(),
        payer_id: owner.client_id(),
        repairer_id: None,
        size: 1 << 30,
        used_size: 0,
        blobber_size: 1 << 30,
        blobber_size_used: 0,
        expiration: Timestamp::now().add_secs(3600),
        is_immutable: false,
        allocation_root: None,
        is_redeem_required: false,
        terms: vec![BlobberTerms {
            blobber_id: config.blobber_id.clone(),
            read_price: 0,
            write_price: 0,
        }],
    });
    meta.commit(batch)?;
    Ok(())
}
