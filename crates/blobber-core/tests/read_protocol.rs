mod common;

use bytes::Bytes;

use blobber_core::{
    ContentKind, CoreError, DownloadRequest, DownloadResponse, FileLocator, RequestContext,
    UploadMode, UploadRequest,
};
use blobber_crypto::{lookup_hash, SigningKey};
use blobber_markers::{AuthTicket, MarkerError, ReadMarker, UnsignedAuthTicket};
use blobber_reftree::RefType;
use blobber_store::MetaStore;
use blobber_types::Timestamp;

use common::{ts, Fixture, ALLOCATION, GIB};

const FILE: &str = "/docs/a.bin";

async fn committed(f: &Fixture) {
    let data: Vec<u8> = (0..200u8).collect();
    f.upload("conn-1", FILE, &data).await;
    f.commit("conn-1", ts(1)).await.unwrap();
}

fn request(marker: ReadMarker, block_num: u64, num_blocks: u64) -> DownloadRequest {
    DownloadRequest {
        allocation_id: ALLOCATION.into(),
        file: FileLocator::Path(FILE.into()),
        block_num,
        num_blocks: Some(num_blocks),
        read_marker: marker,
        auth_ticket: None,
        content: ContentKind::Content,
    }
}

async fn download(
    f: &Fixture,
    req: &RequestContext,
    request: DownloadRequest,
) -> Result<DownloadResponse, CoreError> {
    f.ctx.download_file(req, request).await
}

fn ticket(f: &Fixture, grantee: Option<&SigningKey>, path: &str, ref_type: RefType) -> AuthTicket {
    UnsignedAuthTicket {
        client_id: grantee.map(SigningKey::client_id),
        allocation_id: ALLOCATION.into(),
        file_path_hash: lookup_hash(ALLOCATION, path),
        file_name: path.rsplit('/').next().unwrap_or_default().into(),
        ref_type,
        expiration: Timestamp::from_secs(0),
        timestamp: Timestamp::now(),
    }
    .sign(&f.owner)
}

#[tokio::test]
async fn first_marker_is_accepted_and_stored() {
    let f = Fixture::new();
    committed(&f).await;

    let marker = f.read_marker(&f.owner, 1);
    let response = download(&f, &f.owner_req(), request(marker, 0, 1)).await.unwrap();
    assert!(response.success);
    assert_eq!(response.path, FILE);
    assert_eq!(response.data, Bytes::from((0..64u8).collect::<Vec<_>>()));
    assert!(response.latest_rm.is_none());

    let stored = f
        .meta
        .read_marker(ALLOCATION, &f.owner.client_id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.latest.read_counter, 1);
}

#[tokio::test]
async fn counter_gap_returns_latest_marker() {
    let f = Fixture::new();
    committed(&f).await;
    let req = f.owner_req();
    download(&f, &req, request(f.read_marker(&f.owner, 1), 0, 1))
        .await
        .unwrap();

    let response = download(&f, &req, request(f.read_marker(&f.owner, 5), 1, 1))
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.data.is_empty());
    assert_eq!(response.latest_rm.unwrap().read_counter, 1);
    let stored = f
        .meta
        .read_marker(ALLOCATION, &f.owner.client_id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.latest.read_counter, 1);

    let response = download(&f, &req, request(f.read_marker(&f.owner, 3), 1, 2))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data.len(), 128);
}

#[tokio::test]
async fn reads_need_pool_balance() {
    let f = Fixture::with_prices(GIB, 0);
    committed(&f).await;
    let owner = f.owner.client_id();

    let err = download(&f, &f.owner_req(), request(f.read_marker(&f.owner, 1), 0, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds { want: 64, have: 0 }));
    assert!(f.meta.read_marker(ALLOCATION, &owner).unwrap().is_none());
    assert_eq!(f.ledger.request_count(), 1);

    f.fund(owner, 1_000, 0);
    let response = download(&f, &f.owner_req(), request(f.read_marker(&f.owner, 1), 0, 1))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(f.ledger.request_count(), 2);
}

#[tokio::test]
async fn marker_for_another_blobber_is_invalid() {
    let f = Fixture::new();
    committed(&f).await;
    let mut marker = f.read_marker(&f.owner, 1);
    marker.blobber_id = "elsewhere".into();

    let err = download(&f, &f.owner_req(), request(marker, 0, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidMarker(MarkerError::BlobberMismatch { .. })
    ));
}

#[tokio::test]
async fn shared_directory_ticket_allows_reads() {
    let f = Fixture::new();
    committed(&f).await;
    let reader = SigningKey::generate();
    let req = RequestContext::with_key(reader.verifying_key());

    let err = download(&f, &req, request(f.read_marker(&reader, 1), 0, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let mut with_ticket = request(f.read_marker(&reader, 1), 0, 1);
    with_ticket.auth_ticket = Some(ticket(&f, Some(&reader), "/docs", RefType::Directory));
    let response = download(&f, &req, with_ticket).await.unwrap();
    assert!(response.success);
    assert!(f
        .meta
        .read_marker(ALLOCATION, &reader.client_id())
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn ticket_for_someone_else_is_refused() {
    let f = Fixture::new();
    committed(&f).await;
    let reader = SigningKey::generate();
    let other = SigningKey::generate();

    let mut with_ticket = request(f.read_marker(&reader, 1), 0, 1);
    with_ticket.auth_ticket = Some(ticket(&f, Some(&other), FILE, RefType::File));
    let err = download(&f, &RequestContext::with_key(reader.verifying_key()), with_ticket)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
}

#[tokio::test]
async fn thumbnails_are_served_separately() {
    let f = Fixture::new();
    f.ctx
        .write_file(
            &f.owner_req(),
            UploadRequest {
                allocation_id: ALLOCATION.into(),
                connection_id: "conn-1".into(),
                path: "/pic.png".into(),
                mode: UploadMode::Insert,
                data: Bytes::from_static(b"full image bytes"),
                thumbnail: Some(Bytes::from_static(b"thumb")),
                mime_type: "image/png".into(),
                expected_content_hash: None,
                expected_merkle_root: None,
                expected_thumbnail_hash: None,
            },
        )
        .await
        .unwrap();
    f.commit("conn-1", ts(1)).await.unwrap();

    let mut thumb = request(f.read_marker(&f.owner, 1), 0, 1);
    thumb.file = FileLocator::LookupHash(lookup_hash(ALLOCATION, "/pic.png"));
    thumb.content = ContentKind::Thumbnail;
    let response = download(&f, &f.owner_req(), thumb).await.unwrap();
    assert_eq!(response.data, Bytes::from_static(b"thumb"));

    let node = f.tree().unwrap().get("/pic.png").cloned().unwrap();
    assert_eq!(node.thumbnail_size, 5);
    assert_eq!(node.size, 16);
}

#[tokio::test]
async fn directories_cannot_be_downloaded() {
    let f = Fixture::new();
    committed(&f).await;
    let mut dir = request(f.read_marker(&f.owner, 1), 0, 1);
    dir.file = FileLocator::Path("/docs".into());
    let err = download(&f, &f.owner_req(), dir).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidParameters(_)));
}

#[tokio::test]
async fn payer_reads_on_its_own_pool_without_a_ticket() {
    let f = Fixture::with_prices(GIB, 0);
    committed(&f).await;
    let payer = SigningKey::generate();
    let mut allocation = f.allocation();
    allocation.payer_id = payer.client_id();
    f.replace_allocation(allocation);
    f.fund(payer.client_id(), 1_000, 0);

    let req = RequestContext::with_key(payer.verifying_key());
    let response = download(&f, &req, request(f.read_marker(&payer, 1), 0, 1))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data.len(), 64);

    let stranger = SigningKey::generate();
    let err = download(
        &f,
        &RequestContext::with_key(stranger.verifying_key()),
        request(f.read_marker(&stranger, 1), 0, 1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
}

#[tokio::test]
async fn block_count_defaults_to_one_and_zero_reads_nothing() {
    let f = Fixture::with_prices(GIB, 0);
    committed(&f).await;
    let owner = f.owner.client_id();
    f.fund(owner, 1_000, 0);
    let req = f.owner_req();

    let mut default = request(f.read_marker(&f.owner, 1), 0, 1);
    default.num_blocks = None;
    let response = download(&f, &req, default).await.unwrap();
    assert!(response.success);
    assert_eq!(response.data.len(), 64);

    // Same counter again: nothing served, nothing owed.
    f.fund(owner, 0, 0);
    let requests = f.ledger.request_count();
    let response = download(&f, &req, request(f.read_marker(&f.owner, 1), 0, 0))
        .await
        .unwrap();
    assert!(response.success);
    assert!(response.data.is_empty());
    assert_eq!(f.ledger.request_count(), requests);

    let stats = f
        .meta
        .file_stats(ALLOCATION, &lookup_hash(ALLOCATION, FILE))
        .unwrap()
        .unwrap();
    assert_eq!(stats.num_block_downloads, 2);
    assert_eq!(stats.num_updates, 1);
}
