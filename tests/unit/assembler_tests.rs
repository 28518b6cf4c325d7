use std::sync::Arc;

use tempfile::TempDir;

use dropgate::assembler::{ChunkAssembler, ChunkUploadMeta};
use dropgate::checksum::sha256_hex;
use dropgate::persistence::db;
use dropgate::AppError;

async fn assembler() -> (ChunkAssembler, TempDir) {
    let scratch = TempDir::new().expect("tempdir");
    let pool = db::connect_memory().await.expect("in-memory db");
    let assembler = ChunkAssembler::new(scratch.path().to_path_buf(), Arc::new(pool));
    (assembler, scratch)
}

fn meta(total: u32, file_hash: Option<String>) -> ChunkUploadMeta {
    ChunkUploadMeta {
        relative_path: "big.bin".into(),
        total_chunks: total,
        expected_checksum: file_hash,
        expected_size: None,
    }
}

#[tokio::test]
async fn out_of_order_chunks_assemble_verified() {
    let (assembler, _scratch) = assembler().await;
    let chunks: Vec<Vec<u8>> = vec![vec![b'a'; 64 * 1024], vec![b'b'; 64 * 1024], vec![b'c'; 100]];
    let whole: Vec<u8> = chunks.concat();
    let file_hash = sha256_hex(&whole);

    for index in [1u32, 0, 2] {
        let ack = assembler
            .put_chunk(
                "acme",
                "u1",
                index,
                meta(3, Some(file_hash.clone())),
                &chunks[index as usize],
                None,
            )
            .await
            .expect("put chunk");
        assert_eq!(ack.total_chunks, 3);
    }

    let assembled = assembler
        .finalize_assembly("acme", "u1")
        .await
        .expect("finalize");
    assert_eq!(assembled.size, whole.len() as u64);
    assert_eq!(assembled.checksum, file_hash);
    assert!(assembled.integrity_verified);
    assert_eq!(assembled.relative_path, "big.bin");

    let on_disk = tokio::fs::read(&assembled.path).await.expect("read output");
    assert_eq!(on_disk, whole);

    // Scratch state is gone once assembly succeeded.
    assert!(matches!(
        assembler.finalize_assembly("acme", "u1").await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn duplicate_chunks_do_not_inflate_progress() {
    let (assembler, _scratch) = assembler().await;

    let first = assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"data", None)
        .await
        .expect("put");
    assert_eq!(first.chunks_received, 1);
    assert!(!first.complete);

    let again = assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"data", None)
        .await
        .expect("duplicate put");
    assert_eq!(again.chunks_received, 1);
    assert!(!again.complete);
}

#[tokio::test]
async fn incomplete_finalize_reports_counts_and_keeps_scratch() {
    let (assembler, _scratch) = assembler().await;
    assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"first", None)
        .await
        .expect("put");

    let err = assembler.finalize_assembly("acme", "u1").await.unwrap_err();
    assert_eq!(
        err,
        AppError::IncompleteUpload {
            received: 1,
            expected: 2
        }
    );

    // The upload can still be completed afterwards.
    assembler
        .put_chunk("acme", "u1", 1, meta(2, None), b"second", None)
        .await
        .expect("put remaining");
    let assembled = assembler
        .finalize_assembly("acme", "u1")
        .await
        .expect("finalize");
    assert_eq!(assembled.size, 11);
}

#[tokio::test]
async fn chunk_checksum_mismatch_rejects_without_storing() {
    let (assembler, _scratch) = assembler().await;

    let err = assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"payload", Some("0000"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ChunkMismatch(_)));

    // The rejected chunk left no trace; a correct resend starts at one.
    let hash = sha256_hex(b"payload");
    let ack = assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"payload", Some(hash.as_str()))
        .await
        .expect("correct resend");
    assert_eq!(ack.chunks_received, 1);
}

#[tokio::test]
async fn contradictory_total_is_rejected() {
    let (assembler, _scratch) = assembler().await;
    assembler
        .put_chunk("acme", "u1", 0, meta(3, None), b"x", None)
        .await
        .expect("put");

    let err = assembler
        .put_chunk("acme", "u1", 1, meta(4, None), b"y", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn declared_file_hash_mismatch_is_flagged_not_fatal() {
    let (assembler, _scratch) = assembler().await;
    assembler
        .put_chunk("acme", "u1", 0, meta(1, Some("f00d".into())), b"bytes", None)
        .await
        .expect("put");

    let assembled = assembler
        .finalize_assembly("acme", "u1")
        .await
        .expect("finalize");
    assert!(!assembled.integrity_verified);
    assert_eq!(assembled.expected_checksum.as_deref(), Some("f00d"));
    assert_eq!(assembled.checksum, sha256_hex(b"bytes"));
}

#[tokio::test]
async fn chunk_file_lost_on_disk_aborts_and_releases() {
    let (assembler, scratch) = assembler().await;
    for index in 0..2u32 {
        assembler
            .put_chunk("acme", "u1", index, meta(2, None), b"chunk", None)
            .await
            .expect("put");
    }

    let lost = scratch.path().join("acme").join("u1").join("chunk_000001");
    tokio::fs::remove_file(&lost).await.expect("remove chunk file");

    let err = assembler.finalize_assembly("acme", "u1").await.unwrap_err();
    assert_eq!(err, AppError::MissingChunk(1));

    // The broken upload is gone, not stuck.
    assert!(matches!(
        assembler.finalize_assembly("acme", "u1").await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn abandon_drops_state_and_scratch() {
    let (assembler, scratch) = assembler().await;
    assembler
        .put_chunk("acme", "u1", 0, meta(2, None), b"chunk", None)
        .await
        .expect("put");

    assembler.abandon("acme", "u1").await.expect("abandon");

    assert!(!scratch.path().join("acme").join("u1").exists());
    assert!(matches!(
        assembler.finalize_assembly("acme", "u1").await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn hostile_upload_ids_are_rejected() {
    let (assembler, _scratch) = assembler().await;
    for bad in ["../evil", "a/b", "", "white space"] {
        let err = assembler
            .put_chunk("acme", bad, 0, meta(1, None), b"x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "id {bad:?}");
    }
}

#[tokio::test]
async fn zero_total_is_rejected() {
    let (assembler, _scratch) = assembler().await;
    let err = assembler
        .put_chunk("acme", "u1", 0, meta(0, None), b"x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
