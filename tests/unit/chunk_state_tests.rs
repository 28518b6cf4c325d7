use dropgate::models::chunk::ChunkUploadState;
use dropgate::AppError;

fn state(total: u32) -> ChunkUploadState {
    ChunkUploadState::new(
        "acme".into(),
        "upload-1".into(),
        "big.zip".into(),
        total,
        None,
        None,
    )
}

#[test]
fn chunks_accumulate_until_complete() {
    let mut state = state(3);
    assert!(!state.is_complete());

    state.record_chunk(2).unwrap();
    state.record_chunk(0).unwrap();
    assert_eq!(state.received_count(), 2);
    assert!(!state.is_complete());

    state.record_chunk(1).unwrap();
    assert!(state.is_complete());
}

#[test]
fn duplicate_chunks_are_idempotent() {
    let mut state = state(2);
    state.record_chunk(0).unwrap();
    state.record_chunk(0).unwrap();
    assert_eq!(state.received_count(), 1);
}

#[test]
fn out_of_range_index_is_rejected() {
    let mut state = state(2);
    let err = state.record_chunk(2).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(state.received_count(), 0);
}

#[test]
fn chunk_file_names_are_zero_padded() {
    assert_eq!(ChunkUploadState::chunk_file_name(0), "chunk_000000");
    assert_eq!(ChunkUploadState::chunk_file_name(7), "chunk_000007");
    assert_eq!(ChunkUploadState::chunk_file_name(123_456), "chunk_123456");
}
