//! Parses a chunked byte source of NUL-delimited commit-log records into a
//! lazy sequence of decoded [`Record`]s.

use crate::error::{Result, WarpError};
use futures::stream::{self, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A chunk yielded by the underlying byte source — either raw bytes or
/// text the producer already decoded. Both are folded into the same
/// binary accumulation buffer; only a complete record is ever UTF-8
/// decoded, so a multi-byte character split across chunk boundaries is
/// handled correctly regardless of which form the chunks arrive in.
#[derive(Clone, Debug)]
pub enum Chunk {
    Bytes(Vec<u8>),
    Text(String),
}

impl Chunk {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Chunk::Bytes(bytes) => bytes,
            Chunk::Text(text) => text.into_bytes(),
        }
    }
}

/// A decoded log record: `sha\nauthor\ndate\nparents\nmessage...` split on
/// the first three newlines, with the message body (lines 4+) preserved
/// verbatim including any embedded newlines.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub sha: String,
    pub author: String,
    pub date: String,
    pub parents: Vec<String>,
    pub message: String,
}

/// A cooperative cancellation flag shared between the caller and an
/// in-flight [`parse_records`] stream.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct State<S> {
    chunks: S,
    buffer: Vec<u8>,
    abort: AbortHandle,
    exhausted: bool,
    aborted: bool,
}

/// Parses `chunks` into a lazy, finite stream of decoded records. Invalid
/// records (fewer than 4 lines, empty SHA, empty message) are silently
/// skipped rather than surfaced. When `abort` is signaled, the stream
/// yields a single `OPERATION_ABORTED` error and ends.
pub fn parse_records<S>(chunks: S, abort: AbortHandle) -> impl Stream<Item = Result<Record>>
where
    S: Stream<Item = Chunk> + Unpin + 'static,
{
    stream::unfold(
        State {
            chunks,
            buffer: Vec::new(),
            abort,
            exhausted: false,
            aborted: false,
        },
        |mut state| async move {
            loop {
                if state.aborted {
                    return None;
                }

                if state.abort.is_aborted() {
                    state.aborted = true;
                    return Some((
                        Err(WarpError::OperationAborted {
                            context: "record stream".to_string(),
                        }),
                        state,
                    ));
                }

                if let Some(pos) = state.buffer.iter().position(|&b| b == 0) {
                    let mut raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                    raw.pop(); // drop the NUL delimiter itself
                    match decode_record(&raw) {
                        Some(record) => return Some((Ok(record), state)),
                        None => continue,
                    }
                }

                if state.exhausted {
                    if state.buffer.is_empty() {
                        return None;
                    }
                    let raw = std::mem::take(&mut state.buffer);
                    return match decode_record(&raw) {
                        Some(record) => Some((Ok(record), state)),
                        None => None,
                    };
                }

                match state.chunks.next().await {
                    Some(chunk) => {
                        state.buffer.extend(chunk.into_bytes());
                    }
                    None => {
                        state.exhausted = true;
                    }
                }
            }
        },
    )
}

/// Decodes one NUL-delimited record's raw bytes. `None` means the record
/// fails validation and must be silently skipped.
fn decode_record(bytes: &[u8]) -> Option<Record> {
    let first_nl = bytes.iter().position(|&b| b == b'\n')?;
    let second_nl = first_nl + 1 + bytes[first_nl + 1..].iter().position(|&b| b == b'\n')?;
    let third_nl = second_nl + 1 + bytes[second_nl + 1..].iter().position(|&b| b == b'\n')?;
    let fourth_nl = third_nl + 1 + bytes[third_nl + 1..].iter().position(|&b| b == b'\n')?;

    let sha = std::str::from_utf8(&bytes[..first_nl]).ok()?;
    let author = std::str::from_utf8(&bytes[first_nl + 1..second_nl]).ok()?;
    let date = std::str::from_utf8(&bytes[second_nl + 1..third_nl]).ok()?;
    let parents_line = std::str::from_utf8(&bytes[third_nl + 1..fourth_nl]).ok()?;
    let message = std::str::from_utf8(&bytes[fourth_nl + 1..]).ok()?;

    if sha.is_empty() || sha.len() != 40 || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if message.is_empty() {
        return None;
    }

    let parents = parents_line
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Some(Record {
        sha: sha.to_string(),
        author: author.to_string(),
        date: date.to_string(),
        parents,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(sha: &str, author: &str, date: &str, parents: &str, message: &str) -> Vec<u8> {
        let mut bytes = format!("{sha}\n{author}\n{date}\n{parents}\n").into_bytes();
        bytes.extend_from_slice(message.as_bytes());
        bytes
    }

    async fn collect(chunks: Vec<Chunk>) -> Vec<Result<Record>> {
        let abort = AbortHandle::new();
        parse_records(stream::iter(chunks), abort).collect().await
    }

    #[async_std::test]
    async fn parses_single_record() {
        let sha = "a".repeat(40);
        let mut bytes = record_bytes(&sha, "alice", "2026-01-01", "p1 p2", "hello world");
        bytes.push(0);
        let results = collect(vec![Chunk::Bytes(bytes)]).await;
        assert_eq!(results.len(), 1);
        let record = results[0].as_ref().unwrap();
        assert_eq!(record.sha, sha);
        assert_eq!(record.author, "alice");
        assert_eq!(record.parents, vec!["p1".to_string(), "p2".to_string()]);
        assert_eq!(record.message, "hello world");
    }

    #[async_std::test]
    async fn message_body_preserves_embedded_newlines() {
        let sha = "b".repeat(40);
        let mut bytes = record_bytes(&sha, "alice", "2026-01-01", "", "line one\nline two\nline three");
        bytes.push(0);
        let results = collect(vec![Chunk::Bytes(bytes)]).await;
        assert_eq!(results[0].as_ref().unwrap().message, "line one\nline two\nline three");
    }

    #[async_std::test]
    async fn empty_sha_is_skipped() {
        let mut bytes = b"\nalice\n2026-01-01\n\nmessage".to_vec();
        bytes.push(0);
        let sha2 = "c".repeat(40);
        bytes.extend(record_bytes(&sha2, "bob", "2026-01-02", "", "second message"));
        bytes.push(0);
        let results = collect(vec![Chunk::Bytes(bytes)]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().sha, sha2);
    }

    #[async_std::test]
    async fn fewer_than_four_lines_is_skipped() {
        let mut bytes = format!("{}\nalice\n2026-01-01\n", "d".repeat(40)).into_bytes();
        bytes.push(0);
        let sha2 = "e".repeat(40);
        bytes.extend(record_bytes(&sha2, "bob", "2026-01-02", "", "second message"));
        bytes.push(0);
        let results = collect(vec![Chunk::Bytes(bytes)]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().sha, sha2);
    }

    #[async_std::test]
    async fn utf8_character_split_across_chunk_boundary_decodes_correctly() {
        let sha = "f".repeat(40);
        let mut full = record_bytes(&sha, "alice", "2026-01-01", "", "caf\u{e9} noted");
        full.push(0);
        // Split mid-way through the 2-byte UTF-8 encoding of 'é'.
        let split_at = full.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let (first, second) = full.split_at(split_at);
        let results = collect(vec![Chunk::Bytes(first.to_vec()), Chunk::Bytes(second.to_vec())]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().message, "caf\u{e9} noted");
    }

    #[async_std::test]
    async fn trailing_unterminated_record_is_processed() {
        let sha = "1".repeat(40);
        let bytes = record_bytes(&sha, "alice", "2026-01-01", "", "no trailing nul");
        let results = collect(vec![Chunk::Bytes(bytes)]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().message, "no trailing nul");
    }

    #[async_std::test]
    async fn text_chunks_are_accepted() {
        let sha = "2".repeat(40);
        let text = format!("{sha}\nalice\n2026-01-01\n\nhello");
        let results = collect(vec![Chunk::Text(format!("{text}\0"))]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().sha, sha);
    }

    #[async_std::test]
    async fn aborted_handle_yields_operation_aborted() {
        let sha = "3".repeat(40);
        let mut bytes = record_bytes(&sha, "alice", "2026-01-01", "", "message");
        bytes.push(0);
        let abort = AbortHandle::new();
        abort.abort();
        let results: Vec<_> = parse_records(stream::iter(vec![Chunk::Bytes(bytes)]), abort)
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(WarpError::OperationAborted { .. })));
    }
}
