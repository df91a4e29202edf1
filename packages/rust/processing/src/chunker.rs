//! Fixed-size segmentation of cleaned chunks.

use std::iter::FusedIterator;
use std::num::NonZeroUsize;

use slmforge_shared::RawChunk;

/// Metadata key holding a segment's 0-based position within its parent.
pub const CHUNK_IDX_KEY: &str = "chunk_idx";

const SEGMENT_SUFFIX: &str = "::chunk";

/// Split `chunk` into contiguous segments of at most `max_chars` characters.
///
/// Segments are produced left to right without overlap, so concatenating
/// their contents gives back the parent content exactly. Empty content yields
/// no segments. Every segment gets id `<parent id>::chunk<idx>` and the
/// parent's metadata plus [`CHUNK_IDX_KEY`], even when there is only one.
pub fn segment(chunk: &RawChunk, max_chars: NonZeroUsize) -> Segments<'_> {
    Segments {
        parent: chunk,
        rest: &chunk.content,
        max_chars: max_chars.get(),
        index: 0,
    }
}

/// Lazy iterator returned by [`segment`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    parent: &'a RawChunk,
    rest: &'a str,
    max_chars: usize,
    index: usize,
}

impl Iterator for Segments<'_> {
    type Item = RawChunk;

    fn next(&mut self) -> Option<RawChunk> {
        if self.rest.is_empty() {
            return None;
        }

        // Byte offset just past the first `max_chars` characters.
        let end = self
            .rest
            .char_indices()
            .nth(self.max_chars)
            .map_or(self.rest.len(), |(offset, _)| offset);
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;

        let idx = self.index;
        self.index += 1;

        Some(
            self.parent
                .derive(format!("{}{SEGMENT_SUFFIX}{idx}", self.parent.id), head)
                .with_meta(CHUNK_IDX_KEY, idx),
        )
    }
}

impl FusedIterator for Segments<'_> {}

/// Id of the chunk a segment was cut from, or `id` itself if it has no
/// segment suffix.
pub fn parent_id(id: &str) -> &str {
    match id.rsplit_once(SEGMENT_SUFFIX) {
        Some((parent, idx)) if !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()) => parent,
        _ => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    fn chunk(content: &str) -> RawChunk {
        RawChunk::new("/docs/note.txt", "document:.txt", "/docs/note.txt", content)
            .with_meta("ext", ".txt")
    }

    #[test]
    fn splits_left_to_right() {
        let parent = chunk("Hello world Foo");
        let parts: Vec<RawChunk> = segment(&parent, max(10)).collect();

        let contents: Vec<&str> = parts.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello worl", "d Foo"]);
        assert_eq!(parts[0].id, "/docs/note.txt::chunk0");
        assert_eq!(parts[1].id, "/docs/note.txt::chunk1");
        assert_eq!(parts[1].metadata[CHUNK_IDX_KEY], 1);
    }

    #[test]
    fn segment_count_is_ceiling() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        for m in 1..=40 {
            for len in [0, 1, 9, 10, 11, 26, 36] {
                let parent = chunk(&text[..len]);
                let parts: Vec<RawChunk> = segment(&parent, max(m)).collect();
                assert_eq!(parts.len(), len.div_ceil(m), "len {len}, m {m}");
                assert!(parts.iter().all(|p| p.content.chars().count() <= m));
                let joined: String = parts.iter().map(|p| p.content.as_str()).collect();
                assert_eq!(joined, parent.content);
            }
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let parent = chunk("日本語のテキスト");
        let parts: Vec<RawChunk> = segment(&parent, max(3)).collect();
        let contents: Vec<&str> = parts.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["日本語", "のテキ", "スト"]);
    }

    #[test]
    fn short_content_still_rewrites_identity() {
        let parent = chunk("short");
        let parts: Vec<RawChunk> = segment(&parent, max(100)).collect();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content, "short");
        assert_eq!(parts[0].id, "/docs/note.txt::chunk0");
        assert_eq!(parts[0].metadata[CHUNK_IDX_KEY], 0);
    }

    #[test]
    fn metadata_and_lineage_propagate() {
        let parent = chunk("0123456789abc").with_meta("row_index", 7);
        for part in segment(&parent, max(5)) {
            assert_eq!(part.source_type, parent.source_type);
            assert_eq!(part.source_uri, parent.source_uri);
            assert_eq!(part.metadata["ext"], ".txt");
            assert_eq!(part.metadata["row_index"], 7);
            assert!(part.metadata.contains_key(CHUNK_IDX_KEY));
        }
    }

    #[test]
    fn parent_id_strips_segment_suffix() {
        let parent = chunk("0123456789");
        for part in segment(&parent, max(4)) {
            assert_eq!(parent_id(&part.id), parent.id);
        }
        assert_eq!(parent_id("table:users:3"), "table:users:3");
        assert_eq!(parent_id("a::chunkx"), "a::chunkx");
        assert_eq!(parent_id("a::chunk1::chunk0"), "a::chunk1");
    }
}
