const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '；', ';'];

/// Splits `text` into paragraphs (one per line) and each paragraph into
/// chunks of at most `limit` characters.
///
/// Concatenating the chunks of a paragraph gives back the paragraph exactly.
/// Blank paragraphs yield no chunks. A `limit` of zero disables splitting.
pub fn split_into_chunks(text: &str, limit: usize) -> Vec<Vec<String>> {
    text.split('\n')
        .map(|paragraph| {
            let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
            if paragraph.trim().is_empty() {
                vec![]
            } else if limit == 0 || char_len(paragraph) <= limit {
                vec![paragraph.to_string()]
            } else {
                group_sentences(split_sentences(paragraph), limit)
            }
        })
        .collect()
}

/// Sentences of a paragraph, each keeping its terminator. Whitespace after a
/// terminator starts the next sentence.
pub fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = vec![];
    let mut start = 0;

    let mut chars = paragraph.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }
        // keep runs like "?!" or "..." together
        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if !SENTENCE_TERMINATORS.contains(&next) {
                break;
            }
            end = next_idx + next.len_utf8();
            chars.next();
        }
        sentences.push(&paragraph[start..end]);
        start = end;
    }

    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }

    sentences
}

fn group_sentences(sentences: Vec<&str>, limit: usize) -> Vec<String> {
    let mut chunks = vec![];
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences {
        let len = char_len(sentence);

        if len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(hard_split(sentence, limit));
            continue;
        }

        if current_len + len > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn hard_split(sentence: &str, limit: usize) -> Vec<String> {
    let chars = sentence.chars().collect::<Vec<_>>();
    chars
        .chunks(limit)
        .map(|v| v.iter().collect::<String>())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk_per_paragraph() {
        let chunks = split_into_chunks("a cat.\n\nsleeping on a sofa.", 500);
        assert_eq!(
            chunks,
            vec![
                vec!["a cat.".to_string()],
                vec![],
                vec!["sleeping on a sofa.".to_string()]
            ]
        );
    }

    #[test]
    fn test_sentences_keep_terminators() {
        assert_eq!(
            split_sentences("One. Two?! 三。四；tail"),
            vec!["One.", " Two?!", " 三。", "四；", "tail"]
        );
    }

    #[test]
    fn test_chunks_cover_every_sentence_once() {
        let paragraph = "The quick brown fox jumps. Over the lazy dog! \
                         Is it raining? 天空很蓝。 A very long run-on sentence without any stop at all here";
        let limit = 30;
        let chunks = split_into_chunks(paragraph, limit);
        assert_eq!(chunks.len(), 1);

        let chunks = &chunks[0];
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|v| v.chars().count() <= limit));
        assert_eq!(chunks.concat(), paragraph);

        for sentence in split_sentences(paragraph) {
            if sentence.chars().count() <= limit {
                let found = chunks.iter().filter(|v| v.contains(sentence)).count();
                assert_eq!(found, 1, "sentence {:?} found {} times", sentence, found);
            }
        }
    }

    #[test]
    fn test_hard_split_respects_char_boundaries() {
        let paragraph = "汉字".repeat(10);
        let chunks = split_into_chunks(&paragraph, 3);
        let chunks = &chunks[0];
        assert_eq!(chunks.len(), 7);
        assert_eq!(chunks[0], "汉字汉");
        assert_eq!(chunks.concat(), paragraph);
    }

    #[test]
    fn test_zero_limit_disables_splitting() {
        let text = "a. b. c.";
        assert_eq!(split_into_chunks(text, 0), vec![vec![text.to_string()]]);
    }
}
