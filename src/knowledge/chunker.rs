//! Text Chunking Module
//!
//! 문장 경계를 존중하는 텍스트 분할을 제공합니다.
//! 청크는 문장 단위로 누적되며, 다음 청크는 이전 청크의 마지막 문장들로 시작합니다.

use std::collections::HashSet;

use crate::models::Chunk;

/// 기본 약어 목록 (문장 끝으로 보지 않음)
pub const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "Sr.", "Jr.", "St.", "vs.", "etc.", "e.g.", "i.e.",
    "Inc.", "Ltd.", "Co.", "No.", "Fig.",
];

/// 단어 앞뒤의 따옴표/괄호
const OPENING_PUNCT: &[char] = &['"', '\'', '(', '[', '“', '‘'];
const CLOSING_PUNCT: &[char] = &['"', '\'', ')', ']', '”', '’'];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수, 헤더 제외)
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수, 문장 단위로 올림)
    pub overlap_characters: usize,
    /// 문장 끝으로 보지 않을 약어
    pub abbreviations: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 800,
            overlap_characters: 100,
            abbreviations: DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkConfig {
    /// 크기/오버랩 지정
    pub fn new(max_characters: usize, overlap_characters: usize) -> Self {
        Self {
            max_characters,
            overlap_characters,
            ..Default::default()
        }
    }
}

// ============================================================================
// Sentence Splitter
// ============================================================================

/// 약어 인식 문장 분리기
///
/// `.`/`!`/`?` 뒤에 공백과 소문자가 아닌 문자가 오거나 텍스트가 끝나면 문장 끝입니다.
/// 약어 목록에 있는 단어, 한 글자 이니셜(`J.`), 소문자로 이어지는 경우는 문장 끝이 아닙니다.
/// 문장 내부 공백(줄바꿈 포함)은 원문 그대로 유지됩니다.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    abbreviations: HashSet<String>,
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()))
    }
}

impl SentenceSplitter {
    /// 약어 목록으로 생성
    pub fn new(abbreviations: impl IntoIterator<Item = String>) -> Self {
        Self {
            abbreviations: abbreviations.into_iter().collect(),
        }
    }

    /// 텍스트를 문장으로 분할
    ///
    /// 각 문장은 원문 조각 그대로이며 앞뒤 공백만 제외됩니다.
    pub fn split(&self, text: &str) -> Vec<String> {
        let spans = word_spans(text);
        let mut sentences = Vec::new();
        let mut start: Option<usize> = None;

        for (i, &(word_start, word_end)) in spans.iter().enumerate() {
            let sentence_start = *start.get_or_insert(word_start);
            let next = spans.get(i + 1).map(|&(a, b)| &text[a..b]);

            if self.ends_sentence(&text[word_start..word_end], next) {
                sentences.push(text[sentence_start..word_end].to_string());
                start = None;
            }
        }

        if let (Some(sentence_start), Some(&(_, last_end))) = (start, spans.last()) {
            sentences.push(text[sentence_start..last_end].to_string());
        }

        sentences
    }

    /// `word`가 문장을 끝내는지 판정
    fn ends_sentence(&self, word: &str, next: Option<&str>) -> bool {
        let core = word.trim_end_matches(CLOSING_PUNCT);
        let Some(last) = core.chars().last() else {
            return false;
        };

        match last {
            '!' | '?' => {}
            '.' => {
                if self.is_abbreviation(core) {
                    return false;
                }
            }
            _ => return false,
        }

        match next {
            None => true,
            Some(next) => !next
                .trim_start_matches(OPENING_PUNCT)
                .chars()
                .next()
                .map(char::is_lowercase)
                .unwrap_or(false),
        }
    }

    /// 약어/이니셜 여부
    fn is_abbreviation(&self, core: &str) -> bool {
        let token = core.trim_start_matches(OPENING_PUNCT);
        if self.abbreviations.contains(token) {
            return true;
        }

        // 한 글자 이니셜 (예: "J.")
        let mut chars = token.chars();
        matches!(
            (chars.next(), chars.next(), chars.next()),
            (Some(c), Some('.'), None) if c.is_alphabetic()
        )
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 본문으로 분할 (헤더 없음)
    fn chunk(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 인식 청커
///
/// - 문장을 자르지 않음 (한도를 넘는 단일 문장은 그대로 하나의 청크)
/// - 오버랩은 문장 단위로 올림
/// - 순수 함수: 같은 입력이면 같은 출력
pub struct SentenceChunker {
    config: ChunkConfig,
    splitter: SentenceSplitter,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        let splitter = SentenceSplitter::new(config.abbreviations.iter().cloned());
        Self { config, splitter }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 설정 반환
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 문장 분리기 반환
    pub fn splitter(&self) -> &SentenceSplitter {
        &self.splitter
    }

    /// 레슨 본문을 헤더가 붙은 청크로 분할
    pub fn chunk_lesson(&self, raw: &str, course_title: &str, lesson_number: u32) -> Vec<Chunk> {
        let header = Chunk::header(course_title, lesson_number);

        self.chunk(raw)
            .into_iter()
            .enumerate()
            .map(|(i, body)| Chunk {
                content: format!("{}{}", header, body),
                course_title: course_title.to_string(),
                lesson_number,
                chunk_index: i as u32,
            })
            .collect()
    }

    /// 문장들을 크기 한도 내에서 누적
    fn pack_sentences(&self, sentences: &[String]) -> Vec<String> {
        let limit = self.config.max_characters;
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;
        // 오버랩이 아닌 새 문장 수
        let mut fresh = 0usize;

        for sentence in sentences {
            let len = char_len(sentence);

            if fresh > 0 && current_len + 1 + len > limit {
                chunks.push(current.join(" "));

                current = self.overlap_seed(&current);
                // 시드 + 다음 문장이 한도를 넘으면 오래된 시드 문장부터 제거
                while !current.is_empty() && joined_len(&current) + 1 + len > limit {
                    current.remove(0);
                }
                current_len = joined_len(&current);
                fresh = 0;
            }

            current_len = if current.is_empty() {
                len
            } else {
                current_len + 1 + len
            };
            current.push(sentence.as_str());
            fresh += 1;
        }

        if fresh > 0 {
            chunks.push(current.join(" "));
        }

        chunks
    }

    /// 닫힌 청크의 끝에서부터 `overlap_characters` 이상이 될 때까지 문장 수집
    fn overlap_seed<'a>(&self, closed: &[&'a str]) -> Vec<&'a str> {
        let target = self.config.overlap_characters;
        if target == 0 {
            return Vec::new();
        }

        let mut collected = 0usize;
        let mut count = 0usize;
        for sentence in closed.iter().rev() {
            collected += char_len(sentence) + usize::from(count > 0);
            count += 1;
            if collected >= target {
                break;
            }
        }

        closed[closed.len() - count..].to_vec()
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let sentences = self.splitter.split(text);
        self.pack_sentences(&sentences)
    }
}

/// 문장 인식 청킹 (기본 약어 목록)
pub fn chunk_text(
    raw: &str,
    course_title: &str,
    lesson_number: u32,
    size_limit: usize,
    overlap: usize,
) -> Vec<Chunk> {
    SentenceChunker::new(ChunkConfig::new(size_limit, overlap))
        .chunk_lesson(raw, course_title, lesson_number)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 공백으로 구분된 단어의 바이트 범위
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 공백 하나로 이어 붙였을 때의 문자 수
fn joined_len(sentences: &[&str]) -> usize {
    if sentences.is_empty() {
        return 0;
    }
    sentences.iter().map(|s| char_len(s)).sum::<usize>() + sentences.len() - 1
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 오버랩을 제거하고 문장 순서를 복원
    fn reconstruct(splitter: &SentenceSplitter, bodies: &[String]) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for body in bodies {
            let sentences = splitter.split(body);
            let max_k = sentences.len().min(result.len());
            let k = (0..=max_k)
                .rev()
                .find(|&k| result[result.len() - k..] == sentences[..k])
                .unwrap_or(0);
            result.extend(sentences[k..].iter().cloned());
        }
        result
    }

    fn numbered_text(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_chunker_empty() {
        assert!(chunk_text("", "Course", 0, 800, 100).is_empty());
        assert!(chunk_text("   \n\t ", "Course", 0, 800, 100).is_empty());
    }

    #[test]
    fn test_abbreviation_not_sentence_end() {
        let chunks = chunk_text("Dr. Smith teaches this. It is great.", "Course", 1, 800, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].content,
            "Course Course Lesson 1 content: Dr. Smith teaches this. It is great."
        );

        let splitter = SentenceSplitter::default();
        let sentences = splitter.split("Dr. Smith teaches this. It is great.");
        assert_eq!(sentences, vec!["Dr. Smith teaches this.", "It is great."]);
    }

    #[test]
    fn test_lowercase_continuation_and_initials() {
        let splitter = SentenceSplitter::default();
        let sentences = splitter.split("Version 2. is out. J. R. Tolkien wrote it! Did he? Yes.");
        assert_eq!(
            sentences,
            vec!["Version 2. is out.", "J. R. Tolkien wrote it!", "Did he?", "Yes."]
        );
    }

    #[test]
    fn test_custom_abbreviations() {
        let splitter = SentenceSplitter::new(vec!["Approx.".to_string()]);
        let sentences = splitter.split("Approx. Ten people came. Dr. Who left.");
        assert_eq!(sentences, vec!["Approx. Ten people came.", "Dr.", "Who left."]);
    }

    #[test]
    fn test_sentence_whitespace_preserved() {
        let splitter = SentenceSplitter::default();
        let sentences = splitter.split("  First   line\ncontinues here.\n\nSecond one.\n");
        assert_eq!(sentences, vec!["First   line\ncontinues here.", "Second one."]);
        assert!(splitter.split(" \n\t ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = numbered_text(40);
        let limit = 120;
        let chunker = SentenceChunker::new(ChunkConfig::new(limit, 50));

        let chunks = chunker.chunk_lesson(&text, "Limits", 2);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(chunk.body().chars().count() <= limit, "{}", chunk.body());
            assert!(chunk.content.starts_with("Course Limits Lesson 2 content: "));
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let chunks = chunk_text(&numbered_text(30), "Index", 4, 100, 30);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.lesson_number, 4);
            assert_eq!(chunk.course_title, "Index");
        }
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = format!("This sentence is\n{}very long.", "really ".repeat(30));
        let text = format!("Short start. {} Short end.", long);
        let chunks = chunk_text(&text, "C", 0, 60, 20);

        let bodies: Vec<&str> = chunks.iter().map(|c| c.body()).collect();
        assert!(bodies.contains(&long.as_str()));
        for body in bodies {
            assert!(body.chars().count() <= 60 || body == long);
        }
    }

    #[test]
    fn test_overlap_is_sentence_level() {
        let text = "Alpha one is here. Bravo two is here. Charlie three is here. Delta four is here.";
        let chunker = SentenceChunker::new(ChunkConfig::new(45, 10));
        let bodies = chunker.chunk(text);

        assert_eq!(bodies[0], "Alpha one is here. Bravo two is here.");
        // 오버랩은 이전 청크의 마지막 문장 전체
        assert!(bodies[1].starts_with("Bravo two is here."));
    }

    #[test]
    fn test_lossless_reconstruction() {
        let text = numbered_text(25);
        let config = ChunkConfig::new(150, 60);
        let chunker = SentenceChunker::new(config);

        let bodies = chunker.chunk(&text);
        let rebuilt = reconstruct(chunker.splitter(), &bodies);
        assert_eq!(rebuilt, chunker.splitter().split(&text));
    }

    #[test]
    fn test_no_overlap_config() {
        let text = numbered_text(10);
        let chunker = SentenceChunker::new(ChunkConfig::new(1000, 0));
        let small = SentenceChunker::new(ChunkConfig::new(100, 0));

        assert_eq!(chunker.chunk(&text).len(), 1);

        let bodies = small.chunk(&text);
        let total: usize = bodies.iter().map(|b| small.splitter().split(b).len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_text(20);
        let a = chunk_text(&text, "Det", 1, 90, 40);
        let b = chunk_text(&text, "Det", 1, 90, 40);
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_defaults() {
        let default = ChunkConfig::default();
        assert_eq!(default.max_characters, 800);
        assert_eq!(default.overlap_characters, 100);
        assert!(default.abbreviations.iter().any(|a| a == "Dr."));

        let custom = ChunkConfig::new(1000, 0);
        assert_eq!(custom.overlap_characters, 0);
        assert_eq!(custom.abbreviations, default.abbreviations);
    }
}
