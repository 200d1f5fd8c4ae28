//! 도메인 모델 - 강의, 레슨, 청크, 출처

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Course / Lesson
// ============================================================================

/// 레슨
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// 레슨 번호 (0 이상, 정렬 기준)
    pub number: u32,
    /// 레슨 제목
    pub title: String,
    /// 레슨 링크
    pub link: Option<String>,
    /// 레슨 본문
    pub raw_text: String,
}

/// 강의 문서
///
/// `title`이 강의 식별자입니다 (코퍼스 내에서 유일).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDocument {
    pub title: String,
    pub link: Option<String>,
    pub instructor: Option<String>,
    /// 레슨 번호 오름차순
    pub lessons: Vec<Lesson>,
}

impl CourseDocument {
    /// 레슨 번호로 조회
    pub fn lesson(&self, number: u32) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.number == number)
    }

    /// 카탈로그에 저장할 레슨 요약 목록
    pub fn lesson_summaries(&self) -> Vec<LessonSummary> {
        self.lessons
            .iter()
            .map(|l| LessonSummary {
                lesson_number: l.number,
                lesson_title: l.title.clone(),
                lesson_link: l.link.clone(),
            })
            .collect()
    }
}

/// 카탈로그 메타데이터의 `lessons_json` 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSummary {
    pub lesson_number: u32,
    pub lesson_title: String,
    #[serde(default)]
    pub lesson_link: Option<String>,
}

/// 강의 개요 (outline 도구 응답용)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    pub title: String,
    pub link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<LessonSummary>,
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크
///
/// 생성 후 불변이며, 수집 이후에는 인덱스가 소유합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// "Course {title} Lesson {N} content: " 헤더가 붙은 텍스트
    pub content: String,
    pub course_title: String,
    pub lesson_number: u32,
    /// 레슨 내 0부터 연속
    pub chunk_index: u32,
}

impl Chunk {
    /// 청크 헤더
    pub fn header(course_title: &str, lesson_number: u32) -> String {
        format!("Course {} Lesson {} content: ", course_title, lesson_number)
    }

    /// 콘텐츠 컬렉션 레코드 ID (`{sha256(title)}_{lesson}_{chunk}`)
    pub fn record_id(&self) -> String {
        let digest = Sha256::digest(self.course_title.as_bytes());
        let title_key: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}_{}_{}", title_key, self.lesson_number, self.chunk_index)
    }

    /// 헤더를 제외한 본문
    pub fn body(&self) -> &str {
        let header = Self::header(&self.course_title, self.lesson_number);
        self.content
            .strip_prefix(header.as_str())
            .unwrap_or(&self.content)
    }
}

// ============================================================================
// Source
// ============================================================================

/// 답변 출처
///
/// 생성된 답변 텍스트와 분리되어 UI로 전달됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// "{title} - Lesson {N}" 형식의 레이블
    pub label: String,
    /// 레슨 (또는 강의) 링크
    pub link: Option<String>,
}

impl Source {
    /// 강의/레슨 정보로 출처 생성
    pub fn for_lesson(course_title: &str, lesson_number: Option<u32>, link: Option<String>) -> Self {
        let label = match lesson_number {
            Some(n) => format!("{} - Lesson {}", course_title, n),
            None => course_title.to_string(),
        };
        Self { label, link }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
