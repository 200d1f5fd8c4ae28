//! 강의 문서 파서
//!
//! 형식:
//! ```text
//! Course Title: Building Towards Computer Use
//! Course Link: https://example.com/course
//! Course Instructor: Colt Steele
//!
//! Lesson 0: Introduction
//! Lesson Link: https://example.com/lesson/0
//! 본문...
//!
//! Lesson 1: Overview
//! 본문...
//! ```
//!
//! 헤더 키와 `Lesson` 키워드는 대소문자를 구분하지 않습니다.

use std::collections::BTreeMap;

use crate::error::{RagError, Result};
use crate::models::{CourseDocument, Lesson};

const KEY_COURSE_TITLE: &str = "course title:";
const KEY_COURSE_LINK: &str = "course link:";
const KEY_COURSE_INSTRUCTOR: &str = "course instructor:";
const KEY_LESSON_LINK: &str = "lesson link:";

/// 작성 중인 레슨
struct LessonDraft {
    number: u32,
    title: String,
    link: Option<String>,
    body: Vec<String>,
}

/// 강의 문서 텍스트 파싱
///
/// 제목 헤더가 없거나 비어 있으면 `RagError::Parse`.
/// 레슨 마커가 하나도 없으면 본문 전체를 강의 제목의 레슨 0으로 만듭니다.
/// 같은 번호의 레슨은 합칩니다 (제목/링크는 마지막 값, 본문은 이어붙임).
pub fn parse_course_document(raw: &str) -> Result<CourseDocument> {
    let mut title: Option<String> = None;
    let mut link: Option<String> = None;
    let mut instructor: Option<String> = None;

    let mut preamble: Vec<String> = Vec::new();
    let mut lessons: BTreeMap<u32, Lesson> = BTreeMap::new();
    let mut current: Option<LessonDraft> = None;
    let mut expect_lesson_link = false;

    for line in raw.lines() {
        let trimmed = line.trim();

        if let Some((number, lesson_title)) = parse_lesson_marker(trimmed) {
            if let Some(draft) = current.take() {
                merge_lesson(&mut lessons, draft);
            }
            current = Some(LessonDraft {
                number,
                title: lesson_title,
                link: None,
                body: Vec::new(),
            });
            expect_lesson_link = true;
            continue;
        }

        match current.as_mut() {
            Some(draft) => {
                if expect_lesson_link {
                    expect_lesson_link = false;
                    if let Some(value) = header_value(trimmed, KEY_LESSON_LINK) {
                        draft.link = non_empty(value);
                        continue;
                    }
                }
                draft.body.push(line.to_string());
            }
            None => {
                if let Some(value) = header_value(trimmed, KEY_COURSE_TITLE) {
                    title = non_empty(value);
                } else if let Some(value) = header_value(trimmed, KEY_COURSE_LINK) {
                    link = non_empty(value);
                } else if let Some(value) = header_value(trimmed, KEY_COURSE_INSTRUCTOR) {
                    instructor = non_empty(value);
                } else {
                    preamble.push(line.to_string());
                }
            }
        }
    }

    if let Some(draft) = current.take() {
        merge_lesson(&mut lessons, draft);
    }

    let title = title.ok_or_else(|| RagError::Parse("missing 'Course Title:' header".to_string()))?;

    // 레슨 구조가 없는 문서
    if lessons.is_empty() {
        let body = join_body(&preamble);
        if !body.is_empty() {
            lessons.insert(
                0,
                Lesson {
                    number: 0,
                    title: title.clone(),
                    link: None,
                    raw_text: body,
                },
            );
        }
    }

    Ok(CourseDocument {
        title,
        link,
        instructor,
        lessons: lessons.into_values().collect(),
    })
}

/// `Lesson {N}: {title}` 마커 인식
///
/// N이 음이 아닌 정수가 아니면 마커가 아닙니다.
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let keyword = line.get(..6)?;
    if !keyword.eq_ignore_ascii_case("lesson") {
        return None;
    }

    let rest = &line[6..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let (number, title) = rest.split_once(':')?;
    let number = number.trim();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let number = number.parse::<u32>().ok()?;
    Some((number, title.trim().to_string()))
}

/// `key:` 로 시작하는 헤더 줄의 값
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let prefix = line.get(..key.len())?;
    if prefix.eq_ignore_ascii_case(key) {
        Some(line[key.len()..].trim())
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn join_body(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

fn merge_lesson(lessons: &mut BTreeMap<u32, Lesson>, draft: LessonDraft) {
    let body = join_body(&draft.body);

    match lessons.get_mut(&draft.number) {
        Some(existing) => {
            tracing::debug!("Merging duplicate lesson {}", draft.number);
            existing.title = draft.title;
            if draft.link.is_some() {
                existing.link = draft.link;
            }
            if !body.is_empty() {
                if !existing.raw_text.is_empty() {
                    existing.raw_text.push('\n');
                }
                existing.raw_text.push_str(&body);
            }
        }
        None => {
            lessons.insert(
                draft.number,
                Lesson {
                    number: draft.number,
                    title: draft.title,
                    link: draft.link,
                    raw_text: body,
                },
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
