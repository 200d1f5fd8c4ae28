//! 강의 개요 도구

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::knowledge::CourseIndex;
use crate::llm::ToolDefinition;
use crate::models::{CourseOutline, Source};

use super::{required_str, SourceMailbox, Tool};

/// `get_course_outline` 도구
pub struct CourseOutlineTool {
    index: Arc<CourseIndex>,
    sources: SourceMailbox,
}

impl CourseOutlineTool {
    pub const NAME: &'static str = "get_course_outline";

    pub fn new(index: Arc<CourseIndex>) -> Self {
        Self {
            index,
            sources: SourceMailbox::default(),
        }
    }
}

/// 개요 텍스트
fn format_outline(outline: &CourseOutline) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Course: {}", outline.title);
    let _ = writeln!(
        text,
        "Course Link: {}",
        outline.link.as_deref().unwrap_or("N/A")
    );
    let _ = writeln!(text);
    let _ = writeln!(text, "Lessons ({} total):", outline.lessons.len());
    for lesson in &outline.lessons {
        let _ = writeln!(text, "  Lesson {}: {}", lesson.lesson_number, lesson.lesson_title);
    }
    text
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Get the complete outline of a course: title, link and every lesson with its number and title"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    }
                },
                "required": ["course_name"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let course_name = required_str(args, "course_name")?;
        let not_found = || format!("No course found matching '{}'", course_name);

        let title = match self.index.resolve_course_name(course_name).await {
            Ok(Some(title)) => title,
            Ok(None) => return Ok(not_found()),
            Err(e) => return Ok(format!("Search error: {}", e)),
        };

        let Some(outline) = self.index.get_course_outline(&title).await else {
            return Ok(not_found());
        };

        self.sources.store(vec![Source {
            label: format!("{} - Course Outline", outline.title),
            link: outline.link.clone(),
        }]);

        Ok(format_outline(&outline))
    }

    fn last_sources(&self) -> Vec<Source> {
        self.sources.get()
    }

    fn reset_sources(&self) {
        self.sources.clear();
    }
}
