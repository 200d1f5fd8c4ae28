//! 강의 콘텐츠 검색 도구

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::knowledge::CourseIndex;
use crate::llm::ToolDefinition;
use crate::models::Source;

use super::{optional_str, optional_u32, required_str, SourceMailbox, Tool};

/// `search_course_content` 도구
pub struct CourseSearchTool {
    index: Arc<CourseIndex>,
    sources: SourceMailbox,
}

impl CourseSearchTool {
    pub const NAME: &'static str = "search_course_content";

    pub fn new(index: Arc<CourseIndex>) -> Self {
        Self {
            index,
            sources: SourceMailbox::default(),
        }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search course materials with smart course name matching and lesson filtering"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let query = required_str(args, "query")?;
        let course_name = optional_str(args, "course_name")?;
        let lesson_number = optional_u32(args, "lesson_number")?;

        let results = self
            .index
            .search(query, course_name, lesson_number, None)
            .await;

        if let Some(error) = results.error {
            return Ok(error);
        }

        if results.is_empty() {
            let mut message = String::from("No relevant content found");
            if let Some(name) = course_name {
                message.push_str(&format!(" in course '{}'", name));
            }
            if let Some(lesson) = lesson_number {
                message.push_str(&format!(" in lesson {}", lesson));
            }
            message.push('.');
            return Ok(message);
        }

        let mut blocks = Vec::with_capacity(results.len());
        let mut sources = Vec::with_capacity(results.len());

        for (document, meta) in results.documents.iter().zip(&results.metadata) {
            let header = match meta.lesson_number {
                Some(n) => format!("[{} - Lesson {}]", meta.course_title, n),
                None => format!("[{}]", meta.course_title),
            };
            blocks.push(format!("{}\n{}", header, document));

            let link = match meta.lesson_number {
                Some(n) => self.index.get_lesson_link(&meta.course_title, n).await,
                None => None,
            };
            sources.push(Source::for_lesson(&meta.course_title, meta.lesson_number, link));
        }

        tracing::debug!("Search returned {} results for {:?}", blocks.len(), query);
        self.sources.store(sources);

        Ok(blocks.join("\n\n"))
    }

    fn last_sources(&self) -> Vec<Source> {
        self.sources.get()
    }

    fn reset_sources(&self) {
        self.sources.clear();
    }
}
