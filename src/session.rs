//! 대화 세션 관리
//!
//! 세션마다 최근 `2 * max_history` 개 메시지(사용자/어시스턴트 쌍)만 유지합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// 기본 보관 교환 수
pub const DEFAULT_MAX_HISTORY: usize = 2;

/// 기본 최대 세션 수
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// 세션 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => f.write_str("User"),
            Speaker::Assistant => f.write_str("Assistant"),
        }
    }
}

/// 세션 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub speaker: Speaker,
    pub content: String,
}

struct SessionEntry {
    messages: Vec<SessionMessage>,
    last_used: u64,
}

#[derive(Default)]
struct SessionState {
    counter: u64,
    /// 사용 순서 (LRU)
    clock: u64,
    sessions: HashMap<String, SessionEntry>,
}

impl SessionState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// 세션 조회/생성, 한도 초과 시 가장 오래 쓰지 않은 세션 제거
    fn touch(&mut self, session_id: &str, max_sessions: usize) -> &mut SessionEntry {
        let now = self.tick();

        if !self.sessions.contains_key(session_id) && self.sessions.len() >= max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                tracing::debug!("Evicting idle {}", oldest);
                self.sessions.remove(&oldest);
            }
        }

        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                messages: Vec::new(),
                last_used: now,
            });
        entry.last_used = now;
        entry
    }
}

/// 세션 관리자
///
/// 세션 수는 `max_sessions` 로 제한되며, 넘치면 가장 오래 쓰지 않은 세션을 버립니다.
pub struct SessionManager {
    max_history: usize,
    max_sessions: usize,
    state: Mutex<SessionState>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        Self::with_limits(max_history, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(max_history: usize, max_sessions: usize) -> Self {
        Self {
            max_history,
            max_sessions: max_sessions.max(1),
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 새 세션 ID 발급 (`session_{n}`)
    pub fn create_session(&self) -> String {
        let mut state = self.lock();
        state.counter += 1;
        let id = format!("session_{}", state.counter);
        state.touch(&id, self.max_sessions);
        tracing::debug!("Created {}", id);
        id
    }

    /// 메시지 추가 (없는 세션은 생성)
    pub fn add_message(&self, session_id: &str, speaker: Speaker, content: impl Into<String>) {
        let limit = self.max_history * 2;
        let mut state = self.lock();
        let messages = &mut state.touch(session_id, self.max_sessions).messages;

        messages.push(SessionMessage {
            speaker,
            content: content.into(),
        });

        if messages.len() > limit {
            let excess = messages.len() - limit;
            messages.drain(..excess);
        }
    }

    /// 질문/답변 쌍 추가
    pub fn add_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        self.add_message(session_id, Speaker::User, user);
        self.add_message(session_id, Speaker::Assistant, assistant);
    }

    /// 프롬프트용 대화 기록 (`User: …\nAssistant: …`)
    pub fn get_conversation_history(&self, session_id: &str) -> Option<String> {
        let state = self.lock();
        let messages = &state.sessions.get(session_id)?.messages;
        if messages.is_empty() {
            return None;
        }

        Some(
            messages
                .iter()
                .map(|m| format!("{}: {}", m.speaker, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn messages(&self, session_id: &str) -> Vec<SessionMessage> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn clear_session(&self, session_id: &str) {
        if let Some(entry) = self.lock().sessions.get_mut(session_id) {
            entry.messages.clear();
        }
    }
}
