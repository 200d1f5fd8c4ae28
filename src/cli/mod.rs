//! CLI 모듈
//!
//! course-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::{CollectionStats, FileCollector};
use crate::config::{Config, StoreBackend};
use crate::embedding::has_api_key;
use crate::knowledge::Collection;
use crate::llm::OpenAiCompletion;
use crate::models::Source;
use crate::rag::{open_index, Answer, RagSystem};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "course-rag")]
#[command(version, about = "강의 자료 RAG 질의응답 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 강의 문서 폴더를 인덱스에 추가
    Ingest {
        /// 강의 문서 폴더 (재귀)
        #[arg(short, long, default_value = "docs")]
        dir: PathBuf,

        /// 기존 인덱스를 비우고 다시 구축
        #[arg(long)]
        clear: bool,
    },

    /// 질문 1회
    Ask {
        /// 질문
        query: String,

        /// 이어갈 세션 ID
        #[arg(short, long)]
        session: Option<String>,

        /// 시작 시 수집할 강의 문서 폴더
        #[arg(long, default_value = "docs")]
        docs: PathBuf,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 대화형 질의응답
    Chat {
        /// 시작 시 수집할 강의 문서 폴더
        #[arg(long, default_value = "docs")]
        docs: PathBuf,
    },

    /// 인덱싱된 강의 목록
    Courses,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest { dir, clear } => cmd_ingest(&config, &dir, clear).await,
        Commands::Ask {
            query,
            session,
            docs,
            json,
        } => cmd_ask(&config, &query, session.as_deref(), &docs, json).await,
        Commands::Chat { docs } => cmd_chat(&config, &docs).await,
        Commands::Courses => cmd_courses(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 전용 시스템 (완성 API 키 검증 없음)
async fn ingest_system(config: &Config) -> Result<RagSystem> {
    let index = Arc::new(open_index(config).await.context("인덱스 열기 실패")?);
    let service = Arc::new(OpenAiCompletion::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
    )?);
    Ok(RagSystem::new(config, index, service))
}

/// 질의용 시스템: 설정 검증 후 문서 폴더를 수집
async fn query_system(config: &Config, docs: &Path) -> Result<RagSystem> {
    let system = RagSystem::from_config(config)
        .await
        .context("RAG 시스템 초기화 실패")?;

    if docs.exists() {
        let stats = system.add_course_folder(docs, false).await?;
        if stats.courses_added > 0 {
            println!(
                "[OK] 강의 {} 개 추가 ({} 청크)",
                stats.courses_added, stats.chunks_added
            );
        }
    }

    // 메모리 저장소는 프로세스마다 비어 있음
    if system.index().course_count().await? == 0 {
        println!("[!] 인덱싱된 강의가 없습니다. `course-rag ingest --dir <폴더>` 로 추가하세요.");
    }

    Ok(system)
}

/// 수집 명령어 (ingest)
async fn cmd_ingest(config: &Config, dir: &Path, clear: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("폴더를 찾을 수 없습니다: {}", dir.display());
    }

    if config.store == StoreBackend::Memory {
        println!("[!] 메모리 저장소는 프로세스 종료 시 사라집니다 (COURSE_RAG_STORE=lance 권장)");
    }

    let files = FileCollector::with_defaults()
        .collect_directory(dir)
        .context("파일 수집 실패")?;
    let collected = CollectionStats::from_files(&files);
    println!(
        "[*] 강의 문서 수집 중: {} (txt {}, pdf {}, docx {}, {})",
        dir.display(),
        collected.text_files,
        collected.pdf_files,
        collected.docx_files,
        format_bytes(collected.total_size)
    );

    let system = ingest_system(config).await?;
    let stats = system.add_course_folder(dir, clear).await?;

    println!(
        "[OK] 완료: 강의 {} 개, 청크 {} 개 추가",
        stats.courses_added, stats.chunks_added
    );

    let analytics = system.course_analytics().await?;
    println!("     전체 강의: {} 개", analytics.total_courses);
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &Config,
    query: &str,
    session: Option<&str>,
    docs: &Path,
    json: bool,
) -> Result<()> {
    let system = query_system(config, docs).await?;
    let answer = system.query(query, session).await.context("질의 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(config: &Config, docs: &Path) -> Result<()> {
    let system = query_system(config, docs).await?;
    let session_id = system.sessions().create_session();

    println!("[*] 대화 시작 ({}) - 종료: exit", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        match system.query(query, Some(&session_id)).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => println!("[!] 질의 실패: {}", e),
        }
    }

    println!("[OK] 대화 종료");
    Ok(())
}

/// 강의 목록 명령어 (courses)
async fn cmd_courses(config: &Config) -> Result<()> {
    let index = open_index(config).await.context("인덱스 열기 실패")?;
    let outlines = index.get_all_courses_metadata().await?;

    if outlines.is_empty() {
        println!("[!] 인덱싱된 강의가 없습니다.");
        return Ok(());
    }

    println!("[OK] 강의 ({} 개):\n", outlines.len());
    for outline in outlines {
        println!("  {}", outline.title);
        if let Some(instructor) = &outline.instructor {
            println!("     강사: {}", instructor);
        }
        if let Some(link) = &outline.link {
            println!("     링크: {}", link);
        }
        println!("     레슨: {} 개", outline.lessons.len());
        for lesson in &outline.lessons {
            println!(
                "       {:>2}. {}",
                lesson.lesson_number,
                truncate_text(&lesson.lesson_title, 60)
            );
        }
        println!();
    }
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &Config) -> Result<()> {
    println!("course-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 저장소: {:?}, 임베딩: {:?}", config.store, config.embedding);
    println!("[*] 모델: {} ({})", config.openai_model, config.openai_base_url);

    if config.openai_api_key.is_empty() {
        println!("[!] OpenAI API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    } else {
        println!("[OK] OpenAI API 키: 설정됨");
    }

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[*] Gemini API 키: 미설정 (로컬 임베딩 사용 가능)");
    }

    match open_index(config).await {
        Ok(index) => {
            match index.course_count().await {
                Ok(count) => println!("[OK] 강의: {} 개", count),
                Err(e) => println!("[!] 강의 수 조회 실패: {}", e),
            }
            match index.content_count().await {
                Ok(count) => println!("[OK] 콘텐츠 청크: {} 개", count),
                Err(e) => tracing::debug!("Failed to count {}: {}", Collection::CourseContent, e),
            }
        }
        Err(e) => println!("[!] 인덱스 열기 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.answer.trim());

    if !answer.sources.is_empty() {
        println!("\n[*] 출처:");
        for source in &answer.sources {
            println!("  - {}", format_source(source));
        }
    }
}

fn format_source(source: &Source) -> String {
    match &source.link {
        Some(link) => format!("{} ({})", source.label, link),
        None => source.label.clone(),
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 단위 포맷
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

// ============================================================================
// Tests
// ============================================================================
