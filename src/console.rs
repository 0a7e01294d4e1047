//! Line-oriented operator console.
//!
//! Each stdin line is parsed as one [`Command`], executed against the
//! content service (or storage / admin surface), and answered with a JSON
//! document. Failures are JSON too, flagged `retryable` only when the same
//! request could succeed later.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    content::ContentService,
    quran::{Chapter, Division, SearchQuery, VerseKey, VerseOptions, VerseRange},
    sources::{GatewayError, TokenManager},
    storage::JsonStorage,
};

#[derive(Parser, Debug)]
#[command(name = "quran-gateway", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Verse of the day
    VerseOfDay(VerseArgs),
    /// One verse by key, e.g. `verse 2:255`
    Verse {
        key: String,
        #[command(flatten)]
        options: VerseArgs,
    },
    /// Full-text search; records history when --user is given
    Search {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long, value_delimiter = ',')]
        translations: Vec<u32>,
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Available translations
    Translations {
        #[arg(long)]
        language: Option<String>,
    },
    /// Available reciters
    Reciters {
        #[arg(long)]
        language: Option<String>,
    },
    /// All chapters
    Chapters {
        #[arg(long)]
        language: Option<String>,
    },
    /// Paginated verses of one chapter
    ChapterVerses {
        chapter: u16,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        options: VerseArgs,
    },
    /// Full translation text of one chapter
    ChapterTranslation { resource_id: u32, chapter: u16 },
    /// Chapter audio file, optionally with word timings
    ChapterAudio {
        reciter_id: u32,
        chapter: u16,
        #[arg(long)]
        segments: bool,
    },
    Juz {
        number: u16,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        options: VerseArgs,
    },
    Hizb {
        number: u16,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        options: VerseArgs,
    },
    Rub {
        number: u16,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        options: VerseArgs,
    },
    /// Verses start..=end of one chapter (at most 100)
    Range {
        chapter: u16,
        start: u16,
        end: u16,
        #[command(flatten)]
        options: VerseArgs,
    },
    /// Upstream access token status
    Token,
    /// Save a reflection on a verse
    Reflect {
        user: String,
        key: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Reflections on one verse
    Reflections { key: String },
    /// Reflections written by one user
    MyReflections { user: String },
    /// Search history of one user
    History {
        user: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    CacheStats,
    CacheFlush,
    StorageStats,
}

#[derive(Args, Debug, Default, Clone, Copy, PartialEq)]
pub struct VerseArgs {
    #[arg(long)]
    pub translation: Option<u32>,
    #[arg(long)]
    pub reciter: Option<u32>,
}

impl VerseArgs {
    fn resolve(self, defaults: VerseOptions) -> VerseOptions {
        VerseOptions {
            translation: self.translation.unwrap_or(defaults.translation),
            reciter: self.reciter.unwrap_or(defaults.reciter),
        }
    }
}

pub struct Console {
    content: ContentService,
    tokens: Option<Arc<TokenManager>>,
    storage: JsonStorage,
    config: Config,
}

impl Console {
    pub fn new(
        content: ContentService,
        tokens: Option<Arc<TokenManager>>,
        storage: JsonStorage,
        config: Config,
    ) -> Self {
        Self {
            content,
            tokens,
            storage,
            config,
        }
    }

    /// Parses and runs one input line. Blank lines and `#` comments yield nothing.
    pub async fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let parsed = match ConsoleLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => return Some(e.render().to_string()),
        };

        let output = match self.execute(parsed.command).await {
            Ok(value) => value,
            Err(e) => {
                error!("❌ Command failed: {:#}", e);
                failure(&e)
            }
        };
        let rendered = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
        Some(rendered)
    }

    pub async fn execute(&mut self, command: Command) -> Result<Value> {
        let defaults = self.config.verse_options();

        let value = match command {
            Command::VerseOfDay(options) => {
                json!(self.content.verse_of_day(options.resolve(defaults)).await?)
            }
            Command::Verse { key, options } => {
                let key: VerseKey = key.parse()?;
                json!(self.content.verse(key, options.resolve(defaults)).await?)
            }
            Command::Search {
                user,
                page,
                size,
                language,
                translations,
                query,
            } => {
                let text = query.join(" ");
                let mut search = SearchQuery::new(&text)?
                    .page(page)
                    .size(size.unwrap_or(self.config.search_page_size))
                    .translations(translations);
                if let Some(language) = language {
                    search = search.language(language);
                }

                let result = self.content.search(&search).await?;
                if let Some(user) = user {
                    self.storage
                        .record_search(&user, &text, result.data.results.len() as u32)
                        .await?;
                }
                json!(result)
            }
            Command::Translations { language } => {
                json!(self.content.translations(language.as_deref()).await?)
            }
            Command::Reciters { language } => {
                json!(self.content.reciters(language.as_deref()).await?)
            }
            Command::Chapters { language } => {
                json!(self.content.chapters(language.as_deref()).await?)
            }
            Command::ChapterVerses {
                chapter,
                page,
                options,
            } => {
                let chapter = Chapter::new(chapter)?;
                json!(
                    self.content
                        .chapter_verses(chapter, page, options.resolve(defaults))
                        .await?
                )
            }
            Command::ChapterTranslation {
                resource_id,
                chapter,
            } => {
                if resource_id == 0 {
                    return Err(GatewayError::Validation("invalid resource id".into()).into());
                }
                let chapter = Chapter::new(chapter)?;
                json!(self.content.chapter_translation(resource_id, chapter).await?)
            }
            Command::ChapterAudio {
                reciter_id,
                chapter,
                segments,
            } => {
                if reciter_id == 0 {
                    return Err(GatewayError::Validation("invalid reciter id".into()).into());
                }
                let chapter = Chapter::new(chapter)?;
                json!(self.content.chapter_audio(reciter_id, chapter, segments).await?)
            }
            Command::Juz {
                number,
                page,
                options,
            } => self.division(Division::juz(number)?, page, options.resolve(defaults)).await?,
            Command::Hizb {
                number,
                page,
                options,
            } => self.division(Division::hizb(number)?, page, options.resolve(defaults)).await?,
            Command::Rub {
                number,
                page,
                options,
            } => self.division(Division::rub(number)?, page, options.resolve(defaults)).await?,
            Command::Range {
                chapter,
                start,
                end,
                options,
            } => {
                let range = VerseRange::new(chapter, start, end)?;
                let result = self.content.verses_by_range(range, options.resolve(defaults)).await?;
                json!({
                    "cached": result.cached,
                    "count": result.data.len(),
                    "data": result.data,
                })
            }
            Command::Token => {
                let tokens = self
                    .tokens
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("client credentials are not configured"))?;
                let cached = tokens.cached_token().is_some();
                let token = tokens.get_access_token().await?;
                json!({
                    "cached": cached,
                    "token_preview": preview(&token),
                })
            }
            Command::Reflect { user, key, text } => {
                let key: VerseKey = key.parse()?;
                let reflection = self
                    .storage
                    .create_reflection(&user, key, &text.join(" "))
                    .await?;
                json!(reflection)
            }
            Command::Reflections { key } => {
                let key: VerseKey = key.parse()?;
                let reflections = self.storage.reflections_for_verse(key);
                json!({ "count": reflections.len(), "data": reflections })
            }
            Command::MyReflections { user } => {
                let reflections = self.storage.reflections_for_user(&user);
                json!({ "count": reflections.len(), "data": reflections })
            }
            Command::History { user, limit } => {
                let history = self.storage.search_history(&user, limit);
                json!({ "count": history.len(), "data": history })
            }
            Command::CacheStats => {
                let stats = self.content.cache_stats();
                info!("{}", stats);
                json!(stats)
            }
            Command::CacheFlush => {
                self.content.flush_cache();
                json!({ "flushed": true })
            }
            Command::StorageStats => json!(self.storage.stats()),
        };

        Ok(value)
    }

    async fn division(
        &self,
        division: Division,
        page: u32,
        options: VerseOptions,
    ) -> Result<Value> {
        Ok(json!(self.content.verses_by_division(division, page, options).await?))
    }
}

fn preview(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}…")
}

fn failure(error: &anyhow::Error) -> Value {
    let retryable = error
        .downcast_ref::<GatewayError>()
        .map(GatewayError::is_retryable)
        .unwrap_or(false);
    json!({
        "success": false,
        "error": format!("{error:#}"),
        "retryable": retryable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::content::TtlPolicy;
    use crate::sources::{models::SearchPage, MockContentSource};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn parse(line: &str) -> Command {
        ConsoleLine::try_parse_from(line.split_whitespace()).unwrap().command
    }

    async fn console(source: MockContentSource, dir: &tempfile::TempDir) -> Console {
        let mut source = source;
        source.expect_source_name().return_const("mock");
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let content = ContentService::new(cache, Arc::new(source), TtlPolicy::default());
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        Console::new(content, None, storage, Config::default())
    }

    #[test]
    fn search_collects_trailing_words() {
        assert_eq!(
            parse("search --user u1 --size 5 --translations 149,54 the night journey"),
            Command::Search {
                user: Some("u1".into()),
                page: 1,
                size: Some(5),
                language: None,
                translations: vec![149, 54],
                query: vec!["the".into(), "night".into(), "journey".into()],
            }
        );
    }

    #[test]
    fn verse_flags_are_optional() {
        assert_eq!(
            parse("verse 2:255 --reciter 3"),
            Command::Verse {
                key: "2:255".into(),
                options: VerseArgs {
                    translation: None,
                    reciter: Some(3),
                },
            }
        );
        assert_eq!(
            parse("juz 30"),
            Command::Juz {
                number: 30,
                page: 1,
                options: VerseArgs::default(),
            }
        );
    }

    #[tokio::test]
    async fn invalid_input_is_reported_as_non_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console(MockContentSource::new(), &dir).await;

        let out = console.handle_line("range 2 1 150").await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["retryable"], false);
    }

    #[tokio::test]
    async fn search_with_user_records_history() {
        let mut source = MockContentSource::new();
        source.expect_search().times(1).returning(|q| {
            Ok(SearchPage {
                query: q.text().to_string(),
                results: Vec::new(),
                current_page: 1,
                total_pages: 1,
                total_results: 0,
            })
        });
        let dir = tempfile::tempdir().unwrap();
        let mut console = console(source, &dir).await;

        let out = console.handle_line("search --user u1 patience").await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["cached"], false);

        let out = console.handle_line("history u1").await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["data"][0]["query"], "patience");
    }

    #[tokio::test]
    async fn blank_and_comment_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console(MockContentSource::new(), &dir).await;
        assert_eq!(console.handle_line("   ").await, None);
        assert_eq!(console.handle_line("# note").await, None);
    }

    #[tokio::test]
    async fn token_command_needs_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut console = console(MockContentSource::new(), &dir).await;
        assert!(console.execute(Command::Token).await.is_err());
    }
}
