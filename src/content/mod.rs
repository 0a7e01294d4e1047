//! Cache-aside orchestration for every content operation.
//!
//! Each public method on [`ContentService`] derives a [`CacheKey`] from the
//! operation name and its full parameter tuple, answers from the
//! [`ContentCache`] when it can, and otherwise asks the [`ContentSource`]
//! and stores the result with the operation's TTL. Responses carry a
//! `cached` flag so callers can observe which path was taken.

pub mod key;

use serde::Serialize;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheStats, TtlCache},
    quran::{
        Chapter, Division, ReciterId, SearchQuery, TranslationId, VerseKey, VerseOptions,
        VerseRange,
    },
    sources::{
        models::{
            AudioFile, ChapterInfo, ChapterTranslation, ReciterInfo, SearchPage, TranslationInfo,
            Verse, VersePage,
        },
        ContentSource, GatewayResult,
    },
};

pub use key::{CacheKey, KeyPart};

const DAY: Duration = Duration::from_secs(86_400);

/// Everything the orchestrator can put in the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UpstreamResult {
    Verse(Verse),
    Verses(Vec<Verse>),
    VersePage(VersePage),
    SearchPage(SearchPage),
    Translations(Vec<TranslationInfo>),
    Reciters(Vec<ReciterInfo>),
    Chapters(Vec<ChapterInfo>),
    ChapterTranslation(ChapterTranslation),
    ChapterAudio(AudioFile),
}

macro_rules! upstream_result_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for UpstreamResult {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl TryFrom<UpstreamResult> for $ty {
                type Error = UpstreamResult;

                fn try_from(result: UpstreamResult) -> Result<Self, Self::Error> {
                    match result {
                        UpstreamResult::$variant(value) => Ok(value),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

upstream_result_variant! {
    Verse => Verse,
    Verses => Vec<Verse>,
    VersePage => VersePage,
    SearchPage => SearchPage,
    Translations => Vec<TranslationInfo>,
    Reciters => Vec<ReciterInfo>,
    Chapters => Vec<ChapterInfo>,
    ChapterTranslation => ChapterTranslation,
    ChapterAudio => AudioFile,
}

pub type ContentCache = TtlCache<UpstreamResult>;

/// A response plus whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<T> {
    pub cached: bool,
    pub data: T,
}

impl<T> Cached<T> {
    pub fn hit(data: T) -> Self {
        Self { cached: true, data }
    }

    pub fn miss(data: T) -> Self {
        Self { cached: false, data }
    }
}

/// Lifetime of each operation class in the cache.
///
/// Catalog data changes far less often than anything per-verse and is kept
/// correspondingly longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub verse_of_day: Duration,
    pub verse: Duration,
    pub division: Duration,
    pub range: Duration,
    pub chapter_verses: Duration,
    pub chapter_translation: Duration,
    pub search: Duration,
    pub translations: Duration,
    pub chapters: Duration,
    pub reciters: Duration,
    pub chapter_audio: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            verse_of_day: DAY,
            verse: DAY,
            division: DAY,
            range: DAY,
            chapter_verses: DAY,
            chapter_translation: DAY,
            search: Duration::from_secs(3600),
            translations: DAY * 7,
            chapters: DAY * 7,
            reciters: DAY * 30,
            chapter_audio: DAY * 30,
        }
    }
}

pub struct ContentService {
    cache: Arc<ContentCache>,
    source: Arc<dyn ContentSource>,
    ttl: TtlPolicy,
}

impl ContentService {
    pub fn new(cache: Arc<ContentCache>, source: Arc<dyn ContentSource>, ttl: TtlPolicy) -> Self {
        info!(
            "📚 Content service ready (source: {}, default TTL {}s)",
            source.source_name(),
            cache.default_ttl().as_secs()
        );
        Self { cache, source, ttl }
    }

    async fn cached<T, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> GatewayResult<Cached<T>>
    where
        T: Clone + Into<UpstreamResult> + TryFrom<UpstreamResult>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let key = key.to_string();

        if let Some(hit) = self.cache.get(&key) {
            match T::try_from(hit) {
                Ok(data) => {
                    debug!("📦 Cache hit: {}", key);
                    return Ok(Cached::hit(data));
                }
                Err(_) => warn!("⚠️ Cache entry {} holds an unexpected shape, refetching", key),
            }
        }

        debug!("📥 Cache miss: {}", key);
        let data = fetch().await?;
        self.cache.set(key, data.clone().into(), Some(ttl));
        Ok(Cached::miss(data))
    }

    pub async fn verse_of_day(&self, options: VerseOptions) -> GatewayResult<Cached<Verse>> {
        let key = CacheKey::new("verse-of-day")
            .part(options.translation)
            .part(options.reciter);
        self.cached(key, self.ttl.verse_of_day, || self.source.random_verse(options))
            .await
    }

    pub async fn verse(
        &self,
        verse: VerseKey,
        options: VerseOptions,
    ) -> GatewayResult<Cached<Verse>> {
        let key = CacheKey::new("verse")
            .part(verse.chapter())
            .part(verse.verse())
            .part(options.translation)
            .part(options.reciter);
        self.cached(key, self.ttl.verse, || self.source.verse_by_key(verse, options))
            .await
    }

    pub async fn search(&self, query: &SearchQuery) -> GatewayResult<Cached<SearchPage>> {
        let key = CacheKey::new("search")
            .part(query.text())
            .part(query.current_page())
            .part(query.page_size())
            .part(query.language_hint())
            .part(query.translation_filter());
        self.cached(key, self.ttl.search, || self.source.search(query)).await
    }

    pub async fn translations(
        &self,
        language: Option<&str>,
    ) -> GatewayResult<Cached<Vec<TranslationInfo>>> {
        let key = CacheKey::new("translations").part(language);
        self.cached(key, self.ttl.translations, || {
            self.source.translations(language.map(str::to_string))
        })
        .await
    }

    pub async fn reciters(
        &self,
        language: Option<&str>,
    ) -> GatewayResult<Cached<Vec<ReciterInfo>>> {
        let key = CacheKey::new("reciters").part(language);
        self.cached(key, self.ttl.reciters, || {
            self.source.reciters(language.map(str::to_string))
        })
        .await
    }

    pub async fn chapters(
        &self,
        language: Option<&str>,
    ) -> GatewayResult<Cached<Vec<ChapterInfo>>> {
        let key = CacheKey::new("chapters").part(language);
        self.cached(key, self.ttl.chapters, || {
            self.source.chapters(language.map(str::to_string))
        })
        .await
    }

    pub async fn chapter_verses(
        &self,
        chapter: Chapter,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<Cached<VersePage>> {
        let page = page.max(1);
        let key = CacheKey::new("chapter-verses")
            .part(chapter)
            .part(page)
            .part(options.translation)
            .part(options.reciter);
        self.cached(key, self.ttl.chapter_verses, || {
            self.source.chapter_verses(chapter, page, options)
        })
        .await
    }

    pub async fn chapter_translation(
        &self,
        resource_id: TranslationId,
        chapter: Chapter,
    ) -> GatewayResult<Cached<ChapterTranslation>> {
        let key = CacheKey::new("chapter-translation")
            .part(resource_id)
            .part(chapter);
        self.cached(key, self.ttl.chapter_translation, || {
            self.source.chapter_translation(resource_id, chapter)
        })
        .await
    }

    pub async fn chapter_audio(
        &self,
        reciter: ReciterId,
        chapter: Chapter,
        segments: bool,
    ) -> GatewayResult<Cached<AudioFile>> {
        let key = CacheKey::new("chapter-audio")
            .part(reciter)
            .part(chapter)
            .part(segments);
        self.cached(key, self.ttl.chapter_audio, || {
            self.source.chapter_audio(reciter, chapter, segments)
        })
        .await
    }

    pub async fn verses_by_division(
        &self,
        division: Division,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<Cached<VersePage>> {
        let page = page.max(1);
        let key = CacheKey::new(division.name())
            .part(division.number())
            .part(page)
            .part(options.translation)
            .part(options.reciter);
        self.cached(key, self.ttl.division, || {
            self.source.verses_by_division(division, page, options)
        })
        .await
    }

    pub async fn verses_by_range(
        &self,
        range: VerseRange,
        options: VerseOptions,
    ) -> GatewayResult<Cached<Vec<Verse>>> {
        let key = CacheKey::new("range")
            .part(range.chapter())
            .part(range.start())
            .part(range.end())
            .part(options.translation)
            .part(options.reciter);
        self.cached(key, self.ttl.range, || self.source.verses_by_range(range, options))
            .await
    }

    /// Administrative reset; not part of normal request handling.
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::sources::{GatewayError, MockContentSource};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    const OPTIONS: VerseOptions = VerseOptions {
        translation: 131,
        reciter: 7,
    };

    fn verse(key: &str) -> Verse {
        let (chapter, number) = key.split_once(':').unwrap();
        Verse {
            id: 1,
            verse_key: key.to_string(),
            chapter_id: chapter.parse().unwrap(),
            verse_number: number.parse().unwrap(),
            text_uthmani: String::new(),
            juz_number: None,
            hizb_number: None,
            rub_number: None,
            page_number: None,
            words: Vec::new(),
            translations: Vec::new(),
            audio: None,
        }
    }

    fn service(source: MockContentSource) -> (ContentService, Arc<ContentCache>, ManualClock) {
        let clock = ManualClock::new();
        let cache = Arc::new(ContentCache::with_clock(DAY, Arc::new(clock.clone())));
        let mut source = source;
        source.expect_source_name().return_const("mock");
        let service = ContentService::new(cache.clone(), Arc::new(source), TtlPolicy::default());
        (service, cache, clock)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let mut source = MockContentSource::new();
        source
            .expect_verse_by_key()
            .times(1)
            .returning(|key, _| Ok(verse(&key.to_string())));
        let (service, _, _) = service(source);
        let key = VerseKey::new(2, 255).unwrap();

        let first = service.verse(key, OPTIONS).await.unwrap();
        let second = service.verse(key, OPTIONS).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn expired_entry_triggers_a_fresh_fetch() {
        let mut source = MockContentSource::new();
        source
            .expect_random_verse()
            .times(2)
            .returning(|_| Ok(verse("1:1")));
        let (service, _, clock) = service(source);

        assert!(!service.verse_of_day(OPTIONS).await.unwrap().cached);
        clock.advance(Duration::from_secs(86_399));
        assert!(service.verse_of_day(OPTIONS).await.unwrap().cached);
        clock.advance(Duration::from_secs(1));
        assert!(!service.verse_of_day(OPTIONS).await.unwrap().cached);
    }

    #[tokio::test]
    async fn upstream_errors_are_not_cached() {
        let mut source = MockContentSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_chapters()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(GatewayError::upstream("chapters", Some(502), "bad gateway")));
        source
            .expect_chapters()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Vec::new()));
        let (service, cache, _) = service(source);

        assert!(service.chapters(None).await.is_err());
        assert!(cache.is_empty());

        let ok = service.chapters(None).await.unwrap();
        assert!(!ok.cached);
    }

    #[tokio::test]
    async fn any_differing_parameter_gets_its_own_entry() {
        let mut source = MockContentSource::new();
        source
            .expect_chapter_audio()
            .times(3)
            .returning(|reciter, chapter, _| {
                Ok(AudioFile {
                    id: reciter,
                    chapter_id: chapter.number(),
                    audio_url: String::new(),
                    duration_ms: None,
                    file_size: None,
                    format: None,
                    timings: Vec::new(),
                })
            });
        let (service, cache, _) = service(source);
        let fatiha = Chapter::new(1).unwrap();

        service.chapter_audio(7, fatiha, false).await.unwrap();
        service.chapter_audio(7, fatiha, true).await.unwrap();
        service.chapter_audio(8, fatiha, false).await.unwrap();
        assert!(service.chapter_audio(7, fatiha, false).await.unwrap().cached);

        assert_eq!(cache.len(), 3);
        assert!(cache.has("chapter-audio_7_1_true"));
    }

    #[tokio::test]
    async fn search_key_ignores_builder_call_order() {
        let mut source = MockContentSource::new();
        source.expect_search().times(1).returning(|q| {
            Ok(SearchPage {
                query: q.text().to_string(),
                results: Vec::new(),
                current_page: q.current_page(),
                total_pages: 0,
                total_results: 0,
            })
        });
        let (service, _, _) = service(source);

        let a = SearchQuery::new("mercy").unwrap().page(2).size(10).language("en");
        let b = SearchQuery::new("mercy").unwrap().language("en").size(10).page(2);

        assert!(!service.search(&a).await.unwrap().cached);
        assert!(service.search(&b).await.unwrap().cached);
    }

    #[tokio::test]
    async fn divisions_of_the_same_number_do_not_collide() {
        let mut source = MockContentSource::new();
        source
            .expect_verses_by_division()
            .times(3)
            .returning(|_, _, _| {
                Ok(VersePage {
                    verses: Vec::new(),
                    pagination: crate::sources::models::Pagination {
                        per_page: 50,
                        current_page: 1,
                        next_page: None,
                        total_pages: 1,
                        total_records: 0,
                    },
                })
            });
        let (service, cache, _) = service(source);

        for division in [Division::juz(5), Division::hizb(5), Division::rub(5)] {
            service
                .verses_by_division(division.unwrap(), 1, OPTIONS)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn range_result_is_cached_as_a_whole() {
        let mut source = MockContentSource::new();
        let range = VerseRange::new(3, 1, 5).unwrap();
        source
            .expect_verses_by_range()
            .with(eq(range), eq(OPTIONS))
            .times(1)
            .returning(|_, _| Ok(vec![verse("3:1"), verse("3:2"), verse("3:4"), verse("3:5")]));
        let (service, _, _) = service(source);

        let first = service.verses_by_range(range, OPTIONS).await.unwrap();
        let second = service.verses_by_range(range, OPTIONS).await.unwrap();
        assert_eq!(first.data.len(), 4);
        assert!(second.cached);
    }

    #[tokio::test]
    async fn flush_forces_refetch() {
        let mut source = MockContentSource::new();
        source
            .expect_reciters()
            .times(2)
            .returning(|_| Ok(Vec::new()));
        let (service, _, _) = service(source);

        service.reciters(Some("en")).await.unwrap();
        service.flush_cache();
        assert!(!service.reciters(Some("en")).await.unwrap().cached);
        assert_eq!(service.cache_stats().keys, 1);
    }

    #[test]
    fn catalogs_outlive_per_verse_entries() {
        let ttl = TtlPolicy::default();
        assert!(ttl.translations > ttl.verse);
        assert!(ttl.chapters > ttl.chapter_verses);
        assert_eq!(ttl.reciters, Duration::from_secs(30 * 86_400));
        assert_eq!(ttl.chapter_audio, ttl.reciters);
        assert_eq!(ttl.verse_of_day, Duration::from_secs(86_400));
    }

    #[test]
    fn cached_envelope_serialises_flag_and_data() {
        let value = serde_json::to_value(Cached::hit(vec![1, 2])).unwrap();
        assert_eq!(value, serde_json::json!({ "cached": true, "data": [1, 2] }));
    }
}
