pub mod error;
pub mod models;
pub mod quran_api;
pub mod token;

use async_trait::async_trait;

use crate::quran::{
    Chapter, Division, ReciterId, SearchQuery, TranslationId, VerseKey, VerseOptions, VerseRange,
};

pub use error::{GatewayError, GatewayResult};
pub use models::{
    AudioFile, ChapterInfo, ChapterTranslation, ReciterInfo, SearchPage, TranslationInfo, Verse,
    VersePage,
};
pub use quran_api::QuranApiClient;
pub use token::{CredentialExchange, OAuthClientCredentials, TokenGrant, TokenManager};

/// Trait común para todas las fuentes de contenido
///
/// Every method maps to one upstream operation and returns normalised data.
/// Implementations do not cache and do not retry; that belongs to the layer
/// above.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Uniformly random verse across the whole text.
    async fn random_verse(&self, options: VerseOptions) -> GatewayResult<Verse>;

    /// One verse with its word breakdown, translation and audio reference.
    async fn verse_by_key(&self, key: VerseKey, options: VerseOptions) -> GatewayResult<Verse>;

    async fn search(&self, query: &SearchQuery) -> GatewayResult<SearchPage>;

    async fn translations(&self, language: Option<String>) -> GatewayResult<Vec<TranslationInfo>>;

    async fn reciters(&self, language: Option<String>) -> GatewayResult<Vec<ReciterInfo>>;

    async fn chapters(&self, language: Option<String>) -> GatewayResult<Vec<ChapterInfo>>;

    async fn chapter_verses(
        &self,
        chapter: Chapter,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<VersePage>;

    async fn chapter_translation(
        &self,
        resource_id: TranslationId,
        chapter: Chapter,
    ) -> GatewayResult<ChapterTranslation>;

    /// Whole-chapter audio; word timings only when `segments` is set.
    async fn chapter_audio(
        &self,
        reciter: ReciterId,
        chapter: Chapter,
        segments: bool,
    ) -> GatewayResult<AudioFile>;

    async fn verses_by_division(
        &self,
        division: Division,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<VersePage>;

    /// One fetch per verse; verses that fail are skipped, not fatal.
    ///
    /// Errors only when every verse in the range failed, so an upstream
    /// outage is reported instead of being returned (and cached) as an empty
    /// range.
    async fn verses_by_range(
        &self,
        range: VerseRange,
        options: VerseOptions,
    ) -> GatewayResult<Vec<Verse>>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}
