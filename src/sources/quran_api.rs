use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    error::{GatewayError, GatewayResult},
    models::{
        raw, AudioFile, ChapterInfo, ChapterTranslation, ReciterInfo, SearchPage, TranslationInfo,
        Verse, VersePage,
    },
    token::TokenManager,
    ContentSource,
};
use crate::quran::{
    cap_page_size, truncate_query, verse_key_by_number, Chapter, Division, ReciterId, SearchQuery,
    TranslationId, VerseKey, VerseOptions, VerseRange, TOTAL_VERSES,
};

pub const DEFAULT_BASE_URL: &str = "https://api.quran.com/api/v4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Verses per page for chapter and division listings.
const VERSES_PER_PAGE: u32 = 50;

const VERSE_FIELDS: &str = concat!(
    "text_uthmani,chapter_id,verse_number,verse_key,",
    "juz_number,hizb_number,rub_el_hizb_number,page_number",
);

/// Builds the HTTP client shared by the content gateway and the token exchange.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("quran-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Cliente para la API de contenido (quran.com v4 layout)
pub struct QuranApiClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Option<Arc<TokenManager>>,
}

impl QuranApiClient {
    /// `tokens` is `None` for public deployments of the API that take
    /// unauthenticated requests.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Option<Arc<TokenManager>>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(
            "🌐 Content gateway targeting {} ({})",
            base_url,
            if tokens.is_some() { "authenticated" } else { "anonymous" }
        );
        Self {
            client,
            base_url,
            tokens,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("🔍 {} -> GET {}", operation, url);

        let mut request = self.client.get(&url).query(query);
        if let Some(tokens) = &self.tokens {
            request = request.bearer_auth(tokens.get_access_token().await?);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            error!("❌ {} request failed: {}", operation, message);
            GatewayError::upstream(operation, None, message)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                error!("❌ Unauthorized - check your credentials");
            }
            error!("❌ Content API error on {}: {} - {}", operation, status, body);
            return Err(GatewayError::upstream(operation, Some(status.as_u16()), body));
        }

        response.json::<T>().await.map_err(|e| {
            error!("❌ Malformed {} response: {}", operation, e);
            let message = format!("malformed response: {e}");
            GatewayError::upstream(operation, Some(status.as_u16()), message)
        })
    }

    fn verse_query(options: VerseOptions) -> Vec<(&'static str, String)> {
        vec![
            ("words", "true".to_string()),
            ("translations", options.translation.to_string()),
            ("audio", options.reciter.to_string()),
            ("fields", VERSE_FIELDS.to_string()),
            ("word_fields", "text_uthmani".to_string()),
        ]
    }

    fn paged_verse_query(page: u32, options: VerseOptions) -> Vec<(&'static str, String)> {
        let mut query = Self::verse_query(options);
        query.push(("page", page.max(1).to_string()));
        query.push(("per_page", VERSES_PER_PAGE.to_string()));
        query
    }

    fn language_query(language: Option<String>) -> Vec<(&'static str, String)> {
        language.map(|l| vec![("language", l)]).unwrap_or_default()
    }
}

/// Fetches every verse of `range` in order, dropping the ones that fail.
///
/// Only when nothing at all could be fetched is the last error returned, so
/// an outage is not mistaken for an empty range.
pub(crate) async fn collect_range<F, Fut>(range: VerseRange, fetch: F) -> GatewayResult<Vec<Verse>>
where
    F: Fn(VerseKey) -> Fut,
    Fut: Future<Output = GatewayResult<Verse>>,
{
    let mut verses = Vec::with_capacity(range.len());
    let mut last_error = None;

    for key in range.keys() {
        match fetch(key).await {
            Ok(verse) => verses.push(verse),
            Err(e) => {
                warn!("⚠️ Skipping verse {} in range: {}", key, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if verses.is_empty() => Err(e),
        _ => {
            info!(
                "✅ Range {}:{}-{} fetched {} of {} verses",
                range.chapter(),
                range.start(),
                range.end(),
                verses.len(),
                range.len()
            );
            Ok(verses)
        }
    }
}

#[async_trait]
impl ContentSource for QuranApiClient {
    async fn random_verse(&self, options: VerseOptions) -> GatewayResult<Verse> {
        let number = rand::thread_rng().gen_range(1..=TOTAL_VERSES);
        let key = verse_key_by_number(number)
            .ok_or_else(|| {
                GatewayError::validation(format!("verse number {number} out of range"))
            })?;

        info!("🎲 Random verse {} -> {}", number, key);
        self.verse_by_key(key, options).await
    }

    async fn verse_by_key(&self, key: VerseKey, options: VerseOptions) -> GatewayResult<Verse> {
        let envelope: raw::VerseEnvelope = self
            .get("verse", &format!("/verses/by_key/{key}"), &Self::verse_query(options))
            .await?;
        debug!("✅ Successfully fetched verse {}", key);
        Ok(envelope.verse.into())
    }

    async fn search(&self, query: &SearchQuery) -> GatewayResult<SearchPage> {
        let mut params = vec![
            ("q", truncate_query(query.text())),
            ("size", cap_page_size(query.page_size()).to_string()),
            ("page", query.current_page().to_string()),
        ];
        if let Some(language) = query.language_hint() {
            params.push(("language", language.to_string()));
        }
        if !query.translation_filter().is_empty() {
            let ids: Vec<String> = query.translation_filter().iter().map(u32::to_string).collect();
            params.push(("translations", ids.join(",")));
        }

        let envelope: raw::SearchEnvelope = self.get("search", "/search", &params).await?;
        let page = SearchPage::from(envelope.search);
        info!("✅ Search for {:?}: {} results", query.text(), page.total_results);
        Ok(page)
    }

    async fn translations(&self, language: Option<String>) -> GatewayResult<Vec<TranslationInfo>> {
        let envelope: raw::TranslationsEnvelope = self
            .get("translations", "/resources/translations", &Self::language_query(language))
            .await?;
        Ok(envelope.translations.into_iter().map(TranslationInfo::from).collect())
    }

    async fn reciters(&self, language: Option<String>) -> GatewayResult<Vec<ReciterInfo>> {
        let envelope: raw::RecitationsEnvelope = self
            .get("reciters", "/resources/recitations", &Self::language_query(language))
            .await?;
        Ok(envelope.recitations.into_iter().map(ReciterInfo::from).collect())
    }

    async fn chapters(&self, language: Option<String>) -> GatewayResult<Vec<ChapterInfo>> {
        let envelope: raw::ChaptersEnvelope = self
            .get("chapters", "/chapters", &Self::language_query(language))
            .await?;
        Ok(envelope.chapters.into_iter().map(ChapterInfo::from).collect())
    }

    async fn chapter_verses(
        &self,
        chapter: Chapter,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<VersePage> {
        let list: raw::VerseListEnvelope = self
            .get(
                "chapter_verses",
                &format!("/verses/by_chapter/{chapter}"),
                &Self::paged_verse_query(page, options),
            )
            .await?;
        Ok(list.into())
    }

    async fn chapter_translation(
        &self,
        resource_id: TranslationId,
        chapter: Chapter,
    ) -> GatewayResult<ChapterTranslation> {
        let envelope: raw::ChapterTranslationEnvelope = self
            .get(
                "chapter_translation",
                &format!("/quran/translations/{resource_id}"),
                &[
                    ("chapter_number", chapter.to_string()),
                    ("fields", "verse_key".to_string()),
                ],
            )
            .await?;
        Ok(ChapterTranslation::from_raw(resource_id, chapter.number(), envelope))
    }

    async fn chapter_audio(
        &self,
        reciter: ReciterId,
        chapter: Chapter,
        segments: bool,
    ) -> GatewayResult<AudioFile> {
        let query = if segments {
            vec![("segments", "true".to_string())]
        } else {
            Vec::new()
        };
        let envelope: raw::AudioFileEnvelope = self
            .get(
                "chapter_audio",
                &format!("/chapter_recitations/{reciter}/{chapter}"),
                &query,
            )
            .await?;
        Ok(envelope.audio_file.into())
    }

    async fn verses_by_division(
        &self,
        division: Division,
        page: u32,
        options: VerseOptions,
    ) -> GatewayResult<VersePage> {
        let list: raw::VerseListEnvelope = self
            .get(
                division.name(),
                &format!("/verses/by_{}/{}", division.name(), division.number()),
                &Self::paged_verse_query(page, options),
            )
            .await?;
        Ok(list.into())
    }

    async fn verses_by_range(
        &self,
        range: VerseRange,
        options: VerseOptions,
    ) -> GatewayResult<Vec<Verse>> {
        collect_range(range, move |key| self.verse_by_key(key, options)).await
    }

    fn source_name(&self) -> &'static str {
        "quran.com"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::token::{MockCredentialExchange, TokenGrant};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPTIONS: VerseOptions = VerseOptions {
        translation: 131,
        reciter: 7,
    };

    fn client_for(server: &MockServer, tokens: Option<Arc<TokenManager>>) -> QuranApiClient {
        let http = build_http_client(Duration::from_secs(2)).unwrap();
        QuranApiClient::new(http, server.uri(), tokens)
    }

    fn verse_json(key: &str) -> serde_json::Value {
        let (_, verse) = key.split_once(':').unwrap();
        json!({
            "verse": {
                "id": 1,
                "verse_key": key,
                "verse_number": verse.parse::<u16>().unwrap(),
                "text_uthmani": "الٓمٓ"
            }
        })
    }

    fn stub_verse(key: &str) -> Verse {
        Verse::from(serde_json::from_value::<raw::VerseEnvelope>(verse_json(key)).unwrap().verse)
    }

    #[tokio::test]
    async fn search_caps_size_and_truncates_query_on_the_wire() {
        let server = MockServer::start().await;
        let long_query = "x".repeat(300);
        let expected_q = "x".repeat(250);

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("size", "50"))
            .and(query_param("q", expected_q.as_str()))
            .and(query_param("translations", "149,54"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "search": {
                    "query": expected_q,
                    "total_results": 1,
                    "current_page": 1,
                    "total_pages": 1,
                    "results": [{ "verse_key": "2:255", "verse_id": 262, "text": "..." }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = SearchQuery::new(&long_query)
            .unwrap()
            .size(999)
            .translations([149, 54]);
        let page = client_for(&server, None).search(&query).await.unwrap();

        assert_eq!(page.total_results, 1);
        assert_eq!(page.results[0].verse_key, "2:255");
    }

    #[tokio::test]
    async fn bearer_token_is_attached_when_credentials_are_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/verses/by_key/2:255"))
            .and(header("authorization", "Bearer secret-token"))
            .and(query_param("translations", "131"))
            .and(query_param("words", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(verse_json("2:255")))
            .expect(1)
            .mount(&server)
            .await;

        let mut exchange = MockCredentialExchange::new();
        exchange.expect_exchange().times(1).returning(|| {
            Ok(TokenGrant {
                access_token: "secret-token".into(),
                expires_in: 3600,
                token_type: None,
            })
        });
        let tokens = Arc::new(TokenManager::new(Arc::new(exchange)));

        let verse = client_for(&server, Some(tokens))
            .verse_by_key(VerseKey::new(2, 255).unwrap(), OPTIONS)
            .await
            .unwrap();
        assert_eq!(verse.verse_key, "2:255");
        assert_eq!(verse.chapter_id, 2);
    }

    #[tokio::test]
    async fn non_success_status_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapters"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).chapters(None).await.unwrap_err();
        match err {
            GatewayError::Upstream {
                operation,
                status,
                message,
            } => {
                assert_eq!(operation, "chapters");
                assert_eq!(status, Some(503));
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapters"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "chapters": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let http = build_http_client(Duration::from_millis(100)).unwrap();
        let client = QuranApiClient::new(http, server.uri(), None);

        let err = client.chapters(None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: None, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn catalogs_are_normalised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/recitations"))
            .and(query_param("language", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "recitations": [{
                    "id": 7,
                    "reciter_name": "Mishari Rashid al-`Afasy",
                    "style": null,
                    "translated_name": {
                        "name": "Mishari Rashid al-`Afasy",
                        "language_name": "english"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let reciters = client_for(&server, None).reciters(Some("en".into())).await.unwrap();
        assert_eq!(reciters.len(), 1);
        assert_eq!(reciters[0].id, 7);
        assert_eq!(reciters[0].translated_name.as_deref(), Some("Mishari Rashid al-`Afasy"));
    }

    #[tokio::test]
    async fn chapter_audio_requests_segments_only_when_asked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapter_recitations/7/1"))
            .and(query_param("segments", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audio_file": {
                    "id": 1,
                    "chapter_id": 1,
                    "audio_url": "https://example.org/1.mp3",
                    "duration": 47000,
                    "format": "mp3",
                    "timestamps": [{
                        "verse_key": "1:1",
                        "timestamp_from": 0,
                        "timestamp_to": 6090,
                        "segments": [[1, 0, 630]]
                    }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server, None)
            .chapter_audio(7, Chapter::new(1).unwrap(), true)
            .await
            .unwrap();
        assert_eq!(audio.duration_ms, Some(47000));
        assert_eq!(audio.timings[0].segments[0].end_ms, 630);
    }

    #[tokio::test]
    async fn range_fetch_skips_the_verse_that_fails() {
        let range = VerseRange::new(3, 1, 5).unwrap();

        let verses = collect_range(range, |key| async move {
            if key.verse() == 3 {
                Err(GatewayError::upstream("verse", Some(500), "boom"))
            } else {
                Ok(stub_verse(&key.to_string()))
            }
        })
        .await
        .unwrap();

        let keys: Vec<&str> = verses.iter().map(|v| v.verse_key.as_str()).collect();
        assert_eq!(keys, ["3:1", "3:2", "3:4", "3:5"]);
    }

    #[tokio::test]
    async fn range_fetch_reports_total_outage() {
        let range = VerseRange::new(3, 1, 3).unwrap();
        let result = collect_range(range, |_| async {
            Err(GatewayError::upstream("verse", None, "connection refused"))
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Upstream { .. })));
    }

    #[tokio::test]
    async fn range_fetch_over_http_issues_one_call_per_verse() {
        let server = MockServer::start().await;
        for verse in [1, 2, 4, 5] {
            let key = format!("3:{verse}");
            Mock::given(method("GET"))
                .and(path(format!("/verses/by_key/{key}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(verse_json(&key)))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/verses/by_key/3:3"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let verses = client_for(&server, None)
            .verses_by_range(VerseRange::new(3, 1, 5).unwrap(), OPTIONS)
            .await
            .unwrap();
        assert_eq!(verses.len(), 4);
    }
}
