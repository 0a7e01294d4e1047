//! Normalised content shapes returned by the gateway.
//!
//! Upstream JSON is decoded into the private `raw` structs first and then
//! converted, so field renames, nesting and missing values in the content
//! API never leak past this module. Everything public here is plain data,
//! safe to cache and to serialise.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub id: u32,
    pub verse_key: String,
    pub chapter_id: u16,
    pub verse_number: u16,
    pub text_uthmani: String,
    pub juz_number: Option<u16>,
    pub hizb_number: Option<u16>,
    pub rub_number: Option<u16>,
    pub page_number: Option<u16>,
    pub words: Vec<Word>,
    pub translations: Vec<VerseTranslation>,
    pub audio: Option<VerseAudio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub position: u32,
    pub text: String,
    pub translation: Option<String>,
    pub transliteration: Option<String>,
    pub audio_url: Option<String>,
    /// `word` or `end` (the verse-number glyph).
    pub char_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseTranslation {
    pub resource_id: u32,
    pub text: String,
    pub resource_name: Option<String>,
    pub language_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseAudio {
    pub url: String,
    pub segments: Vec<WordSegment>,
}

/// Playback window of one word, in milliseconds from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSegment {
    pub word: u32,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub per_page: u32,
    pub current_page: u32,
    pub next_page: Option<u32>,
    pub total_pages: u32,
    pub total_records: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersePage {
    pub verses: Vec<Verse>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub verse_key: String,
    pub verse_id: u32,
    pub text: String,
    pub highlighted: Option<String>,
    pub translations: Vec<VerseTranslation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationInfo {
    pub id: u32,
    pub name: String,
    pub author_name: Option<String>,
    pub slug: Option<String>,
    pub language_name: String,
    pub translated_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReciterInfo {
    pub id: u32,
    pub name: String,
    pub style: Option<String>,
    pub translated_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub id: u16,
    pub name_simple: String,
    pub name_arabic: String,
    pub translated_name: Option<String>,
    pub revelation_place: Option<String>,
    pub verses_count: u16,
    pub bismillah_pre: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationText {
    pub verse_key: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterTranslation {
    pub resource_id: u32,
    pub chapter: u16,
    pub translation_name: Option<String>,
    pub author_name: Option<String>,
    pub verses: Vec<TranslationText>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseTiming {
    pub verse_key: String,
    pub from_ms: u64,
    pub to_ms: u64,
    pub segments: Vec<WordSegment>,
}

/// Whole-chapter recitation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFile {
    pub id: u32,
    pub chapter_id: u16,
    pub audio_url: String,
    pub duration_ms: Option<u64>,
    pub file_size: Option<f64>,
    pub format: Option<String>,
    /// Empty unless segments were requested.
    pub timings: Vec<VerseTiming>,
}

pub(crate) mod raw {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct VerseEnvelope {
        pub verse: Verse,
    }

    #[derive(Debug, Deserialize)]
    pub struct VerseListEnvelope {
        #[serde(default)]
        pub verses: Vec<Verse>,
        pub pagination: Option<Pagination>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Verse {
        pub id: u32,
        pub verse_key: String,
        pub verse_number: u16,
        pub chapter_id: Option<u16>,
        #[serde(default)]
        pub text_uthmani: Option<String>,
        pub juz_number: Option<u16>,
        pub hizb_number: Option<u16>,
        pub rub_el_hizb_number: Option<u16>,
        pub page_number: Option<u16>,
        #[serde(default)]
        pub words: Vec<Word>,
        #[serde(default)]
        pub translations: Vec<Translation>,
        pub audio: Option<VerseAudio>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Word {
        pub position: u32,
        pub text_uthmani: Option<String>,
        pub text: Option<String>,
        pub char_type_name: Option<String>,
        pub audio_url: Option<String>,
        pub translation: Option<TextField>,
        pub transliteration: Option<TextField>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TextField {
        pub text: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Translation {
        pub resource_id: u32,
        #[serde(default)]
        pub text: String,
        pub resource_name: Option<String>,
        pub name: Option<String>,
        pub language_name: Option<String>,
        pub verse_key: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct VerseAudio {
        pub url: String,
        #[serde(default)]
        pub segments: Vec<Vec<f64>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Pagination {
        pub per_page: u32,
        pub current_page: u32,
        pub next_page: Option<u32>,
        pub total_pages: u32,
        pub total_records: u32,
    }

    #[derive(Debug, Deserialize)]
    pub struct SearchEnvelope {
        pub search: Search,
    }

    #[derive(Debug, Deserialize)]
    pub struct Search {
        #[serde(default)]
        pub query: String,
        #[serde(default)]
        pub total_results: u32,
        #[serde(default)]
        pub current_page: u32,
        #[serde(default)]
        pub total_pages: u32,
        #[serde(default)]
        pub results: Vec<SearchResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SearchResult {
        pub verse_key: String,
        pub verse_id: u32,
        #[serde(default)]
        pub text: String,
        pub highlighted: Option<String>,
        #[serde(default)]
        pub translations: Vec<Translation>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TranslatedName {
        pub name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TranslationsEnvelope {
        #[serde(default)]
        pub translations: Vec<TranslationResource>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TranslationResource {
        pub id: u32,
        pub name: String,
        pub author_name: Option<String>,
        pub slug: Option<String>,
        #[serde(default)]
        pub language_name: String,
        pub translated_name: Option<TranslatedName>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RecitationsEnvelope {
        #[serde(default)]
        pub recitations: Vec<Recitation>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Recitation {
        pub id: u32,
        pub reciter_name: String,
        pub style: Option<String>,
        pub translated_name: Option<TranslatedName>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ChaptersEnvelope {
        #[serde(default)]
        pub chapters: Vec<Chapter>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Chapter {
        pub id: u16,
        pub name_simple: String,
        #[serde(default)]
        pub name_arabic: String,
        pub revelation_place: Option<String>,
        pub verses_count: u16,
        #[serde(default)]
        pub bismillah_pre: bool,
        pub translated_name: Option<TranslatedName>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ChapterTranslationEnvelope {
        #[serde(default)]
        pub translations: Vec<Translation>,
        pub meta: Option<TranslationMeta>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TranslationMeta {
        pub translation_name: Option<String>,
        pub author_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct AudioFileEnvelope {
        pub audio_file: AudioFile,
    }

    #[derive(Debug, Deserialize)]
    pub struct AudioFile {
        pub id: u32,
        pub chapter_id: u16,
        pub audio_url: String,
        pub duration: Option<u64>,
        pub file_size: Option<f64>,
        pub format: Option<String>,
        #[serde(default)]
        pub timestamps: Vec<Timestamp>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Timestamp {
        pub verse_key: String,
        pub timestamp_from: u64,
        pub timestamp_to: u64,
        #[serde(default)]
        pub segments: Vec<Vec<f64>>,
    }
}

/// Segments arrive as `[word, start, end]` or, for some reciters,
/// `[index, word, start, end]`; the last three numbers are what matters.
fn segments(rows: Vec<Vec<f64>>) -> Vec<WordSegment> {
    rows.into_iter()
        .filter_map(|row| match row.as_slice() {
            [.., word, start, end] => Some(WordSegment {
                word: *word as u32,
                start_ms: *start as u64,
                end_ms: *end as u64,
            }),
            _ => None,
        })
        .collect()
}

fn translated(name: Option<raw::TranslatedName>) -> Option<String> {
    name.and_then(|n| n.name)
}

impl From<raw::Verse> for Verse {
    fn from(v: raw::Verse) -> Self {
        let chapter_id = v.chapter_id.unwrap_or_else(|| {
            v.verse_key
                .split_once(':')
                .and_then(|(chapter, _)| chapter.parse().ok())
                .unwrap_or_default()
        });

        Self {
            id: v.id,
            verse_key: v.verse_key,
            chapter_id,
            verse_number: v.verse_number,
            text_uthmani: v.text_uthmani.unwrap_or_default(),
            juz_number: v.juz_number,
            hizb_number: v.hizb_number,
            rub_number: v.rub_el_hizb_number,
            page_number: v.page_number,
            words: v.words.into_iter().map(Word::from).collect(),
            translations: v.translations.into_iter().map(VerseTranslation::from).collect(),
            audio: v.audio.map(|a| VerseAudio {
                url: a.url,
                segments: segments(a.segments),
            }),
        }
    }
}

impl From<raw::Word> for Word {
    fn from(w: raw::Word) -> Self {
        Self {
            position: w.position,
            text: w.text_uthmani.or(w.text).unwrap_or_default(),
            translation: w.translation.and_then(|t| t.text),
            transliteration: w.transliteration.and_then(|t| t.text),
            audio_url: w.audio_url,
            char_type: w.char_type_name.unwrap_or_else(|| "word".to_string()),
        }
    }
}

impl From<raw::Translation> for VerseTranslation {
    fn from(t: raw::Translation) -> Self {
        Self {
            resource_id: t.resource_id,
            text: t.text,
            resource_name: t.resource_name.or(t.name),
            language_name: t.language_name,
        }
    }
}

impl From<raw::Pagination> for Pagination {
    fn from(p: raw::Pagination) -> Self {
        Self {
            per_page: p.per_page,
            current_page: p.current_page,
            next_page: p.next_page,
            total_pages: p.total_pages,
            total_records: p.total_records,
        }
    }
}

impl From<raw::VerseListEnvelope> for VersePage {
    fn from(list: raw::VerseListEnvelope) -> Self {
        let verses: Vec<Verse> = list.verses.into_iter().map(Verse::from).collect();
        // Sin paginación upstream, todo cabe en una página
        let pagination = list.pagination.map(Pagination::from).unwrap_or(Pagination {
            per_page: verses.len() as u32,
            current_page: 1,
            next_page: None,
            total_pages: 1,
            total_records: verses.len() as u32,
        });
        Self { verses, pagination }
    }
}

impl From<raw::Search> for SearchPage {
    fn from(s: raw::Search) -> Self {
        Self {
            query: s.query,
            results: s
                .results
                .into_iter()
                .map(|r| SearchHit {
                    verse_key: r.verse_key,
                    verse_id: r.verse_id,
                    text: r.text,
                    highlighted: r.highlighted,
                    translations: r.translations.into_iter().map(VerseTranslation::from).collect(),
                })
                .collect(),
            current_page: s.current_page,
            total_pages: s.total_pages,
            total_results: s.total_results,
        }
    }
}

impl From<raw::TranslationResource> for TranslationInfo {
    fn from(t: raw::TranslationResource) -> Self {
        Self {
            id: t.id,
            name: t.name,
            author_name: t.author_name,
            slug: t.slug,
            language_name: t.language_name,
            translated_name: translated(t.translated_name),
        }
    }
}

impl From<raw::Recitation> for ReciterInfo {
    fn from(r: raw::Recitation) -> Self {
        Self {
            id: r.id,
            name: r.reciter_name,
            style: r.style,
            translated_name: translated(r.translated_name),
        }
    }
}

impl From<raw::Chapter> for ChapterInfo {
    fn from(c: raw::Chapter) -> Self {
        Self {
            id: c.id,
            name_simple: c.name_simple,
            name_arabic: c.name_arabic,
            translated_name: translated(c.translated_name),
            revelation_place: c.revelation_place,
            verses_count: c.verses_count,
            bismillah_pre: c.bismillah_pre,
        }
    }
}

impl ChapterTranslation {
    pub(crate) fn from_raw(
        resource_id: u32,
        chapter: u16,
        raw: raw::ChapterTranslationEnvelope,
    ) -> Self {
        let (translation_name, author_name) = raw
            .meta
            .map(|m| (m.translation_name, m.author_name))
            .unwrap_or_default();
        Self {
            resource_id,
            chapter,
            translation_name,
            author_name,
            verses: raw
                .translations
                .into_iter()
                .map(|t| TranslationText {
                    verse_key: t.verse_key,
                    text: t.text,
                })
                .collect(),
        }
    }
}

impl From<raw::AudioFile> for AudioFile {
    fn from(a: raw::AudioFile) -> Self {
        let timings: Vec<VerseTiming> = a
            .timestamps
            .into_iter()
            .map(|t| VerseTiming {
                verse_key: t.verse_key,
                from_ms: t.timestamp_from,
                to_ms: t.timestamp_to,
                segments: segments(t.segments),
            })
            .collect();
        let duration_ms = a.duration.or_else(|| timings.last().map(|t| t.to_ms));

        Self {
            id: a.id,
            chapter_id: a.chapter_id,
            audio_url: a.audio_url,
            duration_ms,
            file_size: a.file_size,
            format: a.format,
            timings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn verse_normalisation_flattens_nested_fields() {
        let raw: raw::VerseEnvelope = serde_json::from_value(json!({
            "verse": {
                "id": 262,
                "verse_number": 255,
                "verse_key": "2:255",
                "text_uthmani": "ٱللَّهُ لَآ إِلَـٰهَ إِلَّا هُوَ",
                "juz_number": 3,
                "hizb_number": 5,
                "rub_el_hizb_number": 17,
                "page_number": 42,
                "words": [{
                    "position": 1,
                    "text_uthmani": "ٱللَّهُ",
                    "char_type_name": "word",
                    "audio_url": "wbw/002_255_001.mp3",
                    "translation": { "text": "Allah" },
                    "transliteration": { "text": "al-lahu" }
                }],
                "translations": [{
                    "resource_id": 131,
                    "text": "Allah - there is no deity except Him"
                }],
                "audio": {
                    "url": "Alafasy/mp3/002255.mp3",
                    "segments": [[0, 1, 0, 630], [1, 2, 630, 1200]]
                }
            }
        }))
        .unwrap();

        let verse = Verse::from(raw.verse);
        assert_eq!(verse.chapter_id, 2);
        assert_eq!(verse.rub_number, Some(17));
        assert_eq!(verse.words[0].translation.as_deref(), Some("Allah"));
        assert_eq!(verse.translations[0].resource_id, 131);
        assert_eq!(
            verse.audio.unwrap().segments,
            vec![
                WordSegment { word: 1, start_ms: 0, end_ms: 630 },
                WordSegment { word: 2, start_ms: 630, end_ms: 1200 },
            ]
        );
    }

    #[test]
    fn verse_list_without_pagination_is_a_single_page() {
        let raw: raw::VerseListEnvelope = serde_json::from_value(json!({
            "verses": [
                { "id": 1, "verse_number": 1, "verse_key": "1:1" },
                { "id": 2, "verse_number": 2, "verse_key": "1:2" }
            ]
        }))
        .unwrap();

        let page = VersePage::from(raw);
        assert_eq!(page.verses.len(), 2);
        assert_eq!(page.pagination.total_records, 2);
        assert_eq!(page.pagination.next_page, None);
    }

    #[test]
    fn audio_duration_falls_back_to_last_timing() {
        let raw: raw::AudioFileEnvelope = serde_json::from_value(json!({
            "audio_file": {
                "id": 43,
                "chapter_id": 1,
                "audio_url": "https://download.quranicaudio.com/qdc/afasy/1.mp3",
                "format": "mp3",
                "file_size": 710000.0,
                "timestamps": [
                    {
                        "verse_key": "1:1",
                        "timestamp_from": 0,
                        "timestamp_to": 6090,
                        "segments": [[1, 0, 630]]
                    },
                    { "verse_key": "1:2", "timestamp_from": 6090, "timestamp_to": 11200 }
                ]
            }
        }))
        .unwrap();

        let audio = AudioFile::from(raw.audio_file);
        assert_eq!(audio.duration_ms, Some(11200));
        assert_eq!(audio.timings.len(), 2);
        assert_eq!(audio.timings[0].segments.len(), 1);
        assert!(audio.timings[1].segments.is_empty());
    }
}
