//! Positional vocabulary of the text: chapters, verse keys, reading
//! divisions and ranges, plus the search request shape.
//!
//! Every constructor here validates its input, so anything that reaches the
//! cache or the upstream API is already known to be well formed.

use std::{fmt, str::FromStr};

use crate::sources::error::{GatewayError, GatewayResult};

pub type TranslationId = u32;
pub type ReciterId = u32;

pub const CHAPTER_COUNT: u16 = 114;
pub const TOTAL_VERSES: u16 = 6236;

pub const MAX_RANGE_VERSES: u16 = 100;
pub const MAX_QUERY_CHARS: usize = 250;
pub const MAX_SEARCH_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;

/// Verses per chapter in canonical order.
const CHAPTER_VERSE_COUNTS: [u16; 114] = [
    7, 286, 200, 176, 120, 165, 206, 75, 129, 109, //
    123, 111, 43, 52, 99, 128, 111, 110, 98, 135, //
    112, 78, 118, 64, 77, 227, 93, 88, 69, 60, //
    34, 30, 73, 54, 45, 83, 182, 88, 75, 85, //
    54, 53, 89, 59, 37, 35, 38, 29, 18, 45, //
    60, 49, 62, 55, 78, 96, 29, 22, 24, 13, //
    14, 11, 11, 18, 12, 12, 30, 52, 52, 44, //
    28, 28, 20, 56, 40, 31, 50, 40, 46, 42, //
    29, 19, 36, 25, 22, 17, 19, 26, 30, 20, //
    15, 21, 11, 8, 8, 19, 5, 8, 8, 11, //
    11, 8, 3, 9, 5, 4, 7, 3, 6, 3, //
    5, 4, 5, 6,
];

/// `CUMULATIVE_VERSES[i]` is the number of the last verse of chapter `i + 1`.
const CUMULATIVE_VERSES: [u16; 114] = cumulative_verse_counts();

const fn cumulative_verse_counts() -> [u16; 114] {
    let mut out = [0u16; 114];
    let mut total = 0u16;
    let mut i = 0;
    while i < CHAPTER_VERSE_COUNTS.len() {
        total += CHAPTER_VERSE_COUNTS[i];
        out[i] = total;
        i += 1;
    }
    out
}

/// Number of verses in `chapter`, or `None` outside 1..=114.
pub fn chapter_verse_count(chapter: u16) -> Option<u16> {
    if chapter == 0 {
        return None;
    }
    CHAPTER_VERSE_COUNTS.get(usize::from(chapter) - 1).copied()
}

/// Maps an absolute verse number (1..=6236) to its `chapter:verse` key.
pub fn verse_key_by_number(number: u16) -> Option<VerseKey> {
    if number == 0 || number > TOTAL_VERSES {
        return None;
    }

    let index = CUMULATIVE_VERSES.partition_point(|&last| last < number);
    let before = if index == 0 { 0 } else { CUMULATIVE_VERSES[index - 1] };

    Some(VerseKey {
        chapter: Chapter(index as u16 + 1),
        verse: number - before,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chapter(u16);

impl Chapter {
    pub fn new(number: u16) -> GatewayResult<Self> {
        if (1..=CHAPTER_COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(GatewayError::validation(format!(
                "invalid chapter number {number}, must be between 1 and {CHAPTER_COUNT}"
            )))
        }
    }

    pub fn number(self) -> u16 {
        self.0
    }

    pub fn verse_count(self) -> u16 {
        CHAPTER_VERSE_COUNTS[usize::from(self.0) - 1]
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `chapter:verse` position such as `2:255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerseKey {
    chapter: Chapter,
    verse: u16,
}

impl VerseKey {
    pub fn new(chapter: u16, verse: u16) -> GatewayResult<Self> {
        let chapter = Chapter::new(chapter)?;
        if verse == 0 || verse > chapter.verse_count() {
            return Err(GatewayError::validation(format!(
                "invalid verse number {verse}, chapter {chapter} has {} verses",
                chapter.verse_count()
            )));
        }
        Ok(Self { chapter, verse })
    }

    pub fn chapter(self) -> Chapter {
        self.chapter
    }

    pub fn verse(self) -> u16 {
        self.verse
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.verse)
    }
}

impl FromStr for VerseKey {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chapter, verse) = s.split_once(':').ok_or_else(|| {
            GatewayError::validation(format!("invalid verse key {s:?}, expected chapter:verse"))
        })?;
        let chapter = chapter
            .trim()
            .parse()
            .map_err(|_| GatewayError::validation(format!("invalid chapter in verse key {s:?}")))?;
        let verse = verse
            .trim()
            .parse()
            .map_err(|_| GatewayError::validation(format!("invalid verse in verse key {s:?}")))?;
        Self::new(chapter, verse)
    }
}

/// Fixed-size reading divisions that cross chapter boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Division {
    Juz(u16),
    Hizb(u16),
    Rub(u16),
}

impl Division {
    pub fn juz(number: u16) -> GatewayResult<Self> {
        Self::checked(Self::Juz(number))
    }

    pub fn hizb(number: u16) -> GatewayResult<Self> {
        Self::checked(Self::Hizb(number))
    }

    pub fn rub(number: u16) -> GatewayResult<Self> {
        Self::checked(Self::Rub(number))
    }

    fn checked(division: Self) -> GatewayResult<Self> {
        let number = division.number();
        if (1..=division.count()).contains(&number) {
            Ok(division)
        } else {
            Err(GatewayError::validation(format!(
                "invalid {} number {number}, must be between 1 and {}",
                division.name(),
                division.count()
            )))
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Juz(_) => "juz",
            Self::Hizb(_) => "hizb",
            Self::Rub(_) => "rub",
        }
    }

    pub fn number(self) -> u16 {
        match self {
            Self::Juz(n) | Self::Hizb(n) | Self::Rub(n) => n,
        }
    }

    fn count(self) -> u16 {
        match self {
            Self::Juz(_) => 30,
            Self::Hizb(_) => 60,
            Self::Rub(_) => 240,
        }
    }
}

/// Consecutive verses inside one chapter, at most [`MAX_RANGE_VERSES`] long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerseRange {
    chapter: Chapter,
    start: u16,
    end: u16,
}

impl VerseRange {
    pub fn new(chapter: u16, start: u16, end: u16) -> GatewayResult<Self> {
        let chapter = Chapter::new(chapter)?;
        if start == 0 || end == 0 {
            return Err(GatewayError::validation("invalid verse range"));
        }
        if start > end {
            return Err(GatewayError::validation(
                "start verse must be less than or equal to end verse",
            ));
        }
        if end - start + 1 > MAX_RANGE_VERSES {
            return Err(GatewayError::validation(format!(
                "range too large, maximum {MAX_RANGE_VERSES} verses at a time"
            )));
        }
        if end > chapter.verse_count() {
            return Err(GatewayError::validation(format!(
                "chapter {chapter} has only {} verses",
                chapter.verse_count()
            )));
        }
        Ok(Self { chapter, start, end })
    }

    pub fn chapter(self) -> Chapter {
        self.chapter
    }

    pub fn start(self) -> u16 {
        self.start
    }

    pub fn end(self) -> u16 {
        self.end
    }

    pub fn len(self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(self) -> bool {
        false
    }

    pub fn keys(self) -> impl Iterator<Item = VerseKey> {
        (self.start..=self.end).map(move |verse| VerseKey {
            chapter: self.chapter,
            verse,
        })
    }
}

/// Translation edition plus reciter that accompany a verse fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerseOptions {
    pub translation: TranslationId,
    pub reciter: ReciterId,
}

/// Full-text search request, already capped to what upstream accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    text: String,
    page: u32,
    size: u32,
    language: Option<String>,
    translations: Vec<TranslationId>,
}

impl SearchQuery {
    pub fn new(text: &str) -> GatewayResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::validation("search query is required"));
        }
        Ok(Self {
            text: truncate_query(text),
            page: 1,
            size: DEFAULT_SEARCH_PAGE_SIZE,
            language: None,
            translations: Vec::new(),
        })
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = cap_page_size(size);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = (!language.is_empty()).then_some(language);
        self
    }

    pub fn translations(mut self, ids: impl IntoIterator<Item = TranslationId>) -> Self {
        self.translations = ids.into_iter().collect();
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current_page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.size
    }

    pub fn language_hint(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn translation_filter(&self) -> &[TranslationId] {
        &self.translations
    }
}

/// Cuts a query to the upstream limit, counting characters, not bytes.
pub(crate) fn truncate_query(text: &str) -> String {
    text.chars().take(MAX_QUERY_CHARS).collect()
}

pub(crate) fn cap_page_size(size: u32) -> u32 {
    size.clamp(1, MAX_SEARCH_PAGE_SIZE)
}
