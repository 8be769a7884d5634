//! ISBN metadata lookup against public book APIs.
//!
//! Providers are queried in sequence: Google Books first, then Open
//! Library. The first hit wins. A provider failure is logged and the
//! next provider is tried; when every provider misses, the lookup fails
//! with [`ClientError::MetadataNotFound`].

use crate::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_engine::isbn;

const GOOGLE_BOOKS_URL: &str = "https://www.googleapis.com/books/v1/volumes";
const OPEN_LIBRARY_URL: &str = "https://openlibrary.org/api/books";

/// Book metadata assembled from a provider response.
///
/// Missing provider fields fall back to empty values rather than
/// failing the lookup; only a wholly absent record counts as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    pub isbn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub page_count: u64,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// ISBN lookup client.
#[derive(Debug, Clone)]
pub struct MetadataLookup {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl MetadataLookup {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    /// Normalize and validate a raw ISBN, then query the providers until
    /// one answers.
    pub async fn lookup(&self, raw_isbn: &str) -> Result<BookMetadata> {
        let isbn = isbn::checked(raw_isbn)?;

        match self.from_google_books(&isbn).await {
            Ok(Some(metadata)) => return Ok(metadata),
            Ok(None) => tracing::debug!(isbn = %isbn, "google books has no match"),
            Err(e) => tracing::warn!(isbn = %isbn, error = %e, "google books lookup failed"),
        }

        match self.from_open_library(&isbn).await {
            Ok(Some(metadata)) => return Ok(metadata),
            Ok(None) => tracing::debug!(isbn = %isbn, "open library has no match"),
            Err(e) => tracing::warn!(isbn = %isbn, error = %e, "open library lookup failed"),
        }

        Err(ClientError::MetadataNotFound(isbn))
    }

    async fn from_google_books(&self, isbn: &str) -> Result<Option<BookMetadata>> {
        let mut url = format!("{GOOGLE_BOOKS_URL}?q=isbn:{isbn}");
        if let Some(key) = &self.api_key {
            url.push_str("&key=");
            url.push_str(key);
        }

        let body: Value = self.http.get(&url).send().await?.json().await?;
        Ok(parse_google_books(isbn, &body))
    }

    async fn from_open_library(&self, isbn: &str) -> Result<Option<BookMetadata>> {
        let url = format!("{OPEN_LIBRARY_URL}?bibkeys=ISBN:{isbn}&format=json&jscmd=data");

        let body: Value = self.http.get(&url).send().await?.json().await?;
        Ok(parse_open_library(isbn, &body))
    }
}

/// Extract metadata from a Google Books volumes response.
pub fn parse_google_books(isbn: &str, body: &Value) -> Option<BookMetadata> {
    let volume = body.get("items")?.get(0)?.get("volumeInfo")?;

    // Prefer the highest-resolution cover available.
    let cover = volume
        .get("imageLinks")
        .and_then(|links| {
            [
                "extraLarge",
                "large",
                "medium",
                "small",
                "thumbnail",
                "smallThumbnail",
            ]
            .iter()
            .find_map(|size| links.get(*size).and_then(Value::as_str))
        })
        .map(polish_cover_url);

    let author = volume
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| "Unknown Author".to_string());

    let categories = volume
        .get("categories")
        .and_then(Value::as_array)
        .map(|categories| {
            categories
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(BookMetadata {
        title: text_or(volume, "title", "Unknown Title"),
        author,
        cover,
        isbn: isbn.to_string(),
        description: text_or(volume, "description", ""),
        published_date: text_or(volume, "publishedDate", ""),
        page_count: volume.get("pageCount").and_then(Value::as_u64).unwrap_or(0),
        categories,
    })
}

/// Extract metadata from an Open Library books response.
pub fn parse_open_library(isbn: &str, body: &Value) -> Option<BookMetadata> {
    let key = format!("ISBN:{isbn}");
    let book = body.get(key.as_str())?;

    let author = book
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|author| author.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| "Unknown Author".to_string());

    let cover = book
        .get("cover")
        .and_then(|cover| {
            ["medium", "large", "small"]
                .iter()
                .find_map(|size| cover.get(*size).and_then(Value::as_str))
        })
        .map(str::to_string);

    Some(BookMetadata {
        title: text_or(book, "title", "Unknown Title"),
        author,
        cover,
        isbn: isbn.to_string(),
        description: text_or(book, "description", ""),
        published_date: text_or(book, "publish_date", ""),
        page_count: book
            .get("number_of_pages")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        categories: Vec::new(),
    })
}

/// Upgrade a cover url to https and strip the zoom parameter Google
/// appends to thumbnail links.
pub fn polish_cover_url(url: &str) -> String {
    let upgraded = url.replacen("http://", "https://", 1);
    strip_zoom(&upgraded)
}

fn strip_zoom(url: &str) -> String {
    let Some(start) = url.find("&zoom=") else {
        return url.to_string();
    };
    let tail = &url[start + "&zoom=".len()..];
    let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
    format!("{}{}", &url[..start], &tail[digits..])
}

fn text_or(value: &Value, field: &str, default: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}
