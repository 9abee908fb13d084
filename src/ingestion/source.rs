use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque upstream producing the raw text of a book.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, book_id: u32) -> Result<String>;
}

/// Fetches plain-text books from the Project Gutenberg cache.
pub struct GutenbergSource {
    http_client: reqwest::Client,
}

impl GutenbergSource {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    fn url(book_id: u32) -> String {
        format!(
            "https://www.gutenberg.org/cache/epub/{}/pg{}.txt",
            book_id, book_id
        )
    }
}

impl Default for GutenbergSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for GutenbergSource {
    async fn fetch(&self, book_id: u32) -> Result<String> {
        let url = Self::url(book_id);
        let response = self
            .http_client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {} fetching {}", response.status(), url);
        }
        Ok(response.text().await?)
    }
}
