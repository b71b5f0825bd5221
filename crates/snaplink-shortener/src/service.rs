use std::sync::Arc;

use jiff::Timestamp;
use snaplink_core::{
    list_page, LinkFilter, LinkRecord, LinkRepository, NewLink, Page, PageLimits, ShortCode,
    StorageError,
};
use snaplink_generator::Generator;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::allocator::IdentifierAllocator;
use crate::error::{Result, ShortenerError};
use crate::params::ShortenParams;

const MAX_URL_LENGTH: usize = 2048;

/// Tunables of a [`ShortenerService`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct ShortenerSettings {
    /// Candidates drawn before giving up on a generated code.
    #[builder(default = 5)]
    pub max_attempts: usize,
    #[builder(default)]
    pub page_limits: PageLimits,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Creates and administers short links.
///
/// Generated codes go through an [`IdentifierAllocator`]; custom aliases
/// get exactly one insert and surface a conflict as
/// [`ShortenerError::AliasConflict`].
#[derive(Debug)]
pub struct ShortenerService<R, G> {
    repository: Arc<R>,
    allocator: IdentifierAllocator<G>,
    page_limits: PageLimits,
}

impl<R, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            allocator: self.allocator.clone(),
            page_limits: self.page_limits,
        }
    }
}

impl<R: LinkRepository, G: Generator> ShortenerService<R, G> {
    pub fn new(repository: R, generator: G) -> Self {
        Self::with_settings(repository, generator, ShortenerSettings::default())
    }

    pub fn with_settings(repository: R, generator: G, settings: ShortenerSettings) -> Self {
        Self::from_shared(Arc::new(repository), generator, settings)
    }

    /// Builds a service over a repository that other services also use.
    pub fn from_shared(repository: Arc<R>, generator: G, settings: ShortenerSettings) -> Self {
        Self {
            repository,
            allocator: IdentifierAllocator::new(generator, settings.max_attempts),
            page_limits: settings.page_limits,
        }
    }

    /// Validates that the URL is an absolute http(s) URL of bounded length.
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl("URL cannot be empty".to_string()));
        }

        if url.chars().count() > MAX_URL_LENGTH {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL exceeds {MAX_URL_LENGTH} characters"
            )));
        }

        if url.chars().any(char::is_whitespace) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must not contain whitespace: {url}"
            )));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        };

        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {scheme}"
            )));
        }

        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('@')
            .next()
            .unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return Err(ShortenerError::InvalidUrl(format!("URL has no host: {url}")));
        }

        Ok(())
    }

    /// Shortens a URL and returns the stored link.
    pub async fn shorten(&self, params: ShortenParams) -> Result<LinkRecord> {
        self.shorten_at(params, Timestamp::now()).await
    }

    /// Like [`shorten`](Self::shorten), stamping the link as created at `now`.
    pub async fn shorten_at(&self, params: ShortenParams, now: Timestamp) -> Result<LinkRecord> {
        let original_url = params.original_url.trim().to_string();
        Self::validate_url(&original_url)?;
        let expire_at = params.expiration.expire_at(now)?;

        let new_link = |code: ShortCode| NewLink {
            code,
            original_url: original_url.clone(),
            expire_at,
            redirect_type: params.redirect_type,
            created_at: now,
        };

        let link = match params.custom_alias {
            Some(alias) => match self.repository.insert(new_link(alias)).await {
                Ok(link) => link,
                Err(StorageError::Conflict(code)) => {
                    return Err(ShortenerError::AliasConflict(code))
                }
                Err(err) => return Err(err.into()),
            },
            None => {
                self.allocator
                    .allocate(|code| self.repository.insert(new_link(code)))
                    .await?
            }
        };

        info!(code = %link.code, id = %link.id, "short link created");
        Ok(link)
    }

    /// Looks up a link by code regardless of its state.
    pub async fn get(&self, code: &ShortCode) -> Result<LinkRecord> {
        self.repository
            .get(code)
            .await?
            .ok_or_else(|| ShortenerError::NotFound(code.to_string()))
    }

    /// Lists links newest first.
    ///
    /// `requested_limit` is the raw client value; it is normalized with the
    /// configured [`PageLimits`].
    pub async fn list(
        &self,
        filter: LinkFilter,
        cursor: Option<&str>,
        requested_limit: Option<i64>,
    ) -> Result<Page<LinkRecord>> {
        let limit = self.page_limits.clamp(requested_limit);
        debug!(limit, has_cursor = cursor.is_some(), "listing short links");
        Ok(list_page(self.repository.as_ref(), filter, cursor, limit).await?)
    }

    /// Deactivates a link. Its code stays reserved.
    ///
    /// Returns `false` if the link was already inactive.
    pub async fn deactivate(&self, code: &ShortCode) -> Result<bool> {
        if self.repository.deactivate(code).await? {
            info!(code = %code, "short link deactivated");
            return Ok(true);
        }

        // Tell "already inactive" apart from "never existed".
        match self.repository.get(code).await? {
            Some(_) => Ok(false),
            None => Err(ShortenerError::NotFound(code.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ExpirationPolicy;
    use jiff::SignedDuration;
    use snaplink_core::{Cursor, RedirectType};
    use snaplink_generator::{RandomGenerator, SeqGenerator};
    use snaplink_storage::InMemoryStore;
    use std::collections::HashSet;

    fn test_service() -> ShortenerService<InMemoryStore, SeqGenerator> {
        ShortenerService::new(InMemoryStore::new(), SeqGenerator::with_prefix("sl"))
    }

    fn alias(s: &str) -> ShortCode {
        ShortCode::new(s).unwrap()
    }

    #[tokio::test]
    async fn shorten_with_generated_code() {
        let service = test_service();

        let link = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();

        assert_eq!(link.code.as_str(), "sl000000");
        assert_eq!(link.original_url, "https://example.com");
        assert_eq!(link.clicks, 0);
        assert!(link.is_active);
        assert_eq!(link.redirect_type, RedirectType::MovedPermanently);
    }

    #[tokio::test]
    async fn generated_code_skips_taken_aliases() {
        let service = test_service();
        service
            .shorten(ShortenParams::new("https://one.example").with_alias(alias("sl000000")))
            .await
            .unwrap();

        let link = service
            .shorten(ShortenParams::new("https://two.example"))
            .await
            .unwrap();
        assert_eq!(link.code.as_str(), "sl000001");
    }

    #[tokio::test]
    async fn exhausted_budget_is_reported() {
        let service = ShortenerService::with_settings(
            InMemoryStore::new(),
            SeqGenerator::with_prefix("sl"),
            ShortenerSettings::builder().max_attempts(2).build(),
        );
        for taken in ["sl000000", "sl000001"] {
            service
                .shorten(ShortenParams::new("https://example.com").with_alias(alias(taken)))
                .await
                .unwrap();
        }

        let err = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::AllocationExhausted { attempts: 2 }));
    }

    #[tokio::test]
    async fn duplicate_alias_conflicts() {
        let service = test_service();
        let params = ShortenParams::new("https://example.com").with_alias(alias("my-alias"));

        service.shorten(params.clone()).await.unwrap();
        let err = service.shorten(params).await.unwrap_err();
        assert!(matches!(err, ShortenerError::AliasConflict(code) if code == "my-alias"));
    }

    #[tokio::test]
    async fn deactivated_alias_stays_reserved() {
        let service = test_service();
        let params = ShortenParams::new("https://example.com").with_alias(alias("keep"));

        service.shorten(params.clone()).await.unwrap();
        assert!(service.deactivate(&alias("keep")).await.unwrap());
        assert!(!service.deactivate(&alias("keep")).await.unwrap());

        let err = service.shorten(params).await.unwrap_err();
        assert!(matches!(err, ShortenerError::AliasConflict(_)));
    }

    #[tokio::test]
    async fn deactivate_missing_is_not_found() {
        let err = test_service().deactivate(&alias("nope")).await.unwrap_err();
        assert!(matches!(err, ShortenerError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let service = test_service();
        let too_long = format!("https://example.com/{}", "a".repeat(2048));

        for url in [
            "",
            "not-a-valid-url",
            "ftp://example.com",
            "https://",
            "https:///path",
            "https://exa mple.com",
            too_long.as_str(),
        ] {
            let err = service.shorten(ShortenParams::new(url)).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn expiration_and_redirect_type_are_stored() {
        let service = test_service();
        let now = Timestamp::from_second(1_767_225_600).unwrap();

        let link = service
            .shorten_at(
                ShortenParams::new("https://example.com")
                    .with_expiration(ExpirationPolicy::AfterDuration(SignedDuration::from_hours(
                        24,
                    )))
                    .with_redirect_type(RedirectType::TemporaryRedirect),
                now,
            )
            .await
            .unwrap();

        assert_eq!(link.expire_at, Some(now + SignedDuration::from_hours(24)));
        assert_eq!(link.redirect_type, RedirectType::TemporaryRedirect);
        assert_eq!(service.get(&link.code).await.unwrap(), link);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let err = test_service().get(&alias("missing")).await.unwrap_err();
        assert!(matches!(err, ShortenerError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pages_newest_first_with_clamped_limit() {
        let service = ShortenerService::with_settings(
            InMemoryStore::new(),
            SeqGenerator::with_prefix("sl"),
            ShortenerSettings::builder()
                .page_limits(PageLimits::builder().default_limit(2).max_limit(3).build())
                .build(),
        );
        let base = Timestamp::from_second(1_767_225_600).unwrap();
        for i in 0..5 {
            service
                .shorten_at(
                    ShortenParams::new(format!("https://example.com/{i}")),
                    base + SignedDuration::from_secs(i),
                )
                .await
                .unwrap();
        }

        let first = service.list(LinkFilter::default(), None, None).await.unwrap();
        assert_eq!(first.page.limit, 2);
        let codes: Vec<&str> = first.items.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, ["sl000004", "sl000003"]);

        let cursor = first.next_cursor().map(Cursor::as_str);
        let rest = service
            .list(LinkFilter::default(), cursor, Some(50))
            .await
            .unwrap();
        assert_eq!(rest.page.limit, 3);
        let codes: Vec<&str> = rest.items.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, ["sl000002", "sl000001", "sl000000"]);
        assert!(!rest.has_next_page());
    }

    #[tokio::test]
    async fn list_filters_inactive_links() {
        let service = test_service();
        for code in ["one", "two", "three"] {
            service
                .shorten(ShortenParams::new("https://example.com").with_alias(alias(code)))
                .await
                .unwrap();
        }
        service.deactivate(&alias("two")).await.unwrap();

        let active = service
            .list(LinkFilter { is_active: Some(true) }, None, None)
            .await
            .unwrap();
        let codes: HashSet<&str> = active.items.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, HashSet::from(["one", "three"]));
    }

    #[tokio::test]
    async fn bad_cursor_is_reported() {
        let err = test_service()
            .list(LinkFilter::default(), Some("%%%"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::InvalidCursor(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_shortens_get_distinct_codes() {
        let service = ShortenerService::new(InMemoryStore::new(), RandomGenerator::new());

        let tasks: Vec<_> = (0..128)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .shorten(ShortenParams::new(format!("https://example.com/{i}")))
                        .await
                })
            })
            .collect();

        let mut codes = HashSet::new();
        for task in tasks {
            let link = task.await.unwrap().unwrap();
            assert!(codes.insert(link.code));
        }
        assert_eq!(codes.len(), 128);
    }
}
