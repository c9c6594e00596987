//! Atom feed rendering
//!
//! Builds the per-consumer article feed: role-filtered, newest first,
//! sanitized summaries and an image enclosure when the article's image
//! can be served by the image proxy.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use ammonia::UrlRelative;
use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use url::Url;

use super::image_proxy::ImageCache;
use crate::config::ArticleFeedConfig;
use crate::data::{Article, Database, EntityKind, ResponseCache};
use crate::error::AppError;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const ENCLOSURE_MIME_TYPE: &str = "image/webp";

/// Plain text of an HTML fragment: tags dropped, entities decoded
pub fn plain_text(html: &str) -> String {
    let stripped = ammonia::Builder::empty().clean(html).to_string();
    html_escape::decode_html_entities(&stripped).trim().to_string()
}

/// Sanitize an article body for use as a feed summary
///
/// Inline `style` attributes and scripts are removed while the markup the
/// CMS emits (classes, ids, link targets, embedded frames) is kept.
/// Relative links are made absolute against `base`.
pub fn sanitize_body(html: &str, base: &Url) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(["class", "id"])
        .add_tag_attributes("a", ["target"])
        .add_tags(["iframe"])
        .add_tag_attributes(
            "iframe",
            ["src", "width", "height", "title", "allow", "allowfullscreen"],
        )
        .link_rel(None)
        .url_relative(UrlRelative::RewriteWithBase(base.clone()))
        .clean(html)
        .to_string()
}

/// External link of an article: `item_url` with a base64 `id` envelope
pub fn item_link(item_url: &Url, article_id: i64) -> String {
    let envelope = format!(r#"{{"id": {article_id}, "type": "STRAPI", "localize": true}}"#);
    let encoded = STANDARD.encode(envelope.as_bytes());

    let mut url = item_url.clone();
    let retained: Vec<(String, String)> = item_url
        .query_pairs()
        .filter(|(key, _)| key != "id")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("id", &encoded);
    url.to_string()
}

fn atom_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Renders and caches Atom feeds per consumer
pub struct FeedRenderer {
    db: Arc<Database>,
    images: Arc<ImageCache>,
    settings: ArticleFeedConfig,
    site_url: Url,
    item_url: Url,
    /// Public base URL of this service, used for self and enclosure links
    public_url: String,
    cache: ResponseCache<String, Arc<String>>,
}

impl FeedRenderer {
    /// Create new feed renderer
    ///
    /// # Errors
    /// Returns `AppError::Config` if the site or item URL is invalid
    pub fn new(
        db: Arc<Database>,
        images: Arc<ImageCache>,
        settings: ArticleFeedConfig,
        public_url: String,
        ttl: Duration,
    ) -> Result<Self, AppError> {
        let site_url = Url::parse(&settings.url)
            .map_err(|e| AppError::Config(format!("feed.article.url is not a valid URL: {e}")))?;
        let item_url = Url::parse(&settings.item_url).map_err(|e| {
            AppError::Config(format!("feed.article.item_url is not a valid URL: {e}"))
        })?;

        Ok(Self {
            db,
            images,
            settings,
            site_url,
            item_url,
            public_url: public_url.trim_end_matches('/').to_string(),
            cache: ResponseCache::new("feed", ttl),
        })
    }

    /// Get the Atom document of a consumer, rendering it on cache miss
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the consumer does not exist
    pub async fn render_cached(&self, consumer_id: &str) -> Result<Arc<String>, AppError> {
        self.cache
            .get_or_try_insert(consumer_id.to_string(), async {
                self.render(consumer_id).await.map(Arc::new)
            })
            .await
    }

    /// Render the Atom document of a consumer
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the consumer does not exist
    pub async fn render(&self, consumer_id: &str) -> Result<String, AppError> {
        let consumer = self
            .db
            .get_consumer(consumer_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let articles = self
            .db
            .get_feed_articles(&consumer.roles.0, self.settings.items)
            .await?;

        let enclosures = join_all(
            articles
                .iter()
                .map(|article| self.images.get(EntityKind::Article, article.id)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, AppError>>()?;

        let items: Vec<(&Article, bool)> = articles
            .iter()
            .zip(enclosures.iter().map(Option::is_some))
            .collect();

        let xml = self
            .write_feed(consumer_id, &items)
            .context("Failed to write Atom feed")?;

        use crate::metrics::FEED_RENDERS_TOTAL;
        FEED_RENDERS_TOTAL.inc();
        tracing::debug!(consumer = %consumer_id, items = items.len(), "Rendered feed");

        Ok(xml)
    }

    fn self_link(&self, consumer_id: &str) -> String {
        format!("{}/article/atom/{}", self.public_url, consumer_id)
    }

    fn enclosure_link(&self, article_id: i64) -> String {
        format!(
            "{}/image/{}/{}",
            self.public_url,
            EntityKind::Article,
            article_id
        )
    }

    fn write_feed(&self, consumer_id: &str, items: &[(&Article, bool)]) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut feed = BytesStart::new("feed");
        feed.push_attribute(("xmlns", ATOM_NS));
        writer.write_event(Event::Start(feed))?;

        let updated = items
            .iter()
            .map(|(article, _)| article.updated)
            .max()
            .unwrap_or_else(Utc::now);

        write_text_element(&mut writer, "title", &self.settings.title)?;
        write_link(&mut writer, "alternate", self.site_url.as_str(), None)?;
        write_link(&mut writer, "self", &self.self_link(consumer_id), None)?;
        write_text_element(&mut writer, "id", self.site_url.as_str())?;
        write_text_element(&mut writer, "updated", &atom_date(updated))?;
        if !self.settings.description.is_empty() {
            write_text_element(&mut writer, "subtitle", &self.settings.description)?;
        }

        for (article, has_image) in items {
            self.write_entry(&mut writer, article, *has_image)?;
        }

        writer.write_event(Event::End(BytesEnd::new("feed")))?;

        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).context("Generated feed contains invalid UTF-8")
    }

    fn write_entry(
        &self,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        article: &Article,
        has_image: bool,
    ) -> anyhow::Result<()> {
        writer.write_event(Event::Start(BytesStart::new("entry")))?;

        write_text_element(writer, "title", &plain_text(&article.title))?;
        write_link(
            writer,
            "alternate",
            &item_link(&self.item_url, article.id),
            None,
        )?;
        write_text_element(writer, "id", &article.id.to_string())?;
        if let Some(published) = article.published {
            write_text_element(writer, "published", &atom_date(published))?;
        }
        write_text_element(writer, "updated", &atom_date(article.updated))?;
        if !self.settings.copyright.is_empty() {
            write_text_element(writer, "rights", &self.settings.copyright)?;
        }

        let summary = sanitize_body(article.body.as_deref().unwrap_or_default(), &self.site_url);
        let mut element = BytesStart::new("summary");
        element.push_attribute(("type", "html"));
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::new(&summary)))?;
        writer.write_event(Event::End(BytesEnd::new("summary")))?;

        if has_image {
            write_link(
                writer,
                "enclosure",
                &self.enclosure_link(article.id),
                Some(ENCLOSURE_MIME_TYPE),
            )?;
        }

        writer.write_event(Event::End(BytesEnd::new("entry")))?;
        Ok(())
    }
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> anyhow::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_link(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    rel: &str,
    href: &str,
    mime_type: Option<&str>,
) -> anyhow::Result<()> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("rel", rel));
    link.push_attribute(("href", href));
    if let Some(mime_type) = mime_type {
        link.push_attribute(("type", mime_type));
    }
    writer.write_event(Event::Empty(link))?;
    Ok(())
}
