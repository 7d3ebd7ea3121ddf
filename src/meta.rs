//! Social-sharing metadata (Open Graph and Twitter cards) for listing and
//! post pages. Templates receive a [`SocialMeta`] as `meta`.

use crate::config::Site;
use crate::post::Post;
use serde::Serialize;
use url::Url;

const CARD: &str = "summary_large_image";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SocialMeta {
    /// The page title, used for `<title>`, `og:title` and `twitter:title`.
    pub title: String,
    pub description: String,

    /// The absolute URL of the card image, if there is one.
    pub image: Option<String>,

    /// The canonical URL of the page (`og:url`).
    pub url: String,

    /// `website` for listings, `article` for posts (`og:type`).
    pub kind: &'static str,

    /// The twitter card type.
    pub card: &'static str,

    /// The twitter handle for `twitter:site` and `twitter:creator`.
    pub twitter: Option<String>,
}

impl SocialMeta {
    /// Metadata for a listing page at `url`.
    pub fn for_listing(site: &Site, url: &Url) -> SocialMeta {
        SocialMeta {
            title: site.title.clone(),
            description: match site.description.is_empty() {
                true => site.title.clone(),
                false => site.description.clone(),
            },
            image: site
                .social_image
                .as_deref()
                .and_then(|image| absolute(&site.site_root, image)),
            url: url.to_string(),
            kind: "website",
            card: CARD,
            twitter: site.twitter.clone(),
        }
    }

    /// Metadata for a post page. The post's image wins over the site's.
    pub fn for_post(site: &Site, post: &Post) -> SocialMeta {
        SocialMeta {
            title: format!("{} – {}", post.title, site.title),
            description: post.description.clone(),
            image: post
                .image
                .as_deref()
                .or_else(|| site.social_image.as_deref())
                .and_then(|image| absolute(&site.site_root, image)),
            url: post.url.to_string(),
            kind: "article",
            card: CARD,
            twitter: site.twitter.clone(),
        }
    }
}

/// Resolves an image path against the site root. Paths are taken relative to
/// the root even when they start with `/`, so sites hosted under a
/// subdirectory keep working. Absolute URLs pass through.
fn absolute(site_root: &Url, image: &str) -> Option<String> {
    match Url::parse(image) {
        Ok(url) => Some(url.to_string()),
        Err(_) => match site_root.join(image.trim_start_matches('/')) {
            Ok(url) => Some(url.to_string()),
            Err(err) => {
                tracing::warn!(%err, image, "ignoring unusable social image");
                None
            }
        },
    }
}
