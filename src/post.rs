//! Defines the [`Post`] type and the [`PostSummary`] and [`PostLink`] views
//! of it that are handed to templates.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

const FOLD_TAG: &str = "<!-- more -->";

/// Represents a blog post.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    /// The path of the source file relative to the posts directory. Used to
    /// order posts that share a date.
    pub source: PathBuf,

    /// The route identifier for the post, e.g. `/hello-world`. Unique across
    /// a [`crate::index::PostIndex`].
    pub link: String,

    /// The canonical URL for the post.
    pub url: Url,

    /// The location of the rendered post page on disk.
    pub file_path: PathBuf,

    /// The title of the post.
    pub title: String,

    /// The publication date of the post.
    pub date: NaiveDate,

    /// A short description used on social cards and in the feed.
    pub description: String,

    /// The social card image, as a path relative to the site root.
    pub image: Option<String>,

    /// The body of the post, rendered to HTML.
    pub body: String,
}

impl Post {
    /// Returns the part of the body above the fold (`<!-- more -->`) and
    /// whether the body was actually folded.
    pub fn summary(&self) -> (&str, bool) {
        match self.body.find(FOLD_TAG) {
            Some(i) => (&self.body[..i], true),
            None => (&self.body, false),
        }
    }

    /// Converts the post into the listing view used by index pages.
    pub fn summarize(&self) -> PostSummary {
        let (summary, summarized) = self.summary();
        PostSummary {
            link: self.link.clone(),
            url: self.url.to_string(),
            title: self.title.clone(),
            date: self.date,
            display_date: self.date.format(LISTING_DATE_FORMAT).to_string(),
            description: self.description.clone(),
            summary: summary.to_owned(),
            summarized,
        }
    }

    /// The long form of the publication date shown on post pages.
    pub fn display_date(&self) -> String {
        self.date.format(POST_DATE_FORMAT).to_string()
    }
}

/// The date format on listing pages, e.g. `March 01, 2021`.
pub const LISTING_DATE_FORMAT: &str = "%B %d, %Y";

/// The date format on post pages, e.g. `Monday, March 01, 2021`.
pub const POST_DATE_FORMAT: &str = "%A, %B %d, %Y";

/// A post as it appears on a listing page.
#[derive(Clone, Debug, Serialize)]
pub struct PostSummary {
    pub link: String,
    pub url: String,
    pub title: String,
    pub date: NaiveDate,
    pub display_date: String,
    pub description: String,
    pub summary: String,
    pub summarized: bool,
}

/// The navigation target for a neighbouring post.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PostLink {
    pub link: String,
    pub url: String,
    pub title: String,
}

impl From<&Post> for PostLink {
    fn from(post: &Post) -> PostLink {
        PostLink {
            link: post.link.clone(),
            url: post.url.to_string(),
            title: post.title.clone(),
        }
    }
}
