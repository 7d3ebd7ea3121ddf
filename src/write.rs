//! Turns a [`PostIndex`] into HTML pages on disk: paginated listing pages and
//! one page per post with previous/next navigation. Every page is rendered
//! with the theme preference as it stands at render time.

use crate::config::Site;
use crate::index::PostIndex;
use crate::meta::SocialMeta;
use crate::post::{Post, PostLink, PostSummary};
use crate::theme::{Preference, PreferenceStore, DARK_CLASS, STORAGE_KEY};
use chrono::NaiveDate;
use minijinja::Environment;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Responsible for paginating, templating, and writing HTML pages to disk
/// from a [`PostIndex`].
pub struct Writer<'a> {
    /// The loaded theme templates.
    pub templates: &'a Environment<'static>,

    /// The name of the template for listing pages.
    pub index_template: &'a str,

    /// The name of the template for post pages.
    pub post_template: &'a str,

    /// Site-wide metadata, made available to templates as `site`.
    pub site: &'a Site,

    /// The number of posts per listing page.
    pub index_page_size: usize,

    /// The base URL for listing pages after the first. Page `i` is served
    /// at `{index_url}{i}.html`; the first page is the site root.
    pub index_url: &'a Url,

    /// The directory that receives the first listing page as `index.html`.
    pub root_output_directory: &'a Path,

    /// The directory that receives the remaining listing pages.
    pub index_output_directory: &'a Path,

    /// The URL for the static assets, typically for the theme's stylesheet.
    pub static_url: &'a Url,

    /// The URL of the Atom feed.
    pub atom_url: &'a Url,

    /// The theme preference. Read once per page, when the page is rendered.
    pub preferences: &'a PreferenceStore,
}

impl Writer<'_> {
    /// Writes every listing page and post page for `index`.
    pub fn write_posts(&self, index: &PostIndex) -> Result<()> {
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();
        let mut written = 0;
        for page in self
            .listing_pages(index.posts())?
            .into_iter()
            .chain(self.post_pages(index))
        {
            if let Some(dir) = page.file_path.parent() {
                if seen_dirs.insert(dir.to_owned()) {
                    std::fs::create_dir_all(dir)?;
                }
            }
            self.write_page(&page)?;
            written += 1;
        }
        tracing::info!(pages = written, posts = index.len(), "wrote pages");
        Ok(())
    }

    /// Templates a single [`Page`] and writes it to disk.
    fn write_page(&self, page: &Page) -> Result<()> {
        let template_name = match page.item {
            Item::Listing { .. } => self.index_template,
            Item::Post { .. } => self.post_template,
        };
        let template = self.templates.get_template(template_name)?;
        let rendered = template.render(PageContext {
            site: self.site,
            meta: &page.meta,
            theme: self.preferences.preference(),
            theme_storage_key: STORAGE_KEY,
            theme_dark_class: DARK_CLASS,
            home_page: self.site.site_root.as_str(),
            static_url: self.static_url.as_str(),
            atom_url: self.atom_url.as_str(),
            item: &page.item,
        })?;
        std::fs::write(&page.file_path, rendered)?;
        tracing::debug!(path = %page.file_path.display(), "wrote page");
        Ok(())
    }

    /// The URL of listing page `i`.
    fn listing_url(&self, i: usize) -> Result<Url> {
        match i {
            0 => Ok(self.site.site_root.clone()),
            _ => Ok(self.index_url.join(&format!("{}.html", i))?),
        }
    }

    /// Splits `posts` into listing pages of `index_page_size` posts each.
    /// There is always at least one listing page, even with no posts.
    fn listing_pages(&self, posts: &[Post]) -> Result<Vec<Page>> {
        let chunks: Vec<&[Post]> = match posts.is_empty() {
            true => vec![posts],
            false => posts.chunks(self.index_page_size).collect(),
        };
        let total_pages = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| -> Result<Page> {
                let url = self.listing_url(i)?;
                Ok(Page {
                    meta: SocialMeta::for_listing(self.site, &url),
                    file_path: match i {
                        0 => self.root_output_directory.join("index.html"),
                        _ => self.index_output_directory.join(format!("{}.html", i)),
                    },
                    item: Item::Listing {
                        posts: chunk.iter().map(Post::summarize).collect(),
                        page: i,
                        total_pages,
                        prev: match i {
                            0 => None,
                            _ => Some(self.listing_url(i - 1)?.to_string()),
                        },
                        next: match i + 1 < total_pages {
                            false => None,
                            true => Some(self.listing_url(i + 1)?.to_string()),
                        },
                    },
                })
            })
            .collect()
    }

    /// Creates a [`Page`] for every post, linked to its neighbours.
    fn post_pages(&self, index: &PostIndex) -> Vec<Page> {
        index
            .iter()
            .map(|post| {
                let adjacent = index.find_adjacent(&post.link);
                Page {
                    meta: SocialMeta::for_post(self.site, post),
                    file_path: post.file_path.clone(),
                    item: Item::Post {
                        post: PostPage::from(post),
                        previous: adjacent.previous.map(PostLink::from),
                        next: adjacent.next.map(PostLink::from),
                    },
                }
            })
            .collect()
    }
}

/// An object representing an output HTML file.
struct Page {
    /// The social metadata for the page.
    meta: SocialMeta,

    /// The target location on disk for the output file.
    file_path: PathBuf,

    /// What the page shows.
    item: Item,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Item {
    Listing {
        posts: Vec<PostSummary>,
        page: usize,
        total_pages: usize,
        prev: Option<String>,
        next: Option<String>,
    },
    Post {
        post: PostPage,
        previous: Option<PostLink>,
        next: Option<PostLink>,
    },
}

/// A post as it appears on its own page.
#[derive(Serialize)]
struct PostPage {
    link: String,
    url: String,
    title: String,
    date: NaiveDate,
    display_date: String,
    description: String,
    body: String,
}

impl From<&Post> for PostPage {
    fn from(post: &Post) -> PostPage {
        PostPage {
            link: post.link.clone(),
            url: post.url.to_string(),
            title: post.title.clone(),
            date: post.date,
            display_date: post.display_date(),
            description: post.description.clone(),
            body: post.body.clone(),
        }
    }
}

/// Everything a template can see.
#[derive(Serialize)]
struct PageContext<'a> {
    site: &'a Site,
    meta: &'a SocialMeta,
    theme: Preference,
    theme_storage_key: &'static str,
    theme_dark_class: &'static str,
    home_page: &'a str,
    static_url: &'a str,
    atom_url: &'a str,
    #[serde(flatten)]
    item: &'a Item,
}

/// The result of a fallible page-writing operation.
type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating.
    Template(minijinja::Error),

    /// An error building page URLs.
    UrlParse(url::ParseError),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<minijinja::Error> for Error {
    /// Converts a [`minijinja::Error`] into an [`Error`]. This allows us to
    /// use the `?` operator for fallible template operations.
    fn from(err: minijinja::Error) -> Error {
        Error::Template(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}
