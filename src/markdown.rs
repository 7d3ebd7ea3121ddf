use crate::url::{Converter as LinkConverter, SourceLinks};
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use std::fmt;
use url::{ParseError as UrlParseError, Url};

/// Converts markdown to HTML, appending the result to `w`.
///
/// * `site_root` is the root URL of the site. This should end in a trailing
///   slash.
/// * `source_path` is the relative path to the source file from the posts
///   directory.
/// * `link` is the route of the post being converted.
/// * `links` holds the link of every post by source path.
/// * `markdown` is the contents of the source file below the frontmatter.
pub fn to_html(
    w: &mut String,
    site_root: &Url,
    source_path: &str,
    link: &str,
    links: &SourceLinks,
    markdown: &str,
) -> Result<(), Error> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let event_converter = EventConverter {
        link_converter: LinkConverter::new(site_root, source_path, link, links)?,
    };
    let events = Parser::new_ext(markdown, options)
        .map(|ev| event_converter.convert(ev))
        .collect::<Result<Vec<Event>, UrlParseError>>()?;
    html::push_html(w, events.into_iter());
    Ok(())
}

struct EventConverter<'a> {
    link_converter: LinkConverter<'a>,
}

impl<'a> EventConverter<'a> {
    fn convert_url<'b>(&self, url: CowStr<'b>) -> Result<CowStr<'b>, UrlParseError> {
        Ok(CowStr::Boxed(
            self.link_converter.convert(&url)?.into_boxed_str(),
        ))
    }

    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Result<Tag<'b>, UrlParseError> {
        Ok(match tag {
            Tag::Heading(level) => demote(level),

            // Links between posts are written against source files and need
            // to point at the rendered pages instead.
            Tag::Link(
                kind @ (LinkType::Inline
                | LinkType::Reference
                | LinkType::ReferenceUnknown
                | LinkType::Shortcut
                | LinkType::ShortcutUnknown
                | LinkType::Collapsed
                | LinkType::CollapsedUnknown),
                url,
                title,
            ) => Tag::Link(kind, self.convert_url(url)?, title),
            Tag::Image(kind, url, title) => {
                Tag::Image(kind, self.convert_url(url)?, title)
            }
            _ => tag,
        })
    }

    fn convert<'b>(&self, ev: Event<'b>) -> Result<Event<'b>, UrlParseError> {
        Ok(match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)?),
            // Only the level of a closing tag is rendered.
            Event::End(Tag::Heading(level)) => Event::End(demote(level)),
            _ => ev,
        })
    }
}

/// The post title is the page's h1, so `#` in a post becomes h2.
fn demote<'b>(level: u32) -> Tag<'b> {
    Tag::Heading((level + 1).min(6))
}

/// Represents an error converting markdown to HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a problem parsing URLs.
    UrlParse(UrlParseError),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<UrlParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing and joining functions.
    fn from(err: UrlParseError) -> Error {
        Error::UrlParse(err)
    }
}
