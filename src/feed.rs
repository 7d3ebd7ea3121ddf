//! Support for creating Atom feeds from a [`PostIndex`].

use crate::config::Author;
use crate::index::PostIndex;
use crate::post::Post;
use atom_syndication::{
    Entry, Error as AtomError, Feed, FixedDateTime, Link, Person, Text,
};
use chrono::{DateTime, NaiveTime, Offset, TimeZone, Utc};
use std::fmt;
use std::io::Write;
use url::Url;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub id: String,
    pub author: Option<Author>,
    pub home_page: Url,
    pub atom_url: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a
/// [`PostIndex`] and writes the result to a [`std::io::Write`]. This function
/// takes ownership of the provided [`FeedConfig`].
pub fn write_feed<W: Write>(config: FeedConfig, index: &PostIndex, w: W) -> Result<()> {
    feed(config, index).write_to(w)?;
    Ok(())
}

fn feed(config: FeedConfig, index: &PostIndex) -> Feed {
    let mut feed = Feed::default();
    feed.set_entries(index.iter().map(|post| entry(&config, post)).collect::<Vec<_>>());
    feed.set_updated(match index.posts().first() {
        Some(newest) => midnight(newest),
        None => utc(Utc::now()),
    });
    feed.set_title(config.title.as_str());
    feed.set_id(config.id.as_str());
    feed.set_authors(author_to_people(config.author.as_ref()));
    feed.set_links(vec![
        link(config.home_page.as_str(), "alternate"),
        link(config.atom_url.as_str(), "self"),
    ]);
    feed
}

fn entry(config: &FeedConfig, post: &Post) -> Entry {
    let date = midnight(post);
    let summary = match post.description.is_empty() {
        false => Text::plain(post.description.as_str()),
        true => Text::html(post.summary().0),
    };

    let mut entry = Entry::default();
    entry.set_id(post.url.as_str());
    entry.set_title(post.title.as_str());
    entry.set_updated(date);
    entry.set_published(Some(date));
    entry.set_authors(author_to_people(config.author.as_ref()));
    entry.set_links(vec![link(post.url.as_str(), "alternate")]);
    entry.set_summary(Some(summary));
    entry
}

fn link(href: &str, rel: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel(rel);
    link
}

/// Posts only carry a date; they're treated as published at midnight UTC.
fn midnight(post: &Post) -> FixedDateTime {
    utc(Utc.from_utc_datetime(&post.date.and_time(NaiveTime::MIN)))
}

fn utc(date: DateTime<Utc>) -> FixedDateTime {
    date.with_timezone(&date.offset().fix())
}

fn author_to_people(author: Option<&Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name.as_str());
            person.set_email(author.email.clone());
            vec![person]
        }
        None => Vec::new(),
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}
