//! Defines the [`Parser`] and [`Error`] types: the logic for discovering post
//! sources on the file system and parsing them into [`Post`]s. A source is
//! either a markdown file directly in the posts directory or a bundle: a
//! directory holding an `index.md` along with the post's assets.

use std::{
    fmt,
    fs::{read_dir, File},
    path::{Component, Path, PathBuf},
};

use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

use crate::{index::PostIndex, markdown, post::Post, url::SourceLinks};

const MARKDOWN_EXTENSION: &str = ".md";
const BUNDLE_INDEX: &str = "index.md";

/// Parses [`Post`] objects from source files.
pub struct Parser<'a> {
    /// `site_root` is the base URL for post pages. A post with the link
    /// `/foo` is served at `{site_root}foo`.
    site_root: &'a Url,

    /// `output_directory` is the directory under which post pages will be
    /// rendered; the post `/foo` lands in `{output_directory}/foo/index.html`.
    output_directory: &'a Path,
}

impl<'a> Parser<'a> {
    /// Constructs a new parser. See fields on [`Parser`] for argument
    /// descriptions.
    pub fn new(site_root: &'a Url, output_directory: &'a Path) -> Parser<'a> {
        Parser {
            site_root,
            output_directory,
        }
    }

    /// Discovers every post in `source_directory` and assembles them into a
    /// [`PostIndex`]. Also returns the bundle assets that need copying.
    pub fn assemble_post_index(
        &self,
        source_directory: &Path,
    ) -> Result<(PostIndex, Vec<StaticFile>)> {
        let (posts, static_files) = self.parse_posts(source_directory)?;
        Ok((PostIndex::assemble(posts)?, static_files))
    }

    fn parse_post_bundle(
        &self,
        posts_source_directory: &Path,
        relative_path: &Path,
        static_files: &mut Vec<StaticFile>,
    ) -> Result<Source> {
        // We want to make sure we can parse a post before we mutate
        // `static_files`
        let source = self.read_source(
            posts_source_directory,
            &relative_path.join(BUNDLE_INDEX),
        )?;

        // Mutate `static_files` only after we've confirmed that we've parsed a
        // valid post.
        use walkdir::WalkDir;
        let abs = posts_source_directory.join(relative_path);
        let post_directory = source
            .post
            .file_path
            .parent()
            .unwrap_or(self.output_directory);
        for result in WalkDir::new(&abs) {
            let entry = result?;
            if entry.file_type().is_file() && entry.path() != abs.join(BUNDLE_INDEX) {
                // `abs` is always an ancestor of `entry.path()`
                if let Ok(relative) = entry.path().strip_prefix(&abs) {
                    static_files.push((
                        entry.path().to_owned(),
                        post_directory.join(relative),
                    ));
                }
            }
        }

        Ok(source)
    }

    /// Reads a single post source: everything but the rendered body.
    /// `relative_path` is the path of the source file relative to
    /// `posts_source_directory`; it becomes the post's `source`, and its stem
    /// (or its bundle directory's name) becomes the default link.
    fn read_source(
        &self,
        posts_source_directory: &Path,
        relative_path: &Path,
    ) -> Result<Source> {
        self._read_source(posts_source_directory, relative_path)
            .map_err(|e| annotate(relative_path, e))
    }

    fn _read_source(
        &self,
        posts_source_directory: &Path,
        relative_path: &Path,
    ) -> Result<Source> {
        use std::io::Read;
        let mut contents = String::new();
        File::open(posts_source_directory.join(relative_path))?
            .read_to_string(&mut contents)?;
        let input: &str = &contents;

        let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
        let frontmatter: Frontmatter =
            serde_yaml::from_str(&input[yaml_start..yaml_stop])?;

        let named = if relative_path.ends_with(BUNDLE_INDEX) {
            relative_path.parent().unwrap_or(relative_path)
        } else {
            relative_path
        };
        let stem = named
            .file_stem()
            .ok_or_else(|| InvalidFileNameError(relative_path.to_owned()))?
            .to_str()
            .ok_or_else(|| InvalidFileNameError(relative_path.to_owned()))?;

        let slug = match &frontmatter.link {
            Some(link) => slug_from_link(link),
            None => Some(slug::slugify(stem)).filter(|slug| !slug.is_empty()),
        }
        .ok_or_else(|| InvalidFileNameError(relative_path.to_owned()))?;

        let post = Post {
            source: relative_path.to_owned(),
            link: format!("/{}", slug),
            url: self.site_root.join(&slug)?,
            file_path: self.output_directory.join(&slug).join("index.html"),
            title: frontmatter.title,
            date: frontmatter.date,
            description: frontmatter.description,
            image: frontmatter.image,
            body: String::default(),
        };
        Ok(Source {
            post,
            markdown: input[body_start..].to_owned(),
        })
    }

    /// Renders the body of a [`Source`], resolving links to other posts
    /// through `links`.
    fn render(&self, source: Source, links: &SourceLinks) -> Result<Post> {
        let Source { mut post, markdown } = source;
        let relative_path = post.source.clone();
        let source_path = source_key(&relative_path)
            .ok_or_else(|| InvalidFileNameError(relative_path.clone()))
            .map_err(|e| annotate(&relative_path, e.into()))?;
        markdown::to_html(
            &mut post.body,
            self.site_root,
            &source_path,
            &post.link,
            links,
            &markdown,
        )
        .map_err(|e| annotate(&relative_path, e.into()))?;
        tracing::debug!(link = %post.link, source = %source_path, "parsed post");
        Ok(post)
    }

    /// Searches a provided `source_directory` for post files (extension =
    /// `.md`) and post bundles (directories containing `index.md`) and
    /// returns them along with the bundle assets, unordered. Each post file
    /// must be structured as follows:
    ///
    /// 1. Initial frontmatter fence (`---`)
    /// 2. YAML frontmatter with fields `title`, `date`, and optionally
    ///    `description`, `image` and `link`
    /// 3. Terminal frontmatter fence (`---`)
    /// 4. Post body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: Hello, world!
    /// date: 2021-04-16
    /// description: A first post.
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    ///
    /// All frontmatter is read before any body is rendered, so a body can
    /// link to another post's source file and land on that post's link.
    pub fn parse_posts(&self, source_directory: &Path) -> Result<Posts> {
        let mut sources = Vec::new();
        let mut static_files = Vec::new();
        for result in read_dir(source_directory)? {
            let entry = result?;
            let os_file_name = entry.file_name();
            let file_name = os_file_name.to_string_lossy();
            let relative = PathBuf::from(entry.file_name());
            if Self::is_bundle(&entry)? {
                sources.push(self.parse_post_bundle(
                    source_directory,
                    &relative,
                    &mut static_files,
                )?)
            } else if file_name.ends_with(MARKDOWN_EXTENSION) {
                sources.push(self.read_source(source_directory, &relative)?);
            }
        }

        let links: SourceLinks = sources
            .iter()
            .filter_map(|source| {
                source_key(&source.post.source)
                    .map(|key| (key, source.post.link.clone()))
            })
            .collect();
        let posts = sources
            .into_iter()
            .map(|source| self.render(source, &links))
            .collect::<Result<Vec<Post>>>()?;

        tracing::info!(
            posts = posts.len(),
            assets = static_files.len(),
            directory = %source_directory.display(),
            "discovered posts"
        );
        Ok((posts, static_files))
    }

    fn is_bundle(entry: &std::fs::DirEntry) -> std::io::Result<bool> {
        Ok(entry.file_type()?.is_dir()
            && entry.path().join(BUNDLE_INDEX).is_file())
    }
}

/// A post whose frontmatter has been read but whose body hasn't been
/// rendered yet.
struct Source {
    post: Post,
    markdown: String,
}

fn annotate(relative_path: &Path, err: Error) -> Error {
    Error::Annotated(
        format!("parsing post `{}`", relative_path.display()),
        Box::new(err),
    )
}

/// The `/`-separated form of a source path, as used in [`SourceLinks`].
fn source_key(relative_path: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative_path.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Turns a frontmatter `link` into the post's slug. Each `/`-separated
/// segment is slugified, so the result is always a relative path of plain
/// names below the output directory. `.` and `..` segments, or a link with
/// no usable segment at all, are rejected.
fn slug_from_link(link: &str) -> Option<String> {
    let mut segments = Vec::new();
    for segment in link.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." {
            return None;
        }
        let slug = slug::slugify(segment);
        if slug.is_empty() {
            return None;
        }
        segments.push(slug);
    }
    match segments.is_empty() {
        true => None,
        false => Some(segments.join("/")),
    }
}

/// Returns the offsets of the start and end of the YAML frontmatter and the
/// start of the body.
fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
    const FENCE: &str = "---";
    if !input.starts_with(FENCE) {
        return Err(Error::FrontmatterMissingStartFence);
    }
    match input[FENCE.len()..].find(FENCE) {
        None => Err(Error::FrontmatterMissingEndFence),
        Some(offset) => Ok((
            FENCE.len(),                        // yaml_start
            FENCE.len() + offset,               // yaml_stop
            FENCE.len() + offset + FENCE.len(), // body_start
        )),
    }
}

#[derive(Deserialize, Clone)]
struct Frontmatter {
    /// The title of the post.
    pub title: String,

    /// The date of the post, as `YYYY-MM-DD`.
    pub date: NaiveDate,

    /// The description used for social cards and the feed.
    #[serde(default)]
    pub description: String,

    /// The social card image, relative to the site root.
    #[serde(default)]
    pub image: Option<String>,

    /// Overrides the link derived from the file name.
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug)]
pub struct InvalidFileNameError(PathBuf);

impl fmt::Display for InvalidFileNameError {
    /// Displays an [`InvalidFileNameError`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid file name: {:?}", &self.0)
    }
}

impl std::error::Error for InvalidFileNameError {
    /// Implements the [`std::error::Error`] trait for [`InvalidFileNameError`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

pub type Posts = (Vec<Post>, Vec<StaticFile>);

/// A bundle asset: the source path and the destination path.
pub type StaticFile = (PathBuf, PathBuf);

/// Represents the result of a [`Post`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Post`] object.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post source file is missing its starting frontmatter
    /// fence (`---`).
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal frontmatter
    /// fence (`---` i.e., the starting fence was found but the ending one was
    /// missing).
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the frontmatter as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when there is a problem parsing URLs.
    UrlParse(url::ParseError),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned when a source file name can't be turned into a link.
    InvalidFileName(InvalidFileNameError),

    /// Returned when the parsed posts can't be assembled into an index.
    Index(crate::index::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "Post must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "Missing closing `---`")
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::InvalidFileName(err) => err.fmt(f),
            Error::Index(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::InvalidFileName(err) => Some(err),
            Error::Index(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<InvalidFileNameError> for Error {
    fn from(err: InvalidFileNameError) -> Error {
        Error::InvalidFileName(err)
    }
}

impl From<crate::index::Error> for Error {
    fn from(err: crate::index::Error) -> Error {
        Error::Index(err)
    }
}

impl From<markdown::Error> for Error {
    fn from(err: markdown::Error) -> Error {
        match err {
            markdown::Error::UrlParse(e) => Error::UrlParse(e),
        }
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing and joining functions.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
