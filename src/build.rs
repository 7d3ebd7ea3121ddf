//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: parsing the posts
//! ([`crate::parser`]), rendering listing and post pages ([`crate::write`]),
//! copying the static source directory into the static output directory, and
//! generating the Atom feed.

use crate::config::{Config, Error as ConfigError};
use crate::feed::{write_feed, Error as FeedError, FeedConfig};
use crate::parser::{Error as ParseError, Parser as PostParser, StaticFile};
use crate::theme::{Client, PreferenceStore};
use crate::write::{Error as WriteError, Writer};
use minijinja::Environment;
use std::fmt;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const TEMPLATE_EXTENSION: &str = "html";

/// Builds the site from a [`Config`] object. This calls into
/// [`PostParser::assemble_post_index`], [`Writer::write_posts`], and
/// [`write_feed`] which do the heavy-lifting. This function also copies the
/// static assets from source directory to the output directory.
///
/// Pages are rendered before any client exists to report a stored or
/// system preference, so the theme preference is left at its default.
pub fn build_site(config: Config) -> Result<()> {
    let post_parser =
        PostParser::new(&config.site.site_root, &config.root_output_directory);

    // collect all posts
    let (index, static_files) =
        post_parser.assemble_post_index(&config.posts_source_directory)?;
    tracing::info!(
        posts = index.len(),
        source = %config.posts_source_directory.display(),
        "parsed posts"
    );

    // Load the theme before touching the output so a broken theme leaves the
    // previous build in place.
    let templates = load_templates(&config.theme_directory)?;
    for name in [&config.index_template, &config.post_template] {
        templates.get_template(name)?;
    }

    // Blow away the old output directories so we don't have any collisions.
    // The root output directory itself is left alone in case it holds files
    // we didn't create.
    rmdir(&config.static_output_directory)?;
    rmdir(&config.index_output_directory)?;
    for post in &index {
        if let Some(dir) = post.file_path.parent() {
            if !is_below(&config.root_output_directory, dir) {
                return Err(Error::OutsideOutput(dir.to_owned()));
            }
            rmdir(dir)?;
        }
    }

    let preferences = PreferenceStore::new(Client::headless());

    // write the post and listing pages
    let writer = Writer {
        templates: &templates,
        index_template: &config.index_template,
        post_template: &config.post_template,
        site: &config.site,
        index_page_size: config.index_page_size,
        index_url: &config.index_url,
        root_output_directory: &config.root_output_directory,
        index_output_directory: &config.index_output_directory,
        static_url: &config.static_url,
        atom_url: &config.atom_url,
        preferences: &preferences,
    };
    writer.write_posts(&index)?;

    // copy static directory
    if config.static_source_directory.is_dir() {
        copy_dir(
            &config.static_source_directory,
            &config.static_output_directory,
        )?;
    }

    // copy bundle assets next to their posts
    copy_static_files(&static_files)?;

    // create the atom feed
    let feed_path = config.root_output_directory.join("feed.atom");
    write_feed(
        FeedConfig {
            title: config.site.title.clone(),
            id: config.site.site_root.to_string(),
            author: config.site.author.clone(),
            home_page: config.site.site_root.clone(),
            atom_url: config.atom_url.clone(),
        },
        &index,
        File::create(&feed_path)?,
    )?;
    tracing::info!(
        output = %config.root_output_directory.display(),
        "built site"
    );

    Ok(())
}

/// Loads every `.html` file under `theme_directory` into a template
/// environment. Templates are named by their path relative to the theme
/// directory, so they can extend or include one another by that name.
fn load_templates(theme_directory: &Path) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    for result in WalkDir::new(theme_directory) {
        let entry = result?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str())
                != Some(TEMPLATE_EXTENSION)
        {
            continue;
        }

        let name = path
            .strip_prefix(theme_directory)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let source = std::fs::read_to_string(path).map_err(|err| {
            Error::OpenTemplateFile {
                path: path.to_owned(),
                err,
            }
        })?;
        tracing::debug!(template = %name, "loaded template");
        env.add_template_owned(name, source)?;
    }
    Ok(env)
}

/// Whether `dir` is strictly inside `root`, judged on path components alone:
/// every component after `root` must be a plain name.
fn is_below(root: &Path, dir: &Path) -> bool {
    match dir.strip_prefix(root) {
        Ok(relative) => {
            relative.components().next().is_some()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
        }
        Err(_) => false,
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dst.join(entry.file_name()))?;
        } else {
            std::fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }

    Ok(())
}

fn copy_static_files(static_files: &[StaticFile]) -> Result<()> {
    for (src, dst) in static_files {
        if let Some(dir) = dst.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::copy(src, dst)?;
    }
    tracing::debug!(files = static_files.len(), "copied bundle assets");
    Ok(())
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during configuration,
/// parsing, writing, cleaning output directories, loading template files, and
/// other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors loading the project configuration.
    Config(ConfigError),

    /// Returned for errors during parsing.
    Parse(ParseError),

    /// Returned for errors writing [`crate::post::Post`]s to disk as HTML files.
    Write(WriteError),

    /// Returned for I/O problems while cleaning output directories.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned when a post's output directory isn't inside the root output
    /// directory. Nothing is cleaned in that case.
    OutsideOutput(PathBuf),

    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    Template(minijinja::Error),

    /// Returned for problems walking the theme directory.
    WalkDir(walkdir::Error),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Parse(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::OutsideOutput(path) => write!(
                f,
                "Refusing to clean '{}': not inside the output directory",
                path.display()
            ),
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::Template(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Parse(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::OutsideOutput(_) => None,
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::Template(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ConfigError> for Error {
    /// Converts [`ConfigError`]s into [`Error`]. This allows callers to load
    /// the configuration and build with a single error type.
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<ParseError> for Error {
    /// Converts [`ParseError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Error {
        Error::Template(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error as StdError;

    type TestResult = std::result::Result<(), Box<dyn StdError>>;

    #[test]
    fn test_build_site() -> TestResult {
        let out = tempfile::tempdir()?;
        let config =
            Config::from_directory(Path::new("./testdata/site"), out.path())?;
        build_site(config)?;

        let home = std::fs::read_to_string(out.path().join("index.html"))?;
        assert!(home.contains("Theming with CSS"), "home page: {}", home);
        // Autoescaping writes `/` in URLs as `&#x2f;`.
        assert!(home.contains("pages&#x2f;1.html"), "home page: {}", home);
        assert!(home.contains(r##"<meta name="theme-color" content="#fbcfe8">"##));
        assert!(!home.contains(r#"class="dark""#));

        let second = std::fs::read_to_string(out.path().join("pages/1.html"))?;
        assert!(second.contains("Hello, world!"), "second page: {}", second);

        let post = std::fs::read_to_string(
            out.path().join("bundled-diagrams/index.html"),
        )?;
        assert!(post.contains("<h2>"), "post page: {}", post);
        assert!(post.contains("Theming with CSS"));
        assert!(post.contains("Hello, world!"));

        assert!(out.path().join("bundled-diagrams/diagram.svg").is_file());
        assert!(out.path().join("static/style.css").is_file());
        assert!(out.path().join("theming-with-css/index.html").is_file());

        let feed = std::fs::read_to_string(out.path().join("feed.atom"))?;
        assert!(feed.contains("https://blog.example.com/hello-world"));
        Ok(())
    }

    #[test]
    fn test_rebuild_removes_stale_pages() -> TestResult {
        let out = tempfile::tempdir()?;
        let stale = out.path().join("pages").join("9.html");
        std::fs::create_dir_all(stale.parent().unwrap())?;
        std::fs::write(&stale, "stale")?;
        let unrelated = out.path().join("CNAME");
        std::fs::write(&unrelated, "blog.example.com")?;

        build_site(Config::from_directory(
            Path::new("./testdata/site"),
            out.path(),
        )?)?;

        assert!(!stale.exists());
        assert!(unrelated.exists());
        Ok(())
    }

    #[test]
    fn test_traversing_link_leaves_project_intact() -> TestResult {
        let dir = tempfile::tempdir()?;
        let project = dir.path().join("project");
        copy_dir(Path::new("./testdata/site"), &project)?;
        let out = project.join("out");
        std::fs::create_dir_all(&out)?;
        std::fs::write(
            project.join("posts").join("escape.md"),
            "---\ntitle: Escape\ndate: 2021-04-01\nlink: /../\n---\nbody\n",
        )?;

        let result = build_site(Config::from_directory(&project, &out)?);
        assert!(
            matches!(result, Err(Error::Parse(_))),
            "wanted a parse error; found {:?}",
            result.err()
        );
        assert!(project.join("penumbra.yaml").is_file());
        assert!(project.join("posts").join("hello-world.md").is_file());
        assert!(out.is_dir());
        Ok(())
    }

    #[test]
    fn test_is_below() {
        let root = Path::new("/srv/site/out");
        assert!(is_below(root, Path::new("/srv/site/out/hello-world")));
        assert!(is_below(root, Path::new("/srv/site/out/notes/2021")));
        assert!(!is_below(root, root));
        assert!(!is_below(root, Path::new("/srv/site/out/..")));
        assert!(!is_below(root, Path::new("/srv/site/out/a/../..")));
        assert!(!is_below(root, Path::new("/srv/site")));
        assert!(!is_below(root, Path::new("/srv/site/output")));
    }

    #[test]
    fn test_copy_dir_recurses() -> TestResult {
        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;
        std::fs::create_dir_all(src.path().join("css/vendor"))?;
        std::fs::write(src.path().join("css/vendor/reset.css"), "*{}")?;
        std::fs::write(src.path().join("favicon.ico"), "")?;

        copy_dir(src.path(), &dst.path().join("static"))?;
        assert_eq!(
            "*{}",
            std::fs::read_to_string(
                dst.path().join("static/css/vendor/reset.css")
            )?
        );
        assert!(dst.path().join("static/favicon.ico").is_file());
        Ok(())
    }

    #[test]
    fn test_load_templates_names_by_relative_path() -> TestResult {
        let env = load_templates(Path::new("./testdata/site/theme"))?;
        env.get_template("base.html")?;
        env.get_template("index.html")?;
        env.get_template("post.html")?;
        Ok(())
    }
}
