//! Loads the project configuration (`penumbra.yaml`) and the theme
//! configuration (`theme/theme.yaml`) and resolves them into a [`Config`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file.
pub const PROJECT_FILE: &str = "penumbra.yaml";

#[derive(Deserialize)]
struct PageSize(usize);

impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

/// The post author, credited in the feed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct Project {
    title: String,

    #[serde(default)]
    description: String,

    site_root: Url,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default)]
    twitter: Option<String>,

    #[serde(default)]
    social_image: Option<String>,

    #[serde(default)]
    index_page_size: PageSize,
}

#[derive(Deserialize)]
struct Theme {
    index_template: String,
    post_template: String,
}

/// Site-wide metadata made available to every page as `site`.
#[derive(Clone, Debug, Serialize)]
pub struct Site {
    pub title: String,
    pub description: String,

    /// The root URL of the site, always ending in `/`.
    pub site_root: Url,

    pub author: Option<Author>,

    /// The twitter handle used for `twitter:site` and `twitter:creator`.
    pub twitter: Option<String>,

    /// The default social card image, relative to the site root.
    pub social_image: Option<String>,
}

pub struct Config {
    pub site: Site,
    pub project_root: PathBuf,
    pub posts_source_directory: PathBuf,
    pub static_source_directory: PathBuf,
    pub theme_directory: PathBuf,
    pub index_template: String,
    pub post_template: String,
    pub index_page_size: usize,
    pub root_output_directory: PathBuf,
    pub index_output_directory: PathBuf,
    pub static_output_directory: PathBuf,
    pub index_url: Url,
    pub static_url: Url,
    pub atom_url: Url,

    /// Where the theme preference is kept between `theme` invocations.
    pub preferences_file: PathBuf,
}

impl Config {
    /// Searches `dir` and its ancestors for a project file and loads it.
    pub fn from_directory(dir: &Path, output_directory: &Path) -> Result<Config> {
        Config::from_project_file(&find_project_file(dir)?, output_directory)
    }

    pub fn from_project_file(path: &Path, output_directory: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path)?)
            .map_err(|err| Error::Deserialize(path.to_owned(), err))?;
        let project_root = path
            .parent()
            .ok_or_else(|| Error::NoParentDirectory(path.to_owned()))?;

        let theme_directory = project_root.join("theme");
        let theme_path = theme_directory.join("theme.yaml");
        let theme: Theme = serde_yaml::from_reader(open(&theme_path)?)
            .map_err(|err| Error::Deserialize(theme_path.clone(), err))?;

        if project.index_page_size.0 < 1 {
            return Err(Error::InvalidPageSize);
        }

        let site_root = with_trailing_slash(project.site_root);
        tracing::debug!(project = %path.display(), %site_root, "loaded configuration");
        Ok(Config {
            index_url: site_root.join("pages/")?,
            static_url: site_root.join("static/")?,
            atom_url: site_root.join("feed.atom")?,
            site: Site {
                title: project.title,
                description: project.description,
                site_root,
                author: project.author,
                twitter: project.twitter,
                social_image: project.social_image,
            },
            project_root: project_root.to_owned(),
            posts_source_directory: project_root.join("posts"),
            static_source_directory: project_root.join("static"),
            index_template: theme.index_template,
            post_template: theme.post_template,
            theme_directory,
            index_page_size: project.index_page_size.0,
            root_output_directory: output_directory.to_owned(),
            index_output_directory: output_directory.join("pages"),
            static_output_directory: output_directory.join("static"),
            preferences_file: preferences_file(project_root),
        })
    }
}

/// Searches `dir` and its ancestors for the project file. `dir` is made
/// absolute first so that relative starting points like `.` still reach
/// the real ancestors.
pub fn find_project_file(dir: &Path) -> Result<PathBuf> {
    let start = std::fs::canonicalize(dir)
        .map_err(|err| Error::Open(dir.to_owned(), err))?;
    let mut candidate = Some(start.as_path());
    while let Some(dir) = candidate {
        let path = dir.join(PROJECT_FILE);
        if path.is_file() {
            return Ok(path);
        }
        candidate = dir.parent();
    }
    Err(Error::ProjectFileNotFound)
}

/// Locates the theme preferences file for the project containing `dir`.
/// Only the project file needs to exist; the theme isn't loaded.
pub fn find_preferences_file(dir: &Path) -> Result<PathBuf> {
    let project_file = find_project_file(dir)?;
    let project_root = project_file
        .parent()
        .ok_or_else(|| Error::NoParentDirectory(project_file.clone()))?;
    Ok(preferences_file(project_root))
}

fn preferences_file(project_root: &Path) -> PathBuf {
    project_root.join(".penumbra").join("preferences.yaml")
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| Error::Open(path.to_owned(), err))
}

/// The result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Config`].
#[derive(Debug)]
pub enum Error {
    /// Returned when no ancestor of the starting directory holds a project
    /// file.
    ProjectFileNotFound,

    /// Returned when a configuration file can't be opened.
    Open(PathBuf, std::io::Error),

    /// Returned when a configuration file isn't valid.
    Deserialize(PathBuf, serde_yaml::Error),

    /// Returned when the project file path has no parent directory.
    NoParentDirectory(PathBuf),

    /// Returned when `index_page_size` is zero.
    InvalidPageSize,

    /// Returned when a derived URL can't be built from `site_root`.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ProjectFileNotFound => write!(
                f,
                "Could not find `{}` in any parent directory",
                PROJECT_FILE
            ),
            Error::Open(path, err) => {
                write!(f, "Opening `{}`: {}", path.display(), err)
            }
            Error::Deserialize(path, err) => {
                write!(f, "Loading `{}`: {}", path.display(), err)
            }
            Error::NoParentDirectory(path) => write!(
                f,
                "Can't get parent directory for project file `{}`",
                path.display()
            ),
            Error::InvalidPageSize => {
                write!(f, "`index_page_size` must be at least 1")
            }
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open(_, err) => Some(err),
            Error::Deserialize(_, err) => Some(err),
            Error::UrlParse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_from_directory_searches_ancestors() -> TestResult {
        let config = Config::from_directory(
            Path::new("./testdata/site/posts/bundled-diagrams"),
            Path::new("/tmp/out"),
        )?;
        let project_root = std::fs::canonicalize("./testdata/site")?;
        assert_eq!(project_root, config.project_root);
        assert_eq!("ebl blog", config.site.title);
        assert_eq!("https://blog.example.com/", config.site.site_root.as_str());
        assert_eq!("https://blog.example.com/pages/", config.index_url.as_str());
        assert_eq!("https://blog.example.com/static/", config.static_url.as_str());
        assert_eq!("https://blog.example.com/feed.atom", config.atom_url.as_str());
        assert_eq!(2, config.index_page_size);
        assert_eq!("index.html", config.index_template);
        assert_eq!("post.html", config.post_template);
        assert_eq!(Some("@ebl"), config.site.twitter.as_deref());
        assert_eq!(
            project_root.join(".penumbra").join("preferences.yaml"),
            config.preferences_file
        );
        assert_eq!(Path::new("/tmp/out/pages"), config.index_output_directory);
        Ok(())
    }

    #[test]
    fn test_relative_start_reaches_real_ancestors() -> TestResult {
        let project_file = find_project_file(Path::new(
            "./testdata/site/posts/bundled-diagrams/..",
        ))?;
        assert!(project_file.is_absolute());
        assert_eq!(
            std::fs::canonicalize("./testdata/site/penumbra.yaml")?,
            project_file
        );
        Ok(())
    }

    #[test]
    fn test_missing_start_directory() {
        match find_project_file(Path::new("./testdata/no-such-directory")) {
            Err(Error::Open(path, _)) => assert_eq!(
                Path::new("./testdata/no-such-directory"),
                path
            ),
            Err(other) => panic!("wanted Open; found {}", other),
            Ok(path) => panic!("wanted Open; found {}", path.display()),
        }
    }

    #[test]
    fn test_preferences_file_without_theme() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            "title: bare\nsite_root: https://example.org/\n",
        )?;
        std::fs::create_dir(dir.path().join("posts"))?;

        let preferences = find_preferences_file(&dir.path().join("posts"))?;
        assert_eq!(
            std::fs::canonicalize(dir.path())?
                .join(".penumbra")
                .join("preferences.yaml"),
            preferences
        );

        // The full configuration still needs the theme.
        assert!(matches!(
            Config::from_directory(dir.path(), Path::new("/tmp/out")),
            Err(Error::Open(_, _))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_project_file() {
        let dir = tempfile::tempdir().unwrap();
        // The temp directory's ancestors won't hold a project file either.
        match Config::from_directory(dir.path(), Path::new("/tmp/out")) {
            Err(Error::ProjectFileNotFound) => {}
            Err(other) => panic!("wanted ProjectFileNotFound; found {}", other),
            Ok(_) => panic!("wanted ProjectFileNotFound; found a config"),
        }
    }

    #[test]
    fn test_with_trailing_slash() -> Result<()> {
        assert_eq!(
            "https://example.org/blog/",
            with_trailing_slash(Url::parse("https://example.org/blog")?).as_str()
        );
        assert_eq!(
            "https://example.org/",
            with_trailing_slash(Url::parse("https://example.org")?).as_str()
        );
        Ok(())
    }
}
