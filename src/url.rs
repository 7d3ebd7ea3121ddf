//! Rewrites links found in post sources into links on the rendered site.
//! Posts link to one another by source file (`other.md` or
//! `other/index.md`); those become the target post's canonical URL. Relative
//! assets resolve against the linking post's output directory.

use std::collections::HashMap;
use url::{ParseError, Url};

/// Maps each post source path, relative to the posts directory and
/// `/`-separated (`theming.md`, `bundle/index.md`), to the post's link.
pub type SourceLinks = HashMap<String, String>;

const MARKDOWN_EXTENSION: &str = ".md";
const BUNDLE_INDEX: &str = "/index.md";

pub struct Converter<'a> {
    site_root: &'a Url,

    /// The links of every known post, keyed by source path.
    links: &'a SourceLinks,

    /// The location of the source file in a `file:///` space rooted at the
    /// posts directory.
    source: Url,

    /// The output directory for the linking post, e.g.
    /// `https://example.org/hello-world/`.
    post_directory: Url,
}

impl<'a> Converter<'a> {
    /// Constructs a new `Converter`
    ///
    /// # Arguments
    ///
    /// * `site_root` - the root URL of the site. This should end in a
    ///   trailing slash.
    /// * `source` - the path of the linking source file relative to the
    ///   posts directory, e.g. `hello-world.md` or `bundle/index.md`.
    /// * `link` - the route of the linking post, e.g. `/hello-world`.
    /// * `links` - the links of every post, so that links to a source file
    ///   land on that post's canonical URL even when its frontmatter
    ///   overrides the link.
    pub fn new(
        site_root: &'a Url,
        source: &str,
        link: &str,
        links: &'a SourceLinks,
    ) -> Result<Converter<'a>> {
        Ok(Converter {
            site_root,
            links,
            source: Url::parse("file:///")?.join(source)?,
            post_directory: site_root
                .join(&format!("{}/", link.trim_matches('/')))?,
        })
    }

    /// The link of the post a source path refers to, if the path names a
    /// post source. Sources that aren't known posts fall back to the link
    /// their file name would produce.
    fn post_link(&self, path: &str) -> Option<String> {
        if let Some(link) = self.links.get(path.trim_start_matches('/')) {
            return Some(link.trim_matches('/').to_owned());
        }
        let stem = match path.strip_suffix(BUNDLE_INDEX) {
            Some(bundle) => bundle,
            None => path.strip_suffix(MARKDOWN_EXTENSION)?,
        };
        let name = stem.rsplit('/').next()?;
        if name.is_empty() {
            None
        } else {
            Some(slug::slugify(name))
        }
    }

    fn convert_relative(&self, url: &str) -> Result<Url> {
        let resolved = self.source.join(url)?;
        match self.post_link(resolved.path()) {
            Some(link) => {
                let mut target = self.site_root.join(&link)?;
                target.set_fragment(resolved.fragment());
                Ok(target)
            }
            None => self.post_directory.join(url),
        }
    }

    pub fn convert(&self, url: &str) -> Result<String> {
        if url.starts_with('#') {
            return Ok(url.to_owned());
        }
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(ParseError::RelativeUrlWithoutBase) => {
                Ok(self.convert_relative(url)?.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;
