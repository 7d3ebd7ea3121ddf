//! Defines the [`PostIndex`], the immutable, newest-first collection of
//! [`Post`]s, and [`find_adjacent`], which derives previous/next navigation
//! from a post's position in it.

use crate::post::Post;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// An ordered, immutable collection of posts: most recent first, with posts
/// that share a date ordered by source path.
#[derive(Clone, Debug, Default)]
pub struct PostIndex {
    posts: Vec<Post>,
}

impl PostIndex {
    /// Sorts `posts` into index order and checks that every link is unique.
    pub fn assemble(mut posts: Vec<Post>) -> Result<PostIndex> {
        {
            let mut seen: HashMap<&str, &PathBuf> = HashMap::new();
            for post in &posts {
                if let Some(first) = seen.insert(&post.link, &post.source) {
                    return Err(Error::DuplicateLink {
                        link: post.link.clone(),
                        first: first.clone(),
                        second: post.source.clone(),
                    });
                }
            }
        }

        posts.sort_by(|a, b| {
            b.date.cmp(&a.date).then_with(|| a.source.cmp(&b.source))
        });
        Ok(PostIndex { posts })
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Post> {
        self.posts.iter()
    }

    /// Looks up a post by its link.
    pub fn get(&self, link: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.link == link)
    }

    /// See [`find_adjacent`].
    pub fn find_adjacent(&self, link: &str) -> Adjacent<'_> {
        find_adjacent(&self.posts, link)
    }
}

impl<'a> IntoIterator for &'a PostIndex {
    type Item = &'a Post;
    type IntoIter = std::slice::Iter<'a, Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts.iter()
    }
}

/// The neighbours of a post in a newest-first list.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Adjacent<'a> {
    /// The next older post.
    pub previous: Option<&'a Post>,

    /// The next newer post.
    pub next: Option<&'a Post>,
}

/// Finds the neighbours of the post whose link is `current_link` in a
/// newest-first list. A link that isn't in the list has no neighbours.
pub fn find_adjacent<'a>(posts: &'a [Post], current_link: &str) -> Adjacent<'a> {
    match posts.iter().position(|post| post.link == current_link) {
        None => Adjacent::default(),
        Some(i) => Adjacent {
            previous: posts.get(i + 1),
            next: match i {
                0 => None,
                _ => posts.get(i - 1),
            },
        },
    }
}

/// The result of assembling a [`PostIndex`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error assembling a [`PostIndex`].
#[derive(Debug)]
pub enum Error {
    /// Returned when two sources resolve to the same link.
    DuplicateLink {
        link: String,
        first: PathBuf,
        second: PathBuf,
    },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateLink {
                link,
                first,
                second,
            } => write!(
                f,
                "link `{}` is used by both `{}` and `{}`",
                link,
                first.display(),
                second.display()
            ),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::test::fixture;

    fn links(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.link.as_str()).collect()
    }

    fn link(post: Option<&Post>) -> Option<&str> {
        post.map(|p| p.link.as_str())
    }

    fn collection() -> Vec<Post> {
        vec![
            fixture("/c", "2021-03-01"),
            fixture("/b", "2021-02-01"),
            fixture("/a", "2021-01-01"),
        ]
    }

    #[test]
    fn test_find_adjacent_middle() {
        let posts = collection();
        let adjacent = find_adjacent(&posts, "/b");
        assert_eq!(Some("/a"), link(adjacent.previous));
        assert_eq!(Some("/c"), link(adjacent.next));
    }

    #[test]
    fn test_find_adjacent_ends() {
        let posts = collection();
        let newest = find_adjacent(&posts, "/c");
        assert_eq!(Some("/b"), link(newest.previous));
        assert_eq!(None, link(newest.next));

        let oldest = find_adjacent(&posts, "/a");
        assert_eq!(None, link(oldest.previous));
        assert_eq!(Some("/b"), link(oldest.next));
    }

    #[test]
    fn test_find_adjacent_every_position() {
        let posts: Vec<Post> = (0..6)
            .map(|i| fixture(&format!("/p{}", i), &format!("2021-01-{:02}", 20 - i)))
            .collect();
        let k = posts.len();
        for (i, post) in posts.iter().enumerate() {
            let adjacent = find_adjacent(&posts, &post.link);
            let previous = if i + 1 < k { Some(&posts[i + 1]) } else { None };
            let next = if i > 0 { Some(&posts[i - 1]) } else { None };
            assert_eq!(previous, adjacent.previous, "previous of {}", i);
            assert_eq!(next, adjacent.next, "next of {}", i);
        }
    }

    #[test]
    fn test_find_adjacent_missing_link() {
        let posts = collection();
        assert_eq!(Adjacent::default(), find_adjacent(&posts, "/missing"));
        assert_eq!(Adjacent::default(), find_adjacent(&[], "/missing"));
    }

    #[test]
    fn test_find_adjacent_single() {
        let posts = vec![fixture("/only", "2021-01-01")];
        assert_eq!(Adjacent::default(), find_adjacent(&posts, "/only"));
    }

    #[test]
    fn test_assemble_sorts_newest_first() -> Result<()> {
        let mut posts = collection();
        posts.reverse();
        let index = PostIndex::assemble(posts)?;
        assert_eq!(vec!["/c", "/b", "/a"], links(index.posts()));
        assert_eq!(Some("/b"), link(index.get("/b")));
        assert_eq!(Some("/a"), link(index.find_adjacent("/b").previous));
        Ok(())
    }

    #[test]
    fn test_assemble_breaks_ties_by_source() -> Result<()> {
        let posts = vec![
            fixture("/zeta", "2021-01-01"),
            fixture("/alpha", "2021-01-01"),
            fixture("/newer", "2021-02-01"),
            fixture("/mid", "2021-01-01"),
        ];
        let mut reversed = posts.clone();
        reversed.reverse();

        let wanted = vec!["/newer", "/alpha", "/mid", "/zeta"];
        assert_eq!(wanted, links(PostIndex::assemble(posts)?.posts()));
        assert_eq!(wanted, links(PostIndex::assemble(reversed)?.posts()));
        Ok(())
    }

    #[test]
    fn test_assemble_rejects_duplicate_links() {
        let mut duplicate = fixture("/a", "2020-01-01");
        duplicate.source = PathBuf::from("a/index.md");
        let mut posts = collection();
        posts.push(duplicate);

        match PostIndex::assemble(posts) {
            Err(Error::DuplicateLink { link, first, second }) => {
                assert_eq!("/a", link);
                assert_eq!(PathBuf::from("a.md"), first);
                assert_eq!(PathBuf::from("a/index.md"), second);
            }
            other => panic!("wanted duplicate link error; found {:?}", other),
        }
    }

    #[test]
    fn test_assemble_empty() -> Result<()> {
        let index = PostIndex::assemble(Vec::new())?;
        assert!(index.is_empty());
        assert_eq!(0, index.len());
        assert_eq!(0, index.iter().count());
        Ok(())
    }
}
