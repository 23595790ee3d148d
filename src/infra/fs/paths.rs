//! Post identities derived from content paths.
//!
//! `<root>/<type>/<dirs>/<file>.md` becomes `type/<dirs>/<file>` with every slug segment
//! normalised by [`slugify`]. A trailing `index` file stands for its directory, and a
//! `YYYY-MM-DD-` file name prefix is also reported as the post's file date. The prefix
//! stays in the slug.

use std::path::Path;

use ::slug::slugify;
use time::{Date, format_description::FormatItem, macros::format_description};

use crate::domain::PostId;

pub(super) const EXTENSION: &str = "md";
const INDEX_STEM: &str = "index";
const FILE_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SlugPath {
    pub id: PostId,
    pub file_date: Option<Date>,
}

/// Date from a `YYYY-MM-DD-` prefix; the prefix must be followed by more name.
pub(super) fn file_date(file_stem: &str) -> Option<Date> {
    let bytes = file_stem.as_bytes();
    if bytes.len() <= 11 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'-' {
        return None;
    }
    Date::parse(file_stem.get(..10)?, FILE_DATE).ok()
}

/// Identity for a file below `root`; `None` for files that do not follow the layout.
pub(super) fn slugify_path(root: &Path, path: &Path) -> Option<SlugPath> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let mut parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() < 2 {
        return None;
    }
    let post_type = parts.remove(0).to_string();

    let file_date = parts.last().and_then(|stem| file_date(stem));
    if parts.len() > 1 && parts.last() == Some(&INDEX_STEM) {
        parts.pop();
    }

    let segments: Vec<String> = parts.iter().map(|part| slugify(part)).collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    Some(SlugPath {
        id: PostId::new(post_type, segments.join("/")),
        file_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn slug_of(path: &str) -> Option<(String, Option<Date>)> {
        slugify_path(Path::new("/content"), Path::new(path))
            .map(|slug| (slug.id.to_string(), slug.file_date))
    }

    #[test]
    fn plain_paths_keep_their_names() {
        assert_eq!(
            slug_of("/content/articles/my-post.md"),
            Some(("articles/my-post".into(), None))
        );
        assert_eq!(
            slug_of("/content/pages/my-page.md"),
            Some(("pages/my-page".into(), None))
        );
    }

    #[test]
    fn segments_are_slugified() {
        assert_eq!(
            slug_of("/content/articles/foobar/My Post With Spaces.md"),
            Some(("articles/foobar/my-post-with-spaces".into(), None))
        );
        assert_eq!(
            slug_of("/content/articles/foo/bar/My Post & Odd Characters/index.md"),
            Some(("articles/foo/bar/my-post-odd-characters".into(), None))
        );
    }

    #[test]
    fn index_files_stand_for_their_directory() {
        assert_eq!(
            slug_of("/content/articles/foobar/my-post/index.md"),
            Some(("articles/foobar/my-post".into(), None))
        );
        assert_eq!(
            slug_of("/content/articles/index.md"),
            Some(("articles/index".into(), None))
        );
    }

    #[test]
    fn dated_file_names_report_the_date() {
        let day = Some(date!(2024 - 01 - 01));
        assert_eq!(
            slug_of("/content/articles/2024-01-01-my-post.md"),
            Some(("articles/2024-01-01-my-post".into(), day))
        );
        assert_eq!(
            slug_of("/content/articles/foobar/2024-01-01-My Post.md"),
            Some(("articles/foobar/2024-01-01-my-post".into(), day))
        );
        // Dates on directories are not file dates.
        assert_eq!(
            slug_of("/content/articles/2024-01-01/my-post.md"),
            Some(("articles/2024-01-01/my-post".into(), None))
        );
        assert_eq!(
            slug_of("/content/articles/abcd-ef-gh-my-post.md"),
            Some(("articles/abcd-ef-gh-my-post".into(), None))
        );
        assert_eq!(file_date("2024-13-01-bad-month"), None);
    }

    #[test]
    fn files_outside_the_layout_are_skipped() {
        assert_eq!(slug_of("/content/readme.md"), None);
        assert_eq!(slug_of("/content/articles/photo.png"), None);
        assert_eq!(slug_of("/content/articles/!!!.md"), None);
    }
}
