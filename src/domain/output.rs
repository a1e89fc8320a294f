//! Storage layout for rendered documents written by `render_repo_to_file`
//!
//! The root directory and default category are injected from configuration;
//! nothing here consults the process working directory.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::errors::AppError;

pub const RENDERED_EXTENSION: &str = "html";
pub const FILE_NAME_JOINER: &str = "_";
const PATH_SEPARATOR: char = '/';

static CATEGORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid category pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub default_category: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, default_category: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_category: default_category.into(),
        }
    }

    /// Picks the destination: the caller's explicit path if given, otherwise
    /// `<root>/<category>[/<sub_category>]/<repo name>.html`.
    pub fn resolve(
        &self,
        repo_url: &str,
        output_path: Option<&str>,
        category: Option<&str>,
        sub_category: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        if let Some(explicit) = non_blank(output_path) {
            return Ok(PathBuf::from(explicit));
        }

        let category = non_blank(category).unwrap_or(self.default_category.as_str());
        validate_category(category)?;

        let mut directory = self.root.join(category);
        if let Some(sub_category) = non_blank(sub_category) {
            directory = directory.join(validate_sub_category(sub_category)?);
        }

        let stem = repo_file_stem(repo_url).ok_or_else(|| {
            AppError::bad_request(
                "invalid_repo_url",
                "cannot derive an output file name from repo_url",
            )
        })?;

        Ok(directory.join(format!("{stem}.{RENDERED_EXTENSION}")))
    }
}

/// Flattens the path component of a repository identifier into a file stem,
/// e.g. `https://github.com/owner/repo` becomes `owner_repo`.
///
/// Every `/` maps to one joiner, so `owner//repo` keeps both (`owner__repo`).
pub fn repo_file_stem(repo_url: &str) -> Option<String> {
    let repo_url = repo_url.trim();
    let path = match Url::parse(repo_url) {
        Ok(url) if !url.cannot_be_a_base() => {
            percent_decode_str(url.path()).decode_utf8_lossy().into_owned()
        }
        _ => repo_url.to_string(),
    };

    let stem = path
        .trim_matches(PATH_SEPARATOR)
        .replace(PATH_SEPARATOR, FILE_NAME_JOINER);

    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Creates missing parent directories and writes the document in one shot.
pub async fn write_rendered(path: &Path, content: &str) -> Result<u64, AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            AppError::internal(format!(
                "failed to create directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    tokio::fs::write(path, content.as_bytes())
        .await
        .map_err(|err| AppError::internal(format!("failed to write {}: {err}", path.display())))?;

    Ok(content.len() as u64)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn validate_category(category: &str) -> Result<(), AppError> {
    if CATEGORY.is_match(category) && category != "." && category != ".." {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "invalid_project_type",
            "project_type must be a single directory name",
        ))
    }
}

fn validate_sub_category(sub_category: &str) -> Result<&str, AppError> {
    let trimmed = sub_category.trim_matches('/');
    let valid = !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|segment| !segment.is_empty() && segment != ".." && segment != ".");

    if valid {
        Ok(trimmed)
    } else {
        Err(AppError::bad_request(
            "invalid_project_subpath",
            "project_subpath must be a relative path without '.' or '..' segments",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> OutputLayout {
        OutputLayout::new("/projects", "docker")
    }

    #[test]
    fn derives_stem_from_url_path() {
        assert_eq!(
            repo_file_stem("https://github.com/owner/repo/").as_deref(),
            Some("owner_repo")
        );
        assert_eq!(repo_file_stem("owner/repo").as_deref(), Some("owner_repo"));
        assert_eq!(repo_file_stem("https://github.com/"), None);
    }

    #[test]
    fn each_separator_becomes_one_joiner_and_escapes_are_decoded() {
        assert_eq!(
            repo_file_stem("https://github.com//owner//repo?tab=readme").as_deref(),
            Some("owner__repo")
        );
        assert_eq!(repo_file_stem("owner//repo").as_deref(), Some("owner__repo"));
        assert_eq!(
            repo_file_stem("https://example.com/owner/my%20repo").as_deref(),
            Some("owner_my repo")
        );
    }

    #[test]
    fn default_path_nests_under_category() {
        let path = layout()
            .resolve("https://github.com/owner/repo", None, None, None)
            .expect("path");
        assert_eq!(path, PathBuf::from("/projects/docker/owner_repo.html"));

        let path = layout()
            .resolve(
                "https://github.com/owner/repo",
                Some("  "),
                Some("backblaze"),
                Some(" rendergit-mcp/ "),
            )
            .expect("path");
        assert_eq!(
            path,
            PathBuf::from("/projects/backblaze/rendergit-mcp/owner_repo.html")
        );
    }

    #[test]
    fn explicit_output_path_wins() {
        let path = layout()
            .resolve(
                "https://github.com/owner/repo",
                Some("/tmp/custom.html"),
                Some("../escape"),
                None,
            )
            .expect("explicit path bypasses derivation");
        assert_eq!(path, PathBuf::from("/tmp/custom.html"));
    }

    #[test]
    fn rejects_traversal_in_category_and_sub_category() {
        let err = layout()
            .resolve("https://github.com/owner/repo", None, Some(".."), None)
            .expect_err("dot-dot category");
        assert!(err.to_string().contains("bad request"));

        let err = layout()
            .resolve("https://github.com/owner/repo", None, None, Some("a/../../b"))
            .expect_err("dot-dot sub category");
        assert!(err.to_string().contains("bad request"));
    }

    #[test]
    fn rejects_unnameable_repo() {
        let err = layout()
            .resolve("https://github.com/", None, None, None)
            .expect_err("no path component");
        assert!(err.to_string().contains("bad request"));
    }

    #[tokio::test]
    async fn write_creates_missing_directories() {
        let root = std::env::temp_dir().join(format!("rendergit-out-{}", uuid::Uuid::new_v4()));
        let path = root.join("docker").join("nested").join("owner_repo.html");

        let size = write_rendered(&path, "<html>é</html>").await.expect("write");

        assert_eq!(size, "<html>é</html>".len() as u64);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read back"),
            "<html>é</html>"
        );
        std::fs::remove_dir_all(&root).expect("cleanup");
    }
}
