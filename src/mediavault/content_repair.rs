//! Rewrites stale `file://` references embedded in post content.
//!
//! Absolute local paths break whenever the sandbox root moves (reinstall,
//! restore, migration). The filename survives those moves, so a reference is
//! matched on its last path segment and pointed at the asset's current URL.

use regex::{NoExpand, Regex};
use url::Url;

use crate::mediavault::media_assets::MediaAsset;

/// Last path segment of `url` exactly as it appears in serialized URLs.
fn encoded_file_name(url: &Url) -> Option<&str> {
    if url.scheme() != "file" {
        return None;
    }
    url.path_segments()?.next_back().filter(|name| !name.is_empty())
}

fn reference_pattern(file_name: &str) -> Option<Regex> {
    let pattern = format!(r#"src="file://[^"]*/{}""#, regex::escape(file_name));
    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(
                target: "mediavault::content_repair",
                "Skipping reference pattern for {}: {}",
                file_name,
                e
            );
            None
        }
    }
}

/// Points every `src="file://…/<name>"` attribute in `content` at the
/// current local URL of the matching asset.
///
/// Only assets without a remote copy are considered; uploaded media is
/// referenced by its remote URL. Content without matches is returned
/// unchanged, and repairing already repaired content is a no-op.
pub fn repair_content(content: &str, media: &[MediaAsset]) -> String {
    let mut repaired = content.to_string();

    for asset in media.iter().filter(|asset| !asset.has_remote()) {
        for url in [&asset.local_url, &asset.local_thumbnail_url]
            .into_iter()
            .flatten()
        {
            let Some(file_name) = encoded_file_name(url) else {
                continue;
            };
            let Some(pattern) = reference_pattern(file_name) else {
                continue;
            };
            let replacement = format!(r#"src="{}""#, url);
            repaired = pattern
                .replace_all(&repaired, NoExpand(&replacement))
                .into_owned();
        }
    }

    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediavault::media_assets::RemoteStatus;
    use chrono::Utc;

    fn local_asset(id: i64, local: &str, thumbnail: Option<&str>) -> MediaAsset {
        let now = Utc::now();
        MediaAsset {
            id,
            blog_id: Some(1),
            remote_status: RemoteStatus::Local,
            upload_error: None,
            auto_upload_failure_count: 0,
            local_url: Some(Url::parse(local).unwrap()),
            local_thumbnail_url: thumbnail.map(|t| Url::parse(t).unwrap()),
            remote_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_repair_points_at_current_location() {
        let media = [local_asset(1, "file:///new-uuid/a.jpg", None)];
        let content = r#"<p><img src="file:///old-uuid/a.jpg" class="wp-image"></p>"#;

        let repaired = repair_content(content, &media);

        assert!(repaired.contains(r#"src="file:///new-uuid/a.jpg""#));
        assert!(!repaired.contains("old-uuid"));
        assert!(repaired.starts_with("<p><img "));
        assert!(repaired.ends_with(r#" class="wp-image"></p>"#));
    }

    #[test]
    fn test_repair_is_idempotent() {
        let media = [
            local_asset(
                1,
                "file:///var/new/Media/a.jpg",
                Some("file:///var/new/Media/a-thumbnail.jpg"),
            ),
            local_asset(2, "file:///var/new/Media/b%20c.png", None),
        ];
        let content = concat!(
            r#"<img src="file:///var/old/Media/a.jpg">"#,
            r#"<img src="file:///var/old/Media/a-thumbnail.jpg">"#,
            r#"<img src="file:///elsewhere/b%20c.png">"#,
            r#"<img src="https://example.com/a.jpg">"#,
        );

        let once = repair_content(content, &media);
        let twice = repair_content(&once, &media);

        assert_eq!(once, twice);
        assert!(once.contains(r#"src="file:///var/new/Media/a.jpg""#));
        assert!(once.contains(r#"src="file:///var/new/Media/a-thumbnail.jpg""#));
        assert!(once.contains(r#"src="file:///var/new/Media/b%20c.png""#));
        assert!(once.contains(r#"src="https://example.com/a.jpg""#));
    }

    #[test]
    fn test_repair_without_matches_returns_input() {
        let media = [local_asset(1, "file:///new/a.jpg", None)];
        let content = r#"<p>No images, just <a href="file:///old/a.jpg">a link</a></p>"#;
        assert_eq!(repair_content(content, &media), content);
        assert_eq!(repair_content("", &media), "");
    }

    #[test]
    fn test_repair_ignores_uploaded_media() {
        let mut synced = local_asset(1, "file:///new/a.jpg", None);
        synced.remote_status = RemoteStatus::Synced;
        synced.remote_url = Some(Url::parse("https://example.com/a.jpg").unwrap());

        let content = r#"<img src="file:///old/a.jpg">"#;
        assert_eq!(repair_content(content, &[synced]), content);
    }

    #[test]
    fn test_repair_matches_whole_file_names_only() {
        let media = [local_asset(1, "file:///new/a.jpg", None)];
        let content = r#"<img src="file:///old/banana.jpg"><img src="file:///old/a.jpg.bak">"#;
        assert_eq!(repair_content(content, &media), content);
    }

    #[test]
    fn test_repair_treats_file_name_literally() {
        let media = [local_asset(1, "file:///new/a+b(1).jpg", None)];
        let content = r#"<img src="file:///old/a+b(1).jpg"><img src="file:///old/aab(1).jpg">"#;

        let repaired = repair_content(content, &media);
        assert!(repaired.contains(r#"src="file:///new/a+b(1).jpg""#));
        assert!(repaired.contains(r#"src="file:///old/aab(1).jpg""#));
    }
}
