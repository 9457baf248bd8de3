//! Image and registry auth translation.

use crate::proto::{hyperd, kubeapi};

/// Tag assumed by the backend when a reference names no tag or digest.
pub const DEFAULT_TAG: &str = "latest";

/// A repository string split into repository, tag and digest.
///
/// The tag/port ambiguity is resolved by looking at what follows the last
/// colon:
/// - `localhost.localdomain:5000/samalba/hipache:latest` has tag `latest`
/// - `localhost:5000/foo/bar` has no tag
/// - `localhost:5000/foo/bar@sha256:bc88...` has a digest and no tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub repository: String,
    /// Empty when the reference names no tag.
    pub tag: String,
    pub digest: Option<String>,
}

impl RepositoryReference {
    /// Parse a combined repository string. Never fails: anything that does
    /// not look like `repo:tag` or `repo@digest` is taken as a bare
    /// repository.
    pub fn parse(reference: &str) -> Self {
        if let Some((repository, digest)) = reference.split_once('@') {
            return Self {
                repository: repository.to_string(),
                tag: String::new(),
                digest: Some(digest.to_string()),
            };
        }

        if let Some((repository, tag)) = reference.rsplit_once(':') {
            if !tag.contains('/') {
                return Self {
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                    digest: None,
                };
            }
        }

        Self {
            repository: reference.to_string(),
            tag: String::new(),
            digest: None,
        }
    }

    /// The value hyperd expects in the pull request's tag field: the digest
    /// when there is one, otherwise the tag.
    pub fn pull_tag(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.tag)
    }
}

/// Copies only the auth fields that are present. Absent input stays absent
/// so the backend keeps its own defaults.
pub fn hyper_auth_config(auth: Option<&kubeapi::AuthConfig>) -> Option<hyperd::AuthConfig> {
    let auth = auth?;
    let mut config = hyperd::AuthConfig::default();

    if let Some(username) = &auth.username {
        config.username = username.clone();
    }
    if let Some(password) = &auth.password {
        config.password = password.clone();
    }
    if let Some(token) = &auth.auth {
        config.auth = token.clone();
    }
    if let Some(token) = &auth.registry_token {
        config.registry_token = token.clone();
    }
    if let Some(address) = &auth.server_address {
        config.server_address = address.clone();
    }

    Some(config)
}

/// Drops every image whose id equals `filter` or whose repo tags contain it.
/// Without a filter every image is kept.
pub fn filter_images(images: Vec<hyperd::ImageInfo>, filter: Option<&str>) -> Vec<hyperd::ImageInfo> {
    let Some(filter) = filter else {
        return images;
    };

    images
        .into_iter()
        .filter(|img| img.id != filter && !img.repo_tags.iter().any(|tag| tag == filter))
        .collect()
}

/// Looks up the image a kubelet reference points at, by id, repo tag or
/// repo digest. A reference without a tag also matches its `latest` tag.
pub fn find_image<'a>(images: &'a [hyperd::ImageInfo], reference: &str) -> Option<&'a hyperd::ImageInfo> {
    let parsed = RepositoryReference::parse(reference);
    let defaulted = if parsed.tag.is_empty() && parsed.digest.is_none() {
        Some(format!("{}:{}", parsed.repository, DEFAULT_TAG))
    } else {
        None
    };

    images.iter().find(|img| {
        img.id == reference
            || img.repo_digests.iter().any(|d| d == reference)
            || img
                .repo_tags
                .iter()
                .any(|tag| tag == reference || Some(tag) == defaulted.as_ref())
    })
}

pub fn kube_image(image: &hyperd::ImageInfo) -> kubeapi::Image {
    kubeapi::Image {
        id: Some(image.id.clone()),
        repo_tags: image.repo_tags.clone(),
        repo_digests: image.repo_digests.clone(),
        // Negative sizes are reported as 0 rather than wrapping.
        size: Some(u64::try_from(image.virtual_size).unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, tags: &[&str]) -> hyperd::ImageInfo {
        hyperd::ImageInfo {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            virtual_size: 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_name_and_tag() {
        let parsed = RepositoryReference::parse("busybox:1.25");
        assert_eq!(parsed.repository, "busybox");
        assert_eq!(parsed.tag, "1.25");
        assert_eq!(parsed.digest, None);
        assert_eq!(parsed.pull_tag(), "1.25");
    }

    #[test]
    fn test_parse_registry_port_is_not_a_tag() {
        let parsed = RepositoryReference::parse("localhost:5000/foo/bar");
        assert_eq!(parsed.repository, "localhost:5000/foo/bar");
        assert_eq!(parsed.tag, "");

        let parsed = RepositoryReference::parse("localhost.localdomain:5000/samalba/hipache:latest");
        assert_eq!(parsed.repository, "localhost.localdomain:5000/samalba/hipache");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn test_parse_digest_splits_at_first_at() {
        let parsed = RepositoryReference::parse("localhost:5000/foo/bar@sha256:bc8813ea7b36");
        assert_eq!(parsed.repository, "localhost:5000/foo/bar");
        assert_eq!(parsed.tag, "");
        assert_eq!(parsed.digest.as_deref(), Some("sha256:bc8813ea7b36"));
        assert_eq!(parsed.pull_tag(), "sha256:bc8813ea7b36");

        let parsed = RepositoryReference::parse("a@b@c");
        assert_eq!(parsed.repository, "a");
        assert_eq!(parsed.digest.as_deref(), Some("b@c"));
    }

    #[test]
    fn test_parse_degrades_to_repository() {
        for input in ["busybox", "", "host:5000/"] {
            let parsed = RepositoryReference::parse(input);
            assert_eq!(parsed.repository, input);
            assert_eq!(parsed.tag, "");
            assert_eq!(parsed.digest, None);
        }
    }

    #[test]
    fn test_auth_config_copies_present_fields_only() {
        assert!(hyper_auth_config(None).is_none());

        let auth = kubeapi::AuthConfig {
            username: Some("alice".into()),
            registry_token: Some("tok".into()),
            identity_token: Some("ignored".into()),
            ..Default::default()
        };
        let config = hyper_auth_config(Some(&auth)).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.registry_token, "tok");
        assert_eq!(config.password, "");
        assert_eq!(config.auth, "");
        assert_eq!(config.server_address, "");
        assert_eq!(config.email, "");

        let empty = hyper_auth_config(Some(&kubeapi::AuthConfig::default())).unwrap();
        assert_eq!(empty, hyperd::AuthConfig::default());
    }

    #[test]
    fn test_filter_excludes_matches() {
        let images = vec![
            image("sha256:aaa", &["busybox:latest"]),
            image("sha256:bbb", &["nginx:1.11", "nginx:latest"]),
            image("sha256:ccc", &[]),
        ];

        let kept = filter_images(images.clone(), Some("nginx:latest"));
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["sha256:aaa", "sha256:ccc"]);

        let kept = filter_images(images.clone(), Some("sha256:ccc"));
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["sha256:aaa", "sha256:bbb"]);

        assert_eq!(filter_images(images.clone(), None).len(), 3);
        assert_eq!(filter_images(images, Some("redis")).len(), 3);
    }

    #[test]
    fn test_find_image() {
        let images = vec![
            image("sha256:aaa", &["busybox:latest"]),
            image("sha256:bbb", &["nginx:1.11"]),
        ];

        assert_eq!(find_image(&images, "busybox").unwrap().id, "sha256:aaa");
        assert_eq!(find_image(&images, "nginx:1.11").unwrap().id, "sha256:bbb");
        assert_eq!(find_image(&images, "sha256:bbb").unwrap().id, "sha256:bbb");
        assert!(find_image(&images, "nginx").is_none());
    }

    #[test]
    fn test_kube_image_size() {
        let mut info = image("sha256:aaa", &["busybox:latest"]);
        let converted = kube_image(&info);
        assert_eq!(converted.id.as_deref(), Some("sha256:aaa"));
        assert_eq!(converted.repo_tags, vec!["busybox:latest".to_string()]);
        assert_eq!(converted.size, Some(1024));

        info.virtual_size = -1;
        assert_eq!(kube_image(&info).size, Some(0));
    }
}
