//! Pure path logic: root normalization, key to path composition, and
//! connection-string chroot parsing. No state, no I/O.

use crate::error::{ZooMapError, ZooMapResult};

/// Normalizes a configured root path. `None` and the bare `/` mean the
/// backend's top-level root and normalize to the empty string; one trailing
/// slash is stripped; anything else must be absolute with no empty segments.
pub(crate) fn normalize_root(root: Option<&str>) -> ZooMapResult<String> {
    let raw = match root {
        None => return Ok(String::new()),
        Some(raw) => raw,
    };
    let trimmed = raw.strip_suffix('/').unwrap_or(raw);
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.starts_with('/') {
        return Err(ZooMapError::InvalidConfiguration(format!(
            "root path must be empty or absolute, got {raw:?}"
        )));
    }
    if trimmed[1..].split('/').any(str::is_empty) {
        return Err(ZooMapError::InvalidConfiguration(format!(
            "root path must not contain empty segments, got {raw:?}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Absolute node path for one entry. With an empty root this addresses a
/// top-level node.
pub(crate) fn key_path(root: &str, key: &str) -> String {
    format!("{root}/{key}")
}

/// Path listed and recursively deleted for whole-map operations.
pub(crate) fn list_path(root: &str) -> &str {
    if root.is_empty() {
        "/"
    } else {
        root
    }
}

/// Splits a connection target into the bare endpoint list and the optional
/// chroot suffix, per the backend's connection-string grammar: the chroot
/// starts at the first `/` after the endpoint list, and a bare trailing `/`
/// means no chroot.
pub(crate) fn split_chroot(connect_string: &str) -> ZooMapResult<(String, Option<String>)> {
    let connect_string = connect_string.trim();
    if connect_string.is_empty() {
        return Err(ZooMapError::InvalidConfiguration(
            "connection target must not be empty".to_string(),
        ));
    }
    let Some(slash) = connect_string.find('/') else {
        return Ok((connect_string.to_string(), None));
    };
    let (ensemble, suffix) = connect_string.split_at(slash);
    if ensemble.is_empty() {
        return Err(ZooMapError::InvalidConfiguration(format!(
            "connection target must name at least one endpoint, got {connect_string:?}"
        )));
    }
    let chroot = normalize_root(Some(suffix)).map_err(|_| {
        ZooMapError::InvalidConfiguration(format!(
            "connection target carries a malformed chroot suffix: {suffix:?}"
        ))
    })?;
    if chroot.is_empty() {
        Ok((ensemble.to_string(), None))
    } else {
        Ok((ensemble.to_string(), Some(chroot)))
    }
}

/// Keys address exactly one level below the root, so they must be non-empty
/// and separator-free.
pub(crate) fn validate_key(key: &str) -> ZooMapResult<()> {
    if key.is_empty() {
        return Err(ZooMapError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    if key.contains('/') {
        return Err(ZooMapError::InvalidArgument(format!(
            "key must not contain '/', got {key:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_root_absent_expected_empty() {
        assert_eq!(normalize_root(None).expect("no root is valid"), "");
        assert_eq!(normalize_root(Some("")).expect("empty root is valid"), "");
        assert_eq!(normalize_root(Some("/")).expect("bare slash is valid"), "");
    }

    #[test]
    fn normalize_root_absolute_expected_unchanged() {
        assert_eq!(
            normalize_root(Some("/some/root")).expect("absolute root is valid"),
            "/some/root"
        );
    }

    #[test]
    fn normalize_root_trailing_slash_expected_stripped() {
        assert_eq!(
            normalize_root(Some("/some/root/")).expect("trailing slash is stripped"),
            "/some/root"
        );
    }

    #[test]
    fn normalize_root_relative_expected_invalid_configuration() {
        let error = normalize_root(Some("test/map")).expect_err("relative roots are rejected");
        assert!(matches!(error, ZooMapError::InvalidConfiguration(_)));
    }

    #[test]
    fn normalize_root_doubled_slashes_expected_invalid_configuration() {
        for root in ["///", "//", "/a//b", "/a//"] {
            let error = normalize_root(Some(root)).expect_err("empty segments are rejected");
            assert!(
                matches!(error, ZooMapError::InvalidConfiguration(_)),
                "root {root:?} should be rejected as configuration"
            );
        }
    }

    #[test]
    fn normalize_root_expected_idempotent() {
        for root in ["", "/", "/a", "/some/root/", "/x/y/z"] {
            let once = normalize_root(Some(root)).expect("sample roots are valid");
            let twice = normalize_root(Some(&once)).expect("normalized roots stay valid");
            assert_eq!(once, twice, "normalizing {root:?} twice should be stable");
        }
    }

    #[test]
    fn key_path_expected_root_slash_key() {
        assert_eq!(key_path("/some/root", "mykey"), "/some/root/mykey");
        assert_eq!(key_path("", "mykey"), "/mykey");
    }

    #[test]
    fn list_path_empty_root_expected_top_level() {
        assert_eq!(list_path(""), "/");
        assert_eq!(list_path("/some/root"), "/some/root");
    }

    #[test]
    fn split_chroot_without_suffix_expected_no_chroot() {
        let (ensemble, chroot) =
            split_chroot("127.0.0.1:2181").expect("bare target is valid");
        assert_eq!(ensemble, "127.0.0.1:2181");
        assert_eq!(chroot, None);
    }

    #[test]
    fn split_chroot_with_suffix_expected_both_parts() {
        let (ensemble, chroot) =
            split_chroot("host-a:2181,host-b:2181/test/map").expect("chrooted target is valid");
        assert_eq!(ensemble, "host-a:2181,host-b:2181");
        assert_eq!(chroot.as_deref(), Some("/test/map"));
    }

    #[test]
    fn split_chroot_bare_slash_expected_no_chroot() {
        let (ensemble, chroot) = split_chroot("127.0.0.1:2181/").expect("trailing slash is valid");
        assert_eq!(ensemble, "127.0.0.1:2181");
        assert_eq!(chroot, None);
    }

    #[test]
    fn split_chroot_malformed_suffix_expected_invalid_configuration() {
        let error = split_chroot("127.0.0.1:2181//x").expect_err("doubled slash is rejected");
        assert!(matches!(error, ZooMapError::InvalidConfiguration(_)));
    }

    #[test]
    fn split_chroot_empty_target_expected_invalid_configuration() {
        for target in ["", "   ", "/only/a/path"] {
            let error = split_chroot(target).expect_err("endpointless targets are rejected");
            assert!(
                matches!(error, ZooMapError::InvalidConfiguration(_)),
                "target {target:?} should be rejected as configuration"
            );
        }
    }

    #[test]
    fn validate_key_expected_plain_names_only() {
        validate_key("mykey").expect("plain names are valid");
        validate_key("with space").expect("spaces are allowed");
        assert!(matches!(
            validate_key("").expect_err("empty keys are rejected"),
            ZooMapError::InvalidArgument(_)
        ));
        for key in ["a/b", "/lead", "trail/", "\\//"] {
            let error = validate_key(key).expect_err("separator keys are rejected");
            assert!(
                matches!(error, ZooMapError::InvalidArgument(_)),
                "key {key:?} should be rejected as an argument"
            );
        }
    }
}
