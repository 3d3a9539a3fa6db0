//! Engine version handling for the image reference check

/// Registry the machine OS images are published under
pub const MACHINE_OS_REPOSITORY: &str = "quay.io/podman/machine-os";

/// Distribution packages spell pre-releases `5.4.0~rc1`; upstream tags use
/// `5.4.0-rc1`.
pub fn normalize_version(version: &str) -> String {
    version.replace('~', "-")
}

/// Drop the last `.`-separated segment: images are tagged `x.y`, not `x.y.z`.
///
/// A version without any `.` is returned unchanged.
pub fn image_version(version: &str) -> &str {
    match version.rfind('.') {
        Some(index) => &version[..index],
        None => version,
    }
}

/// The `container-image-reference` rpm-ostree should report for an engine
/// version.
pub fn expected_image_reference(version: &str) -> String {
    let normalized = normalize_version(version);
    format!(
        "ostree-remote-image:fedora:docker://{}:{}",
        MACHINE_OS_REPOSITORY,
        image_version(&normalized)
    )
}
