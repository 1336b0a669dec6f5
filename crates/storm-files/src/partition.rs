//! Disk names and the partition directories derived from them

use std::path::Path;
use uuid::Uuid;

/// Generate an opaque storage name keeping the extension of `file_name`
pub fn generate_disk_name(file_name: &str) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match extension_of(file_name) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Three-level directory prefix of a disk name: its first nine characters
/// split into groups of three, each followed by `/`.
///
/// `"ABCDE1234.png"` partitions to `"ABC/DE1/234/"`.
pub fn partition_directory(disk_name: &str) -> String {
    let chars: Vec<char> = disk_name.chars().take(9).collect();
    chars
        .chunks(3)
        .map(|group| format!("{}/", group.iter().collect::<String>()))
        .collect()
}

/// Lowercase extension of a file name
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_directory() {
        assert_eq!(partition_directory("ABCDE1234.png"), "ABC/DE1/234/");
        assert_eq!(partition_directory("0123456789abcdef"), "012/345/678/");
    }

    #[test]
    fn test_disk_name_keeps_extension() {
        let name = generate_disk_name("Holiday Photo.JPG");
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), 32 + 4);
        assert_ne!(name, generate_disk_name("Holiday Photo.JPG"));
        assert_eq!(generate_disk_name("README").len(), 32);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.tar.GZ").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
    }
}
