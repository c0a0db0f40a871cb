//! Region catalog
//!
//! Used to tell per-region override blocks apart from ordinary keys in
//! region-keyed request files.

/// Regions currently served by the public API
pub const KNOWN_REGIONS: &[&str] = &[
    "ap-bangkok",
    "ap-beijing",
    "ap-beijing-fsi",
    "ap-chengdu",
    "ap-chongqing",
    "ap-guangzhou",
    "ap-hongkong",
    "ap-jakarta",
    "ap-mumbai",
    "ap-nanjing",
    "ap-seoul",
    "ap-shanghai",
    "ap-shanghai-fsi",
    "ap-shenzhen-fsi",
    "ap-singapore",
    "ap-tokyo",
    "eu-frankfurt",
    "na-ashburn",
    "na-siliconvalley",
    "na-toronto",
    "sa-saopaulo",
];

const AREA_PREFIXES: &[&str] = &["ap-", "na-", "eu-", "sa-"];

/// Whether `name` is a region identifier
///
/// Accepts catalogued regions and names of the same shape
/// (`<area>-<city>[-<suffix>]`, lowercase), so newly opened regions work
/// without a release.
pub fn is_region(name: &str) -> bool {
    if KNOWN_REGIONS.contains(&name) {
        return true;
    }

    let Some(rest) = AREA_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
    else {
        return false;
    };

    !rest.is_empty()
        && rest
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_entries_are_regions() {
        assert!(KNOWN_REGIONS.iter().all(|r| is_region(r)));
    }

    #[test]
    fn test_region_shape() {
        assert!(is_region("ap-guangzhou"));
        assert!(is_region("eu-moscow"));
        assert!(is_region("ap-shenzhen-fsi"));

        assert!(!is_region("fsName"));
        assert!(!is_region("protocols"));
        assert!(!is_region("ap-"));
        assert!(!is_region("ap-Guangzhou"));
        assert!(!is_region("ap--x"));
        assert!(!is_region("us-east-1"));
    }
}
