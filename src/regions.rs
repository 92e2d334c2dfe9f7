//! Built-in regional server groupings.
//!
//! Region presets are shipped data, read-only at the engine boundary;
//! blocking commands expand them into server-code sets before
//! reconciliation.

/// A named grouping of server codes.
#[derive(Debug, Clone, Copy)]
pub struct RegionPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub servers: &'static [&'static str],
}

pub const REGION_PRESETS: &[RegionPreset] = &[
    RegionPreset {
        name: "North America",
        description: "All US and Canada servers",
        servers: &["iad", "ord", "atl", "dfw", "lax", "sea"],
    },
    RegionPreset {
        name: "North America East",
        description: "US East Coast servers",
        servers: &["iad", "ord", "atl"],
    },
    RegionPreset {
        name: "North America West",
        description: "US West Coast servers",
        servers: &["dfw", "lax", "sea"],
    },
    RegionPreset {
        name: "South America",
        description: "Central and South American servers",
        servers: &["gru", "eze", "scl", "lim"],
    },
    RegionPreset {
        name: "Europe West",
        description: "Western European servers",
        servers: &["lhr", "fra", "par", "ams", "ams4", "mad"],
    },
    RegionPreset {
        name: "Europe East",
        description: "Eastern European servers",
        servers: &["sto", "sto2", "vie", "waw"],
    },
    RegionPreset {
        name: "Europe",
        description: "All European servers",
        servers: &[
            "lhr", "fra", "par", "ams", "ams4", "mad", "sto", "sto2", "vie", "waw",
        ],
    },
    RegionPreset {
        name: "Asia",
        description: "Asian servers (excluding China)",
        servers: &["sgp", "hkg", "hkg4", "tyo", "seo", "bom2", "maa2"],
    },
    RegionPreset {
        name: "Asia Pacific",
        description: "Asia Pacific including Australia",
        servers: &["sgp", "hkg", "hkg4", "tyo", "seo", "syd"],
    },
    RegionPreset {
        name: "China",
        description: "Chinese servers (Perfect World & others)",
        servers: &[
            "pwg", "pwj", "pwu", "pww", "pwz", "shb", "ctum", "pekm", "pvgm", "tgdm", "ctut",
            "pekt", "pvgt", "tgdt", "ctuu", "peku", "pvgu", "tgdu",
        ],
    },
    RegionPreset {
        name: "India",
        description: "Indian servers",
        servers: &["bom2", "maa2"],
    },
    RegionPreset {
        name: "Japan",
        description: "Japanese servers",
        servers: &["tyo"],
    },
    RegionPreset {
        name: "Korea",
        description: "Korean servers",
        servers: &["seo"],
    },
    RegionPreset {
        name: "Oceania",
        description: "Australia and nearby",
        servers: &["syd"],
    },
    RegionPreset {
        name: "Middle East",
        description: "Middle Eastern servers",
        servers: &["dxb"],
    },
    RegionPreset {
        name: "Africa",
        description: "African servers",
        servers: &["jnb"],
    },
];

/// Short aliases accepted wherever a region name is.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("na", "North America"),
    ("nae", "North America East"),
    ("naeast", "North America East"),
    ("naw", "North America West"),
    ("nawest", "North America West"),
    ("sa", "South America"),
    ("eu", "Europe"),
    ("euw", "Europe West"),
    ("eue", "Europe East"),
    ("asia", "Asia"),
    ("apac", "Asia Pacific"),
    ("cn", "China"),
    ("china", "China"),
    ("in", "India"),
    ("india", "India"),
    ("jp", "Japan"),
    ("japan", "Japan"),
    ("kr", "Korea"),
    ("korea", "Korea"),
    ("oce", "Oceania"),
    ("au", "Oceania"),
    ("me", "Middle East"),
    ("af", "Africa"),
];

/// Resolve a region name or alias, case-insensitively.
pub fn resolve(name: &str) -> Option<&'static RegionPreset> {
    let lowered = name.to_lowercase();

    let canonical = REGION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, name)| *name);

    REGION_PRESETS.iter().find(|preset| match canonical {
        Some(canonical) => preset.name == canonical,
        None => preset.name.to_lowercase() == lowered,
    })
}

/// Server codes for a region, or None if the region is unknown.
pub fn region_servers(name: &str) -> Option<&'static [&'static str]> {
    resolve(name).map(|preset| preset.servers)
}

/// The first region preset containing a server code, used as its tag.
pub fn region_for_code(code: &str) -> Option<&'static str> {
    REGION_PRESETS
        .iter()
        .find(|preset| preset.servers.contains(&code))
        .map(|preset| preset.name)
}

/// Aliases paired with their canonical region, for display.
pub fn aliases() -> &'static [(&'static str, &'static str)] {
    REGION_ALIASES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_name() {
        let preset = resolve("Europe").unwrap();
        assert_eq!(preset.name, "Europe");
        assert!(preset.servers.contains(&"fra"));
    }

    #[test]
    fn test_resolve_by_alias() {
        assert_eq!(resolve("na").unwrap().name, "North America");
        assert_eq!(resolve("cn").unwrap().name, "China");
        assert_eq!(resolve("apac").unwrap().name, "Asia Pacific");
    }

    #[test]
    fn test_resolve_case_insensitive() {
        assert_eq!(resolve("EUROPE").unwrap().name, "Europe");
        assert_eq!(resolve("Na").unwrap().name, "North America");
    }

    #[test]
    fn test_resolve_unknown() {
        assert!(resolve("atlantis").is_none());
        assert!(region_servers("atlantis").is_none());
    }

    #[test]
    fn test_region_for_code() {
        assert_eq!(region_for_code("iad"), Some("North America"));
        assert_eq!(region_for_code("dxb"), Some("Middle East"));
        assert_eq!(region_for_code("zzz"), None);
    }

    #[test]
    fn test_every_alias_resolves() {
        for (alias, canonical) in aliases() {
            let preset = resolve(alias)
                .unwrap_or_else(|| panic!("alias {} did not resolve", alias));
            assert_eq!(preset.name, *canonical);
        }
    }
}
