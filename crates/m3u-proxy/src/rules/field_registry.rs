//! Central field registry for the rule engine (spec §4.3 "Field aliases
//! decouple expression fields from storage names").
//!
//! Canonical names are what [`super::evaluator`] looks up on a record;
//! aliases let rule authors use the storage-ish name they're used to
//! (`tvg_logo` → `logo_url`). The parser resolves aliases before the AST is
//! ever evaluated, so the evaluator only ever sees canonical names.

use std::collections::HashMap;

use crate::models::RuleDomain;

pub struct FieldDescriptor {
    pub name: &'static str,
    pub domains: &'static [RuleDomain],
    pub aliases: &'static [&'static str],
}

macro_rules! fd {
    ($name:expr, [$($domain:expr),+ $(,)?], [$($alias:expr),* $(,)?]) => {
        FieldDescriptor { name: $name, domains: &[$($domain),+], aliases: &[$($alias),*] }
    };
}

const FIELDS: &[FieldDescriptor] = &[
    fd!("tvg_id", [RuleDomain::Stream], ["tvg-id"]),
    fd!("display_name", [RuleDomain::Stream], ["tvg_name", "tvg-name", "channel_name"]),
    fd!("group", [RuleDomain::Stream], ["group_title", "group-title"]),
    fd!("logo_url", [RuleDomain::Stream], ["tvg_logo", "tvg-logo"]),
    fd!("stream_url", [RuleDomain::Stream], ["url"]),
    fd!("chno", [RuleDomain::Stream], ["tvg_chno", "tvg-chno", "channel_number"]),
    fd!("source_name", [RuleDomain::Stream, RuleDomain::Epg], []),
    fd!("channel_tvg_id", [RuleDomain::Epg], ["tvg_id"]),
    fd!("title", [RuleDomain::Epg], ["programme_title", "program_title"]),
    fd!("sub_title", [RuleDomain::Epg], ["subtitle"]),
    fd!("description", [RuleDomain::Epg], ["desc"]),
    fd!("category", [RuleDomain::Epg], []),
    fd!("icon_url", [RuleDomain::Epg], ["program_icon", "programme_icon"]),
    fd!("episode_num", [RuleDomain::Epg], ["episode"]),
    fd!("rating", [RuleDomain::Epg], []),
    fd!("language", [RuleDomain::Epg], ["lang"]),
];

pub struct FieldRegistry;

impl FieldRegistry {
    /// Canonical field names usable in the given domain.
    pub fn canonical_fields(domain: RuleDomain) -> Vec<&'static str> {
        FIELDS.iter().filter(|f| f.domains.contains(&domain)).map(|f| f.name).collect()
    }

    /// Alias → canonical map scoped to fields usable in the given domain.
    pub fn alias_map(domain: RuleDomain) -> HashMap<&'static str, &'static str> {
        let mut map = HashMap::new();
        for field in FIELDS.iter().filter(|f| f.domains.contains(&domain)) {
            for alias in field.aliases {
                map.insert(*alias, field.name);
            }
        }
        map
    }

    /// Resolve `name` (alias or canonical) to its canonical form, or `None`
    /// if it isn't a known field for this domain (dynamic/`@dynamic(...)`
    /// fields bypass this registry entirely).
    pub fn resolve(domain: RuleDomain, name: &str) -> Option<&'static str> {
        if let Some(field) = FIELDS.iter().find(|f| f.domains.contains(&domain) && f.name == name) {
            return Some(field.name);
        }
        Self::alias_map(domain).get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_alias_to_canonical() {
        assert_eq!(FieldRegistry::resolve(RuleDomain::Stream, "tvg_logo"), Some("logo_url"));
        assert_eq!(FieldRegistry::resolve(RuleDomain::Stream, "logo_url"), Some("logo_url"));
    }

    #[test]
    fn epg_fields_absent_from_stream_domain() {
        assert_eq!(FieldRegistry::resolve(RuleDomain::Stream, "title"), None);
        assert_eq!(FieldRegistry::resolve(RuleDomain::Epg, "title"), Some("title"));
    }
}
