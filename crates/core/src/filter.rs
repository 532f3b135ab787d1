//! Pure filtering over an in-memory program collection.
//!
//! Nothing here is cached: options are rebuilt from whatever records the caller
//! passes in, so they always reflect the latest cache contents.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::program::{Program, ProgramStatus};
use crate::query::QueryKey;

/// Predicates applied by [`filter_records`]. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Hide statuses excluded from the current view
    pub current_view: bool,
    pub status: Option<ProgramStatus>,
    pub program_type: Option<String>,
    /// Business identifier, matched against every alias case-insensitively
    pub business: Option<String>,
}

impl FilterSpec {
    /// Status predicates implied by a query key.
    pub fn for_key(key: &QueryKey) -> Self {
        Self {
            current_view: key.is_current(),
            status: key.status(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, program_type: Option<&str>) -> Self {
        self.program_type = non_empty(program_type);
        self
    }

    pub fn with_business(mut self, business: Option<&str>) -> Self {
        self.business = non_empty(business);
        self
    }

    pub fn matches(&self, program: &Program) -> bool {
        if self.current_view && program.status.is_excluded_from_current() {
            return false;
        }
        if let Some(status) = self.status {
            if program.status != status {
                return false;
            }
        }
        if let Some(ref program_type) = self.program_type {
            if program.program_type != *program_type {
                return false;
            }
        }
        if let Some(ref business) = self.business {
            if !program.references_business(business) {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Apply status exclusion, then type equality, then business membership.
/// Input order is preserved.
pub fn filter_records(records: &[Program], spec: &FilterSpec) -> Vec<Program> {
    records
        .iter()
        .filter(|program| spec.matches(program))
        .cloned()
        .collect()
}

/// A selectable business derived from the current records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessOption {
    /// First alias seen for the business, original casing
    pub identifier: String,
    pub display_name: String,
    /// Number of distinct programs referencing any alias of the business
    pub member_record_count: usize,
    /// Every alias merged into this option, sorted
    pub aliases: Vec<String>,
}

impl BusinessOption {
    pub fn label(&self) -> String {
        if self.display_name == self.identifier {
            self.identifier.clone()
        } else {
            format!("{} ({})", self.display_name, self.identifier)
        }
    }
}

/// Disjoint sets over normalized alias strings.
#[derive(Default)]
struct AliasSets {
    parent: HashMap<String, String>,
}

impl AliasSets {
    fn find(&mut self, alias: &str) -> String {
        let mut root = alias.to_string();
        while let Some(next) = self.parent.get(&root) {
            if *next == root {
                break;
            }
            root = next.clone();
        }
        // path compression
        let mut cursor = alias.to_string();
        while cursor != root {
            let next = self
                .parent
                .insert(cursor.clone(), root.clone())
                .unwrap_or_else(|| root.clone());
            cursor = next;
        }
        root
    }

    fn insert(&mut self, alias: &str) {
        self.parent
            .entry(alias.to_string())
            .or_insert_with(|| alias.to_string());
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }
}

struct OptionGroup {
    identifier: String,
    display_name: Option<String>,
    aliases: BTreeSet<String>,
    members: HashSet<usize>,
}

fn normalized_aliases(aliases: &[String]) -> Vec<(String, String)> {
    aliases
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(|a| (a.to_ascii_lowercase(), a.to_string()))
        .collect()
}

/// Build the business picker options for records of `type_filter` (all types
/// when `None`).
///
/// Alias groups that share any identifier are merged into one option, and each
/// option counts the distinct programs referencing it. Sorted by label.
pub fn build_options(records: &[Program], type_filter: Option<&str>) -> Vec<BusinessOption> {
    let type_filter = non_empty(type_filter);
    let selected: Vec<(usize, &Program)> = records
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            type_filter
                .as_deref()
                .is_none_or(|t| p.program_type == t)
        })
        .collect();

    let mut sets = AliasSets::default();
    for (_, program) in &selected {
        for business in &program.businesses {
            let aliases = normalized_aliases(&business.aliases);
            let Some((first, _)) = aliases.first() else {
                continue;
            };
            for (alias, _) in &aliases {
                sets.insert(alias);
                sets.union(first, alias);
            }
        }
    }

    let mut groups: HashMap<String, OptionGroup> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for (idx, program) in &selected {
        for business in &program.businesses {
            let aliases = normalized_aliases(&business.aliases);
            let Some((first, original)) = aliases.first() else {
                continue;
            };
            let root = sets.find(first);
            let group = groups.entry(root.clone()).or_insert_with(|| {
                order.push(root.clone());
                OptionGroup {
                    identifier: original.clone(),
                    display_name: None,
                    aliases: BTreeSet::new(),
                    members: HashSet::new(),
                }
            });
            group.members.insert(*idx);
            group
                .aliases
                .extend(aliases.iter().map(|(_, original)| original.clone()));
            if group.display_name.is_none() {
                group.display_name = business
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
            }
        }
    }

    let mut options: Vec<BusinessOption> = order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .map(|group| BusinessOption {
            display_name: group
                .display_name
                .unwrap_or_else(|| group.identifier.clone()),
            identifier: group.identifier,
            member_record_count: group.members.len(),
            aliases: group.aliases.into_iter().collect(),
        })
        .collect();

    options.sort_by(|a, b| {
        a.label()
            .to_lowercase()
            .cmp(&b.label().to_lowercase())
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::BusinessRef;

    fn program(id: &str, status: ProgramStatus, ty: &str, aliases: &[&str]) -> Program {
        let p = Program::new(id, status, ty);
        if aliases.is_empty() {
            p
        } else {
            p.with_business(BusinessRef::new(aliases, None))
        }
    }

    #[test]
    fn test_current_view_excludes_closed_statuses() {
        let records = vec![
            program("1", ProgramStatus::Active, "cpc", &[]),
            program("2", ProgramStatus::Expired, "cpc", &[]),
            program("3", ProgramStatus::Pending, "cpc", &[]),
            program("4", ProgramStatus::Rejected, "cpc", &[]),
            program("5", ProgramStatus::Archived, "cpc", &[]),
        ];
        let out = filter_records(&records, &FilterSpec::for_key(&QueryKey::current()));
        let ids: Vec<_> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_all_key_keeps_everything() {
        let records = vec![
            program("1", ProgramStatus::Active, "cpc", &[]),
            program("2", ProgramStatus::Expired, "cpc", &[]),
        ];
        let out = filter_records(&records, &FilterSpec::for_key(&QueryKey::all()));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_type_and_business_filters() {
        let records = vec![
            program("1", ProgramStatus::Active, "cpc", &["SHOP-1", "shop-one"]),
            program("2", ProgramStatus::Active, "affiliate", &["shop-1"]),
            program("3", ProgramStatus::Active, "cpc", &["shop-2"]),
        ];
        let spec = FilterSpec::default()
            .with_type(Some("cpc"))
            .with_business(Some("Shop-One"));
        let out = filter_records(&records, &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "1");

        let spec = FilterSpec::default().with_business(Some("shop-1"));
        let ids: Vec<_> = filter_records(&records, &spec)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_blank_filters_are_ignored() {
        let spec = FilterSpec::default()
            .with_type(Some("  "))
            .with_business(Some(""));
        assert_eq!(spec, FilterSpec::default());
    }

    #[test]
    fn test_options_merge_groups_sharing_an_alias() {
        let records = vec![
            Program::new("1", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["A1", "a-one"], Some("Alpha"))),
            Program::new("2", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["A-ONE", "alpha.com"], None)),
            Program::new("3", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["alpha.com"], None)),
            Program::new("4", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["b1"], Some("Beta"))),
        ];
        let options = build_options(&records, None);
        assert_eq!(options.len(), 2);

        assert_eq!(options[0].display_name, "Alpha");
        assert_eq!(options[0].identifier, "A1");
        assert_eq!(options[0].member_record_count, 3);
        assert!(options[0].aliases.contains(&"alpha.com".to_string()));

        assert_eq!(options[1].display_name, "Beta");
        assert_eq!(options[1].member_record_count, 1);
    }

    #[test]
    fn test_options_count_each_program_once() {
        let records = vec![
            Program::new("1", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["x"], None))
                .with_business(BusinessRef::new(&["X", "y"], None)),
        ];
        let options = build_options(&records, None);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].member_record_count, 1);
    }

    #[test]
    fn test_options_respect_type_filter_and_sort() {
        let records = vec![
            Program::new("1", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["z"], Some("zulu"))),
            Program::new("2", ProgramStatus::Active, "cpc")
                .with_business(BusinessRef::new(&["m"], Some("Mike"))),
            Program::new("3", ProgramStatus::Active, "affiliate")
                .with_business(BusinessRef::new(&["a"], Some("Alpha"))),
        ];
        let labels: Vec<_> = build_options(&records, Some("cpc"))
            .iter()
            .map(|o| o.display_name.clone())
            .collect();
        assert_eq!(labels, vec!["Mike", "zulu"]);
    }

    #[test]
    fn test_option_label() {
        let option = BusinessOption {
            identifier: "b1".into(),
            display_name: "Beta".into(),
            member_record_count: 1,
            aliases: vec!["b1".into()],
        };
        assert_eq!(option.label(), "Beta (b1)");
    }
}
