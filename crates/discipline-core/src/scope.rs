//! Scope resolution and the protected-package guardrail

use chrono::{DateTime, Local};
use discipline_config::{Group, Policy};
use discipline_util::{GroupId, PackageName};
use std::collections::{BTreeSet, HashMap};

use crate::schedule::is_restricting;
use crate::state::PolicySet;

/// Packages that must never end up disabled by policy action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyExclusions(BTreeSet<PackageName>);

impl SafetyExclusions {
    pub fn new(packages: impl IntoIterator<Item = PackageName>) -> Self {
        Self(packages.into_iter().collect())
    }

    /// Add the current home launcher, resolved at run time
    pub fn with_launcher(mut self, launcher: Option<PackageName>) -> Self {
        if let Some(launcher) = launcher {
            self.0.insert(launcher);
        }
        self
    }

    pub fn contains(&self, package: &PackageName) -> bool {
        self.0.contains(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Effective targets of one policy: explicit targets plus the members of
/// every referenced group that exists, minus the exclusions
pub fn resolve(
    policy: &Policy,
    groups: &HashMap<GroupId, Group>,
    exclusions: &SafetyExclusions,
) -> BTreeSet<PackageName> {
    let mut targets = policy.targets.clone();
    for group_ref in &policy.group_refs {
        if let Some(group) = groups.get(group_ref) {
            targets.extend(group.members.iter().cloned());
        }
    }
    targets.retain(|p| !exclusions.contains(p));
    targets
}

/// Everything one run needs to know before touching the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Packages that should be disabled now
    pub desired_restricted: BTreeSet<PackageName>,
    /// Targets of every policy, enabled or not; becomes the next memory
    pub declared_scope: BTreeSet<PackageName>,
    /// Packages to inspect: declared scope plus remembered scope
    pub current_scope: BTreeSet<PackageName>,
}

impl ReconcilePlan {
    pub fn compute(
        set: &PolicySet,
        memory: &BTreeSet<PackageName>,
        exclusions: &SafetyExclusions,
        now: &DateTime<Local>,
    ) -> Self {
        let mut desired_restricted = BTreeSet::new();
        let mut declared_scope = BTreeSet::new();

        for policy in &set.policies {
            let targets = resolve(policy, &set.groups, exclusions);
            if is_restricting(policy, now) {
                desired_restricted.extend(targets.iter().cloned());
            }
            declared_scope.extend(targets);
        }

        let current_scope = declared_scope.union(memory).cloned().collect();

        Self {
            desired_restricted,
            declared_scope,
            current_scope,
        }
    }

    /// Whether a package should end up enabled
    pub fn target_enabled(&self, package: &PackageName) -> bool {
        !self.desired_restricted.contains(package)
    }
}

/// First restricting policy covering each package, for display
pub fn restricting_policies<'a>(
    set: &'a PolicySet,
    exclusions: &SafetyExclusions,
    now: &DateTime<Local>,
) -> HashMap<PackageName, &'a Policy> {
    let mut by_package = HashMap::new();
    for policy in set.policies.iter().filter(|p| is_restricting(p, now)) {
        for package in resolve(policy, &set.groups, exclusions) {
            by_package.entry(package).or_insert(policy);
        }
    }
    by_package
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use discipline_api::{GroupDocument, PolicyDocument};

    fn pkgs(names: &[&str]) -> BTreeSet<PackageName> {
        names.iter().map(|n| PackageName::new(*n)).collect()
    }

    fn policy(id: &str, packages: &[&str], groups: &[&str]) -> Policy {
        let mut doc = PolicyDocument::new(id, "00:00", "23:59");
        doc.id = id.into();
        doc.packages = packages.iter().map(|s| s.to_string()).collect();
        doc.group_ids = groups.iter().map(|s| s.to_string()).collect();
        Policy::from_document(&doc).unwrap()
    }

    fn group(id: &str, packages: &[&str]) -> Group {
        Group::from_document(&GroupDocument {
            id: id.into(),
            name: id.into(),
            packages: packages.iter().map(|s| s.to_string()).collect(),
            color: 0,
        })
        .unwrap()
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn exclusions() -> SafetyExclusions {
        SafetyExclusions::new(pkgs(&["com.safe.discipline", "com.android.settings"]))
    }

    #[test]
    fn resolve_unions_groups_and_ignores_dangling_refs() {
        let set = PolicySet::new(vec![], vec![group("g1", &["b.b", "c.c"])]);
        let p = policy("p", &["a.a"], &["g1", "missing"]);
        assert_eq!(
            resolve(&p, &set.groups, &SafetyExclusions::default()),
            pkgs(&["a.a", "b.b", "c.c"])
        );
    }

    #[test]
    fn resolve_subtracts_exclusions_from_targets_and_groups() {
        let set = PolicySet::new(vec![], vec![group("g1", &["com.android.settings", "b.b"])]);
        let p = policy("p", &["a.a", "com.safe.discipline"], &["g1"]);
        assert_eq!(resolve(&p, &set.groups, &exclusions()), pkgs(&["a.a", "b.b"]));
    }

    #[test]
    fn launcher_joins_exclusions() {
        let ex = exclusions().with_launcher(Some(PackageName::new("com.example.home")));
        assert!(ex.contains(&PackageName::new("com.example.home")));
        assert_eq!(ex.len(), 3);
        assert_eq!(exclusions().with_launcher(None).len(), 2);
    }

    #[test]
    fn plan_never_restricts_excluded_packages() {
        let ex = exclusions().with_launcher(Some(PackageName::new("com.example.home")));
        let mut all = policy("p", &["com.safe.discipline", "com.example.home", "a.a"], &["g"]);
        all.force_mode = true;
        let set = PolicySet::new(vec![all], vec![group("g", &["com.android.settings"])]);

        let plan = ReconcilePlan::compute(&set, &BTreeSet::new(), &ex, &now());
        assert_eq!(plan.desired_restricted, pkgs(&["a.a"]));
        assert!(plan.desired_restricted.iter().all(|p| !ex.contains(p)));
    }

    #[test]
    fn plan_scope_includes_disabled_policies_and_memory() {
        let mut off = policy("off", &["b.b"], &[]);
        off.enabled = false;
        let set = PolicySet::new(vec![policy("on", &["a.a"], &[]), off], vec![]);
        let memory = pkgs(&["old.pkg"]);

        let plan = ReconcilePlan::compute(&set, &memory, &exclusions(), &now());
        assert_eq!(plan.desired_restricted, pkgs(&["a.a"]));
        assert_eq!(plan.declared_scope, pkgs(&["a.a", "b.b"]));
        assert_eq!(plan.current_scope, pkgs(&["a.a", "b.b", "old.pkg"]));
        assert!(plan.target_enabled(&PackageName::new("old.pkg")));
        assert!(!plan.target_enabled(&PackageName::new("a.a")));
    }

    #[test]
    fn deleting_group_drops_its_members() {
        let p = policy("p", &["a.a"], &["g"]);
        let with_group = PolicySet::new(vec![p.clone()], vec![group("g", &["b.b"])]);
        let without = PolicySet::new(vec![p], vec![]);

        let before = ReconcilePlan::compute(&with_group, &BTreeSet::new(), &exclusions(), &now());
        assert!(before.desired_restricted.contains(&PackageName::new("b.b")));

        let after = ReconcilePlan::compute(&without, &before.declared_scope, &exclusions(), &now());
        assert_eq!(after.desired_restricted, pkgs(&["a.a"]));
        // Still inspected through memory so it can be re-enabled
        assert!(after.current_scope.contains(&PackageName::new("b.b")));
    }

    #[test]
    fn first_restricting_policy_wins_for_display() {
        let set = PolicySet::new(
            vec![policy("first", &["a.a"], &[]), policy("second", &["a.a", "b.b"], &[])],
            vec![],
        );
        let by_package = restricting_policies(&set, &exclusions(), &now());
        assert_eq!(by_package[&PackageName::new("a.a")].id.as_str(), "first");
        assert_eq!(by_package[&PackageName::new("b.b")].id.as_str(), "second");
    }
}
