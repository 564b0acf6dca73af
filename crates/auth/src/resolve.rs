//! Effective-permission resolution (pure).
//!
//! Folds a principal's direct grants and the permission sets of its roles into
//! one set. Storage decides which grants and roles apply; this module only
//! decides how they combine.

use std::collections::BTreeMap;

use gatekeep_core::{Entity, PermissionId};

/// Union of direct and role-derived permissions.
///
/// - Deduplicated by permission id (the first occurrence wins).
/// - Ordered ascending by permission id.
/// - Empty inputs produce an empty set.
pub fn resolve_permissions<'a, P, D, R>(direct: D, role_derived: R) -> Vec<P>
where
    P: Entity<Id = PermissionId> + Clone + 'a,
    D: IntoIterator<Item = &'a P>,
    R: IntoIterator<Item = &'a P>,
{
    let mut resolved: BTreeMap<PermissionId, &P> = BTreeMap::new();
    for permission in direct.into_iter().chain(role_derived) {
        resolved.entry(*permission.id()).or_insert(permission);
    }
    resolved.into_values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Perm {
        id: PermissionId,
    }

    impl Entity for Perm {
        type Id = PermissionId;

        fn id(&self) -> &Self::Id {
            &self.id
        }
    }

    fn perm(id: i64) -> Perm {
        Perm {
            id: PermissionId::new(id),
        }
    }

    #[test]
    fn no_grants_and_no_roles_resolve_to_empty() {
        let resolved: Vec<Perm> = resolve_permissions(&[], &[]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn role_permissions_are_included() {
        let role = vec![perm(3), perm(1)];
        let resolved = resolve_permissions(&[], &role);
        assert_eq!(resolved, vec![perm(1), perm(3)]);
    }

    #[test]
    fn overlap_between_direct_and_role_is_collapsed() {
        let direct = vec![perm(2)];
        let role_a = vec![perm(2), perm(4)];
        let role_b = vec![perm(4), perm(1)];

        let resolved = resolve_permissions(&direct, role_a.iter().chain(role_b.iter()));
        assert_eq!(resolved, vec![perm(1), perm(2), perm(4)]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the resolved set is strictly ascending and is exactly the
        /// union of the input ids.
        #[test]
        fn resolution_is_sorted_unique_union(
            direct in prop::collection::vec(1i64..50, 0..20),
            roles in prop::collection::vec(prop::collection::vec(1i64..50, 0..10), 0..6),
        ) {
            let direct: Vec<Perm> = direct.into_iter().map(perm).collect();
            let roles: Vec<Vec<Perm>> = roles
                .into_iter()
                .map(|r| r.into_iter().map(perm).collect())
                .collect();

            let resolved = resolve_permissions(&direct, roles.iter().flatten());

            prop_assert!(resolved.windows(2).all(|w| w[0].id < w[1].id));

            let mut expected: Vec<i64> = direct
                .iter()
                .chain(roles.iter().flatten())
                .map(|p| p.id.get())
                .collect();
            expected.sort_unstable();
            expected.dedup();
            let actual: Vec<i64> = resolved.iter().map(|p| p.id.get()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
