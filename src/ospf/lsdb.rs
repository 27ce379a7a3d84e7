//! The link-state database: per-area LSA maps plus the AS-scoped external
//! map.

use dashmap::DashMap;

use super::lsa::{compare_freshness, Lsa, LsaHeader, LsaKey};
use super::AreaId;

/// Outcome of offering an LSA instance to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The offered instance was newer and replaced (or created) the entry.
    Installed,
    /// The stored instance is considered identical.
    Duplicate,
    /// The stored instance is fresher than the offered one.
    Stale,
}

pub struct Lsdb {
    areas: DashMap<AreaId, DashMap<LsaKey, Lsa>>,
    external: DashMap<LsaKey, Lsa>,
}

impl Lsdb {
    pub fn new() -> Self {
        Lsdb { areas: DashMap::new(), external: DashMap::new() }
    }

    fn area_map(&self, area: AreaId) -> dashmap::mapref::one::Ref<'_, AreaId, DashMap<LsaKey, Lsa>> {
        self.areas.entry(area).or_default();
        self.areas.get(&area).expect("area map just ensured")
    }

    /// Offers `lsa` to the database, installing it when fresher than the
    /// stored instance. Installation of a MaxAge instance still replaces
    /// the entry; the caller decides when to purge.
    pub fn install(&self, area: AreaId, lsa: Lsa) -> InstallOutcome {
        let key = lsa.header.key();
        let area_ref;
        let map = if key.lsa_type.is_as_scoped() {
            &self.external
        } else {
            area_ref = self.area_map(area);
            &*area_ref
        };
        let outcome = match map.get(&key) {
            Some(existing) => match compare_freshness(&lsa.header, &existing.header) {
                std::cmp::Ordering::Greater => {
                    drop(existing);
                    map.insert(key, lsa);
                    InstallOutcome::Installed
                }
                std::cmp::Ordering::Equal => InstallOutcome::Duplicate,
                std::cmp::Ordering::Less => InstallOutcome::Stale,
            },
            None => {
                map.insert(key, lsa);
                InstallOutcome::Installed
            }
        };
        outcome
    }

    pub fn lookup(&self, area: AreaId, key: &LsaKey) -> Option<Lsa> {
        if key.lsa_type.is_as_scoped() {
            return self.external.get(key).map(|l| l.clone());
        }
        self.areas.get(&area).and_then(|m| m.get(key).map(|l| l.clone()))
    }

    pub fn remove(&self, area: AreaId, key: &LsaKey) {
        if key.lsa_type.is_as_scoped() {
            self.external.remove(key);
            return;
        }
        if let Some(map) = self.areas.get(&area) {
            map.remove(key);
        }
    }

    /// Every LSA held for `area`, including the AS-scoped externals
    /// (which every non-stub area sees).
    pub fn area_snapshot(&self, area: AreaId) -> Vec<Lsa> {
        let mut out: Vec<Lsa> = self
            .areas
            .get(&area)
            .map(|m| m.iter().map(|e| e.clone()).collect())
            .unwrap_or_default();
        out.extend(self.external.iter().map(|e| e.clone()));
        out.sort_by_key(|l| l.header.key());
        out
    }

    /// Headers for the DB summary list handed to a new adjacency.
    pub fn header_snapshot(&self, area: AreaId) -> Vec<LsaHeader> {
        self.area_snapshot(area).into_iter().map(|l| l.header).collect()
    }

    pub fn external_snapshot(&self) -> Vec<Lsa> {
        let mut out: Vec<Lsa> = self.external.iter().map(|e| e.clone()).collect();
        out.sort_by_key(|l| l.header.key());
        out
    }

    pub fn clear(&self) {
        self.areas.clear();
        self.external.clear();
    }

    pub fn len(&self) -> usize {
        self.areas.iter().map(|m| m.len()).sum::<usize>() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Lsdb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospf::lsa::{LsaBody, LsaType, RouterLsa};
    use crate::ospf::INITIAL_SEQUENCE;
    use std::net::Ipv4Addr;

    const AREA: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

    fn router_lsa(sequence: u32) -> Lsa {
        Lsa::new(
            0,
            LsaType::Router,
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(1, 1, 1, 1),
            sequence,
            LsaBody::Router(RouterLsa::default()),
        )
    }

    #[test]
    fn newer_sequence_replaces_stored_instance() {
        let db = Lsdb::new();
        assert_eq!(db.install(AREA, router_lsa(INITIAL_SEQUENCE)), InstallOutcome::Installed);
        assert_eq!(db.install(AREA, router_lsa(INITIAL_SEQUENCE + 1)), InstallOutcome::Installed);
        assert_eq!(db.install(AREA, router_lsa(INITIAL_SEQUENCE)), InstallOutcome::Stale);
        let key = router_lsa(INITIAL_SEQUENCE).header.key();
        assert_eq!(db.lookup(AREA, &key).unwrap().header.sequence, INITIAL_SEQUENCE + 1);
    }

    #[test]
    fn identical_instance_reports_duplicate() {
        let db = Lsdb::new();
        db.install(AREA, router_lsa(INITIAL_SEQUENCE));
        assert_eq!(db.install(AREA, router_lsa(INITIAL_SEQUENCE)), InstallOutcome::Duplicate);
    }

    #[test]
    fn externals_visible_from_every_area() {
        let db = Lsdb::new();
        let ext = Lsa::new(
            0,
            LsaType::AsExternal,
            Ipv4Addr::new(203, 0, 113, 0),
            Ipv4Addr::new(1, 1, 1, 1),
            INITIAL_SEQUENCE,
            LsaBody::External(crate::ospf::lsa::ExternalLsa {
                mask: Ipv4Addr::new(255, 255, 255, 0),
                metric: 20,
                forwarding: None,
            }),
        );
        db.install(AREA, ext.clone());
        let other_area = Ipv4Addr::new(0, 0, 0, 1);
        assert!(db.area_snapshot(other_area).iter().any(|l| l.header.key() == ext.header.key()));
    }
}
