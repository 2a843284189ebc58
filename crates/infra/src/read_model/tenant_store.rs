use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use stagebill_core::OrganizationId;

/// Organization-isolated key/value store for disposable read models.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V>;
    fn upsert(&self, organization_id: OrganizationId, key: K, value: V);
    fn list(&self, organization_id: OrganizationId) -> Vec<V>;
    /// Organizations that currently hold at least one record.
    fn organizations(&self) -> Vec<OrganizationId>;
    /// Drop every record of an organization (rebuild support).
    fn clear_tenant(&self, organization_id: OrganizationId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V> {
        (**self).get(organization_id, key)
    }

    fn upsert(&self, organization_id: OrganizationId, key: K, value: V) {
        (**self).upsert(organization_id, key, value)
    }

    fn list(&self, organization_id: OrganizationId) -> Vec<V> {
        (**self).list(organization_id)
    }

    fn organizations(&self) -> Vec<OrganizationId> {
        (**self).organizations()
    }

    fn clear_tenant(&self, organization_id: OrganizationId) {
        (**self).clear_tenant(organization_id)
    }
}

/// In-memory organization-isolated store.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(OrganizationId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, organization_id: OrganizationId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(organization_id, key.clone())).cloned()
    }

    fn upsert(&self, organization_id: OrganizationId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((organization_id, key), value);
        }
    }

    fn list(&self, organization_id: OrganizationId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((o, _k), v)| (*o == organization_id).then(|| v.clone()))
            .collect()
    }

    fn organizations(&self) -> Vec<OrganizationId> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let orgs: BTreeSet<OrganizationId> = map.keys().map(|(o, _k)| *o).collect();
        orgs.into_iter().collect()
    }

    fn clear_tenant(&self, organization_id: OrganizationId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(o, _k), _v| *o != organization_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_isolated_per_organization() {
        let store: InMemoryTenantStore<u32, &str> = InMemoryTenantStore::new();
        let (a, b) = (OrganizationId::new(), OrganizationId::new());

        store.upsert(a, 1, "a1");
        store.upsert(b, 1, "b1");

        assert_eq!(store.get(a, &1), Some("a1"));
        assert_eq!(store.list(b), vec!["b1"]);
        assert_eq!(store.organizations().len(), 2);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.organizations(), vec![b]);
    }
}
