// In-process store: one ordered map per (client, tier) behind a per-client async mutex.
// A report unit holds its client's partition for its whole lifetime and keeps an undo log;
// dropping it without commit restores every row and the latest snapshot it touched. A hostname
// change is held by the unit and written to the registry on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::models::{Client, LatestStatus, Snapshot, Tier, TierRow};
use crate::store::{ClientRegistry, ReportTx, StatusStore};

#[derive(Debug, Default)]
struct Partition {
    latest: Option<Snapshot>,
    tiers: [BTreeMap<i64, TierRow>; 3],
}

#[derive(Debug, Default)]
struct Registry {
    by_machine: HashMap<String, i64>,
    clients: BTreeMap<i64, Client>,
}

#[derive(Debug, Default)]
pub struct MemoryRepo {
    registry: Arc<parking_lot::Mutex<Registry>>,
    partitions: DashMap<i64, Arc<Mutex<Partition>>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, client_id: i64) -> Arc<Mutex<Partition>> {
        self.partitions.entry(client_id).or_default().clone()
    }

    /// Existing partition only; reads never create one.
    fn existing_partition(&self, client_id: i64) -> Option<Arc<Mutex<Partition>>> {
        self.partitions.get(&client_id).map(|p| p.clone())
    }
}

#[async_trait]
impl ClientRegistry for MemoryRepo {
    async fn resolve_client(&self, machine_id: &str, hostname: &str) -> Result<i64, StoreError> {
        let mut reg = self.registry.lock();
        if let Some(id) = reg.by_machine.get(machine_id).copied() {
            return Ok(id);
        }
        let id = reg.clients.keys().next_back().map_or(1, |max| max + 1);
        reg.by_machine.insert(machine_id.to_string(), id);
        reg.clients.insert(
            id,
            Client {
                id,
                machine_id: machine_id.to_string(),
                hostname: hostname.to_string(),
            },
        );
        tracing::info!(client_id = id, machine_id, "New client registered");
        Ok(id)
    }

    async fn client(&self, client_id: i64) -> Result<Option<Client>, StoreError> {
        Ok(self.registry.lock().clients.get(&client_id).cloned())
    }
}

#[async_trait]
impl StatusStore for MemoryRepo {
    async fn begin(&self, client_id: i64) -> Result<Box<dyn ReportTx>, StoreError> {
        let guard = self.partition(client_id).lock_owned().await;
        Ok(Box::new(MemoryReportTx {
            client_id,
            guard,
            registry: Arc::clone(&self.registry),
            hostname: None,
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn latest_all(&self) -> Result<Vec<LatestStatus>, StoreError> {
        let clients: Vec<Client> = self.registry.lock().clients.values().cloned().collect();
        let mut out = Vec::with_capacity(clients.len());
        for client in clients {
            let Some(partition) = self.existing_partition(client.id) else {
                continue;
            };
            let latest = partition.lock().await.latest.clone();
            if let Some(snapshot) = latest {
                out.push(LatestStatus {
                    snapshot,
                    machine_id: client.machine_id,
                    hostname: client.hostname,
                });
            }
        }
        Ok(out)
    }

    async fn recent_rows(
        &self,
        tier: Tier,
        client_id: i64,
        limit: u64,
    ) -> Result<Vec<TierRow>, StoreError> {
        let Some(partition) = self.existing_partition(client_id) else {
            return Ok(Vec::new());
        };
        let p = partition.lock().await;
        Ok(p.tiers[tier.index()]
            .values()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn rows_in_range(
        &self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError> {
        let Some(partition) = self.existing_partition(client_id) else {
            return Ok(Vec::new());
        };
        let p = partition.lock().await;
        Ok(range_rows(&p.tiers[tier.index()], after, through))
    }
}

fn range_rows(map: &BTreeMap<i64, TierRow>, after: i64, through: i64) -> Vec<TierRow> {
    if after >= through {
        return Vec::new();
    }
    map.range((std::ops::Bound::Excluded(after), std::ops::Bound::Included(through)))
        .map(|(_, row)| row.clone())
        .collect()
}

enum Undo {
    Latest(Option<Snapshot>),
    Row {
        tier: Tier,
        timestamp: i64,
        previous: Option<TierRow>,
    },
}

struct MemoryReportTx {
    client_id: i64,
    guard: OwnedMutexGuard<Partition>,
    registry: Arc<parking_lot::Mutex<Registry>>,
    hostname: Option<String>,
    undo: Vec<Undo>,
    committed: bool,
}

impl MemoryReportTx {
    fn check_client(&self, client_id: i64) -> Result<(), StoreError> {
        if client_id == self.client_id {
            Ok(())
        } else {
            Err(StoreError::Failure(format!(
                "unit for client {} used for client {}",
                self.client_id, client_id
            )))
        }
    }
}

impl Drop for MemoryReportTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(op) = self.undo.pop() {
            match op {
                Undo::Latest(previous) => self.guard.latest = previous,
                Undo::Row {
                    tier,
                    timestamp,
                    previous,
                } => {
                    let map = &mut self.guard.tiers[tier.index()];
                    match previous {
                        Some(row) => {
                            map.insert(timestamp, row);
                        }
                        None => {
                            map.remove(&timestamp);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ReportTx for MemoryReportTx {
    async fn latest(&mut self, client_id: i64) -> Result<Option<Snapshot>, StoreError> {
        self.check_client(client_id)?;
        Ok(self.guard.latest.clone())
    }

    async fn set_hostname(&mut self, client_id: i64, hostname: &str) -> Result<(), StoreError> {
        self.check_client(client_id)?;
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    async fn put_latest(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check_client(snapshot.client_id)?;
        let previous = self.guard.latest.replace(snapshot.clone());
        self.undo.push(Undo::Latest(previous));
        Ok(())
    }

    async fn upsert_row(&mut self, tier: Tier, row: &TierRow) -> Result<(), StoreError> {
        self.check_client(row.client_id)?;
        let previous = self.guard.tiers[tier.index()].insert(row.timestamp, row.clone());
        self.undo.push(Undo::Row {
            tier,
            timestamp: row.timestamp,
            previous,
        });
        Ok(())
    }

    async fn scan(
        &mut self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError> {
        self.check_client(client_id)?;
        Ok(range_rows(&self.guard.tiers[tier.index()], after, through))
    }

    async fn count_rows(&mut self, tier: Tier, client_id: i64) -> Result<u64, StoreError> {
        self.check_client(client_id)?;
        Ok(self.guard.tiers[tier.index()].len() as u64)
    }

    async fn timestamp_at(
        &mut self,
        tier: Tier,
        client_id: i64,
        offset: u64,
    ) -> Result<Option<i64>, StoreError> {
        self.check_client(client_id)?;
        Ok(self.guard.tiers[tier.index()]
            .keys()
            .nth(offset as usize)
            .copied())
    }

    async fn delete_through(
        &mut self,
        tier: Tier,
        client_id: i64,
        through: i64,
    ) -> Result<u64, StoreError> {
        self.check_client(client_id)?;
        let map = &mut self.guard.tiers[tier.index()];
        let kept = match through.checked_add(1) {
            Some(start) => map.split_off(&start),
            None => BTreeMap::new(),
        };
        let removed = std::mem::replace(map, kept);
        let n = removed.len() as u64;
        for (timestamp, row) in removed {
            self.undo.push(Undo::Row {
                tier,
                timestamp,
                previous: Some(row),
            });
        }
        Ok(n)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        if let Some(hostname) = this.hostname.take() {
            let mut reg = this.registry.lock();
            if let Some(client) = reg.clients.get_mut(&this.client_id)
                && client.hostname != hostname
            {
                tracing::info!(client_id = client.id, %hostname, "Hostname updated");
                client.hostname = hostname;
            }
        }
        this.committed = true;
        this.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Gauges};

    fn row(timestamp: i64) -> TierRow {
        TierRow {
            client_id: 1,
            timestamp,
            counters: Counters::default(),
            gauges: Gauges::default(),
            counter_reset: false,
        }
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let repo = MemoryRepo::new();
        {
            let mut tx = repo.begin(1).await.unwrap();
            tx.upsert_row(Tier::Seconds, &row(10)).await.unwrap();
            tx.upsert_row(Tier::Seconds, &row(20)).await.unwrap();
            tx.commit().await.unwrap();
        }
        {
            let mut tx = repo.begin(1).await.unwrap();
            tx.upsert_row(Tier::Seconds, &row(30)).await.unwrap();
            assert_eq!(tx.delete_through(Tier::Seconds, 1, 20).await.unwrap(), 2);
            assert_eq!(tx.count_rows(Tier::Seconds, 1).await.unwrap(), 1);
        }
        let rows = repo.rows_in_range(Tier::Seconds, 1, 0, 100).await.unwrap();
        let ts: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_unit_is_bound_to_one_client() {
        let repo = MemoryRepo::new();
        let mut tx = repo.begin(1).await.unwrap();
        assert!(tx.count_rows(Tier::Seconds, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_ids_are_stable() {
        let repo = MemoryRepo::new();
        let a = repo.resolve_client("m-a", "alpha").await.unwrap();
        let b = repo.resolve_client("m-b", "beta").await.unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(repo.resolve_client("m-a", "alpha-2").await.unwrap(), 1);
        assert_eq!(repo.client(1).await.unwrap().unwrap().hostname, "alpha");
    }

    #[tokio::test]
    async fn test_hostname_change_waits_for_commit() {
        let repo = MemoryRepo::new();
        let id = repo.resolve_client("m-a", "alpha").await.unwrap();
        {
            let mut tx = repo.begin(id).await.unwrap();
            tx.set_hostname(id, "dropped").await.unwrap();
        }
        assert_eq!(repo.client(id).await.unwrap().unwrap().hostname, "alpha");

        let mut tx = repo.begin(id).await.unwrap();
        tx.set_hostname(id, "alpha-2").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(repo.client(id).await.unwrap().unwrap().hostname, "alpha-2");
    }
}
